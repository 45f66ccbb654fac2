use bson::{doc, Bson, Document};

use crate::{
    cmap::{Command, CommandResponse, StreamDescription},
    error::{Error, Result},
    operation::Operation,
    wire_version::WireVersion,
};

/// Starts a server-side logical session and returns its `lsid` document.
#[derive(Debug)]
pub(crate) struct StartSession;

impl Operation for StartSession {
    type O = Document;

    const NAME: &'static str = "startSession";

    fn build(&self, _description: &StreamDescription) -> Result<Command> {
        Ok(Command::new(Self::NAME, "admin", doc! { Self::NAME: 1 }))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        response.validate()?;
        match response.raw_response.get("id") {
            Some(Bson::Document(id)) => Ok(id.clone()),
            _ => Err(Error::invalid_response(
                "startSession reply carried no session id document",
            )),
        }
    }

    fn min_wire_version(&self) -> Option<WireVersion> {
        Some(WireVersion::V3_6)
    }
}

/// Ends the given server-side sessions gracefully.
#[derive(Debug)]
pub(crate) struct EndSessions {
    session_ids: Vec<Document>,
}

impl EndSessions {
    pub(crate) fn new(session_ids: Vec<Document>) -> Self {
        Self { session_ids }
    }
}

impl Operation for EndSessions {
    type O = ();

    const NAME: &'static str = "endSessions";

    fn build(&self, _description: &StreamDescription) -> Result<Command> {
        let ids: Vec<Bson> = self
            .session_ids
            .iter()
            .cloned()
            .map(Bson::Document)
            .collect();

        Ok(Command::new(Self::NAME, "admin", doc! { Self::NAME: ids }))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        response.validate()
    }

    fn min_wire_version(&self) -> Option<WireVersion> {
        Some(WireVersion::V3_6)
    }
}

/// Forcibly terminates the given server-side sessions, aborting any open
/// transactions they own.
#[derive(Debug)]
pub(crate) struct KillSessions {
    session_ids: Vec<Document>,
}

impl KillSessions {
    pub(crate) fn new(session_ids: Vec<Document>) -> Self {
        Self { session_ids }
    }
}

impl Operation for KillSessions {
    type O = ();

    const NAME: &'static str = "killSessions";

    fn build(&self, _description: &StreamDescription) -> Result<Command> {
        let ids: Vec<Bson> = self
            .session_ids
            .iter()
            .cloned()
            .map(Bson::Document)
            .collect();

        Ok(Command::new(Self::NAME, "admin", doc! { Self::NAME: ids }))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        response.validate()
    }

    fn min_wire_version(&self) -> Option<WireVersion> {
        Some(WireVersion::V3_6)
    }
}

#[cfg(test)]
mod test {
    use bson::{doc, spec::BinarySubtype, Binary};
    use pretty_assertions::assert_eq;

    use super::{EndSessions, StartSession};
    use crate::{
        cmap::StreamDescription,
        operation::{test::response_from, Operation},
    };

    fn lsid() -> bson::Document {
        doc! {
            "id": Binary { subtype: BinarySubtype::Uuid, bytes: vec![7; 16] },
        }
    }

    #[test]
    fn start_session_reads_id() {
        let op = StartSession;
        let command = op.build(&StreamDescription::new_testing()).unwrap();
        assert_eq!(command.target_db, "admin");
        assert_eq!(command.body, doc! { "startSession": 1 });

        let id = op
            .handle_response(response_from(doc! {
                "ok": 1.0,
                "id": lsid(),
                "timeoutMinutes": 30,
            }))
            .unwrap();
        assert_eq!(id, lsid());
    }

    #[test]
    fn end_sessions_lists_ids() {
        let op = EndSessions::new(vec![lsid()]);
        let command = op.build(&StreamDescription::new_testing()).unwrap();
        assert_eq!(command.body, doc! { "endSessions": [lsid()] });
    }
}
