use bson::doc;

use crate::{
    cmap::{Command, CommandResponse, StreamDescription},
    concern::WriteConcern,
    error::Result,
    operation::Operation,
    wire_version::WireVersion,
};

#[derive(Debug)]
pub(crate) struct AbortTransaction {
    write_concern: Option<WriteConcern>,
}

impl AbortTransaction {
    pub(crate) fn new(write_concern: Option<WriteConcern>) -> Self {
        Self { write_concern }
    }
}

impl Operation for AbortTransaction {
    type O = ();

    const NAME: &'static str = "abortTransaction";

    fn build(&self, _description: &StreamDescription) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: 1,
        };
        if let Some(ref write_concern) = self.write_concern {
            if !write_concern.is_empty() {
                body.insert("writeConcern", write_concern.to_document());
            }
        }

        Ok(Command::new(Self::NAME, "admin", body))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        match response.validate() {
            // Aborting a transaction the server no longer knows about is
            // idempotent success.
            Err(ref e) if e.code() == Some(251) => Ok(()),
            other => other,
        }
    }

    fn min_wire_version(&self) -> Option<WireVersion> {
        Some(WireVersion::V4_0)
    }

    fn is_write(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod test {
    use bson::doc;
    use pretty_assertions::assert_eq;

    use super::AbortTransaction;
    use crate::{
        cmap::StreamDescription,
        operation::{test::response_from, Operation},
    };

    #[test]
    fn build() {
        let op = AbortTransaction::new(None);
        let command = op.build(&StreamDescription::new_testing()).unwrap();
        assert_eq!(command.target_db, "admin");
        assert_eq!(command.body, doc! { "abortTransaction": 1 });
    }

    #[test]
    fn no_such_transaction_swallowed() {
        let op = AbortTransaction::new(None);
        op.handle_response(response_from(doc! {
            "ok": 0.0,
            "code": 251,
            "codeName": "NoSuchTransaction",
            "errmsg": "Transaction 2 has been aborted",
        }))
        .unwrap();
    }
}
