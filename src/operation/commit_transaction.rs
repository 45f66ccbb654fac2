use bson::doc;

use crate::{
    cmap::{Command, CommandResponse, StreamDescription},
    concern::WriteConcern,
    error::Result,
    operation::Operation,
    wire_version::WireVersion,
};

#[derive(Debug)]
pub(crate) struct CommitTransaction {
    write_concern: Option<WriteConcern>,
}

impl CommitTransaction {
    pub(crate) fn new(write_concern: Option<WriteConcern>) -> Self {
        Self { write_concern }
    }
}

impl Operation for CommitTransaction {
    type O = ();

    const NAME: &'static str = "commitTransaction";

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
            // The transaction is already resolved on the server side.
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
