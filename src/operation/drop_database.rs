use bson::doc;

use crate::{
    cmap::{Command, CommandResponse, StreamDescription},
    concern::WriteConcern,
    error::Result,
    operation::Operation,
};

#[derive(Debug)]
pub(crate) struct DropDatabase {
    target_db: String,
    write_concern: Option<WriteConcern>,
}

impl DropDatabase {
    pub(crate) fn new(target_db: String, write_concern: Option<WriteConcern>) -> Self {
        Self {
            target_db,
            write_concern,
        }
    }
}

impl Operation for DropDatabase {
    type O = ();

    const NAME: &'static str = "dropDatabase";

    fn build(&self, _description: &StreamDescription) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: 1,
        };
        if let Some(ref write_concern) = self.write_concern {
            if !write_concern.is_empty() {
                body.insert("writeConcern", write_concern.to_document());
            }
        }

        Ok(Command::new(Self::NAME, self.target_db.clone(), body))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        match response.validate() {
            // Dropping what is already gone is success.
            Err(ref e) if e.code() == Some(26) => Ok(()),
            other => other,
        }
    }

    fn is_write(&self) -> bool {
        true
    }
}
