use bson::Document;

use crate::{
    bson_util,
    cmap::{Command, CommandResponse, StreamDescription},
    error::{Error, Result},
    operation::Operation,
};

/// Runs an arbitrary database-level command and returns the raw reply.
#[derive(Debug)]
pub(crate) struct RunCommand {
    db: String,
    body: Document,
}

impl RunCommand {
    pub(crate) fn new(db: String, body: Document) -> Result<Self> {
        if bson_util::first_key(&body).is_none() {
            return Err(Error::invalid_argument("an empty document is not a command"));
        }
        Ok(Self { db, body })
    }
}

impl Operation for RunCommand {
    type O = Document;

    const NAME: &'static str = "runCommand";

    fn build(&self, _description: &StreamDescription) -> Result<Command> {
        // The command name is whatever key the caller put first.
        let name = bson_util::first_key(&self.body).unwrap_or_default().to_string();
        Ok(Command::new(name, self.db.clone(), self.body.clone()))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        response.validate()?;
        Ok(response.raw_response)
    }
}

#[cfg(test)]
mod test {
    use bson::doc;
    use pretty_assertions::assert_eq;

    use super::RunCommand;
    use crate::{cmap::StreamDescription, operation::Operation};

    #[test]
    fn name_is_first_key() {
        let op = RunCommand::new("app".to_string(), doc! { "ping": 1 }).unwrap();
        let command = op.build(&StreamDescription::new_testing()).unwrap();
        assert_eq!(command.name, "ping");
        assert_eq!(command.target_db, "app");

        assert!(RunCommand::new("app".to_string(), doc! {}).is_err());
    }
}
