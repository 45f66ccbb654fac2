use bson::doc;

use crate::{
    cmap::{Command, CommandResponse, StreamDescription},
    coll::Namespace,
    concern::WriteConcern,
    error::Result,
    operation::Operation,
};

/// Creates a collection explicitly.
#[derive(Debug)]
pub(crate) struct Create {
    ns: Namespace,
    fail_if_exists: bool,
    write_concern: Option<WriteConcern>,
}

impl Create {
    pub(crate) fn new(
        ns: Namespace,
        fail_if_exists: bool,
        write_concern: Option<WriteConcern>,
    ) -> Self {
        Self {
            ns,
            fail_if_exists,
            write_concern,
        }
    }
}

impl Operation for Create {
    type O = ();

    const NAME: &'static str = "create";

    fn build(&self, _description: &StreamDescription) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
        };
        if let Some(ref write_concern) = self.write_concern {
            if !write_concern.is_empty() {
                body.insert("writeConcern", write_concern.to_document());
            }
        }

        Ok(Command::new(Self::NAME, self.ns.db.clone(), body))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        match response.validate() {
            // An existing namespace is success unless the caller asked to be
            // told about it.
            Err(ref e) if e.code() == Some(48) && !self.fail_if_exists => Ok(()),
            other => other,
        }
    }

    fn is_write(&self) -> bool {
        true
    }
}
