use bson::doc;

use crate::{
    cmap::{Command, CommandResponse, StreamDescription},
    coll::Namespace,
    concern::WriteConcern,
    error::Result,
    operation::Operation,
};

#[derive(Debug)]
pub(crate) struct DropCollection {
    ns: Namespace,
    write_concern: Option<WriteConcern>,
}

impl DropCollection {
    pub(crate) fn new(ns: Namespace, write_concern: Option<WriteConcern>) -> Self {
        Self { ns, write_concern }
    }
}

impl Operation for DropCollection {
    type O = ();

    const NAME: &'static str = "drop";

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
            Err(ref e) if e.code() == Some(26) => Ok(()),
            other => other,
        }
    }

    fn is_write(&self) -> bool {
        true
    }
}
