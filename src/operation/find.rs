use bson::{doc, Document};

use crate::{
    cmap::{Command, CommandResponse, StreamDescription},
    coll::{options::FindOptions, Namespace},
    concern::ReadConcern,
    cursor::CursorSpecification,
    error::Result,
    operation::{append_options, CursorBody, Operation},
};

#[derive(Debug)]
pub(crate) struct Find {
    ns: Namespace,
    filter: Option<Document>,
    options: Option<FindOptions>,
    read_concern: Option<ReadConcern>,
}

impl Find {
    pub(crate) fn new(
        ns: Namespace,
        filter: Option<Document>,
        options: Option<FindOptions>,
        read_concern: Option<ReadConcern>,
    ) -> Self {
        Self {
            ns,
            filter,
            options,
            read_concern,
        }
    }
}

impl Operation for Find {
    type O = CursorSpecification;

    const NAME: &'static str = "find";

    fn build(&self, _description: &StreamDescription) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
        };
        if let Some(ref filter) = self.filter {
            body.insert("filter", filter.clone());
        }
        append_options(&mut body, self.options.as_ref())?;
        if let Some(batch_size) = self.options.as_ref().and_then(|o| o.batch_size) {
            body.insert("batchSize", batch_size as i32);
        }
        if let Some(ref read_concern) = self.read_concern {
            body.insert("readConcern", read_concern.to_document());
        }

        Ok(Command::new(Self::NAME, self.ns.db.clone(), body))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        let body: CursorBody = response.body()?;
        Ok(CursorSpecification::new(
            body.cursor,
            response.source_address().clone(),
            self.options.as_ref().and_then(|o| o.batch_size),
        ))
    }
}
