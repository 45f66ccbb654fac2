use bson::{doc, Document};

use crate::{
    cmap::{Command, CommandResponse, StreamDescription},
    cursor::CursorSpecification,
    error::Result,
    operation::{CursorBody, Operation},
};

#[derive(Debug)]
pub(crate) struct ListCollections {
    db: String,
    filter: Option<Document>,
    name_only: bool,
}

impl ListCollections {
    pub(crate) fn new(db: String, filter: Option<Document>, name_only: bool) -> Self {
        Self {
            db,
            filter,
            name_only,
        }
    }
}

impl Operation for ListCollections {
    type O = CursorSpecification;

    const NAME: &'static str = "listCollections";

    fn build(&self, _description: &StreamDescription) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: 1,
        };
        if let Some(ref filter) = self.filter {
            body.insert("filter", filter.clone());
        }
        if self.name_only {
            body.insert("nameOnly", true);
        }

        Ok(Command::new(Self::NAME, self.db.clone(), body))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        let body: CursorBody = response.body()?;
        Ok(CursorSpecification::new(
            body.cursor,
            response.source_address().clone(),
            None,
        ))
    }
}
