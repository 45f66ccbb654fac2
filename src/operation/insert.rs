use bson::{doc, Bson, Document};

use crate::{
    cmap::{Command, CommandResponse, StreamDescription},
    coll::Namespace,
    concern::WriteConcern,
    error::Result,
    operation::Operation,
    results::InsertResult,
};

#[derive(Debug)]
pub(crate) struct Insert {
    ns: Namespace,
    documents: Vec<Document>,
    ordered: bool,
    write_concern: Option<WriteConcern>,
}

impl Insert {
    pub(crate) fn new(
        ns: Namespace,
        documents: Vec<Document>,
        write_concern: Option<WriteConcern>,
    ) -> Self {
        Self {
            ns,
            documents,
            ordered: true,
            write_concern,
        }
    }
}

impl Operation for Insert {
    type O = InsertResult;

    const NAME: &'static str = "insert";

    fn build(&self, _description: &StreamDescription) -> Result<Command> {
        let documents: Vec<Bson> = self
            .documents
            .iter()
            .cloned()
            .map(Bson::Document)
            .collect();

        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "documents": documents,
            "ordered": self.ordered,
        };
        if let Some(ref write_concern) = self.write_concern {
            if !write_concern.is_empty() {
                body.insert("writeConcern", write_concern.to_document());
            }
        }

        Ok(Command::new(Self::NAME, self.ns.db.clone(), body))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        response.body()
    }

    fn is_write(&self) -> bool {
        true
    }
}
