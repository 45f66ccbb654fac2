use bson::{doc, Document};

use crate::{
    cmap::{Command, CommandResponse, StreamDescription},
    coll::Namespace,
    concern::WriteConcern,
    error::Result,
    operation::Operation,
    results::DeleteResult,
};

#[derive(Debug)]
pub(crate) struct Delete {
    ns: Namespace,
    filter: Document,
    /// 0 deletes everything the filter matches, 1 only the first match.
    limit: i32,
    write_concern: Option<WriteConcern>,
}

impl Delete {
    pub(crate) fn new(
        ns: Namespace,
        filter: Document,
        single: bool,
        write_concern: Option<WriteConcern>,
    ) -> Self {
        Self {
            ns,
            filter,
            limit: if single { 1 } else { 0 },
            write_concern,
        }
    }
}

impl Operation for Delete {
    type O = DeleteResult;

    const NAME: &'static str = "delete";

    fn build(&self, _description: &StreamDescription) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "deletes": [ {
                "q": self.filter.clone(),
                "limit": self.limit,
            } ],
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
