use bson::{doc, Document};

use crate::{
    cmap::{Command, CommandResponse, StreamDescription},
    coll::Namespace,
    concern::WriteConcern,
    error::Result,
    operation::Operation,
    results::UpdateResult,
};

#[derive(Debug)]
pub(crate) struct Update {
    ns: Namespace,
    filter: Document,
    update: Document,
    upsert: bool,
    multi: bool,
    write_concern: Option<WriteConcern>,
}

impl Update {
    pub(crate) fn new(
        ns: Namespace,
        filter: Document,
        update: Document,
        upsert: bool,
        multi: bool,
        write_concern: Option<WriteConcern>,
    ) -> Self {
        Self {
            ns,
            filter,
            update,
            upsert,
            multi,
            write_concern,
        }
    }
}

impl Operation for Update {
    type O = UpdateResult;

    const NAME: &'static str = "update";

    fn build(&self, _description: &StreamDescription) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "updates": [ {
                "q": self.filter.clone(),
                "u": self.update.clone(),
                "upsert": self.upsert,
                "multi": self.multi,
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

#[cfg(test)]
mod test {
    use bson::doc;
    use pretty_assertions::assert_eq;

    use super::Update;
    use crate::{
        cmap::StreamDescription,
        coll::Namespace,
        operation::{test::response_from, Operation},
    };

    #[test]
    fn build_and_decode() {
        let op = Update::new(
            Namespace {
                db: "app".to_string(),
                coll: "events".to_string(),
            },
            doc! { "kind": "click" },
            doc! { "$set": { "seen": true } },
            false,
            true,
            None,
        );
        let command = op.build(&StreamDescription::new_testing()).unwrap();
        assert_eq!(
            command.body,
            doc! {
                "update": "events",
                "updates": [ {
                    "q": { "kind": "click" },
                    "u": { "$set": { "seen": true } },
                    "upsert": false,
                    "multi": true,
                } ],
            }
        );

        let result = op
            .handle_response(response_from(doc! { "ok": 1.0, "n": 3, "nModified": 2 }))
            .unwrap();
        assert_eq!(result.matched_count, 3);
        assert_eq!(result.modified_count, 2);
    }
}
