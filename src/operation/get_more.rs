use bson::{doc, Document};

use crate::{
    cmap::{Command, CommandResponse, StreamDescription},
    coll::Namespace,
    error::Result,
    operation::{CursorBody, Operation},
};

#[derive(Debug)]
pub(crate) struct GetMore {
    ns: Namespace,
    cursor_id: i64,
    batch_size: Option<u32>,
}

#[derive(Debug)]
pub(crate) struct GetMoreResult {
    pub(crate) batch: Vec<Document>,
    pub(crate) id: i64,
}

impl GetMore {
    pub(crate) fn new(ns: Namespace, cursor_id: i64, batch_size: Option<u32>) -> Self {
        Self {
            ns,
            cursor_id,
            batch_size,
        }
    }
}

impl Operation for GetMore {
    type O = GetMoreResult;

    const NAME: &'static str = "getMore";

    fn build(&self, _description: &StreamDescription) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.cursor_id,
            "collection": self.ns.coll.clone(),
        };
        if let Some(batch_size) = self.batch_size {
            if batch_size > 0 {
                body.insert("batchSize", batch_size as i32);
            }
        }

        Ok(Command::new(Self::NAME, self.ns.db.clone(), body))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        let body: CursorBody = response.body()?;
        Ok(GetMoreResult {
            batch: body.cursor.next_batch,
            id: body.cursor.id,
        })
    }
}

#[cfg(test)]
mod test {
    use bson::doc;
    use pretty_assertions::assert_eq;

    use super::GetMore;
    use crate::{
        cmap::StreamDescription,
        coll::Namespace,
        operation::{test::response_from, Operation},
    };

    #[test]
    fn build_and_decode() {
        let op = GetMore::new(
            Namespace {
                db: "app".to_string(),
                coll: "events".to_string(),
            },
            42,
            Some(8),
        );
        let command = op.build(&StreamDescription::new_testing()).unwrap();
        assert_eq!(
            command.body,
            doc! { "getMore": 42_i64, "collection": "events", "batchSize": 8_i32 }
        );

        let result = op
            .handle_response(response_from(doc! {
                "ok": 1.0,
                "cursor": { "id": 0_i64, "ns": "app.events", "nextBatch": [ { "x": 3 } ] },
            }))
            .unwrap();
        assert_eq!(result.id, 0);
        assert_eq!(result.batch, vec![doc! { "x": 3 }]);
    }
}
