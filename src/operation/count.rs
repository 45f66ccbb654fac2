use bson::{doc, Document};

use crate::{
    bson_util,
    cmap::{Command, CommandResponse, StreamDescription},
    coll::{options::CountOptions, Namespace},
    concern::ReadConcern,
    error::{Error, Result},
    operation::{append_options, Operation},
};

#[derive(Debug)]
pub(crate) struct Count {
    ns: Namespace,
    filter: Option<Document>,
    options: Option<CountOptions>,
    read_concern: Option<ReadConcern>,
}

impl Count {
    pub(crate) fn new(
        ns: Namespace,
        filter: Option<Document>,
        options: Option<CountOptions>,
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

impl Operation for Count {
    type O = i64;

    const NAME: &'static str = "count";

    fn build(&self, _description: &StreamDescription) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
        };
        if let Some(ref filter) = self.filter {
            body.insert("query", filter.clone());
        }
        append_options(&mut body, self.options.as_ref())?;
        if let Some(ref read_concern) = self.read_concern {
            body.insert("readConcern", read_concern.to_document());
        }

        Ok(Command::new(Self::NAME, self.ns.db.clone(), body))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        response.validate()?;
        response
            .raw_response
            .get("n")
            .and_then(bson_util::get_int)
            .ok_or_else(|| Error::invalid_response("count reply carried no numeric `n` field"))
    }
}

#[cfg(test)]
mod test {
    use bson::doc;
    use pretty_assertions::assert_eq;

    use super::Count;
    use crate::{
        cmap::StreamDescription,
        coll::{options::CountOptions, Namespace},
        operation::{test::response_from, Operation},
    };

    #[test]
    fn build_and_decode() {
        let op = Count::new(
            Namespace {
                db: "app".to_string(),
                coll: "events".to_string(),
            },
            Some(doc! { "kind": "click" }),
            Some(CountOptions::builder().limit(100_i64).build()),
            None,
        );
        let command = op.build(&StreamDescription::new_testing()).unwrap();
        assert_eq!(
            command.body,
            doc! { "count": "events", "query": { "kind": "click" }, "limit": 100_i64 }
        );

        // Servers report the count as a double.
        let n = op
            .handle_response(response_from(doc! { "ok": 1.0, "n": 12.0 }))
            .unwrap();
        assert_eq!(n, 12);
    }
}
