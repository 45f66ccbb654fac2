use bson::{doc, Bson, Document};

use crate::{
    bson_util,
    cmap::{Command, CommandResponse, StreamDescription},
    coll::{options::AggregateOptions, Namespace},
    cursor::CursorSpecification,
    error::Result,
    operation::{append_options, CursorBody, CursorInfo, Operation},
};

#[derive(Debug)]
pub(crate) struct Aggregate {
    target: AggregateTarget,
    pipeline: Vec<Document>,
    options: Option<AggregateOptions>,
}

impl Aggregate {
    pub(crate) fn new(
        target: impl Into<AggregateTarget>,
        pipeline: impl IntoIterator<Item = Document>,
        options: Option<AggregateOptions>,
    ) -> Self {
        Self {
            target: target.into(),
            pipeline: pipeline.into_iter().collect(),
            options,
        }
    }

    /// Whether this is a `$out` aggregation, which writes and must not carry
    /// a cursor batch size.
    fn is_out(&self) -> bool {
        self.pipeline
            .last()
            .map(|stage| bson_util::first_key(stage) == Some("$out"))
            .unwrap_or(false)
    }

    fn is_explain(&self) -> bool {
        self.options
            .as_ref()
            .and_then(|o| o.explain)
            .unwrap_or(false)
    }
}

impl Operation for Aggregate {
    type O = CursorSpecification;

    const NAME: &'static str = "aggregate";

    fn build(&self, _description: &StreamDescription) -> Result<Command> {
        let pipeline: Vec<Bson> = self.pipeline.iter().cloned().map(Bson::Document).collect();

        let mut cursor = Document::new();
        if !self.is_out() {
            if let Some(batch_size) = self.options.as_ref().and_then(|o| o.batch_size) {
                cursor.insert("batchSize", batch_size as i32);
            }
        }

        let mut body = doc! {
            Self::NAME: self.target.to_bson(),
            "pipeline": pipeline,
            "cursor": cursor,
        };
        append_options(&mut body, self.options.as_ref())?;
        if let Some(ref read_concern) = self.options.as_ref().and_then(|o| o.read_concern.clone()) {
            body.insert("readConcern", read_concern.to_document());
        }
        if let Some(ref write_concern) = self.options.as_ref().and_then(|o| o.write_concern.clone())
        {
            if self.is_out() && !write_concern.is_empty() {
                body.insert("writeConcern", write_concern.to_document());
            }
        }

        Ok(Command::new(Self::NAME, self.target.db_name(), body))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        // An explain reply is a bare document rather than a cursor; it is
        // materialized as a single-batch result.
        if self.is_explain() {
            response.validate()?;
            return Ok(CursorSpecification::new(
                CursorInfo {
                    id: 0,
                    ns: self.target.namespace_string(),
                    first_batch: vec![response.raw_response.clone()],
                    next_batch: Vec::new(),
                },
                response.source_address().clone(),
                None,
            ));
        }

        let body: CursorBody = response.body()?;
        Ok(CursorSpecification::new(
            body.cursor,
            response.source_address().clone(),
            self.options.as_ref().and_then(|o| o.batch_size),
        ))
    }

    fn is_write(&self) -> bool {
        self.is_out()
    }
}

/// What an aggregation runs against: a whole database (`aggregate: 1`) or a
/// single collection.
#[derive(Clone, Debug)]
pub(crate) enum AggregateTarget {
    Database(String),
    Collection(Namespace),
}

impl AggregateTarget {
    fn to_bson(&self) -> Bson {
        match *self {
            AggregateTarget::Database(_) => Bson::Int32(1),
            AggregateTarget::Collection(ref ns) => Bson::String(ns.coll.clone()),
        }
    }

    fn db_name(&self) -> String {
        match *self {
            AggregateTarget::Database(ref db) => db.clone(),
            AggregateTarget::Collection(ref ns) => ns.db.clone(),
        }
    }

    fn namespace_string(&self) -> String {
        match *self {
            AggregateTarget::Database(ref db) => format!("{}.$cmd.aggregate", db),
            AggregateTarget::Collection(ref ns) => ns.to_string(),
        }
    }
}

impl From<Namespace> for AggregateTarget {
    fn from(ns: Namespace) -> Self {
        AggregateTarget::Collection(ns)
    }
}

impl From<String> for AggregateTarget {
    fn from(db_name: String) -> Self {
        AggregateTarget::Database(db_name)
    }
}
