pub mod options;

use std::{fmt, str::FromStr};

use bson::Document;

use crate::{
    aggregation::PipelineStage,
    coll::options::{AggregateOptions, CountOptions, FindOptions},
    cursor::Cursor,
    db::Database,
    error::{Error, Result},
    operation::{Aggregate, Count, Delete, DropCollection, Find, Insert, Update},
    results::{DeleteResult, InsertResult, UpdateResult},
};

/// A database and collection name pair, rendered on the wire as
/// `"db.coll"`.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Namespace {
    /// The database name.
    pub db: String,

    /// The collection name.
    pub coll: String,
}

impl fmt::Display for Namespace {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}.{}", self.db, self.coll)
    }
}

impl FromStr for Namespace {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('.') {
            Some((db, coll)) if !db.is_empty() && !coll.is_empty() => Ok(Self {
                db: db.to_string(),
                coll: coll.to_string(),
            }),
            _ => Err(Error::invalid_argument(format!(
                "invalid namespace: {}",
                s
            ))),
        }
    }
}

/// `Collection` is a client-side handle to a MongoDB collection. It performs
/// no I/O on construction; obtain one from [`Database::collection`].
///
/// Like [`Database`], a `Collection` is a cheap immutable value; cloning it
/// or creating several for the same name is free of server round trips.
#[derive(Clone, Debug)]
pub struct Collection {
    db: Database,
    name: String,
}

impl Collection {
    pub(crate) fn new(db: Database, name: &str) -> Self {
        Self {
            db,
            name: name.to_string(),
        }
    }

    /// The name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The namespace of this collection.
    pub fn namespace(&self) -> Namespace {
        Namespace {
            db: self.db.name().to_string(),
            coll: self.name.clone(),
        }
    }

    /// Finds the documents matching `filter`, returning a [`Cursor`] over
    /// the results.
    pub async fn find(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<FindOptions>>,
    ) -> Result<Cursor> {
        let options = options.into();
        let batch_size = options.as_ref().and_then(|o| o.batch_size);
        let find = Find::new(self.namespace(), filter.into(), options, None);
        let spec = self.db.execute(find).await?;
        Ok(Cursor::new(
            self.db.client().clone(),
            spec,
            batch_size,
            self.db.session().cloned(),
        ))
    }

    /// Inserts `documents` into the collection.
    pub async fn insert(&self, documents: Vec<Document>) -> Result<InsertResult> {
        let insert = Insert::new(self.namespace(), documents, self.db.write_concern());
        self.db.execute(insert).await
    }

    /// Updates the documents matching `filter`. With `multi` false only the
    /// first match is updated.
    pub async fn update(
        &self,
        filter: Document,
        update: Document,
        upsert: bool,
        multi: bool,
    ) -> Result<UpdateResult> {
        let update = Update::new(
            self.namespace(),
            filter,
            update,
            upsert,
            multi,
            self.db.write_concern(),
        );
        self.db.execute(update).await
    }

    /// Deletes the documents matching `filter`. With `single` true only the
    /// first match is deleted.
    pub async fn delete(&self, filter: Document, single: bool) -> Result<DeleteResult> {
        let delete = Delete::new(self.namespace(), filter, single, self.db.write_concern());
        self.db.execute(delete).await
    }

    /// Counts the documents matching `filter`.
    pub async fn count(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<CountOptions>>,
    ) -> Result<i64> {
        let count = Count::new(self.namespace(), filter.into(), options.into(), None);
        self.db.execute(count).await
    }

    /// Runs an aggregation pipeline against the collection, returning a
    /// [`Cursor`] over the first batch and any server-side continuation.
    pub async fn aggregate(
        &self,
        pipeline: impl IntoIterator<Item = PipelineStage>,
        options: impl Into<Option<AggregateOptions>>,
    ) -> Result<Cursor> {
        let options = options.into();
        let batch_size = options.as_ref().and_then(|o| o.batch_size);
        let pipeline: Vec<Document> = pipeline.into_iter().map(|s| s.to_document()).collect();
        let aggregate = Aggregate::new(self.namespace(), pipeline, options);
        let spec = self.db.execute(aggregate).await?;
        Ok(Cursor::new(
            self.db.client().clone(),
            spec,
            batch_size,
            self.db.session().cloned(),
        ))
    }

    /// Drops the collection. Dropping a collection that does not exist is
    /// success.
    pub async fn drop(&self) -> Result<()> {
        let drop = DropCollection::new(self.namespace(), self.db.write_concern());
        self.db.execute(drop).await
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::Namespace;

    #[test]
    fn namespace_round_trip() {
        let ns = Namespace::from_str("app.events").unwrap();
        assert_eq!(ns.db, "app");
        assert_eq!(ns.coll, "events");
        assert_eq!(ns.to_string(), "app.events");

        // Collection names may themselves contain dots.
        let ns = Namespace::from_str("app.events.archive").unwrap();
        assert_eq!(ns.coll, "events.archive");

        assert!(Namespace::from_str("noseparator").is_err());
        assert!(Namespace::from_str(".coll").is_err());
    }
}
