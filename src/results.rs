//! Results of client-side write operations.

use serde::Deserialize;

/// The result of an insert operation.
#[derive(Clone, Debug, Deserialize)]
pub struct InsertResult {
    /// The number of documents inserted.
    #[serde(rename = "n", default)]
    pub inserted_count: i64,
}

/// The result of an update operation.
#[derive(Clone, Debug, Deserialize)]
pub struct UpdateResult {
    /// The number of documents that matched the filter.
    #[serde(rename = "n", default)]
    pub matched_count: i64,

    /// The number of documents that were modified.
    #[serde(rename = "nModified", default)]
    pub modified_count: i64,
}

/// The result of a delete operation.
#[derive(Clone, Debug, Deserialize)]
pub struct DeleteResult {
    /// The number of documents deleted.
    #[serde(rename = "n", default)]
    pub deleted_count: i64,
}
