//! Options for collection-level operations.

use bson::Document;
use serde::Serialize;
use typed_builder::TypedBuilder;

use crate::concern::{ReadConcern, WriteConcern};

/// Options for a `find` operation.
#[derive(Clone, Debug, Default, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(strip_option)))]
#[serde(rename_all = "camelCase")]
pub struct FindOptions {
    /// The order of the returned documents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Document>,

    /// The fields to include or exclude in the returned documents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection: Option<Document>,

    /// The maximum number of documents to return.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,

    /// The number of documents to skip before returning any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<i64>,

    /// The number of documents the server returns per cursor batch.
    #[serde(skip)]
    pub batch_size: Option<u32>,
}

/// Options for an `aggregate` operation.
#[derive(Clone, Debug, Default, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(strip_option)))]
#[serde(rename_all = "camelCase")]
pub struct AggregateOptions {
    /// Whether stages may spill to temporary files on the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_disk_use: Option<bool>,

    /// Whether the server should return the execution plan rather than run
    /// the pipeline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<bool>,

    /// Whether document-level validation is bypassed for `$out`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bypass_document_validation: Option<bool>,

    /// The number of documents the server returns per cursor batch.
    #[serde(skip)]
    pub batch_size: Option<u32>,

    /// The read concern attached to the command.
    #[serde(skip)]
    pub read_concern: Option<ReadConcern>,

    /// The write concern attached when the pipeline ends in `$out`.
    #[serde(skip)]
    pub write_concern: Option<WriteConcern>,
}

/// Options for a `count` operation.
#[derive(Clone, Debug, Default, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(strip_option)))]
#[serde(rename_all = "camelCase")]
pub struct CountOptions {
    /// The maximum number of documents to count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,

    /// The number of documents to skip before counting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<i64>,
}
