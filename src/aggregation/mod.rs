//! The aggregation pipeline builder.
//!
//! Pipeline stages and group accumulators form a closed algebra: each
//! variant compiles to a one-key document `{"$<stage>": <payload>}` through
//! the serialization pack, and the [`PipelineStage::Raw`] arm is the single
//! escape hatch for stages the closed set does not model.

use bson::{Bson, Document};

use crate::serialization::{BsonPack, SerializationPack};

/// A stage of an aggregation pipeline.
///
/// The default type parameter binds the algebra to the canonical BSON pack;
/// a different pack changes the produced value type, not the shape.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum PipelineStage<P: SerializationPack = BsonPack> {
    /// `$project`: reshapes documents.
    Project(P::Value),
    /// `$match`: filters documents.
    Match(P::Value),
    /// `$redact`: prunes document trees.
    Redact(P::Value),
    /// `$limit`: passes only the first `n` documents.
    Limit(i64),
    /// `$skip`: drops the first `n` documents.
    Skip(i64),
    /// `$sample`: randomly selects `size` documents.
    Sample(i64),
    /// `$group`: groups by an identifier expression, applying accumulators.
    Group {
        /// The group identifier expression (`_id`).
        id: P::Value,
        /// The accumulated output fields.
        fields: Vec<(String, GroupAccumulator<P>)>,
    },
    /// `$addFields`: appends computed fields.
    AddFields(P::Value),
    /// `$bucketAuto`: groups into a fixed number of automatic buckets.
    BucketAuto {
        /// The expression to bucket by.
        group_by: P::Value,
        /// The number of buckets.
        buckets: i32,
        /// The preferred number series for the bucket boundaries.
        granularity: Option<String>,
        /// The accumulated output fields per bucket.
        output: Vec<(String, GroupAccumulator<P>)>,
    },
    /// `$lookup`: a left outer join on a foreign collection.
    Lookup {
        /// The collection to join with.
        from: String,
        /// The local join key.
        local_field: String,
        /// The foreign join key.
        foreign_field: String,
        /// The output array field.
        as_field: String,
    },
    /// `$graphLookup`: a recursive join on a foreign collection.
    GraphLookup {
        /// The collection to search.
        from: String,
        /// The expression seeding the traversal.
        start_with: P::Value,
        /// The field to recurse from.
        connect_from_field: String,
        /// The field to match against.
        connect_to_field: String,
        /// The output array field.
        as_field: String,
        /// The recursion depth limit.
        max_depth: Option<i32>,
        /// The field recording each document's traversal depth.
        depth_field: Option<String>,
        /// A filter applied at every traversal step.
        restrict_search_with_match: Option<P::Value>,
    },
    /// `$filter`: selects array elements matching a condition.
    Filter {
        /// The array expression to filter.
        input: P::Value,
        /// The variable name bound to each element.
        as_name: String,
        /// The per-element predicate.
        cond: P::Value,
    },
    /// `$unwind` in its plain field form.
    Unwind(String),
    /// `$unwind` in its full document form.
    UnwindFull {
        /// The array field path, with `$` prefix.
        path: String,
        /// A field to receive each element's array index.
        include_array_index: Option<String>,
        /// Whether documents with missing or empty arrays pass through.
        preserve_null_and_empty_arrays: Option<bool>,
    },
    /// `$sort`: orders documents.
    Sort(Vec<SortOrder>),
    /// `$geoNear`: orders by distance from a point.
    GeoNear(P::Value),
    /// `$indexStats`: reports index usage statistics.
    IndexStats,
    /// `$out`: writes the pipeline output to a collection.
    Out(String),
    /// An arbitrary stage the closed set does not model.
    Raw(P::Value),
}

impl<P: SerializationPack> PipelineStage<P> {
    /// Compiles this stage to its one-key document form.
    pub fn compile(&self) -> P::Value {
        match *self {
            PipelineStage::Project(ref payload) => stage::<P>("$project", payload.clone()),
            PipelineStage::Match(ref payload) => stage::<P>("$match", payload.clone()),
            PipelineStage::Redact(ref payload) => stage::<P>("$redact", payload.clone()),
            PipelineStage::Limit(n) => stage::<P>("$limit", P::int64(n)),
            PipelineStage::Skip(n) => stage::<P>("$skip", P::int64(n)),
            PipelineStage::Sample(size) => stage::<P>(
                "$sample",
                P::document(vec![P::element("size", P::int64(size))]),
            ),
            PipelineStage::Group { ref id, ref fields } => {
                let mut elements = vec![P::element("_id", id.clone())];
                elements.extend(
                    fields
                        .iter()
                        .map(|(name, acc)| P::element(name, acc.compile())),
                );
                stage::<P>("$group", P::document(elements))
            }
            PipelineStage::AddFields(ref payload) => stage::<P>("$addFields", payload.clone()),
            PipelineStage::BucketAuto {
                ref group_by,
                buckets,
                ref granularity,
                ref output,
            } => {
                let mut elements = vec![
                    P::element("groupBy", group_by.clone()),
                    P::element("buckets", P::int32(buckets)),
                ];
                if let Some(ref granularity) = *granularity {
                    elements.push(P::element("granularity", P::string(granularity)));
                }
                if !output.is_empty() {
                    elements.push(P::element(
                        "output",
                        P::document(
                            output
                                .iter()
                                .map(|(name, acc)| P::element(name, acc.compile()))
                                .collect(),
                        ),
                    ));
                }
                stage::<P>("$bucketAuto", P::document(elements))
            }
            PipelineStage::Lookup {
                ref from,
                ref local_field,
                ref foreign_field,
                ref as_field,
            } => stage::<P>(
                "$lookup",
                P::document(vec![
                    P::element("from", P::string(from)),
                    P::element("localField", P::string(local_field)),
                    P::element("foreignField", P::string(foreign_field)),
                    P::element("as", P::string(as_field)),
                ]),
            ),
            PipelineStage::GraphLookup {
                ref from,
                ref start_with,
                ref connect_from_field,
                ref connect_to_field,
                ref as_field,
                max_depth,
                ref depth_field,
                ref restrict_search_with_match,
            } => {
                let mut elements = vec![
                    P::element("from", P::string(from)),
                    P::element("startWith", start_with.clone()),
                    P::element("connectFromField", P::string(connect_from_field)),
                    P::element("connectToField", P::string(connect_to_field)),
                    P::element("as", P::string(as_field)),
                ];
                if let Some(max_depth) = max_depth {
                    elements.push(P::element("maxDepth", P::int32(max_depth)));
                }
                if let Some(ref depth_field) = *depth_field {
                    elements.push(P::element("depthField", P::string(depth_field)));
                }
                if let Some(ref restriction) = *restrict_search_with_match {
                    elements.push(P::element("restrictSearchWithMatch", restriction.clone()));
                }
                stage::<P>("$graphLookup", P::document(elements))
            }
            PipelineStage::Filter {
                ref input,
                ref as_name,
                ref cond,
            } => stage::<P>(
                "$filter",
                P::document(vec![
                    P::element("input", input.clone()),
                    P::element("as", P::string(as_name)),
                    P::element("cond", cond.clone()),
                ]),
            ),
            PipelineStage::Unwind(ref field) => {
                stage::<P>("$unwind", P::string(&format!("${}", field)))
            }
            PipelineStage::UnwindFull {
                ref path,
                ref include_array_index,
                ref preserve_null_and_empty_arrays,
            } => {
                let mut elements = vec![P::element("path", P::string(path))];
                if let Some(ref index_field) = *include_array_index {
                    elements.push(P::element("includeArrayIndex", P::string(index_field)));
                }
                if let Some(preserve) = *preserve_null_and_empty_arrays {
                    elements.push(P::element(
                        "preserveNullAndEmptyArrays",
                        P::boolean(preserve),
                    ));
                }
                stage::<P>("$unwind", P::document(elements))
            }
            PipelineStage::Sort(ref orders) => stage::<P>(
                "$sort",
                P::document(orders.iter().map(|order| order.compile::<P>()).collect()),
            ),
            PipelineStage::GeoNear(ref payload) => stage::<P>("$geoNear", payload.clone()),
            PipelineStage::IndexStats => {
                stage::<P>("$indexStats", P::document(Vec::new()))
            }
            PipelineStage::Out(ref collection) => stage::<P>("$out", P::string(collection)),
            PipelineStage::Raw(ref document) => document.clone(),
        }
    }
}

impl PipelineStage<BsonPack> {
    /// The compiled stage as a BSON document, for embedding in an
    /// `aggregate` command body.
    pub(crate) fn to_document(&self) -> Document {
        match self.compile() {
            Bson::Document(doc) => doc,
            // Every closed arm wraps its payload in a one-key document, and
            // `Raw` holds one by construction.
            _ => Document::new(),
        }
    }
}

fn stage<P: SerializationPack>(name: &str, payload: P::Value) -> P::Value {
    P::document(vec![P::element(name, payload)])
}

/// A group accumulator. Each operator supports a field-reference form
/// compiling to `{"$op": "$field"}` and an expression form taking an
/// arbitrary value; [`GroupAccumulator::SumAll`] is the counting shorthand
/// `{$sum: 1}`.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum GroupAccumulator<P: SerializationPack = BsonPack> {
    /// `$sum` of an expression.
    Sum(P::Value),
    /// `$sum` of a field.
    SumField(String),
    /// `{$sum: 1}`.
    SumAll,
    /// `$avg` of an expression.
    Avg(P::Value),
    /// `$avg` of a field.
    AvgField(String),
    /// `$first` of an expression.
    First(P::Value),
    /// `$first` of a field.
    FirstField(String),
    /// `$last` of an expression.
    Last(P::Value),
    /// `$last` of a field.
    LastField(String),
    /// `$max` of an expression.
    Max(P::Value),
    /// `$max` of a field.
    MaxField(String),
    /// `$min` of an expression.
    Min(P::Value),
    /// `$min` of a field.
    MinField(String),
    /// `$push` of an expression.
    Push(P::Value),
    /// `$push` of a field.
    PushField(String),
    /// `$addToSet` of an expression.
    AddToSet(P::Value),
    /// `$addToSet` of a field.
    AddToSetField(String),
    /// `$stdDevPop` of an expression.
    StdDevPop(P::Value),
    /// `$stdDevPop` of a field.
    StdDevPopField(String),
    /// `$stdDevSamp` of an expression.
    StdDevSamp(P::Value),
    /// `$stdDevSamp` of a field.
    StdDevSampField(String),
}

impl<P: SerializationPack> GroupAccumulator<P> {
    /// Compiles this accumulator to its one-key document form.
    pub fn compile(&self) -> P::Value {
        let (operator, payload) = match *self {
            GroupAccumulator::Sum(ref v) => ("$sum", v.clone()),
            GroupAccumulator::SumField(ref f) => ("$sum", field_ref::<P>(f)),
            GroupAccumulator::SumAll => ("$sum", P::int32(1)),
            GroupAccumulator::Avg(ref v) => ("$avg", v.clone()),
            GroupAccumulator::AvgField(ref f) => ("$avg", field_ref::<P>(f)),
            GroupAccumulator::First(ref v) => ("$first", v.clone()),
            GroupAccumulator::FirstField(ref f) => ("$first", field_ref::<P>(f)),
            GroupAccumulator::Last(ref v) => ("$last", v.clone()),
            GroupAccumulator::LastField(ref f) => ("$last", field_ref::<P>(f)),
            GroupAccumulator::Max(ref v) => ("$max", v.clone()),
            GroupAccumulator::MaxField(ref f) => ("$max", field_ref::<P>(f)),
            GroupAccumulator::Min(ref v) => ("$min", v.clone()),
            GroupAccumulator::MinField(ref f) => ("$min", field_ref::<P>(f)),
            GroupAccumulator::Push(ref v) => ("$push", v.clone()),
            GroupAccumulator::PushField(ref f) => ("$push", field_ref::<P>(f)),
            GroupAccumulator::AddToSet(ref v) => ("$addToSet", v.clone()),
            GroupAccumulator::AddToSetField(ref f) => ("$addToSet", field_ref::<P>(f)),
            GroupAccumulator::StdDevPop(ref v) => ("$stdDevPop", v.clone()),
            GroupAccumulator::StdDevPopField(ref f) => ("$stdDevPop", field_ref::<P>(f)),
            GroupAccumulator::StdDevSamp(ref v) => ("$stdDevSamp", v.clone()),
            GroupAccumulator::StdDevSampField(ref f) => ("$stdDevSamp", field_ref::<P>(f)),
        };
        P::document(vec![P::element(operator, payload)])
    }
}

fn field_ref<P: SerializationPack>(field: &str) -> P::Value {
    P::string(&format!("${}", field))
}

/// An element of a `$sort` stage.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum SortOrder {
    /// `{field: 1}`.
    Ascending(String),
    /// `{field: -1}`.
    Descending(String),
    /// `{field: {$meta: <keyword>}}`.
    MetadataSort(String, SortKeyword),
}

/// The metadata keywords usable in a [`SortOrder::MetadataSort`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum SortKeyword {
    /// Sort by text search relevance.
    TextScore,
}

impl SortKeyword {
    fn name(self) -> &'static str {
        match self {
            SortKeyword::TextScore => "textScore",
        }
    }
}

impl SortOrder {
    fn compile<P: SerializationPack>(&self) -> P::Element {
        match *self {
            SortOrder::Ascending(ref field) => P::element(field, P::int32(1)),
            SortOrder::Descending(ref field) => P::element(field, P::int32(-1)),
            SortOrder::MetadataSort(ref field, keyword) => P::element(
                field,
                P::document(vec![P::element("$meta", P::string(keyword.name()))]),
            ),
        }
    }
}
