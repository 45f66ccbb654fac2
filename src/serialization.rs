//! The serialization pack seam.
//!
//! The driver core never manipulates raw document bytes itself; it composes
//! values through the small constructor set defined by
//! [`SerializationPack`]. The canonical pack is [`BsonPack`], backed by the
//! [`bson`] crate; the contract is narrow enough that a non-BSON pack (for
//! instance one emitting JSON values) can satisfy it, which the unit tests
//! exercise.

use std::fmt::Debug;

use bson::Bson;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

/// A document/value constructor set plus reader/writer hooks.
///
/// All constructors are total. For every value `v` representable by the
/// pack, reading back a written value must reproduce it:
/// `read(write(v)) == v`.
pub trait SerializationPack: Clone + Debug + Send + Sync + 'static {
    /// An opaque serialized value: a document, array, or scalar.
    type Value: Clone + Debug + PartialEq + Send + Sync;

    /// A named value used to build documents.
    type Element: Clone + Debug + Send + Sync;

    /// An ordered document from its elements.
    fn document(elements: Vec<Self::Element>) -> Self::Value;

    /// A non-empty array.
    fn array(head: Self::Value, tail: Vec<Self::Value>) -> Self::Value;

    /// A (name, value) pair.
    fn element(name: &str, value: Self::Value) -> Self::Element;

    /// A boolean scalar.
    fn boolean(value: bool) -> Self::Value;

    /// A 32-bit integer scalar.
    fn int32(value: i32) -> Self::Value;

    /// A 64-bit integer scalar.
    fn int64(value: i64) -> Self::Value;

    /// A double scalar.
    fn double(value: f64) -> Self::Value;

    /// A string scalar.
    fn string(value: &str) -> Self::Value;

    /// Writer hook: converts a Rust value into a pack value.
    fn write<T: Serialize>(value: &T) -> Result<Self::Value>;

    /// Reader hook: converts a pack value back into a Rust value.
    fn read<T: DeserializeOwned>(value: Self::Value) -> Result<T>;
}

/// The canonical pack, producing [`Bson`] values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BsonPack;

impl SerializationPack for BsonPack {
    type Value = Bson;
    type Element = (String, Bson);

    fn document(elements: Vec<Self::Element>) -> Bson {
        Bson::Document(elements.into_iter().collect())
    }

    fn array(head: Bson, tail: Vec<Bson>) -> Bson {
        let mut values = Vec::with_capacity(tail.len() + 1);
        values.push(head);
        values.extend(tail);
        Bson::Array(values)
    }

    fn element(name: &str, value: Bson) -> Self::Element {
        (name.to_string(), value)
    }

    fn boolean(value: bool) -> Bson {
        Bson::Boolean(value)
    }

    fn int32(value: i32) -> Bson {
        Bson::Int32(value)
    }

    fn int64(value: i64) -> Bson {
        Bson::Int64(value)
    }

    fn double(value: f64) -> Bson {
        Bson::Double(value)
    }

    fn string(value: &str) -> Bson {
        Bson::String(value.to_string())
    }

    fn write<T: Serialize>(value: &T) -> Result<Bson> {
        Ok(bson::to_bson(value)?)
    }

    fn read<T: DeserializeOwned>(value: Bson) -> Result<T> {
        Ok(bson::from_bson(value)?)
    }
}

#[cfg(test)]
mod test {
    use bson::{bson, Bson};
    use pretty_assertions::assert_eq;
    use serde::{Deserialize, Serialize};

    use super::{BsonPack, SerializationPack};
    use crate::error::Result;

    /// A pack emitting JSON values, proving the contract does not assume
    /// BSON.
    #[derive(Clone, Copy, Debug)]
    struct JsonPack;

    impl SerializationPack for JsonPack {
        type Value = serde_json::Value;
        type Element = (String, serde_json::Value);

        fn document(elements: Vec<Self::Element>) -> Self::Value {
            serde_json::Value::Object(elements.into_iter().collect())
        }

        fn array(head: Self::Value, tail: Vec<Self::Value>) -> Self::Value {
            let mut values = vec![head];
            values.extend(tail);
            serde_json::Value::Array(values)
        }

        fn element(name: &str, value: Self::Value) -> Self::Element {
            (name.to_string(), value)
        }

        fn boolean(value: bool) -> Self::Value {
            serde_json::Value::Bool(value)
        }

        fn int32(value: i32) -> Self::Value {
            serde_json::Value::from(value)
        }

        fn int64(value: i64) -> Self::Value {
            serde_json::Value::from(value)
        }

        fn double(value: f64) -> Self::Value {
            serde_json::Value::from(value)
        }

        fn string(value: &str) -> Self::Value {
            serde_json::Value::String(value.to_string())
        }

        fn write<T: Serialize>(value: &T) -> Result<Self::Value> {
            serde_json::to_value(value)
                .map_err(|e| crate::error::Error::invalid_response(e.to_string()))
        }

        fn read<T: serde::de::DeserializeOwned>(value: Self::Value) -> Result<T> {
            serde_json::from_value(value)
                .map_err(|e| crate::error::Error::invalid_response(e.to_string()))
        }
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        name: String,
        size: i64,
        live: bool,
    }

    fn payload() -> Payload {
        Payload {
            name: "sensor-7".to_string(),
            size: 42,
            live: true,
        }
    }

    #[test]
    fn bson_pack_round_trip() {
        let written = BsonPack::write(&payload()).unwrap();
        let read: Payload = BsonPack::read(written).unwrap();
        assert_eq!(read, payload());
    }

    #[test]
    fn json_pack_round_trip() {
        let written = JsonPack::write(&payload()).unwrap();
        let read: Payload = JsonPack::read(written).unwrap();
        assert_eq!(read, payload());
    }

    #[test]
    fn document_construction_is_ordered() {
        let doc = BsonPack::document(vec![
            BsonPack::element("b", BsonPack::int32(2)),
            BsonPack::element("a", BsonPack::int32(1)),
        ]);
        let doc = doc.as_document().unwrap();
        let keys: Vec<_> = doc.keys().collect();
        assert_eq!(keys, ["b", "a"]);
    }

    #[test]
    fn array_is_non_empty() {
        let arr = BsonPack::array(BsonPack::string("x"), vec![BsonPack::int64(9)]);
        assert_eq!(arr, bson!(["x", 9_i64]));
    }

    #[test]
    fn scalar_constructors() {
        assert_eq!(BsonPack::boolean(true), Bson::Boolean(true));
        assert_eq!(BsonPack::double(1.5), Bson::Double(1.5));
        assert_eq!(BsonPack::string("s"), Bson::String("s".to_string()));
    }
}
