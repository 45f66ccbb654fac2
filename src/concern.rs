//! Read and write concerns: the visibility and durability levels attached
//! to operations.

use bson::{doc, Bson, Document};
use serde::{Deserialize, Serialize};

/// Specifies the consistency and isolation properties of read operations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadConcern {
    /// The level of the read concern.
    pub level: ReadConcernLevel,
}

/// The level of a [`ReadConcern`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum ReadConcernLevel {
    /// The data most recently seen by this node.
    Local,
    /// Data acknowledged by a majority of the replica set.
    Majority,
    /// Linearizable reads.
    Linearizable,
    /// Data with no durability guarantee, for sharded deployments.
    Available,
    /// A majority-committed snapshot; implied for reads inside a
    /// transaction.
    Snapshot,
}

impl ReadConcern {
    /// A `local` read concern.
    pub fn local() -> Self {
        Self {
            level: ReadConcernLevel::Local,
        }
    }

    /// A `majority` read concern.
    pub fn majority() -> Self {
        Self {
            level: ReadConcernLevel::Majority,
        }
    }

    /// A `linearizable` read concern.
    pub fn linearizable() -> Self {
        Self {
            level: ReadConcernLevel::Linearizable,
        }
    }

    /// An `available` read concern.
    pub fn available() -> Self {
        Self {
            level: ReadConcernLevel::Available,
        }
    }

    /// A `snapshot` read concern.
    pub fn snapshot() -> Self {
        Self {
            level: ReadConcernLevel::Snapshot,
        }
    }

    pub(crate) fn to_document(&self) -> Document {
        let level = match self.level {
            ReadConcernLevel::Local => "local",
            ReadConcernLevel::Majority => "majority",
            ReadConcernLevel::Linearizable => "linearizable",
            ReadConcernLevel::Available => "available",
            ReadConcernLevel::Snapshot => "snapshot",
        };
        doc! { "level": level }
    }
}

/// The level of acknowledgment requested from the server for write
/// operations.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Acknowledgment {
    /// Acknowledgment from the given number of nodes.
    Nodes(i32),
    /// Acknowledgment from a majority of the replica set.
    Majority,
    /// A custom write concern mode defined in the replica set
    /// configuration.
    Custom(String),
}

impl From<i32> for Acknowledgment {
    fn from(i: i32) -> Self {
        Acknowledgment::Nodes(i)
    }
}

impl From<String> for Acknowledgment {
    fn from(s: String) -> Self {
        if s == "majority" {
            Acknowledgment::Majority
        } else {
            Acknowledgment::Custom(s)
        }
    }
}

impl Acknowledgment {
    fn to_bson(&self) -> Bson {
        match *self {
            Acknowledgment::Nodes(i) => Bson::Int32(i),
            Acknowledgment::Majority => Bson::String("majority".to_string()),
            Acknowledgment::Custom(ref s) => Bson::String(s.clone()),
        }
    }
}

/// Specifies the durability requested from the server for write operations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteConcern {
    /// The requested acknowledgment.
    pub w: Option<Acknowledgment>,

    /// The time limit, in milliseconds, for satisfying the write concern.
    pub w_timeout_ms: Option<u64>,

    /// Whether the server should wait for the on-disk journal before
    /// acknowledging.
    pub journal: Option<bool>,
}

impl WriteConcern {
    /// A majority write concern.
    pub fn majority() -> Self {
        Self {
            w: Some(Acknowledgment::Majority),
            ..Default::default()
        }
    }

    /// Whether this write concern requests any acknowledgment at all.
    pub fn is_acknowledged(&self) -> bool {
        !matches!(self.w, Some(Acknowledgment::Nodes(0)))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.w.is_none() && self.w_timeout_ms.is_none() && self.journal.is_none()
    }

    pub(crate) fn to_document(&self) -> Document {
        let mut doc = Document::new();
        if let Some(ref w) = self.w {
            doc.insert("w", w.to_bson());
        }
        if let Some(w_timeout_ms) = self.w_timeout_ms {
            doc.insert("wtimeout", w_timeout_ms as i64);
        }
        if let Some(journal) = self.journal {
            doc.insert("j", journal);
        }
        doc
    }
}

#[cfg(test)]
mod test {
    use bson::doc;
    use pretty_assertions::assert_eq;

    use super::{Acknowledgment, ReadConcern, WriteConcern};

    #[test]
    fn read_concern_document() {
        assert_eq!(ReadConcern::snapshot().to_document(), doc! { "level": "snapshot" });
        assert_eq!(ReadConcern::majority().to_document(), doc! { "level": "majority" });
    }

    #[test]
    fn write_concern_document() {
        let wc = WriteConcern {
            w: Some(Acknowledgment::Majority),
            w_timeout_ms: Some(100),
            journal: Some(true),
        };
        assert_eq!(
            wc.to_document(),
            doc! { "w": "majority", "wtimeout": 100_i64, "j": true }
        );
    }

    #[test]
    fn unacknowledged() {
        let wc = WriteConcern {
            w: Some(Acknowledgment::Nodes(0)),
            ..Default::default()
        };
        assert!(!wc.is_acknowledged());
        assert!(WriteConcern::default().is_acknowledged());
    }
}
