//! Wire protocol version negotiation.
//!
//! Servers advertise a numeric `maxWireVersion` in their handshake reply;
//! the driver maps it onto the closed set of versions it knows how to speak
//! and gates version-dependent features on the result.

use serde::Deserialize;

/// A MongoDB wire protocol version, ordered by numeric protocol level.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum WireVersion {
    /// MongoDB 3.0 (protocol level 3).
    V3_0,
    /// MongoDB 3.2 (protocol level 4).
    V3_2,
    /// MongoDB 3.4 (protocol level 5).
    V3_4,
    /// MongoDB 3.6 (protocol level 6).
    V3_6,
    /// MongoDB 4.0 (protocol level 7).
    V4_0,
    /// MongoDB 4.2 (protocol level 8).
    V4_2,
    /// MongoDB 5.0 (protocol level 13).
    V5_0,
    /// MongoDB 5.1 (protocol level 14).
    V5_1,
    /// MongoDB 6.0 (protocol level 17).
    V6_0,
    /// MongoDB 7.0 (protocol level 21).
    V7_0,
    /// MongoDB 7.1 (protocol level 22).
    V7_1,
    /// MongoDB 7.2 (protocol level 23).
    V7_2,
    /// MongoDB 7.3 (protocol level 24).
    V7_3,
    /// MongoDB 8.0 (protocol level 25).
    V8_0,
}

impl WireVersion {
    const ALL: &'static [WireVersion] = &[
        WireVersion::V3_0,
        WireVersion::V3_2,
        WireVersion::V3_4,
        WireVersion::V3_6,
        WireVersion::V4_0,
        WireVersion::V4_2,
        WireVersion::V5_0,
        WireVersion::V5_1,
        WireVersion::V6_0,
        WireVersion::V7_0,
        WireVersion::V7_1,
        WireVersion::V7_2,
        WireVersion::V7_3,
        WireVersion::V8_0,
    ];

    /// The numeric protocol level advertised for this version.
    pub fn level(self) -> i32 {
        match self {
            WireVersion::V3_0 => 3,
            WireVersion::V3_2 => 4,
            WireVersion::V3_4 => 5,
            WireVersion::V3_6 => 6,
            WireVersion::V4_0 => 7,
            WireVersion::V4_2 => 8,
            WireVersion::V5_0 => 13,
            WireVersion::V5_1 => 14,
            WireVersion::V6_0 => 17,
            WireVersion::V7_0 => 21,
            WireVersion::V7_1 => 22,
            WireVersion::V7_2 => 23,
            WireVersion::V7_3 => 24,
            WireVersion::V8_0 => 25,
        }
    }

    /// Maps an arbitrary advertised protocol level onto the nearest known
    /// version, rounding down. Levels below 3.2 coerce to 3.0.
    pub fn coerce(level: i32) -> WireVersion {
        let mut result = WireVersion::V3_0;
        for &version in Self::ALL {
            if version.level() <= level {
                result = version;
            } else {
                break;
            }
        }
        result
    }

    /// Whether command traffic should be framed as OP_MSG rather than the
    /// legacy OP_QUERY pair.
    pub(crate) fn supports_op_msg(self) -> bool {
        self >= WireVersion::V3_6
    }

    /// Whether the server understands logical sessions (`lsid`).
    pub(crate) fn supports_sessions(self) -> bool {
        self >= WireVersion::V3_6
    }

    /// Whether the server understands multi-document transactions.
    pub(crate) fn supports_transactions(self) -> bool {
        self >= WireVersion::V4_0
    }
}
