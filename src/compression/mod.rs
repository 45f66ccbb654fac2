//! Wire message compression.
//!
//! When the handshake reply advertises compressors the client also offered,
//! command traffic after the handshake is wrapped in OP_COMPRESSED frames.
//! Each algorithm requires enabling a corresponding cargo feature.

mod compress;
mod decompress;

use std::str::FromStr;

use crate::error::{Error, ProtocolError, Result};

pub(crate) use self::{compress::compress_message, decompress::decompress_message};

pub(crate) const NOOP_COMPRESSOR_ID: u8 = 0;
#[cfg(feature = "snappy-compression")]
pub(crate) const SNAPPY_COMPRESSOR_ID: u8 = 1;
#[cfg(feature = "zlib-compression")]
pub(crate) const ZLIB_COMPRESSOR_ID: u8 = 2;
#[cfg(feature = "zstd-compression")]
pub(crate) const ZSTD_COMPRESSOR_ID: u8 = 3;

/// The compressors that may be used to compress messages sent to and
/// decompress messages returned from the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Compressor {
    /// `zstd` compression.
    #[cfg(feature = "zstd-compression")]
    Zstd,
    /// `zlib` compression.
    #[cfg(feature = "zlib-compression")]
    Zlib,
    /// `snappy` compression.
    #[cfg(feature = "snappy-compression")]
    Snappy,
}

impl Compressor {
    /// The name used in the handshake's `compression` array.
    pub fn name(&self) -> &'static str {
        match *self {
            #[cfg(feature = "zstd-compression")]
            Compressor::Zstd => "zstd",
            #[cfg(feature = "zlib-compression")]
            Compressor::Zlib => "zlib",
            #[cfg(feature = "snappy-compression")]
            Compressor::Snappy => "snappy",
        }
    }

    /// The algorithm id declared in OP_COMPRESSED frames.
    pub(crate) fn id(&self) -> u8 {
        match *self {
            #[cfg(feature = "zstd-compression")]
            Compressor::Zstd => ZSTD_COMPRESSOR_ID,
            #[cfg(feature = "zlib-compression")]
            Compressor::Zlib => ZLIB_COMPRESSOR_ID,
            #[cfg(feature = "snappy-compression")]
            Compressor::Snappy => SNAPPY_COMPRESSOR_ID,
        }
    }

    /// Picks the first compressor in the caller's declared preference order
    /// that the server also advertises.
    pub(crate) fn negotiate(preference: &[Compressor], advertised: &[String]) -> Option<Compressor> {
        preference
            .iter()
            .copied()
            .find(|c| advertised.iter().any(|name| name == c.name()))
    }
}

impl FromStr for Compressor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            #[cfg(feature = "zstd-compression")]
            "zstd" => Ok(Compressor::Zstd),
            #[cfg(feature = "zlib-compression")]
            "zlib" => Ok(Compressor::Zlib),
            #[cfg(feature = "snappy-compression")]
            "snappy" => Ok(Compressor::Snappy),
            other => Err(Error::invalid_argument(format!(
                "unsupported or disabled compressor: {}",
                other
            ))),
        }
    }
}

/// Maps an algorithm id from an incoming frame to a decompression routine,
/// rejecting ids the build does not support.
pub(crate) fn validate_compressor_id(id: u8) -> Result<()> {
    match id {
        NOOP_COMPRESSOR_ID => Ok(()),
        #[cfg(feature = "snappy-compression")]
        SNAPPY_COMPRESSOR_ID => Ok(()),
        #[cfg(feature = "zlib-compression")]
        ZLIB_COMPRESSOR_ID => Ok(()),
        #[cfg(feature = "zstd-compression")]
        ZSTD_COMPRESSOR_ID => Ok(()),
        other => Err(ProtocolError::Codec(format!(
            "unsupported compressor id in reply: {}",
            other
        ))
        .into()),
    }
}
