use super::Compressor;
use crate::error::Result;

/// Compresses an outgoing message body with the negotiated algorithm.
pub(crate) fn compress_message(message: &[u8], compressor: Compressor) -> Result<Vec<u8>> {
    match compressor {
        #[cfg(feature = "zstd-compression")]
        Compressor::Zstd => compress_zstd(message),
        #[cfg(feature = "zlib-compression")]
        Compressor::Zlib => compress_zlib(message),
        #[cfg(feature = "snappy-compression")]
        Compressor::Snappy => compress_snappy(message),
        #[allow(unreachable_patterns)]
        _ => {
            let _ = message;
            unreachable!("compressor variants are feature-gated at construction")
        }
    }
}

#[cfg(feature = "zstd-compression")]
fn compress_zstd(message: &[u8]) -> Result<Vec<u8>> {
    let mut compressed = Vec::new();
    zstd::stream::copy_encode(message, &mut compressed, zstd::DEFAULT_COMPRESSION_LEVEL).map_err(
        |error| {
            crate::error::Error::internal(format!("could not compress message with zstd: {}", error))
        },
    )?;
    Ok(compressed)
}

#[cfg(feature = "zlib-compression")]
fn compress_zlib(message: &[u8]) -> Result<Vec<u8>> {
    use std::io::Write;

    use flate2::{write::ZlibEncoder, Compression};

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(message)?;
    Ok(encoder.finish()?)
}

#[cfg(feature = "snappy-compression")]
fn compress_snappy(message: &[u8]) -> Result<Vec<u8>> {
    use snap::raw::Encoder;

    let mut encoder = Encoder::new();
    encoder.compress_vec(message).map_err(|error| {
        crate::error::Error::internal(format!("could not compress message with snappy: {}", error))
    })
}
