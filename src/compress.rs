//! Block compression with silent fallback.
//!
//! A block is stored compressed only when the compressed form saves at
//! least 12.5% over the raw bytes; otherwise it is stored as-is and the
//! trailer records `NoCompression`. Builds without the `snappy`/`zstd`
//! features degrade to stored blocks the same way.

use crate::error::LsmLiteError;
use crate::options::CompressionType;
use crate::Result;

/// Try to compress `raw` as requested.
///
/// Returns the compression type actually chosen and, when it differs from
/// `NoCompression`, the compressed bytes.
pub(crate) fn maybe_compress(
    requested: CompressionType,
    zstd_level: i32,
    raw: &[u8],
) -> (CompressionType, Option<Vec<u8>>) {
    match requested {
        CompressionType::NoCompression => (CompressionType::NoCompression, None),
        CompressionType::Snappy => {
            #[cfg(feature = "snappy")]
            {
                let mut encoder = snap::raw::Encoder::new();
                if let Ok(compressed) = encoder.compress_vec(raw) {
                    if worthwhile(raw.len(), compressed.len()) {
                        return (CompressionType::Snappy, Some(compressed));
                    }
                }
            }
            (CompressionType::NoCompression, None)
        }
        CompressionType::Zstd => {
            #[cfg(feature = "zstd")]
            {
                if let Ok(compressed) = zstd::stream::encode_all(raw, zstd_level) {
                    if worthwhile(raw.len(), compressed.len()) {
                        return (CompressionType::Zstd, Some(compressed));
                    }
                }
            }
            let _ = zstd_level;
            (CompressionType::NoCompression, None)
        }
    }
}

fn worthwhile(raw_len: usize, compressed_len: usize) -> bool {
    compressed_len < raw_len - raw_len / 8
}

/// Expand a block read from disk according to its trailer type byte.
pub(crate) fn decompress(ctype: CompressionType, data: &[u8]) -> Result<Vec<u8>> {
    match ctype {
        CompressionType::NoCompression => Ok(data.to_vec()),
        CompressionType::Snappy => {
            #[cfg(feature = "snappy")]
            return snap::raw::Decoder::new().decompress_vec(data).map_err(|_| {
                LsmLiteError::Corruption("corrupted snappy compressed block".into())
            });
            #[cfg(not(feature = "snappy"))]
            return Err(LsmLiteError::NotSupported(
                "snappy support not compiled in".into(),
            ));
        }
        CompressionType::Zstd => {
            #[cfg(feature = "zstd")]
            return zstd::stream::decode_all(data).map_err(|_| {
                LsmLiteError::Corruption("corrupted zstd compressed block".into())
            });
            #[cfg(not(feature = "zstd"))]
            return Err(LsmLiteError::NotSupported(
                "zstd support not compiled in".into(),
            ));
        }
    }
}
