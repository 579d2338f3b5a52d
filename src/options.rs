//! Tuning knobs consumed by block and table builders and readers.

use std::sync::Arc;

use crate::comparator::{BytewiseComparator, Comparator};
use crate::filter::FilterPolicy;

/// Compression applied to each block, recorded in its on-disk trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionType {
    NoCompression = 0,
    Snappy = 1,
    Zstd = 2,
}

impl CompressionType {
    pub(crate) fn from_u8(byte: u8) -> Option<CompressionType> {
        match byte {
            0 => Some(CompressionType::NoCompression),
            1 => Some(CompressionType::Snappy),
            2 => Some(CompressionType::Zstd),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct Options {
    /// Ordering of user keys within blocks and tables.
    pub comparator: Arc<dyn Comparator>,

    /// Target size of an uncompressed data block.
    pub block_size: usize,

    /// Number of keys between restart points within a block.
    pub block_restart_interval: usize,

    /// Compression requested for data blocks. Falls back to
    /// [`CompressionType::NoCompression`] per block when the compressed
    /// form is not a net win or support is not compiled in.
    pub compression: CompressionType,

    /// Level passed to the zstd encoder when `compression` is `Zstd`.
    pub zstd_compression_level: i32,

    /// Optional policy for per-table filter blocks.
    pub filter_policy: Option<Arc<dyn FilterPolicy>>,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            comparator: Arc::new(BytewiseComparator),
            block_size: 4096,
            block_restart_interval: 16,
            compression: CompressionType::Snappy,
            zstd_compression_level: 1,
            filter_policy: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    /// Verify the checksum of every block read against its trailer.
    pub verify_checksums: bool,

    /// Whether blocks read for this operation should be retained by a
    /// block cache layered above the table.
    pub fill_cache: bool,
}

impl Default for ReadOptions {
    fn default() -> ReadOptions {
        ReadOptions {
            verify_checksums: false,
            fill_cache: true,
        }
    }
}
