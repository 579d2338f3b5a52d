//! Sorted String Table, which is stored in disk.
//!
//! # SSTable
//!
//! ```text
//! +-------------------------+ (offset 0)
//! | Data Block 1            |<-+
//! +-------------------------+  |
//! | Data Block 2            |<-+
//! +-------------------------+  |
//! | ...                     |  |
//! +-------------------------+  |
//! | Data Block n            |<-+
//! +-------------------------+  |
//! | Filter Block (optional) |<---+
//! +-------------------------+  | |
//! | Meta-index Block        |----+
//! +-------------------------+  |
//! | Index Block             |--+
//! +-------------------------+
//! | Footer                  |
//! +-------------------------+
//! ```
//!
//! Every block is stored with a 5-byte trailer:
//!
//! ```text
//! +------------------+--------------+-------------------+
//! | block contents   | type: u8     | masked crc32c: u32|
//! +------------------+--------------+-------------------+
//! ```
//!
//! The type byte records the compression applied (0 = none, 1 = snappy,
//! 2 = zstd) and the CRC32C covers contents-as-stored plus the type byte.
//! Block bodies are the sorted, prefix-compressed, restart-indexed runs
//! described in [`block_builder`]; the index block maps separator keys to
//! the [`footer::BlockHandle`] of each data block, and the meta-index
//! maps `"filter.<policy name>"` to the filter block. All fixed-width
//! integers are little-endian.

pub mod block;
pub mod block_builder;
pub mod filter_block;
pub mod footer;
pub mod table;
pub mod table_builder;

use crate::compress;
use crate::env::RandomAccessFile;
use crate::error::LsmLiteError;
use crate::options::{CompressionType, ReadOptions};
use crate::Result;
use self::footer::BlockHandle;

/// Compression type byte plus masked CRC32C.
pub const BLOCK_TRAILER_SIZE: usize = 5;

const MASK_DELTA: u32 = 0xa282ead8;

/// Mask a CRC so that CRCs of byte strings containing embedded CRCs stay
/// well-distributed.
pub(crate) fn mask_crc(crc: u32) -> u32 {
    ((crc >> 15) | (crc << 17)).wrapping_add(MASK_DELTA)
}

pub(crate) fn unmask_crc(masked: u32) -> u32 {
    let rot = masked.wrapping_sub(MASK_DELTA);
    (rot >> 17) | (rot << 15)
}

/// Read one block (body plus trailer) and return its uncompressed
/// contents.
pub(crate) fn read_block<R: RandomAccessFile>(
    file: &R,
    options: &ReadOptions,
    handle: &BlockHandle,
) -> Result<Vec<u8>> {
    let body_len = handle.size() as usize;
    let mut buf = vec![0u8; body_len + BLOCK_TRAILER_SIZE];
    let read = file.read_at(&mut buf, handle.offset())?;
    if read != buf.len() {
        return Err(LsmLiteError::Corruption("truncated block read".into()));
    }

    let type_byte = buf[body_len];
    if options.verify_checksums {
        let expected = unmask_crc(crate::coding::decode_fixed32(&buf[body_len + 1..]));
        let actual = crc32c::crc32c(&buf[..body_len + 1]);
        if expected != actual {
            return Err(LsmLiteError::Corruption("block checksum mismatch".into()));
        }
    }

    let ctype = CompressionType::from_u8(type_byte)
        .ok_or_else(|| LsmLiteError::Corruption("bad block compression type".into()))?;
    match ctype {
        CompressionType::NoCompression => {
            buf.truncate(body_len);
            Ok(buf)
        }
        _ => compress::decompress(ctype, &buf[..body_len]),
    }
}
