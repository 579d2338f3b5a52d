use crate::coding::{decode_fixed64, decode_varint64, encode_fixed64, encode_varint64};
use crate::error::LsmLiteError;
use crate::Result;

pub const TABLE_MAGIC_NUMBER: u64 = 0xdb4775248b80fb57;

/// Two varint64s.
pub const MAX_ENCODED_HANDLE_LENGTH: usize = 10 + 10;

/// Two padded block handles plus the magic number.
pub const FOOTER_ENCODED_LENGTH: usize = 2 * MAX_ENCODED_HANDLE_LENGTH + 8;

/// Location of a block inside the table file. The size excludes the
/// 5-byte trailer stored after the block body.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockHandle {
    offset: u64,
    size: u64,
}

impl BlockHandle {
    pub fn new(offset: u64, size: u64) -> BlockHandle {
        BlockHandle { offset, size }
    }

    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        encode_varint64(dst, self.offset);
        encode_varint64(dst, self.size);
    }

    /// Decode a handle from the front of `bytes`, returning it and the
    /// number of bytes consumed.
    pub fn decode_from(bytes: &[u8]) -> Result<(BlockHandle, usize)> {
        let (offset, n1) = decode_varint64(bytes)
            .ok_or_else(|| LsmLiteError::Corruption("bad block handle".into()))?;
        let (size, n2) = decode_varint64(&bytes[n1..])
            .ok_or_else(|| LsmLiteError::Corruption("bad block handle".into()))?;
        Ok((BlockHandle::new(offset, size), n1 + n2))
    }
}

/// Fixed-size trailer at the very end of a table file, locating the
/// meta-index and index blocks.
#[derive(Debug, Default, Clone, Copy)]
pub struct Footer {
    pub metaindex_handle: BlockHandle,
    pub index_handle: BlockHandle,
}

impl Footer {
    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        let original_len = dst.len();
        self.metaindex_handle.encode_to(dst);
        self.index_handle.encode_to(dst);
        // Pad the handle area to its maximum encoded length.
        dst.resize(original_len + 2 * MAX_ENCODED_HANDLE_LENGTH, 0);
        encode_fixed64(dst, TABLE_MAGIC_NUMBER);
        debug_assert_eq!(dst.len() - original_len, FOOTER_ENCODED_LENGTH);
    }

    pub fn decode_from(bytes: &[u8]) -> Result<Footer> {
        if bytes.len() < FOOTER_ENCODED_LENGTH {
            return Err(LsmLiteError::Corruption("truncated table footer".into()));
        }
        let magic = decode_fixed64(&bytes[FOOTER_ENCODED_LENGTH - 8..]);
        if magic != TABLE_MAGIC_NUMBER {
            return Err(LsmLiteError::Corruption(
                "not an sstable (bad magic number)".into(),
            ));
        }
        let (metaindex_handle, consumed) = BlockHandle::decode_from(bytes)?;
        let (index_handle, _) = BlockHandle::decode_from(&bytes[consumed..])?;
        Ok(Footer {
            metaindex_handle,
            index_handle,
        })
    }
}
