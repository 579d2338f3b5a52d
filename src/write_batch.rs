//! Framed, replayable sequence of Put/Delete operations.
//!
//! ```text
//! +--------------+-------------+---------------------------------+
//! | sequence u64 | count u32   | records ...                     |
//! +--------------+-------------+---------------------------------+
//! ```
//!
//! Each record is `0x01 varlen(key) key varlen(value) value` for a Put
//! or `0x00 varlen(key) key` for a Delete. Records replay into a
//! memtable at sequence numbers `sequence, sequence+1, ...` in encoding
//! order. All fixed-width integers are little-endian.

use crate::coding::{decode_fixed32, decode_fixed64, get_length_prefixed_slice,
                    put_length_prefixed_slice};
use crate::error::LsmLiteError;
use crate::key_types::{SequenceNumber, ValueType, MAX_SEQUENCE_NUMBER};
use crate::memory::MemTable;
use crate::Result;

const HEADER_SIZE: usize = 12;

/// Callback invoked per record by [`WriteBatch::iterate`].
pub trait WriteBatchHandler {
    fn put(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}

pub struct WriteBatch {
    rep: Vec<u8>,
}

impl Default for WriteBatch {
    fn default() -> WriteBatch {
        WriteBatch::new()
    }
}

impl WriteBatch {
    pub fn new() -> WriteBatch {
        WriteBatch {
            rep: vec![0; HEADER_SIZE],
        }
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.set_count(self.count() + 1);
        self.rep.push(ValueType::Value as u8);
        put_length_prefixed_slice(&mut self.rep, key);
        put_length_prefixed_slice(&mut self.rep, value);
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.set_count(self.count() + 1);
        self.rep.push(ValueType::Deletion as u8);
        put_length_prefixed_slice(&mut self.rep, key);
    }

    /// Reset to an empty batch with zero count and sequence.
    pub fn clear(&mut self) {
        self.rep.clear();
        self.rep.resize(HEADER_SIZE, 0);
    }

    /// Current serialized size; non-decreasing as operations are added.
    pub fn approximate_size(&self) -> usize {
        self.rep.len()
    }

    /// Concatenate `other`'s records onto this batch. This batch's base
    /// sequence is preserved; `other`'s is discarded.
    pub fn append(&mut self, other: &WriteBatch) {
        self.set_count(self.count() + other.count());
        self.rep.extend_from_slice(&other.rep[HEADER_SIZE..]);
    }

    pub fn count(&self) -> u32 {
        decode_fixed32(&self.rep[8..HEADER_SIZE])
    }

    pub fn set_count(&mut self, count: u32) {
        self.rep[8..HEADER_SIZE].copy_from_slice(&count.to_le_bytes());
    }

    pub fn sequence(&self) -> SequenceNumber {
        decode_fixed64(&self.rep[..8])
    }

    pub fn set_sequence(&mut self, sequence: SequenceNumber) {
        debug_assert!(sequence <= MAX_SEQUENCE_NUMBER);
        self.rep[..8].copy_from_slice(&sequence.to_le_bytes());
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.rep
    }

    /// Replace the serialized representation wholesale, e.g. with bytes
    /// recovered from a log record.
    pub fn set_contents(&mut self, contents: &[u8]) {
        debug_assert!(contents.len() >= HEADER_SIZE);
        self.rep.clear();
        self.rep.extend_from_slice(contents);
    }

    /// Walk the records in encoding order, feeding each to `handler`.
    ///
    /// Fails with `Corruption` when a record cannot be parsed or the
    /// record count disagrees with the header; records preceding the
    /// failure have already been handed to `handler` by then.
    pub fn iterate<H: WriteBatchHandler>(&self, handler: &mut H) -> Result<()> {
        if self.rep.len() < HEADER_SIZE {
            return Err(LsmLiteError::Corruption(
                "malformed WriteBatch (too small)".into(),
            ));
        }
        let mut input = &self.rep[HEADER_SIZE..];
        let mut found: u32 = 0;
        while !input.is_empty() {
            let tag = input[0];
            input = &input[1..];
            match ValueType::from_u8(tag) {
                Some(ValueType::Value) => {
                    let (key, consumed) = get_length_prefixed_slice(input)
                        .ok_or_else(|| LsmLiteError::Corruption("bad WriteBatch Put".into()))?;
                    let rest = &input[consumed..];
                    let (value, consumed) = get_length_prefixed_slice(rest)
                        .ok_or_else(|| LsmLiteError::Corruption("bad WriteBatch Put".into()))?;
                    handler.put(key, value);
                    input = &rest[consumed..];
                }
                Some(ValueType::Deletion) => {
                    let (key, consumed) = get_length_prefixed_slice(input)
                        .ok_or_else(|| LsmLiteError::Corruption("bad WriteBatch Delete".into()))?;
                    handler.delete(key);
                    input = &input[consumed..];
                }
                None => {
                    return Err(LsmLiteError::Corruption("unknown WriteBatch tag".into()));
                }
            }
            found += 1;
        }
        if found != self.count() {
            return Err(LsmLiteError::Corruption("WriteBatch has wrong count".into()));
        }
        Ok(())
    }

    /// Replay this batch into `mem`, assigning sequence numbers
    /// `sequence(), sequence()+1, ...` in record order.
    ///
    /// On a parse failure every record preceding the bad one has been
    /// inserted and stays inserted.
    pub fn insert_into(&self, mem: &MemTable) -> Result<()> {
        let count = self.count() as u64;
        if count > 0 {
            let last = self.sequence().checked_add(count - 1);
            if last.map_or(true, |seq| seq > MAX_SEQUENCE_NUMBER) {
                return Err(LsmLiteError::InvalidArgument(
                    "write batch overflows the sequence number space".into(),
                ));
            }
        }
        let mut inserter = MemTableInserter {
            sequence: self.sequence(),
            mem,
        };
        self.iterate(&mut inserter)
    }
}

struct MemTableInserter<'a> {
    sequence: SequenceNumber,
    mem: &'a MemTable,
}

impl WriteBatchHandler for MemTableInserter<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.mem.add(self.sequence, ValueType::Value, key, value);
        self.sequence += 1;
    }

    fn delete(&mut self, key: &[u8]) {
        self.mem.add(self.sequence, ValueType::Deletion, key, b"");
        self.sequence += 1;
    }
}
