//! Read side of the sorted block format.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::coding::{decode_fixed32, decode_varint32};
use crate::comparator::Comparator;
use crate::error::LsmLiteError;
use crate::iterator::Iter;
use crate::Result;

/// Immutable, restart-indexed run of key/value entries.
///
/// Owns its backing bytes; iterators share the block through an `Arc` so
/// a block outlives every iterator over it.
pub struct Block {
    data: Vec<u8>,
    /// Byte offset where the restart array begins.
    restart_offset: usize,
    num_restarts: u32,
    /// Trailer did not parse; iterators surface `Corruption`.
    malformed: bool,
}

impl Block {
    /// Takes ownership of the block contents (trailer included).
    ///
    /// A block whose trailer encodes zero restart points is treated as
    /// empty rather than rejected; foreign writers produce such blocks.
    pub fn new(data: Vec<u8>) -> Block {
        let mut block = Block {
            data,
            restart_offset: 0,
            num_restarts: 0,
            malformed: true,
        };
        if block.data.len() >= 4 {
            let num_restarts = decode_fixed32(&block.data[block.data.len() - 4..]);
            let max_restarts = ((block.data.len() - 4) / 4) as u32;
            if num_restarts <= max_restarts {
                block.num_restarts = num_restarts;
                block.restart_offset = block.data.len() - 4 - 4 * num_restarts as usize;
                block.malformed = false;
            }
        }
        block
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn iter(self: &Arc<Block>, cmp: Arc<dyn Comparator>) -> BlockIter {
        let err = if self.malformed {
            Some(LsmLiteError::Corruption("bad block contents".into()))
        } else {
            None
        };
        BlockIter {
            current: self.restart_offset,
            restart_index: self.num_restarts,
            value_start: self.restart_offset,
            value_len: 0,
            key: Vec::new(),
            block: self.clone(),
            cmp,
            err,
        }
    }
}

pub struct BlockIter {
    block: Arc<Block>,
    cmp: Arc<dyn Comparator>,
    /// Offset of the current entry; `== restart_offset` when not valid.
    current: usize,
    /// Restart block containing the current entry.
    restart_index: u32,
    key: Vec<u8>,
    value_start: usize,
    value_len: usize,
    err: Option<LsmLiteError>,
}

/// Decode the header of the entry at `offset`.
///
/// Returns (shared, non_shared, value_len, header_len), or `None` when
/// the entry is truncated or overruns the entry region.
fn decode_entry(data: &[u8], offset: usize, limit: usize) -> Option<(usize, usize, usize, usize)> {
    // A corrupt restart offset can point past the entry region.
    if offset > limit || limit > data.len() {
        return None;
    }
    let region = &data[offset..limit];
    let (shared, n1) = decode_varint32(region)?;
    let (non_shared, n2) = decode_varint32(&region[n1..])?;
    let (value_len, n3) = decode_varint32(&region[n1 + n2..])?;
    let header_len = n1 + n2 + n3;
    let total = header_len
        .checked_add(non_shared as usize)?
        .checked_add(value_len as usize)?;
    if total > region.len() {
        return None;
    }
    Some((
        shared as usize,
        non_shared as usize,
        value_len as usize,
        header_len,
    ))
}

impl BlockIter {
    #[inline]
    fn restart_point(&self, index: u32) -> usize {
        debug_assert!(index < self.block.num_restarts);
        decode_fixed32(&self.block.data[self.block.restart_offset + 4 * index as usize..]) as usize
    }

    #[inline]
    fn next_entry_offset(&self) -> usize {
        self.value_start + self.value_len
    }

    fn seek_to_restart_point(&mut self, index: u32) {
        self.key.clear();
        self.restart_index = index;
        // Park just before the region's first entry; parse_next_key picks
        // it up from here.
        self.value_start = self.restart_point(index);
        self.value_len = 0;
    }

    fn mark_exhausted(&mut self) {
        self.current = self.block.restart_offset;
        self.restart_index = self.block.num_restarts;
    }

    fn corruption_error(&mut self) {
        self.mark_exhausted();
        self.key.clear();
        self.value_start = self.block.restart_offset;
        self.value_len = 0;
        self.err = Some(LsmLiteError::Corruption("bad entry in block".into()));
    }

    fn parse_next_key(&mut self) -> bool {
        self.current = self.next_entry_offset();
        if self.current >= self.block.restart_offset {
            // No more entries; mark invalid without an error.
            self.mark_exhausted();
            return false;
        }
        match decode_entry(&self.block.data, self.current, self.block.restart_offset) {
            Some((shared, non_shared, value_len, header_len)) if shared <= self.key.len() => {
                let suffix_start = self.current + header_len;
                self.key.truncate(shared);
                self.key
                    .extend_from_slice(&self.block.data[suffix_start..suffix_start + non_shared]);
                self.value_start = suffix_start + non_shared;
                self.value_len = value_len;
                while self.restart_index + 1 < self.block.num_restarts
                    && self.restart_point(self.restart_index + 1) < self.current
                {
                    self.restart_index += 1;
                }
                true
            }
            _ => {
                self.corruption_error();
                false
            }
        }
    }
}

impl Iter for BlockIter {
    fn valid(&self) -> bool {
        self.err.is_none() && self.current < self.block.restart_offset
    }

    fn seek_to_first(&mut self) {
        if self.err.is_some() {
            return;
        }
        if self.block.num_restarts == 0 {
            self.mark_exhausted();
            return;
        }
        self.seek_to_restart_point(0);
        self.parse_next_key();
    }

    fn seek_to_last(&mut self) {
        if self.err.is_some() {
            return;
        }
        if self.block.num_restarts == 0 {
            self.mark_exhausted();
            return;
        }
        self.seek_to_restart_point(self.block.num_restarts - 1);
        while self.parse_next_key() && self.next_entry_offset() < self.block.restart_offset {
            // Keep skipping until we hit the tail of the block.
        }
    }

    fn seek(&mut self, target: &[u8]) {
        if self.err.is_some() {
            return;
        }
        if self.block.num_restarts == 0 {
            self.mark_exhausted();
            return;
        }
        // Binary search over restart points for the last region whose
        // first key is < target. Restart keys are self-contained.
        let mut left: u32 = 0;
        let mut right: u32 = self.block.num_restarts - 1;
        while left < right {
            let mid = (left + right + 1) / 2;
            let region_offset = self.restart_point(mid);
            match decode_entry(&self.block.data, region_offset, self.block.restart_offset) {
                Some((0, non_shared, _value_len, header_len)) => {
                    let key_start = region_offset + header_len;
                    let mid_key = &self.block.data[key_start..key_start + non_shared];
                    if self.cmp.compare(mid_key, target) == Ordering::Less {
                        left = mid;
                    } else {
                        right = mid - 1;
                    }
                }
                _ => {
                    self.corruption_error();
                    return;
                }
            }
        }
        // Linear scan inside the region for the first key >= target.
        self.seek_to_restart_point(left);
        loop {
            if !self.parse_next_key() {
                return;
            }
            if self.cmp.compare(&self.key, target) != Ordering::Less {
                return;
            }
        }
    }

    fn next(&mut self) {
        debug_assert!(self.valid());
        self.parse_next_key();
    }

    fn prev(&mut self) {
        debug_assert!(self.valid());
        // Back up to the restart point strictly before the current entry.
        let original = self.current;
        while self.restart_point(self.restart_index) >= original {
            if self.restart_index == 0 {
                // The current entry was the first in the block.
                self.mark_exhausted();
                self.key.clear();
                self.value_start = self.block.restart_offset;
                self.value_len = 0;
                return;
            }
            self.restart_index -= 1;
        }
        self.seek_to_restart_point(self.restart_index);
        // Scan forward until we land on the entry before `original`.
        while self.parse_next_key() && self.next_entry_offset() < original {}
    }

    fn key(&self) -> &[u8] {
        debug_assert!(self.valid());
        &self.key
    }

    fn value(&self) -> &[u8] {
        debug_assert!(self.valid());
        &self.block.data[self.value_start..self.value_start + self.value_len]
    }

    fn status(&self) -> Result<()> {
        match &self.err {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}
