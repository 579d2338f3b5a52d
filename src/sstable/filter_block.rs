//! Per-table filter block: one filter per window of data-block offsets.
//!
//! ```text
//! +--------------------------------------------------------------+
//! | filter 1 | filter 2 | ... | offset array | array offset | lg |
//! +--------------------------------------------------------------+
//! \-------- bit arrays -------/\- u32 each -/\---- u32 ----/ u8
//! ```
//!
//! Filter i covers the data blocks whose file offset falls in
//! `[i << base_lg, (i + 1) << base_lg)`; the default window is 2 KiB.

use std::sync::Arc;

use crate::coding::{decode_fixed32, encode_fixed32};
use crate::filter::FilterPolicy;

/// Generate a new filter every 2 KiB of data-block offsets.
const FILTER_BASE_LG: usize = 11;
const FILTER_BASE: u64 = 1 << FILTER_BASE_LG;

pub struct FilterBlockBuilder {
    policy: Arc<dyn FilterPolicy>,
    /// Keys accumulated for the pending window.
    keys: Vec<Vec<u8>>,
    /// Concatenated filter bit arrays so far.
    result: Vec<u8>,
    filter_offsets: Vec<u32>,
}

impl FilterBlockBuilder {
    pub fn new(policy: Arc<dyn FilterPolicy>) -> FilterBlockBuilder {
        FilterBlockBuilder {
            policy,
            keys: Vec::new(),
            result: Vec::new(),
            filter_offsets: Vec::new(),
        }
    }

    /// Announce that the next data block starts at `block_offset`.
    /// Windows skipped since the previous call yield empty filters.
    pub fn start_block(&mut self, block_offset: u64) {
        let filter_index = (block_offset / FILTER_BASE) as usize;
        debug_assert!(filter_index >= self.filter_offsets.len());
        while filter_index > self.filter_offsets.len() {
            self.generate_filter();
        }
    }

    pub fn add_key(&mut self, key: &[u8]) {
        self.keys.push(key.to_vec());
    }

    pub fn finish(&mut self) -> &[u8] {
        if !self.keys.is_empty() {
            self.generate_filter();
        }
        let array_offset = self.result.len() as u32;
        let offsets = std::mem::take(&mut self.filter_offsets);
        for offset in offsets {
            encode_fixed32(&mut self.result, offset);
        }
        encode_fixed32(&mut self.result, array_offset);
        self.result.push(FILTER_BASE_LG as u8);
        &self.result
    }

    fn generate_filter(&mut self) {
        self.filter_offsets.push(self.result.len() as u32);
        if self.keys.is_empty() {
            // Fast path: an empty window keeps the previous offset and
            // produces a zero-length filter.
            return;
        }
        let key_slices: Vec<&[u8]> = self.keys.iter().map(|k| k.as_slice()).collect();
        self.policy.create_filter(&key_slices, &mut self.result);
        self.keys.clear();
    }
}

pub struct FilterBlockReader {
    policy: Arc<dyn FilterPolicy>,
    data: Vec<u8>,
    /// Start of the offset array inside `data`.
    offsets_start: usize,
    num_filters: usize,
    base_lg: usize,
}

impl FilterBlockReader {
    /// A contents slice that does not parse produces a reader that never
    /// excludes a block.
    pub fn new(policy: Arc<dyn FilterPolicy>, data: Vec<u8>) -> FilterBlockReader {
        let mut reader = FilterBlockReader {
            policy,
            data: Vec::new(),
            offsets_start: 0,
            num_filters: 0,
            base_lg: 0,
        };
        if data.len() < 5 {
            // 1 byte base_lg plus 4 for the array offset.
            return reader;
        }
        let base_lg = data[data.len() - 1] as usize;
        let array_offset = decode_fixed32(&data[data.len() - 5..]) as usize;
        if array_offset > data.len() - 5 {
            return reader;
        }
        reader.base_lg = base_lg;
        reader.num_filters = (data.len() - 5 - array_offset) / 4;
        reader.offsets_start = array_offset;
        reader.data = data;
        reader
    }

    pub fn key_may_match(&self, block_offset: u64, key: &[u8]) -> bool {
        let index = (block_offset >> self.base_lg) as usize;
        if index >= self.num_filters {
            // Errors are treated as potential matches.
            return true;
        }
        let start = decode_fixed32(&self.data[self.offsets_start + index * 4..]) as usize;
        let limit = if index + 1 < self.num_filters {
            decode_fixed32(&self.data[self.offsets_start + (index + 1) * 4..]) as usize
        } else {
            self.offsets_start
        };
        if start > limit || limit > self.offsets_start {
            return true;
        }
        if start == limit {
            // Empty filters do not match any keys.
            return false;
        }
        self.policy.key_may_match(key, &self.data[start..limit])
    }
}
