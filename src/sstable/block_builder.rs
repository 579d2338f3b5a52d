//! Builder for sorted, prefix-compressed, restart-indexed blocks.
//!
//! ```text
//! +---------------------------------------------------------------+
//! | Entry 1 | Entry 2 | ... | Entry n | restart array | count u32 |
//! +---------------------------------------------------------------+
//! ```
//!
//! Each entry stores the byte count it shares with the previous key and
//! only the unshared tail:
//!
//! ```text
//! +------------+--------------+-----------+------------+-----------+
//! | shared     | unshared     | value len | key suffix | value     |
//! +------------+--------------+-----------+------------+-----------+
//! \- varint32 -/\- varint32 --/\ varint32 /  var-len      var-len
//! ```
//!
//! Every `restart_interval`-th entry is written with `shared = 0` and its
//! offset recorded in the restart array, anchoring binary search.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::coding::{encode_fixed32, encode_varint32};
use crate::comparator::Comparator;

pub struct BlockBuilder {
    block_restart_interval: usize,
    cmp: Arc<dyn Comparator>,
    buffer: Vec<u8>,
    /// Offsets of restart points, always starting with 0.
    restarts: Vec<u32>,
    /// Entries emitted since the last restart point.
    counter: usize,
    finished: bool,
    last_key: Vec<u8>,
}

impl BlockBuilder {
    pub fn new(block_restart_interval: usize, cmp: Arc<dyn Comparator>) -> BlockBuilder {
        debug_assert!(block_restart_interval >= 1);
        BlockBuilder {
            block_restart_interval,
            cmp,
            buffer: Vec::new(),
            restarts: vec![0],
            counter: 0,
            finished: false,
            last_key: Vec::new(),
        }
    }

    /// Discard all buffered state so the builder can start a new block.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.restarts.clear();
        self.restarts.push(0);
        self.counter = 0;
        self.finished = false;
        self.last_key.clear();
    }

    /// Append an entry. `key` must sort strictly after every previously
    /// added key, and `finish` must not have been called.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        debug_assert!(!self.finished);
        debug_assert!(self.counter <= self.block_restart_interval);
        debug_assert!(
            self.buffer.is_empty() || self.cmp.compare(key, &self.last_key) == Ordering::Greater,
            "keys added out of order"
        );

        let mut shared = 0;
        if self.counter < self.block_restart_interval {
            // See how much sharing to do with the previous key.
            let min_len = self.last_key.len().min(key.len());
            while shared < min_len && self.last_key[shared] == key[shared] {
                shared += 1;
            }
        } else {
            // Restart compression.
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
        }
        let non_shared = key.len() - shared;

        encode_varint32(&mut self.buffer, shared as u32);
        encode_varint32(&mut self.buffer, non_shared as u32);
        encode_varint32(&mut self.buffer, value.len() as u32);
        self.buffer.extend_from_slice(&key[shared..]);
        self.buffer.extend_from_slice(value);

        self.last_key.truncate(shared);
        self.last_key.extend_from_slice(&key[shared..]);
        debug_assert_eq!(self.last_key, key);
        self.counter += 1;
    }

    /// Append the restart array and count, returning the complete block.
    /// The builder holds the bytes until `reset`.
    pub fn finish(&mut self) -> &[u8] {
        for &restart in &self.restarts {
            encode_fixed32(&mut self.buffer, restart);
        }
        encode_fixed32(&mut self.buffer, self.restarts.len() as u32);
        self.finished = true;
        &self.buffer
    }

    /// Lower bound on the size of the finished block; monotone in the
    /// entries added.
    pub fn current_size_estimate(&self) -> usize {
        self.buffer.len() + self.restarts.len() * 4 + 4
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
