use std::sync::Arc;

use crate::coding::encode_fixed64;
use crate::collections::skip_list::skipmap::{Node, SkipMap};
use crate::error::LsmLiteError;
use crate::iterator::Iter;
use crate::key_types::{
    extract_user_key, pack_sequence_and_type, parse_internal_key, InternalKeyComparator,
    LookupKey, SequenceNumber, ValueType,
};
use crate::Result;

/// Write-side buffer: a sorted map from internal key to value bytes.
///
/// Entries arrive through [`MemTable::add`] with monotonically increasing
/// sequence numbers and are never removed; the table is made immutable by
/// convention once full, flushed to an sstable, and dropped when the last
/// `Arc` handle (including those held by iterators) goes away.
///
/// A single writer may `add` while readers run `get` and iterators
/// concurrently; writers must be serialized by the caller.
pub struct MemTable {
    cmp: InternalKeyComparator,
    table: SkipMap<InternalKeyComparator>,
}

impl MemTable {
    pub fn new(cmp: InternalKeyComparator) -> MemTable {
        MemTable {
            table: SkipMap::new(cmp.clone()),
            cmp,
        }
    }

    /// Insert an entry tagged (`sequence`, `value_type`). For a deletion,
    /// `value` is typically empty.
    pub fn add(
        &self,
        sequence: SequenceNumber,
        value_type: ValueType,
        user_key: &[u8],
        value: &[u8],
    ) {
        let mut internal_key = Vec::with_capacity(user_key.len() + 8);
        internal_key.extend_from_slice(user_key);
        encode_fixed64(&mut internal_key, pack_sequence_and_type(sequence, value_type));
        self.table.insert(internal_key, value.to_vec());
    }

    /// Point lookup at the sequence horizon captured in `key`.
    ///
    /// Returns `Some(Ok(value))` for a live entry, `Some(Err(KeyNotFound))`
    /// for a deletion tombstone, and `None` when this table holds nothing
    /// for the user key.
    pub fn get(&self, key: &LookupKey) -> Option<Result<Vec<u8>>> {
        let node = self.table.find_greater_or_equal(key.internal_key());
        if node.is_null() {
            return None;
        }
        let entry_key: &[u8] = unsafe { &(*node).key };
        let user_cmp = self.cmp.user_comparator();
        if user_cmp.compare(extract_user_key(entry_key), key.user_key())
            != std::cmp::Ordering::Equal
        {
            return None;
        }
        match parse_internal_key(entry_key).map(|parsed| parsed.value_type) {
            Some(ValueType::Value) => Some(Ok(unsafe { (*node).value.clone() })),
            Some(ValueType::Deletion) => Some(Err(LsmLiteError::KeyNotFound)),
            // add() only ever writes valid tags.
            None => unreachable!("malformed internal key in memtable"),
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Bytes consumed by entries so far; drives the flush decision of the
    /// layer above.
    pub fn approximate_memory_usage(&self) -> usize {
        self.table.approximate_memory_usage()
    }

    /// Iterator over internal keys. Holds a handle on the table, so the
    /// table outlives every iterator.
    pub fn iter(self: &Arc<MemTable>) -> MemTableIter {
        MemTableIter {
            mem: self.clone(),
            node: std::ptr::null_mut(),
        }
    }
}

pub struct MemTableIter {
    mem: Arc<MemTable>,
    node: *mut Node,
}

unsafe impl Send for MemTableIter {}

impl Iter for MemTableIter {
    fn valid(&self) -> bool {
        !self.node.is_null()
    }

    fn seek_to_first(&mut self) {
        self.node = self.mem.table.first();
    }

    fn seek_to_last(&mut self) {
        self.node = self.mem.table.last();
    }

    fn seek(&mut self, target: &[u8]) {
        self.node = self.mem.table.find_greater_or_equal(target);
    }

    fn next(&mut self) {
        debug_assert!(self.valid());
        self.node = unsafe { (*self.node).get_next(0) };
    }

    fn prev(&mut self) {
        debug_assert!(self.valid());
        let key: &[u8] = unsafe { &(*self.node).key };
        self.node = self.mem.table.find_less_than(key);
    }

    fn key(&self) -> &[u8] {
        debug_assert!(self.valid());
        unsafe { &(*self.node).key }
    }

    fn value(&self) -> &[u8] {
        debug_assert!(self.valid());
        unsafe { &(*self.node).value }
    }

    fn status(&self) -> Result<()> {
        Ok(())
    }
}

/// Projects an internal-key iterator down to user keys.
///
/// A malformed internal key surfaces as a `Corruption` status instead of
/// a panic, matching the table read path.
pub struct KeyConvertingIter<I: Iter> {
    inner: I,
    err: Option<LsmLiteError>,
}

impl<I: Iter> KeyConvertingIter<I> {
    pub fn new(inner: I) -> KeyConvertingIter<I> {
        KeyConvertingIter { inner, err: None }
    }

    fn check_key(&mut self) {
        if self.inner.valid() && parse_internal_key(self.inner.key()).is_none() {
            self.err = Some(LsmLiteError::Corruption(
                "malformed internal key".into(),
            ));
        }
    }
}

impl<I: Iter> Iter for KeyConvertingIter<I> {
    fn valid(&self) -> bool {
        self.err.is_none() && self.inner.valid()
    }

    fn seek_to_first(&mut self) {
        self.inner.seek_to_first();
        self.check_key();
    }

    fn seek_to_last(&mut self) {
        self.inner.seek_to_last();
        self.check_key();
    }

    fn seek(&mut self, target: &[u8]) {
        // Position at the newest entry for the target user key.
        let lookup = LookupKey::new(target, crate::key_types::MAX_SEQUENCE_NUMBER);
        self.inner.seek(lookup.internal_key());
        self.check_key();
    }

    fn next(&mut self) {
        self.inner.next();
        self.check_key();
    }

    fn prev(&mut self) {
        self.inner.prev();
        self.check_key();
    }

    fn key(&self) -> &[u8] {
        debug_assert!(self.valid());
        extract_user_key(self.inner.key())
    }

    fn value(&self) -> &[u8] {
        self.inner.value()
    }

    fn status(&self) -> Result<()> {
        match &self.err {
            Some(e) => Err(e.clone()),
            None => self.inner.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::BytewiseComparator;

    fn new_mem() -> Arc<MemTable> {
        Arc::new(MemTable::new(InternalKeyComparator::new(Arc::new(
            BytewiseComparator,
        ))))
    }

    #[test]
    fn test_add_and_get() {
        let mem = new_mem();
        mem.add(100, ValueType::Value, b"foo", b"bar");
        mem.add(101, ValueType::Value, b"hello", b"world");

        assert_eq!(
            mem.get(&LookupKey::new(b"foo", 200)).unwrap().unwrap(),
            b"bar".to_vec()
        );
        assert!(mem.get(&LookupKey::new(b"nope", 200)).is_none());

        // A lookup below the entry's sequence must not see it.
        assert!(mem.get(&LookupKey::new(b"foo", 99)).is_none());
    }

    #[test]
    fn test_tombstone() {
        let mem = new_mem();
        mem.add(10, ValueType::Value, b"key", b"v1");
        mem.add(11, ValueType::Deletion, b"key", b"");

        assert_eq!(
            mem.get(&LookupKey::new(b"key", 20)).unwrap().unwrap_err(),
            LsmLiteError::KeyNotFound
        );
        // Below the tombstone the old value is still visible.
        assert_eq!(
            mem.get(&LookupKey::new(b"key", 10)).unwrap().unwrap(),
            b"v1".to_vec()
        );
    }

    #[test]
    fn test_scan_internal_key_order() {
        let mem = new_mem();
        mem.add(100, ValueType::Value, b"k1", b"v1");
        mem.add(101, ValueType::Value, b"k2", b"v2");
        mem.add(102, ValueType::Value, b"k1", b"v1b");

        let mut iter = mem.iter();
        iter.seek_to_first();

        // Same user key: newest first.
        let mut seen = Vec::new();
        while iter.valid() {
            let parsed = parse_internal_key(iter.key()).unwrap();
            seen.push((parsed.user_key.to_vec(), parsed.sequence));
            iter.next();
        }
        assert_eq!(
            seen,
            vec![
                (b"k1".to_vec(), 102),
                (b"k1".to_vec(), 100),
                (b"k2".to_vec(), 101),
            ]
        );

        iter.seek_to_last();
        assert_eq!(parse_internal_key(iter.key()).unwrap().user_key, b"k2");
        iter.prev();
        assert_eq!(parse_internal_key(iter.key()).unwrap().sequence, 100);
        iter.prev();
        assert_eq!(parse_internal_key(iter.key()).unwrap().sequence, 102);
        iter.prev();
        assert!(!iter.valid());
    }

    #[test]
    fn test_key_converting_iter() {
        let mem = new_mem();
        mem.add(1, ValueType::Value, b"alpha", b"a");
        mem.add(2, ValueType::Value, b"beta", b"b");

        let mut iter = KeyConvertingIter::new(mem.iter());
        iter.seek_to_first();
        assert!(iter.valid());
        assert_eq!(iter.key(), b"alpha");
        assert_eq!(iter.value(), b"a");
        iter.next();
        assert_eq!(iter.key(), b"beta");
        iter.next();
        assert!(!iter.valid());
        assert!(iter.status().is_ok());

        iter.seek(b"beta");
        assert!(iter.valid());
        assert_eq!(iter.key(), b"beta");
    }

    #[test]
    fn test_memory_usage_grows() {
        let mem = new_mem();
        let before = mem.approximate_memory_usage();
        for i in 0..100u32 {
            mem.add(
                i as u64 + 1,
                ValueType::Value,
                format!("key{}", i).as_bytes(),
                &[0u8; 100],
            );
        }
        assert!(mem.approximate_memory_usage() >= before + 100 * 100);
    }
}
