//! End-to-end tests over the table format: build with `TableBuilder`,
//! read back through `Table`, and cross-check every iterator against a
//! reference ordered map.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use lsmlite::comparator::{BytewiseComparator, Comparator};
use lsmlite::filter::BloomFilterPolicy;
use lsmlite::iterator::Iter;
use lsmlite::options::CompressionType;
use lsmlite::{Options, ReadOptions, Table, TableBuilder};

/// Orders keys by their byte-reversed form; nothing in the table code may
/// assume lexicographic ordering.
#[derive(Clone, Copy)]
struct ReverseKeyComparator;

fn reverse(key: &[u8]) -> Vec<u8> {
    let mut rev = key.to_vec();
    rev.reverse();
    rev
}

impl Comparator for ReverseKeyComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        reverse(a).cmp(&reverse(b))
    }

    fn name(&self) -> &'static str {
        "lsmlite.ReverseBytewiseComparator"
    }

    fn find_shortest_separator(&self, start: &mut Vec<u8>, limit: &[u8]) {
        let mut s = reverse(start);
        let l = reverse(limit);
        BytewiseComparator.find_shortest_separator(&mut s, &l);
        s.reverse();
        *start = s;
    }

    fn find_short_successor(&self, key: &mut Vec<u8>) {
        let mut s = reverse(key);
        BytewiseComparator.find_short_successor(&mut s);
        s.reverse();
        *key = s;
    }
}

struct TableHarness {
    options: Options,
    table: Arc<Table<Vec<u8>>>,
    /// Entries in the comparator's order.
    entries: Vec<(Vec<u8>, Vec<u8>)>,
}

impl TableHarness {
    fn build(options: Options, data: &BTreeMap<Vec<u8>, Vec<u8>>) -> TableHarness {
        let mut entries: Vec<(Vec<u8>, Vec<u8>)> =
            data.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        entries.sort_by(|a, b| options.comparator.compare(&a.0, &b.0));

        let mut builder = TableBuilder::new(options.clone(), Cursor::new(Vec::new()));
        for (key, value) in &entries {
            builder.add(key, value).unwrap();
        }
        let size = builder.finish().unwrap();

        let file = builder.into_file().unwrap().into_inner();
        assert_eq!(file.len() as u64, size);
        let table = Arc::new(Table::open(options.clone(), file, size).unwrap());
        TableHarness {
            options,
            table,
            entries,
        }
    }

    fn check_forward_scan(&self) {
        let mut iter = self.table.iter(ReadOptions::default());
        assert!(!iter.valid());
        iter.seek_to_first();
        for (key, value) in &self.entries {
            assert!(iter.valid());
            assert_eq!(iter.key(), key.as_slice());
            assert_eq!(iter.value(), value.as_slice());
            iter.next();
        }
        assert!(!iter.valid());
        iter.status().unwrap();
    }

    fn check_backward_scan(&self) {
        let mut iter = self.table.iter(ReadOptions::default());
        iter.seek_to_last();
        for (key, value) in self.entries.iter().rev() {
            assert!(iter.valid());
            assert_eq!(iter.key(), key.as_slice());
            assert_eq!(iter.value(), value.as_slice());
            iter.prev();
        }
        assert!(!iter.valid());
        iter.status().unwrap();
    }

    fn check_random_seeks(&self, rng: &mut StdRng) {
        let mut iter = self.table.iter(ReadOptions::default());
        for _ in 0..200 {
            let target = self.pick_target(rng);
            let expected = self
                .entries
                .iter()
                .find(|(key, _)| self.options.comparator.compare(key, &target) != Ordering::Less);
            iter.seek(&target);
            match expected {
                Some((key, value)) => {
                    assert!(iter.valid(), "target {:?}", target);
                    assert_eq!(iter.key(), key.as_slice());
                    assert_eq!(iter.value(), value.as_slice());
                }
                None => assert!(!iter.valid(), "target {:?}", target),
            }
        }
    }

    fn pick_target(&self, rng: &mut StdRng) -> Vec<u8> {
        if self.entries.is_empty() || rng.gen_bool(0.3) {
            let len = rng.gen_range(0..8);
            (0..len).map(|_| rng.gen_range(b'a'..=b'z')).collect()
        } else {
            // Perturb an existing key.
            let mut key = self.entries[rng.gen_range(0..self.entries.len())].0.clone();
            match rng.gen_range(0..3) {
                0 => {}
                1 => {
                    key.push(0);
                }
                _ => {
                    key.pop();
                }
            }
            key
        }
    }
}

fn random_data(rng: &mut StdRng, n: usize) -> BTreeMap<Vec<u8>, Vec<u8>> {
    let mut data = BTreeMap::new();
    for i in 0..n {
        let key: Vec<u8> = (0..rng.gen_range(1..12))
            .map(|_| rng.gen_range(b'a'..=b'z'))
            .collect();
        let value = format!("value{}", i).into_bytes();
        data.insert(key, value);
    }
    data
}

#[test]
fn test_table_roundtrip_across_configs() {
    let _ = env_logger::try_init();
    let mut rng = StdRng::seed_from_u64(301);

    for restart_interval in [1usize, 16, 1024] {
        for block_size in [256usize, 1024, 4096] {
            for compression in [CompressionType::NoCompression, CompressionType::Snappy] {
                for with_filter in [false, true] {
                    let mut options = Options::default();
                    options.block_restart_interval = restart_interval;
                    options.block_size = block_size;
                    options.compression = compression;
                    if with_filter {
                        options.filter_policy = Some(Arc::new(BloomFilterPolicy::new(10)));
                    }
                    let data = random_data(&mut rng, 400);
                    let harness = TableHarness::build(options, &data);
                    harness.check_forward_scan();
                    harness.check_backward_scan();
                    harness.check_random_seeks(&mut rng);
                }
            }
        }
    }
}

#[test]
fn test_empty_table() {
    let harness = TableHarness::build(Options::default(), &BTreeMap::new());
    let mut iter = harness.table.iter(ReadOptions::default());
    iter.seek_to_first();
    assert!(!iter.valid());
    iter.seek_to_last();
    assert!(!iter.valid());
    iter.seek(b"anything");
    assert!(!iter.valid());
    iter.status().unwrap();
}

#[test]
fn test_reverse_comparator_roundtrip() {
    let mut rng = StdRng::seed_from_u64(17);
    let mut options = Options::default();
    options.comparator = Arc::new(ReverseKeyComparator);
    options.block_size = 256;
    options.compression = CompressionType::NoCompression;
    let data = random_data(&mut rng, 300);
    let harness = TableHarness::build(options, &data);
    harness.check_forward_scan();
    harness.check_backward_scan();
    harness.check_random_seeks(&mut rng);
}

#[test]
fn test_point_gets_through_filter() {
    let mut options = Options::default();
    options.block_size = 512;
    options.filter_policy = Some(Arc::new(BloomFilterPolicy::new(10)));
    let mut data = BTreeMap::new();
    for i in 0..500u32 {
        data.insert(
            format!("key{:05}", i * 2).into_bytes(),
            format!("value{}", i).into_bytes(),
        );
    }
    let harness = TableHarness::build(options, &data);

    let read_options = ReadOptions {
        verify_checksums: true,
        ..Default::default()
    };
    for i in 0..500u32 {
        let key = format!("key{:05}", i * 2).into_bytes();
        let (found_key, found_value) = harness
            .table
            .get(&read_options, &key)
            .unwrap()
            .expect("present key must be found");
        assert_eq!(found_key, key);
        assert_eq!(found_value, format!("value{}", i).into_bytes());
    }
    // Absent keys either prune through the filter or land on a larger
    // key; they must never report the wrong entry.
    for i in 0..500u32 {
        let key = format!("key{:05}", i * 2 + 1).into_bytes();
        if let Some((found_key, _)) = harness.table.get(&read_options, &key).unwrap() {
            assert!(found_key > key);
        }
    }
}

fn between(value: u64, low: u64, high: u64) -> bool {
    (low..=high).contains(&value)
}

#[test]
fn test_approximate_offset_of_plain() {
    let mut options = Options::default();
    options.block_size = 1024;
    options.compression = CompressionType::NoCompression;

    let mut builder = TableBuilder::new(options.clone(), Cursor::new(Vec::new()));
    builder.add(b"k01", b"hello").unwrap();
    builder.add(b"k02", b"hello2").unwrap();
    builder.add(b"k03", &vec![b'x'; 10000]).unwrap();
    builder.add(b"k04", &vec![b'x'; 200000]).unwrap();
    builder.add(b"k05", &vec![b'x'; 300000]).unwrap();
    builder.add(b"k06", b"hello3").unwrap();
    builder.add(b"k07", &vec![b'x'; 100000]).unwrap();
    let size = builder.finish().unwrap();
    let file = builder.into_file().unwrap().into_inner();
    let table = Table::open(options, file, size).unwrap();

    assert!(between(table.approximate_offset_of(b"abc"), 0, 0));
    assert!(between(table.approximate_offset_of(b"k01"), 0, 0));
    assert!(between(table.approximate_offset_of(b"k01a"), 0, 0));
    assert!(between(table.approximate_offset_of(b"k02"), 0, 0));
    assert!(between(table.approximate_offset_of(b"k03"), 0, 0));
    assert!(between(table.approximate_offset_of(b"k04"), 10000, 11000));
    assert!(between(table.approximate_offset_of(b"k04a"), 210000, 211000));
    assert!(between(table.approximate_offset_of(b"k05"), 210000, 211000));
    assert!(between(table.approximate_offset_of(b"k06"), 510000, 511000));
    assert!(between(table.approximate_offset_of(b"k07"), 510000, 511000));
    assert!(between(table.approximate_offset_of(b"xyz"), 610000, 612000));
}

#[test]
fn test_approximate_offset_monotone() {
    let mut rng = StdRng::seed_from_u64(99);
    let mut options = Options::default();
    options.block_size = 1024;
    options.compression = CompressionType::NoCompression;
    let data = random_data(&mut rng, 2000);
    let harness = TableHarness::build(options, &data);

    let mut last = 0;
    for (key, _) in &harness.entries {
        let offset = harness.table.approximate_offset_of(key);
        assert!(offset >= last, "offset regressed at {:?}", key);
        last = offset;
    }
}

#[cfg(feature = "snappy")]
#[test]
fn test_approximate_offset_of_compressed() {
    let mut rng = StdRng::seed_from_u64(301);
    let mut options = Options::default();
    options.block_size = 1024;
    options.compression = CompressionType::Snappy;

    // Roughly 4x compressible: a short random fragment repeated.
    let mut compressible = |len: usize| -> Vec<u8> {
        let fragment: Vec<u8> = (0..len / 4).map(|_| rng.gen_range(b'a'..=b'z')).collect();
        fragment.iter().cycle().take(len).cloned().collect()
    };

    let mut builder = TableBuilder::new(options.clone(), Cursor::new(Vec::new()));
    builder.add(b"k01", b"hello").unwrap();
    builder.add(b"k02", &compressible(10000)).unwrap();
    builder.add(b"k03", b"hello3").unwrap();
    builder.add(b"k04", &compressible(10000)).unwrap();
    let size = builder.finish().unwrap();
    let file = builder.into_file().unwrap().into_inner();
    let table = Table::open(options, file, size).unwrap();

    // Expected offsets at ~25% of the raw sizes, with generous slop for
    // compressor framing differences.
    let slop = 1000;
    assert!(between(table.approximate_offset_of(b"abc"), 0, slop));
    assert!(between(table.approximate_offset_of(b"k01"), 0, slop));
    assert!(between(table.approximate_offset_of(b"k02"), 0, slop));
    assert!(between(table.approximate_offset_of(b"k03"), 2000, 4000 + slop));
    assert!(between(table.approximate_offset_of(b"k04"), 2000, 4000 + slop));
    assert!(between(table.approximate_offset_of(b"xyz"), 4000, 7000 + slop));
}

#[test]
fn test_table_from_real_file() {
    use lsmlite::env::RandomAccessFile;
    use std::io::{Seek, SeekFrom, Write};

    let mut options = Options::default();
    options.block_size = 1024;
    options.filter_policy = Some(Arc::new(BloomFilterPolicy::new(10)));

    let mut file = tempfile::tempfile().unwrap();
    let mut builder = TableBuilder::new(options.clone(), file.try_clone().unwrap());
    let mut data = BTreeMap::new();
    for i in 0..1000u32 {
        let key = format!("key{:06}", i).into_bytes();
        let value = format!("value{}", i).into_bytes();
        builder.add(&key, &value).unwrap();
        data.insert(key, value);
    }
    let size = builder.finish().unwrap();
    drop(builder);

    file.seek(SeekFrom::Start(0)).unwrap();
    file.flush().unwrap();
    let mut probe = [0u8; 1];
    assert_eq!(file.read_at(&mut probe, size - 1).unwrap(), 1);

    let table = Arc::new(Table::open(options, file, size).unwrap());
    let mut iter = table.iter(ReadOptions {
        verify_checksums: true,
        ..Default::default()
    });
    iter.seek_to_first();
    for (key, value) in &data {
        assert!(iter.valid());
        assert_eq!(iter.key(), key.as_slice());
        assert_eq!(iter.value(), value.as_slice());
        iter.next();
    }
    assert!(!iter.valid());
    iter.status().unwrap();

    iter.seek(b"key000500");
    assert!(iter.valid());
    assert_eq!(iter.key(), b"key000500");
}

#[test]
fn test_corrupt_data_block_pins_status() {
    let mut options = Options::default();
    options.block_size = 256;
    options.compression = CompressionType::NoCompression;
    let mut data = BTreeMap::new();
    for i in 0..200u32 {
        data.insert(
            format!("key{:04}", i).into_bytes(),
            format!("value{}", i).into_bytes(),
        );
    }

    let mut entries: Vec<(Vec<u8>, Vec<u8>)> = data.into_iter().collect();
    entries.sort();
    let mut builder = TableBuilder::new(options.clone(), Cursor::new(Vec::new()));
    for (key, value) in &entries {
        builder.add(key, value).unwrap();
    }
    let size = builder.finish().unwrap();
    let mut file = builder.into_file().unwrap().into_inner();

    // Smash the middle of the data region; the index and footer at the
    // tail stay intact.
    let mid = file.len() / 4;
    for byte in &mut file[mid..mid + 16] {
        *byte = !*byte;
    }

    let table = Arc::new(Table::open(options, file, size).unwrap());
    let mut iter = table.iter(ReadOptions {
        verify_checksums: true,
        ..Default::default()
    });
    iter.seek_to_first();
    let mut scanned = 0;
    while iter.valid() {
        scanned += 1;
        iter.next();
    }
    // The scan must stop early with a corruption status rather than
    // running to completion.
    assert!(scanned < entries.len());
    assert!(iter.status().is_err());
}
