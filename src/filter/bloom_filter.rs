use crate::filter::FilterPolicy;
use crate::hash::hash;

const BLOOM_SEED: u32 = 0xbc9f1d34;

fn bloom_hash(key: &[u8]) -> u32 {
    hash(key, BLOOM_SEED)
}

/// Bloom filter with a configurable number of bits per key.
///
/// The encoded filter is the bit array followed by one byte holding the
/// number of probes, so readers built against a future probe count can
/// recognize encodings they do not understand.
pub struct BloomFilterPolicy {
    bits_per_key: usize,
    k: usize,
}

impl BloomFilterPolicy {
    pub fn new(bits_per_key: usize) -> BloomFilterPolicy {
        // Round ln(2) =~ 0.69 to reduce probing cost a little.
        let k = ((bits_per_key as f64) * 0.69) as usize;
        BloomFilterPolicy {
            bits_per_key,
            k: k.clamp(1, 30),
        }
    }
}

impl FilterPolicy for BloomFilterPolicy {
    fn name(&self) -> &'static str {
        "lsmlite.BuiltinBloomFilter"
    }

    fn create_filter(&self, keys: &[&[u8]], dst: &mut Vec<u8>) {
        // A tiny key set would see a high false positive rate; enforce a
        // minimum filter length.
        let mut bits = keys.len() * self.bits_per_key;
        if bits < 64 {
            bits = 64;
        }
        let bytes = (bits + 7) / 8;
        let bits = bytes * 8;

        let init_size = dst.len();
        dst.resize(init_size + bytes, 0);
        for key in keys {
            // Use double-hashing to generate a sequence of hash values.
            let mut h = bloom_hash(key);
            let delta = (h >> 17) | (h << 15); // rotate right 17 bits
            for _ in 0..self.k {
                let bit_pos = (h % bits as u32) as usize;
                dst[init_size + bit_pos / 8] |= 1 << (bit_pos % 8);
                h = h.wrapping_add(delta);
            }
        }
        dst.push(self.k as u8);
    }

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool {
        if filter.len() < 2 {
            return false;
        }
        let bits = ((filter.len() - 1) * 8) as u32;
        let k = filter[filter.len() - 1];
        if k > 30 {
            // Reserved for short bloom filters of a newer encoding;
            // consider the key a match rather than excluding it.
            return true;
        }

        let array = &filter[..filter.len() - 1];
        let mut h = bloom_hash(key);
        let delta = (h >> 17) | (h << 15);
        for _ in 0..k {
            let bit_pos = (h % bits) as usize;
            if array[bit_pos / 8] & (1 << (bit_pos % 8)) == 0 {
                return false;
            }
            h = h.wrapping_add(delta);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::filter::bloom_filter::BloomFilterPolicy;
    use crate::filter::FilterPolicy;

    struct BloomHarness {
        policy: BloomFilterPolicy,
        keys: Vec<Vec<u8>>,
        filter: Vec<u8>,
    }

    impl BloomHarness {
        fn new() -> BloomHarness {
            BloomHarness {
                policy: BloomFilterPolicy::new(10),
                keys: Vec::new(),
                filter: Vec::new(),
            }
        }

        fn reset(&mut self) {
            self.keys.clear();
            self.filter.clear();
        }

        fn add(&mut self, key: &[u8]) {
            self.keys.push(key.to_vec());
        }

        fn build(&mut self) {
            let key_slices: Vec<&[u8]> = self.keys.iter().map(|k| k.as_slice()).collect();
            self.filter.clear();
            self.policy.create_filter(&key_slices, &mut self.filter);
            self.keys.clear();
        }

        fn filter_size(&self) -> usize {
            self.filter.len()
        }

        fn matches(&mut self, key: &[u8]) -> bool {
            if !self.keys.is_empty() {
                self.build();
            }
            self.policy.key_may_match(key, &self.filter)
        }

        fn false_positive_rate(&mut self) -> f64 {
            let mut hits = 0;
            for i in 0..10000 {
                if self.matches(&int_key(i + 1_000_000_000)) {
                    hits += 1;
                }
            }
            hits as f64 / 10000.0
        }
    }

    fn int_key(i: u32) -> [u8; 4] {
        i.to_le_bytes()
    }

    #[test]
    fn test_empty_filter() {
        let mut h = BloomHarness::new();
        assert!(!h.matches(b"hello"));
        assert!(!h.matches(b"world"));
    }

    #[test]
    fn test_small_filter() {
        let mut h = BloomHarness::new();
        h.add(b"hello");
        h.add(b"world");
        assert!(h.matches(b"hello"));
        assert!(h.matches(b"world"));
        assert!(!h.matches(b"x"));
        assert!(!h.matches(b"foo"));
    }

    fn next_length(length: usize) -> usize {
        if length < 10 {
            length + 1
        } else if length < 100 {
            length + 10
        } else if length < 1000 {
            length + 100
        } else {
            length + 1000
        }
    }

    #[test]
    fn test_varying_lengths() {
        let mut h = BloomHarness::new();

        // Count filters that significantly exceed the false positive rate.
        let mut mediocre_filters = 0;
        let mut good_filters = 0;

        let mut length = 1;
        while length <= 10000 {
            h.reset();
            for i in 0..length {
                h.add(&int_key(i as u32));
            }
            h.build();

            assert!(
                h.filter_size() <= length * 10 / 8 + 40,
                "length {}: filter size {}",
                length,
                h.filter_size()
            );

            for i in 0..length {
                assert!(h.matches(&int_key(i as u32)), "length {}, key {}", length, i);
            }

            let rate = h.false_positive_rate();
            assert!(rate <= 0.02, "rate {} at length {}", rate, length);
            if rate > 0.0125 {
                mediocre_filters += 1;
            } else {
                good_filters += 1;
            }
            length = next_length(length);
        }
        assert!(
            mediocre_filters <= good_filters / 5,
            "{} mediocre vs {} good filters",
            mediocre_filters,
            good_filters
        );
    }

    #[test]
    fn test_unknown_probe_count_matches() {
        // k > 30 marks an encoding this reader does not understand.
        let policy = BloomFilterPolicy::new(10);
        let filter = vec![0u8, 0, 0, 0, 31];
        assert!(policy.key_may_match(b"anything", &filter));
    }
}
