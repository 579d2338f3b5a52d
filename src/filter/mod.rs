pub mod bloom_filter;

pub use bloom_filter::BloomFilterPolicy;

/// Maps a set of keys to a compact byte array supporting approximate
/// membership queries.
///
/// Instances are shared read-only across threads.
pub trait FilterPolicy: Send + Sync {
    /// Name of this policy, recorded in the table's meta-index. Changing
    /// the encoding of a filter in an incompatible way requires a new name.
    fn name(&self) -> &'static str;

    /// Append a filter summarizing `keys` to `dst`.
    ///
    /// Keys may contain duplicates and are potentially out of order.
    fn create_filter(&self, keys: &[&[u8]], dst: &mut Vec<u8>);

    /// Must return true if `key` was in the set the filter was built from.
    /// May return true for keys that were not (false positive), never the
    /// reverse.
    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool;
}
