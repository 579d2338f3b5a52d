//! Cursor-style iteration over sorted key/value sources.

use crate::Result;

/// Bidirectional cursor over a sorted source.
///
/// Every implementation starts out `!valid()`; callers position it with
/// one of the seek operations before reading `key()`/`value()`. Walking
/// past either end leaves the cursor `!valid()` with an OK status, while
/// corruption encountered mid-iteration leaves it `!valid()` with the
/// corresponding error pinned in `status()`.
pub trait Iter {
    fn valid(&self) -> bool;

    /// Position at the first entry, or `!valid()` when the source is empty.
    fn seek_to_first(&mut self);

    /// Position at the last entry, or `!valid()` when the source is empty.
    fn seek_to_last(&mut self);

    /// Position at the first entry with key >= `target`.
    fn seek(&mut self, target: &[u8]);

    /// Requires `valid()`.
    fn next(&mut self);

    /// Requires `valid()`.
    fn prev(&mut self);

    /// Requires `valid()`.
    fn key(&self) -> &[u8];

    /// Requires `valid()`.
    fn value(&self) -> &[u8];

    fn status(&self) -> Result<()>;
}
