//! Memory table

mod mem_table;

pub use mem_table::{KeyConvertingIter, MemTable, MemTableIter};
