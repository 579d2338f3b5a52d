pub mod coding;
pub mod collections;
pub mod comparator;
mod compress;
pub mod env;
pub mod error;
pub mod filter;
pub mod hash;
pub mod iterator;
pub mod key_types;
pub mod memory;
pub mod options;
pub mod sstable;
pub mod write_batch;

pub type Result<T> = std::result::Result<T, error::LsmLiteError>;

pub use memory::MemTable;
pub use options::{Options, ReadOptions};
pub use sstable::table::Table;
pub use sstable::table_builder::TableBuilder;
pub use write_batch::WriteBatch;
