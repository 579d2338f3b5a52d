//! File abstractions injected into table readers.

pub mod file_system;

pub use file_system::RandomAccessFile;
