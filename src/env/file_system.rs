use crate::Result;
use std::fs::File;

/// Byte-addressable random-access reader.
///
/// A [`crate::sstable::table::Table`] owns one of these for its lifetime
/// and issues positioned reads against it; implementations must allow
/// concurrent reads from multiple threads.
pub trait RandomAccessFile: Send + Sync {
    /// Read up to `buf.len()` bytes starting at `offset`. Returns the
    /// number of bytes read, which is short only at end of file.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>;
}

impl RandomAccessFile for File {
    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        use std::os::unix::fs::FileExt;
        let mut read = 0;
        while read < buf.len() {
            let n = FileExt::read_at(self, &mut buf[read..], offset + read as u64)?;
            if n == 0 {
                break;
            }
            read += n;
        }
        Ok(read)
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        use std::os::windows::fs::FileExt;
        let mut read = 0;
        while read < buf.len() {
            let n = FileExt::seek_read(self, &mut buf[read..], offset + read as u64)?;
            if n == 0 {
                break;
            }
            read += n;
        }
        Ok(read)
    }
}

/// In-memory file, used by tests and by callers that already hold the
/// table bytes.
impl RandomAccessFile for Vec<u8> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let offset = (offset as usize).min(self.len());
        let n = buf.len().min(self.len() - offset);
        buf[..n].copy_from_slice(&self[offset..offset + n]);
        Ok(n)
    }
}

#[cfg(feature = "mmap")]
pub mod mmap {
    use super::RandomAccessFile;
    use crate::Result;
    use memmap::{Mmap, MmapOptions};
    use std::fs::File;
    use std::path::Path;

    /// Memory-mapped table file; reads are slices of the stable mapping.
    pub struct MmapFile {
        _file: File,
        mmap: Mmap,
    }

    impl MmapFile {
        pub fn open(path: &Path) -> Result<MmapFile> {
            let file = File::open(path)?;
            let mmap = unsafe { MmapOptions::new().map(&file)? };
            Ok(MmapFile { _file: file, mmap })
        }
    }

    impl RandomAccessFile for MmapFile {
        fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
            let offset = (offset as usize).min(self.mmap.len());
            let n = buf.len().min(self.mmap.len() - offset);
            buf[..n].copy_from_slice(&self.mmap[offset..offset + n]);
            Ok(n)
        }
    }
}
