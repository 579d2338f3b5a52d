use std::sync::Arc;

use log::warn;

use crate::env::RandomAccessFile;
use crate::error::LsmLiteError;
use crate::iterator::Iter;
use crate::options::{Options, ReadOptions};
use crate::sstable::block::{Block, BlockIter};
use crate::sstable::filter_block::FilterBlockReader;
use crate::sstable::footer::{BlockHandle, Footer, FOOTER_ENCODED_LENGTH};
use crate::sstable::read_block;
use crate::Result;

/// Immutable, ordered map backed by a table file.
///
/// Opened once, then read-only; the table owns the injected reader for
/// its lifetime and may serve reads from multiple threads.
pub struct Table<R: RandomAccessFile> {
    options: Options,
    file: R,
    metaindex_handle: BlockHandle,
    index_block: Arc<Block>,
    filter: Option<FilterBlockReader>,
}

impl<R: RandomAccessFile> Table<R> {
    /// Read the footer, index block and (when configured) filter block.
    /// `size` is the byte length of `file`.
    pub fn open(options: Options, file: R, size: u64) -> Result<Table<R>> {
        if size < FOOTER_ENCODED_LENGTH as u64 {
            return Err(LsmLiteError::Corruption(
                "file is too short to be an sstable".into(),
            ));
        }
        let mut footer_bytes = [0u8; FOOTER_ENCODED_LENGTH];
        let read = file.read_at(&mut footer_bytes, size - FOOTER_ENCODED_LENGTH as u64)?;
        if read != FOOTER_ENCODED_LENGTH {
            return Err(LsmLiteError::Corruption("truncated table footer".into()));
        }
        let footer = Footer::decode_from(&footer_bytes)?;

        // The index block is read eagerly; a table with an unreadable
        // index is unusable.
        let read_options = ReadOptions {
            verify_checksums: true,
            ..Default::default()
        };
        let index_contents = read_block(&file, &read_options, &footer.index_handle)?;
        let index_block = Arc::new(Block::new(index_contents));

        let mut table = Table {
            metaindex_handle: footer.metaindex_handle,
            index_block,
            filter: None,
            options,
            file,
        };
        table.read_meta(&footer)?;
        Ok(table)
    }

    /// Locate and load the filter block via the meta-index. Meta info is
    /// advisory: failures disable filtering but do not fail the open.
    fn read_meta(&mut self, footer: &Footer) -> Result<()> {
        let policy = match &self.options.filter_policy {
            Some(policy) => policy.clone(),
            None => return Ok(()),
        };
        let read_options = ReadOptions {
            verify_checksums: true,
            ..Default::default()
        };
        let meta_contents = match read_block(&self.file, &read_options, &footer.metaindex_handle) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("ignoring meta-index block: {}", e);
                return Ok(());
            }
        };
        let meta = Arc::new(Block::new(meta_contents));
        let mut iter = meta.iter(self.options.comparator.clone());
        let key = format!("filter.{}", policy.name());
        iter.seek(key.as_bytes());
        if iter.valid() && iter.key() == key.as_bytes() {
            match BlockHandle::decode_from(iter.value())
                .and_then(|(handle, _)| read_block(&self.file, &read_options, &handle))
            {
                Ok(filter_contents) => {
                    self.filter = Some(FilterBlockReader::new(policy, filter_contents));
                }
                Err(e) => warn!("ignoring filter block: {}", e),
            }
        }
        Ok(())
    }

    fn block_iter(&self, options: &ReadOptions, handle: &BlockHandle) -> Result<BlockIter> {
        let contents = read_block(&self.file, options, handle)?;
        let block = Arc::new(Block::new(contents));
        Ok(block.iter(self.options.comparator.clone()))
    }

    /// Point lookup: consult the index for the candidate block, prune
    /// through the filter, then seek inside the block. Returns the first
    /// entry with key >= `key` within that block.
    pub fn get(&self, options: &ReadOptions, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let mut index_iter = self.index_block.iter(self.options.comparator.clone());
        index_iter.seek(key);
        if !index_iter.valid() {
            index_iter.status()?;
            return Ok(None);
        }
        let (handle, _) = BlockHandle::decode_from(index_iter.value())?;
        if let Some(filter) = &self.filter {
            if !filter.key_may_match(handle.offset(), key) {
                // Key definitely absent from this block.
                return Ok(None);
            }
        }
        let mut block_iter = self.block_iter(options, &handle)?;
        block_iter.seek(key);
        if block_iter.valid() {
            let entry = (block_iter.key().to_vec(), block_iter.value().to_vec());
            block_iter.status()?;
            return Ok(Some(entry));
        }
        block_iter.status()?;
        Ok(None)
    }

    /// File offset at which the data for `key` would start, used for
    /// sizing compaction inputs. Keys past the last entry map to the
    /// start of the meta section, approximately the file size.
    pub fn approximate_offset_of(&self, key: &[u8]) -> u64 {
        let mut index_iter = self.index_block.iter(self.options.comparator.clone());
        index_iter.seek(key);
        if index_iter.valid() {
            if let Ok((handle, _)) = BlockHandle::decode_from(index_iter.value()) {
                return handle.offset();
            }
        }
        self.metaindex_handle.offset()
    }

    /// Two-level iterator over all entries in key order.
    pub fn iter(self: &Arc<Self>, options: ReadOptions) -> TableIter<R> {
        TableIter {
            index_iter: self.index_block.iter(self.options.comparator.clone()),
            table: self.clone(),
            read_options: options,
            data_iter: None,
            data_block_handle: Vec::new(),
            err: None,
        }
    }
}

/// Iterator over a whole table: the outer level walks index entries, the
/// inner level the data block each one points at. Block transitions are
/// transparent.
pub struct TableIter<R: RandomAccessFile> {
    table: Arc<Table<R>>,
    read_options: ReadOptions,
    index_iter: BlockIter,
    data_iter: Option<BlockIter>,
    /// Encoded handle of the block `data_iter` is over, to avoid
    /// re-reading the same block on repeated seeks.
    data_block_handle: Vec<u8>,
    err: Option<LsmLiteError>,
}

impl<R: RandomAccessFile> TableIter<R> {
    /// Point `data_iter` at the block the index entry references, reusing
    /// the current block when the handle is unchanged.
    fn init_data_block(&mut self) {
        if !self.index_iter.valid() {
            self.data_iter = None;
            return;
        }
        let handle = self.index_iter.value().to_vec();
        if self.data_iter.is_some() && handle == self.data_block_handle {
            return;
        }
        match BlockHandle::decode_from(&handle)
            .and_then(|(handle, _)| self.table.block_iter(&self.read_options, &handle))
        {
            Ok(iter) => {
                self.data_block_handle = handle;
                self.data_iter = Some(iter);
            }
            Err(e) => {
                // A corrupt block pins the error; the caller decides
                // whether to skip or abort.
                self.err = Some(e);
                self.data_iter = None;
            }
        }
    }

    fn skip_empty_data_blocks_forward(&mut self) {
        while self.err.is_none() && self.data_iter.as_ref().map_or(true, |iter| !iter.valid()) {
            // A block that went bad mid-decode pins its error here.
            if let Some(iter) = &self.data_iter {
                if let Err(e) = iter.status() {
                    self.err = Some(e);
                    return;
                }
            }
            if !self.index_iter.valid() {
                self.data_iter = None;
                return;
            }
            self.index_iter.next();
            self.init_data_block();
            if let Some(iter) = &mut self.data_iter {
                iter.seek_to_first();
            }
        }
    }

    fn skip_empty_data_blocks_backward(&mut self) {
        while self.err.is_none() && self.data_iter.as_ref().map_or(true, |iter| !iter.valid()) {
            if let Some(iter) = &self.data_iter {
                if let Err(e) = iter.status() {
                    self.err = Some(e);
                    return;
                }
            }
            if !self.index_iter.valid() {
                self.data_iter = None;
                return;
            }
            self.index_iter.prev();
            self.init_data_block();
            if let Some(iter) = &mut self.data_iter {
                iter.seek_to_last();
            }
        }
    }
}

impl<R: RandomAccessFile> Iter for TableIter<R> {
    fn valid(&self) -> bool {
        self.err.is_none() && self.data_iter.as_ref().map_or(false, |iter| iter.valid())
    }

    fn seek_to_first(&mut self) {
        self.index_iter.seek_to_first();
        self.init_data_block();
        if let Some(iter) = &mut self.data_iter {
            iter.seek_to_first();
        }
        self.skip_empty_data_blocks_forward();
    }

    fn seek_to_last(&mut self) {
        self.index_iter.seek_to_last();
        self.init_data_block();
        if let Some(iter) = &mut self.data_iter {
            iter.seek_to_last();
        }
        self.skip_empty_data_blocks_backward();
    }

    fn seek(&mut self, target: &[u8]) {
        self.index_iter.seek(target);
        self.init_data_block();
        if let Some(iter) = &mut self.data_iter {
            iter.seek(target);
        }
        self.skip_empty_data_blocks_forward();
    }

    fn next(&mut self) {
        debug_assert!(self.valid());
        if let Some(iter) = &mut self.data_iter {
            iter.next();
        }
        self.skip_empty_data_blocks_forward();
    }

    fn prev(&mut self) {
        debug_assert!(self.valid());
        if let Some(iter) = &mut self.data_iter {
            iter.prev();
        }
        self.skip_empty_data_blocks_backward();
    }

    fn key(&self) -> &[u8] {
        debug_assert!(self.valid());
        self.data_iter.as_ref().unwrap().key()
    }

    fn value(&self) -> &[u8] {
        debug_assert!(self.valid());
        self.data_iter.as_ref().unwrap().value()
    }

    fn status(&self) -> Result<()> {
        if let Some(e) = &self.err {
            return Err(e.clone());
        }
        self.index_iter.status()?;
        if let Some(iter) = &self.data_iter {
            iter.status()?;
        }
        Ok(())
    }
}
