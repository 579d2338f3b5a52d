use std::cmp::Ordering;
use std::io::{BufWriter, Write};

use crate::coding::encode_fixed32;
use crate::compress;
use crate::options::{CompressionType, Options};
use crate::sstable::block_builder::BlockBuilder;
use crate::sstable::filter_block::FilterBlockBuilder;
use crate::sstable::footer::{BlockHandle, Footer};
use crate::sstable::{mask_crc, BLOCK_TRAILER_SIZE};
use crate::Result;

/// Writes a table file from a strictly increasing stream of key/value
/// pairs.
///
/// The sink must be a fresh file: block handles are byte offsets counted
/// from the first write. Dropping a builder mid-stream abandons the file
/// without finalization; only [`TableBuilder::finish`] writes the index
/// and footer.
pub struct TableBuilder<W: Write> {
    options: Options,
    writer: BufWriter<W>,
    /// Bytes emitted so far; the offset the next block will land at.
    offset: u64,
    data_block: BlockBuilder,
    index_block: BlockBuilder,
    filter_block: Option<FilterBlockBuilder>,
    last_key: Vec<u8>,
    num_entries: u64,
    closed: bool,
    /// An index entry for the block just flushed is deferred until the
    /// next key arrives, so the separator can use that key as its limit.
    pending_index_entry: bool,
    pending_handle: BlockHandle,
}

impl<W: Write> TableBuilder<W> {
    pub fn new(options: Options, file: W) -> TableBuilder<W> {
        let filter_block = options.filter_policy.as_ref().map(|policy| {
            let mut builder = FilterBlockBuilder::new(policy.clone());
            builder.start_block(0);
            builder
        });
        TableBuilder {
            data_block: BlockBuilder::new(
                options.block_restart_interval,
                options.comparator.clone(),
            ),
            // Index entries point at whole blocks; restart on every key.
            index_block: BlockBuilder::new(1, options.comparator.clone()),
            filter_block,
            writer: BufWriter::new(file),
            offset: 0,
            options,
            last_key: Vec::new(),
            num_entries: 0,
            closed: false,
            pending_index_entry: false,
            pending_handle: BlockHandle::default(),
        }
    }

    /// Append an entry. `key` must sort strictly after every previously
    /// added key under the configured comparator.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        debug_assert!(!self.closed);
        debug_assert!(
            self.num_entries == 0
                || self.options.comparator.compare(key, &self.last_key) == Ordering::Greater,
            "keys added out of order"
        );

        if self.pending_index_entry {
            debug_assert!(self.data_block.is_empty());
            self.options
                .comparator
                .find_shortest_separator(&mut self.last_key, key);
            let mut handle_encoding = Vec::new();
            self.pending_handle.encode_to(&mut handle_encoding);
            self.index_block.add(&self.last_key, &handle_encoding);
            self.pending_index_entry = false;
        }

        if let Some(filter_block) = &mut self.filter_block {
            filter_block.add_key(key);
        }

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;
        self.data_block.add(key, value);

        if self.data_block.current_size_estimate() >= self.options.block_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Finalize the in-progress data block and start a new one.
    pub fn flush(&mut self) -> Result<()> {
        debug_assert!(!self.closed);
        if self.data_block.is_empty() {
            return Ok(());
        }
        debug_assert!(!self.pending_index_entry);
        self.pending_handle = self.write_data_block()?;
        self.pending_index_entry = true;
        self.writer.flush()?;
        if let Some(filter_block) = &mut self.filter_block {
            filter_block.start_block(self.offset);
        }
        Ok(())
    }

    fn write_data_block(&mut self) -> Result<BlockHandle> {
        let raw = self.data_block.finish().to_vec();
        self.data_block.reset();
        self.write_block(&raw)
    }

    /// Compress if worthwhile, then emit `block contents ++ type ++
    /// masked crc32c`.
    fn write_block(&mut self, raw: &[u8]) -> Result<BlockHandle> {
        let (ctype, compressed) = compress::maybe_compress(
            self.options.compression,
            self.options.zstd_compression_level,
            raw,
        );
        let body = compressed.as_deref().unwrap_or(raw);
        self.write_raw_block(body, ctype)
    }

    fn write_raw_block(&mut self, body: &[u8], ctype: CompressionType) -> Result<BlockHandle> {
        let handle = BlockHandle::new(self.offset, body.len() as u64);
        self.writer.write_all(body)?;

        let mut trailer = Vec::with_capacity(BLOCK_TRAILER_SIZE);
        trailer.push(ctype as u8);
        let mut crc = crc32c::crc32c(body);
        crc = crc32c::crc32c_append(crc, &trailer[..1]);
        encode_fixed32(&mut trailer, mask_crc(crc));
        self.writer.write_all(&trailer)?;
        self.offset += (body.len() + BLOCK_TRAILER_SIZE) as u64;
        Ok(handle)
    }

    /// Flush remaining data, then write the filter block, meta-index,
    /// index and footer. Returns the final file size.
    pub fn finish(&mut self) -> Result<u64> {
        self.flush()?;
        debug_assert!(!self.closed);
        self.closed = true;

        // Filter block is stored uncompressed.
        let filter_handle = match &mut self.filter_block {
            Some(filter_block) => {
                let contents = filter_block.finish().to_vec();
                Some(self.write_raw_block(&contents, CompressionType::NoCompression)?)
            }
            None => None,
        };

        let mut metaindex_block = BlockBuilder::new(1, self.options.comparator.clone());
        if let Some(handle) = filter_handle {
            let mut key = "filter.".to_string();
            key.push_str(self.options.filter_policy.as_ref().unwrap().name());
            let mut handle_encoding = Vec::new();
            handle.encode_to(&mut handle_encoding);
            metaindex_block.add(key.as_bytes(), &handle_encoding);
        }
        let metaindex_contents = metaindex_block.finish().to_vec();
        let metaindex_handle = self.write_block(&metaindex_contents)?;

        if self.pending_index_entry {
            self.options
                .comparator
                .find_short_successor(&mut self.last_key);
            let mut handle_encoding = Vec::new();
            self.pending_handle.encode_to(&mut handle_encoding);
            self.index_block.add(&self.last_key, &handle_encoding);
            self.pending_index_entry = false;
        }
        let index_contents = self.index_block.finish().to_vec();
        let index_handle = self.write_block(&index_contents)?;

        let footer = Footer {
            metaindex_handle,
            index_handle,
        };
        let mut footer_encoding = Vec::new();
        footer.encode_to(&mut footer_encoding);
        self.writer.write_all(&footer_encoding)?;
        self.offset += footer_encoding.len() as u64;
        self.writer.flush()?;
        Ok(self.offset)
    }

    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Consume the builder and hand back the underlying file.
    pub fn into_file(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| e.into_error().into())
    }

    /// Size of the file generated so far; call after `finish` for the
    /// final size.
    pub fn file_size(&self) -> u64 {
        self.offset
    }
}
