// SPDX-License-Identifier: MIT
//! Ordered block collection of a single document

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::entry::{Block, BlockRef};
use super::format::{TableEntry, TABLE_ENTRY_SIZE};
use super::{BlockError, BlockResult};
use crate::compression::{CompressionCodec, CompressionId, CompressionRegistry};

/// Where block payloads are written
///
/// Chosen when the manager is built and applies to every block, so offsets in
/// the block table always refer to a single payload file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Payloads follow the tree inside the document file
    #[default]
    Internal,
    /// Payloads go to a companion file next to the document
    External,
}

/// Old block index to new block index, produced by compaction
pub type IndexRemap = BTreeMap<u32, u32>;

/// Owner of a document's blocks
#[derive(Debug, Clone)]
pub struct BlockManager {
    blocks: Vec<Block>,
    storage: StorageMode,
    registry: Arc<CompressionRegistry>,
}

impl BlockManager {
    /// Empty manager using every compiled-in compression codec
    pub fn new(storage: StorageMode) -> Self {
        Self::with_registry(storage, Arc::new(CompressionRegistry::new()))
    }

    pub fn with_registry(storage: StorageMode, registry: Arc<CompressionRegistry>) -> Self {
        Self {
            blocks: Vec::new(),
            storage,
            registry,
        }
    }

    pub fn storage_mode(&self) -> StorageMode {
        self.storage
    }

    pub fn registry(&self) -> &Arc<CompressionRegistry> {
        &self.registry
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn get(&self, index: u32) -> BlockResult<&Block> {
        self.blocks
            .get(index as usize)
            .ok_or(BlockError::BlockIndexOutOfRange {
                index,
                len: self.blocks.len(),
            })
    }

    fn codec(&self, compression: Option<CompressionId>) -> BlockResult<Option<&dyn CompressionCodec>> {
        compression
            .map(|id| self.registry.get(id).map(|codec| &**codec))
            .transpose()
    }

    fn next_index(&self) -> BlockResult<u32> {
        u32::try_from(self.blocks.len())
            .map_err(|_| BlockError::InvalidFormat("block count exceeds u32".to_string()))
    }

    /// Append a block holding `raw`, compressed with `compression` if set
    pub fn allocate(
        &mut self,
        raw: &[u8],
        compression: Option<CompressionId>,
    ) -> BlockResult<BlockRef> {
        // Resolve the codec first: an unknown id must never store raw bytes
        let codec = self.codec(compression)?;
        let index = self.next_index()?;
        let block = Block::seal(index, raw, codec)?;

        debug!(
            index,
            raw_size = block.raw_size(),
            stored_size = block.stored_size(),
            compression = %self.registry.display_name(compression),
            "allocated block"
        );

        self.blocks.push(block);
        Ok(BlockRef::new(index))
    }

    /// Decompressed, verified bytes of the block at `index`
    pub fn read(&self, index: u32) -> BlockResult<Vec<u8>> {
        self.get(index)?.decode(&self.registry)
    }

    pub fn read_ref(&self, block: BlockRef) -> BlockResult<Vec<u8>> {
        self.read(block.index())
    }

    /// Drop blocks allocated after `len`; used to undo a failed conversion
    pub(crate) fn truncate(&mut self, len: usize) {
        if len < self.blocks.len() {
            debug!(
                from = self.blocks.len(),
                to = len,
                "discarding blocks of failed conversion"
            );
            self.blocks.truncate(len);
        }
    }

    /// Table entries for payloads written back to back from `payload_offset`
    pub fn layout(&self, payload_offset: u64) -> Vec<TableEntry> {
        let mut offset = payload_offset;
        self.blocks
            .iter()
            .map(|block| {
                let entry = block.entry_at(offset);
                offset += block.stored_size();
                entry
            })
            .collect()
    }

    /// Serialized block table for payloads starting at `payload_offset`
    pub fn serialize_layout(&self, payload_offset: u64) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.blocks.len() * TABLE_ENTRY_SIZE);
        for entry in self.layout(payload_offset) {
            entry.write_to_buffer(&mut buffer);
        }
        buffer
    }

    /// Total stored payload bytes
    pub fn payload_size(&self) -> u64 {
        self.blocks.iter().map(Block::stored_size).sum()
    }

    /// Write every stored payload in index order, returning bytes written
    pub fn write_payloads<W: Write>(&self, writer: &mut W) -> std::io::Result<u64> {
        let mut written = 0u64;
        for block in &self.blocks {
            writer.write_all(block.data())?;
            written += block.stored_size();
        }
        Ok(written)
    }

    /// Rebuild a manager from a serialized table and the payload file it
    /// points into
    pub fn from_table(
        table: &[u8],
        payloads: &Bytes,
        storage: StorageMode,
        registry: Arc<CompressionRegistry>,
    ) -> BlockResult<Self> {
        if table.len() % TABLE_ENTRY_SIZE != 0 {
            return Err(BlockError::truncated(format!(
                "block table of {} bytes is not a multiple of {}",
                table.len(),
                TABLE_ENTRY_SIZE
            )));
        }

        let mut blocks = Vec::with_capacity(table.len() / TABLE_ENTRY_SIZE);
        for (position, chunk) in table.chunks_exact(TABLE_ENTRY_SIZE).enumerate() {
            let index = u32::try_from(position)
                .map_err(|_| BlockError::InvalidFormat("block count exceeds u32".to_string()))?;
            let entry = TableEntry::from_bytes(chunk)?;

            let end = entry
                .end()
                .filter(|end| *end <= payloads.len() as u64)
                .ok_or_else(|| {
                    BlockError::truncated(format!(
                        "block {} spans {}+{} but payload file has {} bytes",
                        index,
                        entry.offset,
                        entry.stored_size,
                        payloads.len()
                    ))
                })?;

            let data = payloads.slice(entry.offset as usize..end as usize);
            blocks.push(Block::from_entry(index, &entry, data));
        }

        Ok(Self {
            blocks,
            storage,
            registry,
        })
    }

    /// Keep only the blocks in `live`, renumbered densely in their original
    /// order
    pub fn compact(&self, live: &BTreeSet<u32>) -> BlockResult<(BlockManager, IndexRemap)> {
        self.compact_with(live, None)
    }

    /// Like [`compact`](Self::compact), optionally recompressing every
    /// surviving block with `recompress`
    ///
    /// Without recompression the stored bytes are carried over unchanged.
    /// With it, each block is verified and decompressed first, so a corrupt
    /// block fails the whole compaction rather than being copied forward.
    pub fn compact_with(
        &self,
        live: &BTreeSet<u32>,
        recompress: Option<CompressionId>,
    ) -> BlockResult<(BlockManager, IndexRemap)> {
        let target = self.codec(recompress)?;
        let mut blocks = Vec::with_capacity(live.len());
        let mut remap = IndexRemap::new();

        // BTreeSet iterates ascending, which preserves relative order
        for (new_index, &old_index) in live.iter().enumerate() {
            let new_index = u32::try_from(new_index)
                .map_err(|_| BlockError::InvalidFormat("block count exceeds u32".to_string()))?;
            let block = self.get(old_index)?;

            let compacted = match target {
                None => block.reindexed(new_index),
                Some(codec) => {
                    let raw = block.decode(&self.registry)?;
                    Block::seal(new_index, &raw, Some(codec))?
                }
            };

            blocks.push(compacted);
            remap.insert(old_index, new_index);
        }

        debug!(
            before = self.blocks.len(),
            after = blocks.len(),
            "compacted block manager"
        );

        Ok((
            BlockManager {
                blocks,
                storage: self.storage,
                registry: Arc::clone(&self.registry),
            },
            remap,
        ))
    }

    pub fn stats(&self) -> BlockStats {
        BlockStats {
            block_count: self.blocks.len(),
            stored_bytes: self.payload_size(),
            raw_bytes: self.blocks.iter().map(Block::raw_size).sum(),
            compressed_blocks: self
                .blocks
                .iter()
                .filter(|block| block.compression().is_some())
                .count(),
        }
    }
}

/// Block manager statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockStats {
    pub block_count: usize,
    pub stored_bytes: u64,
    pub raw_bytes: u64,
    pub compressed_blocks: usize,
}

impl BlockStats {
    /// Stored bytes divided by raw bytes (1.0 for an empty manager)
    pub fn compression_ratio(&self) -> f64 {
        if self.raw_bytes == 0 {
            1.0
        } else {
            self.stored_bytes as f64 / self.raw_bytes as f64
        }
    }
}
