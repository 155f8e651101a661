// SPDX-License-Identifier: MIT
//! Documents: a tree of values plus the blocks it references
//!
//! Values go in through the tag registry, which may allocate blocks for large
//! payloads. Removing or replacing a value can orphan blocks; they stay in
//! the document until it is compacted.

pub mod atomic;
pub mod errors;
pub mod gc;
pub mod reader;
pub mod writer;

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tracing::info;

use crate::block::{BlockManager, BlockStats, IndexRemap};
use crate::compression::{CompressionId, CompressionRegistry};
use crate::config::DocumentConfig;
use crate::tags::{CodecOptions, ReadContext, TagRegistry, Value, WriteContext};
use crate::tree::Node;

pub use atomic::AtomicFile;
pub use errors::{DocumentError, DocumentResult};
pub use gc::{
    compact_document, compact_document_with, prepare_compaction, prepare_compaction_with_codecs,
    CompactionReport, PreparedCompaction,
};
pub use writer::{EncodedDocument, PendingWrite};

/// In-memory document
#[derive(Debug)]
pub struct Document {
    tree: Node,
    blocks: BlockManager,
    registry: Arc<TagRegistry>,
    config: DocumentConfig,
    options: CodecOptions,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Empty document with the core codecs and default configuration
    pub fn new() -> Self {
        let blocks = BlockManager::new(Default::default());
        Self {
            tree: Node::mapping(),
            blocks,
            registry: Arc::new(TagRegistry::with_core_codecs()),
            config: DocumentConfig::default(),
            options: CodecOptions::default(),
        }
    }

    /// Empty document using `config`
    pub fn with_config(config: DocumentConfig) -> DocumentResult<Self> {
        Self::with_registry(config, Arc::new(TagRegistry::with_core_codecs()))
    }

    /// Empty document using `config` and a custom tag registry
    pub fn with_registry(config: DocumentConfig, registry: Arc<TagRegistry>) -> DocumentResult<Self> {
        Self::with_codecs(config, registry, Arc::new(CompressionRegistry::new()))
    }

    /// Empty document using custom tag and compression registries
    pub fn with_codecs(
        config: DocumentConfig,
        registry: Arc<TagRegistry>,
        compression: Arc<CompressionRegistry>,
    ) -> DocumentResult<Self> {
        let blocks = BlockManager::with_registry(config.storage, compression);
        Self::from_parts(Node::mapping(), blocks, registry, config)
    }

    /// Assemble a document from an existing tree and block manager
    pub fn from_parts(
        tree: Node,
        blocks: BlockManager,
        registry: Arc<TagRegistry>,
        mut config: DocumentConfig,
    ) -> DocumentResult<Self> {
        if tree.as_mapping().is_none() {
            return Err(DocumentError::InvalidTree(
                "document root must be a mapping".to_string(),
            ));
        }
        // The block manager's storage mode wins over the configured one
        config.storage = blocks.storage_mode();
        let options = config
            .codec_options(blocks.registry())
            .and_then(|options| config.validate(blocks.registry()).map(|()| options))
            .map_err(DocumentError::InvalidConfig)?;

        Ok(Self {
            tree,
            blocks,
            registry,
            config,
            options,
        })
    }

    /// Read the document at `path` with default configuration
    pub fn open(path: impl AsRef<Path>) -> DocumentResult<Self> {
        Self::open_with(
            path,
            DocumentConfig::default(),
            Arc::new(TagRegistry::with_core_codecs()),
        )
    }

    /// Read the document at `path`
    ///
    /// The whole file (and companion file, if any) is loaded; blocks are
    /// verified and decompressed only when read.
    pub fn open_with(
        path: impl AsRef<Path>,
        config: DocumentConfig,
        registry: Arc<TagRegistry>,
    ) -> DocumentResult<Self> {
        Self::open_with_codecs(path, config, registry, Arc::new(CompressionRegistry::new()))
    }

    /// Read the document at `path`, decompressing blocks through
    /// `compression`
    pub fn open_with_codecs(
        path: impl AsRef<Path>,
        config: DocumentConfig,
        registry: Arc<TagRegistry>,
        compression: Arc<CompressionRegistry>,
    ) -> DocumentResult<Self> {
        let path = path.as_ref();
        let file = Bytes::from(fs::read(path)?);
        let decoded = reader::decode(file, compression, |name| {
            Ok(Bytes::from(fs::read(writer::companion_path(path, name))?))
        })?;

        info!(
            path = ?path,
            blocks = decoded.blocks.len(),
            companion = decoded.companion.as_deref().unwrap_or("-"),
            "opened document"
        );
        Self::from_parts(decoded.tree, decoded.blocks, registry, config)
    }

    /// Parse a document held in memory; external documents are rejected
    /// since their companion file cannot be located
    pub fn from_bytes(bytes: impl Into<Bytes>) -> DocumentResult<Self> {
        Self::from_bytes_with(
            bytes,
            DocumentConfig::default(),
            Arc::new(TagRegistry::with_core_codecs()),
            Arc::new(CompressionRegistry::new()),
        )
    }

    /// [`from_bytes`](Self::from_bytes) with explicit configuration and
    /// registries
    pub fn from_bytes_with(
        bytes: impl Into<Bytes>,
        config: DocumentConfig,
        registry: Arc<TagRegistry>,
        compression: Arc<CompressionRegistry>,
    ) -> DocumentResult<Self> {
        let decoded = reader::decode(bytes.into(), compression, |name| {
            Err(DocumentError::InvalidConfig(format!(
                "companion file '{}' is not available for an in-memory document",
                name
            )))
        })?;
        Self::from_parts(decoded.tree, decoded.blocks, registry, config)
    }

    pub fn tree(&self) -> &Node {
        &self.tree
    }

    pub fn blocks(&self) -> &BlockManager {
        &self.blocks
    }

    /// Direct block access, e.g. to allocate raw blocks referenced from
    /// hand-built tree nodes
    pub fn blocks_mut(&mut self) -> &mut BlockManager {
        &mut self.blocks
    }

    pub fn registry(&self) -> &Arc<TagRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    pub fn stats(&self) -> BlockStats {
        self.blocks.stats()
    }

    fn root_mut(&mut self) -> DocumentResult<&mut std::collections::BTreeMap<String, Node>> {
        self.tree
            .as_mapping_mut()
            .ok_or_else(|| DocumentError::InvalidTree("document root must be a mapping".to_string()))
    }

    /// Convert `value` through the tag registry and store it under `key`,
    /// returning the node it replaced
    ///
    /// A failed conversion leaves both the tree and the blocks unchanged.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> DocumentResult<Option<Node>> {
        let value = value.into();
        let node = {
            let mut ctx = WriteContext::new(&self.registry, &mut self.blocks, self.options);
            self.registry.to_tree(&value, &mut ctx)?
        };
        Ok(self.root_mut()?.insert(key.into(), node))
    }

    /// Store a prebuilt tree node under `key`
    pub fn insert_node(&mut self, key: impl Into<String>, node: Node) -> DocumentResult<Option<Node>> {
        Ok(self.root_mut()?.insert(key.into(), node))
    }

    /// Remove `key` from the tree; blocks it referenced become orphans
    pub fn remove(&mut self, key: &str) -> Option<Node> {
        self.tree.as_mapping_mut().and_then(|root| root.remove(key))
    }

    /// Value stored under `key`, converted back through the tag registry
    pub fn get(&self, key: &str) -> DocumentResult<Option<Value>> {
        self.tree
            .get(key)
            .map(|node| self.node_value(node))
            .transpose()
    }

    /// Convert any node of this document into a value
    pub fn node_value(&self, node: &Node) -> DocumentResult<Value> {
        let ctx = ReadContext::new(&self.registry, &self.blocks);
        Ok(self.registry.from_tree(node, &ctx)?)
    }

    /// The whole tree as a value
    pub fn to_value(&self) -> DocumentResult<Value> {
        self.node_value(&self.tree)
    }

    /// Indices of blocks reachable from the tree
    pub fn live_blocks(&self) -> BTreeSet<u32> {
        self.tree.block_refs()
    }

    /// Indices of blocks no tree node references
    pub fn orphaned_blocks(&self) -> Vec<u32> {
        let live = self.live_blocks();
        (0..self.blocks.len() as u32)
            .filter(|index| !live.contains(index))
            .collect()
    }

    /// Drop orphaned blocks and renumber the survivors, optionally
    /// recompressing them
    ///
    /// On error the document is left as it was.
    pub fn compact(&mut self, recompress: Option<CompressionId>) -> DocumentResult<IndexRemap> {
        let live = self.live_blocks();
        let (blocks, remap) = self.blocks.compact_with(&live, recompress)?;
        let mut tree = self.tree.clone();
        tree.remap_block_refs(&remap)?;

        self.tree = tree;
        self.blocks = blocks;
        Ok(remap)
    }

    /// Serialize the document; external storage needs the companion name
    pub fn encode(&self, companion_name: Option<&str>) -> DocumentResult<EncodedDocument> {
        writer::encode(&self.tree, &self.blocks, companion_name)
    }

    /// Write every file of the document to temp files next to `path`
    /// without replacing anything yet
    pub fn prepare_write(&self, path: impl AsRef<Path>) -> DocumentResult<PendingWrite> {
        PendingWrite::prepare(path.as_ref(), &self.tree, &self.blocks, self.config.durable_writes)
    }

    /// Atomically write the document to `path`
    pub fn write_to(&self, path: impl AsRef<Path>) -> DocumentResult<()> {
        let path = path.as_ref();
        self.prepare_write(path)?.commit()?;
        info!(path = ?path, blocks = self.blocks.len(), "wrote document");
        Ok(())
    }
}
