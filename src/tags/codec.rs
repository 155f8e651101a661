// SPDX-License-Identifier: MIT
//! Tag codec interface and the contexts codecs run in

use std::fmt;

use super::errors::TagResult;
use super::registry::TagRegistry;
use super::value::{Value, ValueKind};
use crate::block::{BlockManager, BlockRef};
use crate::compression::CompressionId;
use crate::tree::{Node, Tag};

/// Default size, in bytes, up to which array data is written inline
pub const DEFAULT_INLINE_THRESHOLD: usize = 64;

/// Converter between one kind of native value and its tree payload
///
/// `to_tree` returns the bare payload; the registry wraps it in a tagged
/// node carrying [`tag`](Self::tag). `from_tree` receives that payload back.
pub trait TagCodec: Send + Sync {
    /// Name and version written on every node this codec produces
    fn tag(&self) -> &Tag;

    /// Value kinds this codec writes
    fn kinds(&self) -> &[ValueKind];

    fn to_tree(&self, value: &Value, ctx: &mut WriteContext<'_>) -> TagResult<Node>;

    fn from_tree(&self, node: &Node, ctx: &ReadContext<'_>) -> TagResult<Value>;
}

impl fmt::Debug for dyn TagCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagCodec")
            .field("tag", &self.tag().to_string())
            .field("kinds", &self.kinds())
            .finish()
    }
}

pub type ToTreeFn = Box<dyn Fn(&Value, &mut WriteContext<'_>) -> TagResult<Node> + Send + Sync>;
pub type FromTreeFn = Box<dyn Fn(&Node, &ReadContext<'_>) -> TagResult<Value> + Send + Sync>;

/// Codec assembled from a pair of closures
pub struct FnCodec {
    tag: Tag,
    kinds: Vec<ValueKind>,
    to_tree: ToTreeFn,
    from_tree: FromTreeFn,
}

impl FnCodec {
    pub fn new(tag: Tag, kinds: Vec<ValueKind>, to_tree: ToTreeFn, from_tree: FromTreeFn) -> Self {
        Self {
            tag,
            kinds,
            to_tree,
            from_tree,
        }
    }
}

impl TagCodec for FnCodec {
    fn tag(&self) -> &Tag {
        &self.tag
    }

    fn kinds(&self) -> &[ValueKind] {
        &self.kinds
    }

    fn to_tree(&self, value: &Value, ctx: &mut WriteContext<'_>) -> TagResult<Node> {
        (self.to_tree)(value, ctx)
    }

    fn from_tree(&self, node: &Node, ctx: &ReadContext<'_>) -> TagResult<Value> {
        (self.from_tree)(node, ctx)
    }
}

/// Write-time options codecs consult when allocating blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecOptions {
    /// Compression applied to blocks allocated by codecs
    pub compression: Option<CompressionId>,
    /// Array data up to this many bytes is written inline
    pub inline_threshold: usize,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            compression: None,
            inline_threshold: DEFAULT_INLINE_THRESHOLD,
        }
    }
}

/// Context for value to tree conversion, with the document's blocks open
/// for allocation
pub struct WriteContext<'a> {
    registry: &'a TagRegistry,
    blocks: &'a mut BlockManager,
    options: CodecOptions,
}

impl<'a> WriteContext<'a> {
    pub fn new(registry: &'a TagRegistry, blocks: &'a mut BlockManager, options: CodecOptions) -> Self {
        Self {
            registry,
            blocks,
            options,
        }
    }

    pub fn blocks(&mut self) -> &mut BlockManager {
        self.blocks
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// Convert a nested value, dispatching through the registry
    pub fn to_tree(&mut self, value: &Value) -> TagResult<Node> {
        let registry = self.registry;
        registry.convert(value, self)
    }
}

/// Context for tree to value conversion
pub struct ReadContext<'a> {
    registry: &'a TagRegistry,
    blocks: &'a BlockManager,
}

impl<'a> ReadContext<'a> {
    pub fn new(registry: &'a TagRegistry, blocks: &'a BlockManager) -> Self {
        Self { registry, blocks }
    }

    pub fn blocks(&self) -> &BlockManager {
        self.blocks
    }

    /// Verified, decompressed bytes of a referenced block
    pub fn read_block(&self, block: BlockRef) -> TagResult<Vec<u8>> {
        Ok(self.blocks.read_ref(block)?)
    }

    /// Convert a nested node, resolving tags through the registry
    pub fn from_tree(&self, node: &Node) -> TagResult<Value> {
        self.registry.from_tree(node, self)
    }
}
