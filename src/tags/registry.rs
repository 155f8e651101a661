// SPDX-License-Identifier: MIT
//! Versioned registry of tag codecs
//!
//! Codecs are keyed by `(name, version)` for reading. Writing dispatches on
//! the runtime [`ValueKind`] of a value: the first codec registered for a
//! kind claims it, and later versions of the same tag name take over.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use super::codec::{FnCodec, FromTreeFn, ReadContext, TagCodec, ToTreeFn, WriteContext};
use super::complex::ComplexCodec;
use super::errors::{TagError, TagResult};
use super::integer::{BigInt, IntegerCodec};
use super::ndarray::NdArrayCodec;
use super::value::{fits_native_int, Value, ValueKind};
use crate::tree::{Node, Tag, TagVersion};

/// Registry of tag codecs
#[derive(Debug, Default)]
pub struct TagRegistry {
    codecs: BTreeMap<String, BTreeMap<TagVersion, Arc<dyn TagCodec>>>,
    writers: HashMap<ValueKind, Arc<dyn TagCodec>>,
}

impl TagRegistry {
    /// Registry with no codecs
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `core/integer`, `core/complex` and `core/ndarray`
    pub fn with_core_codecs() -> Self {
        let mut registry = Self::new();
        let core: [Arc<dyn TagCodec>; 3] = [
            Arc::new(NdArrayCodec::default()),
            Arc::new(IntegerCodec::default()),
            Arc::new(ComplexCodec::default()),
        ];
        for codec in core {
            registry.insert(codec);
        }
        registry
    }

    /// Add a codec under its `(name, version)`
    pub fn register(&mut self, codec: Arc<dyn TagCodec>) -> TagResult<()> {
        let tag = codec.tag();
        if self
            .codecs
            .get(&tag.name)
            .is_some_and(|versions| versions.contains_key(&tag.version))
        {
            return Err(TagError::DuplicateCodec(tag.to_string()));
        }
        self.insert(codec);
        Ok(())
    }

    /// Register a codec built from a pair of conversion functions
    pub fn register_fn(
        &mut self,
        name: &str,
        version: TagVersion,
        kinds: &[ValueKind],
        to_tree: ToTreeFn,
        from_tree: FromTreeFn,
    ) -> TagResult<()> {
        let codec = FnCodec::new(Tag::new(name, version), kinds.to_vec(), to_tree, from_tree);
        self.register(Arc::new(codec))
    }

    fn insert(&mut self, codec: Arc<dyn TagCodec>) {
        let tag = codec.tag().clone();
        for &kind in codec.kinds() {
            let replace = match self.writers.get(&kind) {
                None => true,
                Some(current) => {
                    current.tag().name == tag.name && current.tag().version < tag.version
                }
            };
            if replace {
                self.writers.insert(kind, Arc::clone(&codec));
            }
        }
        debug!(tag = %tag, "registered tag codec");
        self.codecs
            .entry(tag.name)
            .or_default()
            .insert(tag.version, codec);
    }

    pub fn contains(&self, name: &str, version: TagVersion) -> bool {
        self.codecs
            .get(name)
            .is_some_and(|versions| versions.contains_key(&version))
    }

    /// Every registered tag, ordered by name then version
    pub fn tags(&self) -> impl Iterator<Item = &Tag> + '_ {
        self.codecs
            .values()
            .flat_map(|versions| versions.values().map(|codec| codec.tag()))
    }

    /// Codec for `(name, version)`: the exact version if registered, else the
    /// highest version sharing its major number
    pub fn resolve(&self, name: &str, version: TagVersion) -> TagResult<Arc<dyn TagCodec>> {
        let versions = self
            .codecs
            .get(name)
            .ok_or_else(|| TagError::UnknownTag(name.to_string()))?;

        if let Some(codec) = versions.get(&version) {
            return Ok(Arc::clone(codec));
        }

        versions
            .iter()
            .rev()
            .find(|(candidate, _)| candidate.is_compatible_with(&version))
            .map(|(_, codec)| Arc::clone(codec))
            .ok_or_else(|| TagError::IncompatibleVersion {
                tag: Tag::new(name, version).to_string(),
                available: versions
                    .keys()
                    .map(TagVersion::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    /// Codec that writes values of `kind`, if any
    pub fn writer_for(&self, kind: ValueKind) -> Option<&Arc<dyn TagCodec>> {
        self.writers.get(&kind)
    }

    /// Convert a value into a tree
    ///
    /// Blocks allocated during a conversion that fails are released again,
    /// so a failed value leaves the block manager as it found it.
    pub fn to_tree(&self, value: &Value, ctx: &mut WriteContext<'_>) -> TagResult<Node> {
        let mark = ctx.blocks().len();
        let result = self.convert(value, ctx);
        if result.is_err() {
            ctx.blocks().truncate(mark);
        }
        result
    }

    pub(crate) fn convert(&self, value: &Value, ctx: &mut WriteContext<'_>) -> TagResult<Node> {
        if let Some(codec) = self.writers.get(&value.kind()) {
            let payload = codec.to_tree(value, ctx)?;
            return Ok(Node::tagged(codec.tag().clone(), payload));
        }

        Ok(match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(*b),
            Value::Float(f) => Node::Float(*f),
            Value::Str(s) => Node::Str(s.clone()),
            Value::Int(i) if fits_native_int(*i) => Node::Int(*i),
            Value::Int(i) => match self.writers.get(&ValueKind::BigInt) {
                Some(codec) => {
                    let payload = codec.to_tree(&Value::BigInt(BigInt::from(*i)), ctx)?;
                    Node::tagged(codec.tag().clone(), payload)
                }
                None => Node::Int(*i),
            },
            Value::Sequence(items) => Node::Sequence(
                items
                    .iter()
                    .map(|item| self.convert(item, ctx))
                    .collect::<TagResult<_>>()?,
            ),
            Value::Mapping(map) => {
                let mut node = BTreeMap::new();
                for (key, item) in map {
                    node.insert(key.clone(), self.convert(item, ctx)?);
                }
                Node::Mapping(node)
            }
            Value::BigInt(_) | Value::Complex(_) | Value::Array(_) => {
                return Err(TagError::NoCodecForValue(value.kind().to_string()))
            }
        })
    }

    /// Convert a tree back into a value, resolving tagged nodes through
    /// their codecs
    pub fn from_tree(&self, node: &Node, ctx: &ReadContext<'_>) -> TagResult<Value> {
        Ok(match node {
            Node::Tagged(tag, payload) => {
                let codec = self.resolve(&tag.name, tag.version)?;
                return codec.from_tree(payload, ctx);
            }
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(*b),
            Node::Int(i) => Value::Int(*i),
            Node::Float(f) => Value::Float(*f),
            Node::Str(s) => Value::Str(s.clone()),
            Node::Sequence(items) => Value::Sequence(
                items
                    .iter()
                    .map(|item| self.from_tree(item, ctx))
                    .collect::<TagResult<_>>()?,
            ),
            Node::Mapping(map) => {
                let mut value = BTreeMap::new();
                for (key, item) in map {
                    value.insert(key.clone(), self.from_tree(item, ctx)?);
                }
                Value::Mapping(value)
            }
            Node::Block(block) => return Err(TagError::UnexpectedBlockRef(block.index())),
        })
    }
}
