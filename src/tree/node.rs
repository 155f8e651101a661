// SPDX-License-Identifier: MIT
//! In-memory document tree

use std::collections::{BTreeMap, BTreeSet};

use super::tag::Tag;
use crate::block::{BlockError, BlockRef, IndexRemap};

/// Tree node: scalars, sequences, mappings, tagged values and block references
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Sequence(Vec<Node>),
    Mapping(BTreeMap<String, Node>),
    Tagged(Tag, Box<Node>),
    Block(BlockRef),
}

impl Node {
    /// Empty mapping, the root of a new document
    pub fn mapping() -> Self {
        Node::Mapping(BTreeMap::new())
    }

    pub fn tagged(tag: Tag, payload: Node) -> Self {
        Node::Tagged(tag, Box::new(payload))
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Mapping(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Node::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&BTreeMap<String, Node>> {
        match self {
            Node::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut BTreeMap<String, Node>> {
        match self {
            Node::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Node]> {
        match self {
            Node::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<BlockRef> {
        match self {
            Node::Block(block) => Some(*block),
            _ => None,
        }
    }

    /// Tag and payload of a tagged node
    pub fn as_tagged(&self) -> Option<(&Tag, &Node)> {
        match self {
            Node::Tagged(tag, payload) => Some((tag, payload)),
            _ => None,
        }
    }

    /// Visit every block reference reachable from this node
    pub fn for_each_block_ref(&self, visit: &mut impl FnMut(BlockRef)) {
        match self {
            Node::Block(block) => visit(*block),
            Node::Sequence(items) => items.iter().for_each(|item| item.for_each_block_ref(visit)),
            Node::Mapping(map) => map.values().for_each(|item| item.for_each_block_ref(visit)),
            Node::Tagged(_, payload) => payload.for_each_block_ref(visit),
            Node::Null | Node::Bool(_) | Node::Int(_) | Node::Float(_) | Node::Str(_) => {}
        }
    }

    /// Indices of every block the tree references (the live set)
    pub fn block_refs(&self) -> BTreeSet<u32> {
        let mut live = BTreeSet::new();
        self.for_each_block_ref(&mut |block| {
            live.insert(block.index());
        });
        live
    }

    /// Rewrite every block reference through `remap`, returning how many
    /// references changed
    ///
    /// Fails without touching the tree if a reference has no entry in
    /// `remap`.
    pub fn remap_block_refs(&mut self, remap: &IndexRemap) -> Result<usize, BlockError> {
        let mut missing = None;
        self.for_each_block_ref(&mut |block| {
            if missing.is_none() && !remap.contains_key(&block.index()) {
                missing = Some(block.index());
            }
        });
        if let Some(index) = missing {
            return Err(BlockError::BlockIndexOutOfRange {
                index,
                len: remap.len(),
            });
        }

        let mut rewritten = 0;
        self.rewrite_refs(remap, &mut rewritten);
        Ok(rewritten)
    }

    fn rewrite_refs(&mut self, remap: &IndexRemap, rewritten: &mut usize) {
        match self {
            Node::Block(block) => {
                if let Some(&new_index) = remap.get(&block.index()) {
                    if new_index != block.index() {
                        *rewritten += 1;
                    }
                    *block = BlockRef::new(new_index);
                }
            }
            Node::Sequence(items) => items
                .iter_mut()
                .for_each(|item| item.rewrite_refs(remap, rewritten)),
            Node::Mapping(map) => map
                .values_mut()
                .for_each(|item| item.rewrite_refs(remap, rewritten)),
            Node::Tagged(_, payload) => payload.rewrite_refs(remap, rewritten),
            Node::Null | Node::Bool(_) | Node::Int(_) | Node::Float(_) | Node::Str(_) => {}
        }
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::Str(value.to_string())
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Node::Int(value)
    }
}

impl From<BlockRef> for Node {
    fn from(value: BlockRef) -> Self {
        Node::Block(value)
    }
}
