// SPDX-License-Identifier: MIT
//! `core/ndarray` codec: typed numeric arrays
//!
//! Small arrays are written inline as a flat `data` sequence. Anything larger
//! than the inline threshold goes to a block and the payload carries a
//! `source` block reference instead:
//!
//! ```yaml
//! !core/ndarray-1.0.0
//! dtype: float64
//! shape: [1024]
//! byteorder: little
//! source: !block 0
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::codec::{ReadContext, TagCodec, WriteContext};
use super::errors::{TagError, TagResult};
use super::value::{Value, ValueKind};
use crate::tree::{Node, Tag, TagVersion};

pub const NDARRAY_TAG: &str = "core/ndarray";
pub const NDARRAY_VERSION: TagVersion = TagVersion::new(1, 0, 0);

/// Element type; every dtype is stored little-endian
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Uint8,
    Int8,
    Uint16,
    Int16,
    Uint32,
    Int32,
    Uint64,
    Int64,
    Float32,
    Float64,
}

impl DType {
    pub const ALL: [DType; 10] = [
        DType::Uint8,
        DType::Int8,
        DType::Uint16,
        DType::Int16,
        DType::Uint32,
        DType::Int32,
        DType::Uint64,
        DType::Int64,
        DType::Float32,
        DType::Float64,
    ];

    /// Bytes per element
    pub fn item_size(self) -> usize {
        match self {
            DType::Uint8 | DType::Int8 => 1,
            DType::Uint16 | DType::Int16 => 2,
            DType::Uint32 | DType::Int32 | DType::Float32 => 4,
            DType::Uint64 | DType::Int64 | DType::Float64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DType::Uint8 => "uint8",
            DType::Int8 => "int8",
            DType::Uint16 => "uint16",
            DType::Int16 => "int16",
            DType::Uint32 => "uint32",
            DType::Int32 => "int32",
            DType::Uint64 => "uint64",
            DType::Int64 => "int64",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
        }
    }

    /// Tree node for one little-endian element, `None` if the element has no
    /// exact tree form (a `uint64` above `i64::MAX`)
    fn element_node(self, chunk: &[u8]) -> Option<Node> {
        Some(match self {
            DType::Uint8 => Node::Int(i64::from(chunk[0])),
            DType::Int8 => Node::Int(i64::from(chunk[0] as i8)),
            DType::Uint16 => Node::Int(i64::from(u16::from_le_bytes(chunk.try_into().ok()?))),
            DType::Int16 => Node::Int(i64::from(i16::from_le_bytes(chunk.try_into().ok()?))),
            DType::Uint32 => Node::Int(i64::from(u32::from_le_bytes(chunk.try_into().ok()?))),
            DType::Int32 => Node::Int(i64::from(i32::from_le_bytes(chunk.try_into().ok()?))),
            DType::Uint64 => {
                Node::Int(i64::try_from(u64::from_le_bytes(chunk.try_into().ok()?)).ok()?)
            }
            DType::Int64 => Node::Int(i64::from_le_bytes(chunk.try_into().ok()?)),
            DType::Float32 => Node::Float(f64::from(f32::from_le_bytes(chunk.try_into().ok()?))),
            DType::Float64 => Node::Float(f64::from_le_bytes(chunk.try_into().ok()?)),
        })
    }

    /// Append the little-endian bytes of `node`, `None` if it does not fit
    fn push_element(self, node: &Node, out: &mut Vec<u8>) -> Option<()> {
        match self {
            DType::Uint8 => out.push(u8::try_from(node.as_i64()?).ok()?),
            DType::Int8 => out.extend_from_slice(&i8::try_from(node.as_i64()?).ok()?.to_le_bytes()),
            DType::Uint16 => {
                out.extend_from_slice(&u16::try_from(node.as_i64()?).ok()?.to_le_bytes())
            }
            DType::Int16 => {
                out.extend_from_slice(&i16::try_from(node.as_i64()?).ok()?.to_le_bytes())
            }
            DType::Uint32 => {
                out.extend_from_slice(&u32::try_from(node.as_i64()?).ok()?.to_le_bytes())
            }
            DType::Int32 => {
                out.extend_from_slice(&i32::try_from(node.as_i64()?).ok()?.to_le_bytes())
            }
            DType::Uint64 => {
                out.extend_from_slice(&u64::try_from(node.as_i64()?).ok()?.to_le_bytes())
            }
            DType::Int64 => out.extend_from_slice(&node.as_i64()?.to_le_bytes()),
            DType::Float32 => out.extend_from_slice(&(float_of(node)? as f32).to_le_bytes()),
            DType::Float64 => out.extend_from_slice(&float_of(node)?.to_le_bytes()),
        }
        Some(())
    }
}

fn float_of(node: &Node) -> Option<f64> {
    match node {
        Node::Float(f) => Some(*f),
        Node::Int(i) => Some(*i as f64),
        _ => None,
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DType {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DType::ALL
            .into_iter()
            .find(|dtype| dtype.name() == s)
            .ok_or_else(|| TagError::invalid_tree(NDARRAY_TAG, format!("unknown dtype '{}'", s)))
    }
}

/// N-dimensional array of fixed-size numeric elements in row-major order
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    dtype: DType,
    shape: Vec<u64>,
    data: Vec<u8>,
}

impl NdArray {
    /// Array over little-endian `data`, checked against `shape`
    pub fn new(dtype: DType, shape: Vec<u64>, data: Vec<u8>) -> TagResult<Self> {
        let expected = shape
            .iter()
            .try_fold(dtype.item_size() as u64, |acc, &dim| acc.checked_mul(dim));
        if expected != Some(data.len() as u64) {
            return Err(TagError::invalid_tree(
                NDARRAY_TAG,
                format!(
                    "{} bytes of data do not fill shape {:?} of {}",
                    data.len(),
                    shape,
                    dtype
                ),
            ));
        }
        Ok(Self { dtype, shape, data })
    }

    /// One-dimensional array of raw bytes
    pub fn from_u8(values: &[u8]) -> Self {
        Self {
            dtype: DType::Uint8,
            shape: vec![values.len() as u64],
            data: values.to_vec(),
        }
    }

    pub fn from_u32(values: &[u32]) -> Self {
        Self {
            dtype: DType::Uint32,
            shape: vec![values.len() as u64],
            data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    pub fn from_i64(values: &[i64]) -> Self {
        Self {
            dtype: DType::Int64,
            shape: vec![values.len() as u64],
            data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    pub fn from_f64(values: &[f64]) -> Self {
        Self {
            dtype: DType::Float64,
            shape: vec![values.len() as u64],
            data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    /// Same elements viewed under a new shape of equal element count
    pub fn reshape(self, shape: Vec<u64>) -> TagResult<Self> {
        Self::new(self.dtype, shape, self.data)
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Raw little-endian element bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.dtype.item_size()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn to_u32_vec(&self) -> Option<Vec<u32>> {
        (self.dtype == DType::Uint32).then(|| {
            self.data
                .chunks_exact(4)
                .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect()
        })
    }

    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        (self.dtype == DType::Float64).then(|| {
            self.data
                .chunks_exact(8)
                .map(|chunk| {
                    let mut bytes = [0u8; 8];
                    bytes.copy_from_slice(chunk);
                    f64::from_le_bytes(bytes)
                })
                .collect()
        })
    }

    fn inline_nodes(&self) -> Option<Vec<Node>> {
        self.data
            .chunks_exact(self.dtype.item_size())
            .map(|chunk| self.dtype.element_node(chunk))
            .collect()
    }
}

/// Codec for [`NdArray`] values
#[derive(Debug)]
pub struct NdArrayCodec {
    tag: Tag,
}

impl Default for NdArrayCodec {
    fn default() -> Self {
        Self {
            tag: Tag::new(NDARRAY_TAG, NDARRAY_VERSION),
        }
    }
}

fn invalid(message: impl Into<String>) -> TagError {
    TagError::invalid_tree(NDARRAY_TAG, message)
}

impl NdArrayCodec {
    fn shape_from_tree(node: &Node) -> TagResult<Vec<u64>> {
        node.as_sequence()
            .ok_or_else(|| invalid("shape must be a sequence"))?
            .iter()
            .map(|dim| {
                dim.as_i64()
                    .and_then(|dim| u64::try_from(dim).ok())
                    .ok_or_else(|| invalid("shape entries must be non-negative integers"))
            })
            .collect()
    }
}

impl TagCodec for NdArrayCodec {
    fn tag(&self) -> &Tag {
        &self.tag
    }

    fn kinds(&self) -> &[ValueKind] {
        &[ValueKind::Array]
    }

    fn to_tree(&self, value: &Value, ctx: &mut WriteContext<'_>) -> TagResult<Node> {
        let array = value
            .as_array()
            .ok_or_else(|| invalid(format!("cannot write a {}", value.kind())))?;

        let mut payload = BTreeMap::new();
        payload.insert("dtype".to_string(), Node::from(array.dtype.name()));
        payload.insert(
            "shape".to_string(),
            Node::Sequence(
                array
                    .shape
                    .iter()
                    .map(|&dim| i64::try_from(dim).map(Node::Int))
                    .collect::<Result<_, _>>()
                    .map_err(|_| invalid("shape dimension exceeds the tree integer range"))?,
            ),
        );

        let inline = if array.data.len() <= ctx.options().inline_threshold {
            array.inline_nodes()
        } else {
            None
        };

        match inline {
            Some(nodes) => {
                payload.insert("data".to_string(), Node::Sequence(nodes));
            }
            None => {
                let compression = ctx.options().compression;
                let block = ctx.blocks().allocate(&array.data, compression)?;
                payload.insert("byteorder".to_string(), Node::from("little"));
                payload.insert("source".to_string(), Node::Block(block));
            }
        }
        Ok(Node::Mapping(payload))
    }

    fn from_tree(&self, node: &Node, ctx: &ReadContext<'_>) -> TagResult<Value> {
        let dtype: DType = node
            .get("dtype")
            .and_then(Node::as_str)
            .ok_or_else(|| invalid("missing dtype"))?
            .parse()?;
        let shape = Self::shape_from_tree(node.get("shape").ok_or_else(|| invalid("missing shape"))?)?;

        if let Some(byteorder) = node.get("byteorder").and_then(Node::as_str) {
            if byteorder != "little" {
                return Err(invalid(format!("unsupported byteorder '{}'", byteorder)));
            }
        }

        let data = match (node.get("source"), node.get("data")) {
            (Some(Node::Block(block)), None) => ctx.read_block(*block)?,
            (None, Some(Node::Sequence(items))) => {
                let mut data = Vec::with_capacity(items.len() * dtype.item_size());
                for item in items {
                    dtype
                        .push_element(item, &mut data)
                        .ok_or_else(|| invalid(format!("element {:?} is not a valid {}", item, dtype)))?;
                }
                data
            }
            _ => {
                return Err(invalid(
                    "expected exactly one of a block 'source' or an inline 'data' sequence",
                ))
            }
        };

        Ok(Value::Array(NdArray::new(dtype, shape, data)?))
    }
}
