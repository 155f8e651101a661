// SPDX-License-Identifier: MIT
//! Pluggable block compression
//!
//! Codecs are pure byte transforms identified on disk by a small integer id
//! (`0` is reserved for "stored uncompressed") and by a lowercase name for
//! configuration. The block manager resolves ids through a
//! [`CompressionRegistry`] and never falls back to storing data raw when a
//! requested codec is missing.

mod zlib;

#[cfg(feature = "lz4")]
mod lz4;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::block::{BlockError, BlockResult};

pub use zlib::ZlibCodec;

#[cfg(feature = "lz4")]
pub use lz4::Lz4Codec;

/// On-disk identifier of a compression codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompressionId(u16);

impl CompressionId {
    /// zlib stream (RFC 1950)
    pub const ZLIB: CompressionId = CompressionId(1);

    /// LZ4 block format, sized by the block's raw size
    pub const LZ4: CompressionId = CompressionId(2);

    /// Create an id from its wire value. `0` means "no compression".
    pub const fn from_wire(raw: u16) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Wire value for an optional id
    pub fn to_wire(id: Option<Self>) -> u16 {
        id.map_or(0, |id| id.0)
    }

    pub fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for CompressionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A named, reversible byte transform
///
/// Implementations must satisfy `decompress(compress(b), b.len()) == b`.
pub trait CompressionCodec: Send + Sync + fmt::Debug {
    fn id(&self) -> CompressionId;

    /// Lowercase configuration name, e.g. `"zlib"`
    fn name(&self) -> &'static str;

    fn compress(&self, data: &[u8]) -> BlockResult<Vec<u8>>;

    /// Decompress `data` into exactly `raw_size` bytes
    ///
    /// `raw_size` is read from the block table, which carries no checksum of
    /// its own. It must bound the output, never size an allocation directly.
    fn decompress(&self, data: &[u8], raw_size: usize) -> Result<Vec<u8>, String>;
}

/// Lookup table of available compression codecs
#[derive(Debug, Clone, Default)]
pub struct CompressionRegistry {
    codecs: BTreeMap<CompressionId, Arc<dyn CompressionCodec>>,
}

impl CompressionRegistry {
    /// Registry containing every codec compiled into the crate
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(ZlibCodec::default()));
        #[cfg(feature = "lz4")]
        registry.register(Arc::new(Lz4Codec));
        registry
    }

    /// Registry with no codecs at all
    pub fn empty() -> Self {
        Self {
            codecs: BTreeMap::new(),
        }
    }

    /// Add a codec, returning the codec previously registered under its id
    pub fn register(
        &mut self,
        codec: Arc<dyn CompressionCodec>,
    ) -> Option<Arc<dyn CompressionCodec>> {
        self.codecs.insert(codec.id(), codec)
    }

    pub fn get(&self, id: CompressionId) -> BlockResult<&Arc<dyn CompressionCodec>> {
        self.codecs
            .get(&id)
            .ok_or_else(|| BlockError::UnknownCodec(id.to_string()))
    }

    /// Resolve a codec by its configuration name (case-insensitive)
    pub fn id_by_name(&self, name: &str) -> BlockResult<CompressionId> {
        self.codecs
            .values()
            .find(|codec| codec.name().eq_ignore_ascii_case(name))
            .map(|codec| codec.id())
            .ok_or_else(|| BlockError::UnknownCodec(name.to_string()))
    }

    pub fn contains(&self, id: CompressionId) -> bool {
        self.codecs.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = CompressionId> + '_ {
        self.codecs.keys().copied()
    }

    /// Human readable name of an optional codec, `"none"` for raw storage
    pub fn display_name(&self, id: Option<CompressionId>) -> String {
        match id {
            None => "none".to_string(),
            Some(id) => self
                .codecs
                .get(&id)
                .map_or_else(|| id.to_string(), |codec| codec.name().to_string()),
        }
    }
}
