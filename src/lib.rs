// SPDX-License-Identifier: MIT
//! # blockdoc
//!
//! A hybrid text/binary document format: a human-readable YAML tree that
//! references binary blocks holding large numeric payloads out of line.
//!
//! ## Format Overview
//!
//! A document is a YAML tree followed by its blocks. Tagged tree nodes such as
//! `!core/integer-1.0.0` tell a reader which codec turns them back into native
//! values, and `!block N` nodes point at block `N`. Blocks are immutable,
//! optionally compressed, and carry a CRC32 over their stored bytes plus a
//! SHA-256 over their decompressed bytes.
//!
//! ```text
//! Header (32 bytes)   magic "BLKDOC\r\n", version, flags, tree size
//! Tree                UTF-8 YAML
//! Payloads            stored block bytes (internal storage only)
//! Block table         64-byte entries: offset, sizes, codec, CRC32, SHA-256
//! Companion name      (external storage only)
//! Trailer (32 bytes)  table offset, block count, magic "BLKTABLE"
//! ```
//!
//! The trailer sits at the very end of the file, so the block table is found
//! with one seek no matter how large the payloads are. With external storage
//! the payloads live in a companion `<stem>.blocks` file instead.
//!
//! ## Key Features
//!
//! - **Versioned codecs**: tags resolve to the exact codec version or the
//!   newest one sharing its major version
//! - **Exact integers**: values beyond 52 bits round-trip through
//!   `core/integer` as sign plus 32-bit words
//! - **Per-block compression**: zlib, plus lz4 behind the `lz4` feature
//! - **Garbage collection**: [`compact_document`] drops unreferenced blocks,
//!   renumbers the rest and swaps the result in atomically
//!
//! ## Usage
//!
//! ```rust
//! use blockdoc::tags::{BigInt, Complex, NdArray, Value};
//! use blockdoc::Document;
//!
//! let mut doc = Document::new();
//! doc.insert("samples", NdArray::from_f64(&[0.5; 1024])).unwrap();
//! doc.insert("big", "123456789012345678901234567890".parse::<BigInt>().unwrap()).unwrap();
//! doc.insert("z", Complex::new(3.0, 4.0)).unwrap();
//!
//! let bytes = doc.encode(None).unwrap().main;
//! let reread = Document::from_bytes(bytes).unwrap();
//! assert_eq!(reread.get("z").unwrap(), Some(Value::Complex(Complex::new(3.0, 4.0))));
//! ```

pub mod block;
pub mod compression;
pub mod config;
pub mod document;
pub mod tags;
pub mod tree;

// Re-export main types
pub use block::{BlockError, BlockManager, BlockRef, BlockResult, StorageMode};
pub use compression::{CompressionCodec, CompressionId, CompressionRegistry};
pub use config::DocumentConfig;
pub use document::{
    compact_document, compact_document_with, CompactionReport, Document, DocumentError,
    DocumentResult,
};
pub use tags::{TagCodec, TagError, TagRegistry, TagResult, Value};
pub use tree::{Node, Tag, TagVersion};
