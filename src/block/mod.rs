// SPDX-License-Identifier: MIT
//! Binary block storage engine
//!
//! Blocks are immutable binary payloads stored out-of-line from the document
//! tree. The [`BlockManager`] owns a document's blocks in allocation order,
//! lays them out behind the tree (or in a companion file), and produces
//! compacted copies holding only the blocks the tree still references.

pub mod checksum;
pub mod entry;
pub mod errors;
pub mod format;
pub mod manager;

pub use checksum::{Checksum, CHECKSUM_SIZE};
pub use entry::{Block, BlockRef};
pub use errors::{BlockError, BlockResult};
pub use format::{DocHeader, TableEntry, Trailer};
pub use manager::{BlockManager, BlockStats, IndexRemap, StorageMode};
