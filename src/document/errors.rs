// SPDX-License-Identifier: MIT
//! Errors raised while reading, writing or compacting documents

use std::path::PathBuf;

use thiserror::Error;

use crate::block::BlockError;
use crate::tags::TagError;
use crate::tree::TreeError;

/// Errors that can occur at the document level
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error(transparent)]
    Block(#[from] BlockError),

    #[error(transparent)]
    Tag(#[from] TagError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Header, trailer or region bounds are inconsistent
    #[error("Invalid document header: {0}")]
    InvalidHeader(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The tree root is not a mapping, or a key holds the wrong node
    #[error("Invalid document tree: {0}")]
    InvalidTree(String),

    /// Recompression left more payload bytes than the input's live blocks
    #[error("Compacted payload of {output} bytes exceeds the {live} live bytes of the input")]
    CompactionGrew { live: u64, output: u64 },

    /// Compaction stopped before anything was committed
    #[error("Compaction of {} aborted: {source}", input.display())]
    CompactionAborted {
        input: PathBuf,
        #[source]
        source: Box<DocumentError>,
    },
}

/// Result type for document operations
pub type DocumentResult<T> = Result<T, DocumentError>;

impl DocumentError {
    /// Underlying block error, looking through tag and compaction wrappers
    pub fn block_error(&self) -> Option<&BlockError> {
        match self {
            DocumentError::Block(e) => Some(e),
            DocumentError::Tag(TagError::Block(e)) => Some(e),
            DocumentError::CompactionAborted { source, .. } => source.block_error(),
            _ => None,
        }
    }
}
