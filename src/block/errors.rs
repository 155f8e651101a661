// SPDX-License-Identifier: MIT
//! Errors raised by the block engine and compression codecs

use thiserror::Error;

/// Errors that can occur while allocating, reading or laying out blocks
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Compression id or name is not present in the compression registry
    #[error("Unknown compression codec: {0}")]
    UnknownCodec(String),

    #[error("Block index {index} out of range (document has {len} blocks)")]
    BlockIndexOutOfRange { index: u32, len: usize },

    /// Stored or decompressed bytes do not match the recorded checksum
    #[error("Integrity check failed for block {index}: expected {expected}, got {actual}")]
    IntegrityError {
        index: u32,
        expected: String,
        actual: String,
    },

    #[error("Failed to decompress block {index} ({codec}): {message}")]
    DecodeError {
        index: u32,
        codec: String,
        message: String,
    },

    #[error("Failed to compress with {codec}: {message}")]
    EncodeError { codec: String, message: String },

    /// Block table or payload region is shorter than declared
    #[error("Truncated file: {0}")]
    TruncatedFile(String),

    #[error("Invalid block layout: {0}")]
    InvalidFormat(String),
}

/// Result type for block operations
pub type BlockResult<T> = Result<T, BlockError>;

impl BlockError {
    pub(crate) fn integrity(index: u32, expected: &[u8], actual: &[u8]) -> Self {
        Self::IntegrityError {
            index,
            expected: hex::encode(expected),
            actual: hex::encode(actual),
        }
    }

    pub(crate) fn truncated(what: impl Into<String>) -> Self {
        Self::TruncatedFile(what.into())
    }

    /// True for failures that concern the content of a single block
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            BlockError::IntegrityError { .. } | BlockError::DecodeError { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_error_renders_hex() {
        let err = BlockError::integrity(3, &[0xab, 0xcd], &[0x01]);
        let msg = err.to_string();
        assert!(msg.contains("block 3"));
        assert!(msg.contains("abcd"));
        assert!(msg.contains("01"));
        assert!(err.is_integrity_failure());
    }

    #[test]
    fn test_out_of_range_is_not_integrity_failure() {
        let err = BlockError::BlockIndexOutOfRange { index: 7, len: 2 };
        assert!(!err.is_integrity_failure());
        assert_eq!(
            err.to_string(),
            "Block index 7 out of range (document has 2 blocks)"
        );
    }
}
