// SPDX-License-Identifier: MIT
//! Errors raised by tag codecs and the codec registry

use thiserror::Error;

use crate::block::BlockError;

/// Errors that can occur while converting between values and tree nodes
#[derive(Debug, Error)]
pub enum TagError {
    /// No codec is registered under the tag name
    #[error("Unknown tag: {0}")]
    UnknownTag(String),

    /// The exact (name, version) pair is already registered
    #[error("Codec already registered: {0}")]
    DuplicateCodec(String),

    #[error("No compatible version of {tag} (registered: {available})")]
    IncompatibleVersion { tag: String, available: String },

    #[error("Invalid complex literal: '{0}'")]
    InvalidComplexLiteral(String),

    #[error("Invalid integer literal: '{0}'")]
    InvalidInteger(String),

    /// Payload shape does not match what the codec expects
    #[error("Invalid {tag} payload: {message}")]
    InvalidTree { tag: String, message: String },

    #[error("No codec accepts values of kind {0}")]
    NoCodecForValue(String),

    #[error("Block reference to block {0} outside of a tagged value")]
    UnexpectedBlockRef(u32),

    #[error(transparent)]
    Block(#[from] BlockError),
}

/// Result type for codec operations
pub type TagResult<T> = Result<T, TagError>;

impl TagError {
    pub(crate) fn invalid_tree(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTree {
            tag: tag.into(),
            message: message.into(),
        }
    }
}
