// SPDX-License-Identifier: MIT
//! Document tree model and its YAML text form

pub mod node;
pub mod tag;
pub mod yaml;

use thiserror::Error;

pub use node::Node;
pub use tag::{Tag, TagVersion};

/// Errors raised while converting between the tree and its text form
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    #[error("Unsupported tree content: {0}")]
    Unsupported(String),
}

/// Result type for tree text conversion
pub type TreeResult<T> = Result<T, TreeError>;
