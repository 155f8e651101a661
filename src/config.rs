// SPDX-License-Identifier: MIT
//! Document write configuration

use serde::{Deserialize, Serialize};

use crate::block::StorageMode;
use crate::compression::{CompressionId, CompressionRegistry};
use crate::tags::codec::{CodecOptions, DEFAULT_INLINE_THRESHOLD};

/// Largest accepted inline threshold; bigger arrays always go to a block
pub const MAX_INLINE_THRESHOLD: usize = 1024 * 1024;

/// How documents store their blocks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Internal (same file) or external (companion file) block storage
    pub storage: StorageMode,
    /// Compression name for blocks allocated by codecs, `"none"` for raw
    pub compression: String,
    /// Array data up to this many bytes is written inline in the tree
    pub inline_threshold: usize,
    /// Sync files and their parent directory before a write is reported done
    pub durable_writes: bool,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            storage: StorageMode::Internal,
            compression: "none".to_string(),
            inline_threshold: DEFAULT_INLINE_THRESHOLD,
            durable_writes: true,
        }
    }
}

impl DocumentConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            storage: std::env::var("BLOCKDOC_STORAGE")
                .ok()
                .and_then(|s| match s.to_ascii_lowercase().as_str() {
                    "internal" => Some(StorageMode::Internal),
                    "external" => Some(StorageMode::External),
                    _ => None,
                })
                .unwrap_or(defaults.storage),
            compression: std::env::var("BLOCKDOC_COMPRESSION").unwrap_or(defaults.compression),
            inline_threshold: std::env::var("BLOCKDOC_INLINE_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.inline_threshold),
            durable_writes: std::env::var("BLOCKDOC_DURABLE_WRITES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.durable_writes),
        }
    }

    /// Parse a TOML table; missing keys take their defaults
    pub fn from_toml_str(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| format!("Invalid document config: {}", e))
    }

    /// Validate configuration against the available compression codecs
    pub fn validate(&self, registry: &CompressionRegistry) -> Result<(), String> {
        self.compression_id(registry)?;

        if self.inline_threshold > MAX_INLINE_THRESHOLD {
            return Err(format!(
                "inline_threshold must be at most {} bytes",
                MAX_INLINE_THRESHOLD
            ));
        }

        Ok(())
    }

    /// Resolved block compression, `None` for raw storage
    pub fn compression_id(
        &self,
        registry: &CompressionRegistry,
    ) -> Result<Option<CompressionId>, String> {
        if self.compression.is_empty() || self.compression.eq_ignore_ascii_case("none") {
            return Ok(None);
        }
        registry
            .id_by_name(&self.compression)
            .map(Some)
            .map_err(|_| format!("Unknown compression '{}'", self.compression))
    }

    /// Options handed to codecs while writing values
    pub fn codec_options(&self, registry: &CompressionRegistry) -> Result<CodecOptions, String> {
        Ok(CodecOptions {
            compression: self.compression_id(registry)?,
            inline_threshold: self.inline_threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DocumentConfig::default();
        let registry = CompressionRegistry::new();
        assert!(config.validate(&registry).is_ok());
        assert_eq!(config.compression_id(&registry).unwrap(), None);
    }

    #[test]
    fn test_from_toml() {
        let config = DocumentConfig::from_toml_str(
            r#"
            storage = "external"
            compression = "ZLIB"
            inline_threshold = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.storage, StorageMode::External);
        assert_eq!(config.inline_threshold, 0);
        assert!(config.durable_writes);
        assert_eq!(
            config.compression_id(&CompressionRegistry::new()).unwrap(),
            Some(CompressionId::ZLIB)
        );
    }

    #[test]
    fn test_from_toml_rejects_unknown_storage() {
        assert!(DocumentConfig::from_toml_str("storage = \"cloud\"").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let registry = CompressionRegistry::new();
        let config = DocumentConfig {
            compression: "snappy".to_string(),
            ..Default::default()
        };
        assert!(config.validate(&registry).unwrap_err().contains("snappy"));

        let config = DocumentConfig {
            inline_threshold: MAX_INLINE_THRESHOLD + 1,
            ..Default::default()
        };
        assert!(config.validate(&registry).is_err());
    }

    #[test]
    fn test_codec_options() {
        let config = DocumentConfig {
            compression: "zlib".to_string(),
            inline_threshold: 16,
            ..Default::default()
        };
        let options = config.codec_options(&CompressionRegistry::new()).unwrap();
        assert_eq!(options.compression, Some(CompressionId::ZLIB));
        assert_eq!(options.inline_threshold, 16);
    }
}
