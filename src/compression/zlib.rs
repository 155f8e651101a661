// SPDX-License-Identifier: MIT
//! zlib block compression (flate2 with the zlib-rs backend)

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::{CompressionCodec, CompressionId};
use crate::block::{BlockError, BlockResult};

/// zlib codec with a configurable compression level
#[derive(Debug, Clone, Copy)]
pub struct ZlibCodec {
    level: Compression,
}

impl ZlibCodec {
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for ZlibCodec {
    /// Fastest level: blocks are written once and read many times, and the
    /// ratio gain of higher levels is small for numeric data.
    fn default() -> Self {
        Self {
            level: Compression::fast(),
        }
    }
}

impl CompressionCodec for ZlibCodec {
    fn id(&self) -> CompressionId {
        CompressionId::ZLIB
    }

    fn name(&self) -> &'static str {
        "zlib"
    }

    fn compress(&self, data: &[u8]) -> BlockResult<Vec<u8>> {
        // 60% of the input is a typical ratio for array data
        let estimated_size = data.len().saturating_mul(6) / 10;
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(estimated_size.max(256)), self.level);

        encoder.write_all(data).map_err(|e| BlockError::EncodeError {
            codec: self.name().to_string(),
            message: format!("Write failed: {}", e),
        })?;

        encoder.finish().map_err(|e| BlockError::EncodeError {
            codec: self.name().to_string(),
            message: format!("Finish failed: {}", e),
        })
    }

    fn decompress(&self, data: &[u8], raw_size: usize) -> Result<Vec<u8>, String> {
        // raw_size comes from the block table and is only a hint until the
        // output has been checked against it
        let estimated_size = data.len().saturating_mul(3).max(1024).min(raw_size);
        let mut decompressed = Vec::with_capacity(estimated_size);

        let limit = (raw_size as u64).saturating_add(1);
        ZlibDecoder::new(data)
            .take(limit)
            .read_to_end(&mut decompressed)
            .map_err(|e| e.to_string())?;

        if decompressed.len() > raw_size {
            return Err(format!("stream holds more than {} raw bytes", raw_size));
        }
        if decompressed.len() < raw_size {
            return Err(format!(
                "expected {} raw bytes, stream holds {}",
                raw_size,
                decompressed.len()
            ));
        }
        Ok(decompressed)
    }
}
