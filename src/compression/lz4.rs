// SPDX-License-Identifier: MIT
//! LZ4 block compression (lz4_flex, pure Rust)

use super::{CompressionCodec, CompressionId};
use crate::block::BlockResult;

/// Upper bound on the LZ4 block format's output to input ratio
const MAX_EXPANSION: usize = 255;

/// LZ4 block-format codec; relies on the raw size stored in the block table
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Codec;

impl CompressionCodec for Lz4Codec {
    fn id(&self) -> CompressionId {
        CompressionId::LZ4
    }

    fn name(&self) -> &'static str {
        "lz4"
    }

    fn compress(&self, data: &[u8]) -> BlockResult<Vec<u8>> {
        Ok(lz4_flex::block::compress(data))
    }

    fn decompress(&self, data: &[u8], raw_size: usize) -> Result<Vec<u8>, String> {
        // lz4_flex allocates raw_size up front, so bound it by what the
        // stored bytes could possibly expand to
        let max_size = data.len().saturating_mul(MAX_EXPANSION);
        if raw_size > max_size {
            return Err(format!(
                "raw size {} exceeds what {} stored bytes can expand to",
                raw_size,
                data.len()
            ));
        }
        let decompressed = lz4_flex::block::decompress(data, raw_size)
            .map_err(|e| format!("LZ4 decompress error: {:?}", e))?;
        if decompressed.len() != raw_size {
            return Err(format!(
                "expected {} raw bytes, stream holds {}",
                raw_size,
                decompressed.len()
            ));
        }
        Ok(decompressed)
    }
}
