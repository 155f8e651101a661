// SPDX-License-Identifier: MIT
//! Block and block reference types

use std::fmt;

use bytes::Bytes;

use super::checksum::{compute_checksum, compute_stored_crc, Checksum};
use super::format::TableEntry;
use super::{BlockError, BlockResult};
use crate::compression::{CompressionCodec, CompressionId, CompressionRegistry};

/// Pointer from the tree to a block, by index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockRef {
    index: u32,
}

impl BlockRef {
    pub const fn new(index: u32) -> Self {
        Self { index }
    }

    pub const fn index(self) -> u32 {
        self.index
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block #{}", self.index)
    }
}

/// One immutable binary payload plus its metadata
///
/// `data` holds the stored bytes (post-compression); `raw_size` is the
/// length after decompression. Blocks are never modified in place: a
/// rewritten block is a new `Block` with a new index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    index: u32,
    data: Bytes,
    compression: Option<CompressionId>,
    raw_size: u64,
    stored_crc: u32,
    checksum: Checksum,
}

impl Block {
    /// Build a block from raw bytes, compressing with `codec` if given
    pub fn seal(
        index: u32,
        raw: &[u8],
        codec: Option<&dyn CompressionCodec>,
    ) -> BlockResult<Self> {
        let checksum = compute_checksum(raw);
        let (data, compression) = match codec {
            Some(codec) => (Bytes::from(codec.compress(raw)?), Some(codec.id())),
            None => (Bytes::copy_from_slice(raw), None),
        };

        Ok(Self {
            index,
            stored_crc: compute_stored_crc(&data),
            data,
            compression,
            raw_size: raw.len() as u64,
            checksum,
        })
    }

    /// Rebuild a block from a table entry and its stored bytes
    pub fn from_entry(index: u32, entry: &TableEntry, data: Bytes) -> Self {
        Self {
            index,
            data,
            compression: entry.compression,
            raw_size: entry.raw_size,
            stored_crc: entry.stored_crc,
            checksum: entry.checksum,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn block_ref(&self) -> BlockRef {
        BlockRef::new(self.index)
    }

    /// Stored (possibly compressed) bytes
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn compression(&self) -> Option<CompressionId> {
        self.compression
    }

    pub fn raw_size(&self) -> u64 {
        self.raw_size
    }

    pub fn stored_size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn checksum(&self) -> &Checksum {
        &self.checksum
    }

    /// Table entry for this block with its payload placed at `offset`
    pub fn entry_at(&self, offset: u64) -> TableEntry {
        TableEntry {
            offset,
            stored_size: self.stored_size(),
            raw_size: self.raw_size,
            compression: self.compression,
            stored_crc: self.stored_crc,
            checksum: self.checksum,
        }
    }

    /// Same stored bytes under a new index
    pub fn reindexed(&self, index: u32) -> Self {
        Self {
            index,
            ..self.clone()
        }
    }

    /// Verify and decompress the payload
    pub fn decode(&self, registry: &CompressionRegistry) -> BlockResult<Vec<u8>> {
        let crc = compute_stored_crc(&self.data);
        if crc != self.stored_crc {
            return Err(BlockError::integrity(
                self.index,
                &self.stored_crc.to_be_bytes(),
                &crc.to_be_bytes(),
            ));
        }

        let raw = match self.compression {
            None => self.data.to_vec(),
            Some(id) => {
                let codec = registry.get(id)?;
                let raw_size =
                    usize::try_from(self.raw_size).map_err(|_| BlockError::IntegrityError {
                        index: self.index,
                        expected: format!("{} raw bytes", self.raw_size),
                        actual: "more than the address space".to_string(),
                    })?;
                codec
                    .decompress(&self.data, raw_size)
                    .map_err(|message| BlockError::DecodeError {
                        index: self.index,
                        codec: codec.name().to_string(),
                        message,
                    })?
            }
        };

        if raw.len() as u64 != self.raw_size {
            return Err(BlockError::IntegrityError {
                index: self.index,
                expected: format!("{} raw bytes", self.raw_size),
                actual: format!("{} raw bytes", raw.len()),
            });
        }

        let checksum = compute_checksum(&raw);
        if checksum != self.checksum {
            return Err(BlockError::integrity(self.index, &self.checksum, &checksum));
        }

        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::ZlibCodec;

    #[test]
    fn test_seal_uncompressed() {
        let block = Block::seal(0, b"hello blocks", None).unwrap();
        assert_eq!(block.stored_size(), 12);
        assert_eq!(block.raw_size(), 12);
        assert_eq!(block.compression(), None);
        assert_eq!(
            block.decode(&CompressionRegistry::new()).unwrap(),
            b"hello blocks"
        );
    }

    #[test]
    fn test_seal_compressed() {
        let raw = vec![1u8; 10_000];
        let block = Block::seal(4, &raw, Some(&ZlibCodec::default())).unwrap();
        assert_eq!(block.compression(), Some(CompressionId::ZLIB));
        assert!(block.stored_size() < block.raw_size());
        assert_eq!(block.decode(&CompressionRegistry::new()).unwrap(), raw);
    }

    #[test]
    fn test_corrupt_raw_size_is_decode_error() {
        let raw = vec![5u8; 4096];
        let block = Block::seal(2, &raw, Some(&ZlibCodec::default())).unwrap();

        for raw_size in [u64::MAX, 1 << 62, 4095, 4097] {
            let mut entry = block.entry_at(0);
            entry.raw_size = raw_size;
            let corrupted = Block::from_entry(2, &entry, block.data().clone());
            assert!(
                matches!(
                    corrupted.decode(&CompressionRegistry::new()),
                    Err(BlockError::DecodeError { index: 2, .. }
                        | BlockError::IntegrityError { index: 2, .. })
                ),
                "raw size {}",
                raw_size
            );
        }
    }

    #[test]
    fn test_corrupt_stored_byte_is_integrity_error() {
        let raw = vec![3u8; 2048];
        let block = Block::seal(1, &raw, Some(&ZlibCodec::default())).unwrap();

        let mut bytes = block.data().to_vec();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xff;
        let corrupted = Block::from_entry(1, &block.entry_at(0), Bytes::from(bytes));

        assert!(matches!(
            corrupted.decode(&CompressionRegistry::new()),
            Err(BlockError::IntegrityError { index: 1, .. })
        ));
    }

    #[test]
    fn test_undecodable_payload_is_decode_error() {
        // CRC matches the garbage, so the failure surfaces in the codec
        let garbage = Bytes::from_static(b"not a zlib stream at all");
        let entry = TableEntry {
            offset: 0,
            stored_size: garbage.len() as u64,
            raw_size: 64,
            compression: Some(CompressionId::ZLIB),
            stored_crc: compute_stored_crc(&garbage),
            checksum: [0u8; 32],
        };
        let block = Block::from_entry(2, &entry, garbage);

        assert!(matches!(
            block.decode(&CompressionRegistry::new()),
            Err(BlockError::DecodeError { index: 2, .. })
        ));
    }

    #[test]
    fn test_unregistered_codec_on_read() {
        let block = Block::seal(0, b"data", Some(&ZlibCodec::default())).unwrap();
        assert!(matches!(
            block.decode(&CompressionRegistry::empty()),
            Err(BlockError::UnknownCodec(_))
        ));
    }

    #[test]
    fn test_reindexed_keeps_payload() {
        let block = Block::seal(5, b"payload", None).unwrap();
        let moved = block.reindexed(0);
        assert_eq!(moved.index(), 0);
        assert_eq!(moved.data(), block.data());
        assert_eq!(moved.checksum(), block.checksum());
    }
}
