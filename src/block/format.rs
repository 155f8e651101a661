// SPDX-License-Identifier: MIT
//! On-disk layout of a block document
//!
//! ```text
//! Header (32 bytes, little-endian):
//! - Magic: "BLKDOC\r\n" (8 bytes)
//! - Version: 1 (4 bytes)
//! - Flags: storage flags (4 bytes)
//! - Tree Size: length of the YAML tree (8 bytes)
//! - Reserved (8 bytes)
//!
//! Tree: UTF-8 YAML (tree_size bytes)
//! Payloads: stored block bytes, back to back (internal storage only)
//! Block table: block_count entries of 64 bytes
//! Companion name: UTF-8 file name (external storage only)
//!
//! Trailer (32 bytes, little-endian, always the last bytes of the file):
//! - Table Offset (8 bytes)
//! - Block Count (4 bytes)
//! - Entry Size: 64 (2 bytes)
//! - Flags (2 bytes)
//! - Companion Name Length (4 bytes)
//! - Reserved (4 bytes)
//! - Magic: "BLKTABLE" (8 bytes)
//! ```
//!
//! The trailer sits at a fixed distance from the end of the file so a reader
//! finds the block table with one seek, without scanning payloads.

use super::checksum::{Checksum, CHECKSUM_SIZE};
use super::{BlockError, BlockResult};
use crate::compression::CompressionId;

/// Document magic bytes
pub const DOC_MAGIC: &[u8; 8] = b"BLKDOC\r\n";

/// Trailer magic bytes
pub const TRAILER_MAGIC: &[u8; 8] = b"BLKTABLE";

/// Companion block file magic bytes
pub const COMPANION_MAGIC: &[u8; 8] = b"BLKDATA\0";

/// Format version
pub const FORMAT_VERSION: u32 = 1;

/// Header size in bytes
pub const HEADER_SIZE: usize = 32;

/// Trailer size in bytes
pub const TRAILER_SIZE: usize = 32;

/// Block table entry size in bytes
pub const TABLE_ENTRY_SIZE: usize = 64;

/// Header and trailer flags
pub mod flags {
    /// Block payloads live in a companion file
    pub const EXTERNAL_BLOCKS: u32 = 0x0000_0001;
}

fn le_u16(bytes: &[u8], at: usize) -> u16 {
    let mut buf = [0u8; 2];
    buf.copy_from_slice(&bytes[at..at + 2]);
    u16::from_le_bytes(buf)
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}

fn le_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}

/// Fixed document header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocHeader {
    pub version: u32,
    pub flags: u32,
    pub tree_size: u64,
}

impl DocHeader {
    pub fn new(flags: u32, tree_size: u64) -> Self {
        Self {
            version: FORMAT_VERSION,
            flags,
            tree_size,
        }
    }

    pub fn is_external(&self) -> bool {
        self.flags & flags::EXTERNAL_BLOCKS != 0
    }

    /// Parse and validate the header at the start of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> BlockResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(BlockError::truncated(format!(
                "header needs {} bytes, file has {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }
        if &bytes[0..8] != DOC_MAGIC {
            return Err(BlockError::InvalidFormat(
                "Invalid document magic bytes".to_string(),
            ));
        }

        let version = le_u32(bytes, 8);
        if version != FORMAT_VERSION {
            return Err(BlockError::InvalidFormat(format!(
                "Unsupported version: expected {}, got {}",
                FORMAT_VERSION, version
            )));
        }

        Ok(Self {
            version,
            flags: le_u32(bytes, 12),
            tree_size: le_u64(bytes, 16),
        })
    }

    pub fn write_to_buffer(&self, buffer: &mut Vec<u8>) {
        buffer.reserve(HEADER_SIZE);
        buffer.extend_from_slice(DOC_MAGIC);
        buffer.extend_from_slice(&self.version.to_le_bytes());
        buffer.extend_from_slice(&self.flags.to_le_bytes());
        buffer.extend_from_slice(&self.tree_size.to_le_bytes());
        buffer.extend_from_slice(&0u64.to_le_bytes());
    }
}

/// One row of the block table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableEntry {
    /// Absolute offset of the stored bytes in the payload file
    pub offset: u64,
    pub stored_size: u64,
    pub raw_size: u64,
    pub compression: Option<CompressionId>,
    pub stored_crc: u32,
    pub checksum: Checksum,
}

impl TableEntry {
    pub fn from_bytes(bytes: &[u8]) -> BlockResult<Self> {
        if bytes.len() < TABLE_ENTRY_SIZE {
            return Err(BlockError::truncated("block table entry"));
        }

        let mut checksum = [0u8; CHECKSUM_SIZE];
        checksum.copy_from_slice(&bytes[32..32 + CHECKSUM_SIZE]);

        Ok(Self {
            offset: le_u64(bytes, 0),
            stored_size: le_u64(bytes, 8),
            raw_size: le_u64(bytes, 16),
            compression: CompressionId::from_wire(le_u16(bytes, 24)),
            // bytes 26..28 reserved
            stored_crc: le_u32(bytes, 28),
            checksum,
        })
    }

    pub fn write_to_buffer(&self, buffer: &mut Vec<u8>) {
        buffer.reserve(TABLE_ENTRY_SIZE);
        buffer.extend_from_slice(&self.offset.to_le_bytes());
        buffer.extend_from_slice(&self.stored_size.to_le_bytes());
        buffer.extend_from_slice(&self.raw_size.to_le_bytes());
        buffer.extend_from_slice(&CompressionId::to_wire(self.compression).to_le_bytes());
        buffer.extend_from_slice(&0u16.to_le_bytes());
        buffer.extend_from_slice(&self.stored_crc.to_le_bytes());
        buffer.extend_from_slice(&self.checksum);
    }

    /// End of the stored bytes, or `None` on overflow
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.stored_size)
    }
}

/// Fixed trailer locating the block table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    pub table_offset: u64,
    pub block_count: u32,
    pub flags: u16,
    pub companion_len: u32,
}

impl Trailer {
    /// Parse the trailer from the last `TRAILER_SIZE` bytes of `file`
    pub fn from_file_end(file: &[u8]) -> BlockResult<Self> {
        if file.len() < HEADER_SIZE + TRAILER_SIZE {
            return Err(BlockError::truncated(format!(
                "file of {} bytes cannot hold header and trailer",
                file.len()
            )));
        }
        let bytes = &file[file.len() - TRAILER_SIZE..];
        if &bytes[24..32] != TRAILER_MAGIC {
            return Err(BlockError::truncated("block table trailer not found"));
        }

        let entry_size = le_u16(bytes, 12);
        if entry_size as usize != TABLE_ENTRY_SIZE {
            return Err(BlockError::InvalidFormat(format!(
                "Unsupported table entry size: {}",
                entry_size
            )));
        }

        Ok(Self {
            table_offset: le_u64(bytes, 0),
            block_count: le_u32(bytes, 8),
            flags: le_u16(bytes, 14),
            companion_len: le_u32(bytes, 16),
        })
    }

    pub fn write_to_buffer(&self, buffer: &mut Vec<u8>) {
        buffer.reserve(TRAILER_SIZE);
        buffer.extend_from_slice(&self.table_offset.to_le_bytes());
        buffer.extend_from_slice(&self.block_count.to_le_bytes());
        buffer.extend_from_slice(&(TABLE_ENTRY_SIZE as u16).to_le_bytes());
        buffer.extend_from_slice(&self.flags.to_le_bytes());
        buffer.extend_from_slice(&self.companion_len.to_le_bytes());
        buffer.extend_from_slice(&0u32.to_le_bytes());
        buffer.extend_from_slice(TRAILER_MAGIC);
    }

    /// Length of the block table in bytes
    pub fn table_len(&self) -> u64 {
        self.block_count as u64 * TABLE_ENTRY_SIZE as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> TableEntry {
        TableEntry {
            offset: 4096,
            stored_size: 100,
            raw_size: 400,
            compression: Some(CompressionId::ZLIB),
            stored_crc: 0xdead_beef,
            checksum: [9u8; CHECKSUM_SIZE],
        }
    }

    #[test]
    fn test_header_layout() {
        let mut buffer = Vec::new();
        DocHeader::new(flags::EXTERNAL_BLOCKS, 1234).write_to_buffer(&mut buffer);
        assert_eq!(buffer.len(), HEADER_SIZE);
        assert_eq!(&buffer[0..8], DOC_MAGIC);

        let header = DocHeader::from_bytes(&buffer).unwrap();
        assert!(header.is_external());
        assert_eq!(header.tree_size, 1234);
    }

    #[test]
    fn test_header_invalid_magic() {
        let mut buffer = Vec::new();
        DocHeader::new(0, 0).write_to_buffer(&mut buffer);
        buffer[0] = b'X';
        assert!(matches!(
            DocHeader::from_bytes(&buffer),
            Err(BlockError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_header_invalid_version() {
        let mut buffer = Vec::new();
        DocHeader::new(0, 0).write_to_buffer(&mut buffer);
        buffer[8] = 99;
        assert!(DocHeader::from_bytes(&buffer).is_err());
    }

    #[test]
    fn test_header_too_short() {
        assert!(matches!(
            DocHeader::from_bytes(&[0u8; 12]),
            Err(BlockError::TruncatedFile(_))
        ));
    }

    #[test]
    fn test_entry_layout() {
        let mut buffer = Vec::new();
        sample_entry().write_to_buffer(&mut buffer);
        assert_eq!(buffer.len(), TABLE_ENTRY_SIZE);
        assert_eq!(TableEntry::from_bytes(&buffer).unwrap(), sample_entry());
    }

    #[test]
    fn test_uncompressed_entry_uses_zero_id() {
        let mut entry = sample_entry();
        entry.compression = None;
        let mut buffer = Vec::new();
        entry.write_to_buffer(&mut buffer);
        assert_eq!(&buffer[24..26], &[0, 0]);
        assert_eq!(TableEntry::from_bytes(&buffer).unwrap().compression, None);
    }

    #[test]
    fn test_trailer_at_file_end() {
        let mut file = vec![0u8; HEADER_SIZE + 10];
        let trailer = Trailer {
            table_offset: 42,
            block_count: 3,
            flags: 1,
            companion_len: 11,
        };
        trailer.write_to_buffer(&mut file);

        let parsed = Trailer::from_file_end(&file).unwrap();
        assert_eq!(parsed, trailer);
        assert_eq!(parsed.table_len(), 3 * TABLE_ENTRY_SIZE as u64);
    }

    #[test]
    fn test_missing_trailer_is_truncation() {
        let file = vec![0u8; HEADER_SIZE + TRAILER_SIZE];
        assert!(matches!(
            Trailer::from_file_end(&file),
            Err(BlockError::TruncatedFile(_))
        ));
    }
}
