// SPDX-License-Identifier: MIT
//! Block checksums
//!
//! Two checks protect every block:
//! - CRC32 over the stored (possibly compressed) bytes, verified before
//!   decompression so a flipped bit is reported as an integrity failure
//!   rather than as a codec error.
//! - SHA-256 over the raw (decompressed) bytes, verified after decompression.

use crc32fast::Hasher;
use sha2::{Digest, Sha256};

/// Length of the raw-data checksum stored in each block table entry
pub const CHECKSUM_SIZE: usize = 32;

/// SHA-256 digest of a block's raw bytes
pub type Checksum = [u8; CHECKSUM_SIZE];

/// SHA-256 over raw block bytes
pub fn compute_checksum(data: &[u8]) -> Checksum {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// CRC32 (IEEE) over stored block bytes
pub fn compute_stored_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_of_empty_input() {
        assert_eq!(
            hex::encode(compute_checksum(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_checksums_detect_single_bit_flip() {
        let mut data = vec![0x00, 0x01, 0x02, 0x03, 0x04];
        let sha = compute_checksum(&data);
        let crc = compute_stored_crc(&data);
        data[2] ^= 0x01;
        assert_ne!(sha, compute_checksum(&data));
        assert_ne!(crc, compute_stored_crc(&data));
    }
}
