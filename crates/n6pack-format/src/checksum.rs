//! CRC-32 and SHA-256 helpers shared by both container formats.

use sha2::{Digest, Sha256};

/// Width of every checksum field in both formats.
pub const CHECKSUM_FIELD_SIZE: usize = 4;

/// Size of a SHA-256 digest.
pub const SHA256_SIZE: usize = 32;

/// Calculate the CRC-32 (ISO-HDLC, zlib variant) of data.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Calculate the CRC-32 of `data` as if the 4-byte field at `offset` were zero.
///
/// This is the exclusion rule for self-referential checksum fields: the
/// stored checksum never contributes to its own value. An `offset` whose
/// field does not fit inside `data` leaves the input unmodified.
pub fn crc32_excluding(data: &[u8], offset: usize) -> u32 {
    let Some(end) = offset
        .checked_add(CHECKSUM_FIELD_SIZE)
        .filter(|&end| end <= data.len())
    else {
        return crc32(data);
    };

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&data[..offset]);
    hasher.update(&[0u8; CHECKSUM_FIELD_SIZE]);
    hasher.update(&data[end..]);
    hasher.finalize()
}

/// Calculate the SHA-256 digest of data.
pub fn sha256(data: &[u8]) -> [u8; SHA256_SIZE] {
    Sha256::digest(data).into()
}

/// Lowercase hex rendering of a digest.
pub fn sha256_hex(digest: &[u8; SHA256_SIZE]) -> String {
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_basic() {
        assert_eq!(crc32(b"hello world"), 0x0D4A_1185);
    }

    #[test]
    fn test_crc32_empty() {
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn test_crc32_check_value() {
        // Standard CRC-32/ISO-HDLC check value.
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_crc32_excluding_matches_zeroed_copy() {
        let data: Vec<u8> = (0u8..64).collect();
        let mut zeroed = data.clone();
        zeroed[20..24].fill(0);

        assert_eq!(crc32_excluding(&data, 20), crc32(&zeroed));
    }

    #[test]
    fn test_crc32_excluding_ignores_field_contents() {
        let mut a = vec![7u8; 32];
        let mut b = a.clone();
        a[8..12].copy_from_slice(&0x1234_5678u32.to_le_bytes());
        b[8..12].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());

        assert_eq!(crc32_excluding(&a, 8), crc32_excluding(&b, 8));
    }

    #[test]
    fn test_crc32_excluding_out_of_range_offset() {
        let data = [1u8, 2, 3];
        assert_eq!(crc32_excluding(&data, 2), crc32(&data));
    }

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            sha256_hex(&sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
