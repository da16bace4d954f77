//! Hashing primitives
//!
//! SHA-256 based helpers used for block hashes, transaction ids,
//! address checksums and the proof-of-work target check.

use sha2::{Digest, Sha256};

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes double SHA-256 hash (SHA-256 of SHA-256)
pub fn double_sha256(data: &[u8]) -> Vec<u8> {
    sha256(&sha256(data))
}

/// Checks whether `hash` starts with at least `difficulty` zero bits
pub fn meets_difficulty(hash: &[u8], difficulty: u32) -> bool {
    let required_zeros = difficulty as usize / 8;
    let remaining_bits = difficulty as usize % 8;

    if required_zeros > hash.len() {
        return false;
    }

    for byte in hash.iter().take(required_zeros) {
        if *byte != 0 {
            return false;
        }
    }

    if remaining_bits > 0 {
        match hash.get(required_zeros) {
            Some(byte) => {
                let mask = 0xFFu8 << (8 - remaining_bits);
                if byte & mask != 0 {
                    return false;
                }
            }
            None => return false,
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        let data = b"hello world";
        assert_eq!(sha256(data).len(), 32);
        assert_eq!(
            hex::encode(sha256(data)),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_double_sha256_differs_from_single() {
        let data = b"hello world";
        assert_ne!(double_sha256(data), sha256(data));
        assert_eq!(double_sha256(data), sha256(&sha256(data)));
    }

    #[test]
    fn test_meets_difficulty() {
        let hash = vec![0x00, 0x00, 0x0F, 0xFF, 0xFF, 0xFF];
        assert!(meets_difficulty(&hash, 0));
        assert!(meets_difficulty(&hash, 16));
        assert!(meets_difficulty(&hash, 20));
        assert!(!meets_difficulty(&hash, 21));
        assert!(!meets_difficulty(&hash, 24));
    }

    #[test]
    fn test_difficulty_longer_than_hash() {
        let hash = vec![0x00, 0x00];
        assert!(meets_difficulty(&hash, 16));
        assert!(!meets_difficulty(&hash, 17));
        assert!(!meets_difficulty(&hash, 64));
    }
}
