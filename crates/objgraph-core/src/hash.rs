//! Chunk checksums.
//!
//! Every chunk carries the SHA-256 digest of its raw bytes, stored as a
//! lowercase hex string in the wire envelope.

use sha2::{Digest, Sha256};

/// A 32-byte SHA-256 digest.
pub type ContentHash = [u8; 32];

/// Compute the SHA-256 digest of a byte slice.
pub fn content_hash(data: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Format a digest as a lowercase hex string.
pub fn hash_hex(hash: &ContentHash) -> String {
    hex::encode(hash)
}

/// SHA-256 of `data`, hex encoded. This is the checksum format used by chunks.
pub fn sha256_hex(data: &[u8]) -> String {
    hash_hex(&content_hash(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_hash() {
        let h1 = content_hash(b"hello world");
        let h2 = content_hash(b"hello world");
        assert_eq!(h1, h2);
    }

    #[test]
    fn different_inputs_different_hash() {
        assert_ne!(content_hash(b"hello"), content_hash(b"world"));
    }

    #[test]
    fn hex_format() {
        let hex = sha256_hex(&[42u8]);
        assert_eq!(hex.len(), 64); // 32 bytes * 2 hex chars each
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn empty_input_digest() {
        assert_eq!(
            sha256_hex(&[]),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
