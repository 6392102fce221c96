//! # Hashing Utilities
//!
//! Two hash functions, each with a fixed job:
//!
//! - **SHA-256** — transaction ids, signature hashes, output ids, and the
//!   script hash inside P2WSH programs. Anything the ledger recomputes.
//! - **BLAKE3** — the 20-byte public-key hash inside P2WPKH programs and
//!   domain-separated hashes for derived identifiers.
//!
//! All functions return fixed-size arrays; callers wrap them in
//! [`crate::transaction::Hash`] where the value becomes an identifier.

use sha2::{Digest, Sha256};

/// Length of the public-key hash carried by P2WPKH programs and addresses.
pub const PUBKEY_HASH_LEN: usize = 20;

/// Compute the SHA-256 hash of the input data.
///
/// # Example
///
/// ```
/// use vela_protocol::crypto::sha256;
///
/// let hash = sha256(b"vela");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> [u8; 32] {
    sha256_multi(&[data])
}

/// SHA-256 over several slices fed in order, without concatenating them
/// first. `sha256_multi(&[a, b]) == sha256(a || b)`.
pub fn sha256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// BLAKE3 in `derive_key` mode.
///
/// Two different contexts never produce the same digest for the same data,
/// so identifiers derived for different purposes cannot collide.
pub fn domain_separated_hash(context: &str, data: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

/// The 20-byte public-key hash used by pay-to-witness-pubkey-hash programs.
pub fn pubkey_hash(pubkey: &[u8]) -> [u8; PUBKEY_HASH_LEN] {
    let digest = domain_separated_hash("vela 2026 pubkey hash", pubkey);
    let mut out = [0u8; PUBKEY_HASH_LEN];
    out.copy_from_slice(&digest[..PUBKEY_HASH_LEN]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256("abc"), FIPS 180-2 appendix B.1.
        let hash = sha256(b"abc");
        assert_eq!(
            hex::encode(hash),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha256_multi_matches_concatenation() {
        let joined = sha256(b"helloworld");
        let parts = sha256_multi(&[b"hello", b"world"]);
        assert_eq!(joined, parts);
    }

    #[test]
    fn test_domain_separation() {
        let a = domain_separated_hash("ctx a", b"data");
        let b = domain_separated_hash("ctx b", b"data");
        assert_ne!(a, b);
    }

    #[test]
    fn test_pubkey_hash_length() {
        let h = pubkey_hash(&[7u8; 32]);
        assert_eq!(h.len(), PUBKEY_HASH_LEN);
        assert_ne!(h, pubkey_hash(&[8u8; 32]));
    }
}
