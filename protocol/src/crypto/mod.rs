//! # Cryptographic Primitives for Vela
//!
//! Hashing and extended Ed25519 keys. Everything here is a thin, typed
//! wrapper around audited implementations:
//!
//! - **Ed25519** (`ed25519-dalek`, `curve25519-dalek`) for signatures and
//!   additive child-key derivation.
//! - **SHA-256** for ledger-visible identifiers and signature hashes.
//! - **BLAKE3** for public-key hashes and domain-separated digests.

pub mod hash;
pub mod keys;

pub use hash::{pubkey_hash, sha256, sha256_multi};
pub use keys::{derive_xpubs, xpub_keys, KeyError, XPrv, XPub};
