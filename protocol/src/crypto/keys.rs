//! # Extended Keys
//!
//! Ed25519 keys extended with a chain code so that child public keys can be
//! derived from a parent public key alone. Accounts are described by their
//! root [`XPub`]s; every control program and every signature slot names a
//! root key plus a derivation path, and only the holder of the matching
//! [`XPrv`] can produce the signature.
//!
//! ## Derivation
//!
//! For each path segment `seg`:
//!
//! ```text
//! I      = SHA-512("N" || pubkey || chain_code || len(seg) || seg)
//! tweak  = I[0..32] mod l
//! child  = parent + tweak·B          (public side)
//! child  = parent_scalar + tweak     (private side)
//! chain' = I[32..64]
//! ```
//!
//! The private and public sides agree by construction, which is what lets a
//! watch-only node hand out change addresses that a remote signer can later
//! spend. Derivation is non-hardened only.
//!
//! Derived scalars are not clamped, so signing goes through the dalek
//! `hazmat` API with an explicit expanded secret key.

use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::hazmat::{raw_sign, ExpandedSecretKey};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha512};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of a serialized [`XPub`] or [`XPrv`]: 32 key bytes + 32 chain-code bytes.
pub const EXTENDED_KEY_LEN: usize = 64;

/// Length of an Ed25519 signature.
pub const SIGNATURE_LEN: usize = 64;

/// Errors that can occur during key operations.
///
/// Deliberately terse about key material.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid extended key encoding")]
    InvalidEncoding,

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,
}

// ---------------------------------------------------------------------------
// Derivation helpers
// ---------------------------------------------------------------------------

fn child_tweak(pubkey: &[u8; 32], chain_code: &[u8; 32], segment: &[u8]) -> (Scalar, [u8; 32]) {
    let mut hasher = Sha512::new();
    hasher.update(b"N");
    hasher.update(pubkey);
    hasher.update(chain_code);
    hasher.update((segment.len() as u32).to_le_bytes());
    hasher.update(segment);
    let out = hasher.finalize();

    let mut tweak = [0u8; 32];
    tweak.copy_from_slice(&out[..32]);
    let mut chain = [0u8; 32];
    chain.copy_from_slice(&out[32..]);
    (Scalar::from_bytes_mod_order(tweak), chain)
}

fn split(bytes: &[u8; EXTENDED_KEY_LEN]) -> ([u8; 32], [u8; 32]) {
    let mut key = [0u8; 32];
    let mut chain = [0u8; 32];
    key.copy_from_slice(&bytes[..32]);
    chain.copy_from_slice(&bytes[32..]);
    (key, chain)
}

fn join(key: &[u8; 32], chain: &[u8; 32]) -> [u8; EXTENDED_KEY_LEN] {
    let mut out = [0u8; EXTENDED_KEY_LEN];
    out[..32].copy_from_slice(key);
    out[32..].copy_from_slice(chain);
    out
}

fn decode_extended(s: &str) -> Result<[u8; EXTENDED_KEY_LEN], KeyError> {
    let bytes = hex::decode(s).map_err(|_| KeyError::InvalidEncoding)?;
    bytes.try_into().map_err(|_| KeyError::InvalidEncoding)
}

// ---------------------------------------------------------------------------
// XPub
// ---------------------------------------------------------------------------

/// An extended public key: compressed Edwards point plus chain code.
///
/// Serializes as 128 hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct XPub([u8; EXTENDED_KEY_LEN]);

impl XPub {
    /// Parse raw bytes, rejecting anything that is not a curve point.
    pub fn from_bytes(bytes: [u8; EXTENDED_KEY_LEN]) -> Result<Self, KeyError> {
        let (key, _) = split(&bytes);
        CompressedEdwardsY(key)
            .decompress()
            .ok_or(KeyError::InvalidPublicKey)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; EXTENDED_KEY_LEN] {
        &self.0
    }

    /// The 32-byte Ed25519 public key.
    pub fn public_key(&self) -> [u8; 32] {
        split(&self.0).0
    }

    pub fn chain_code(&self) -> [u8; 32] {
        split(&self.0).1
    }

    fn point(&self) -> Result<EdwardsPoint, KeyError> {
        CompressedEdwardsY(self.public_key())
            .decompress()
            .ok_or(KeyError::InvalidPublicKey)
    }

    /// Derive the child key at `path`. An empty path returns `self`.
    pub fn derive<S: AsRef<[u8]>>(&self, path: &[S]) -> Result<XPub, KeyError> {
        let mut point = self.point()?;
        let (mut key, mut chain) = split(&self.0);
        for segment in path {
            let (tweak, child_chain) = child_tweak(&key, &chain, segment.as_ref());
            point += EdwardsPoint::mul_base(&tweak);
            key = point.compress().to_bytes();
            chain = child_chain;
        }
        Ok(XPub(join(&key, &chain)))
    }

    /// Verify an Ed25519 signature made by this key.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(sig_bytes) = <[u8; SIGNATURE_LEN]>::try_from(signature) else {
            return false;
        };
        let Ok(vk) = VerifyingKey::from_bytes(&self.public_key()) else {
            return false;
        };
        vk.verify(message, &Signature::from_bytes(&sig_bytes)).is_ok()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Derive every key in `xpubs` along the same path.
pub fn derive_xpubs<S: AsRef<[u8]>>(xpubs: &[XPub], path: &[S]) -> Result<Vec<XPub>, KeyError> {
    xpubs.iter().map(|x| x.derive(path)).collect()
}

/// The raw public keys of a list of extended keys.
pub fn xpub_keys(xpubs: &[XPub]) -> Vec<[u8; 32]> {
    xpubs.iter().map(XPub::public_key).collect()
}

impl FromStr for XPub {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(decode_extended(s)?)
    }
}

impl fmt::Display for XPub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for XPub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "XPub({}…)", &self.to_hex()[..16])
    }
}

impl Serialize for XPub {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for XPub {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// XPrv
// ---------------------------------------------------------------------------

/// An extended private key: signing scalar plus chain code.
///
/// Like any private key it has no serde impls; export is explicit through
/// [`XPrv::to_hex`].
#[derive(Clone)]
pub struct XPrv {
    scalar: Scalar,
    chain_code: [u8; 32],
}

impl XPrv {
    /// Generate a fresh root key from the OS RNG.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    /// Deterministic root key from seed material.
    pub fn from_seed(seed: &[u8]) -> Self {
        let mut hasher = Sha512::new();
        hasher.update(b"Root");
        hasher.update(seed);
        let out = hasher.finalize();

        let mut key = [0u8; 32];
        key.copy_from_slice(&out[..32]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&out[32..]);
        Self {
            scalar: Scalar::from_bytes_mod_order(key),
            chain_code,
        }
    }

    pub fn from_bytes(bytes: &[u8; EXTENDED_KEY_LEN]) -> Self {
        let (key, chain_code) = split(bytes);
        Self {
            scalar: Scalar::from_bytes_mod_order(key),
            chain_code,
        }
    }

    pub fn to_bytes(&self) -> [u8; EXTENDED_KEY_LEN] {
        join(&self.scalar.to_bytes(), &self.chain_code)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    fn public_bytes(&self) -> [u8; 32] {
        EdwardsPoint::mul_base(&self.scalar).compress().to_bytes()
    }

    /// The matching extended public key.
    pub fn xpub(&self) -> XPub {
        XPub(join(&self.public_bytes(), &self.chain_code))
    }

    /// Derive the child key at `path`, mirroring [`XPub::derive`].
    pub fn derive<S: AsRef<[u8]>>(&self, path: &[S]) -> XPrv {
        let mut child = self.clone();
        for segment in path {
            let (tweak, chain) = child_tweak(&child.public_bytes(), &child.chain_code, segment.as_ref());
            child.scalar += tweak;
            child.chain_code = chain;
        }
        child
    }

    /// Sign `message` with this key.
    pub fn sign(&self, message: &[u8]) -> Result<[u8; SIGNATURE_LEN], KeyError> {
        let mut hasher = Sha512::new();
        hasher.update(b"vela nonce prefix");
        hasher.update(self.to_bytes());
        let digest = hasher.finalize();
        let mut hash_prefix = [0u8; 32];
        hash_prefix.copy_from_slice(&digest[..32]);

        let esk = ExpandedSecretKey {
            scalar: self.scalar,
            hash_prefix,
        };
        let vk = VerifyingKey::from_bytes(&self.public_bytes())
            .map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(raw_sign::<Sha512>(&esk, message, &vk).to_bytes())
    }
}

impl FromStr for XPrv {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_bytes(&decode_extended(s)?))
    }
}

impl fmt::Debug for XPrv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XPrv").field("xpub", &self.xpub()).finish()
    }
}
