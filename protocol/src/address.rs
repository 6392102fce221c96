//! # Witness Addresses
//!
//! Bech32 encodings of version-0 witness programs:
//!
//! ```text
//! <hrp>1<bech32(0x00 || program)>
//! ```
//!
//! A 20-byte program is a public-key hash (P2WPKH), a 32-byte program is a
//! script hash (P2WSH). Nothing else is accepted.

use bech32::{Bech32, Hrp};
use thiserror::Error;

use crate::crypto::hash::{pubkey_hash, PUBKEY_HASH_LEN};
use crate::crypto::sha256;
use crate::transaction::program::{p2wpkh_program, p2wsh_program};

const WITNESS_VERSION: u8 = 0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("bech32 error: {0}")]
    Bech32(String),

    #[error("invalid HRP: expected '{expected}', got '{got}'")]
    WrongHrp { expected: String, got: String },

    #[error("unsupported witness version {0}")]
    UnsupportedVersion(u8),

    #[error("unsupported witness program length {0}")]
    BadProgramLength(usize),
}

/// A decoded witness address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    WitnessPubKeyHash([u8; PUBKEY_HASH_LEN]),
    WitnessScriptHash([u8; 32]),
}

impl Address {
    /// Address paying to a single Ed25519 public key.
    pub fn from_pubkey(pubkey: &[u8]) -> Self {
        Address::WitnessPubKeyHash(pubkey_hash(pubkey))
    }

    /// Address paying to a witness script.
    pub fn from_script(script: &[u8]) -> Self {
        Address::WitnessScriptHash(sha256(script))
    }

    /// The hash the witness program commits to.
    pub fn script_address(&self) -> &[u8] {
        match self {
            Address::WitnessPubKeyHash(h) => h,
            Address::WitnessScriptHash(h) => h,
        }
    }

    /// The control program that pays to this address.
    pub fn control_program(&self) -> Vec<u8> {
        match self {
            Address::WitnessPubKeyHash(h) => p2wpkh_program(h),
            Address::WitnessScriptHash(h) => p2wsh_program(h),
        }
    }

    pub fn encode(&self, hrp: &str) -> Result<String, AddressError> {
        let hrp = Hrp::parse(hrp).map_err(|e| AddressError::Bech32(e.to_string()))?;
        let mut payload = Vec::with_capacity(1 + 32);
        payload.push(WITNESS_VERSION);
        payload.extend_from_slice(self.script_address());
        bech32::encode::<Bech32>(hrp, &payload).map_err(|e| AddressError::Bech32(e.to_string()))
    }

    /// Parse an address, requiring the given HRP.
    pub fn decode(addr: &str, hrp: &str) -> Result<Self, AddressError> {
        let (got, data) =
            bech32::decode(addr).map_err(|e| AddressError::Bech32(e.to_string()))?;
        let expected = Hrp::parse(hrp).map_err(|e| AddressError::Bech32(e.to_string()))?;
        if got != expected {
            return Err(AddressError::WrongHrp {
                expected: hrp.to_string(),
                got: got.to_string(),
            });
        }

        let Some((&version, program)) = data.split_first() else {
            return Err(AddressError::BadProgramLength(0));
        };
        if version != WITNESS_VERSION {
            return Err(AddressError::UnsupportedVersion(version));
        }

        if let Ok(h) = <[u8; PUBKEY_HASH_LEN]>::try_from(program) {
            return Ok(Address::WitnessPubKeyHash(h));
        }
        if let Ok(h) = <[u8; 32]>::try_from(program) {
            return Ok(Address::WitnessScriptHash(h));
        }
        Err(AddressError::BadProgramLength(program.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::program::{is_p2wpkh, is_p2wsh};

    #[test]
    fn test_p2wpkh_roundtrip() {
        let addr = Address::from_pubkey(&[3u8; 32]);
        let s = addr.encode("vp").unwrap();
        assert!(s.starts_with("vp1"));
        assert_eq!(Address::decode(&s, "vp").unwrap(), addr);
        assert!(is_p2wpkh(&addr.control_program()));
    }

    #[test]
    fn test_p2wsh_roundtrip() {
        let addr = Address::from_script(b"multisig script");
        let s = addr.encode("tp").unwrap();
        assert_eq!(Address::decode(&s, "tp").unwrap(), addr);
        assert!(is_p2wsh(&addr.control_program()));
    }

    #[test]
    fn test_wrong_hrp_rejected() {
        let s = Address::from_pubkey(&[1u8; 32]).encode("tp").unwrap();
        assert!(matches!(
            Address::decode(&s, "vp"),
            Err(AddressError::WrongHrp { .. })
        ));
    }

    #[test]
    fn test_bad_length_rejected() {
        let hrp = Hrp::parse("vp").unwrap();
        let s = bech32::encode::<Bech32>(hrp, &[0u8; 11]).unwrap();
        assert_eq!(
            Address::decode(&s, "vp"),
            Err(AddressError::BadProgramLength(10))
        );
    }

    #[test]
    fn test_bad_version_rejected() {
        let hrp = Hrp::parse("vp").unwrap();
        let mut payload = vec![1u8];
        payload.extend_from_slice(&[0u8; 20]);
        let s = bech32::encode::<Bech32>(hrp, &payload).unwrap();
        assert_eq!(
            Address::decode(&s, "vp"),
            Err(AddressError::UnsupportedVersion(1))
        );
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            Address::decode("not an address", "vp"),
            Err(AddressError::Bech32(_))
        ));
    }
}
