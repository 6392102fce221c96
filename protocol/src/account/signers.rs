//! Account signers: the xpub set, quorum and key index behind an account,
//! and the derivation paths its addresses are generated on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{
    ACCOUNT_KEY_SPACE, BIP44_COIN_TYPE, BIP44_PURPOSE, HARDENED_KEY_START,
};
use crate::crypto::XPub;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignerError {
    #[error("at least one xpub is required")]
    NoXPubs,

    #[error("quorum must be between 1 and {keys}, got {quorum}")]
    BadQuorum { quorum: usize, keys: usize },

    #[error("duplicate xpub {0}")]
    DupeXPub(XPub),

    #[error("key index {0} is out of range")]
    KeyIndexOverflow(u64),
}

/// How address paths are laid out under an account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeriveRule {
    /// `[key_space || key_index, address_index]`, one counter per account.
    Bip32,
    /// `m/44/153/key_index/change/address_index`, one counter per branch.
    #[default]
    Bip44,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    /// Sorted, no duplicates.
    pub xpubs: Vec<XPub>,
    pub quorum: usize,
    pub key_index: u64,
    pub derive_rule: DeriveRule,
}

impl Signer {
    pub fn new(
        mut xpubs: Vec<XPub>,
        quorum: usize,
        key_index: u64,
        derive_rule: DeriveRule,
    ) -> Result<Self, SignerError> {
        if xpubs.is_empty() {
            return Err(SignerError::NoXPubs);
        }
        if quorum == 0 || quorum > xpubs.len() {
            return Err(SignerError::BadQuorum {
                quorum,
                keys: xpubs.len(),
            });
        }
        if key_index >= HARDENED_KEY_START {
            return Err(SignerError::KeyIndexOverflow(key_index));
        }

        xpubs.sort();
        if let Some(w) = xpubs.windows(2).find(|w| w[0] == w[1]) {
            return Err(SignerError::DupeXPub(w[0]));
        }

        Ok(Self {
            xpubs,
            quorum,
            key_index,
            derive_rule,
        })
    }

    /// Derivation path of address `index` on the given branch.
    ///
    /// BIP32 accounts have a single branch, so `change` is ignored there.
    pub fn path(&self, change: bool, index: u64) -> Vec<Vec<u8>> {
        match self.derive_rule {
            DeriveRule::Bip32 => {
                let mut account = Vec::with_capacity(9);
                account.push(ACCOUNT_KEY_SPACE);
                account.extend_from_slice(&self.key_index.to_le_bytes());
                vec![account, index.to_le_bytes().to_vec()]
            }
            DeriveRule::Bip44 => vec![
                BIP44_PURPOSE.to_le_bytes().to_vec(),
                BIP44_COIN_TYPE.to_le_bytes().to_vec(),
                (self.key_index as u32).to_le_bytes().to_vec(),
                u32::from(change).to_le_bytes().to_vec(),
                (index as u32).to_le_bytes().to_vec(),
            ],
        }
    }

    pub fn is_multisig(&self) -> bool {
        self.xpubs.len() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::XPrv;

    fn xpub(seed: &str) -> XPub {
        XPrv::from_seed(seed.as_bytes()).xpub()
    }

    #[test]
    fn test_new_sorts_xpubs() {
        let (a, b) = (xpub("a"), xpub("b"));
        let s = Signer::new(vec![a.max(b), a.min(b)], 2, 1, DeriveRule::Bip32).unwrap();
        assert_eq!(s.xpubs, vec![a.min(b), a.max(b)]);
        assert!(s.is_multisig());
    }

    #[test]
    fn test_new_rejects_bad_input() {
        assert_eq!(
            Signer::new(vec![], 1, 1, DeriveRule::Bip44),
            Err(SignerError::NoXPubs)
        );
        assert_eq!(
            Signer::new(vec![xpub("a")], 2, 1, DeriveRule::Bip44),
            Err(SignerError::BadQuorum { quorum: 2, keys: 1 })
        );
        assert_eq!(
            Signer::new(vec![xpub("a")], 0, 1, DeriveRule::Bip44),
            Err(SignerError::BadQuorum { quorum: 0, keys: 1 })
        );
        assert_eq!(
            Signer::new(vec![xpub("a"), xpub("a")], 1, 1, DeriveRule::Bip44),
            Err(SignerError::DupeXPub(xpub("a")))
        );
        assert_eq!(
            Signer::new(vec![xpub("a")], 1, HARDENED_KEY_START, DeriveRule::Bip44),
            Err(SignerError::KeyIndexOverflow(HARDENED_KEY_START))
        );
    }

    #[test]
    fn test_bip32_path() {
        let s = Signer::new(vec![xpub("a")], 1, 3, DeriveRule::Bip32).unwrap();
        let path = s.path(true, 7);
        assert_eq!(path.len(), 2);
        assert_eq!(path[0], vec![1, 3, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(path[1], vec![7, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(s.path(false, 7), path);
    }

    #[test]
    fn test_bip44_path() {
        let s = Signer::new(vec![xpub("a")], 1, 2, DeriveRule::Bip44).unwrap();
        let path = s.path(true, 5);
        assert_eq!(
            path,
            vec![
                vec![44, 0, 0, 0],
                vec![153, 0, 0, 0],
                vec![2, 0, 0, 0],
                vec![1, 0, 0, 0],
                vec![5, 0, 0, 0],
            ]
        );
        assert_eq!(s.path(false, 5)[3], vec![0, 0, 0, 0]);
    }
}
