//! # Accounts
//!
//! An account is a named [`Signer`]: a sorted xpub set, a quorum, and the
//! key index its addresses are derived under. The [`AccountManager`] ties
//! accounts to their persisted state and to the [`UtxoKeeper`] that
//! reserves their funds.
//!
//! ## Modules
//!
//! - [`signers`] — signer validation and derivation paths.
//! - [`store`] — the [`AccountStore`] trait with memory and sled backends.
//! - [`utxo_keeper`] — reservations and coin selection.
//! - [`builder`] — the account-backed spend and veto actions.
//! - [`dpos`] — the stake action.

pub mod builder;
pub mod dpos;
pub mod signers;
pub mod store;
pub mod utxo_keeper;

pub use builder::{merge_spend_actions, utxo_to_inputs};
pub use signers::{DeriveRule, Signer, SignerError};
pub use store::{AccountStore, MemoryAccountStore, SledAccountStore, StoreError};
pub use utxo_keeper::{
    select_utxos, KeeperError, Owner, ReserveRequest, Reservation, Selection, UtxoKeeper,
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::address::{Address, AddressError};
use crate::chain::Chain;
use crate::crypto::{derive_xpubs, xpub_keys, KeyError};
use crate::encoding::{hex_bytes, hex_opt};
use crate::transaction::program::{multisig_program, ProgramError};
use crate::transaction::{AssetId, Hash};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// An unspent output the wallet can spend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub output_id: Hash,
    pub source_id: Hash,
    pub source_pos: u64,
    pub asset_id: AssetId,
    pub amount: u64,
    #[serde(with = "hex_bytes")]
    pub control_program: Vec<u8>,
    #[serde(default)]
    pub account_id: String,
    /// Set for UTXOs owned by a bare address rather than an account path.
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub control_program_index: u64,
    #[serde(default)]
    pub change: bool,
    #[serde(default, with = "hex_opt")]
    pub vote: Option<Vec<u8>>,
    /// First block height at which the output may be spent.
    #[serde(default)]
    pub valid_height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub alias: String,
    pub signer: Signer,
}

/// A control program issued to an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CtrlProgram {
    pub account_id: String,
    pub address: String,
    pub key_index: u64,
    #[serde(with = "hex_bytes")]
    pub control_program: Vec<u8>,
    pub change: bool,
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("account not found: {0}")]
    NotFound(String),

    #[error("duplicate account alias: {0}")]
    DuplicateAlias(String),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Program(#[from] ProgramError),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Keeper(#[from] KeeperError),
}

/// Build the control program (and its address) for address `index` of
/// `account`: P2WPKH for a single key, P2WSH over a multisig script
/// otherwise.
pub fn create_ctrl_program(
    account: &Account,
    index: u64,
    change: bool,
    hrp: &str,
) -> Result<CtrlProgram, AccountError> {
    let signer = &account.signer;
    let path = signer.path(change, index);
    let derived = derive_xpubs(&signer.xpubs, &path)?;

    let address = if let [only] = derived.as_slice() {
        Address::from_pubkey(&only.public_key())
    } else {
        let script = multisig_program(&xpub_keys(&derived), signer.quorum)?;
        Address::from_script(&script)
    };

    Ok(CtrlProgram {
        account_id: account.id.clone(),
        address: address.encode(hrp)?,
        key_index: index,
        control_program: address.control_program(),
        change,
    })
}

// ---------------------------------------------------------------------------
// AccountManager
// ---------------------------------------------------------------------------

pub struct AccountManager {
    store: Arc<dyn AccountStore>,
    keeper: Arc<UtxoKeeper>,
    hrp: String,
    /// Serializes index counter updates.
    index_lock: Mutex<()>,
}

impl AccountManager {
    pub fn new(store: Arc<dyn AccountStore>, chain: Arc<dyn Chain>, hrp: impl Into<String>) -> Self {
        let keeper = Arc::new(UtxoKeeper::new(Arc::clone(&store), chain));
        Self {
            store,
            keeper,
            hrp: hrp.into(),
            index_lock: Mutex::new(()),
        }
    }

    pub fn keeper(&self) -> &Arc<UtxoKeeper> {
        &self.keeper
    }

    pub fn store(&self) -> &Arc<dyn AccountStore> {
        &self.store
    }

    pub fn hrp(&self) -> &str {
        &self.hrp
    }

    /// Create an account. The alias is trimmed and lowercased and must be
    /// unique; the key index is one past the highest issued for this xpub
    /// set.
    pub fn create(
        &self,
        xpubs: Vec<crate::crypto::XPub>,
        quorum: usize,
        alias: &str,
        derive_rule: DeriveRule,
    ) -> Result<Account, AccountError> {
        let alias = alias.trim().to_lowercase();

        let _guard = self.index_lock.lock();
        if self.store.get_account_by_alias(&alias)?.is_some() {
            return Err(AccountError::DuplicateAlias(alias));
        }

        let mut sorted = xpubs.clone();
        sorted.sort();
        let key_index = self.store.get_account_index(&sorted)? + 1;
        let signer = Signer::new(xpubs, quorum, key_index, derive_rule)?;

        let account = Account {
            id: uuid::Uuid::new_v4().to_string(),
            alias,
            signer,
        };
        self.store.set_account(&account)?;
        info!(account_id = %account.id, alias = %account.alias, key_index, "created account");
        Ok(account)
    }

    pub fn find_by_id(&self, id: &str) -> Result<Account, AccountError> {
        self.store
            .get_account_by_id(id)?
            .ok_or_else(|| AccountError::NotFound(id.to_string()))
    }

    pub fn find_by_alias(&self, alias: &str) -> Result<Account, AccountError> {
        let alias = alias.trim().to_lowercase();
        self.store
            .get_account_by_alias(&alias)?
            .ok_or(AccountError::NotFound(alias))
    }

    pub fn list_accounts(&self) -> Result<Vec<Account>, AccountError> {
        Ok(self.store.list_accounts()?)
    }

    /// Issue the next address of an account on the given branch and persist
    /// its control program.
    pub fn create_address(&self, account_id: &str, change: bool) -> Result<CtrlProgram, AccountError> {
        let account = self.find_by_id(account_id)?;
        self.create_address_for(&account, change)
    }

    pub(crate) fn create_address_for(
        &self,
        account: &Account,
        change: bool,
    ) -> Result<CtrlProgram, AccountError> {
        let key = match account.signer.derive_rule {
            DeriveRule::Bip32 => account.id.clone(),
            DeriveRule::Bip44 => format!("{}:{}", account.id, u8::from(change)),
        };

        let _guard = self.index_lock.lock();
        let index = self.store.get_contract_index(&key)? + 1;
        let program = create_ctrl_program(account, index, change, &self.hrp)?;
        self.store.set_contract_index(&key, index)?;
        self.store.set_control_program(&program)?;
        Ok(program)
    }

    pub fn get_control_program(&self, program: &[u8]) -> Result<Option<CtrlProgram>, AccountError> {
        Ok(self.store.get_control_program(&store::program_key(program))?)
    }

    pub fn add_unconfirmed_utxo(&self, utxos: &[Utxo]) {
        self.keeper.add_unconfirmed_utxo(utxos);
    }

    pub fn remove_unconfirmed_utxo(&self, output_ids: &[Hash]) {
        self.keeper.remove_unconfirmed_utxo(output_ids);
    }

    pub fn list_unconfirmed_utxo(&self, account_id: &str) -> Vec<Utxo> {
        self.keeper.list_unconfirmed(account_id)
    }
}

impl std::fmt::Debug for AccountManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountManager")
            .field("hrp", &self.hrp)
            .field("keeper", &self.keeper)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::StaticChain;
    use crate::crypto::XPrv;
    use crate::transaction::program::{is_p2wpkh, is_p2wsh};

    fn manager() -> AccountManager {
        AccountManager::new(
            Arc::new(MemoryAccountStore::new()),
            Arc::new(StaticChain { height: 1 }),
            "vp",
        )
    }

    fn xpub(seed: &str) -> crate::crypto::XPub {
        XPrv::from_seed(seed.as_bytes()).xpub()
    }

    #[test]
    fn test_create_account() {
        let m = manager();
        let a = m.create(vec![xpub("a")], 1, "  Alice ", DeriveRule::Bip44).unwrap();
        assert_eq!(a.alias, "alice");
        assert_eq!(a.signer.key_index, 1);
        assert_eq!(m.find_by_id(&a.id).unwrap(), a);
        assert_eq!(m.find_by_alias("ALICE").unwrap(), a);

        // Same key set, new alias: next index.
        let b = m.create(vec![xpub("a")], 1, "bob", DeriveRule::Bip44).unwrap();
        assert_eq!(b.signer.key_index, 2);
        assert_eq!(m.list_accounts().unwrap().len(), 2);
    }

    #[test]
    fn test_create_rejects_duplicate_alias() {
        let m = manager();
        m.create(vec![xpub("a")], 1, "alice", DeriveRule::Bip44).unwrap();
        assert!(matches!(
            m.create(vec![xpub("b")], 1, "Alice", DeriveRule::Bip44),
            Err(AccountError::DuplicateAlias(_))
        ));
    }

    #[test]
    fn test_create_rejects_bad_signer() {
        let m = manager();
        assert!(matches!(
            m.create(vec![xpub("a")], 2, "x", DeriveRule::Bip44),
            Err(AccountError::Signer(SignerError::BadQuorum { .. }))
        ));
    }

    #[test]
    fn test_find_missing_account() {
        assert!(matches!(
            manager().find_by_id("nope"),
            Err(AccountError::NotFound(_))
        ));
    }

    #[test]
    fn test_single_key_address_is_p2wpkh() {
        let m = manager();
        let a = m.create(vec![xpub("a")], 1, "a", DeriveRule::Bip44).unwrap();
        let cp = m.create_address(&a.id, false).unwrap();
        assert!(is_p2wpkh(&cp.control_program));
        assert!(cp.address.starts_with("vp1"));
        assert_eq!(cp.key_index, 1);
        assert_eq!(
            m.get_control_program(&cp.control_program).unwrap(),
            Some(cp)
        );
    }

    #[test]
    fn test_multisig_address_is_p2wsh() {
        let m = manager();
        let a = m
            .create(vec![xpub("a"), xpub("b")], 2, "ab", DeriveRule::Bip32)
            .unwrap();
        let cp = m.create_address(&a.id, true).unwrap();
        assert!(is_p2wsh(&cp.control_program));
        assert!(cp.change);
    }

    #[test]
    fn test_bip44_indexes_per_branch() {
        let m = manager();
        let a = m.create(vec![xpub("a")], 1, "a", DeriveRule::Bip44).unwrap();
        assert_eq!(m.create_address(&a.id, false).unwrap().key_index, 1);
        assert_eq!(m.create_address(&a.id, false).unwrap().key_index, 2);
        assert_eq!(m.create_address(&a.id, true).unwrap().key_index, 1);
    }

    #[test]
    fn test_bip32_single_index() {
        let m = manager();
        let a = m.create(vec![xpub("a")], 1, "a", DeriveRule::Bip32).unwrap();
        assert_eq!(m.create_address(&a.id, false).unwrap().key_index, 1);
        assert_eq!(m.create_address(&a.id, true).unwrap().key_index, 2);
    }

    #[test]
    fn test_addresses_differ() {
        let m = manager();
        let a = m.create(vec![xpub("a")], 1, "a", DeriveRule::Bip44).unwrap();
        let one = m.create_address(&a.id, false).unwrap();
        let two = m.create_address(&a.id, false).unwrap();
        assert_ne!(one.control_program, two.control_program);
    }

    #[test]
    fn test_unconfirmed_forwarding() {
        let m = manager();
        let u = Utxo {
            output_id: Hash::new([1; 32]),
            account_id: "acct".into(),
            amount: 3,
            ..Default::default()
        };
        m.add_unconfirmed_utxo(&[u.clone()]);
        assert_eq!(m.list_unconfirmed_utxo("acct"), vec![u.clone()]);
        m.remove_unconfirmed_utxo(&[u.output_id]);
        assert!(m.list_unconfirmed_utxo("acct").is_empty());
    }

    #[test]
    fn test_utxo_json_shape() {
        let u = Utxo {
            output_id: Hash::new([1; 32]),
            amount: 3,
            control_program: vec![0xab],
            vote: Some(vec![0xcd]),
            ..Default::default()
        };
        let v = serde_json::to_value(&u).unwrap();
        assert_eq!(v["control_program"], "ab");
        assert_eq!(v["vote"], "cd");
        let back: Utxo = serde_json::from_value(v).unwrap();
        assert_eq!(back, u);
    }
}
