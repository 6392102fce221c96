//! # Account Storage
//!
//! The [`AccountStore`] trait is everything the account layer needs from
//! persistence: accounts, confirmed UTXOs, control programs and the address
//! index counters. Reservations are never stored; they live only in the
//! [`super::UtxoKeeper`].
//!
//! Two implementations:
//!
//! - [`MemoryAccountStore`] — `DashMap`s, for tests and ephemeral nodes.
//! - [`SledAccountStore`] — sled trees with bincode values.
//!
//! ## Tree Layout
//!
//! | Tree               | Key                        | Value                  |
//! |--------------------|----------------------------|------------------------|
//! | `accounts`         | account id (UTF-8)         | `bincode(Account)`     |
//! | `account_aliases`  | alias (UTF-8)              | account id             |
//! | `account_indexes`  | `sha256(xpubs)` (32B)      | index (8B BE)          |
//! | `standard_utxos`   | output id (32B)            | `bincode(Utxo)`        |
//! | `contract_utxos`   | output id (32B)            | `bincode(Utxo)`        |
//! | `control_programs` | `sha256(program)` (32B)    | `bincode(CtrlProgram)` |
//! | `contract_indexes` | counter key (UTF-8)        | index (8B BE)          |

use dashmap::DashMap;
use sled::{Db, Tree};
use std::path::Path;

use super::{Account, CtrlProgram, Utxo};
use crate::crypto::{sha256, sha256_multi, XPub};
use crate::transaction::Hash;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Key under which a control program is indexed.
pub fn program_key(control_program: &[u8]) -> Hash {
    Hash::new(sha256(control_program))
}

fn xpubs_key(xpubs: &[XPub]) -> [u8; 32] {
    let parts: Vec<&[u8]> = xpubs.iter().map(|x| x.as_bytes().as_slice()).collect();
    sha256_multi(&parts)
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

pub trait AccountStore: Send + Sync {
    fn get_account_by_id(&self, id: &str) -> StoreResult<Option<Account>>;
    fn get_account_by_alias(&self, alias: &str) -> StoreResult<Option<Account>>;
    fn list_accounts(&self) -> StoreResult<Vec<Account>>;
    /// Insert or replace an account, updating the alias and xpub-set indexes.
    fn set_account(&self, account: &Account) -> StoreResult<()>;
    /// Highest account index issued for this exact xpub set, or 0.
    fn get_account_index(&self, xpubs: &[XPub]) -> StoreResult<u64>;

    fn list_utxos(&self) -> StoreResult<Vec<Utxo>>;
    fn get_standard_utxo(&self, output_id: &Hash) -> StoreResult<Option<Utxo>>;
    fn get_contract_utxo(&self, output_id: &Hash) -> StoreResult<Option<Utxo>>;
    fn set_standard_utxo(&self, utxo: &Utxo) -> StoreResult<()>;
    fn set_contract_utxo(&self, utxo: &Utxo) -> StoreResult<()>;
    fn delete_standard_utxo(&self, output_id: &Hash) -> StoreResult<()>;

    fn get_control_program(&self, key: &Hash) -> StoreResult<Option<CtrlProgram>>;
    fn set_control_program(&self, program: &CtrlProgram) -> StoreResult<()>;
    fn list_control_programs(&self) -> StoreResult<Vec<CtrlProgram>>;

    fn get_contract_index(&self, key: &str) -> StoreResult<u64>;
    fn set_contract_index(&self, key: &str, index: u64) -> StoreResult<()>;
}

// ---------------------------------------------------------------------------
// MemoryAccountStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: DashMap<String, Account>,
    aliases: DashMap<String, String>,
    account_indexes: DashMap<[u8; 32], u64>,
    standard_utxos: DashMap<Hash, Utxo>,
    contract_utxos: DashMap<Hash, Utxo>,
    control_programs: DashMap<Hash, CtrlProgram>,
    contract_indexes: DashMap<String, u64>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountStore for MemoryAccountStore {
    fn get_account_by_id(&self, id: &str) -> StoreResult<Option<Account>> {
        Ok(self.accounts.get(id).map(|a| a.clone()))
    }

    fn get_account_by_alias(&self, alias: &str) -> StoreResult<Option<Account>> {
        match self.aliases.get(alias) {
            Some(id) => self.get_account_by_id(id.value()),
            None => Ok(None),
        }
    }

    fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        let mut out: Vec<Account> = self.accounts.iter().map(|a| a.clone()).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    fn set_account(&self, account: &Account) -> StoreResult<()> {
        self.accounts.insert(account.id.clone(), account.clone());
        self.aliases.insert(account.alias.clone(), account.id.clone());
        let mut index = self
            .account_indexes
            .entry(xpubs_key(&account.signer.xpubs))
            .or_insert(0);
        *index = (*index).max(account.signer.key_index);
        Ok(())
    }

    fn get_account_index(&self, xpubs: &[XPub]) -> StoreResult<u64> {
        Ok(self
            .account_indexes
            .get(&xpubs_key(xpubs))
            .map(|v| *v)
            .unwrap_or(0))
    }

    fn list_utxos(&self) -> StoreResult<Vec<Utxo>> {
        Ok(self.standard_utxos.iter().map(|u| u.clone()).collect())
    }

    fn get_standard_utxo(&self, output_id: &Hash) -> StoreResult<Option<Utxo>> {
        Ok(self.standard_utxos.get(output_id).map(|u| u.clone()))
    }

    fn get_contract_utxo(&self, output_id: &Hash) -> StoreResult<Option<Utxo>> {
        Ok(self.contract_utxos.get(output_id).map(|u| u.clone()))
    }

    fn set_standard_utxo(&self, utxo: &Utxo) -> StoreResult<()> {
        self.standard_utxos.insert(utxo.output_id, utxo.clone());
        Ok(())
    }

    fn set_contract_utxo(&self, utxo: &Utxo) -> StoreResult<()> {
        self.contract_utxos.insert(utxo.output_id, utxo.clone());
        Ok(())
    }

    fn delete_standard_utxo(&self, output_id: &Hash) -> StoreResult<()> {
        self.standard_utxos.remove(output_id);
        Ok(())
    }

    fn get_control_program(&self, key: &Hash) -> StoreResult<Option<CtrlProgram>> {
        Ok(self.control_programs.get(key).map(|p| p.clone()))
    }

    fn set_control_program(&self, program: &CtrlProgram) -> StoreResult<()> {
        self.control_programs
            .insert(program_key(&program.control_program), program.clone());
        Ok(())
    }

    fn list_control_programs(&self) -> StoreResult<Vec<CtrlProgram>> {
        Ok(self.control_programs.iter().map(|p| p.clone()).collect())
    }

    fn get_contract_index(&self, key: &str) -> StoreResult<u64> {
        Ok(self.contract_indexes.get(key).map(|v| *v).unwrap_or(0))
    }

    fn set_contract_index(&self, key: &str, index: u64) -> StoreResult<()> {
        self.contract_indexes.insert(key.to_string(), index);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SledAccountStore
// ---------------------------------------------------------------------------

/// Persistent [`AccountStore`] on sled.
///
/// Cheap to clone; sled handles are reference counted and every tree is
/// safe to share across threads.
#[derive(Debug, Clone)]
pub struct SledAccountStore {
    db: Db,
    accounts: Tree,
    aliases: Tree,
    account_indexes: Tree,
    standard_utxos: Tree,
    contract_utxos: Tree,
    control_programs: Tree,
    contract_indexes: Tree,
}

fn encode<T: serde::Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode_u64(bytes: &[u8]) -> StoreResult<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::Serialization(format!("bad counter length {}", bytes.len())))?;
    Ok(u64::from_be_bytes(arr))
}

impl SledAccountStore {
    /// Open or create a store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// A store that lives in memory and vanishes on drop.
    pub fn open_temporary() -> StoreResult<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        Ok(Self {
            accounts: db.open_tree("accounts")?,
            aliases: db.open_tree("account_aliases")?,
            account_indexes: db.open_tree("account_indexes")?,
            standard_utxos: db.open_tree("standard_utxos")?,
            contract_utxos: db.open_tree("contract_utxos")?,
            control_programs: db.open_tree("control_programs")?,
            contract_indexes: db.open_tree("contract_indexes")?,
            db,
        })
    }

    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn get_utxo(tree: &Tree, output_id: &Hash) -> StoreResult<Option<Utxo>> {
        match tree.get(output_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl AccountStore for SledAccountStore {
    fn get_account_by_id(&self, id: &str) -> StoreResult<Option<Account>> {
        match self.accounts.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_account_by_alias(&self, alias: &str) -> StoreResult<Option<Account>> {
        match self.aliases.get(alias.as_bytes())? {
            Some(id) => {
                let id = String::from_utf8(id.to_vec())
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                self.get_account_by_id(&id)
            }
            None => Ok(None),
        }
    }

    fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        self.accounts
            .iter()
            .values()
            .map(|v| decode(&v?))
            .collect()
    }

    fn set_account(&self, account: &Account) -> StoreResult<()> {
        self.accounts
            .insert(account.id.as_bytes(), encode(account)?)?;
        self.aliases
            .insert(account.alias.as_bytes(), account.id.as_bytes())?;

        let key = xpubs_key(&account.signer.xpubs);
        let current = match self.account_indexes.get(key)? {
            Some(v) => decode_u64(&v)?,
            None => 0,
        };
        let next = current.max(account.signer.key_index);
        self.account_indexes.insert(key, &next.to_be_bytes())?;
        Ok(())
    }

    fn get_account_index(&self, xpubs: &[XPub]) -> StoreResult<u64> {
        match self.account_indexes.get(xpubs_key(xpubs))? {
            Some(v) => decode_u64(&v),
            None => Ok(0),
        }
    }

    fn list_utxos(&self) -> StoreResult<Vec<Utxo>> {
        self.standard_utxos
            .iter()
            .values()
            .map(|v| decode(&v?))
            .collect()
    }

    fn get_standard_utxo(&self, output_id: &Hash) -> StoreResult<Option<Utxo>> {
        Self::get_utxo(&self.standard_utxos, output_id)
    }

    fn get_contract_utxo(&self, output_id: &Hash) -> StoreResult<Option<Utxo>> {
        Self::get_utxo(&self.contract_utxos, output_id)
    }

    fn set_standard_utxo(&self, utxo: &Utxo) -> StoreResult<()> {
        self.standard_utxos
            .insert(utxo.output_id.as_bytes(), encode(utxo)?)?;
        Ok(())
    }

    fn set_contract_utxo(&self, utxo: &Utxo) -> StoreResult<()> {
        self.contract_utxos
            .insert(utxo.output_id.as_bytes(), encode(utxo)?)?;
        Ok(())
    }

    fn delete_standard_utxo(&self, output_id: &Hash) -> StoreResult<()> {
        self.standard_utxos.remove(output_id.as_bytes())?;
        Ok(())
    }

    fn get_control_program(&self, key: &Hash) -> StoreResult<Option<CtrlProgram>> {
        match self.control_programs.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_control_program(&self, program: &CtrlProgram) -> StoreResult<()> {
        let key = program_key(&program.control_program);
        self.control_programs
            .insert(key.as_bytes(), encode(program)?)?;
        Ok(())
    }

    fn list_control_programs(&self) -> StoreResult<Vec<CtrlProgram>> {
        self.control_programs
            .iter()
            .values()
            .map(|v| decode(&v?))
            .collect()
    }

    fn get_contract_index(&self, key: &str) -> StoreResult<u64> {
        match self.contract_indexes.get(key.as_bytes())? {
            Some(v) => decode_u64(&v),
            None => Ok(0),
        }
    }

    fn set_contract_index(&self, key: &str, index: u64) -> StoreResult<()> {
        self.contract_indexes
            .insert(key.as_bytes(), &index.to_be_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::signers::{DeriveRule, Signer};
    use crate::crypto::XPrv;
    use crate::transaction::AssetId;

    fn utxo(id: u8, amount: u64) -> Utxo {
        Utxo {
            output_id: Hash::new([id; 32]),
            asset_id: AssetId::new([1; 32]),
            amount,
            account_id: "acct".into(),
            ..Default::default()
        }
    }

    fn account(alias: &str) -> Account {
        let xpub = XPrv::from_seed(alias.as_bytes()).xpub();
        Account {
            id: format!("id-{alias}"),
            alias: alias.into(),
            signer: Signer::new(vec![xpub], 1, 1, DeriveRule::Bip44).unwrap(),
        }
    }

    fn exercise(store: &dyn AccountStore) {
        store.set_standard_utxo(&utxo(1, 10)).unwrap();
        store.set_standard_utxo(&utxo(2, 20)).unwrap();
        store.set_contract_utxo(&utxo(3, 30)).unwrap();

        assert_eq!(store.list_utxos().unwrap().len(), 2);
        assert_eq!(
            store.get_standard_utxo(&Hash::new([2; 32])).unwrap().unwrap().amount,
            20
        );
        assert!(store.get_standard_utxo(&Hash::new([3; 32])).unwrap().is_none());
        assert!(store.get_contract_utxo(&Hash::new([3; 32])).unwrap().is_some());

        store.delete_standard_utxo(&Hash::new([1; 32])).unwrap();
        assert_eq!(store.list_utxos().unwrap().len(), 1);

        let acct = account("alice");
        store.set_account(&acct).unwrap();
        assert_eq!(store.get_account_by_id(&acct.id).unwrap(), Some(acct.clone()));
        assert_eq!(store.get_account_by_alias("alice").unwrap(), Some(acct.clone()));
        assert_eq!(store.get_account_index(&acct.signer.xpubs).unwrap(), 1);
        assert_eq!(store.list_accounts().unwrap().len(), 1);

        let cp = CtrlProgram {
            account_id: acct.id.clone(),
            address: "addr".into(),
            key_index: 3,
            control_program: vec![0, 1, 2],
            change: true,
        };
        store.set_control_program(&cp).unwrap();
        assert_eq!(
            store.get_control_program(&program_key(&[0, 1, 2])).unwrap(),
            Some(cp)
        );
        assert_eq!(store.list_control_programs().unwrap().len(), 1);

        assert_eq!(store.get_contract_index("k").unwrap(), 0);
        store.set_contract_index("k", 7).unwrap();
        assert_eq!(store.get_contract_index("k").unwrap(), 7);
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryAccountStore::new());
    }

    #[test]
    fn test_sled_store() {
        exercise(&SledAccountStore::open_temporary().unwrap());
    }

    #[test]
    fn test_sled_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SledAccountStore::open(dir.path()).unwrap();
            store.set_standard_utxo(&utxo(9, 99)).unwrap();
            store.flush().unwrap();
        }
        let store = SledAccountStore::open(dir.path()).unwrap();
        let got = store.get_standard_utxo(&Hash::new([9; 32])).unwrap().unwrap();
        assert_eq!(got.amount, 99);
    }
}
