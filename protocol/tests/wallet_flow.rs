//! End-to-end wallet flow: fund an account, build a payment from actions,
//! collect signatures, and finalize against a ledger.
//!
//! Every test builds its own manager over an in-memory store, so nothing
//! is shared between tests.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use vela_protocol::account::dpos::NoDelegates;
use vela_protocol::account::{
    merge_spend_actions, Account, AccountManager, DeriveRule, MemoryAccountStore, Utxo,
};
use vela_protocol::address::Address;
use vela_protocol::chain::StaticChain;
use vela_protocol::config::{WalletConfig, NATIVE_ASSET_ID};
use vela_protocol::crypto::{XPrv, XPub};
use vela_protocol::transaction::{AssetId, Hash};
use vela_protocol::txbuilder::{
    self, check_tx_sighash_commitment, estimate_tx_gas, finalize_tx, sign, sign_progress,
    sign_with_key, Action, BuildContext, KeyRing, Template, TxBuilderError,
};

const TOKEN: AssetId = AssetId::new([7; 32]);

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

struct Wallet {
    accounts: AccountManager,
    config: WalletConfig,
}

impl Wallet {
    fn new() -> Self {
        Self {
            accounts: AccountManager::new(
                Arc::new(MemoryAccountStore::new()),
                Arc::new(StaticChain { height: 100 }),
                "vp",
            ),
            config: WalletConfig::default(),
        }
    }

    fn ctx(&self) -> BuildContext<'_> {
        BuildContext {
            accounts: &self.accounts,
            config: &self.config,
            dpos: &NoDelegates,
        }
    }

    fn account(&self, alias: &str, xpubs: Vec<XPub>, quorum: usize) -> Account {
        self.accounts
            .create(xpubs, quorum, alias, DeriveRule::Bip44)
            .expect("create account")
    }

    /// Store a confirmed UTXO at a fresh receive address. Without an
    /// address on the record, inputs get signature-program witnesses.
    fn fund(&self, account: &Account, seed: u8, asset: AssetId, amount: u64, with_address: bool) {
        let cp = self
            .accounts
            .create_address(&account.id, false)
            .expect("address");
        let utxo = Utxo {
            output_id: Hash::new([seed; 32]),
            source_id: Hash::new([seed ^ 0xff; 32]),
            asset_id: asset,
            amount,
            control_program: cp.control_program,
            account_id: account.id.clone(),
            address: if with_address { cp.address } else { String::new() },
            control_program_index: cp.key_index,
            ..Default::default()
        };
        self.accounts
            .store()
            .set_standard_utxo(&utxo)
            .expect("store utxo");
    }

    fn build(&self, actions: serde_json::Value) -> Result<Template, TxBuilderError> {
        let actions: Vec<Action> = serde_json::from_value(actions).expect("actions json");
        txbuilder::build(
            &self.ctx(),
            &merge_spend_actions(actions)?,
            Utc::now() + Duration::minutes(5),
            0,
        )
    }
}

fn bob() -> String {
    Address::from_pubkey(&XPrv::from_seed(b"bob").xpub().public_key())
        .encode("vp")
        .expect("encode")
}

// ---------------------------------------------------------------------------
// Flows
// ---------------------------------------------------------------------------

#[test]
fn test_pay_sign_finalize() {
    let w = Wallet::new();
    let key = XPrv::from_seed(b"alice");
    let alice = w.account("alice", vec![key.xpub()], 1);
    w.fund(&alice, 1, NATIVE_ASSET_ID, 60, true);
    w.fund(&alice, 2, NATIVE_ASSET_ID, 50, true);

    let mut template = w
        .build(json!([
            {"type": "spend_account", "account_id": alice.id, "asset_id": NATIVE_ASSET_ID, "amount": 100},
            {"type": "control_address", "address": bob(), "asset_id": NATIVE_ASSET_ID, "amount": 90}
        ]))
        .expect("build");

    // 110 in, 90 to bob, 10 change: a fee of 10.
    assert_eq!(template.fee, 10);
    assert!(!sign_progress(&template));
    assert!(estimate_tx_gas(&template).is_ok());

    sign_with_key(&mut template, &key).expect("sign");
    assert!(sign_progress(&template));

    let mut tx = template.transaction.clone().expect("tx");
    assert!(tx.inputs.iter().all(|i| !i.arguments().is_empty()));
    finalize_tx(&StaticChain::default(), &w.config, &mut tx).expect("finalize");
    assert!(tx.serialized_size > 0);
}

#[test]
fn test_signature_programs_commit_to_sighash() {
    let w = Wallet::new();
    let key = XPrv::from_seed(b"alice");
    let alice = w.account("alice", vec![key.xpub()], 1);
    w.fund(&alice, 1, NATIVE_ASSET_ID, 100, false);

    let mut template = w
        .build(json!([
            {"type": "spend_account", "account_id": alice.id, "asset_id": NATIVE_ASSET_ID, "amount": 100},
            {"type": "control_address", "address": bob(), "asset_id": NATIVE_ASSET_ID, "amount": 95}
        ]))
        .expect("build");
    sign_with_key(&mut template, &key).expect("sign");

    let mut tx = template.transaction.clone().expect("tx");
    check_tx_sighash_commitment(&tx).expect("committed");

    let config = WalletConfig {
        enforce_sighash_commitment: true,
        ..WalletConfig::default()
    };
    finalize_tx(&StaticChain::default(), &config, &mut tx).expect("finalize");
}

#[test]
fn test_multisig_collects_quorum_across_rounds() {
    let w = Wallet::new();
    let keys: Vec<XPrv> = [b"k1", b"k2", b"k3"]
        .iter()
        .map(|s| XPrv::from_seed(*s))
        .collect();
    let vault = w.account("vault", keys.iter().map(XPrv::xpub).collect(), 2);
    w.fund(&vault, 1, TOKEN, 40, true);

    let mut template = w
        .build(json!([
            {"type": "spend_account", "account_id": vault.id, "asset_id": TOKEN, "amount": 40},
            {"type": "control_address", "address": bob(), "asset_id": TOKEN, "amount": 40}
        ]))
        .expect("build");

    // The template travels between signers as JSON.
    let wire = serde_json::to_string(&template).expect("encode");
    template = serde_json::from_str(&wire).expect("decode");

    sign(&mut template, &keys[0]).expect("first signer");
    assert!(!sign_progress(&template));

    let ring = KeyRing::from_keys([keys[2].clone()]);
    sign(&mut template, &ring).expect("second signer");
    assert!(sign_progress(&template));
}

#[test]
fn test_failed_build_leaves_funds_available() {
    let w = Wallet::new();
    let alice = w.account("alice", vec![XPrv::from_seed(b"alice").xpub()], 1);
    for seed in 1..=3 {
        w.fund(&alice, seed, NATIVE_ASSET_ID, 10, true);
    }

    // Spending succeeds, the unknown account fails: nothing may stay held.
    let err = w
        .build(json!([
            {"type": "spend_account", "account_id": alice.id, "asset_id": NATIVE_ASSET_ID, "amount": 30},
            {"type": "spend_account", "account_id": "ghost", "asset_id": NATIVE_ASSET_ID, "amount": 1}
        ]))
        .unwrap_err();
    assert!(matches!(err, TxBuilderError::Actions(ref f) if f.len() == 1 && f[0].index == 1));
    assert_eq!(w.accounts.keeper().reservation_count(), 0);

    w.build(json!([
        {"type": "spend_account", "account_id": alice.id, "asset_id": NATIVE_ASSET_ID, "amount": 30},
        {"type": "control_address", "address": bob(), "asset_id": NATIVE_ASSET_ID, "amount": 30}
    ]))
    .expect("funds released by rollback");
}

#[test]
fn test_blank_check_rolls_back() {
    let w = Wallet::new();
    let alice = w.account("alice", vec![XPrv::from_seed(b"alice").xpub()], 1);
    w.fund(&alice, 1, TOKEN, 10, true);

    // Tokens in, nothing out: anyone could claim them.
    let err = w
        .build(json!([
            {"type": "spend_account", "account_id": alice.id, "asset_id": TOKEN, "amount": 10}
        ]))
        .unwrap_err();
    assert!(matches!(err, TxBuilderError::BlankCheck));
    assert_eq!(w.accounts.keeper().reservation_count(), 0);
}

#[test]
fn test_merged_spends_reserve_once() {
    let w = Wallet::new();
    let alice = w.account("alice", vec![XPrv::from_seed(b"alice").xpub()], 1);
    w.fund(&alice, 1, NATIVE_ASSET_ID, 25, true);

    let template = w
        .build(json!([
            {"type": "spend_account", "account_id": alice.id, "asset_id": NATIVE_ASSET_ID, "amount": 10},
            {"type": "spend_account", "account_id": alice.id, "asset_id": NATIVE_ASSET_ID, "amount": 15},
            {"type": "control_address", "address": bob(), "asset_id": NATIVE_ASSET_ID, "amount": 25}
        ]))
        .expect("build");
    assert_eq!(template.signing_instructions.len(), 1);
    assert_eq!(w.accounts.keeper().reservation_count(), 1);
}

#[test]
fn test_fee_limit_blocks_finalize() {
    let w = Wallet::new();
    let key = XPrv::from_seed(b"alice");
    let alice = w.account("alice", vec![key.xpub()], 1);
    w.fund(&alice, 1, NATIVE_ASSET_ID, 1_000, true);

    let mut template = w
        .build(json!([
            {"type": "spend_account", "account_id": alice.id, "asset_id": NATIVE_ASSET_ID, "amount": 1_000},
            {"type": "control_address", "address": bob(), "asset_id": NATIVE_ASSET_ID, "amount": 1}
        ]))
        .expect("build");
    sign_with_key(&mut template, &key).expect("sign");

    let config = WalletConfig {
        max_tx_fee: 500,
        ..WalletConfig::default()
    };
    let mut tx = template.transaction.expect("tx");
    assert!(finalize_tx(&StaticChain::default(), &config, &mut tx).is_err());
}
