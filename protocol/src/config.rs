//! # Protocol Configuration & Constants
//!
//! Every magic number the value-transfer path depends on lives here,
//! together with [`WalletConfig`], the runtime knobs an operator may set.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::crypto::XPub;
use crate::transaction::AssetId;

// ---------------------------------------------------------------------------
// Assets & Addresses
// ---------------------------------------------------------------------------

/// The native asset. Fees are paid in it and only it.
pub const NATIVE_ASSET_ID: AssetId = AssetId::new([0xff; 32]);

/// Bech32 human-readable part for mainnet addresses.
pub const MAINNET_HRP: &str = "vp";

/// Bech32 human-readable part for testnet addresses.
pub const TESTNET_HRP: &str = "tp";

// ---------------------------------------------------------------------------
// Coin Selection & Reservations
// ---------------------------------------------------------------------------

/// Upper bound on the number of UTXOs the selector will swap in when it
/// replaces the largest selected output with a run of smaller ones.
pub const DESIRE_UTXO_COUNT: usize = 5;

/// How often the background sweeper looks for expired reservations.
pub const RESERVATION_SWEEP_INTERVAL: Duration = Duration::from_millis(1000);

/// Default lifetime of a reservation made by a build request.
pub const DEFAULT_BUILD_TTL: Duration = Duration::from_secs(5 * 60);

// ---------------------------------------------------------------------------
// Fees & Gas
// ---------------------------------------------------------------------------

/// Default ceiling on the fee a finalized transaction may pay.
pub const DEFAULT_MAX_TX_FEE: u64 = 1_000_000_000;

/// Gas charged per byte of serialized transaction.
pub const STORAGE_GAS_RATE: i64 = 1;

/// Native units charged per unit of gas.
pub const VM_GAS_RATE: i64 = 200;

/// Gas every transaction receives for free.
pub const DEFAULT_GAS_CREDIT: i64 = 160_000;

// ---------------------------------------------------------------------------
// Delegated Proof of Stake
// ---------------------------------------------------------------------------

/// Minimum amount burned to register a forger.
pub const REGISTER_FORGER_FEE: u64 = 100_000_000;

/// Minimum amount burned to vote for forgers.
pub const VOTE_FORGER_FEE: u64 = 10_000_000;

/// Minimum amount burned to withdraw votes.
pub const CANCEL_VOTE_FORGER_FEE: u64 = 10_000_000;

// ---------------------------------------------------------------------------
// Key Tree
// ---------------------------------------------------------------------------

/// Key space byte prefixed to BIP32-style account paths.
pub const ACCOUNT_KEY_SPACE: u8 = 1;

/// Account indexes at or above this value are reserved for hardened keys.
pub const HARDENED_KEY_START: u64 = 0x8000_0000;

/// BIP44 purpose segment.
pub const BIP44_PURPOSE: u32 = 44;

/// BIP44 coin type segment.
pub const BIP44_COIN_TYPE: u32 = 153;

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// The cross-chain federation: the keys that co-sign `cross_chain_in`
/// inputs and how many of them must agree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationConfig {
    pub xpubs: Vec<XPub>,
    pub quorum: usize,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            xpubs: Vec::new(),
            quorum: 1,
        }
    }
}

/// Operator-tunable wallet parameters.
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Finalization rejects transactions paying more than this.
    pub max_tx_fee: u64,

    /// Period of the reservation expiry sweeper, in milliseconds.
    pub expire_interval_ms: u64,

    /// Lifetime of reservations taken by a build, in seconds.
    pub build_ttl_secs: u64,

    /// When set, finalization requires at least one input to commit to the
    /// whole-transaction signature hash. Off by default.
    pub enforce_sighash_commitment: bool,

    /// Bech32 HRP for addresses this wallet produces and accepts.
    pub network_hrp: String,

    pub federation: FederationConfig,

    /// Key that signs stake inputs of `dpos` actions.
    pub consensus_xpub: Option<XPub>,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            max_tx_fee: DEFAULT_MAX_TX_FEE,
            expire_interval_ms: RESERVATION_SWEEP_INTERVAL.as_millis() as u64,
            build_ttl_secs: DEFAULT_BUILD_TTL.as_secs(),
            enforce_sighash_commitment: false,
            network_hrp: MAINNET_HRP.to_string(),
            federation: FederationConfig::default(),
            consensus_xpub: None,
        }
    }
}

impl WalletConfig {
    pub fn expire_interval(&self) -> Duration {
        Duration::from_millis(self.expire_interval_ms)
    }

    pub fn build_ttl(&self) -> Duration {
        Duration::from_secs(self.build_ttl_secs)
    }
}
