//! # Transactions
//!
//! The data model that templates build and the ledger validates.
//!
//! - [`types`] — 32-byte identifiers and asset amounts.
//! - [`tx`] — inputs, outputs, transaction data, ids and signature hashes.
//! - [`program`] — control programs and the signature programs witnesses
//!   commit to.

pub mod program;
pub mod tx;
pub mod types;

pub use tx::{CrossChainInput, OutputKind, SpendInput, Tx, TxData, TxInput, TxOutput};
pub use types::{AssetAmount, AssetId, Hash, ParseIdError};
