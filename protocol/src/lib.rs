// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Vela Protocol — Value Transfer Core
//!
//! Everything a Vela wallet node needs between "the user wants to pay" and
//! "the ledger accepted the transaction": picking which unspent outputs back
//! a payment, assembling a transaction template from composable actions,
//! collecting quorum signatures, and handing the finished transaction to
//! the chain.
//!
//! ## Architecture
//!
//! - **account** — Accounts, signers, the account store, and the
//!   [`account::UtxoKeeper`], which owns every live reservation and runs
//!   coin selection.
//! - **txbuilder** — Actions, the [`txbuilder::TemplateBuilder`] with its
//!   compensating rollback, witness components, signing, gas estimation,
//!   and the finalization guard.
//! - **transaction** — The transaction data model, hashing, and control
//!   programs.
//! - **crypto** — Hashing and the extended-key tree used for signing.
//! - **address** — Bech32 witness addresses.
//! - **chain** — The narrow contract to the ledger.
//! - **config** — Protocol constants and wallet configuration.
//! - **encoding** — Serde helpers for hex-encoded byte fields.
//!
//! ## The one rule
//!
//! A UTXO is never claimed by two live reservations. Every reservation is
//! released by cancel, by expiry, or by the rollback of the build that
//! acquired it.

pub mod account;
pub mod address;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod encoding;
pub mod transaction;
pub mod txbuilder;
