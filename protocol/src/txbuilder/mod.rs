//! # Transaction Builder
//!
//! Turns a list of [`Action`]s into a signed, finalized transaction.
//!
//! ## Pipeline
//!
//! ```text
//! actions ──build()──▶ Template ──sign()──▶ Template ──finalize_tx()──▶ ledger
//!            │                     (repeat until
//!            │                      sign_progress)
//!            └── on any failure: every compensation runs, nothing stays reserved
//! ```
//!
//! ## Modules
//!
//! - [`actions`] — the action sum type and the output/cross-chain actions.
//! - [`builder`] — [`TemplateBuilder`] and its compensations.
//! - [`template`] — the template wire format and signing instructions.
//! - [`witness`] — witness components and signature programs.
//! - [`signer`] — signing rounds, progress and materialization.
//! - [`args`] — contract arguments for spending specific outputs.
//! - [`estimate`] — gas estimation.
//! - [`finalize`] — fee limits, sighash commitment and ledger hand-off.

pub mod actions;
pub mod args;
pub mod builder;
pub mod estimate;
pub mod finalize;
pub mod signer;
pub mod template;
pub mod witness;

pub use actions::{Action, BuildAction};
pub use builder::{check_blank_check, BuilderState, Compensation, TemplateBuilder};
pub use estimate::{estimate_tx_gas, EstimateTxGasInfo};
pub use finalize::{calculate_tx_fee, check_tx_sighash_commitment, finalize_tx, FinalizeError};
pub use signer::{
    materialize_witnesses, sign, sign_progress, sign_with_key, KeyRing, SignError, TxSigner,
};
pub use template::{SigningInstruction, Template};
pub use witness::{DataWitness, KeyId, RawTxSigWitness, SignatureWitness, WitnessComponent};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::account::dpos::DposView;
use crate::account::{AccountError, AccountManager, KeeperError};
use crate::address::AddressError;
use crate::config::WalletConfig;
use crate::crypto::KeyError;
use crate::transaction::program::ProgramError;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TxBuilderError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("bad amount: {0}")]
    BadAmount(String),

    #[error("transaction has no inputs and no outputs")]
    EmptyTransaction,

    #[error("unsafe transaction: leaves assets free to control")]
    BlankCheck,

    #[error("template builder is {0:?}")]
    NotOpen(BuilderState),

    #[error("conflicting reference data")]
    ReferenceDataConflict,

    #[error("asset id does not match its issuance")]
    InvalidAssetId,

    #[error("only the native asset can be {0}")]
    NativeAssetRequired(&'static str),

    #[error("contract argument type {0:?} is not supported")]
    BadContractArgType(String),

    #[error("dpos: {0}")]
    Dpos(String),

    #[error("missing raw tx")]
    MissingRawTx,

    #[error("too many signing instructions in template: {instructions} for {inputs} inputs")]
    BadInstructionCount { instructions: usize, inputs: usize },

    #[error("signing instruction position {0} has no input")]
    BadTxInputIdx(u32),

    #[error("{} action(s) failed: {}", .0.len(), describe_failures(.0))]
    Actions(Vec<ActionFailure>),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Keeper(#[from] KeeperError),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Program(#[from] ProgramError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// One failed action of a build.
#[derive(Debug, Error)]
#[error("action {index}: {source}")]
pub struct ActionFailure {
    pub index: usize,
    pub source: TxBuilderError,
}

fn describe_failures(failures: &[ActionFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// `Err(MissingFields)` naming every field flagged as missing.
pub(crate) fn require_fields(fields: &[(&str, bool)]) -> Result<(), TxBuilderError> {
    let missing: Vec<String> = fields
        .iter()
        .filter(|(_, is_missing)| *is_missing)
        .map(|(name, _)| name.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(TxBuilderError::MissingFields(missing))
    }
}

// ---------------------------------------------------------------------------
// Build
// ---------------------------------------------------------------------------

/// Everything an action may consult while building.
pub struct BuildContext<'a> {
    pub accounts: &'a AccountManager,
    pub config: &'a WalletConfig,
    pub dpos: &'a dyn DposView,
}

/// Run every action against a fresh builder and produce a template.
///
/// All actions run even after one fails, so the error lists every failure.
/// On any failure, including the final assembly, the builder is rolled back
/// and no reservation taken by the build survives.
pub fn build(
    ctx: &BuildContext<'_>,
    actions: &[Action],
    max_time: DateTime<Utc>,
    time_range: u64,
) -> Result<Template, TxBuilderError> {
    let keeper = ctx.accounts.keeper();
    let mut builder = TemplateBuilder::new(max_time, time_range);

    let mut failures = Vec::new();
    for (index, action) in actions.iter().enumerate() {
        if let Err(source) = action.build(ctx, &mut builder) {
            warn!(index, action = action.action_type(), error = %source, "action failed");
            failures.push(ActionFailure { index, source });
        }
    }

    if !failures.is_empty() {
        builder.rollback(keeper);
        return Err(TxBuilderError::Actions(failures));
    }

    match builder.build() {
        Ok((template, _)) => {
            info!(
                actions = actions.len(),
                signing_instructions = template.signing_instructions.len(),
                fee = template.fee,
                "built transaction template"
            );
            Ok(template)
        }
        Err(e) => {
            builder.rollback(keeper);
            Err(e)
        }
    }
}
