//! # Stake Transactions
//!
//! The `dpos` action moves funds held at an address through the consensus
//! key, optionally tagging the transaction with a delegate operation in its
//! reference data:
//!
//! | dpos_type | operation     | minimum amount          | precondition                    |
//! |-----------|---------------|-------------------------|---------------------------------|
//! | 0         | plain stake   | none                    | none                            |
//! | 1         | register      | `REGISTER_FORGER_FEE`   | name not yet registered         |
//! | 2         | vote          | `VOTE_FORGER_FEE`       | no existing vote for any forger |
//! | 3         | cancel vote   | `CANCEL_VOTE_FORGER_FEE`| an existing vote for each forger |
//!
//! Delegate state comes from the consensus engine through [`DposView`].

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Owner, ReserveRequest, Utxo};
use crate::address::Address;
use crate::config::{CANCEL_VOTE_FORGER_FEE, REGISTER_FORGER_FEE, VOTE_FORGER_FEE};
use crate::crypto::{xpub_keys, XPub};
use crate::transaction::program::multisig_program;
use crate::transaction::{AssetId, TxInput, TxOutput};
use crate::txbuilder::actions::BuildAction;
use crate::txbuilder::{
    require_fields, BuildContext, Compensation, SigningInstruction, TemplateBuilder,
    TxBuilderError,
};

/// Read access to delegate registrations and votes.
pub trait DposView: Send + Sync {
    /// Whether `name` is already registered, or `address` already
    /// registered a delegate.
    fn have_delegate(&self, name: &str, address: &str) -> bool;

    /// Whether `address` currently votes for `forger`.
    fn have_vote(&self, address: &str, forger: &str) -> bool;
}

/// A view with no delegates and no votes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelegates;

impl DposView for NoDelegates {
    fn have_delegate(&self, _name: &str, _address: &str) -> bool {
        false
    }

    fn have_vote(&self, _address: &str, _forger: &str) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DposType {
    Binary = 0,
    Register = 1,
    Vote = 2,
    CancelVote = 3,
}

impl TryFrom<u32> for DposType {
    type Error = TxBuilderError;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(DposType::Binary),
            1 => Ok(DposType::Register),
            2 => Ok(DposType::Vote),
            3 => Ok(DposType::CancelVote),
            other => Err(TxBuilderError::Dpos(format!("unknown dpos type {other}"))),
        }
    }
}

impl fmt::Display for DposType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DposType::Binary => "binary",
            DposType::Register => "register",
            DposType::Vote => "vote",
            DposType::CancelVote => "cancel vote",
        })
    }
}

/// The delegate operation carried in a stake transaction's reference data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DposMessage {
    Register { name: String },
    Vote { forgers: Vec<String> },
    CancelVote { forgers: Vec<String> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DposAction {
    pub asset_id: AssetId,
    pub amount: u64,
    pub dpos_type: u32,
    pub address: String,
    pub name: String,
    pub forgers: Vec<String>,
    pub use_unconfirmed: bool,
}

impl DposAction {
    fn require_fee(&self, kind: DposType, minimum: u64) -> Result<(), TxBuilderError> {
        if self.amount < minimum {
            return Err(TxBuilderError::Dpos(format!(
                "{kind} requires at least {minimum}, got {}",
                self.amount
            )));
        }
        Ok(())
    }

    fn require_forgers(&self, kind: DposType) -> Result<(), TxBuilderError> {
        if self.forgers.is_empty() {
            return Err(TxBuilderError::Dpos(format!("{kind} needs at least one forger")));
        }
        Ok(())
    }

    /// Validate the operation against delegate state and produce its
    /// message. Plain stakes carry none.
    fn message(&self, view: &dyn DposView) -> Result<Option<DposMessage>, TxBuilderError> {
        let kind = DposType::try_from(self.dpos_type)?;
        match kind {
            DposType::Binary => Ok(None),
            DposType::Register => {
                if self.name.is_empty() {
                    return Err(TxBuilderError::Dpos("register needs a name".into()));
                }
                self.require_fee(kind, REGISTER_FORGER_FEE)?;
                if view.have_delegate(&self.name, &self.address) {
                    return Err(TxBuilderError::Dpos(format!(
                        "forger {} is already registered",
                        self.name
                    )));
                }
                Ok(Some(DposMessage::Register {
                    name: self.name.clone(),
                }))
            }
            DposType::Vote => {
                self.require_forgers(kind)?;
                self.require_fee(kind, VOTE_FORGER_FEE)?;
                if let Some(f) = self.forgers.iter().find(|f| view.have_vote(&self.address, f)) {
                    return Err(TxBuilderError::Dpos(format!("forger {f} is already voted")));
                }
                Ok(Some(DposMessage::Vote {
                    forgers: self.forgers.clone(),
                }))
            }
            DposType::CancelVote => {
                self.require_forgers(kind)?;
                self.require_fee(kind, CANCEL_VOTE_FORGER_FEE)?;
                if let Some(f) = self.forgers.iter().find(|f| !view.have_vote(&self.address, f)) {
                    return Err(TxBuilderError::Dpos(format!("forger {f} is not voted")));
                }
                Ok(Some(DposMessage::CancelVote {
                    forgers: self.forgers.clone(),
                }))
            }
        }
    }
}

/// Input for a UTXO held at a stake address, signed by the consensus key
/// without derivation.
fn stake_input(
    utxo: &Utxo,
    consensus: &XPub,
    hrp: &str,
) -> Result<(TxInput, SigningInstruction), TxBuilderError> {
    let input = TxInput::spend(
        utxo.source_id,
        utxo.asset_id,
        utxo.amount,
        utxo.source_pos,
        utxo.control_program.clone(),
    );
    let xpubs = [*consensus];
    let mut instruction = SigningInstruction::default();
    if utxo.address.is_empty() {
        instruction.add_witness_keys(&xpubs, &[], 1);
        return Ok((input, instruction));
    }

    instruction.add_raw_witness_keys(&xpubs, &[], 1);
    match Address::decode(&utxo.address, hrp)? {
        Address::WitnessPubKeyHash(_) => {
            instruction.add_data_witness(consensus.public_key().to_vec())
        }
        Address::WitnessScriptHash(_) => {
            instruction.add_data_witness(multisig_program(&xpub_keys(&xpubs), 1)?)
        }
    }
    Ok((input, instruction))
}

impl BuildAction for DposAction {
    fn action_type(&self) -> &'static str {
        "dpos"
    }

    fn build(&self, ctx: &BuildContext<'_>, builder: &mut TemplateBuilder) -> Result<(), TxBuilderError> {
        require_fields(&[
            ("asset_id", self.asset_id.is_zero()),
            ("address", self.address.is_empty()),
        ])?;

        let hrp = &ctx.config.network_hrp;
        let address = Address::decode(&self.address, hrp)?;
        let consensus = ctx
            .config
            .consensus_xpub
            .ok_or_else(|| TxBuilderError::Dpos("no consensus key configured".into()))?;

        if let Some(message) = self.message(ctx.dpos)? {
            builder.set_reference_data(serde_json::to_vec(&message)?)?;
        }

        let req = ReserveRequest::new(
            Owner::Address(self.address.clone()),
            self.asset_id,
            self.amount,
            builder.max_time(),
        )
        .use_unconfirmed(self.use_unconfirmed);
        let reservation = ctx.accounts.keeper().reserve(&req)?;
        builder.on_rollback(Compensation::CancelReservation(reservation.id));

        for utxo in &reservation.utxos {
            let (input, instruction) = stake_input(utxo, &consensus, hrp)?;
            builder.add_input(input, instruction)?;
        }

        if reservation.change > 0 {
            builder.add_output(TxOutput::intra(
                self.asset_id,
                reservation.change,
                address.control_program(),
            ))?;
        }
        Ok(())
    }
}
