//! # Actions
//!
//! An action is one step of a build: spend from an account, pay an
//! address, retire an asset, claim a cross-chain deposit, and so on.
//! Requests carry them as JSON objects tagged by `type`:
//!
//! ```json
//! [
//!   {"type": "spend_account", "account_id": "...", "asset_id": "ff..ff", "amount": 100},
//!   {"type": "control_address", "address": "vp1...", "asset_id": "ff..ff", "amount": 90}
//! ]
//! ```
//!
//! Every field defaults when absent, so a missing field surfaces as a
//! `MissingFields` error naming it rather than as a parse failure.
//!
//! The account-backed actions live in [`crate::account::builder`] and
//! [`crate::account::dpos`]; the output-only and cross-chain actions live
//! here.

use serde::{Deserialize, Serialize};

use super::builder::TemplateBuilder;
use super::template::SigningInstruction;
use super::{require_fields, BuildContext, TxBuilderError};
use crate::account::builder::{SpendAction, SpendUtxoAction, VetoAction};
use crate::account::dpos::DposAction;
use crate::address::Address;
use crate::config::NATIVE_ASSET_ID;
use crate::crypto::{sha256, sha256_multi, xpub_keys};
use crate::encoding::{hex_bytes, HexBytes};
use crate::transaction::program::{multisig_program, p2wsh_for_script, retire_program};
use crate::transaction::{
    AssetId, CrossChainInput, Hash, SpendInput, TxInput, TxOutput,
};

/// A single build step.
pub trait BuildAction {
    fn action_type(&self) -> &'static str;

    fn build(&self, ctx: &BuildContext<'_>, builder: &mut TemplateBuilder) -> Result<(), TxBuilderError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    SpendAccount(SpendAction),
    SpendAccountUnspentOutput(SpendUtxoAction),
    ControlAddress(ControlAddressAction),
    ControlProgram(ControlProgramAction),
    Retire(RetireAction),
    CrossChainIn(CrossChainInAction),
    CrossChainOut(CrossChainOutAction),
    VoteOutput(VoteOutputAction),
    Veto(VetoAction),
    #[serde(alias = "dpos_stake")]
    Dpos(DposAction),
}

impl Action {
    fn inner(&self) -> &dyn BuildAction {
        match self {
            Action::SpendAccount(a) => a,
            Action::SpendAccountUnspentOutput(a) => a,
            Action::ControlAddress(a) => a,
            Action::ControlProgram(a) => a,
            Action::Retire(a) => a,
            Action::CrossChainIn(a) => a,
            Action::CrossChainOut(a) => a,
            Action::VoteOutput(a) => a,
            Action::Veto(a) => a,
            Action::Dpos(a) => a,
        }
    }

    pub fn action_type(&self) -> &'static str {
        self.inner().action_type()
    }

    pub fn build(&self, ctx: &BuildContext<'_>, builder: &mut TemplateBuilder) -> Result<(), TxBuilderError> {
        self.inner().build(ctx, builder)
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Pay `amount` of `asset_id` to a bech32 address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlAddressAction {
    pub asset_id: AssetId,
    pub amount: u64,
    pub address: String,
}

impl BuildAction for ControlAddressAction {
    fn action_type(&self) -> &'static str {
        "control_address"
    }

    fn build(&self, ctx: &BuildContext<'_>, builder: &mut TemplateBuilder) -> Result<(), TxBuilderError> {
        require_fields(&[
            ("address", self.address.is_empty()),
            ("asset_id", self.asset_id.is_zero()),
            ("amount", self.amount == 0),
        ])?;
        let address = Address::decode(&self.address, &ctx.config.network_hrp)?;
        builder.add_output(TxOutput::intra(self.asset_id, self.amount, address.control_program()))
    }
}

/// Pay `amount` of `asset_id` to a raw control program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlProgramAction {
    pub asset_id: AssetId,
    pub amount: u64,
    #[serde(with = "hex_bytes")]
    pub control_program: Vec<u8>,
}

impl BuildAction for ControlProgramAction {
    fn action_type(&self) -> &'static str {
        "control_program"
    }

    fn build(&self, _ctx: &BuildContext<'_>, builder: &mut TemplateBuilder) -> Result<(), TxBuilderError> {
        require_fields(&[
            ("control_program", self.control_program.is_empty()),
            ("asset_id", self.asset_id.is_zero()),
            ("amount", self.amount == 0),
        ])?;
        builder.add_output(TxOutput::intra(
            self.asset_id,
            self.amount,
            self.control_program.clone(),
        ))
    }
}

/// Destroy `amount` of `asset_id`, with an optional comment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetireAction {
    pub asset_id: AssetId,
    pub amount: u64,
    #[serde(with = "hex_bytes")]
    pub arbitrary: Vec<u8>,
}

impl BuildAction for RetireAction {
    fn action_type(&self) -> &'static str {
        "retire"
    }

    fn build(&self, _ctx: &BuildContext<'_>, builder: &mut TemplateBuilder) -> Result<(), TxBuilderError> {
        require_fields(&[
            ("asset_id", self.asset_id.is_zero()),
            ("amount", self.amount == 0),
        ])?;
        builder.add_output(TxOutput::intra(
            self.asset_id,
            self.amount,
            retire_program(&self.arbitrary),
        ))
    }
}

/// Pay out to an address on the main chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossChainOutAction {
    pub asset_id: AssetId,
    pub amount: u64,
    pub address: String,
}

impl BuildAction for CrossChainOutAction {
    fn action_type(&self) -> &'static str {
        "cross_chain_out"
    }

    fn build(&self, ctx: &BuildContext<'_>, builder: &mut TemplateBuilder) -> Result<(), TxBuilderError> {
        require_fields(&[
            ("address", self.address.is_empty()),
            ("asset_id", self.asset_id.is_zero()),
            ("amount", self.amount == 0),
        ])?;
        let address = Address::decode(&self.address, &ctx.config.network_hrp)?;
        builder.add_output(TxOutput::cross_chain(
            self.asset_id,
            self.amount,
            address.control_program(),
        ))
    }
}

/// Lock funds at an address as a vote for `vote`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoteOutputAction {
    pub asset_id: AssetId,
    pub amount: u64,
    pub address: String,
    pub vote: HexBytes,
}

impl BuildAction for VoteOutputAction {
    fn action_type(&self) -> &'static str {
        "vote_output"
    }

    fn build(&self, ctx: &BuildContext<'_>, builder: &mut TemplateBuilder) -> Result<(), TxBuilderError> {
        require_fields(&[
            ("address", self.address.is_empty()),
            ("asset_id", self.asset_id.is_zero()),
            ("amount", self.amount == 0),
            ("vote", self.vote.is_empty()),
        ])?;
        let address = Address::decode(&self.address, &ctx.config.network_hrp)?;
        builder.add_output(TxOutput::vote(
            self.asset_id,
            self.amount,
            address.control_program(),
            self.vote.0.clone(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Cross-chain deposits
// ---------------------------------------------------------------------------

/// The id of an asset issued by `issuance_program` under `vm_version` with
/// the given definition.
pub fn compute_asset_id(issuance_program: &[u8], vm_version: u64, raw_definition: &[u8]) -> AssetId {
    AssetId::new(sha256_multi(&[
        issuance_program,
        &vm_version.to_le_bytes(),
        &sha256(raw_definition),
    ]))
}

/// Claim a deposit made on the main chain. The federation co-signs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossChainInAction {
    pub asset_id: AssetId,
    pub amount: u64,
    pub source_id: Hash,
    pub source_pos: u64,
    pub vm_version: u64,
    #[serde(rename = "raw_definition_byte", with = "hex_bytes")]
    pub raw_definition: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub issuance_program: Vec<u8>,
}

impl BuildAction for CrossChainInAction {
    fn action_type(&self) -> &'static str {
        "cross_chain_in"
    }

    fn build(&self, ctx: &BuildContext<'_>, builder: &mut TemplateBuilder) -> Result<(), TxBuilderError> {
        require_fields(&[
            ("source_id", self.source_id.is_zero()),
            ("amount", self.amount == 0),
        ])?;

        if self.asset_id != NATIVE_ASSET_ID
            && self.asset_id
                != compute_asset_id(&self.issuance_program, self.vm_version, &self.raw_definition)
        {
            return Err(TxBuilderError::InvalidAssetId);
        }

        let federation = &ctx.config.federation;
        let script = multisig_program(&xpub_keys(&federation.xpubs), federation.quorum)?;

        let mut instruction = SigningInstruction::default();
        instruction.add_raw_witness_keys(&federation.xpubs, &[], federation.quorum);
        instruction.add_data_witness(script.clone());

        let input = TxInput::CrossChain(CrossChainInput {
            spend: SpendInput::new(
                self.source_id,
                self.asset_id,
                self.amount,
                self.source_pos,
                p2wsh_for_script(&script),
            ),
            vm_version: self.vm_version,
            raw_definition: self.raw_definition.clone(),
            issuance_program: self.issuance_program.clone(),
        });
        builder.add_input(input, instruction)
    }
}
