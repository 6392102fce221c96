//! Account-backed actions: spending from an account, spending one chosen
//! output, and withdrawing votes.
//!
//! Every action that reserves registers a [`Compensation`] before adding
//! inputs, so a failed build releases what it took.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{KeeperError, Owner, ReserveRequest, Signer, Utxo};
use crate::config::NATIVE_ASSET_ID;
use crate::crypto::{derive_xpubs, xpub_keys};
use crate::encoding::HexBytes;
use crate::transaction::program::multisig_program;
use crate::transaction::{AssetId, Hash, TxInput, TxOutput};
use crate::txbuilder::actions::{Action, BuildAction};
use crate::txbuilder::args::{add_contract_args, ContractArgument};
use crate::txbuilder::{
    require_fields, BuildContext, Compensation, SigningInstruction, TemplateBuilder,
    TxBuilderError,
};

/// Turn a UTXO into a transaction input and the instruction for signing it.
///
/// Vote-carrying UTXOs become veto inputs. Without a signer the instruction
/// is empty and the caller supplies the witness. A UTXO with an address
/// gets raw signatures plus the data the program checks them against: the
/// derived public key for single-key accounts, the multisig script
/// otherwise.
pub fn utxo_to_inputs(
    signer: Option<&Signer>,
    utxo: &Utxo,
) -> Result<(TxInput, SigningInstruction), TxBuilderError> {
    let input = match utxo.vote.as_deref() {
        Some(vote) if !vote.is_empty() => TxInput::veto(
            utxo.source_id,
            utxo.asset_id,
            utxo.amount,
            utxo.source_pos,
            utxo.control_program.clone(),
            vote.to_vec(),
        ),
        _ => TxInput::spend(
            utxo.source_id,
            utxo.asset_id,
            utxo.amount,
            utxo.source_pos,
            utxo.control_program.clone(),
        ),
    };

    let mut instruction = SigningInstruction::default();
    let Some(signer) = signer else {
        return Ok((input, instruction));
    };

    let path = signer.path(utxo.change, utxo.control_program_index);
    if utxo.address.is_empty() {
        instruction.add_witness_keys(&signer.xpubs, &path, signer.quorum);
        return Ok((input, instruction));
    }

    instruction.add_raw_witness_keys(&signer.xpubs, &path, signer.quorum);
    let derived = derive_xpubs(&signer.xpubs, &path)?;
    match derived.as_slice() {
        [only] => instruction.add_data_witness(only.public_key().to_vec()),
        _ => instruction.add_data_witness(multisig_program(&xpub_keys(&derived), signer.quorum)?),
    }
    Ok((input, instruction))
}

/// Combine `spend_account` actions that draw the same asset from the same
/// account into one, summing their amounts. Order of first appearance is
/// kept; other actions pass through untouched. A merged amount that does
/// not fit in a `u64` is rejected.
pub fn merge_spend_actions(actions: Vec<Action>) -> Result<Vec<Action>, TxBuilderError> {
    let mut merged: Vec<Action> = Vec::with_capacity(actions.len());
    let mut seen: HashMap<(AssetId, String), usize> = HashMap::new();

    for action in actions {
        let Action::SpendAccount(spend) = action else {
            merged.push(action);
            continue;
        };
        let key = (spend.asset_id, spend.account_id.clone());
        match seen.get(&key) {
            Some(&at) => {
                if let Action::SpendAccount(first) = &mut merged[at] {
                    first.amount = first.amount.checked_add(spend.amount).ok_or_else(|| {
                        TxBuilderError::BadAmount(format!(
                            "merged spend of {} from account {} overflows",
                            spend.asset_id, spend.account_id
                        ))
                    })?;
                    first.use_unconfirmed |= spend.use_unconfirmed;
                }
            }
            None => {
                seen.insert(key, merged.len());
                merged.push(Action::SpendAccount(spend));
            }
        }
    }
    Ok(merged)
}

/// Reserve account UTXOs and add them as inputs, plus a change output back
/// to a fresh change address when the selection overshoots.
fn spend_from_account(
    ctx: &BuildContext<'_>,
    builder: &mut TemplateBuilder,
    account_id: &str,
    req: ReserveRequest,
    change_vote: Option<&[u8]>,
) -> Result<(), TxBuilderError> {
    let account = ctx.accounts.find_by_id(account_id)?;
    let reservation = ctx.accounts.keeper().reserve(&req)?;
    builder.on_rollback(Compensation::CancelReservation(reservation.id));

    for utxo in &reservation.utxos {
        let (input, instruction) = utxo_to_inputs(Some(&account.signer), utxo)?;
        builder.add_input(input, instruction)?;
    }

    if reservation.change > 0 {
        let change = ctx.accounts.create_address_for(&account, true)?;
        let output = match change_vote {
            Some(vote) => TxOutput::vote(
                req.asset_id,
                reservation.change,
                change.control_program,
                vote.to_vec(),
            ),
            None => TxOutput::intra(req.asset_id, reservation.change, change.control_program),
        };
        builder.add_output(output)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// spend_account
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpendAction {
    pub account_id: String,
    pub asset_id: AssetId,
    pub amount: u64,
    pub use_unconfirmed: bool,
}

impl BuildAction for SpendAction {
    fn action_type(&self) -> &'static str {
        "spend_account"
    }

    fn build(&self, ctx: &BuildContext<'_>, builder: &mut TemplateBuilder) -> Result<(), TxBuilderError> {
        require_fields(&[
            ("account_id", self.account_id.is_empty()),
            ("asset_id", self.asset_id.is_zero()),
            ("amount", self.amount == 0),
        ])?;
        let req = ReserveRequest::new(
            Owner::Account(self.account_id.clone()),
            self.asset_id,
            self.amount,
            builder.max_time(),
        )
        .use_unconfirmed(self.use_unconfirmed);
        spend_from_account(ctx, builder, &self.account_id, req, None)
    }
}

// ---------------------------------------------------------------------------
// spend_account_unspent_output
// ---------------------------------------------------------------------------

/// Spend one specific output. With `arguments` the caller provides the
/// witness; otherwise the owning account's keys sign it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpendUtxoAction {
    pub output_id: Hash,
    pub use_unconfirmed: bool,
    pub arguments: Option<Vec<ContractArgument>>,
}

impl BuildAction for SpendUtxoAction {
    fn action_type(&self) -> &'static str {
        "spend_account_unspent_output"
    }

    fn build(&self, ctx: &BuildContext<'_>, builder: &mut TemplateBuilder) -> Result<(), TxBuilderError> {
        require_fields(&[("output_id", self.output_id.is_zero())])?;

        let keeper = ctx.accounts.keeper();
        let reservation =
            keeper.reserve_particular(&self.output_id, self.use_unconfirmed, builder.max_time())?;
        builder.on_rollback(Compensation::CancelReservation(reservation.id));

        let utxo = reservation
            .utxos
            .first()
            .ok_or(KeeperError::MatchUtxo(self.output_id))?;
        let account = if utxo.account_id.is_empty() {
            None
        } else {
            Some(ctx.accounts.find_by_id(&utxo.account_id)?)
        };

        let (input, instruction) = utxo_to_inputs(account.as_ref().map(|a| &a.signer), utxo)?;
        let instruction = match &self.arguments {
            None => instruction,
            Some(args) => {
                let mut custom = SigningInstruction::default();
                add_contract_args(&mut custom, args)?;
                custom
            }
        };
        builder.add_input(input, instruction)
    }
}

// ---------------------------------------------------------------------------
// veto
// ---------------------------------------------------------------------------

/// Withdraw `amount` of native asset voted for `vote`. Whatever is left
/// over stays voted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VetoAction {
    pub account_id: String,
    pub asset_id: AssetId,
    pub amount: u64,
    pub vote: HexBytes,
    pub use_unconfirmed: bool,
}

impl BuildAction for VetoAction {
    fn action_type(&self) -> &'static str {
        "veto"
    }

    fn build(&self, ctx: &BuildContext<'_>, builder: &mut TemplateBuilder) -> Result<(), TxBuilderError> {
        require_fields(&[
            ("account_id", self.account_id.is_empty()),
            ("asset_id", self.asset_id.is_zero()),
            ("amount", self.amount == 0),
            ("vote", self.vote.is_empty()),
        ])?;
        if self.asset_id != NATIVE_ASSET_ID {
            return Err(TxBuilderError::NativeAssetRequired("vetoed"));
        }
        let req = ReserveRequest::new(
            Owner::Account(self.account_id.clone()),
            self.asset_id,
            self.amount,
            builder.max_time(),
        )
        .use_unconfirmed(self.use_unconfirmed)
        .vote(Some(self.vote.0.clone()));
        spend_from_account(ctx, builder, &self.account_id, req, Some(self.vote.as_slice()))
    }
}
