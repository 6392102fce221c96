//! # Template Builder
//!
//! Accumulates the inputs, outputs and signing instructions produced by a
//! build's actions, together with the compensations that undo whatever the
//! actions acquired.
//!
//! ```text
//!            build()
//!   Open ──────────────▶ Committed
//!    │                       │
//!    │ rollback()            │ rollback()
//!    ▼                       ▼
//!   RolledBack ◀─────────────┘
//! ```
//!
//! Only an open builder accepts inputs and outputs. `rollback` runs every
//! registered compensation exactly once, in registration order; calling it
//! again does nothing.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

use super::finalize::calculate_tx_fee;
use super::template::{SigningInstruction, Template};
use super::TxBuilderError;
use crate::account::UtxoKeeper;
use crate::config::NATIVE_ASSET_ID;
use crate::transaction::{AssetId, Tx, TxData, TxInput, TxOutput};

/// Work to undo when a build is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compensation {
    CancelReservation(u64),
}

impl Compensation {
    fn run(self, keeper: &UtxoKeeper) {
        match self {
            Compensation::CancelReservation(id) => {
                keeper.cancel(id);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    Open,
    Committed,
    RolledBack,
}

#[derive(Debug)]
pub struct TemplateBuilder {
    inputs: Vec<TxInput>,
    instructions: Vec<SigningInstruction>,
    outputs: Vec<TxOutput>,
    reference_data: Vec<u8>,
    max_time: DateTime<Utc>,
    time_range: u64,
    compensations: Vec<Compensation>,
    state: BuilderState,
}

fn check_amount(amount: u64) -> Result<(), TxBuilderError> {
    if amount > i64::MAX as u64 {
        return Err(TxBuilderError::BadAmount(format!(
            "amount {amount} exceeds the maximum of {}",
            i64::MAX
        )));
    }
    Ok(())
}

impl TemplateBuilder {
    /// `max_time` bounds the reservations taken by the build; `time_range`
    /// is copied into the transaction.
    pub fn new(max_time: DateTime<Utc>, time_range: u64) -> Self {
        Self {
            inputs: Vec::new(),
            instructions: Vec::new(),
            outputs: Vec::new(),
            reference_data: Vec::new(),
            max_time,
            time_range,
            compensations: Vec::new(),
            state: BuilderState::Open,
        }
    }

    pub fn state(&self) -> BuilderState {
        self.state
    }

    pub fn max_time(&self) -> DateTime<Utc> {
        self.max_time
    }

    pub fn inputs(&self) -> &[TxInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    fn ensure_open(&self) -> Result<(), TxBuilderError> {
        if self.state != BuilderState::Open {
            return Err(TxBuilderError::NotOpen(self.state));
        }
        Ok(())
    }

    pub fn add_input(
        &mut self,
        input: TxInput,
        instruction: SigningInstruction,
    ) -> Result<(), TxBuilderError> {
        self.ensure_open()?;
        if !input.is_coinbase() {
            check_amount(input.amount())?;
        }
        self.inputs.push(input);
        self.instructions.push(instruction);
        Ok(())
    }

    pub fn add_output(&mut self, output: TxOutput) -> Result<(), TxBuilderError> {
        self.ensure_open()?;
        check_amount(output.amount)?;
        self.outputs.push(output);
        Ok(())
    }

    /// Attach reference data. A second, different value is a conflict.
    pub fn set_reference_data(&mut self, data: Vec<u8>) -> Result<(), TxBuilderError> {
        self.ensure_open()?;
        if !self.reference_data.is_empty() && self.reference_data != data {
            return Err(TxBuilderError::ReferenceDataConflict);
        }
        self.reference_data = data;
        Ok(())
    }

    pub fn on_rollback(&mut self, compensation: Compensation) {
        self.compensations.push(compensation);
    }

    /// Run every compensation once. Further calls are no-ops.
    pub fn rollback(&mut self, keeper: &UtxoKeeper) {
        if self.state == BuilderState::RolledBack {
            return;
        }
        let count = self.compensations.len();
        for compensation in self.compensations.drain(..) {
            compensation.run(keeper);
        }
        self.state = BuilderState::RolledBack;
        debug!(compensations = count, "template builder rolled back");
    }

    /// Assemble the template and commit the builder.
    pub fn build(&mut self) -> Result<(Template, TxData), TxBuilderError> {
        self.ensure_open()?;
        if self.inputs.is_empty() && self.outputs.is_empty() {
            return Err(TxBuilderError::EmptyTransaction);
        }

        let data = TxData {
            time_range: self.time_range,
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            reference_data: self.reference_data.clone(),
            ..Default::default()
        };
        check_blank_check(&data)?;

        let mut instructions = self.instructions.clone();
        for (position, instruction) in instructions.iter_mut().enumerate() {
            instruction.position = position as u32;
        }

        let tx = Tx::new(data.clone());
        let fee = calculate_tx_fee(&tx).unwrap_or(0);
        self.state = BuilderState::Committed;
        debug!(
            tx_id = %tx.id,
            inputs = data.inputs.len(),
            outputs = data.outputs.len(),
            fee,
            "template built"
        );

        Ok((
            Template {
                transaction: Some(tx),
                signing_instructions: instructions,
                fee,
                allow_additional_actions: false,
            },
            data,
        ))
    }
}

/// Reject transactions that leave a non-native asset free for anyone to
/// claim: more in than out for some asset while no asset is short. Native
/// surplus is the fee and does not count.
pub fn check_blank_check(data: &TxData) -> Result<(), TxBuilderError> {
    let mut balances: HashMap<AssetId, i64> = HashMap::new();
    let overflow = || TxBuilderError::BadAmount("asset balance overflow".into());

    for input in data.inputs.iter().filter(|i| !i.is_coinbase()) {
        let amount = i64::try_from(input.amount()).map_err(|_| overflow())?;
        let balance = balances.entry(input.asset_id()).or_insert(0);
        *balance = balance.checked_add(amount).ok_or_else(overflow)?;
    }
    for output in &data.outputs {
        let amount = i64::try_from(output.amount).map_err(|_| overflow())?;
        let balance = balances.entry(output.asset_id).or_insert(0);
        *balance = balance.checked_sub(amount).ok_or_else(overflow)?;
    }

    let mut requires_outputs = false;
    let mut requires_inputs = false;
    for (asset, balance) in &balances {
        if *asset == NATIVE_ASSET_ID {
            continue;
        }
        requires_outputs |= *balance > 0;
        requires_inputs |= *balance < 0;
    }

    if requires_outputs && !requires_inputs {
        return Err(TxBuilderError::BlankCheck);
    }
    Ok(())
}
