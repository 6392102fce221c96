//! The transaction data model.
//!
//! A [`Tx`] is [`TxData`] plus its id. The id commits to every field except
//! input arguments and the cached serialized size, so attaching witnesses
//! to a signed template never changes what was signed.
//!
//! ## Wire format
//!
//! Templates carry the transaction as `raw_transaction`: the hex encoding
//! of the bincode-serialized [`TxData`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::ops::Deref;

use crate::crypto::{sha256, sha256_multi};
use crate::encoding::{hex_bytes, HexBytes};
use crate::transaction::{AssetId, Hash};

// ---------------------------------------------------------------------------
// Commitment encoding
// ---------------------------------------------------------------------------

fn put_u64(w: &mut Vec<u8>, v: u64) {
    w.extend_from_slice(&v.to_le_bytes());
}

fn put_bytes(w: &mut Vec<u8>, b: &[u8]) {
    put_u64(w, b.len() as u64);
    w.extend_from_slice(b);
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Spends a previously committed output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendInput {
    pub source_id: Hash,
    pub source_pos: u64,
    pub asset_id: AssetId,
    pub amount: u64,
    #[serde(with = "hex_bytes")]
    pub control_program: Vec<u8>,
    pub arguments: Vec<HexBytes>,
}

impl SpendInput {
    pub fn new(
        source_id: Hash,
        asset_id: AssetId,
        amount: u64,
        source_pos: u64,
        control_program: Vec<u8>,
    ) -> Self {
        Self {
            source_id,
            source_pos,
            asset_id,
            amount,
            control_program,
            arguments: Vec::new(),
        }
    }

    /// Id of the output this input consumes.
    pub fn spent_output_id(&self) -> Hash {
        Hash::new(sha256_multi(&[
            b"output",
            self.source_id.as_bytes(),
            self.asset_id.as_bytes(),
            &self.amount.to_le_bytes(),
            &self.source_pos.to_le_bytes(),
            &self.control_program,
        ]))
    }

    fn write_commitment(&self, w: &mut Vec<u8>) {
        w.extend_from_slice(self.source_id.as_bytes());
        put_u64(w, self.source_pos);
        w.extend_from_slice(self.asset_id.as_bytes());
        put_u64(w, self.amount);
        put_bytes(w, &self.control_program);
    }
}

/// A cross-chain claim, authorized by the federation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainInput {
    pub spend: SpendInput,
    pub vm_version: u64,
    #[serde(with = "hex_bytes")]
    pub raw_definition: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub issuance_program: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxInput {
    Spend(SpendInput),
    /// Spends a vote-carrying output, withdrawing its vote.
    Veto {
        spend: SpendInput,
        #[serde(with = "hex_bytes")]
        vote: Vec<u8>,
    },
    CrossChain(CrossChainInput),
    Coinbase {
        #[serde(with = "hex_bytes")]
        arbitrary: Vec<u8>,
    },
}

impl TxInput {
    pub fn spend(
        source_id: Hash,
        asset_id: AssetId,
        amount: u64,
        source_pos: u64,
        control_program: Vec<u8>,
    ) -> Self {
        TxInput::Spend(SpendInput::new(
            source_id,
            asset_id,
            amount,
            source_pos,
            control_program,
        ))
    }

    pub fn veto(
        source_id: Hash,
        asset_id: AssetId,
        amount: u64,
        source_pos: u64,
        control_program: Vec<u8>,
        vote: Vec<u8>,
    ) -> Self {
        TxInput::Veto {
            spend: SpendInput::new(source_id, asset_id, amount, source_pos, control_program),
            vote,
        }
    }

    pub fn coinbase(arbitrary: Vec<u8>) -> Self {
        TxInput::Coinbase { arbitrary }
    }

    fn spend_part(&self) -> Option<&SpendInput> {
        match self {
            TxInput::Spend(s) | TxInput::Veto { spend: s, .. } => Some(s),
            TxInput::CrossChain(c) => Some(&c.spend),
            TxInput::Coinbase { .. } => None,
        }
    }

    fn spend_part_mut(&mut self) -> Option<&mut SpendInput> {
        match self {
            TxInput::Spend(s) | TxInput::Veto { spend: s, .. } => Some(s),
            TxInput::CrossChain(c) => Some(&mut c.spend),
            TxInput::Coinbase { .. } => None,
        }
    }

    pub fn input_type(&self) -> &'static str {
        match self {
            TxInput::Spend(_) => "spend",
            TxInput::Veto { .. } => "veto",
            TxInput::CrossChain(_) => "cross_chain_in",
            TxInput::Coinbase { .. } => "coinbase",
        }
    }

    pub fn is_coinbase(&self) -> bool {
        matches!(self, TxInput::Coinbase { .. })
    }

    /// Zero asset id for coinbase inputs.
    pub fn asset_id(&self) -> AssetId {
        self.spend_part().map(|s| s.asset_id).unwrap_or_default()
    }

    /// Zero for coinbase inputs.
    pub fn amount(&self) -> u64 {
        self.spend_part().map(|s| s.amount).unwrap_or(0)
    }

    pub fn control_program(&self) -> &[u8] {
        self.spend_part()
            .map(|s| s.control_program.as_slice())
            .unwrap_or(&[])
    }

    pub fn arguments(&self) -> &[HexBytes] {
        self.spend_part().map(|s| s.arguments.as_slice()).unwrap_or(&[])
    }

    /// Replace the witness arguments. No-op for coinbase inputs.
    pub fn set_arguments(&mut self, args: Vec<Vec<u8>>) {
        if let Some(s) = self.spend_part_mut() {
            s.arguments = args.into_iter().map(HexBytes).collect();
        }
    }

    pub fn spent_output_id(&self) -> Option<Hash> {
        match self {
            TxInput::Spend(s) | TxInput::Veto { spend: s, .. } => Some(s.spent_output_id()),
            _ => None,
        }
    }

    fn write_commitment(&self, w: &mut Vec<u8>) {
        match self {
            TxInput::Spend(s) => {
                w.push(0);
                s.write_commitment(w);
            }
            TxInput::Veto { spend, vote } => {
                w.push(1);
                spend.write_commitment(w);
                put_bytes(w, vote);
            }
            TxInput::CrossChain(c) => {
                w.push(2);
                c.spend.write_commitment(w);
                put_u64(w, c.vm_version);
                put_bytes(w, &c.raw_definition);
                put_bytes(w, &c.issuance_program);
            }
            TxInput::Coinbase { arbitrary } => {
                w.push(3);
                put_bytes(w, arbitrary);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputKind {
    Intra,
    CrossChain,
    Vote {
        #[serde(with = "hex_bytes")]
        vote: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub kind: OutputKind,
    pub asset_id: AssetId,
    pub amount: u64,
    #[serde(with = "hex_bytes")]
    pub control_program: Vec<u8>,
}

impl TxOutput {
    pub fn intra(asset_id: AssetId, amount: u64, control_program: Vec<u8>) -> Self {
        Self {
            kind: OutputKind::Intra,
            asset_id,
            amount,
            control_program,
        }
    }

    pub fn cross_chain(asset_id: AssetId, amount: u64, control_program: Vec<u8>) -> Self {
        Self {
            kind: OutputKind::CrossChain,
            asset_id,
            amount,
            control_program,
        }
    }

    pub fn vote(asset_id: AssetId, amount: u64, control_program: Vec<u8>, vote: Vec<u8>) -> Self {
        Self {
            kind: OutputKind::Vote { vote },
            asset_id,
            amount,
            control_program,
        }
    }

    fn write_commitment(&self, w: &mut Vec<u8>) {
        match &self.kind {
            OutputKind::Intra => w.push(0),
            OutputKind::CrossChain => w.push(1),
            OutputKind::Vote { vote } => {
                w.push(2);
                put_bytes(w, vote);
            }
        }
        w.extend_from_slice(self.asset_id.as_bytes());
        put_u64(w, self.amount);
        put_bytes(w, &self.control_program);
    }
}

// ---------------------------------------------------------------------------
// TxData / Tx
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxData {
    pub version: u64,
    /// Cached encoded length, refreshed at finalization.
    pub serialized_size: u64,
    pub time_range: u64,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    #[serde(with = "hex_bytes")]
    pub reference_data: Vec<u8>,
}

impl Default for TxData {
    fn default() -> Self {
        Self {
            version: 1,
            serialized_size: 0,
            time_range: 0,
            inputs: Vec::new(),
            outputs: Vec::new(),
            reference_data: Vec::new(),
        }
    }
}

impl TxData {
    fn commitment_bytes(&self) -> Vec<u8> {
        let mut w = Vec::new();
        put_u64(&mut w, self.version);
        put_u64(&mut w, self.time_range);
        put_u64(&mut w, self.inputs.len() as u64);
        for input in &self.inputs {
            input.write_commitment(&mut w);
        }
        put_u64(&mut w, self.outputs.len() as u64);
        for output in &self.outputs {
            output.write_commitment(&mut w);
        }
        put_bytes(&mut w, &self.reference_data);
        w
    }

    /// Length of the bincode encoding, arguments included.
    pub fn encoded_len(&self) -> Result<u64, bincode::Error> {
        bincode::serialized_size(self)
    }
}

/// A transaction and its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tx {
    pub data: TxData,
    pub id: Hash,
}

impl Tx {
    pub fn new(data: TxData) -> Self {
        let id = Hash::new(sha256(&data.commitment_bytes()));
        Self { data, id }
    }

    /// The hash an input's signatures commit to.
    pub fn sig_hash(&self, index: u32) -> Hash {
        Hash::new(sha256_multi(&[
            b"sighash",
            &index.to_le_bytes(),
            self.id.as_bytes(),
        ]))
    }

    /// Attach witness arguments to the input at `position`.
    /// Returns `false` if there is no such input.
    pub fn set_input_arguments(&mut self, position: usize, args: Vec<Vec<u8>>) -> bool {
        match self.data.inputs.get_mut(position) {
            Some(input) => {
                input.set_arguments(args);
                true
            }
            None => false,
        }
    }
}

impl Deref for Tx {
    type Target = TxData;

    fn deref(&self) -> &TxData {
        &self.data
    }
}

impl Serialize for Tx {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let raw = bincode::serialize(&self.data).map_err(serde::ser::Error::custom)?;
        s.serialize_str(&hex::encode(raw))
    }
}

impl<'de> Deserialize<'de> for Tx {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        let raw = hex::decode(s).map_err(serde::de::Error::custom)?;
        let data: TxData = bincode::deserialize(&raw).map_err(serde::de::Error::custom)?;
        Ok(Tx::new(data))
    }
}
