//! # Witness Components
//!
//! A signing instruction is an ordered list of components. Each one
//! contributes to the argument list of its input when the template is
//! materialized:
//!
//! | Component          | Signs                  | Materializes as                       |
//! |--------------------|------------------------|---------------------------------------|
//! | `signature`        | `sha256(program)`      | `N`, up to `quorum` sigs, `program`   |
//! | `raw_tx_signature` | the input's sighash    | up to `quorum` sigs                   |
//! | `data`             | nothing                | the bytes                             |
//!
//! `N` is the number of arguments already present, i.e. the arguments the
//! signature program consumes.
//!
//! Signature slots line up with `keys`: slot `i` holds the signature of
//! key `i`, or is empty.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::signer::TxSigner;
use super::TxBuilderError;
use crate::crypto::{sha256, XPub};
use crate::encoding::{hex_bytes, HexBytes};
use crate::transaction::program::{constraint_program, int64_bytes, txsighash_program, Constraint};
use crate::transaction::Tx;

/// A key that may sign: a root xpub and the path to the signing child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyId {
    pub xpub: XPub,
    #[serde(default)]
    pub derivation_path: Vec<HexBytes>,
}

impl KeyId {
    pub fn new(xpub: XPub, path: &[Vec<u8>]) -> Self {
        Self {
            xpub,
            derivation_path: path.iter().cloned().map(HexBytes).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureWitness {
    pub quorum: usize,
    pub keys: Vec<KeyId>,
    /// Built on first signing when empty.
    #[serde(default, with = "hex_bytes")]
    pub program: Vec<u8>,
    #[serde(default)]
    pub signatures: Vec<HexBytes>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTxSigWitness {
    pub quorum: usize,
    pub keys: Vec<KeyId>,
    #[serde(default)]
    pub signatures: Vec<HexBytes>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataWitness {
    #[serde(with = "hex_bytes")]
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WitnessComponent {
    Signature(SignatureWitness),
    RawTxSignature(RawTxSigWitness),
    Data(DataWitness),
}

/// Fill the first empty slot this signer can produce.
///
/// A failing key is logged and skipped. At most one slot is filled per
/// call, so a signer holding several of the keys contributes one
/// signature per signing round.
fn fill_first_slot(
    keys: &[KeyId],
    signatures: &mut Vec<HexBytes>,
    message: &[u8],
    signer: &dyn TxSigner,
) {
    signatures.resize(keys.len(), HexBytes::default());
    for (i, key) in keys.iter().enumerate() {
        if !signatures[i].is_empty() {
            continue;
        }
        match signer.sign(&key.xpub, &key.derivation_path, message) {
            Ok(sig) => {
                signatures[i] = HexBytes(sig);
                break;
            }
            Err(e) => {
                warn!(slot = i, xpub = %key.xpub, error = %e, "skipping signature slot");
            }
        }
    }
}

fn count_signed(signatures: &[HexBytes]) -> usize {
    signatures.iter().filter(|s| !s.is_empty()).count()
}

fn push_quorum(args: &mut Vec<Vec<u8>>, signatures: &[HexBytes], quorum: usize) {
    args.extend(
        signatures
            .iter()
            .filter(|s| !s.is_empty())
            .take(quorum)
            .map(|s| s.0.clone()),
    );
}

/// The program a signature component commits to for input `position`.
///
/// A closed template commits to the whole transaction through its sighash.
/// A template open to additional actions commits only to the spent output
/// and the current outputs, so more inputs and outputs may be added later.
pub fn build_sig_program(
    tx: &Tx,
    position: u32,
    allow_additional: bool,
) -> Result<Vec<u8>, TxBuilderError> {
    let input = tx
        .inputs
        .get(position as usize)
        .ok_or(TxBuilderError::BadTxInputIdx(position))?;

    if !allow_additional {
        return Ok(txsighash_program(&tx.sig_hash(position)));
    }

    let mut constraints = Vec::with_capacity(tx.outputs.len() + 1);
    if let Some(id) = input.spent_output_id() {
        constraints.push(Constraint::OutputId(id));
    }
    for (index, out) in tx.outputs.iter().enumerate() {
        constraints.push(Constraint::Pay {
            index,
            asset_id: out.asset_id,
            amount: out.amount,
            program: out.control_program.clone(),
        });
    }
    Ok(constraint_program(&constraints))
}

impl SignatureWitness {
    pub fn new(xpubs: &[XPub], path: &[Vec<u8>], quorum: usize) -> Self {
        Self {
            quorum,
            keys: xpubs.iter().map(|x| KeyId::new(*x, path)).collect(),
            program: Vec::new(),
            signatures: Vec::new(),
        }
    }

    pub fn sign(
        &mut self,
        tx: &Tx,
        position: u32,
        allow_additional: bool,
        signer: &dyn TxSigner,
    ) -> Result<(), TxBuilderError> {
        if self.program.is_empty() {
            self.program = build_sig_program(tx, position, allow_additional)?;
        }
        let message = sha256(&self.program);
        fill_first_slot(&self.keys, &mut self.signatures, &message, signer);
        Ok(())
    }

    pub fn materialize(&self, args: &mut Vec<Vec<u8>>) {
        args.push(int64_bytes(args.len() as i64));
        push_quorum(args, &self.signatures, self.quorum);
        args.push(self.program.clone());
    }
}

impl RawTxSigWitness {
    pub fn new(xpubs: &[XPub], path: &[Vec<u8>], quorum: usize) -> Self {
        Self {
            quorum,
            keys: xpubs.iter().map(|x| KeyId::new(*x, path)).collect(),
            signatures: Vec::new(),
        }
    }

    pub fn sign(&mut self, tx: &Tx, position: u32, signer: &dyn TxSigner) {
        let message = tx.sig_hash(position);
        fill_first_slot(&self.keys, &mut self.signatures, message.as_bytes(), signer);
    }

    pub fn materialize(&self, args: &mut Vec<Vec<u8>>) {
        push_quorum(args, &self.signatures, self.quorum);
    }
}

impl WitnessComponent {
    /// Whether this component has collected its quorum. Data components
    /// are always complete.
    pub fn is_complete(&self) -> bool {
        match self {
            WitnessComponent::Signature(w) => count_signed(&w.signatures) >= w.quorum,
            WitnessComponent::RawTxSignature(w) => count_signed(&w.signatures) >= w.quorum,
            WitnessComponent::Data(_) => true,
        }
    }

    pub fn materialize(&self, args: &mut Vec<Vec<u8>>) {
        match self {
            WitnessComponent::Signature(w) => w.materialize(args),
            WitnessComponent::RawTxSignature(w) => w.materialize(args),
            WitnessComponent::Data(d) => args.push(d.value.clone()),
        }
    }
}
