//! # Signing
//!
//! Signing walks every signature component of a template and lets a
//! [`TxSigner`] fill one empty slot per component. Templates travel between
//! co-signers as JSON; each party signs with its own keys and passes the
//! template on until [`sign_progress`] reports every quorum met.
//!
//! ## Materialization
//!
//! [`materialize_witnesses`] rewrites each input's argument list from its
//! signing instruction. It runs after every signing round, so a partially
//! signed template always carries arguments consistent with the
//! signatures collected so far.

use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use super::template::{SigningInstruction, Template};
use super::witness::WitnessComponent;
use super::TxBuilderError;
use crate::crypto::{KeyError, XPrv, XPub};
use crate::encoding::HexBytes;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("no private key for xpub {0}")]
    UnknownKey(XPub),

    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Anything that can produce a signature for a key in a template.
pub trait TxSigner {
    /// Sign `message` with the child of `xpub` at `path`.
    fn sign(&self, xpub: &XPub, path: &[HexBytes], message: &[u8]) -> Result<Vec<u8>, SignError>;
}

impl TxSigner for XPrv {
    fn sign(&self, xpub: &XPub, path: &[HexBytes], message: &[u8]) -> Result<Vec<u8>, SignError> {
        if self.xpub() != *xpub {
            return Err(SignError::UnknownKey(*xpub));
        }
        Ok(self.derive(path).sign(message)?.to_vec())
    }
}

/// A set of root keys indexed by their xpubs.
#[derive(Debug, Clone, Default)]
pub struct KeyRing {
    keys: HashMap<XPub, XPrv>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_keys(keys: impl IntoIterator<Item = XPrv>) -> Self {
        let mut ring = Self::new();
        for k in keys {
            ring.insert(k);
        }
        ring
    }

    pub fn insert(&mut self, xprv: XPrv) {
        self.keys.insert(xprv.xpub(), xprv);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl TxSigner for KeyRing {
    fn sign(&self, xpub: &XPub, path: &[HexBytes], message: &[u8]) -> Result<Vec<u8>, SignError> {
        let xprv = self.keys.get(xpub).ok_or(SignError::UnknownKey(*xpub))?;
        TxSigner::sign(xprv, xpub, path, message)
    }
}

/// Run one signing round over every component, then materialize.
pub fn sign(template: &mut Template, signer: &dyn TxSigner) -> Result<(), TxBuilderError> {
    let tx = template
        .transaction
        .as_ref()
        .ok_or(TxBuilderError::MissingRawTx)?
        .clone();
    let allow_additional = template.allow_additional_actions;
    check_instructions(&template.signing_instructions, tx.inputs.len())?;

    for instruction in &mut template.signing_instructions {
        let position = instruction.position;
        for component in &mut instruction.witness_components {
            match component {
                WitnessComponent::Signature(w) => w.sign(&tx, position, allow_additional, signer)?,
                WitnessComponent::RawTxSignature(w) => w.sign(&tx, position, signer),
                WitnessComponent::Data(_) => {}
            }
        }
    }

    materialize_witnesses(template)?;
    debug!(tx_id = %tx.id, complete = sign_progress(template), "signed template");
    Ok(())
}

/// True when every signature component has reached its quorum.
pub fn sign_progress(template: &Template) -> bool {
    template
        .signing_instructions
        .iter()
        .flat_map(|i| &i.witness_components)
        .all(WitnessComponent::is_complete)
}

/// Rewrite input arguments from the signing instructions.
pub fn materialize_witnesses(template: &mut Template) -> Result<(), TxBuilderError> {
    let tx = template
        .transaction
        .as_mut()
        .ok_or(TxBuilderError::MissingRawTx)?;

    check_instructions(&template.signing_instructions, tx.inputs.len())?;

    for instruction in &template.signing_instructions {
        let position = instruction.position;
        let mut args = Vec::new();
        for component in &instruction.witness_components {
            component.materialize(&mut args);
        }
        tx.set_input_arguments(position as usize, args);
    }
    Ok(())
}

/// Every instruction must point at an existing input, and there can be no
/// more instructions than inputs.
fn check_instructions(
    instructions: &[SigningInstruction],
    inputs: usize,
) -> Result<(), TxBuilderError> {
    if instructions.len() > inputs {
        return Err(TxBuilderError::BadInstructionCount {
            instructions: instructions.len(),
            inputs,
        });
    }
    match instructions.iter().find(|i| i.position as usize >= inputs) {
        Some(bad) => Err(TxBuilderError::BadTxInputIdx(bad.position)),
        None => Ok(()),
    }
}

/// Sign with a single root key and materialize.
pub fn sign_with_key(template: &mut Template, xprv: &XPrv) -> Result<(), TxBuilderError> {
    sign(template, xprv)
}
