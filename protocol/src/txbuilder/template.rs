//! Templates: a transaction plus everything needed to finish signing it.
//!
//! ```json
//! {
//!   "raw_transaction": "0100...",
//!   "signing_instructions": [
//!     { "position": 0, "witness_components": [ { "type": "signature", ... } ] }
//!   ],
//!   "fee": 10000,
//!   "allow_additional_actions": false
//! }
//! ```

use serde::{Deserialize, Serialize};

use super::witness::{DataWitness, RawTxSigWitness, SignatureWitness, WitnessComponent};
use crate::crypto::XPub;
use crate::transaction::Tx;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningInstruction {
    pub position: u32,
    #[serde(default)]
    pub witness_components: Vec<WitnessComponent>,
}

impl SigningInstruction {
    pub fn new(position: u32) -> Self {
        Self {
            position,
            witness_components: Vec::new(),
        }
    }

    /// Require `quorum` signatures over a signature program from keys
    /// derived along `path`.
    pub fn add_witness_keys(&mut self, xpubs: &[XPub], path: &[Vec<u8>], quorum: usize) {
        self.witness_components
            .push(WitnessComponent::Signature(SignatureWitness::new(xpubs, path, quorum)));
    }

    /// Require `quorum` signatures directly over the input's sighash.
    pub fn add_raw_witness_keys(&mut self, xpubs: &[XPub], path: &[Vec<u8>], quorum: usize) {
        self.witness_components
            .push(WitnessComponent::RawTxSignature(RawTxSigWitness::new(xpubs, path, quorum)));
    }

    pub fn add_data_witness(&mut self, value: Vec<u8>) {
        self.witness_components
            .push(WitnessComponent::Data(DataWitness { value }));
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "raw_transaction", default)]
    pub transaction: Option<Tx>,
    #[serde(default)]
    pub signing_instructions: Vec<SigningInstruction>,
    #[serde(default)]
    pub fee: u64,
    /// When set, signature programs commit to outputs rather than to the
    /// whole transaction, so further actions may extend it.
    #[serde(default)]
    pub allow_additional_actions: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::XPrv;
    use crate::transaction::{AssetId, Hash, TxData, TxInput};

    #[test]
    fn test_template_json_roundtrip() {
        let xpub = XPrv::from_seed(b"k").xpub();
        let mut inst = SigningInstruction::new(0);
        inst.add_witness_keys(&[xpub], &[vec![1, 2]], 1);
        inst.add_data_witness(vec![0xee]);

        let tpl = Template {
            transaction: Some(Tx::new(TxData {
                inputs: vec![TxInput::spend(Hash::new([1; 32]), AssetId::new([2; 32]), 3, 0, vec![])],
                ..Default::default()
            })),
            signing_instructions: vec![inst],
            fee: 7,
            allow_additional_actions: false,
        };

        let v = serde_json::to_value(&tpl).unwrap();
        assert!(v["raw_transaction"].is_string());
        assert_eq!(v["signing_instructions"][0]["position"], 0);
        assert_eq!(v["signing_instructions"][0]["witness_components"][1]["type"], "data");
        assert_eq!(v["fee"], 7);

        let back: Template = serde_json::from_value(v).unwrap();
        assert_eq!(back, tpl);
    }

    #[test]
    fn test_missing_raw_transaction_decodes_as_none() {
        let tpl: Template = serde_json::from_str(r#"{"signing_instructions": []}"#).unwrap();
        assert!(tpl.transaction.is_none());
    }
}
