//! Gas estimation for unsigned templates.
//!
//! Witness bytes do not exist before signing, so their size and the VM cost
//! of checking them are estimated from each spend input's control program
//! and signing instruction. Other input kinds add nothing. A flat "flexible" allowance covers one extra input
//! the caller may add to pay the fee.

use serde::{Deserialize, Serialize};

use super::template::{SigningInstruction, Template};
use super::witness::WitnessComponent;
use super::TxBuilderError;
use crate::config::{DEFAULT_GAS_CREDIT, STORAGE_GAS_RATE, VM_GAS_RATE};
use crate::transaction::program::{is_p2wpkh, is_p2wsh};
use crate::transaction::TxInput;

/// One input plus one output.
const BASE_SIZE: i64 = 176;
const P2WPKH_WITNESS_SIZE: i64 = 98;
const P2WPKH_GAS: i64 = 1409;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateTxGasInfo {
    pub total_neu: i64,
    pub flexible_neu: i64,
    pub storage_neu: i64,
    pub vm_neu: i64,
}

/// Witness size and VM gas of a P2WSH input's signature components.
fn estimate_p2wsh_gas(instruction: &SigningInstruction) -> (i64, i64) {
    let mut size = 0i64;
    let mut gas = 0i64;
    for component in &instruction.witness_components {
        let (keys, quorum) = match component {
            WitnessComponent::Signature(w) => (w.keys.len() as i64, w.quorum as i64),
            WitnessComponent::RawTxSignature(w) => (w.keys.len() as i64, w.quorum as i64),
            WitnessComponent::Data(_) => continue,
        };
        size += 33 * keys + 65 * quorum;
        gas += 1131 * keys + 72 * quorum + 659;
        if keys == 1 && quorum == 1 {
            gas += 27;
        }
    }
    (size, gas)
}

pub fn estimate_tx_gas(template: &Template) -> Result<EstimateTxGasInfo, TxBuilderError> {
    let tx = template
        .transaction
        .as_ref()
        .ok_or(TxBuilderError::MissingRawTx)?;

    let mut witness_size = 0i64;
    let mut p2wpkh_gas = 0i64;
    let mut p2wsh_gas = 0i64;
    let (mut last_p2wsh_size, mut last_p2wsh_gas) = (0i64, 0i64);

    for (pos, input) in tx.inputs.iter().enumerate() {
        let TxInput::Spend(spend) = input else {
            continue;
        };
        let program = spend.control_program.as_slice();
        if is_p2wpkh(program) {
            witness_size += P2WPKH_WITNESS_SIZE;
            p2wpkh_gas += P2WPKH_GAS;
        } else if is_p2wsh(program) {
            let Some(instruction) = template
                .signing_instructions
                .iter()
                .find(|i| i.position as usize == pos)
            else {
                continue;
            };
            (last_p2wsh_size, last_p2wsh_gas) = estimate_p2wsh_gas(instruction);
            witness_size += last_p2wsh_size;
            p2wsh_gas += last_p2wsh_gas;
        }
    }

    let flexible = if p2wpkh_gas > 0 {
        P2WPKH_GAS + (BASE_SIZE + P2WPKH_WITNESS_SIZE) * STORAGE_GAS_RATE
    } else if p2wsh_gas > 0 {
        last_p2wsh_gas + (BASE_SIZE + last_p2wsh_size) * STORAGE_GAS_RATE
    } else {
        0
    };

    let size = tx
        .encoded_len()
        .map_err(|e| TxBuilderError::Serialization(e.to_string()))? as i64;
    let storage = (size + witness_size) * STORAGE_GAS_RATE;
    let vm = p2wpkh_gas + p2wsh_gas;

    let total = (storage + vm + flexible - DEFAULT_GAS_CREDIT).max(0);

    Ok(EstimateTxGasInfo {
        total_neu: total * VM_GAS_RATE,
        flexible_neu: flexible * VM_GAS_RATE,
        storage_neu: storage * VM_GAS_RATE,
        vm_neu: vm * VM_GAS_RATE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::crypto::XPrv;
    use crate::transaction::{AssetId, Hash, Tx, TxData, TxOutput};

    fn template_with(program: Vec<u8>, instruction: SigningInstruction) -> Template {
        Template {
            transaction: Some(Tx::new(TxData {
                inputs: vec![TxInput::spend(Hash::new([1; 32]), AssetId::new([2; 32]), 5, 0, program)],
                outputs: vec![TxOutput::intra(AssetId::new([2; 32]), 5, vec![0x51])],
                ..Default::default()
            })),
            signing_instructions: vec![instruction],
            fee: 0,
            allow_additional_actions: false,
        }
    }

    #[test]
    fn test_p2wpkh_estimate() {
        let program = Address::from_pubkey(&[1; 32]).control_program();
        let tpl = template_with(program, SigningInstruction::new(0));
        let info = estimate_tx_gas(&tpl).unwrap();

        assert_eq!(info.vm_neu, P2WPKH_GAS * VM_GAS_RATE);
        assert_eq!(info.flexible_neu, (P2WPKH_GAS + BASE_SIZE + P2WPKH_WITNESS_SIZE) * VM_GAS_RATE);
        let size = tpl.transaction.as_ref().unwrap().encoded_len().unwrap() as i64;
        assert_eq!(info.storage_neu, (size + P2WPKH_WITNESS_SIZE) * VM_GAS_RATE);
        // Under the free credit.
        assert_eq!(info.total_neu, 0);
    }

    #[test]
    fn test_p2wsh_estimate_counts_components() {
        let xpubs: Vec<_> = [b"a", b"b", b"c"].iter().map(|s| XPrv::from_seed(*s).xpub()).collect();
        let mut inst = SigningInstruction::new(0);
        inst.add_raw_witness_keys(&xpubs, &[], 2);
        inst.add_data_witness(vec![0; 40]);
        let (size, gas) = estimate_p2wsh_gas(&inst);
        assert_eq!(size, 33 * 3 + 65 * 2);
        assert_eq!(gas, 1131 * 3 + 72 * 2 + 659);

        let program = Address::from_script(b"script").control_program();
        let info = estimate_tx_gas(&template_with(program, inst)).unwrap();
        assert_eq!(info.vm_neu, gas * VM_GAS_RATE);
        assert_eq!(info.flexible_neu, (gas + BASE_SIZE + size) * VM_GAS_RATE);
    }

    #[test]
    fn test_only_spend_inputs_cost_gas() {
        let program = Address::from_pubkey(&[1; 32]).control_program();
        let with_spend = estimate_tx_gas(&template_with(program.clone(), SigningInstruction::new(0))).unwrap();

        let tpl = Template {
            transaction: Some(Tx::new(TxData {
                inputs: vec![TxInput::veto(Hash::new([1; 32]), AssetId::new([2; 32]), 5, 0, program, vec![7; 4])],
                outputs: vec![TxOutput::intra(AssetId::new([2; 32]), 5, vec![0x51])],
                ..Default::default()
            })),
            signing_instructions: vec![SigningInstruction::new(0)],
            fee: 0,
            allow_additional_actions: false,
        };
        let info = estimate_tx_gas(&tpl).unwrap();
        assert_eq!(info.vm_neu, 0);
        assert_eq!(info.flexible_neu, 0);
        assert!(with_spend.vm_neu > 0);
    }

    #[test]
    fn test_single_key_bonus() {
        let mut inst = SigningInstruction::new(0);
        inst.add_witness_keys(&[XPrv::from_seed(b"a").xpub()], &[], 1);
        assert_eq!(estimate_p2wsh_gas(&inst).1, 1131 + 72 + 659 + 27);
    }

    #[test]
    fn test_missing_transaction() {
        let tpl = Template {
            transaction: None,
            signing_instructions: vec![],
            fee: 0,
            allow_additional_actions: false,
        };
        assert!(matches!(estimate_tx_gas(&tpl), Err(TxBuilderError::MissingRawTx)));
    }
}
