//! Contract arguments for `spend_account_unspent_output`.
//!
//! Each argument is `{"type": ..., "raw_data": {...}}` and becomes one
//! witness component:
//!
//! | type               | raw_data                          | component            |
//! |--------------------|-----------------------------------|----------------------|
//! | `raw_tx_signature` | `{xpub, derivation_path}`         | raw signature, 1-of-1 |
//! | `data`             | `{value: hex}`                    | data                 |
//! | `string`           | `{value: string}`                 | data (UTF-8)         |
//! | `integer`          | `{value: i64}`                    | data (int64 bytes)   |
//! | `boolean`          | `{value: bool}`                   | data (bool bytes)    |

use serde::{Deserialize, Serialize};

use super::template::SigningInstruction;
use super::TxBuilderError;
use crate::crypto::XPub;
use crate::encoding::HexBytes;
use crate::transaction::program::{bool_bytes, int64_bytes};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractArgument {
    #[serde(rename = "type")]
    pub arg_type: String,
    pub raw_data: serde_json::Value,
}

#[derive(Deserialize)]
struct RawTxSigArgument {
    xpub: XPub,
    #[serde(default)]
    derivation_path: Vec<HexBytes>,
}

#[derive(Deserialize)]
struct DataArgument {
    value: HexBytes,
}

#[derive(Deserialize)]
struct StrArgument {
    value: String,
}

#[derive(Deserialize)]
struct IntegerArgument {
    value: i64,
}

#[derive(Deserialize)]
struct BoolArgument {
    value: bool,
}

fn parse<T: serde::de::DeserializeOwned>(raw: &serde_json::Value) -> Result<T, TxBuilderError> {
    Ok(T::deserialize(raw)?)
}

/// Append one witness component per argument, in order.
pub fn add_contract_args(
    instruction: &mut SigningInstruction,
    args: &[ContractArgument],
) -> Result<(), TxBuilderError> {
    for arg in args {
        match arg.arg_type.as_str() {
            "raw_tx_signature" => {
                let a: RawTxSigArgument = parse(&arg.raw_data)?;
                let path: Vec<Vec<u8>> = a.derivation_path.into_iter().map(|p| p.0).collect();
                instruction.add_raw_witness_keys(&[a.xpub], &path, 1);
            }
            "data" => {
                let a: DataArgument = parse(&arg.raw_data)?;
                instruction.add_data_witness(a.value.0);
            }
            "string" => {
                let a: StrArgument = parse(&arg.raw_data)?;
                instruction.add_data_witness(a.value.into_bytes());
            }
            "integer" => {
                let a: IntegerArgument = parse(&arg.raw_data)?;
                instruction.add_data_witness(int64_bytes(a.value));
            }
            "boolean" => {
                let a: BoolArgument = parse(&arg.raw_data)?;
                instruction.add_data_witness(bool_bytes(a.value));
            }
            other => return Err(TxBuilderError::BadContractArgType(other.to_string())),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::XPrv;
    use crate::txbuilder::witness::WitnessComponent;
    use serde_json::json;

    fn arg(t: &str, raw: serde_json::Value) -> ContractArgument {
        ContractArgument {
            arg_type: t.into(),
            raw_data: raw,
        }
    }

    fn data_of(c: &WitnessComponent) -> &[u8] {
        match c {
            WitnessComponent::Data(d) => &d.value,
            other => panic!("not data: {other:?}"),
        }
    }

    #[test]
    fn test_all_argument_types() {
        let xpub = XPrv::from_seed(b"k").xpub();
        let args = vec![
            arg("raw_tx_signature", json!({"xpub": xpub.to_hex(), "derivation_path": ["0102"]})),
            arg("data", json!({"value": "beef"})),
            arg("string", json!({"value": "hi"})),
            arg("integer", json!({"value": 256})),
            arg("boolean", json!({"value": true})),
        ];
        let mut inst = SigningInstruction::new(0);
        add_contract_args(&mut inst, &args).unwrap();

        let c = &inst.witness_components;
        assert_eq!(c.len(), 5);
        match &c[0] {
            WitnessComponent::RawTxSignature(w) => {
                assert_eq!(w.quorum, 1);
                assert_eq!(w.keys[0].xpub, xpub);
                assert_eq!(w.keys[0].derivation_path, vec![HexBytes(vec![1, 2])]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(data_of(&c[1]), &[0xbe, 0xef]);
        assert_eq!(data_of(&c[2]), b"hi");
        assert_eq!(data_of(&c[3]), &[0, 1]);
        assert_eq!(data_of(&c[4]), bool_bytes(true).as_slice());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut inst = SigningInstruction::new(0);
        assert!(matches!(
            add_contract_args(&mut inst, &[arg("float", json!({"value": 1.5}))]),
            Err(TxBuilderError::BadContractArgType(t)) if t == "float"
        ));
    }

    #[test]
    fn test_malformed_raw_data_rejected() {
        let mut inst = SigningInstruction::new(0);
        assert!(matches!(
            add_contract_args(&mut inst, &[arg("integer", json!({"value": "ten"}))]),
            Err(TxBuilderError::Json(_))
        ));
    }
}
