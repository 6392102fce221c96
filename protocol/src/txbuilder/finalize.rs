//! # Finalization Guard
//!
//! The last checks before a signed transaction reaches the ledger:
//!
//! 1. The native-asset fee must be computable and within `max_tx_fee`.
//! 2. Optionally, some input must commit to the whole transaction through a
//!    tx-sighash program.
//! 3. The cached serialized size is refreshed.
//! 4. The ledger validates the transaction; refusal and orphaning are
//!    reported as distinct errors.

use thiserror::Error;
use tracing::{debug, warn};

use crate::chain::Chain;
use crate::config::{WalletConfig, NATIVE_ASSET_ID};
use crate::transaction::program::committed_sighash;
use crate::transaction::Tx;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FinalizeError {
    #[error("fee calculation overflowed")]
    FeeOverflow,

    #[error("native outputs exceed native inputs")]
    NegativeFee,

    #[error("transaction fee {fee} exceeds max limit {limit}")]
    FeeExceedsLimit { fee: u64, limit: u64 },

    #[error("no tx sighash attempted")]
    NoTxSighashAttempt,

    #[error("tx signature was attempted but failed")]
    TxSignatureFailure,

    #[error("no commitment to tx sighash")]
    NoTxSighashCommitment,

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("finalize can't find transaction input utxo")]
    Orphan,
}

/// Native-asset inputs minus native-asset outputs. Zero when any input is
/// a coinbase.
pub fn calculate_tx_fee(tx: &Tx) -> Result<u64, FinalizeError> {
    if tx.inputs.iter().any(|i| i.is_coinbase()) {
        return Ok(0);
    }

    let mut total_in = 0u64;
    for input in tx.inputs.iter().filter(|i| i.asset_id() == NATIVE_ASSET_ID) {
        total_in = total_in
            .checked_add(input.amount())
            .ok_or(FinalizeError::FeeOverflow)?;
    }

    let mut total_out = 0u64;
    for output in tx.outputs.iter().filter(|o| o.asset_id == NATIVE_ASSET_ID) {
        total_out = total_out
            .checked_add(output.amount)
            .ok_or(FinalizeError::FeeOverflow)?;
    }

    total_in
        .checked_sub(total_out)
        .ok_or(FinalizeError::NegativeFee)
}

/// Require at least one input whose witness ends in a tx-sighash program
/// committing to that input's sighash.
///
/// A conforming argument list is `[arg1 .. argN, N, sig1 .. sigM, prog]`,
/// so an attempt needs at least three arguments. The error reports the
/// last failure seen. A transaction without inputs passes.
pub fn check_tx_sighash_commitment(tx: &Tx) -> Result<(), FinalizeError> {
    let mut last_error = None;

    for (i, input) in tx.inputs.iter().enumerate() {
        let args = input.arguments();
        if args.is_empty() {
            last_error = Some(FinalizeError::NoTxSighashAttempt);
            continue;
        }
        if args.len() < 3 {
            last_error = Some(FinalizeError::TxSignatureFailure);
            continue;
        }

        last_error = Some(FinalizeError::NoTxSighashCommitment);
        let Some(last) = args.last() else {
            continue;
        };
        let Some(committed) = committed_sighash(last.as_slice()) else {
            continue;
        };
        if committed == tx.sig_hash(i as u32).as_bytes() {
            return Ok(());
        }
    }

    match last_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Validate `tx` and hand it to the ledger.
pub fn finalize_tx(chain: &dyn Chain, config: &WalletConfig, tx: &mut Tx) -> Result<(), FinalizeError> {
    let fee = calculate_tx_fee(tx)?;
    if fee > config.max_tx_fee {
        return Err(FinalizeError::FeeExceedsLimit {
            fee,
            limit: config.max_tx_fee,
        });
    }

    if config.enforce_sighash_commitment {
        check_tx_sighash_commitment(tx)?;
    }

    tx.data.serialized_size = tx
        .encoded_len()
        .map_err(|e| FinalizeError::Serialization(e.to_string()))?;

    match chain.validate_tx(tx) {
        Err(e) => {
            warn!(tx_id = %tx.id, error = %e, "ledger rejected transaction");
            Err(FinalizeError::Rejected(e.0))
        }
        Ok(true) => Err(FinalizeError::Orphan),
        Ok(false) => {
            debug!(tx_id = %tx.id, fee, size = tx.serialized_size, "transaction finalized");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainError, StaticChain};
    use crate::transaction::program::txsighash_program;
    use crate::transaction::{AssetId, Hash, TxData, TxInput, TxOutput};

    struct Refusing(&'static str);

    impl Chain for Refusing {
        fn best_block_height(&self) -> u64 {
            0
        }

        fn validate_tx(&self, _tx: &Tx) -> Result<bool, ChainError> {
            Err(ChainError(self.0.to_string()))
        }
    }

    struct Orphaning;

    impl Chain for Orphaning {
        fn best_block_height(&self) -> u64 {
            0
        }

        fn validate_tx(&self, _tx: &Tx) -> Result<bool, ChainError> {
            Ok(true)
        }
    }

    fn native_tx(input: u64, output: u64) -> Tx {
        Tx::new(TxData {
            inputs: vec![TxInput::spend(Hash::new([1; 32]), NATIVE_ASSET_ID, input, 0, vec![0x51])],
            outputs: vec![TxOutput::intra(NATIVE_ASSET_ID, output, vec![0x52])],
            ..Default::default()
        })
    }

    #[test]
    fn test_fee_is_native_difference() {
        assert_eq!(calculate_tx_fee(&native_tx(100, 60)).unwrap(), 40);

        let mut data = native_tx(100, 60).data;
        data.outputs.push(TxOutput::intra(AssetId::new([3; 32]), 1_000, vec![]));
        assert_eq!(calculate_tx_fee(&Tx::new(data)).unwrap(), 40);
    }

    #[test]
    fn test_fee_zero_with_coinbase() {
        let mut data = native_tx(100, 60).data;
        data.inputs.push(TxInput::coinbase(vec![]));
        assert_eq!(calculate_tx_fee(&Tx::new(data)).unwrap(), 0);
    }

    #[test]
    fn test_fee_errors() {
        assert_eq!(calculate_tx_fee(&native_tx(10, 60)), Err(FinalizeError::NegativeFee));

        let mut data = native_tx(u64::MAX, 0).data;
        data.inputs.push(TxInput::spend(Hash::new([2; 32]), NATIVE_ASSET_ID, 1, 0, vec![]));
        assert_eq!(calculate_tx_fee(&Tx::new(data)), Err(FinalizeError::FeeOverflow));
    }

    #[test]
    fn test_fee_limit() {
        let config = WalletConfig {
            max_tx_fee: 10,
            ..Default::default()
        };
        let mut tx = native_tx(100, 60);
        assert_eq!(
            finalize_tx(&StaticChain::default(), &config, &mut tx),
            Err(FinalizeError::FeeExceedsLimit { fee: 40, limit: 10 })
        );
    }

    #[test]
    fn test_finalize_sets_size() {
        let mut tx = native_tx(100, 60);
        finalize_tx(&StaticChain::default(), &WalletConfig::default(), &mut tx).unwrap();
        assert!(tx.serialized_size > 0);
    }

    #[test]
    fn test_finalize_rejected_and_orphan() {
        let config = WalletConfig::default();
        let mut tx = native_tx(100, 60);
        assert_eq!(
            finalize_tx(&Refusing("double spend"), &config, &mut tx),
            Err(FinalizeError::Rejected("double spend".into()))
        );
        assert_eq!(
            finalize_tx(&Orphaning, &config, &mut tx),
            Err(FinalizeError::Orphan)
        );
    }

    #[test]
    fn test_sighash_commitment() {
        let mut tx = native_tx(100, 60);
        assert_eq!(
            check_tx_sighash_commitment(&tx),
            Err(FinalizeError::NoTxSighashAttempt)
        );

        tx.set_input_arguments(0, vec![vec![], vec![1]]);
        assert_eq!(
            check_tx_sighash_commitment(&tx),
            Err(FinalizeError::TxSignatureFailure)
        );

        tx.set_input_arguments(0, vec![vec![], vec![1], vec![0x51]]);
        assert_eq!(
            check_tx_sighash_commitment(&tx),
            Err(FinalizeError::NoTxSighashCommitment)
        );

        let wrong = txsighash_program(&Hash::new([9; 32]));
        tx.set_input_arguments(0, vec![vec![], vec![1], wrong]);
        assert_eq!(
            check_tx_sighash_commitment(&tx),
            Err(FinalizeError::NoTxSighashCommitment)
        );

        let right = txsighash_program(&tx.sig_hash(0));
        tx.set_input_arguments(0, vec![vec![], vec![1], right]);
        assert_eq!(check_tx_sighash_commitment(&tx), Ok(()));
    }

    #[test]
    fn test_enforced_commitment_blocks_unsigned() {
        let config = WalletConfig {
            enforce_sighash_commitment: true,
            ..Default::default()
        };
        let mut tx = native_tx(100, 60);
        assert_eq!(
            finalize_tx(&StaticChain::default(), &config, &mut tx),
            Err(FinalizeError::NoTxSighashAttempt)
        );
    }
}
