//! The ledger, as seen from the wallet.
//!
//! The wallet never mutates the confirmed UTXO set. It reads the best
//! height (to judge maturity) and hands finalized transactions to
//! [`Chain::validate_tx`].

use crate::transaction::Tx;

/// Error reported by the ledger when it refuses a transaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ChainError(pub String);

pub trait Chain: Send + Sync {
    fn best_block_height(&self) -> u64;

    /// Validate and admit `tx`. `Ok(true)` means the transaction is an
    /// orphan: one of its inputs is unknown to the ledger.
    fn validate_tx(&self, tx: &Tx) -> Result<bool, ChainError>;
}

/// A ledger frozen at one height that admits everything.
///
/// Used by offline tooling, which builds and signs templates without a
/// live chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticChain {
    pub height: u64,
}

impl Chain for StaticChain {
    fn best_block_height(&self) -> u64 {
        self.height
    }

    fn validate_tx(&self, _tx: &Tx) -> Result<bool, ChainError> {
        Ok(false)
    }
}
