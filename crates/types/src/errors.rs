use alloy_primitives::TxHash;
use thiserror::Error;

/// Errors surfaced by a [`crate::Ledger`] implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The node refused the transaction (insufficient funds, bad nonce,
    /// revert during gas estimation)
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// A read-only call reverted
    #[error("Call reverted: {0}")]
    CallReverted(String),

    /// Connection or protocol failure talking to the node
    #[error("Transport error: {0}")]
    Transport(String),

    /// The receipt for a submitted transaction could not be obtained
    #[error("Receipt error for {tx_hash}: {message}")]
    Receipt { tx_hash: TxHash, message: String },

    /// Returned data did not match the expected ABI
    #[error("Decode error: {0}")]
    Decode(String),
}

impl LedgerError {
    /// Whether the error came from the submission being refused
    pub fn is_rejection(&self) -> bool {
        matches!(self, LedgerError::Rejected(_))
    }
}

impl From<alloy_sol_types::Error> for LedgerError {
    fn from(err: alloy_sol_types::Error) -> Self {
        LedgerError::Decode(err.to_string())
    }
}

/// Result type alias for ledger operations
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;
