//! Errors for the replicated log, state and election layer.

use thiserror::Error;

use crate::tx::TxType;

/// Result type for chain operations.
pub type Result<T> = std::result::Result<T, ChainError>;

/// Errors raised by the chain layer.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The replicated log could not be reached.
    #[error("replicated log unavailable: {0}")]
    LogUnavailable(String),

    /// The log refused a transaction.
    #[error("transaction rejected: {0}")]
    Rejected(String),

    /// A transaction payload did not parse.
    #[error("invalid {tx_type} payload: {message}")]
    InvalidPayload {
        /// Transaction type.
        tx_type: TxType,
        /// Parse failure.
        message: String,
    },

    /// Core primitive error.
    #[error(transparent)]
    Core(#[from] cairn_core::Error),
}

impl ChainError {
    /// Check if retrying the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChainError::LogUnavailable(_))
    }
}
