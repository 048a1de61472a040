//! Error types for the Bitcoin Core backend.

use cairn_anchor::AnchorError;
use thiserror::Error;

/// Result type for Bitcoin operations.
pub type Result<T> = std::result::Result<T, BitcoinError>;

/// Errors from the Bitcoin Core backend.
#[derive(Debug, Error)]
pub enum BitcoinError {
    /// RPC connection error.
    #[error("RPC connection failed: {0}")]
    RpcConnection(String),

    /// RPC call error.
    #[error("RPC call failed: {0}")]
    RpcCall(String),

    /// Insufficient funds.
    #[error("insufficient funds: need {need} sat, have {have} sat")]
    InsufficientFunds {
        /// Amount needed.
        need: u64,
        /// Amount available.
        have: u64,
    },

    /// Transaction building error.
    #[error("transaction building failed: {0}")]
    TxBuild(String),

    /// The wallet could not fully sign a transaction.
    #[error("signing incomplete: {0}")]
    Signing(String),

    /// Transaction broadcast error.
    #[error("transaction broadcast failed: {0}")]
    Broadcast(String),

    /// Transaction not found.
    #[error("transaction not found: {0}")]
    TxNotFound(String),

    /// Block not found.
    #[error("block not found: {0}")]
    BlockNotFound(String),

    /// Invalid transaction id or body.
    #[error("invalid transaction: {0}")]
    InvalidTx(String),

    /// Network mismatch.
    #[error("network mismatch: expected {expected}, got {got}")]
    NetworkMismatch {
        /// Expected network.
        expected: String,
        /// Actual network.
        got: String,
    },

    /// Fee estimation or bump error.
    #[error("fee error: {0}")]
    Fee(String),

    /// Invalid OP_RETURN data.
    #[error("invalid OP_RETURN data: {0}")]
    InvalidOpReturn(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Blocking task failed.
    #[error("RPC task failed: {0}")]
    Task(String),

    /// Bitcoin library error.
    #[error("bitcoin error: {0}")]
    Bitcoin(String),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<bitcoincore_rpc::Error> for BitcoinError {
    fn from(e: bitcoincore_rpc::Error) -> Self {
        BitcoinError::RpcCall(e.to_string())
    }
}

impl From<bitcoin::consensus::encode::Error> for BitcoinError {
    fn from(e: bitcoin::consensus::encode::Error) -> Self {
        BitcoinError::Bitcoin(e.to_string())
    }
}

impl From<BitcoinError> for AnchorError {
    fn from(e: BitcoinError) -> Self {
        match e {
            BitcoinError::InsufficientFunds { .. } => AnchorError::Payment(e.to_string()),
            BitcoinError::Config(msg) => AnchorError::Config(msg),
            other => AnchorError::Bitcoin(other.to_string()),
        }
    }
}
