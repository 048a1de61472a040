//! Error types for the anchor layer.

use cairn_chain::ChainError;
use thiserror::Error;

/// Result type for anchor operations.
pub type Result<T> = std::result::Result<T, AnchorError>;

/// Errors that can occur while anchoring an epoch.
#[derive(Debug, Error)]
pub enum AnchorError {
    /// The epoch range has no calendar transactions.
    #[error("no work: calendar range {begin}..={end} is empty")]
    NoWork {
        /// Range start (exclusive).
        begin: u64,
        /// Range end (inclusive).
        end: u64,
    },

    /// No eligible leader this block.
    #[error("leader election failed: {0}")]
    LeaderElection(String),

    /// A locally recomputed aggregate disagrees with the announced one.
    #[error("aggregate root mismatch: announced {announced}, computed {computed}")]
    AggRootMismatch {
        /// Root carried by the announcement.
        announced: String,
        /// Root recomputed locally.
        computed: String,
    },

    /// A block's transactions do not hash to its header root.
    #[error("block tree integrity failure at height {height}: header {expected}, computed {computed}")]
    BlockTreeIntegrity {
        /// Block height.
        height: u64,
        /// Header Merkle root.
        expected: String,
        /// Root computed from the txids.
        computed: String,
    },

    /// Wallet or reward payment failed.
    #[error("payment failed: {0}")]
    Payment(String),

    /// No progress within the configured window.
    #[error("timed out: {0}")]
    Timeout(String),

    /// An announcement is internally inconsistent.
    #[error("invalid anchor announcement: {0}")]
    InvalidAnnouncement(String),

    /// Bitcoin backend error.
    #[error("bitcoin backend error: {0}")]
    Bitcoin(String),

    /// Local store error.
    #[error("store error: {0}")]
    Store(String),

    /// Configuration rejected.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Replicated log or state error.
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] cairn_core::Error),
}

impl AnchorError {
    /// Whether the same work should simply be retried on the next pass.
    pub fn is_retryable(&self) -> bool {
        match self {
            AnchorError::NoWork { .. }
            | AnchorError::LeaderElection(_)
            | AnchorError::BlockTreeIntegrity { .. }
            | AnchorError::Timeout(_)
            | AnchorError::Bitcoin(_) => true,
            AnchorError::Chain(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Whether the epoch must be abandoned and reset.
    pub fn abandons_epoch(&self) -> bool {
        matches!(
            self,
            AnchorError::AggRootMismatch { .. } | AnchorError::InvalidAnnouncement(_)
        )
    }

    /// Whether the failure is settled through an error announcement on the
    /// log rather than a local retry.
    pub fn announces_failure(&self) -> bool {
        matches!(self, AnchorError::Payment(_))
    }

    /// Whether this is routine (nothing to do, not our turn) rather than a
    /// failure worth a warning.
    pub fn is_quiet(&self) -> bool {
        matches!(self, AnchorError::NoWork { .. } | AnchorError::LeaderElection(_))
    }
}

impl From<serde_json::Error> for AnchorError {
    fn from(e: serde_json::Error) -> Self {
        AnchorError::Serialization(e.to_string())
    }
}

impl From<hex::FromHexError> for AnchorError {
    fn from(e: hex::FromHexError) -> Self {
        AnchorError::Serialization(e.to_string())
    }
}
