//! Collaborator traits for the anchoring engine.
//!
//! The engine never talks to a wallet, a payment rail or a proof database
//! directly. Each is reached through one of these traits so deployments
//! can plug in Bitcoin Core, Lightning, or test doubles.

use async_trait::async_trait;
use cairn_chain::CoreId;
use cairn_core::Proof;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// A transaction the wallet has broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentTx {
    /// Txid, display order.
    pub tx_id: String,
    /// Raw transaction body without witness data, hex. Its double SHA-256
    /// is the txid.
    pub raw_tx: String,
}

/// A Bitcoin block reduced to what proofs need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtcBlock {
    /// Block height.
    pub height: u64,
    /// Header Merkle root, display order.
    pub merkle_root: String,
    /// Transaction ids in block order, display order.
    pub txids: Vec<String>,
}

/// Wallet view of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtcTxInfo {
    /// Txid, display order.
    pub tx_id: String,
    /// Containing block height; `0` while in the mempool.
    pub block_height: u64,
}

/// Bitcoin wallet and chain access.
#[async_trait]
pub trait BitcoinClient: Send + Sync {
    /// Broadcast a transaction with an OP_RETURN output carrying `root`.
    async fn send_data_carrier_tx(&self, root: &cairn_core::Hash) -> Result<SentTx>;

    /// Replace an unconfirmed transaction with a higher-fee version.
    async fn replace_by_fee(&self, tx_id: &str, fee_rate_sat_vb: u64) -> Result<SentTx>;

    /// Fetch a block by height.
    async fn get_block_by_height(&self, height: u64) -> Result<BtcBlock>;

    /// Look up a transaction.
    async fn get_transaction(&self, tx_id: &str) -> Result<BtcTxInfo>;

    /// Current chain height.
    async fn block_height(&self) -> Result<u64>;

    /// Current fee estimate, sat/vB.
    async fn estimate_fee_rate(&self) -> Result<u64>;
}

/// Pays anchoring rewards.
#[async_trait]
pub trait RewardPayer: Send + Sync {
    /// Send `amount_sats` to the Core `destination`.
    async fn send_payment(&self, destination: &CoreId, amount_sats: u64) -> Result<()>;
}

/// A finished proof for one submitted hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOutput {
    /// Proof identifier.
    pub proof_id: String,
    /// The document.
    pub proof: Proof,
}

/// Receives finished proofs.
pub trait ProofSink: Send + Sync {
    /// Persist proofs, replacing any earlier version with the same id.
    fn persist_proofs(&self, proofs: Vec<ProofOutput>) -> Result<()>;
}
