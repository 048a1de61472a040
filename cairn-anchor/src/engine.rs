//! The anchoring capability and its vocabulary.

use std::fmt;

use async_trait::async_trait;
use cairn_chain::{AnchorState, Election, EpochRange};
use cairn_core::{BtcHeaderFragment, Hash};
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::monitor::FailureAction;
use crate::provider::{ProofOutput, SentTx};
use crate::store::ConfirmedTxRecord;

/// Where an epoch is in its lifecycle, from this node's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EpochPhase {
    /// Nothing in flight.
    Idle,
    /// Building the aggregate root.
    Aggregating,
    /// Sending the Bitcoin transaction.
    Broadcasting,
    /// Waiting for the transaction to be mined.
    AwaitingMempool,
    /// Mined, waiting for confirmations.
    AwaitingConfirmations,
    /// Running the confirmation handshake.
    Confirming,
    /// Paying the anchoring Core.
    Rewarding,
    /// Abandoned; the range will be anchored again.
    Reset,
}

impl fmt::Display for EpochPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EpochPhase::Idle => "idle",
            EpochPhase::Aggregating => "aggregating",
            EpochPhase::Broadcasting => "broadcasting",
            EpochPhase::AwaitingMempool => "awaiting_mempool",
            EpochPhase::AwaitingConfirmations => "awaiting_confirmations",
            EpochPhase::Confirming => "confirming",
            EpochPhase::Rewarding => "rewarding",
            EpochPhase::Reset => "reset",
        };
        f.write_str(name)
    }
}

/// A launched epoch, decided synchronously at the launch block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochPlan {
    /// Calendar range to anchor.
    pub range: EpochRange,
    /// Launch height.
    pub height: u64,
    /// Bitcoin height known at launch.
    pub btc_height: u64,
    /// Contributor election for the anchoring Core.
    pub election: Election,
}

/// Result of running an epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochOutcome {
    /// Calendar range.
    pub range: EpochRange,
    /// Aggregate root.
    pub root: Hash,
    /// Transaction sent, if this node anchored.
    pub sent: Option<SentTx>,
}

/// A confirmed anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmOutcome {
    /// The watched transaction.
    pub record: ConfirmedTxRecord,
    /// Committed confirmation transaction id.
    pub confirm_tx_id: String,
    /// Proofs handed to the sink.
    pub proofs: usize,
}

/// Anchoring into an external chain.
///
/// An engine anchors epochs, watches its transactions through to
/// confirmation, reacts to failures and assembles proofs.
#[async_trait]
pub trait AnchorEngine: Send + Sync {
    /// Aggregate the planned range and, if elected, commit it.
    async fn anchor_epoch(&self, plan: EpochPlan) -> Result<EpochOutcome>;

    /// Advance watched transactions toward confirmation.
    async fn monitor_confirmation(&self) -> Result<Vec<ConfirmOutcome>>;

    /// Evaluate failure conditions against `state` and carry out the
    /// off-chain side of the resulting actions. Resets are not applied here:
    /// the block driver queues [`FailureAction::mutation`] for the block
    /// that produced `state`.
    async fn monitor_failure(&self, state: &AnchorState) -> Result<Vec<FailureAction>>;

    /// Assemble full proofs for every hash under an anchored root.
    async fn construct_proof(
        &self,
        root: &Hash,
        header: BtcHeaderFragment,
    ) -> Result<Vec<ProofOutput>>;
}
