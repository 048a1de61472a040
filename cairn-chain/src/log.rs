//! The replicated transaction log.

use async_trait::async_trait;

use crate::error::Result;
use crate::tx::{ChainTx, TxQuery, TxSubmission};

/// Access to the replicated, totally ordered transaction log.
///
/// Broadcasting only submits a transaction; it becomes visible to
/// [`ReplicatedLog::query`] and to the node lifecycle once committed.
#[async_trait]
pub trait ReplicatedLog: Send + Sync {
    /// Submit a transaction, returning its id.
    async fn broadcast(&self, tx: TxSubmission) -> Result<String>;

    /// Committed transactions matching `query`, in sequence order.
    async fn query(&self, query: &TxQuery) -> Result<Vec<ChainTx>>;
}
