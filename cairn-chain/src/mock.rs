//! In-memory replicated log for testing.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use cairn_core::sha256;
use parking_lot::Mutex;

use crate::error::{ChainError, Result};
use crate::log::ReplicatedLog;
use crate::tx::{ChainTx, TxQuery, TxSubmission};

#[derive(Default)]
struct MemLogInner {
    committed: Vec<ChainTx>,
    pending: Vec<ChainTx>,
    height: u64,
    next_seq: u64,
}

/// A replicated log held in memory.
///
/// Broadcasts are pending until [`MemLog::commit_block`] is called, which
/// assigns heights and returns the transactions to deliver.
#[derive(Default)]
pub struct MemLog {
    inner: Mutex<MemLogInner>,
    offline: AtomicBool,
}

impl MemLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log whose first transaction gets sequence `after + 1`.
    pub fn starting_after(after: u64) -> Self {
        let log = Self::default();
        log.inner.lock().next_seq = after;
        log
    }

    /// Simulate the log being unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Commit everything pending as the next block.
    pub fn commit_block(&self) -> (u64, Vec<ChainTx>) {
        let mut inner = self.inner.lock();
        inner.height += 1;
        let height = inner.height;
        let mut block: Vec<ChainTx> = inner.pending.drain(..).collect();
        for tx in &mut block {
            tx.height = height;
        }
        inner.committed.extend(block.iter().cloned());
        (height, block)
    }

    /// Current height.
    pub fn height(&self) -> u64 {
        self.inner.lock().height
    }

    /// Every committed transaction.
    pub fn committed(&self) -> Vec<ChainTx> {
        self.inner.lock().committed.clone()
    }

    /// Number of pending transactions.
    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Pending transactions.
    pub fn pending(&self) -> Vec<ChainTx> {
        self.inner.lock().pending.clone()
    }

    fn enqueue(&self, tx: TxSubmission) -> ChainTx {
        let mut inner = self.inner.lock();
        inner.next_seq += 1;
        let seq = inner.next_seq;
        let id = sha256(
            format!(
                "{}|{}|{}|{}|{}",
                seq,
                tx.tx_type,
                tx.core_id,
                tx.data,
                tx.meta.as_deref().unwrap_or("")
            )
            .as_bytes(),
        )
        .to_hex();

        let chain_tx = ChainTx {
            id,
            seq,
            height: 0,
            tx_type: tx.tx_type,
            data: tx.data,
            core_id: tx.core_id,
            meta: tx.meta,
        };
        inner.pending.push(chain_tx.clone());
        chain_tx
    }
}

#[async_trait]
impl ReplicatedLog for MemLog {
    async fn broadcast(&self, tx: TxSubmission) -> Result<String> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ChainError::LogUnavailable("mem log offline".into()));
        }
        Ok(self.enqueue(tx).id)
    }

    async fn query(&self, query: &TxQuery) -> Result<Vec<ChainTx>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ChainError::LogUnavailable("mem log offline".into()));
        }
        Ok(self
            .inner
            .lock()
            .committed
            .iter()
            .filter(|tx| query.matches(tx))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::TxType;

    #[tokio::test]
    async fn test_broadcast_visible_after_commit() {
        let log = MemLog::starting_after(100);
        let id = log
            .broadcast(TxSubmission::new(TxType::Cal, "00", "a".into()))
            .await
            .unwrap();

        let q = TxQuery::of_type(TxType::Cal);
        assert!(log.query(&q).await.unwrap().is_empty());

        let (height, block) = log.commit_block();
        assert_eq!(height, 1);
        assert_eq!(block[0].id, id);
        assert_eq!(block[0].seq, 101);

        let found = log.query(&q).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].height, 1);
    }

    #[tokio::test]
    async fn test_offline() {
        let log = MemLog::new();
        log.set_offline(true);
        let err = log
            .broadcast(TxSubmission::new(TxType::Cal, "00", "a".into()))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
