//! Block lifecycle driver.
//!
//! The host consensus engine calls, for every committed block:
//!
//! ```text
//! begin_block(height, hash) -> deliver(tx)* -> end_block() -> commit()
//! ```
//!
//! Replicated decisions are queued synchronously during the block, so
//! every node applies the same mutations at the same height. Slow work
//! (Bitcoin calls, log queries, confirmation loops) runs in spawned tasks
//! whose results reach other nodes only as log transactions.

use std::sync::Arc;

use cairn_chain::{
    parse_confirm_meta, AnchorState, BtcAnchorPayload, BtcErrorPayload, BtcFeePayload, ChainTx,
    EpochRange, NodeView, StateMutation, StateWriter, TxRef, TxType,
};
use cairn_core::Hash;
use futures::FutureExt;
use parking_lot::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::AnchorConfig;
use crate::engine::AnchorEngine;
use crate::epoch::{BtcAnchorEngine, Collaborators};
use crate::errors::{AnchorError, Result};
use crate::store::AnchorStore;

/// One Core's anchoring node.
pub struct AnchorNode {
    engine: Arc<BtcAnchorEngine>,
    view: Arc<RwLock<NodeView>>,
    writer: StateWriter,
    tasks: JoinSet<()>,
}

impl AnchorNode {
    /// Create a node, restoring persisted state if the store has any.
    pub fn new(config: AnchorConfig, view: NodeView, collaborators: Collaborators) -> Result<Self> {
        let store = AnchorStore::new(collaborators.store.clone());
        let state = match store.load_state()? {
            Some(blob) => {
                let state = AnchorState::from_bytes(&blob)?;
                info!(
                    height = state.height,
                    begin_cal_seq = state.begin_cal_seq,
                    last_cal_seq = state.last_cal_seq,
                    "Restored anchor state"
                );
                state
            }
            None => AnchorState::new(config.contributor_window),
        };
        Self::with_state(config, view, collaborators, state)
    }

    /// Create a node from an explicit initial state.
    pub fn with_state(
        config: AnchorConfig,
        view: NodeView,
        collaborators: Collaborators,
        state: AnchorState,
    ) -> Result<Self> {
        config.validate()?;
        let view = Arc::new(RwLock::new(view));
        let writer = StateWriter::new(state);
        let engine = Arc::new(BtcAnchorEngine::new(
            config,
            view.clone(),
            writer.handle(),
            collaborators,
        ));
        Ok(Self {
            engine,
            view,
            writer,
            tasks: JoinSet::new(),
        })
    }

    /// The engine.
    pub fn engine(&self) -> &Arc<BtcAnchorEngine> {
        &self.engine
    }

    /// A copy of the replicated state.
    pub fn state(&self) -> AnchorState {
        self.writer.snapshot()
    }

    /// Update the node's view of itself and its peers.
    pub fn update_view(&self, f: impl FnOnce(&mut NodeView)) {
        f(&mut *self.view.write());
    }

    /// Start processing a block.
    pub fn begin_block(&mut self, height: u64, block_hash: Hash) {
        self.reap_tasks();
        self.writer.begin_block(height, block_hash);
    }

    /// Deliver one committed transaction.
    ///
    /// Malformed payloads are logged and skipped; they never halt the block.
    pub fn deliver(&mut self, tx: &ChainTx) -> Result<()> {
        if let Err(e) = self.deliver_inner(tx) {
            if matches!(e, AnchorError::Chain(_)) {
                warn!(
                    tx_id = %tx.id,
                    tx_type = %tx.tx_type,
                    error = %e,
                    "Skipping malformed transaction"
                );
                return Ok(());
            }
            return Err(e);
        }
        Ok(())
    }

    fn deliver_inner(&mut self, tx: &ChainTx) -> Result<()> {
        let tx_ref = TxRef {
            id: tx.id.clone(),
            height: tx.height,
        };

        match tx.tx_type {
            TxType::Cal => {
                self.engine.record_calendar(tx)?;
                self.writer.queue(StateMutation::CalendarCommitted {
                    seq: tx.seq,
                    core: tx.core_id.clone(),
                });
                if self.view.read().is_self(&tx.core_id) {
                    if let Err(e) = self.engine.finalize_calendar(tx) {
                        warn!(tx_id = %tx.id, error = %e, "Calendar finalisation failed");
                    }
                }
            }
            TxType::BtcAnchor => {
                let payload: BtcAnchorPayload = tx.payload()?;
                let Some(range) = self.in_flight(tx, payload.cal_range_begin, payload.cal_range_end)
                else {
                    return Ok(());
                };

                match self.engine.begin_tx_monitor(tx) {
                    Ok(_) => self.writer.queue(StateMutation::AnchorAnnounced {
                        range,
                        btc_tx_id: payload.btc_tx_id,
                        tx: tx_ref,
                    }),
                    Err(e) if e.abandons_epoch() => {
                        warn!(
                            tx_id = %tx.id,
                            core = %tx.core_id,
                            error = %e,
                            "Anchor announcement rejected"
                        );
                        self.writer.queue(StateMutation::ResetEpoch {
                            range,
                            error_core: Some(tx.core_id.clone()),
                            error_root: Some(payload.agg_root),
                        });
                    }
                    Err(e) => return Err(e),
                }
            }
            TxType::BtcError => {
                let payload: BtcErrorPayload = tx.payload()?;
                let Some(range) = self.in_flight(tx, payload.cal_range_begin, payload.cal_range_end)
                else {
                    return Ok(());
                };
                if self.writer.snapshot().announced_btc_tx.is_some() {
                    warn!(core = %tx.core_id, "Ignoring error announcement for an announced epoch");
                    return Ok(());
                }
                self.writer.queue(StateMutation::AnchorFailed {
                    range,
                    core: tx.core_id.clone(),
                    root: payload.agg_root,
                });
                self.engine.discard_epoch(&payload.agg_root)?;
            }
            TxType::BtcConfirm => {
                let meta = tx.meta.as_deref().and_then(parse_confirm_meta);
                let Some((anchor_core, btc_tx_id)) = meta else {
                    warn!(tx_id = %tx.id, "Confirmation without anchor meta");
                    return Ok(());
                };
                self.writer.queue(StateMutation::AnchorConfirmed {
                    btc_tx_id,
                    anchor_core,
                    tx: tx_ref,
                });
            }
            TxType::BtcFee => {
                if !self.view.read().validators.contains(&tx.core_id) {
                    debug!(core = %tx.core_id, "Ignoring fee report from non-validator");
                    return Ok(());
                }
                let payload: BtcFeePayload = tx.payload()?;
                self.writer.queue(StateMutation::BtcStatus {
                    fee_rate: payload.fee_rate,
                    btc_height: payload.btc_height,
                });
            }
        }
        Ok(())
    }

    /// The in-flight epoch, if `tx` announces it and comes from its
    /// elected anchorer.
    fn in_flight(&self, tx: &ChainTx, begin: u64, end: u64) -> Option<EpochRange> {
        let state = self.writer.snapshot();
        let range = EpochRange::new(begin, end)?;
        if state.current_epoch != Some(range) {
            debug!(
                tx_id = %tx.id,
                tx_type = %tx.tx_type,
                begin,
                end,
                "Ignoring stale epoch transaction"
            );
            return None;
        }
        if state.epoch_leader.as_ref() != Some(&tx.core_id) {
            warn!(
                tx_id = %tx.id,
                tx_type = %tx.tx_type,
                core = %tx.core_id,
                "Ignoring epoch transaction from a Core that was not elected"
            );
            return None;
        }
        Some(range)
    }

    /// Finish the block: launch epochs, evaluate failures, schedule
    /// background work.
    pub fn end_block(&mut self) -> Result<()> {
        let state = self.writer.snapshot();

        match self.engine.plan_epoch(&state) {
            Ok(Some(plan)) => {
                info!(
                    height = plan.height,
                    begin = plan.range.begin,
                    end = plan.range.end,
                    leader = ?plan.election.leaders,
                    "Launching anchor epoch"
                );
                self.writer.queue(StateMutation::EpochStarted {
                    range: plan.range,
                    height: plan.height,
                    leader: plan.election.leaders.first().cloned(),
                });
                let engine = self.engine.clone();
                self.tasks.spawn(async move {
                    if let Err(e) = engine.anchor_epoch(plan).await {
                        report("anchor_epoch", &e);
                    }
                });
            }
            Ok(None) => {}
            Err(e) if e.is_quiet() => {
                debug!(height = state.height, reason = %e, "No epoch launched")
            }
            Err(e) => warn!(height = state.height, error = %e, "Epoch planning failed"),
        }

        let actions = self.engine.failures().evaluate(&state)?;
        for mutation in actions.iter().filter_map(|a| a.mutation()) {
            self.writer.queue(mutation);
        }
        if !actions.is_empty() {
            let engine = self.engine.clone();
            self.tasks.spawn(async move {
                engine.failures().execute(actions).await;
            });
        }

        if self.engine.is_fee_reporter(&state) {
            let engine = self.engine.clone();
            self.tasks.spawn(async move {
                if let Err(e) = engine.report_btc_status().await {
                    report("report_btc_status", &e);
                }
            });
        }

        if !self.engine.store().records()?.is_empty() {
            let engine = self.engine.clone();
            self.tasks.spawn(async move {
                if let Err(e) = engine.monitor_confirmation().await {
                    report("monitor_confirmation", &e);
                }
            });
        }

        Ok(())
    }

    /// Apply the block's mutations and persist the state. Returns how many
    /// mutations changed state.
    pub fn commit(&mut self) -> Result<usize> {
        let applied = self.writer.commit();
        let state = self.writer.snapshot();
        self.engine.prune_calendar(&state)?;
        self.engine.store().save_state(&state.to_bytes()?)?;
        Ok(applied)
    }

    /// Wait for every spawned task.
    pub async fn drain_tasks(&mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Anchor task panicked");
            }
        }
    }

    /// Number of tasks not yet reaped.
    pub fn tasks_in_flight(&self) -> usize {
        self.tasks.len()
    }

    fn reap_tasks(&mut self) {
        while let Some(Some(result)) = self.tasks.join_next().now_or_never() {
            if let Err(e) = result {
                warn!(error = %e, "Anchor task panicked");
            }
        }
    }
}

/// Log a background task failure at the level its policy calls for.
fn report(task: &'static str, e: &AnchorError) {
    if e.is_quiet() {
        debug!(task, reason = %e, "Nothing to do");
    } else if e.announces_failure() {
        warn!(task, error = %e, "Failure announced on the log");
    } else if e.is_retryable() {
        warn!(task, error = %e, "Retrying on the next pass");
    } else {
        error!(task, error = %e, "Anchor task failed");
    }
}
