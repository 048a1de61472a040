//! Failure handling for in-flight epochs.
//!
//! Resets are derived only from replicated state, so every node reaches
//! the same decision at the same height:
//!
//! - no announcement within `announce_timeout_blocks` of the launch
//! - an announced transaction still unconfirmed `check_expiry_btc_blocks`
//!   Bitcoin blocks after it was announced
//!
//! Everything else here is node-local bookkeeping: dropping checks that no
//! longer matter and replacing a stuck transaction this node sent.

use std::collections::HashSet;
use std::sync::Arc;

use cairn_chain::{
    AnchorState, BtcAnchorPayload, CoreId, EpochRange, NodeView, ReplicatedLog, StateMutation,
    TxSubmission, TxType,
};
use cairn_core::Hash;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::AnchorConfig;
use crate::errors::{AnchorError, Result};
use crate::provider::{BitcoinClient, SentTx};
use crate::store::{AnchorStore, ConfirmedTxRecord, PendingAnchorCheck};

/// Something to do about an epoch that is not progressing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureAction {
    /// The elected Core never announced a transaction.
    Reset {
        /// Epoch range.
        range: EpochRange,
        /// Core blamed.
        error_core: Option<CoreId>,
    },
    /// The announced transaction never confirmed.
    Expire {
        /// Epoch range.
        range: EpochRange,
        /// Core blamed.
        error_core: Option<CoreId>,
    },
    /// A local check is no longer needed.
    Discard {
        /// The check.
        check: PendingAnchorCheck,
        /// An unmined record to drop with it.
        record: Option<ConfirmedTxRecord>,
    },
    /// Bump the fee on a transaction this node sent.
    ReplaceByFee {
        /// The check.
        check: PendingAnchorCheck,
        /// The stuck transaction.
        record: ConfirmedTxRecord,
        /// New fee rate, sat/vB.
        fee_rate: u64,
        /// Bitcoin height to rebaseline the check at.
        btc_height: u64,
    },
}

impl FailureAction {
    /// The replicated mutation this action implies, if any.
    pub fn mutation(&self) -> Option<StateMutation> {
        match self {
            FailureAction::Reset { range, error_core }
            | FailureAction::Expire { range, error_core } => Some(StateMutation::ResetEpoch {
                range: *range,
                error_core: error_core.clone(),
                error_root: None,
            }),
            _ => None,
        }
    }
}

/// Decides and carries out failure actions.
pub struct FailureMonitor {
    config: AnchorConfig,
    store: AnchorStore,
    bitcoin: Arc<dyn BitcoinClient>,
    log: Arc<dyn ReplicatedLog>,
    view: Arc<RwLock<NodeView>>,
    replacing: Mutex<HashSet<Hash>>,
}

impl FailureMonitor {
    /// Create a monitor.
    pub fn new(
        config: AnchorConfig,
        store: AnchorStore,
        bitcoin: Arc<dyn BitcoinClient>,
        log: Arc<dyn ReplicatedLog>,
        view: Arc<RwLock<NodeView>>,
    ) -> Self {
        Self {
            config,
            store,
            bitcoin,
            log,
            view,
            replacing: Mutex::new(HashSet::new()),
        }
    }

    /// Evaluate `state` and local checks.
    ///
    /// Synchronous so the lifecycle can queue the resulting mutations in
    /// the block that triggered them.
    pub fn evaluate(&self, state: &AnchorState) -> Result<Vec<FailureAction>> {
        let mut actions = Vec::new();

        let failing = self.evaluate_epoch(state);
        if let Some(action) = &failing {
            actions.push(action.clone());
        }
        let failing_range = failing.as_ref().and_then(|a| match a {
            FailureAction::Reset { range, .. } | FailureAction::Expire { range, .. } => {
                Some(*range)
            }
            _ => None,
        });

        for check in self.store.checks()? {
            let record = self.store.record(&check.root)?;

            if state.current_epoch != Some(check.range) || failing_range == Some(check.range) {
                actions.push(FailureAction::Discard {
                    check,
                    record: record.filter(|r| r.block_height == 0),
                });
                continue;
            }

            match record {
                Some(r) if r.block_height > 0 => {
                    actions.push(FailureAction::Discard { check, record: None });
                }
                Some(r) if self.needs_replacement(state, &check) => {
                    let fee_rate = state.btc_fee_rate.max(self.config.min_fee_rate_sat_vb)
                        * self.config.rbf_fee_multiplier;
                    actions.push(FailureAction::ReplaceByFee {
                        check,
                        record: r,
                        fee_rate,
                        btc_height: state.btc_height,
                    });
                }
                _ => {}
            }
        }

        Ok(actions)
    }

    fn evaluate_epoch(&self, state: &AnchorState) -> Option<FailureAction> {
        let range = state.current_epoch?;
        let launched = state.latest_anchor_height?;

        if state.announced_btc_tx.is_none() {
            if state.height >= launched + self.config.announce_timeout_blocks {
                warn!(
                    begin = range.begin,
                    end = range.end,
                    launched,
                    height = state.height,
                    leader = ?state.epoch_leader,
                    "Anchor announcement timed out"
                );
                return Some(FailureAction::Reset {
                    range,
                    error_core: state.epoch_leader.clone(),
                });
            }
        } else if state.announced_btc_height > 0
            && state.btc_height >= state.announced_btc_height + self.config.check_expiry_btc_blocks
        {
            warn!(
                begin = range.begin,
                end = range.end,
                announced_at = state.announced_btc_height,
                btc_height = state.btc_height,
                tx = ?state.announced_btc_tx,
                "Anchor transaction expired unconfirmed"
            );
            return Some(FailureAction::Expire {
                range,
                error_core: state.epoch_leader.clone(),
            });
        }
        None
    }

    fn needs_replacement(&self, state: &AnchorState, check: &PendingAnchorCheck) -> bool {
        check.am_leader
            && check.announced
            && check.btc_height > 0
            && state.btc_height >= check.btc_height + self.config.rbf_after_btc_blocks
            && !self.replacing.lock().contains(&check.root)
    }

    /// Carry out the local side of `actions`. Returns how many succeeded.
    pub async fn execute(&self, actions: Vec<FailureAction>) -> usize {
        let mut done = 0;
        for action in actions {
            let result = match action {
                FailureAction::Reset { .. } | FailureAction::Expire { .. } => Ok(()),
                FailureAction::Discard { check, record } => self.discard(&check, record.as_ref()),
                FailureAction::ReplaceByFee {
                    check,
                    record,
                    fee_rate,
                    btc_height,
                } => self
                    .replace_by_fee(&check, &record, fee_rate, btc_height)
                    .await
                    .map(|_| ()),
            };
            match result {
                Ok(()) => done += 1,
                Err(e) => warn!(error = %e, "Failure action did not complete"),
            }
        }
        done
    }

    fn discard(
        &self,
        check: &PendingAnchorCheck,
        record: Option<&ConfirmedTxRecord>,
    ) -> Result<()> {
        debug!(
            root = %check.root,
            begin = check.range.begin,
            end = check.range.end,
            "Dropping anchor check"
        );
        self.store.remove_check(check)?;
        if let Some(record) = record {
            self.store.remove_record(record)?;
            self.store.clear_btc(&record.root)?;
        }
        Ok(())
    }

    async fn replace_by_fee(
        &self,
        check: &PendingAnchorCheck,
        record: &ConfirmedTxRecord,
        fee_rate: u64,
        btc_height: u64,
    ) -> Result<SentTx> {
        if !self.replacing.lock().insert(check.root) {
            return Err(AnchorError::Bitcoin(format!(
                "replacement of {} already in progress",
                record.btc_tx_id
            )));
        }
        let result = self.rebroadcast(check, record, fee_rate, btc_height).await;
        self.replacing.lock().remove(&check.root);
        result
    }

    async fn rebroadcast(
        &self,
        check: &PendingAnchorCheck,
        record: &ConfirmedTxRecord,
        fee_rate: u64,
        btc_height: u64,
    ) -> Result<SentTx> {
        let me = self
            .view
            .read()
            .id
            .clone()
            .ok_or_else(|| AnchorError::Config("node identity unknown".into()))?;

        let sent = self.bitcoin.replace_by_fee(&record.btc_tx_id, fee_rate).await?;
        info!(
            old = %record.btc_tx_id,
            new = %sent.tx_id,
            fee_rate,
            "Replaced anchor transaction"
        );

        let payload = BtcAnchorPayload {
            agg_root: check.root,
            btc_tx_id: sent.tx_id.clone(),
            raw_tx: sent.raw_tx.clone(),
            cal_range_begin: check.range.begin,
            cal_range_end: check.range.end,
        };
        self.log
            .broadcast(TxSubmission::json(TxType::BtcAnchor, &payload, me)?)
            .await?;

        let mut updated = check.clone();
        updated.btc_height = btc_height;
        self.store.update_check(check, &updated)?;
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBitcoin;
    use crate::store::MemStore;
    use cairn_chain::mock::MemLog;
    use cairn_core::sha256;

    struct Fixture {
        monitor: FailureMonitor,
        store: AnchorStore,
        bitcoin: Arc<MockBitcoin>,
        log: Arc<MemLog>,
    }

    fn fixture() -> Fixture {
        let store = AnchorStore::new(Arc::new(MemStore::new()));
        let bitcoin = Arc::new(MockBitcoin::new(700));
        let log = Arc::new(MemLog::new());
        let view = Arc::new(RwLock::new(NodeView::new("core-a")));
        let monitor = FailureMonitor::new(
            AnchorConfig::default(),
            store.clone(),
            bitcoin.clone(),
            log.clone(),
            view,
        );
        Fixture {
            monitor,
            store,
            bitcoin,
            log,
        }
    }

    fn in_flight(range: EpochRange) -> AnchorState {
        let mut state = AnchorState::default();
        state.last_cal_seq = range.end;
        state.begin_cal_seq = range.begin;
        state.apply(&StateMutation::EpochStarted {
            range,
            height: 60,
            leader: Some("core-a".into()),
        });
        state
    }

    fn check(root: Hash, range: EpochRange) -> PendingAnchorCheck {
        PendingAnchorCheck {
            root,
            range,
            cal_height: 60,
            btc_height: 700,
            broadcast_btc_height: 700,
            am_leader: true,
            anchorer: Some("core-a".into()),
            announced: true,
        }
    }

    #[test]
    fn test_announce_timeout_resets() {
        let f = fixture();
        let range = EpochRange::new(0, 5).unwrap();
        let mut state = in_flight(range);

        state.height = 69;
        assert!(f.monitor.evaluate(&state).unwrap().is_empty());

        state.height = 70;
        let actions = f.monitor.evaluate(&state).unwrap();
        assert_eq!(
            actions,
            vec![FailureAction::Reset {
                range,
                error_core: Some("core-a".into()),
            }]
        );
        assert!(matches!(
            actions[0].mutation(),
            Some(StateMutation::ResetEpoch { error_root: None, .. })
        ));
    }

    #[test]
    fn test_expiry_after_announce() {
        let f = fixture();
        let range = EpochRange::new(0, 5).unwrap();
        let mut state = in_flight(range);
        state.btc_height = 700;
        state.apply(&StateMutation::AnchorAnnounced {
            range,
            btc_tx_id: "t".into(),
            tx: cairn_chain::TxRef {
                id: "a".into(),
                height: 61,
            },
        });
        state.height = 500;

        state.btc_height = 843;
        assert!(f.monitor.evaluate(&state).unwrap().is_empty());

        state.btc_height = 844;
        let actions = f.monitor.evaluate(&state).unwrap();
        assert!(matches!(actions[0], FailureAction::Expire { .. }));
    }

    #[test]
    fn test_stale_check_discarded_with_unmined_record() {
        let f = fixture();
        let range = EpochRange::new(0, 5).unwrap();
        let root = sha256(b"old");
        let c = check(root, range);
        let record = ConfirmedTxRecord {
            btc_tx_id: "aa".into(),
            root,
            range,
            block_height: 0,
            anchorer: "core-a".into(),
        };
        f.store.add_check(&c).unwrap();
        f.store.put_record(&record).unwrap();

        let actions = f.monitor.evaluate(&AnchorState::default()).unwrap();
        assert_eq!(
            actions,
            vec![FailureAction::Discard {
                check: c,
                record: Some(record),
            }]
        );
    }

    #[test]
    fn test_mined_record_resolves_check() {
        let f = fixture();
        let range = EpochRange::new(0, 5).unwrap();
        let root = sha256(b"mined");
        let c = check(root, range);
        f.store.add_check(&c).unwrap();
        f.store
            .put_record(&ConfirmedTxRecord {
                btc_tx_id: "aa".into(),
                root,
                range,
                block_height: 701,
                anchorer: "core-a".into(),
            })
            .unwrap();

        let actions = f.monitor.evaluate(&in_flight(range)).unwrap();
        assert_eq!(actions, vec![FailureAction::Discard { check: c, record: None }]);
    }

    #[tokio::test]
    async fn test_replace_by_fee_rebroadcasts() {
        let f = fixture();
        let range = EpochRange::new(0, 5).unwrap();
        let root = sha256(b"stuck");
        let sent = f.bitcoin.send_data_carrier_tx(&root).await.unwrap();

        let c = check(root, range);
        f.store.add_check(&c).unwrap();
        f.store
            .put_record(&ConfirmedTxRecord {
                btc_tx_id: sent.tx_id.clone(),
                root,
                range,
                block_height: 0,
                anchorer: "core-a".into(),
            })
            .unwrap();

        let mut state = in_flight(range);
        state.btc_fee_rate = 3;
        state.btc_height = 702;
        assert!(f.monitor.evaluate(&state).unwrap().is_empty());

        state.btc_height = 703;
        let actions = f.monitor.evaluate(&state).unwrap();
        assert!(matches!(
            actions[0],
            FailureAction::ReplaceByFee { fee_rate: 10, btc_height: 703, .. }
        ));

        assert_eq!(f.monitor.execute(actions).await, 1);
        assert_eq!(f.bitcoin.replacements(), vec![(sent.tx_id.clone(), 10)]);

        let pending = f.log.pending();
        assert_eq!(pending.len(), 1);
        let payload: BtcAnchorPayload = pending[0].payload().unwrap();
        assert_eq!(payload.agg_root, root);
        assert_ne!(payload.btc_tx_id, sent.tx_id);
        assert_eq!(f.store.check(&root).unwrap().unwrap().btc_height, 703);
    }

    #[tokio::test]
    async fn test_discard_clears_fragments() {
        let f = fixture();
        let range = EpochRange::new(0, 5).unwrap();
        let root = sha256(b"gone");
        let c = check(root, range);
        let record = ConfirmedTxRecord {
            btc_tx_id: "aa".into(),
            root,
            range,
            block_height: 0,
            anchorer: "core-a".into(),
        };
        f.store.add_check(&c).unwrap();
        f.store.put_record(&record).unwrap();
        f.store
            .put_btc_tx(&root, &cairn_core::BtcTxFragment { ops: vec![] })
            .unwrap();

        let done = f
            .monitor
            .execute(vec![FailureAction::Discard {
                check: c,
                record: Some(record),
            }])
            .await;
        assert_eq!(done, 1);
        assert!(f.store.checks().unwrap().is_empty());
        assert!(f.store.records().unwrap().is_empty());
        assert!(f.store.btc_tx(&root).unwrap().is_none());
    }
}
