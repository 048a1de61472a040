//! Replicated anchor state and its single writer.
//!
//! ```text
//!  deliver / end_block ──queue()──> StateWriter ──commit()──> Arc<RwLock<AnchorState>>
//!                                                                   │
//!  background task <──────── StateHandle::snapshot() <──────────────┘
//! ```
//!
//! Only [`StateWriter`] mutates [`AnchorState`], and only with mutations
//! queued while processing a committed block. Background tasks read
//! snapshots; anything they decide reaches the state as a log transaction
//! delivered to every node in the same block.

use std::sync::Arc;

use cairn_core::Hash;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::contributors::ChainContributors;
use crate::error::{ChainError, Result};
use crate::node::CoreId;

/// A calendar sequence range `(begin, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpochRange {
    /// Exclusive start.
    pub begin: u64,
    /// Inclusive end.
    pub end: u64,
}

impl EpochRange {
    /// Create a range. Returns `None` unless `end > begin`.
    pub fn new(begin: u64, end: u64) -> Option<Self> {
        (end > begin).then_some(Self { begin, end })
    }

    /// Whether `seq` falls in the range.
    pub fn contains(&self, seq: u64) -> bool {
        seq > self.begin && seq <= self.end
    }

    /// Number of sequence numbers covered.
    pub fn len(&self) -> u64 {
        self.end - self.begin
    }

    /// Always false for a constructed range.
    pub fn is_empty(&self) -> bool {
        self.end <= self.begin
    }
}

/// A committed log transaction reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRef {
    /// Transaction id.
    pub id: String,
    /// Height it was committed at.
    pub height: u64,
}

/// The replicated subset of node state driving anchoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorState {
    /// Current block height.
    pub height: u64,
    /// Current block hash (election seed).
    pub block_hash: Hash,
    /// Sequence of the last committed calendar transaction.
    pub last_cal_seq: u64,
    /// Start (exclusive) of the next epoch.
    pub begin_cal_seq: u64,
    /// Epoch currently being anchored.
    pub current_epoch: Option<EpochRange>,
    /// Height the in-flight epoch was launched at. `None` when ready.
    pub latest_anchor_height: Option<u64>,
    /// Core elected to anchor the in-flight epoch.
    pub epoch_leader: Option<CoreId>,
    /// Bitcoin txid announced for the in-flight epoch.
    pub announced_btc_tx: Option<String>,
    /// Reported Bitcoin height when the in-flight epoch was announced.
    pub announced_btc_height: u64,
    /// Last anchor announcement.
    pub last_anchor_tx: Option<TxRef>,
    /// Last anchor confirmation.
    pub last_confirm_tx: Option<TxRef>,
    /// Last reported Bitcoin height.
    pub btc_height: u64,
    /// Last reported fee rate, sat/vB.
    pub btc_fee_rate: u64,
    /// Core that last failed to anchor.
    pub last_error_core: Option<CoreId>,
    /// Root of the last failed epoch.
    pub last_error_root: Option<Hash>,
    /// Core credited with the last confirmed anchor.
    pub last_rewarded_core: Option<CoreId>,
    /// Recent calendar contributors.
    pub contributors: ChainContributors,
}

impl Default for AnchorState {
    fn default() -> Self {
        Self::new(ChainContributors::default().window())
    }
}

impl AnchorState {
    /// Fresh state with a contributor window of `window`.
    pub fn new(window: usize) -> Self {
        Self {
            height: 0,
            block_hash: Hash::ZERO,
            last_cal_seq: 0,
            begin_cal_seq: 0,
            current_epoch: None,
            latest_anchor_height: None,
            epoch_leader: None,
            announced_btc_tx: None,
            announced_btc_height: 0,
            last_anchor_tx: None,
            last_confirm_tx: None,
            btc_height: 0,
            btc_fee_rate: 0,
            last_error_core: None,
            last_error_root: None,
            last_rewarded_core: None,
            contributors: ChainContributors::new(window),
        }
    }

    /// Whether no epoch is in flight.
    pub fn is_ready(&self) -> bool {
        self.latest_anchor_height.is_none()
    }

    /// Calendar range not yet anchored, if any.
    pub fn pending_range(&self) -> Option<EpochRange> {
        EpochRange::new(self.begin_cal_seq, self.last_cal_seq)
    }

    /// Encode as an opaque blob.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ChainError::Core(e.into()))
    }

    /// Decode an opaque blob.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| ChainError::Core(e.into()))
    }

    fn clear_epoch(&mut self) {
        self.current_epoch = None;
        self.latest_anchor_height = None;
        self.epoch_leader = None;
        self.announced_btc_tx = None;
        self.announced_btc_height = 0;
    }

    /// Apply a mutation. Returns whether anything changed.
    pub fn apply(&mut self, mutation: &StateMutation) -> bool {
        match mutation {
            StateMutation::CalendarCommitted { seq, core } => {
                self.last_cal_seq = self.last_cal_seq.max(*seq);
                self.contributors.record(core.clone());
                true
            }
            StateMutation::EpochStarted {
                range,
                height,
                leader,
            } => {
                if !self.is_ready() || range.begin != self.begin_cal_seq {
                    return false;
                }
                self.current_epoch = Some(*range);
                self.latest_anchor_height = Some(*height);
                self.epoch_leader = leader.clone();
                self.announced_btc_tx = None;
                self.begin_cal_seq = range.end;
                true
            }
            StateMutation::AnchorAnnounced { range, btc_tx_id, tx } => {
                if self.current_epoch != Some(*range) {
                    return false;
                }
                // A replacement keeps the original baseline for expiry.
                if self.announced_btc_tx.is_none() {
                    self.announced_btc_height = self.btc_height;
                }
                self.announced_btc_tx = Some(btc_tx_id.clone());
                self.last_anchor_tx = Some(tx.clone());
                true
            }
            StateMutation::AnchorConfirmed {
                btc_tx_id,
                anchor_core,
                tx,
            } => {
                if self.announced_btc_tx.as_ref() != Some(btc_tx_id) {
                    return false;
                }
                self.clear_epoch();
                self.last_confirm_tx = Some(tx.clone());
                self.last_rewarded_core = Some(anchor_core.clone());
                true
            }
            StateMutation::ResetEpoch {
                range,
                error_core,
                error_root,
            } => {
                if self.current_epoch != Some(*range) {
                    return false;
                }
                self.begin_cal_seq = range.begin;
                self.clear_epoch();
                if error_core.is_some() {
                    self.last_error_core = error_core.clone();
                }
                if error_root.is_some() {
                    self.last_error_root = *error_root;
                }
                true
            }
            StateMutation::AnchorFailed { range, core, root } => {
                // Only the elected anchorer may give up, and only before
                // anything was announced.
                if self.current_epoch != Some(*range)
                    || self.epoch_leader.as_ref() != Some(core)
                    || self.announced_btc_tx.is_some()
                {
                    return false;
                }
                self.begin_cal_seq = range.begin;
                self.clear_epoch();
                self.last_error_core = Some(core.clone());
                self.last_error_root = Some(*root);
                true
            }
            StateMutation::BtcStatus {
                fee_rate,
                btc_height,
            } => {
                self.btc_fee_rate = *fee_rate;
                self.btc_height = self.btc_height.max(*btc_height);
                // Announced before any height was known.
                if self.announced_btc_tx.is_some() && self.announced_btc_height == 0 {
                    self.announced_btc_height = self.btc_height;
                }
                true
            }
        }
    }
}

/// A change to [`AnchorState`].
///
/// Epoch mutations are guarded by the range or txid they refer to, so a
/// late or duplicated mutation is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateMutation {
    /// A calendar transaction was committed.
    CalendarCommitted {
        /// Its sequence.
        seq: u64,
        /// Submitting Core.
        core: CoreId,
    },
    /// An anchor epoch was launched.
    EpochStarted {
        /// Epoch range.
        range: EpochRange,
        /// Launch height.
        height: u64,
        /// Elected anchoring Core.
        leader: Option<CoreId>,
    },
    /// The epoch's Bitcoin transaction was announced.
    AnchorAnnounced {
        /// Epoch range.
        range: EpochRange,
        /// Bitcoin txid.
        btc_tx_id: String,
        /// The announcement.
        tx: TxRef,
    },
    /// The epoch's Bitcoin transaction was confirmed.
    AnchorConfirmed {
        /// Bitcoin txid.
        btc_tx_id: String,
        /// Core credited with the anchor.
        anchor_core: CoreId,
        /// The confirmation.
        tx: TxRef,
    },
    /// The epoch is abandoned and its range will be anchored again.
    ResetEpoch {
        /// Epoch range.
        range: EpochRange,
        /// Core blamed for the failure.
        error_core: Option<CoreId>,
        /// Root of the failed epoch.
        error_root: Option<Hash>,
    },
    /// The elected anchorer could not pay for its transaction.
    AnchorFailed {
        /// Epoch range.
        range: EpochRange,
        /// Reporting Core.
        core: CoreId,
        /// Root it failed to anchor.
        root: Hash,
    },
    /// A validator reported Bitcoin fee and height.
    BtcStatus {
        /// Fee rate, sat/vB.
        fee_rate: u64,
        /// Bitcoin height.
        btc_height: u64,
    },
}

/// Read access for background tasks.
#[derive(Clone)]
pub struct StateHandle {
    state: Arc<RwLock<AnchorState>>,
}

impl StateHandle {
    /// A copy of the current state.
    pub fn snapshot(&self) -> AnchorState {
        self.state.read().clone()
    }

    /// Read a value without cloning the whole state.
    pub fn read<R>(&self, f: impl FnOnce(&AnchorState) -> R) -> R {
        f(&self.state.read())
    }
}

/// The only writer of [`AnchorState`].
pub struct StateWriter {
    state: Arc<RwLock<AnchorState>>,
    queued: Vec<StateMutation>,
}

impl StateWriter {
    /// Create a writer owning `initial`.
    pub fn new(initial: AnchorState) -> Self {
        Self {
            state: Arc::new(RwLock::new(initial)),
            queued: Vec::new(),
        }
    }

    /// A handle for background tasks.
    pub fn handle(&self) -> StateHandle {
        StateHandle {
            state: self.state.clone(),
        }
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> AnchorState {
        self.state.read().clone()
    }

    /// Record the block being processed. Applied immediately: the block
    /// context must be visible to every decision made while processing it.
    pub fn begin_block(&mut self, height: u64, block_hash: Hash) {
        let mut state = self.state.write();
        state.height = height;
        state.block_hash = block_hash;
    }

    /// Queue a mutation for the next commit.
    pub fn queue(&mut self, mutation: StateMutation) {
        self.queued.push(mutation);
    }

    /// Number of mutations waiting.
    pub fn queued(&self) -> usize {
        self.queued.len()
    }

    /// Apply queued mutations in the order they were queued. Returns how
    /// many changed state.
    pub fn commit(&mut self) -> usize {
        let pending: Vec<StateMutation> = self.queued.drain(..).collect();

        let mut state = self.state.write();
        let mut applied = 0;
        for mutation in &pending {
            if state.apply(mutation) {
                applied += 1;
            } else {
                debug!(?mutation, "Stale state mutation ignored");
            }
        }

        if applied > 0 {
            info!(
                height = state.height,
                applied,
                begin_cal_seq = state.begin_cal_seq,
                last_cal_seq = state.last_cal_seq,
                "Committed anchor state"
            );
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(begin: u64, end: u64) -> EpochRange {
        EpochRange::new(begin, end).unwrap()
    }

    fn tx_ref(id: &str) -> TxRef {
        TxRef {
            id: id.into(),
            height: 1,
        }
    }

    #[test]
    fn test_epoch_range() {
        assert!(EpochRange::new(5, 5).is_none());
        let r = range(100, 140);
        assert_eq!(r.len(), 40);
        assert!(!r.contains(100));
        assert!(r.contains(140));
    }

    #[test]
    fn test_epoch_started_advances_pointer() {
        let mut s = AnchorState::default();
        s.apply(&StateMutation::CalendarCommitted {
            seq: 140,
            core: "a".into(),
        });
        s.begin_cal_seq = 100;
        assert_eq!(s.pending_range(), Some(range(100, 140)));

        assert!(s.apply(&StateMutation::EpochStarted {
            range: range(100, 140),
            height: 60,
            leader: Some("a".into()),
        }));
        assert_eq!(s.epoch_leader, Some(CoreId::new("a")));
        assert_eq!(s.begin_cal_seq, 140);
        assert_eq!(s.latest_anchor_height, Some(60));
        assert!(!s.is_ready());
        assert_eq!(s.pending_range(), None);

        // A second launch while in flight is ignored.
        assert!(!s.apply(&StateMutation::EpochStarted {
            range: range(140, 150),
            height: 61,
            leader: None,
        }));
    }

    #[test]
    fn test_pointer_monotonic_across_confirmations() {
        let mut s = AnchorState::default();
        let mut last_begin = 0;
        for (i, end) in [10u64, 25, 40].iter().enumerate() {
            s.apply(&StateMutation::CalendarCommitted {
                seq: *end,
                core: "a".into(),
            });
            let r = s.pending_range().unwrap();
            s.apply(&StateMutation::EpochStarted {
                range: r,
                height: i as u64,
                leader: None,
            });
            let txid = format!("btc-{}", i);
            s.apply(&StateMutation::AnchorAnnounced {
                range: r,
                btc_tx_id: txid.clone(),
                tx: tx_ref("a"),
            });
            assert!(s.apply(&StateMutation::AnchorConfirmed {
                btc_tx_id: txid,
                anchor_core: "a".into(),
                tx: tx_ref("c"),
            }));
            assert!(s.begin_cal_seq >= last_begin);
            assert_eq!(s.begin_cal_seq, *end);
            last_begin = s.begin_cal_seq;
            assert!(s.is_ready());
        }
    }

    #[test]
    fn test_reset_rewinds_only_in_flight_epoch() {
        let mut s = AnchorState::default();
        s.last_cal_seq = 20;
        s.begin_cal_seq = 10;
        let r = range(10, 20);
        s.apply(&StateMutation::EpochStarted {
            range: r,
            height: 5,
            leader: None,
        });

        // Wrong range is ignored.
        assert!(!s.apply(&StateMutation::ResetEpoch {
            range: range(0, 10),
            error_core: None,
            error_root: None,
        }));
        assert_eq!(s.begin_cal_seq, 20);

        assert!(s.apply(&StateMutation::ResetEpoch {
            range: r,
            error_core: Some("bad".into()),
            error_root: None,
        }));
        assert_eq!(s.begin_cal_seq, 10);
        assert!(s.is_ready());
        assert_eq!(s.last_error_core, Some(CoreId::new("bad")));

        // Duplicate reset is a no-op.
        assert!(!s.apply(&StateMutation::ResetEpoch {
            range: r,
            error_core: None,
            error_root: None,
        }));
    }

    #[test]
    fn test_confirmation_requires_matching_txid() {
        let mut s = AnchorState::default();
        s.last_cal_seq = 3;
        let r = s.pending_range().unwrap();
        s.apply(&StateMutation::EpochStarted {
            range: r,
            height: 1,
            leader: None,
        });
        s.apply(&StateMutation::AnchorAnnounced {
            range: r,
            btc_tx_id: "t1".into(),
            tx: tx_ref("a"),
        });
        assert!(!s.apply(&StateMutation::AnchorConfirmed {
            btc_tx_id: "t0".into(),
            anchor_core: "a".into(),
            tx: tx_ref("c"),
        }));
        assert!(!s.is_ready());
    }

    #[test]
    fn test_replacement_keeps_announce_baseline() {
        let mut s = AnchorState::default();
        s.last_cal_seq = 3;
        s.btc_height = 700;
        let r = s.pending_range().unwrap();
        s.apply(&StateMutation::EpochStarted {
            range: r,
            height: 1,
            leader: None,
        });
        s.apply(&StateMutation::AnchorAnnounced {
            range: r,
            btc_tx_id: "t1".into(),
            tx: tx_ref("a"),
        });
        s.btc_height = 705;
        s.apply(&StateMutation::AnchorAnnounced {
            range: r,
            btc_tx_id: "t2".into(),
            tx: tx_ref("b"),
        });
        assert_eq!(s.announced_btc_height, 700);
        assert_eq!(s.announced_btc_tx.as_deref(), Some("t2"));
    }

    #[test]
    fn test_btc_height_never_decreases() {
        let mut s = AnchorState::default();
        s.apply(&StateMutation::BtcStatus {
            fee_rate: 10,
            btc_height: 800,
        });
        s.apply(&StateMutation::BtcStatus {
            fee_rate: 12,
            btc_height: 790,
        });
        assert_eq!(s.btc_height, 800);
        assert_eq!(s.btc_fee_rate, 12);
    }

    #[test]
    fn test_state_blob_roundtrip() {
        let mut s = AnchorState::default();
        s.apply(&StateMutation::CalendarCommitted {
            seq: 7,
            core: "a".into(),
        });
        let restored = AnchorState::from_bytes(&s.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, s);
    }

    #[test]
    fn test_writer_applies_at_commit() {
        let mut writer = StateWriter::new(AnchorState::default());
        let handle = writer.handle();

        writer.begin_block(3, Hash::ZERO);
        assert_eq!(handle.read(|s| s.height), 3);

        writer.queue(StateMutation::CalendarCommitted {
            seq: 1,
            core: "a".into(),
        });
        writer.queue(StateMutation::CalendarCommitted {
            seq: 2,
            core: "b".into(),
        });

        assert_eq!(handle.snapshot().last_cal_seq, 0);
        assert_eq!(writer.queued(), 2);
        assert_eq!(writer.commit(), 2);
        assert_eq!(handle.snapshot().last_cal_seq, 2);
        assert_eq!(writer.queued(), 0);
    }

    #[test]
    fn test_anchor_failure_only_from_leader_before_announcement() {
        let mut s = AnchorState::default();
        s.last_cal_seq = 4;
        let r = s.pending_range().unwrap();
        s.apply(&StateMutation::EpochStarted {
            range: r,
            height: 10,
            leader: Some("leader".into()),
        });

        let failed = |core: &str| StateMutation::AnchorFailed {
            range: r,
            core: core.into(),
            root: Hash::ZERO,
        };

        // Another Core cannot abandon the epoch.
        assert!(!s.apply(&failed("other")));
        assert!(!s.is_ready());

        // Nor can the leader once its transaction is announced.
        let mut announced = s.clone();
        announced.apply(&StateMutation::AnchorAnnounced {
            range: r,
            btc_tx_id: "t1".into(),
            tx: tx_ref("a"),
        });
        assert!(!announced.apply(&failed("leader")));
        assert_eq!(announced.announced_btc_tx.as_deref(), Some("t1"));
        assert_eq!(announced.last_error_core, None);

        assert!(s.apply(&failed("leader")));
        assert!(s.is_ready());
        assert_eq!(s.begin_cal_seq, 0);
        assert_eq!(s.last_error_core, Some(CoreId::new("leader")));
        assert_eq!(s.last_error_root, Some(Hash::ZERO));
    }
}
