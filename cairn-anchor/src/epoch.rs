//! The Bitcoin anchoring engine.
//!
//! One epoch moves through these steps:
//!
//! 1. At a launch height every node plans the epoch from replicated state
//!    and elects the anchoring Core among recent calendar contributors.
//! 2. Every node aggregates the epoch's calendar roots; the leader sends a
//!    Bitcoin transaction committing the root and announces it (`BTC-A`).
//! 3. On delivery of the announcement every node recomputes the root from
//!    the calendar roots it saw committed. A mismatch resets the epoch in
//!    that same block; otherwise the node stores the fragments it needs and
//!    starts watching the transaction.
//! 4. Once the transaction has enough confirmations a validator (never the
//!    anchorer) commits a confirmation (`BTC-C`). Every node then
//!    assembles full proofs for its own hashes and the Core whose
//!    confirmation was committed pays the anchorer.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use cairn_chain::{
    confirm_meta, AnchorState, BtcAnchorPayload, BtcConfirmPayload, BtcErrorPayload, BtcFeePayload,
    ChainTx, CoreId, EpochRange, LeaderElection, NodeView, ReplicatedLog, StateHandle, TxQuery,
    TxSubmission, TxType,
};
use cairn_core::{
    Anchor, AnchorType, BtcAggFragment, BtcHeaderFragment, Hash, MerkleTree, TreeKind,
};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::calendar::{AnchoredEntry, CalendarBatch};
use crate::config::AnchorConfig;
use crate::engine::{AnchorEngine, ConfirmOutcome, EpochOutcome, EpochPhase, EpochPlan};
use crate::errors::{AnchorError, Result};
use crate::monitor::{FailureAction, FailureMonitor};
use crate::proof::{btc_header_ops, btc_tx_fragment};
use crate::provider::{BitcoinClient, BtcBlock, ProofOutput, ProofSink, RewardPayer};
use crate::store::{
    AnchorStore, BtcAggEntry, CommittedCalRoot, ConfirmedTxRecord, PendingAnchorCheck, StateStore,
};

/// External services the engine depends on.
#[derive(Clone)]
pub struct Collaborators {
    /// The replicated log.
    pub log: Arc<dyn ReplicatedLog>,
    /// Bitcoin wallet and chain.
    pub bitcoin: Arc<dyn BitcoinClient>,
    /// Reward payments.
    pub rewards: Arc<dyn RewardPayer>,
    /// Node-local store.
    pub store: Arc<dyn StateStore>,
    /// Finished proofs.
    pub proofs: Arc<dyn ProofSink>,
}

/// Anchors calendar epochs into Bitcoin.
pub struct BtcAnchorEngine {
    config: AnchorConfig,
    view: Arc<RwLock<NodeView>>,
    state: StateHandle,
    log: Arc<dyn ReplicatedLog>,
    bitcoin: Arc<dyn BitcoinClient>,
    rewards: Arc<dyn RewardPayer>,
    proofs: Arc<dyn ProofSink>,
    store: AnchorStore,
    failures: FailureMonitor,
    phases: RwLock<HashMap<EpochRange, EpochPhase>>,
    confirming: Mutex<HashSet<Hash>>,
}

impl BtcAnchorEngine {
    /// Create an engine.
    pub fn new(
        config: AnchorConfig,
        view: Arc<RwLock<NodeView>>,
        state: StateHandle,
        collaborators: Collaborators,
    ) -> Self {
        let store = AnchorStore::new(collaborators.store);
        let failures = FailureMonitor::new(
            config.clone(),
            store.clone(),
            collaborators.bitcoin.clone(),
            collaborators.log.clone(),
            view.clone(),
        );
        Self {
            config,
            view,
            state,
            log: collaborators.log,
            bitcoin: collaborators.bitcoin,
            rewards: collaborators.rewards,
            proofs: collaborators.proofs,
            store,
            failures,
            phases: RwLock::new(HashMap::new()),
            confirming: Mutex::new(HashSet::new()),
        }
    }

    /// Configuration.
    pub fn config(&self) -> &AnchorConfig {
        &self.config
    }

    /// Local anchoring data.
    pub fn store(&self) -> &AnchorStore {
        &self.store
    }

    /// Failure handling.
    pub fn failures(&self) -> &FailureMonitor {
        &self.failures
    }

    /// This node's phase for an epoch.
    pub fn phase(&self, range: &EpochRange) -> EpochPhase {
        self.phases.read().get(range).copied().unwrap_or(EpochPhase::Idle)
    }

    fn set_phase(&self, range: EpochRange, phase: EpochPhase) {
        info!(begin = range.begin, end = range.end, %phase, "Epoch phase");
        let mut phases = self.phases.write();
        if phase == EpochPhase::Idle {
            phases.remove(&range);
        } else {
            phases.insert(range, phase);
        }
    }

    fn me(&self) -> Result<CoreId> {
        self.view
            .read()
            .id
            .clone()
            .ok_or_else(|| AnchorError::Config("node identity unknown".into()))
    }

    // ------------------------------------------------------------------
    // Launch
    // ------------------------------------------------------------------

    /// Decide whether an epoch launches at `state.height`.
    ///
    /// Returns `Ok(None)` when no epoch is due. Every node reaches the same
    /// plan from the same state.
    pub fn plan_epoch(&self, state: &AnchorState) -> Result<Option<EpochPlan>> {
        let interval = self.config.anchor_interval_blocks;
        if !state.is_ready() || state.height == 0 || state.height % interval != 0 {
            return Ok(None);
        }

        let range = state.pending_range().ok_or(AnchorError::NoWork {
            begin: state.begin_cal_seq,
            end: state.last_cal_seq,
        })?;

        let blacklist: Vec<CoreId> = state.last_error_core.iter().cloned().collect();
        let election = {
            let view = self.view.read();
            LeaderElection::new(&view, state).contributor_leader(1, &blacklist)
        };
        if !election.has_leaders() {
            return Err(AnchorError::LeaderElection(format!(
                "no eligible contributor at height {}",
                state.height
            )));
        }

        Ok(Some(EpochPlan {
            range,
            height: state.height,
            btc_height: state.btc_height,
            election,
        }))
    }

    /// Aggregate the calendar roots committed in `range`.
    pub async fn aggregate(&self, range: EpochRange) -> Result<(MerkleTree, Vec<ChainTx>)> {
        let mut cal_txs = self
            .log
            .query(&TxQuery::of_type(TxType::Cal).range(range.begin, range.end))
            .await?;
        if cal_txs.is_empty() {
            return Err(AnchorError::NoWork {
                begin: range.begin,
                end: range.end,
            });
        }
        cal_txs.sort_by_key(|tx| tx.seq);

        let leaves = cal_txs
            .iter()
            .map(ChainTx::cal_root)
            .collect::<cairn_chain::Result<Vec<_>>>()?;
        let tree = MerkleTree::new(leaves, TreeKind::Chainpoint)?;
        Ok((tree, cal_txs))
    }

    async fn announce_failure(&self, root: Hash, range: EpochRange, me: CoreId) -> Result<()> {
        let payload = BtcErrorPayload {
            agg_root: root,
            cal_range_begin: range.begin,
            cal_range_end: range.end,
        };
        self.log
            .broadcast(TxSubmission::json(TxType::BtcError, &payload, me)?)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Announcement
    // ------------------------------------------------------------------

    /// Aggregate the calendar roots this node saw committed in `range`.
    ///
    /// Unlike [`aggregate`](Self::aggregate) this never leaves the node, so
    /// it can run while a block is being delivered.
    pub fn committed_aggregate(
        &self,
        range: EpochRange,
    ) -> Result<(MerkleTree, Vec<CommittedCalRoot>)> {
        let roots = self.store.cal_roots(range)?;
        if roots.is_empty() {
            return Err(AnchorError::InvalidAnnouncement(format!(
                "no calendar roots committed in {}..={}",
                range.begin, range.end
            )));
        }
        let tree = MerkleTree::new(roots.iter().map(|r| r.root).collect(), TreeKind::Chainpoint)?;
        Ok((tree, roots))
    }

    /// Validate a delivered `BTC-A` and start watching its transaction.
    ///
    /// Runs during delivery. An error that
    /// [abandons the epoch](AnchorError::abandons_epoch) leaves the store
    /// untouched; the caller resets the epoch in the same block.
    pub fn begin_tx_monitor(&self, tx: &ChainTx) -> Result<ConfirmedTxRecord> {
        let payload: BtcAnchorPayload = tx.payload()?;
        let range = EpochRange::new(payload.cal_range_begin, payload.cal_range_end).ok_or_else(|| {
            AnchorError::InvalidAnnouncement(format!(
                "empty range {}..={}",
                payload.cal_range_begin, payload.cal_range_end
            ))
        })?;

        let (tree, cal_roots) = self.committed_aggregate(range)?;
        let root = tree.root();
        if root != payload.agg_root {
            error!(
                begin = range.begin,
                end = range.end,
                announced = %payload.agg_root,
                computed = %root,
                core = %tx.core_id,
                "Announced aggregate root does not match"
            );
            self.set_phase(range, EpochPhase::Reset);
            return Err(AnchorError::AggRootMismatch {
                announced: payload.agg_root.to_hex(),
                computed: root.to_hex(),
            });
        }

        let tx_fragment = btc_tx_fragment(&payload.btc_tx_id, &payload.raw_tx, &root)
            .map_err(|e| AnchorError::InvalidAnnouncement(e.to_string()))?;
        let entries = cal_roots
            .iter()
            .enumerate()
            .map(|(i, cal)| -> Result<BtcAggEntry> {
                Ok(BtcAggEntry {
                    cal_tx_id: cal.tx_id.clone(),
                    fragment: BtcAggFragment { ops: tree.proof(i)? },
                })
            })
            .collect::<Result<Vec<_>>>()?;

        self.store.put_btc_agg(&root, &entries)?;
        self.store.put_btc_tx(&root, &tx_fragment)?;

        let record = ConfirmedTxRecord {
            btc_tx_id: payload.btc_tx_id.clone(),
            root,
            range,
            block_height: 0,
            anchorer: tx.core_id.clone(),
        };
        self.store.put_record(&record)?;

        match self.store.check(&root)? {
            Some(check) if !check.announced => {
                let mut updated = check.clone();
                updated.announced = true;
                self.store.update_check(&check, &updated)?;
            }
            Some(_) => {}
            None => {
                let btc_height = self.state.read(|s| s.btc_height);
                let am_leader = self.view.read().is_self(&tx.core_id);
                self.store.add_check(&PendingAnchorCheck {
                    root,
                    range,
                    cal_height: tx.height,
                    btc_height,
                    broadcast_btc_height: btc_height,
                    am_leader,
                    anchorer: Some(tx.core_id.clone()),
                    announced: true,
                })?;
            }
        }

        self.set_phase(range, EpochPhase::AwaitingMempool);
        info!(
            begin = range.begin,
            end = range.end,
            root = %root,
            btc_tx = %record.btc_tx_id,
            cal_txs = entries.len(),
            "Watching anchor transaction"
        );
        Ok(record)
    }

    /// Drop the local check for a root after a committed `BTC-E`.
    pub fn discard_epoch(&self, root: &Hash) -> Result<()> {
        if let Some(check) = self.store.check(root)? {
            self.store.remove_check(&check)?;
            self.set_phase(check.range, EpochPhase::Reset);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Calendar
    // ------------------------------------------------------------------

    /// Remember a committed calendar root for announcement checks.
    pub fn record_calendar(&self, tx: &ChainTx) -> Result<()> {
        let entry = CommittedCalRoot {
            seq: tx.seq,
            tx_id: tx.id.clone(),
            root: tx.cal_root()?,
        };
        self.store.record_cal_root(&entry)?;
        Ok(())
    }

    /// Forget calendar roots that can no longer be announced.
    pub fn prune_calendar(&self, state: &AnchorState) -> Result<usize> {
        let floor = state
            .current_epoch
            .map(|r| r.begin)
            .unwrap_or(state.begin_cal_seq);
        let pruned = self.store.prune_cal_roots(floor)?;
        if pruned > 0 {
            debug!(floor, pruned, "Pruned committed calendar roots");
        }
        Ok(pruned)
    }

    /// Store a calendar batch and submit its root to the log.
    pub async fn submit_calendar(&self, batch: CalendarBatch) -> Result<String> {
        let me = self.me()?;
        self.store.put_pending_calendar(&batch.root, &batch.entries)?;
        let tx_id = self.log.broadcast(TxSubmission::calendar(&batch.root, me)).await?;
        debug!(root = %batch.root, hashes = batch.len(), tx_id, "Submitted calendar root");
        Ok(tx_id)
    }

    /// Attach the calendar anchor to a committed `CAL` this node submitted
    /// and emit calendar-only proofs. Returns how many hashes it covered.
    pub fn finalize_calendar(&self, tx: &ChainTx) -> Result<usize> {
        let root = tx.cal_root()?;
        let entries = self.store.take_pending_calendar(&root)?;
        if entries.is_empty() {
            return Ok(0);
        }

        let anchor = Anchor::new(AnchorType::calendar(self.config.testnet), tx.id.clone())
            .with_uri(self.config.calendar_uri(&tx.id));
        let anchored: Vec<AnchoredEntry> = entries
            .into_iter()
            .map(|entry| entry.anchor(anchor.clone()))
            .collect();
        self.store.put_anchored(&tx.id, &anchored)?;

        let proofs: Vec<ProofOutput> = anchored
            .iter()
            .map(|entry| ProofOutput {
                proof_id: entry.header.proof_id.to_string(),
                proof: entry.proof_chain().assemble(),
            })
            .collect();
        let count = proofs.len();
        self.proofs.persist_proofs(proofs)?;
        debug!(tx_id = %tx.id, seq = tx.seq, count, "Calendar proofs ready");
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Bitcoin status
    // ------------------------------------------------------------------

    /// Whether this node reports Bitcoin fee and height at `state.height`.
    pub fn is_fee_reporter(&self, state: &AnchorState) -> bool {
        let interval = self.config.fee_interval_blocks;
        if interval == 0 || state.height == 0 || state.height % interval != 0 {
            return false;
        }
        let view = self.view.read();
        LeaderElection::new(&view, state).validator_leader(1, &[]).is_leader
    }

    /// Broadcast the current Bitcoin fee rate and height.
    pub async fn report_btc_status(&self) -> Result<BtcFeePayload> {
        let me = self.me()?;
        let fee_rate = self
            .bitcoin
            .estimate_fee_rate()
            .await?
            .max(self.config.min_fee_rate_sat_vb);
        let btc_height = self.bitcoin.block_height().await?;
        let payload = BtcFeePayload {
            fee_rate,
            btc_height,
        };
        self.log
            .broadcast(TxSubmission::json(TxType::BtcFee, &payload, me)?)
            .await?;
        debug!(fee_rate, btc_height, "Reported bitcoin status");
        Ok(payload)
    }

    // ------------------------------------------------------------------
    // Confirmation
    // ------------------------------------------------------------------

    /// Record the block height of watched transactions that were mined.
    pub async fn scan_mempool(&self) -> Result<usize> {
        let mut mined = 0;
        for record in self.store.records()?.into_iter().filter(|r| r.block_height == 0) {
            match self.bitcoin.get_transaction(&record.btc_tx_id).await {
                Ok(info) if info.block_height > 0 => {
                    let updated = ConfirmedTxRecord {
                        block_height: info.block_height,
                        ..record
                    };
                    self.store.put_record(&updated)?;
                    self.set_phase(updated.range, EpochPhase::AwaitingConfirmations);
                    info!(
                        btc_tx = %updated.btc_tx_id,
                        block = updated.block_height,
                        "Anchor transaction mined"
                    );
                    mined += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(btc_tx = %record.btc_tx_id, error = %e, "Transaction lookup failed")
                }
            }
        }
        Ok(mined)
    }

    fn is_confirm_leader(&self, anchorer: &CoreId) -> bool {
        let state = self.state.snapshot();
        let view = self.view.read();
        let election = LeaderElection::new(&view, &state);
        let mut result = election.validator_leader(1, std::slice::from_ref(anchorer));
        // A lone validator may confirm its own anchor.
        if !result.has_leaders() {
            result = election.validator_leader(1, &[]);
        }
        result.is_leader
    }

    /// Wait for a committed `BTC-C`, broadcasting one if elected.
    ///
    /// Returns `None` if the record disappeared meanwhile.
    async fn await_confirmation(
        &self,
        record: &ConfirmedTxRecord,
        block: &BtcBlock,
    ) -> Result<Option<ChainTx>> {
        let meta = confirm_meta(&record.anchorer, &record.btc_tx_id);
        let query = TxQuery::of_type(TxType::BtcConfirm).with_meta(meta.clone());
        let deadline = Instant::now() + self.config.confirm_window;
        let mut sent = false;

        loop {
            if let Some(tx) = self.log.query(&query).await?.into_iter().next() {
                return Ok(Some(tx));
            }
            if self.store.record(&record.root)?.as_ref() != Some(record) {
                return Ok(None);
            }

            if !sent && self.is_confirm_leader(&record.anchorer) {
                let payload = BtcConfirmPayload {
                    btc_header_root: block.merkle_root.clone(),
                    btc_header_height: block.height,
                };
                let submission = TxSubmission::json(TxType::BtcConfirm, &payload, self.me()?)?
                    .with_meta(meta.clone());
                match self.log.broadcast(submission).await {
                    Ok(tx_id) => {
                        sent = true;
                        info!(btc_tx = %record.btc_tx_id, tx_id, "Broadcast anchor confirmation");
                    }
                    Err(e) => warn!(
                        btc_tx = %record.btc_tx_id,
                        error = %e,
                        "Confirmation broadcast failed"
                    ),
                }
            }

            if Instant::now() >= deadline {
                return Err(AnchorError::Timeout(format!(
                    "no confirmation committed for {} within {:?}",
                    record.btc_tx_id, self.config.confirm_window
                )));
            }
            tokio::time::sleep(self.config.confirm_poll_interval).await;
        }
    }

    /// Confirm a watched transaction and emit full proofs.
    pub async fn confirm(&self, record: ConfirmedTxRecord) -> Result<Option<ConfirmOutcome>> {
        self.set_phase(record.range, EpochPhase::Confirming);

        let block = self.bitcoin.get_block_by_height(record.block_height).await?;
        let header_ops = match btc_header_ops(&record.btc_tx_id, &block) {
            Ok(ops) => ops,
            Err(e) => {
                error!(block = block.height, error = %e, "Block failed integrity check");
                return Err(e);
            }
        };

        let Some(confirm_tx) = self.await_confirmation(&record, &block).await? else {
            debug!(btc_tx = %record.btc_tx_id, "Record cleared while confirming");
            return Ok(None);
        };

        let header = BtcHeaderFragment {
            ops: header_ops,
            anchor: Anchor::new(AnchorType::bitcoin(self.config.testnet), block.height.to_string())
                .with_uri(self.config.calendar_uri(&confirm_tx.id)),
        };
        let proofs = self.construct_proof(&record.root, header).await?;
        let count = proofs.len();
        self.proofs.persist_proofs(proofs)?;

        let confirmed_by_me = self.view.read().is_self(&confirm_tx.core_id);
        if confirmed_by_me {
            self.pay_reward(record.range, record.anchorer.clone());
        }

        self.finish(&record)?;
        info!(
            begin = record.range.begin,
            end = record.range.end,
            btc_tx = %record.btc_tx_id,
            block = record.block_height,
            proofs = count,
            "Anchor confirmed"
        );
        Ok(Some(ConfirmOutcome {
            record,
            confirm_tx_id: confirm_tx.id,
            proofs: count,
        }))
    }

    fn pay_reward(&self, range: EpochRange, anchorer: CoreId) {
        self.set_phase(range, EpochPhase::Rewarding);
        let rewards = self.rewards.clone();
        let amount = self.config.reward_sats;
        tokio::spawn(async move {
            match rewards.send_payment(&anchorer, amount).await {
                Ok(()) => info!(core = %anchorer, amount, "Anchor reward paid"),
                Err(e) => warn!(core = %anchorer, amount, error = %e, "Anchor reward failed"),
            }
        });
    }

    fn finish(&self, record: &ConfirmedTxRecord) -> Result<()> {
        if let Some(check) = self.store.check(&record.root)? {
            self.store.remove_check(&check)?;
        }
        self.store.remove_record(record)?;
        for agg in self.store.btc_agg(&record.root)? {
            self.store.remove_anchored(&agg.cal_tx_id)?;
        }
        self.store.clear_btc(&record.root)?;
        self.set_phase(record.range, EpochPhase::Idle);
        Ok(())
    }
}

#[async_trait]
impl AnchorEngine for BtcAnchorEngine {
    async fn anchor_epoch(&self, plan: EpochPlan) -> Result<EpochOutcome> {
        let range = plan.range;
        self.set_phase(range, EpochPhase::Aggregating);

        let (tree, cal_txs) = match self.aggregate(range).await {
            Ok(aggregate) => aggregate,
            Err(e) => {
                self.set_phase(range, EpochPhase::Idle);
                return Err(e);
            }
        };
        let root = tree.root();
        info!(
            begin = range.begin,
            end = range.end,
            root = %root,
            cal_txs = cal_txs.len(),
            leader = ?plan.election.leaders,
            "Epoch aggregated"
        );

        self.store.add_check(&PendingAnchorCheck {
            root,
            range,
            cal_height: plan.height,
            btc_height: plan.btc_height,
            broadcast_btc_height: plan.btc_height,
            am_leader: plan.election.is_leader,
            anchorer: plan.election.leaders.first().cloned(),
            announced: false,
        })?;

        if !plan.election.is_leader {
            self.set_phase(range, EpochPhase::AwaitingMempool);
            return Ok(EpochOutcome {
                range,
                root,
                sent: None,
            });
        }

        self.set_phase(range, EpochPhase::Broadcasting);
        let me = self.me()?;
        let sent = match self.bitcoin.send_data_carrier_tx(&root).await {
            Ok(sent) => sent,
            Err(e) => {
                error!(root = %root, error = %e, "Anchor transaction failed");
                self.announce_failure(root, range, me).await?;
                self.set_phase(range, EpochPhase::Reset);
                return Err(AnchorError::Payment(e.to_string()));
            }
        };

        let payload = BtcAnchorPayload {
            agg_root: root,
            btc_tx_id: sent.tx_id.clone(),
            raw_tx: sent.raw_tx.clone(),
            cal_range_begin: range.begin,
            cal_range_end: range.end,
        };
        self.log
            .broadcast(TxSubmission::json(TxType::BtcAnchor, &payload, me)?)
            .await?;
        info!(root = %root, btc_tx = %sent.tx_id, "Anchor transaction announced");

        self.set_phase(range, EpochPhase::AwaitingMempool);
        Ok(EpochOutcome {
            range,
            root,
            sent: Some(sent),
        })
    }

    async fn monitor_confirmation(&self) -> Result<Vec<ConfirmOutcome>> {
        self.scan_mempool().await?;
        let btc_height = self.bitcoin.block_height().await?;

        let ready: Vec<ConfirmedTxRecord> = self
            .store
            .records()?
            .into_iter()
            .filter(|r| r.confirmations(btc_height) >= self.config.confirmations_required)
            .filter(|r| self.confirming.lock().insert(r.root))
            .collect();

        let results = join_all(ready.into_iter().map(|record| async move {
            let root = record.root;
            let result = self.confirm(record).await;
            self.confirming.lock().remove(&root);
            result
        }))
        .await;

        let mut outcomes = Vec::new();
        for result in results {
            match result {
                Ok(Some(outcome)) => outcomes.push(outcome),
                Ok(None) => {}
                Err(e) if e.is_retryable() => {
                    warn!(error = %e, "Confirmation attempt failed, retrying next pass")
                }
                Err(e) => error!(error = %e, "Confirmation attempt failed"),
            }
        }
        Ok(outcomes)
    }

    async fn monitor_failure(&self, state: &AnchorState) -> Result<Vec<FailureAction>> {
        let actions = self.failures.evaluate(state)?;
        self.failures.execute(actions.clone()).await;
        Ok(actions)
    }

    async fn construct_proof(
        &self,
        root: &Hash,
        header: BtcHeaderFragment,
    ) -> Result<Vec<ProofOutput>> {
        let tx_fragment = self
            .store
            .btc_tx(root)?
            .ok_or_else(|| AnchorError::Store(format!("no transaction fragment for {}", root)))?;

        let mut proofs = Vec::new();
        for agg in self.store.btc_agg(root)? {
            for entry in self.store.anchored(&agg.cal_tx_id)? {
                let chain = entry.proof_chain().with_bitcoin(
                    agg.fragment.clone(),
                    tx_fragment.clone(),
                    header.clone(),
                );
                proofs.push(ProofOutput {
                    proof_id: entry.header.proof_id.to_string(),
                    proof: chain.assemble(),
                });
            }
        }
        Ok(proofs)
    }
}
