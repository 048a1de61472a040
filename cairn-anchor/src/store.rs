//! Local anchoring state.
//!
//! Pending checks, transaction records and proof fragments live in a
//! node-local list store. Nothing here is replicated: each Core tracks the
//! anchors it is waiting on and the fragments for the hashes it aggregated.

use std::collections::HashMap;
use std::sync::Arc;

use cairn_chain::{CoreId, EpochRange};
use cairn_core::crypto::hex_hash;
use cairn_core::{BtcAggFragment, BtcTxFragment, Hash};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::calendar::{AnchoredEntry, CalendarEntry};
use crate::errors::{AnchorError, Result};

/// A node-local key/list store.
pub trait StateStore: Send + Sync {
    /// Append `value` to the list at `key`.
    fn append(&self, key: &str, value: &str) -> Result<()>;

    /// Every value in the list at `key`, in insertion order.
    fn get_list(&self, key: &str) -> Result<Vec<String>>;

    /// Remove every occurrence of `value` from the list at `key`.
    fn delete_value(&self, key: &str, value: &str) -> Result<()>;

    /// Store an opaque blob.
    fn put_blob(&self, key: &str, blob: &[u8]) -> Result<()>;

    /// Fetch an opaque blob.
    fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

/// In-memory [`StateStore`].
#[derive(Default)]
pub struct MemStore {
    lists: RwLock<HashMap<String, Vec<String>>>,
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemStore {
    fn append(&self, key: &str, value: &str) -> Result<()> {
        self.lists
            .write()
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
        Ok(())
    }

    fn get_list(&self, key: &str) -> Result<Vec<String>> {
        Ok(self.lists.read().get(key).cloned().unwrap_or_default())
    }

    fn delete_value(&self, key: &str, value: &str) -> Result<()> {
        let mut lists = self.lists.write();
        if let Some(list) = lists.get_mut(key) {
            list.retain(|v| v != value);
            if list.is_empty() {
                lists.remove(key);
            }
        }
        Ok(())
    }

    fn put_blob(&self, key: &str, blob: &[u8]) -> Result<()> {
        self.blobs.write().insert(key.to_string(), blob.to_vec());
        Ok(())
    }

    fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().get(key).cloned())
    }
}

/// Tracks an epoch this node expects to see anchored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAnchorCheck {
    /// Aggregate root of the epoch.
    #[serde(with = "hex_hash")]
    pub root: Hash,
    /// Epoch range.
    pub range: EpochRange,
    /// Calendar height the epoch was launched at.
    pub cal_height: u64,
    /// Bitcoin height baseline for replace-by-fee; moved forward on RBF.
    pub btc_height: u64,
    /// Bitcoin height when the epoch was launched.
    pub broadcast_btc_height: u64,
    /// Whether this node is the anchoring leader.
    pub am_leader: bool,
    /// Elected anchoring Core.
    pub anchorer: Option<CoreId>,
    /// Whether the anchor announcement has been observed.
    pub announced: bool,
}

/// An announced anchor transaction being watched on Bitcoin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedTxRecord {
    /// Txid, display order.
    pub btc_tx_id: String,
    /// Aggregate root committed by the transaction.
    #[serde(with = "hex_hash")]
    pub root: Hash,
    /// Epoch range.
    pub range: EpochRange,
    /// Containing block height; `0` while in the mempool.
    pub block_height: u64,
    /// Core that broadcast the announcement.
    pub anchorer: CoreId,
}

impl ConfirmedTxRecord {
    /// Confirmations at `btc_height`. Zero while unmined.
    pub fn confirmations(&self, btc_height: u64) -> u64 {
        if self.block_height == 0 || btc_height < self.block_height {
            return 0;
        }
        btc_height - self.block_height + 1
    }
}

/// A calendar root as committed to the log.
///
/// Every node records these on delivery, so an announced epoch can be
/// checked without leaving the block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedCalRoot {
    /// Log sequence.
    pub seq: u64,
    /// Calendar transaction id.
    pub tx_id: String,
    /// Calendar root.
    #[serde(with = "hex_hash")]
    pub root: Hash,
}

/// A calendar transaction's path to the anchored root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtcAggEntry {
    /// Calendar transaction id.
    pub cal_tx_id: String,
    /// Calendar root to anchored root.
    pub fragment: BtcAggFragment,
}

const CHECKS_KEY: &str = "anchor:checks";
const RECORDS_KEY: &str = "anchor:records";
const STATE_KEY: &str = "anchor:state";
const CAL_ROOTS_KEY: &str = "cal:roots";

fn btc_agg_key(root: &Hash) -> String {
    format!("anchor:btc_agg:{}", root)
}

fn btc_tx_key(root: &Hash) -> String {
    format!("anchor:btc_tx:{}", root)
}

fn cal_pending_key(cal_root: &Hash) -> String {
    format!("cal:pending:{}", cal_root)
}

fn cal_entries_key(cal_tx_id: &str) -> String {
    format!("cal:entries:{}", cal_tx_id)
}

/// Typed access to anchoring data in a [`StateStore`].
#[derive(Clone)]
pub struct AnchorStore {
    inner: Arc<dyn StateStore>,
}

impl AnchorStore {
    /// Wrap a store.
    pub fn new(inner: Arc<dyn StateStore>) -> Self {
        Self { inner }
    }

    fn list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        self.inner
            .get_list(key)?
            .iter()
            .map(|v| serde_json::from_str(v).map_err(AnchorError::from))
            .collect()
    }

    fn push<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.inner.append(key, &serde_json::to_string(value)?)
    }

    fn remove<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.inner.delete_value(key, &serde_json::to_string(value)?)
    }

    fn clear(&self, key: &str) -> Result<()> {
        for value in self.inner.get_list(key)? {
            self.inner.delete_value(key, &value)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Pending checks
    // ------------------------------------------------------------------

    /// All pending checks.
    pub fn checks(&self) -> Result<Vec<PendingAnchorCheck>> {
        self.list(CHECKS_KEY)
    }

    /// The pending check for `root`.
    pub fn check(&self, root: &Hash) -> Result<Option<PendingAnchorCheck>> {
        Ok(self.checks()?.into_iter().find(|c| &c.root == root))
    }

    /// Register a pending check. An existing check for the same root is kept.
    pub fn add_check(&self, check: &PendingAnchorCheck) -> Result<bool> {
        if self.check(&check.root)?.is_some() {
            return Ok(false);
        }
        self.push(CHECKS_KEY, check)?;
        Ok(true)
    }

    /// Replace a check with an updated copy.
    pub fn update_check(&self, old: &PendingAnchorCheck, new: &PendingAnchorCheck) -> Result<()> {
        self.remove(CHECKS_KEY, old)?;
        self.push(CHECKS_KEY, new)
    }

    /// Delete a check.
    pub fn remove_check(&self, check: &PendingAnchorCheck) -> Result<()> {
        self.remove(CHECKS_KEY, check)
    }

    // ------------------------------------------------------------------
    // Transaction records
    // ------------------------------------------------------------------

    /// All transaction records.
    pub fn records(&self) -> Result<Vec<ConfirmedTxRecord>> {
        self.list(RECORDS_KEY)
    }

    /// The record for `root`.
    pub fn record(&self, root: &Hash) -> Result<Option<ConfirmedTxRecord>> {
        Ok(self.records()?.into_iter().find(|r| &r.root == root))
    }

    /// Register a record, replacing any earlier record for the same root.
    pub fn put_record(&self, record: &ConfirmedTxRecord) -> Result<()> {
        if let Some(existing) = self.record(&record.root)? {
            self.remove(RECORDS_KEY, &existing)?;
        }
        self.push(RECORDS_KEY, record)
    }

    /// Delete a record.
    pub fn remove_record(&self, record: &ConfirmedTxRecord) -> Result<()> {
        self.remove(RECORDS_KEY, record)
    }

    // ------------------------------------------------------------------
    // Bitcoin fragments
    // ------------------------------------------------------------------

    /// Store the calendar-to-root fragments for an anchored root.
    pub fn put_btc_agg(&self, root: &Hash, entries: &[BtcAggEntry]) -> Result<()> {
        let key = btc_agg_key(root);
        self.clear(&key)?;
        for entry in entries {
            self.push(&key, entry)?;
        }
        Ok(())
    }

    /// Calendar-to-root fragments for an anchored root.
    pub fn btc_agg(&self, root: &Hash) -> Result<Vec<BtcAggEntry>> {
        self.list(&btc_agg_key(root))
    }

    /// Store the root-to-txid fragment, replacing any earlier one.
    pub fn put_btc_tx(&self, root: &Hash, fragment: &BtcTxFragment) -> Result<()> {
        let key = btc_tx_key(root);
        self.clear(&key)?;
        self.push(&key, fragment)
    }

    /// Root-to-txid fragment.
    pub fn btc_tx(&self, root: &Hash) -> Result<Option<BtcTxFragment>> {
        Ok(self.list(&btc_tx_key(root))?.into_iter().next())
    }

    /// Drop all Bitcoin fragments for a root.
    pub fn clear_btc(&self, root: &Hash) -> Result<()> {
        self.clear(&btc_agg_key(root))?;
        self.clear(&btc_tx_key(root))
    }

    // ------------------------------------------------------------------
    // Calendar entries
    // ------------------------------------------------------------------

    /// Store entries aggregated into a calendar root not yet committed.
    pub fn put_pending_calendar(&self, cal_root: &Hash, entries: &[CalendarEntry]) -> Result<()> {
        let key = cal_pending_key(cal_root);
        for entry in entries {
            self.push(&key, entry)?;
        }
        Ok(())
    }

    /// Take the pending entries for a calendar root.
    pub fn take_pending_calendar(&self, cal_root: &Hash) -> Result<Vec<CalendarEntry>> {
        let key = cal_pending_key(cal_root);
        let entries = self.list(&key)?;
        self.clear(&key)?;
        Ok(entries)
    }

    /// Store entries anchored in a committed calendar transaction.
    pub fn put_anchored(&self, cal_tx_id: &str, entries: &[AnchoredEntry]) -> Result<()> {
        let key = cal_entries_key(cal_tx_id);
        for entry in entries {
            self.push(&key, entry)?;
        }
        Ok(())
    }

    /// Entries anchored in a calendar transaction.
    pub fn anchored(&self, cal_tx_id: &str) -> Result<Vec<AnchoredEntry>> {
        self.list(&cal_entries_key(cal_tx_id))
    }

    /// Drop the entries anchored in a calendar transaction.
    pub fn remove_anchored(&self, cal_tx_id: &str) -> Result<()> {
        self.clear(&cal_entries_key(cal_tx_id))
    }

    /// Record a committed calendar root. Redelivery is a no-op.
    pub fn record_cal_root(&self, entry: &CommittedCalRoot) -> Result<bool> {
        let known: Vec<CommittedCalRoot> = self.list(CAL_ROOTS_KEY)?;
        if known.iter().any(|e| e.seq == entry.seq) {
            return Ok(false);
        }
        self.push(CAL_ROOTS_KEY, entry)?;
        Ok(true)
    }

    /// Committed calendar roots in `range`, by sequence.
    pub fn cal_roots(&self, range: EpochRange) -> Result<Vec<CommittedCalRoot>> {
        let mut roots: Vec<CommittedCalRoot> = self
            .list::<CommittedCalRoot>(CAL_ROOTS_KEY)?
            .into_iter()
            .filter(|e| range.contains(e.seq))
            .collect();
        roots.sort_by_key(|e| e.seq);
        Ok(roots)
    }

    /// Drop committed calendar roots at or below `seq`. Returns how many.
    pub fn prune_cal_roots(&self, seq: u64) -> Result<usize> {
        let stale: Vec<CommittedCalRoot> = self
            .list::<CommittedCalRoot>(CAL_ROOTS_KEY)?
            .into_iter()
            .filter(|e| e.seq <= seq)
            .collect();
        for entry in &stale {
            self.remove(CAL_ROOTS_KEY, entry)?;
        }
        Ok(stale.len())
    }

    // ------------------------------------------------------------------
    // State blob
    // ------------------------------------------------------------------

    /// Persist the replicated state blob.
    pub fn save_state(&self, blob: &[u8]) -> Result<()> {
        self.inner.put_blob(STATE_KEY, blob)
    }

    /// Load the replicated state blob.
    pub fn load_state(&self) -> Result<Option<Vec<u8>>> {
        self.inner.get_blob(STATE_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{Aggregator, CalendarBatch};
    use cairn_core::{sha256, Anchor, AnchorType};

    fn store() -> AnchorStore {
        AnchorStore::new(Arc::new(MemStore::new()))
    }

    fn check(root: Hash) -> PendingAnchorCheck {
        PendingAnchorCheck {
            root,
            range: EpochRange::new(0, 10).unwrap(),
            cal_height: 60,
            btc_height: 800,
            broadcast_btc_height: 800,
            am_leader: true,
            anchorer: Some("a".into()),
            announced: false,
        }
    }

    #[test]
    fn test_mem_store_lists() {
        let s = MemStore::new();
        s.append("k", "a").unwrap();
        s.append("k", "b").unwrap();
        s.append("k", "a").unwrap();
        assert_eq!(s.get_list("k").unwrap(), vec!["a", "b", "a"]);

        s.delete_value("k", "a").unwrap();
        assert_eq!(s.get_list("k").unwrap(), vec!["b"]);
        assert!(s.get_list("missing").unwrap().is_empty());
    }

    #[test]
    fn test_checks_unique_by_root() {
        let s = store();
        let c = check(sha256(b"root"));
        assert!(s.add_check(&c).unwrap());
        assert!(!s.add_check(&c).unwrap());

        let mut updated = c.clone();
        updated.announced = true;
        s.update_check(&c, &updated).unwrap();
        assert_eq!(s.check(&c.root).unwrap(), Some(updated.clone()));

        s.remove_check(&updated).unwrap();
        assert!(s.checks().unwrap().is_empty());
    }

    #[test]
    fn test_record_replaced_per_root() {
        let s = store();
        let root = sha256(b"root");
        let mut record = ConfirmedTxRecord {
            btc_tx_id: "t1".into(),
            root,
            range: EpochRange::new(0, 10).unwrap(),
            block_height: 0,
            anchorer: "a".into(),
        };
        s.put_record(&record).unwrap();
        record.btc_tx_id = "t2".into();
        s.put_record(&record).unwrap();

        let records = s.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].btc_tx_id, "t2");
    }

    #[test]
    fn test_confirmations() {
        let mut record = ConfirmedTxRecord {
            btc_tx_id: "t".into(),
            root: Hash::ZERO,
            range: EpochRange::new(0, 1).unwrap(),
            block_height: 0,
            anchorer: "a".into(),
        };
        assert_eq!(record.confirmations(900), 0);
        record.block_height = 895;
        assert_eq!(record.confirmations(900), 6);
        assert_eq!(record.confirmations(895), 1);
        assert_eq!(record.confirmations(890), 0);
    }

    #[test]
    fn test_anchored_entries_removed() {
        let s = store();
        let hashes = [sha256(b"doc-1"), sha256(b"doc-2")];
        let batch =
            CalendarBatch::build(vec![Aggregator::aggregate(&hashes).unwrap()]).unwrap();
        let anchor = Anchor::new(AnchorType::calendar(true), "cal-1");
        let entries: Vec<AnchoredEntry> = batch
            .entries
            .into_iter()
            .map(|e| e.anchor(anchor.clone()))
            .collect();

        s.put_anchored("cal-1", &entries).unwrap();
        s.put_anchored("cal-2", &entries[..1]).unwrap();
        assert_eq!(s.anchored("cal-1").unwrap().len(), 2);

        s.remove_anchored("cal-1").unwrap();
        assert!(s.anchored("cal-1").unwrap().is_empty());
        assert_eq!(s.anchored("cal-2").unwrap().len(), 1);
    }

    #[test]
    fn test_cal_roots_by_range() {
        let s = store();
        for seq in [5u64, 2, 9, 12] {
            let entry = CommittedCalRoot {
                seq,
                tx_id: format!("cal-{}", seq),
                root: sha256(&seq.to_be_bytes()),
            };
            assert!(s.record_cal_root(&entry).unwrap());
            assert!(!s.record_cal_root(&entry).unwrap());
        }

        let seqs: Vec<u64> = s
            .cal_roots(EpochRange::new(2, 10).unwrap())
            .unwrap()
            .iter()
            .map(|e| e.seq)
            .collect();
        assert_eq!(seqs, vec![5, 9]);

        assert_eq!(s.prune_cal_roots(9).unwrap(), 3);
        let left = s.cal_roots(EpochRange::new(0, 100).unwrap()).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].seq, 12);
    }

    #[test]
    fn test_state_blob() {
        let s = store();
        assert!(s.load_state().unwrap().is_none());
        s.save_state(&[1, 2, 3]).unwrap();
        assert_eq!(s.load_state().unwrap(), Some(vec![1, 2, 3]));
    }
}
