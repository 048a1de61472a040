//! Hash aggregation and calendar batching.
//!
//! Submitted hashes are bound to fresh proof ids and aggregated into a
//! batch tree; batch roots are aggregated into a calendar root, which is
//! what a `CAL` transaction carries. Each entry keeps the ops that lead
//! from its hash to that calendar root.

use cairn_core::{
    AggregationFragment, Anchor, CalendarFragment, Hash, MerkleTree, ProofChain, ProofHeader,
    ProofOp, TreeKind,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::Result;

/// One aggregated hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedHash {
    /// Hash identity.
    pub header: ProofHeader,
    /// Hash to batch root.
    pub aggregation: AggregationFragment,
}

/// A batch of hashes under one aggregation root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationBatch {
    /// Batch root.
    pub root: Hash,
    /// Per-hash fragments.
    pub hashes: Vec<AggregatedHash>,
}

/// Builds aggregation batches.
pub struct Aggregator;

impl Aggregator {
    /// Aggregate freshly received hashes, assigning new proof ids.
    pub fn aggregate(hashes: &[Hash]) -> Result<AggregationBatch> {
        let received = Utc::now();
        let headers = hashes
            .iter()
            .map(|h| ProofHeader::new(*h, Uuid::new_v4(), received))
            .collect();
        Self::aggregate_headers(headers)
    }

    /// Aggregate hashes whose identity is already fixed.
    pub fn aggregate_headers(headers: Vec<ProofHeader>) -> Result<AggregationBatch> {
        let leaves = headers.iter().map(ProofHeader::leaf).collect();
        let tree = MerkleTree::new(leaves, TreeKind::Chainpoint)?;

        let hashes = headers
            .into_iter()
            .enumerate()
            .map(|(i, header)| -> Result<AggregatedHash> {
                let mut ops: Vec<ProofOp> = header.binding_ops().to_vec();
                ops.extend(tree.proof(i)?);
                Ok(AggregatedHash {
                    header,
                    aggregation: AggregationFragment { ops },
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(AggregationBatch {
            root: tree.root(),
            hashes,
        })
    }
}

/// A hash aggregated into a calendar root that is not yet committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEntry {
    /// Hash identity.
    pub header: ProofHeader,
    /// Hash to batch root.
    pub aggregation: AggregationFragment,
    /// Batch root to calendar root.
    pub cal_ops: Vec<ProofOp>,
}

impl CalendarEntry {
    /// Attach the calendar anchor once the `CAL` transaction is committed.
    pub fn anchor(self, anchor: Anchor) -> AnchoredEntry {
        AnchoredEntry {
            header: self.header,
            aggregation: self.aggregation,
            calendar: CalendarFragment {
                ops: self.cal_ops,
                anchor,
            },
        }
    }
}

/// A hash anchored in a committed calendar transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchoredEntry {
    /// Hash identity.
    pub header: ProofHeader,
    /// Hash to batch root.
    pub aggregation: AggregationFragment,
    /// Batch root to calendar root.
    pub calendar: CalendarFragment,
}

impl AnchoredEntry {
    /// The calendar-only proof chain.
    pub fn proof_chain(&self) -> ProofChain {
        ProofChain::new(
            self.header.clone(),
            self.aggregation.clone(),
            self.calendar.clone(),
        )
    }
}

/// Batches aggregated into one calendar root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarBatch {
    /// Calendar root.
    pub root: Hash,
    /// Every hash under the root.
    pub entries: Vec<CalendarEntry>,
}

impl CalendarBatch {
    /// Aggregate batch roots into a calendar root.
    pub fn build(batches: Vec<AggregationBatch>) -> Result<Self> {
        let tree = MerkleTree::new(
            batches.iter().map(|b| b.root).collect(),
            TreeKind::Chainpoint,
        )?;

        let mut entries = Vec::new();
        for (i, batch) in batches.into_iter().enumerate() {
            let cal_ops = tree.proof(i)?;
            entries.extend(batch.hashes.into_iter().map(|h| CalendarEntry {
                header: h.header,
                aggregation: h.aggregation,
                cal_ops: cal_ops.clone(),
            }));
        }

        Ok(Self {
            root: tree.root(),
            entries,
        })
    }

    /// Number of hashes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch holds no hashes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::{replay_hash, sha256, AnchorType};

    #[test]
    fn test_aggregate_binds_proof_ids() {
        let hashes = vec![sha256(b"a"), sha256(b"b"), sha256(b"c")];
        let batch = Aggregator::aggregate(&hashes).unwrap();
        assert_eq!(batch.hashes.len(), 3);

        for h in &batch.hashes {
            assert_eq!(replay_hash(&h.header.hash, &h.aggregation.ops), Some(batch.root));
        }
        // Same hash, different proof id, different leaf.
        let again = Aggregator::aggregate(&hashes[..1]).unwrap();
        assert_ne!(again.root, batch.hashes[0].header.leaf());
    }

    #[test]
    fn test_calendar_batch_reaches_root() {
        let a = Aggregator::aggregate(&[sha256(b"1"), sha256(b"2")]).unwrap();
        let b = Aggregator::aggregate(&[sha256(b"3")]).unwrap();
        let cal = CalendarBatch::build(vec![a, b]).unwrap();
        assert_eq!(cal.len(), 3);

        for entry in &cal.entries {
            let ops: Vec<ProofOp> = entry
                .aggregation
                .ops
                .iter()
                .chain(entry.cal_ops.iter())
                .cloned()
                .collect();
            assert_eq!(replay_hash(&entry.header.hash, &ops), Some(cal.root));
        }
    }

    #[test]
    fn test_anchored_entry_proof() {
        let batch = Aggregator::aggregate(&[sha256(b"doc")]).unwrap();
        let cal = CalendarBatch::build(vec![batch]).unwrap();
        let entry = cal.entries[0]
            .clone()
            .anchor(Anchor::new(AnchorType::Cal, "tx-9"));

        let proof = entry.proof_chain().assemble();
        let values = proof.anchor_values().unwrap();
        assert_eq!(values[0].value, cal.root.to_hex());
    }

    #[test]
    fn test_empty_rejected() {
        assert!(Aggregator::aggregate(&[]).is_err());
        assert!(CalendarBatch::build(vec![]).is_err());
    }
}
