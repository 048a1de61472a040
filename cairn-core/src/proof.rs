//! Chainpoint proof documents.
//!
//! A proof is assembled from typed fragments, one per pipeline stage:
//!
//! ```text
//! hash ─[Aggregation]─> batch root ─[Calendar]─> calendar root  (cal anchor)
//!      └─[BtcAgg]─> anchored root ─[BtcTx]─> txid ─[BtcHeader]─> block root  (btc anchor)
//! ```
//!
//! The serialized document nests the Bitcoin branch inside the calendar
//! branch, so a verifier replaying the ops reaches the calendar anchor first
//! and then continues into the Bitcoin branch.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::Hash;
use crate::error::{Error, Result};
use crate::ops::{replay, ProofOp, Side};

/// JSON-LD context of the proof document.
pub const CHAINPOINT_CONTEXT: &str = "https://w3id.org/chainpoint/v4";

/// Document type.
pub const CHAINPOINT_TYPE: &str = "Chainpoint";

/// Label of the calendar branch.
pub const CAL_BRANCH: &str = "cal_anchor_branch";

/// Label of the Bitcoin branch.
pub const BTC_BRANCH: &str = "btc_anchor_branch";

/// Anchor type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorType {
    /// Calendar anchor.
    Cal,
    /// Calendar anchor on a test network.
    Tcal,
    /// Bitcoin mainnet anchor.
    Btc,
    /// Bitcoin testnet anchor.
    Tbtc,
}

impl AnchorType {
    /// Calendar anchor type for the network.
    pub fn calendar(testnet: bool) -> Self {
        if testnet {
            AnchorType::Tcal
        } else {
            AnchorType::Cal
        }
    }

    /// Bitcoin anchor type for the network.
    pub fn bitcoin(testnet: bool) -> Self {
        if testnet {
            AnchorType::Tbtc
        } else {
            AnchorType::Btc
        }
    }

    /// Whether this anchors into Bitcoin.
    pub fn is_bitcoin(self) -> bool {
        matches!(self, AnchorType::Btc | AnchorType::Tbtc)
    }
}

/// An anchor point inside a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    /// Anchor type.
    #[serde(rename = "type")]
    pub anchor_type: AnchorType,
    /// Calendar tx id or Bitcoin block height.
    pub anchor_id: String,
    /// Where the anchored value can be looked up.
    pub uris: Vec<String>,
}

impl Anchor {
    /// Create an anchor.
    pub fn new(anchor_type: AnchorType, anchor_id: impl Into<String>) -> Self {
        Self {
            anchor_type,
            anchor_id: anchor_id.into(),
            uris: Vec::new(),
        }
    }

    /// Add a lookup URI.
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uris.push(uri.into());
        self
    }
}

/// An entry in a branch's op list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BranchOp {
    /// A concat or hash step.
    Step(ProofOp),
    /// Anchor marker: the running value at this point is anchored.
    Anchors {
        /// Anchors for the current value.
        anchors: Vec<Anchor>,
    },
}

/// A labelled branch of ops, optionally with nested branches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// Branch label.
    pub label: String,
    /// Ops in order.
    pub ops: Vec<BranchOp>,
    /// Branches continuing from the value at the end of `ops`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<Branch>,
}

impl Branch {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            ops: Vec::new(),
            branches: Vec::new(),
        }
    }

    fn extend_steps(&mut self, ops: &[ProofOp]) {
        self.ops.extend(ops.iter().cloned().map(BranchOp::Step));
    }

    fn push_anchor(&mut self, anchor: Anchor) {
        self.ops.push(BranchOp::Anchors {
            anchors: vec![anchor],
        });
    }
}

/// A complete proof document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// JSON-LD context.
    #[serde(rename = "@context")]
    pub context: String,
    /// Document type.
    #[serde(rename = "type")]
    pub proof_type: String,
    /// The proven hash, hex.
    pub hash: String,
    /// Proof identifier.
    pub proof_id: String,
    /// When the hash was received (RFC 3339, seconds).
    pub hash_received: String,
    /// Top-level branches.
    pub branches: Vec<Branch>,
}

/// An anchor together with the value the proof computes for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorValue {
    /// The anchor.
    pub anchor: Anchor,
    /// Computed value, hex. Bitcoin anchors are reported in display order so
    /// they compare directly with a block header's Merkle root.
    pub value: String,
}

impl Proof {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Replay every branch and collect the value at each anchor.
    pub fn anchor_values(&self) -> Result<Vec<AnchorValue>> {
        let start = hex::decode(&self.hash)?;
        let mut out = Vec::new();
        for branch in &self.branches {
            collect_anchor_values(branch, start.clone(), &mut out)?;
        }
        Ok(out)
    }

    /// The Bitcoin anchor value, if the proof reaches Bitcoin.
    pub fn btc_anchor_value(&self) -> Result<Option<AnchorValue>> {
        Ok(self
            .anchor_values()?
            .into_iter()
            .find(|v| v.anchor.anchor_type.is_bitcoin()))
    }
}

fn collect_anchor_values(
    branch: &Branch,
    mut value: Vec<u8>,
    out: &mut Vec<AnchorValue>,
) -> Result<()> {
    for op in &branch.ops {
        match op {
            BranchOp::Step(step) => value = step.apply(value),
            BranchOp::Anchors { anchors } => {
                let hash = Hash::from_slice(&value).map_err(|_| {
                    Error::invalid_proof(format!(
                        "anchor in branch {} reached before a hash step",
                        branch.label
                    ))
                })?;
                for anchor in anchors {
                    let computed = if anchor.anchor_type.is_bitcoin() {
                        hash.to_display_hex()
                    } else {
                        hash.to_hex()
                    };
                    out.push(AnchorValue {
                        anchor: anchor.clone(),
                        value: computed,
                    });
                }
            }
        }
    }
    for child in &branch.branches {
        collect_anchor_values(child, value.clone(), out)?;
    }
    Ok(())
}

// ============================================================================
// Fragments
// ============================================================================

/// Identity of a proven hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofHeader {
    /// The submitted hash.
    pub hash: Hash,
    /// Proof identifier.
    pub proof_id: Uuid,
    /// When the hash was received.
    pub hash_received: DateTime<Utc>,
}

impl ProofHeader {
    /// Create a header.
    pub fn new(hash: Hash, proof_id: Uuid, hash_received: DateTime<Utc>) -> Self {
        Self {
            hash,
            proof_id,
            hash_received,
        }
    }

    /// Aggregation leaf for this hash: `sha256(proof_id_bytes || hash)`.
    pub fn leaf(&self) -> Hash {
        crate::crypto::sha256_all(&[
            self.proof_id.as_bytes().as_slice(),
            self.hash.as_bytes().as_slice(),
        ])
    }

    /// The ops binding the proof id to the hash.
    pub fn binding_ops(&self) -> [ProofOp; 2] {
        [
            ProofOp::concat(Side::Left, self.proof_id.as_bytes().to_vec()),
            ProofOp::sha256(),
        ]
    }
}

/// Input hash to aggregation batch root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationFragment {
    /// Ops, starting with the proof-id binding.
    pub ops: Vec<ProofOp>,
}

/// Batch root to calendar root, with the calendar anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarFragment {
    /// Ops.
    pub ops: Vec<ProofOp>,
    /// Calendar anchor.
    pub anchor: Anchor,
}

/// Calendar root to the root committed on Bitcoin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtcAggFragment {
    /// Ops.
    pub ops: Vec<ProofOp>,
}

/// Committed root to Bitcoin txid (internal byte order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtcTxFragment {
    /// `{l: prefix}, {r: suffix}, sha-256-x2`.
    pub ops: Vec<ProofOp>,
}

impl BtcTxFragment {
    /// Split a raw transaction around the committed root.
    ///
    /// Fails if `root` does not appear in the transaction body.
    pub fn from_raw_tx(raw_tx: &[u8], root: &Hash) -> Result<Self> {
        let needle = root.as_bytes();
        let pos = raw_tx
            .windows(needle.len())
            .position(|w| w == needle)
            .ok_or_else(|| Error::invalid_proof(format!("root {} not found in tx body", root)))?;

        Ok(Self {
            ops: vec![
                ProofOp::concat(Side::Left, raw_tx[..pos].to_vec()),
                ProofOp::concat(Side::Right, raw_tx[pos + needle.len()..].to_vec()),
                ProofOp::sha256_x2(),
            ],
        })
    }
}

/// Txid to block Merkle root, with the Bitcoin anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtcHeaderFragment {
    /// Ops.
    pub ops: Vec<ProofOp>,
    /// Bitcoin anchor (anchor id is the block height).
    pub anchor: Anchor,
}

/// The Bitcoin stages of a proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitcoinFragments {
    /// Calendar root to committed root.
    pub aggregation: BtcAggFragment,
    /// Committed root to txid.
    pub transaction: BtcTxFragment,
    /// Txid to block root.
    pub header: BtcHeaderFragment,
}

/// Typed fragments for one hash, ready to be assembled into a [`Proof`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofChain {
    /// Who and when.
    pub header: ProofHeader,
    /// Hash to batch root.
    pub aggregation: AggregationFragment,
    /// Batch root to calendar root.
    pub calendar: CalendarFragment,
    /// Calendar root to Bitcoin block root.
    pub bitcoin: Option<BitcoinFragments>,
}

impl ProofChain {
    /// A calendar-only chain.
    pub fn new(
        header: ProofHeader,
        aggregation: AggregationFragment,
        calendar: CalendarFragment,
    ) -> Self {
        Self {
            header,
            aggregation,
            calendar,
            bitcoin: None,
        }
    }

    /// Attach the Bitcoin stages.
    pub fn with_bitcoin(
        mut self,
        aggregation: BtcAggFragment,
        transaction: BtcTxFragment,
        header: BtcHeaderFragment,
    ) -> Self {
        self.bitcoin = Some(BitcoinFragments {
            aggregation,
            transaction,
            header,
        });
        self
    }

    /// Build the proof document.
    ///
    /// Assembly is a pure function of the fragments: the same fragments
    /// always produce byte-identical JSON.
    pub fn assemble(&self) -> Proof {
        let mut cal = Branch::new(CAL_BRANCH);
        cal.extend_steps(&self.aggregation.ops);
        cal.extend_steps(&self.calendar.ops);
        cal.push_anchor(self.calendar.anchor.clone());

        if let Some(btc) = &self.bitcoin {
            let mut branch = Branch::new(BTC_BRANCH);
            branch.extend_steps(&btc.aggregation.ops);
            branch.extend_steps(&btc.transaction.ops);
            branch.extend_steps(&btc.header.ops);
            branch.push_anchor(btc.header.anchor.clone());
            cal.branches.push(branch);
        }

        Proof {
            context: CHAINPOINT_CONTEXT.to_string(),
            proof_type: CHAINPOINT_TYPE.to_string(),
            hash: self.header.hash.to_hex(),
            proof_id: self.header.proof_id.to_string(),
            hash_received: self
                .header
                .hash_received
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            branches: vec![cal],
        }
    }

    /// The value reached at the end of the calendar stage.
    pub fn calendar_root(&self) -> Option<Hash> {
        let ops = self.aggregation.ops.iter().chain(self.calendar.ops.iter());
        Hash::from_slice(&replay(self.header.hash.as_bytes(), ops)).ok()
    }
}

/// Assemble a proof from its fragments.
///
/// Without Bitcoin stages the proof ends at the calendar anchor.
pub fn assemble(
    header: ProofHeader,
    aggregation: AggregationFragment,
    calendar: CalendarFragment,
    bitcoin: Option<(BtcAggFragment, BtcTxFragment, BtcHeaderFragment)>,
) -> Proof {
    let chain = ProofChain::new(header, aggregation, calendar);
    match bitcoin {
        Some((agg, tx, head)) => chain.with_bitcoin(agg, tx, head).assemble(),
        None => chain.assemble(),
    }
}
