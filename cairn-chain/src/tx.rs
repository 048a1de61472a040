//! Transactions carried on the replicated log.
//!
//! | Tag     | Payload                                   | Meta                 |
//! |---------|-------------------------------------------|----------------------|
//! | `CAL`   | calendar root, hex                        |                      |
//! | `BTC-A` | [`BtcAnchorPayload`] (JSON)               |                      |
//! | `BTC-E` | [`BtcErrorPayload`] (JSON)                |                      |
//! | `BTC-C` | [`BtcConfirmPayload`] (JSON)              | `anchorCore\|txid`   |
//! | `BTC-F` | [`BtcFeePayload`] (JSON)                  |                      |

use std::fmt;

use cairn_core::crypto::hex_hash;
use cairn_core::Hash;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ChainError, Result};
use crate::node::CoreId;

/// Transaction type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxType {
    /// Calendar root.
    #[serde(rename = "CAL")]
    Cal,
    /// Anchor announcement.
    #[serde(rename = "BTC-A")]
    BtcAnchor,
    /// Anchor error announcement.
    #[serde(rename = "BTC-E")]
    BtcError,
    /// Anchor confirmation.
    #[serde(rename = "BTC-C")]
    BtcConfirm,
    /// Bitcoin fee and height report.
    #[serde(rename = "BTC-F")]
    BtcFee,
}

impl TxType {
    /// Wire tag.
    pub fn tag(self) -> &'static str {
        match self {
            TxType::Cal => "CAL",
            TxType::BtcAnchor => "BTC-A",
            TxType::BtcError => "BTC-E",
            TxType::BtcConfirm => "BTC-C",
            TxType::BtcFee => "BTC-F",
        }
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Announces that an epoch's root was committed to Bitcoin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtcAnchorPayload {
    /// Aggregate root of the epoch.
    #[serde(with = "hex_hash")]
    pub agg_root: Hash,
    /// Bitcoin txid, display order.
    pub btc_tx_id: String,
    /// Raw transaction body (witness stripped), hex.
    pub raw_tx: String,
    /// Epoch range start (exclusive).
    pub cal_range_begin: u64,
    /// Epoch range end (inclusive).
    pub cal_range_end: u64,
}

/// Announces that anchoring an epoch failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtcErrorPayload {
    /// Aggregate root of the failed epoch.
    #[serde(with = "hex_hash")]
    pub agg_root: Hash,
    /// Epoch range start (exclusive).
    pub cal_range_begin: u64,
    /// Epoch range end (inclusive).
    pub cal_range_end: u64,
}

/// Confirms an anchor transaction reached the required depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtcConfirmPayload {
    /// Block Merkle root, display order.
    pub btc_header_root: String,
    /// Block height.
    pub btc_header_height: u64,
}

/// Wallet fee estimate and chain height as seen by a validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtcFeePayload {
    /// Fee rate, sat/vB.
    pub fee_rate: u64,
    /// Bitcoin chain height.
    pub btc_height: u64,
}

/// Build the `BTC-C` meta field.
pub fn confirm_meta(anchor_core: &CoreId, btc_tx_id: &str) -> String {
    format!("{}|{}", anchor_core, btc_tx_id)
}

/// Split a `BTC-C` meta field into anchoring Core and txid.
pub fn parse_confirm_meta(meta: &str) -> Option<(CoreId, String)> {
    let (core, txid) = meta.split_once('|')?;
    if core.is_empty() || txid.is_empty() {
        return None;
    }
    Some((CoreId::new(core), txid.to_string()))
}

/// A transaction waiting to be broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSubmission {
    /// Type tag.
    pub tx_type: TxType,
    /// Payload.
    pub data: String,
    /// Submitting Core.
    pub core_id: CoreId,
    /// Optional metadata.
    pub meta: Option<String>,
}

impl TxSubmission {
    /// A raw submission.
    pub fn new(tx_type: TxType, data: impl Into<String>, core_id: CoreId) -> Self {
        Self {
            tx_type,
            data: data.into(),
            core_id,
            meta: None,
        }
    }

    /// A submission with a JSON payload.
    pub fn json<T: Serialize>(tx_type: TxType, payload: &T, core_id: CoreId) -> Result<Self> {
        let data = serde_json::to_string(payload).map_err(|e| ChainError::InvalidPayload {
            tx_type,
            message: e.to_string(),
        })?;
        Ok(Self::new(tx_type, data, core_id))
    }

    /// A `CAL` submission.
    pub fn calendar(root: &Hash, core_id: CoreId) -> Self {
        Self::new(TxType::Cal, root.to_hex(), core_id)
    }

    /// Attach metadata.
    pub fn with_meta(mut self, meta: impl Into<String>) -> Self {
        self.meta = Some(meta.into());
        self
    }
}

/// A committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTx {
    /// Transaction id.
    pub id: String,
    /// Log-wide sequence number.
    pub seq: u64,
    /// Block height it was committed at.
    pub height: u64,
    /// Type tag.
    pub tx_type: TxType,
    /// Payload.
    pub data: String,
    /// Submitting Core.
    pub core_id: CoreId,
    /// Optional metadata.
    pub meta: Option<String>,
}

impl ChainTx {
    /// Decode a JSON payload.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.data).map_err(|e| ChainError::InvalidPayload {
            tx_type: self.tx_type,
            message: e.to_string(),
        })
    }

    /// Decode a `CAL` root.
    pub fn cal_root(&self) -> Result<Hash> {
        Hash::from_hex(&self.data).map_err(|e| ChainError::InvalidPayload {
            tx_type: self.tx_type,
            message: e.to_string(),
        })
    }
}

/// Filter for log queries. All set fields must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxQuery {
    /// Type tag.
    pub tx_type: Option<TxType>,
    /// Sequence strictly greater than.
    pub after_seq: Option<u64>,
    /// Sequence less than or equal to.
    pub through_seq: Option<u64>,
    /// Exact meta.
    pub meta: Option<String>,
    /// Submitting Core.
    pub core_id: Option<CoreId>,
}

impl TxQuery {
    /// All transactions of a type.
    pub fn of_type(tx_type: TxType) -> Self {
        Self {
            tx_type: Some(tx_type),
            ..Default::default()
        }
    }

    /// Restrict to sequence range `(after, through]`.
    pub fn range(mut self, after: u64, through: u64) -> Self {
        self.after_seq = Some(after);
        self.through_seq = Some(through);
        self
    }

    /// Restrict to an exact meta value.
    pub fn with_meta(mut self, meta: impl Into<String>) -> Self {
        self.meta = Some(meta.into());
        self
    }

    /// Restrict to a submitting Core.
    pub fn from_core(mut self, core: CoreId) -> Self {
        self.core_id = Some(core);
        self
    }

    /// Whether `tx` satisfies this query.
    pub fn matches(&self, tx: &ChainTx) -> bool {
        self.tx_type.map_or(true, |t| t == tx.tx_type)
            && self.after_seq.map_or(true, |s| tx.seq > s)
            && self.through_seq.map_or(true, |s| tx.seq <= s)
            && self.meta.as_ref().map_or(true, |m| tx.meta.as_ref() == Some(m))
            && self.core_id.as_ref().map_or(true, |c| &tx.core_id == c)
    }
}
