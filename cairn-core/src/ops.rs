//! Proof operations.
//!
//! A proof is a flat list of operations applied to a running byte string,
//! starting from the hash being proven:
//!
//! ```text
//! {"l": hex}          value = l || value
//! {"r": hex}          value = value || r
//! {"op": "sha-256"}   value = sha256(value)
//! {"op": "sha-256-x2"} value = sha256(sha256(value))
//! ```

use serde::{Deserialize, Serialize};

use crate::crypto::{sha256, sha256d, Hash};

/// Which side a sibling is concatenated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    /// Sibling is prepended.
    Left,
    /// Sibling is appended.
    Right,
}

/// Hash function applied by a proof step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashOp {
    /// Single SHA-256.
    #[serde(rename = "sha-256")]
    Sha256,
    /// Double SHA-256.
    #[serde(rename = "sha-256-x2")]
    Sha256x2,
}

impl HashOp {
    /// Apply this hash function to `data`.
    pub fn apply(self, data: &[u8]) -> Hash {
        match self {
            HashOp::Sha256 => sha256(data),
            HashOp::Sha256x2 => sha256d(data),
        }
    }
}

/// A single proof operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProofOp {
    /// Prepend bytes.
    Left {
        #[serde(with = "hex::serde")]
        l: Vec<u8>,
    },
    /// Append bytes.
    Right {
        #[serde(with = "hex::serde")]
        r: Vec<u8>,
    },
    /// Hash the running value.
    Hash {
        op: HashOp,
    },
}

impl ProofOp {
    /// Concatenate `bytes` on the given side.
    pub fn concat(side: Side, bytes: impl Into<Vec<u8>>) -> Self {
        match side {
            Side::Left => ProofOp::Left { l: bytes.into() },
            Side::Right => ProofOp::Right { r: bytes.into() },
        }
    }

    /// `{"op": "sha-256"}`
    pub fn sha256() -> Self {
        ProofOp::Hash { op: HashOp::Sha256 }
    }

    /// `{"op": "sha-256-x2"}`
    pub fn sha256_x2() -> Self {
        ProofOp::Hash {
            op: HashOp::Sha256x2,
        }
    }

    /// Apply this operation to a running value.
    pub fn apply(&self, value: Vec<u8>) -> Vec<u8> {
        match self {
            ProofOp::Left { l } => {
                let mut out = Vec::with_capacity(l.len() + value.len());
                out.extend_from_slice(l);
                out.extend_from_slice(&value);
                out
            }
            ProofOp::Right { r } => {
                let mut out = value;
                out.extend_from_slice(r);
                out
            }
            ProofOp::Hash { op } => op.apply(&value).as_bytes().to_vec(),
        }
    }
}

/// Replay `ops` starting from `start`, returning the final byte string.
pub fn replay<'a>(start: &[u8], ops: impl IntoIterator<Item = &'a ProofOp>) -> Vec<u8> {
    ops.into_iter()
        .fold(start.to_vec(), |value, op| op.apply(value))
}

/// Replay `ops` and interpret the result as a hash.
///
/// Returns `None` if the final value is not 32 bytes (the ops did not end in
/// a hash step).
pub fn replay_hash<'a>(start: &Hash, ops: impl IntoIterator<Item = &'a ProofOp>) -> Option<Hash> {
    let out = replay(start.as_bytes(), ops);
    Hash::from_slice(&out).ok()
}
