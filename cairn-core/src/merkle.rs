//! Merkle trees for aggregation, calendar and Bitcoin block proofs.
//!
//! Two tree shapes are supported:
//!
//! - [`TreeKind::Chainpoint`]: `parent = sha256(left || right)`; an odd
//!   trailing node is promoted to the next level unchanged.
//! - [`TreeKind::Bitcoin`]: `parent = sha256d(left || right)`; an odd trailing
//!   node is paired with itself. Leaves are txids in internal byte order.
//!
//! Levels above [`PARALLEL_THRESHOLD`] nodes are hashed with Rayon.

use rayon::prelude::*;

use crate::crypto::{hash_pair, hash_pair_double, Hash};
use crate::error::{Error, Result};
use crate::ops::{replay_hash, ProofOp, Side};

/// Threshold for using parallel processing.
const PARALLEL_THRESHOLD: usize = 64;

/// Tree shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeKind {
    /// Single SHA-256, odd node promoted.
    Chainpoint,
    /// Double SHA-256, odd node duplicated.
    Bitcoin,
}

impl TreeKind {
    fn parent(self, left: &Hash, right: &Hash) -> Hash {
        match self {
            TreeKind::Chainpoint => hash_pair(left, right),
            TreeKind::Bitcoin => hash_pair_double(left, right),
        }
    }

    fn hash_step(self) -> ProofOp {
        match self {
            TreeKind::Chainpoint => ProofOp::sha256(),
            TreeKind::Bitcoin => ProofOp::sha256_x2(),
        }
    }

    fn next_level(self, level: &[Hash]) -> Vec<Hash> {
        let reduce = |pair: &[Hash]| match pair {
            [left, right] => self.parent(left, right),
            [odd] => match self {
                TreeKind::Chainpoint => *odd,
                TreeKind::Bitcoin => self.parent(odd, odd),
            },
            _ => unreachable!("chunks(2) yields one or two nodes"),
        };

        if level.len() >= PARALLEL_THRESHOLD {
            level.par_chunks(2).map(reduce).collect()
        } else {
            level.chunks(2).map(reduce).collect()
        }
    }
}

/// A fully materialised Merkle tree.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    kind: TreeKind,
    levels: Vec<Vec<Hash>>,
}

impl MerkleTree {
    /// Build a tree over `leaves`.
    pub fn new(leaves: Vec<Hash>, kind: TreeKind) -> Result<Self> {
        if leaves.is_empty() {
            return Err(Error::empty_tree());
        }

        let mut levels = vec![leaves];
        while levels.last().map_or(false, |level| level.len() > 1) {
            let next = kind.next_level(levels.last().map(Vec::as_slice).unwrap_or(&[]));
            levels.push(next);
        }

        Ok(Self { kind, levels })
    }

    /// Tree shape.
    pub fn kind(&self) -> TreeKind {
        self.kind
    }

    /// The root hash.
    pub fn root(&self) -> Hash {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or(Hash::ZERO)
    }

    /// The leaves, in insertion order.
    pub fn leaves(&self) -> &[Hash] {
        &self.levels[0]
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    /// Whether the tree has no leaves (never true for a constructed tree).
    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    /// Position of `leaf`, if present.
    pub fn position(&self, leaf: &Hash) -> Option<usize> {
        self.leaves().iter().position(|h| h == leaf)
    }

    /// Proof ops leading from leaf `index` to the root.
    pub fn proof(&self, index: usize) -> Result<Vec<ProofOp>> {
        if index >= self.len() {
            return Err(Error::leaf_not_found(format!(
                "leaf {} out of range ({} leaves)",
                index,
                self.len()
            )));
        }

        let mut ops = Vec::new();
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let is_right = idx % 2 == 1;
            let sibling_idx = if is_right { idx - 1 } else { idx + 1 };

            match (level.get(sibling_idx), self.kind) {
                (Some(sibling), _) => {
                    let side = if is_right { Side::Left } else { Side::Right };
                    ops.push(ProofOp::concat(side, sibling.as_bytes().to_vec()));
                    ops.push(self.kind.hash_step());
                }
                (None, TreeKind::Bitcoin) => {
                    ops.push(ProofOp::concat(Side::Right, level[idx].as_bytes().to_vec()));
                    ops.push(self.kind.hash_step());
                }
                // Promoted unchanged.
                (None, TreeKind::Chainpoint) => {}
            }

            idx /= 2;
        }

        Ok(ops)
    }

    /// Proof ops for a leaf value.
    pub fn proof_for(&self, leaf: &Hash) -> Result<Vec<ProofOp>> {
        let index = self
            .position(leaf)
            .ok_or_else(|| Error::leaf_not_found(format!("leaf {} not in tree", leaf)))?;
        self.proof(index)
    }

    /// Check that `ops` lead from `leaf` to `root`.
    pub fn verify(leaf: &Hash, ops: &[ProofOp], root: &Hash) -> bool {
        replay_hash(leaf, ops).as_ref() == Some(root)
    }
}

/// Compute a Bitcoin block Merkle root from display-order txids.
///
/// Returns the root in display order, comparable with a block header's
/// `merkleroot` field.
pub fn bitcoin_root_from_txids(txids: &[String]) -> Result<Hash> {
    let leaves = txids
        .iter()
        .map(|id| Hash::from_display_hex(id))
        .collect::<Result<Vec<_>>>()?;
    Ok(MerkleTree::new(leaves, TreeKind::Bitcoin)?.root().reversed())
}
