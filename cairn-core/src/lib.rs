//! Cairn Core - Hashes, Merkle trees and proof documents.
//!
//! This crate provides the primitives shared by every stage of the Cairn
//! anchoring pipeline:
//!
//! - [`crypto`] - SHA-256 / double SHA-256 and the [`Hash`] type
//! - [`ops`] - Proof operations (`{"l"}`, `{"r"}`, `{"op"}`) and replay
//! - [`merkle`] - Chainpoint and Bitcoin Merkle trees
//! - [`proof`] - Typed proof fragments and the Chainpoint v4 document
//!
//! # Example
//!
//! ```rust
//! use cairn_core::{merkle::{MerkleTree, TreeKind}, crypto::sha256};
//!
//! let leaves = vec![sha256(b"a"), sha256(b"b"), sha256(b"c")];
//! let tree = MerkleTree::new(leaves.clone(), TreeKind::Chainpoint).unwrap();
//!
//! let ops = tree.proof(2).unwrap();
//! assert!(MerkleTree::verify(&leaves[2], &ops, &tree.root()));
//! ```

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod crypto;
pub mod error;
pub mod merkle;
pub mod ops;
pub mod proof;

#[cfg(test)]
mod proptest;

pub use crypto::{hash_pair, hash_pair_double, sha256, sha256d, Hash};
pub use error::{Error, ErrorCode, Result};
pub use merkle::{bitcoin_root_from_txids, MerkleTree, TreeKind};
pub use ops::{replay, replay_hash, HashOp, ProofOp, Side};
pub use proof::{
    assemble, Anchor, AnchorType, AnchorValue, AggregationFragment, BitcoinFragments, Branch,
    BranchOp, BtcAggFragment, BtcHeaderFragment, BtcTxFragment, CalendarFragment, Proof,
    ProofChain, ProofHeader,
};
