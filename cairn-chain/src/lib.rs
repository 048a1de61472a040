//! Cairn Chain - leader election and replicated anchor state.
//!
//! This crate is the bridge between the replicated transaction log and the
//! anchoring engine:
//!
//! - [`election`] - Deterministic seeded leader election
//! - [`leader`] - Peer, validator and contributor election policies
//! - [`state`] - Replicated [`AnchorState`] with a single [`StateWriter`]
//! - [`tx`] - Log transaction types and payloads
//! - [`log`] - The [`ReplicatedLog`] trait
//!
//! # Example
//!
//! ```rust
//! use cairn_chain::{AnchorState, LeaderElection, NodeView, StateMutation};
//!
//! let mut state = AnchorState::default();
//! state.apply(&StateMutation::CalendarCommitted { seq: 1, core: "core-a".into() });
//!
//! let view = NodeView::new("core-a");
//! let election = LeaderElection::new(&view, &state).contributor_leader(1, &[]);
//! assert!(election.is_leader);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod contributors;
pub mod election;
pub mod error;
pub mod leader;
pub mod log;
pub mod node;
pub mod state;
pub mod tx;
pub mod validators;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(test)]
mod proptest;

pub use contributors::ChainContributors;
pub use election::{elect_leaders, seeded_index, Candidate, ElectionKey};
pub use error::{ChainError, Result};
pub use leader::{Election, LeaderElection};
pub use log::ReplicatedLog;
pub use node::{CoreId, NodeView};
pub use state::{AnchorState, EpochRange, StateHandle, StateMutation, StateWriter, TxRef};
pub use tx::{
    confirm_meta, parse_confirm_meta, BtcAnchorPayload, BtcConfirmPayload, BtcErrorPayload,
    BtcFeePayload, ChainTx, TxQuery, TxSubmission, TxType,
};
pub use validators::{Validator, ValidatorSet};
