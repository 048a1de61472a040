//! Bitcoin anchoring for Cairn calendars.
//!
//! Calendar roots committed to the replicated log are periodically
//! aggregated into an epoch root, committed to Bitcoin in an OP_RETURN
//! output, and, once confirmed, turned into Chainpoint proofs reaching a
//! Bitcoin block's Merkle root.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        CAIRN ANCHOR LAYER                         │
//! │                                                                   │
//! │  consensus ──begin/deliver/end/commit──> AnchorNode               │
//! │                                            │                      │
//! │                    ┌───────────────────────┼─────────────────┐    │
//! │                    ▼                       ▼                 ▼    │
//! │            ┌──────────────┐      ┌─────────────────┐  ┌──────────┐│
//! │            │ StateWriter  │      │ BtcAnchorEngine │  │ Failure  ││
//! │            │ (replicated) │─────>│ epochs, confirm │  │ Monitor  ││
//! │            └──────────────┘ read └─────────────────┘  └──────────┘│
//! │                                     │      │      │               │
//! │                          ReplicatedLog BitcoinClient RewardPayer  │
//! │                                            │                      │
//! │                                   AnchorStore / ProofSink         │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cairn_anchor::{AnchorConfig, AnchorNode, Collaborators, MemStore};
//! use cairn_anchor::mock::{MemProofSink, MockBitcoin, MockRewards};
//! use cairn_chain::{mock::MemLog, NodeView};
//!
//! let mut node = AnchorNode::new(
//!     AnchorConfig::default(),
//!     NodeView::new("core-a"),
//!     Collaborators {
//!         log: Arc::new(MemLog::new()),
//!         bitcoin: Arc::new(MockBitcoin::new(800_000)),
//!         rewards: Arc::new(MockRewards::new()),
//!         store: Arc::new(MemStore::new()),
//!         proofs: Arc::new(MemProofSink::new()),
//!     },
//! )?;
//!
//! // For every committed block:
//! node.begin_block(height, block_hash);
//! for tx in &block_txs {
//!     node.deliver(tx)?;
//! }
//! node.end_block()?;
//! node.commit()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod calendar;
pub mod config;
pub mod engine;
pub mod epoch;
pub mod errors;
pub mod monitor;
pub mod node;
pub mod proof;
pub mod provider;
pub mod store;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use calendar::{
    AggregatedHash, AggregationBatch, Aggregator, AnchoredEntry, CalendarBatch, CalendarEntry,
};
pub use config::AnchorConfig;
pub use engine::{AnchorEngine, ConfirmOutcome, EpochOutcome, EpochPhase, EpochPlan};
pub use epoch::{BtcAnchorEngine, Collaborators};
pub use errors::{AnchorError, Result};
pub use monitor::{FailureAction, FailureMonitor};
pub use node::AnchorNode;
pub use proof::{btc_header_ops, btc_tx_fragment};
pub use provider::{BitcoinClient, BtcBlock, BtcTxInfo, ProofOutput, ProofSink, RewardPayer, SentTx};
pub use store::{
    AnchorStore, BtcAggEntry, CommittedCalRoot, ConfirmedTxRecord, MemStore, PendingAnchorCheck,
    StateStore,
};

#[cfg(any(test, feature = "mock"))]
pub use mock::{MemProofSink, MockBitcoin, MockRewards};
