//! Bitcoin Core backend for Cairn anchoring.
//!
//! Implements [`cairn_anchor::BitcoinClient`] over Bitcoin Core's JSON-RPC
//! interface. Epoch roots are committed in a zero-value OP_RETURN output.
//!
//! # How It Works
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    BITCOIN ANCHORING FLOW                           │
//! │                                                                     │
//! │  1. Build                                                           │
//! │     └─ OP_RETURN [root (32)] + change, inputs from wallet UTXOs     │
//! │                                                                     │
//! │  2. Sign & Broadcast                                                │
//! │     └─ signrawtransactionwithwallet → sendrawtransaction            │
//! │                                                                     │
//! │  3. Report                                                          │
//! │     └─ txid + witness-stripped body (sha256d(body) == txid)         │
//! │                                                                     │
//! │  4. Replace if stuck                                                │
//! │     └─ bumpfee at a higher sat/vB rate                              │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use cairn_anchor_bitcoin::{BitcoinConfig, BitcoinRpcClient, Network};
//!
//! let config = BitcoinConfig::new("http://localhost:18332", Network::Testnet)
//!     .with_auth("user", "password")
//!     .with_wallet("cairn");
//!
//! let client = BitcoinRpcClient::connect(config)?;
//! let sent = client.send_data_carrier_tx(&root).await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod config;
mod error;
mod provider;
mod rpc;
mod tx;

pub use config::{BitcoinConfig, Network};
pub use error::{BitcoinError, Result};
pub use provider::BitcoinRpcClient;
pub use rpc::BitcoinRpc;
pub use tx::{
    block_summary, build_op_return_script, parse_op_return_script, strip_witness, AnchorTxBuilder,
    Utxo,
};

/// Size of the OP_RETURN payload: one 32-byte root.
pub const ANCHOR_DATA_SIZE: usize = 32;

/// Outputs below this value are not created.
pub const DUST_LIMIT_SATS: u64 = 546;

/// Fee rate used when the node cannot estimate one, sat/vB.
pub const FALLBACK_FEE_RATE: u64 = 10;
