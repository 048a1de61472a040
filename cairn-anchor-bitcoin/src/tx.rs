//! OP_RETURN transaction building.

use bitcoin::blockdata::opcodes;
use bitcoin::blockdata::script::{Builder, PushBytesBuf, Script, ScriptBuf};
use bitcoin::consensus::encode;
use bitcoin::{transaction, Amount, Block, OutPoint, Sequence, Transaction, TxIn, TxOut, Witness};
use cairn_anchor::BtcBlock;
use cairn_core::Hash;

use crate::error::{BitcoinError, Result};
use crate::{ANCHOR_DATA_SIZE, DUST_LIMIT_SATS};

/// `OP_RETURN <root>`.
pub fn build_op_return_script(root: &Hash) -> Result<ScriptBuf> {
    let push_bytes = PushBytesBuf::try_from(root.as_bytes().to_vec())
        .map_err(|e| BitcoinError::InvalidOpReturn(e.to_string()))?;

    Ok(Builder::new()
        .push_opcode(opcodes::all::OP_RETURN)
        .push_slice(push_bytes)
        .into_script())
}

/// Extract the root from an `OP_RETURN <root>` script.
pub fn parse_op_return_script(script: &Script) -> Result<Hash> {
    let bytes = script.as_bytes();

    if !script.is_op_return() {
        return Err(BitcoinError::InvalidOpReturn("not an OP_RETURN script".into()));
    }
    if bytes.len() != ANCHOR_DATA_SIZE + 2 || bytes[1] as usize != ANCHOR_DATA_SIZE {
        return Err(BitcoinError::InvalidOpReturn(format!(
            "expected a single {}-byte push, got {} script bytes",
            ANCHOR_DATA_SIZE,
            bytes.len()
        )));
    }

    Hash::from_slice(&bytes[2..]).map_err(|e| BitcoinError::InvalidOpReturn(e.to_string()))
}

/// Serialize `tx` without witness data.
///
/// The double SHA-256 of the result is the txid, which is what the proof's
/// transaction stage needs.
pub fn strip_witness(tx: &Transaction) -> Vec<u8> {
    let mut stripped = tx.clone();
    for input in &mut stripped.input {
        input.witness = Witness::new();
    }
    encode::serialize(&stripped)
}

/// Reduce a block to its height, header root and txids, all display order.
pub fn block_summary(height: u64, block: &Block) -> BtcBlock {
    BtcBlock {
        height,
        merkle_root: block.header.merkle_root.to_string(),
        txids: block
            .txdata
            .iter()
            .map(|tx| tx.compute_txid().to_string())
            .collect(),
    }
}

/// A spendable wallet output.
#[derive(Debug, Clone)]
pub struct Utxo {
    /// Previous output point.
    pub outpoint: OutPoint,
    /// Amount.
    pub amount: Amount,
}

/// Builds the unsigned anchor transaction.
pub struct AnchorTxBuilder {
    utxos: Vec<Utxo>,
    fee_rate: u64,
    change_script: Option<ScriptBuf>,
}

impl AnchorTxBuilder {
    /// Create a builder.
    pub fn new() -> Self {
        Self {
            utxos: Vec::new(),
            fee_rate: crate::FALLBACK_FEE_RATE,
            change_script: None,
        }
    }

    /// Add available UTXOs.
    pub fn with_utxos(mut self, utxos: Vec<Utxo>) -> Self {
        self.utxos = utxos;
        self
    }

    /// Set fee rate in sat/vB.
    pub fn with_fee_rate(mut self, sat_per_vb: u64) -> Self {
        self.fee_rate = sat_per_vb.max(1);
        self
    }

    /// Set the change output script.
    pub fn with_change_script(mut self, script: ScriptBuf) -> Self {
        self.change_script = Some(script);
        self
    }

    /// Rough virtual size of a P2WPKH-funded anchor transaction.
    fn estimate_vsize(num_inputs: usize) -> u64 {
        // version + marker/flag + counts + locktime
        let base = 4 + 2 + 1 + 1 + 4;
        // outpoint, empty script_sig, sequence, discounted witness
        let inputs = num_inputs * (41 + 27);
        // zero value, script length, OP_RETURN + push + root
        let op_return = 8 + 1 + 2 + ANCHOR_DATA_SIZE;
        // P2WPKH change
        let change = 31;

        (base + inputs + op_return + change) as u64
    }

    /// Fee for `num_inputs` inputs at the configured rate.
    pub fn fee_for(&self, num_inputs: usize) -> u64 {
        Self::estimate_vsize(num_inputs) * self.fee_rate
    }

    /// Build the transaction committing `root`.
    ///
    /// Inputs are taken largest first until they cover the fee. Every input
    /// signals replace-by-fee.
    pub fn build(&self, root: &Hash) -> Result<Transaction> {
        let change_script = self
            .change_script
            .clone()
            .ok_or_else(|| BitcoinError::TxBuild("no change script".into()))?;

        let mut utxos = self.utxos.clone();
        utxos.sort_by(|a, b| b.amount.cmp(&a.amount));

        let mut selected = Vec::new();
        let mut total = 0u64;
        for utxo in utxos {
            total += utxo.amount.to_sat();
            selected.push(utxo);
            if total >= self.fee_for(selected.len()) {
                break;
            }
        }

        let fee = self.fee_for(selected.len().max(1));
        if selected.is_empty() || total < fee {
            return Err(BitcoinError::InsufficientFunds { need: fee, have: total });
        }

        let input = selected
            .iter()
            .map(|u| TxIn {
                previous_output: u.outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::new(),
            })
            .collect();

        let mut output = vec![TxOut {
            value: Amount::ZERO,
            script_pubkey: build_op_return_script(root)?,
        }];

        let change = total - fee;
        if change > DUST_LIMIT_SATS {
            output.push(TxOut {
                value: Amount::from_sat(change),
                script_pubkey: change_script,
            });
        }

        Ok(Transaction {
            version: transaction::Version::TWO,
            lock_time: bitcoin::absolute::LockTime::ZERO,
            input,
            output,
        })
    }
}

impl Default for AnchorTxBuilder {
    fn default() -> Self {
        Self::new()
    }
}
