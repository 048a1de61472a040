//! In-memory collaborators for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use cairn_chain::CoreId;
use cairn_core::{bitcoin_root_from_txids, sha256, sha256d, Hash, Proof};
use parking_lot::Mutex;

use crate::errors::{AnchorError, Result};
use crate::provider::{
    BitcoinClient, BtcBlock, BtcTxInfo, ProofOutput, ProofSink, RewardPayer, SentTx,
};

#[derive(Default)]
struct MockChain {
    height: u64,
    blocks: HashMap<u64, BtcBlock>,
    mempool: Vec<String>,
    mined: HashMap<String, u64>,
    roots: HashMap<String, Hash>,
    sent: Vec<SentTx>,
    replacements: Vec<(String, u64)>,
    nonce: u64,
}

/// A Bitcoin wallet and chain held in memory.
///
/// Sent transactions wait in a mempool until [`MockBitcoin::mine_block`].
pub struct MockBitcoin {
    chain: Mutex<MockChain>,
    fail_sends: AtomicBool,
    fee_rate: AtomicU64,
}

impl MockBitcoin {
    /// Create a chain at `height`.
    pub fn new(height: u64) -> Self {
        Self {
            chain: Mutex::new(MockChain {
                height,
                ..Default::default()
            }),
            fail_sends: AtomicBool::new(false),
            fee_rate: AtomicU64::new(10),
        }
    }

    /// Make wallet sends fail.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Set the fee estimate.
    pub fn set_fee_rate(&self, sat_vb: u64) {
        self.fee_rate.store(sat_vb, Ordering::SeqCst);
    }

    /// Mine the mempool into a new block with a coinbase and one filler tx.
    pub fn mine_block(&self) -> BtcBlock {
        let mut chain = self.chain.lock();
        chain.height += 1;
        let height = chain.height;

        let mut txids = vec![
            sha256d(format!("coinbase-{}", height).as_bytes()).to_display_hex(),
            sha256d(format!("filler-{}", height).as_bytes()).to_display_hex(),
        ];
        let mempool: Vec<String> = chain.mempool.drain(..).collect();
        for txid in &mempool {
            chain.mined.insert(txid.clone(), height);
        }
        txids.extend(mempool);

        let merkle_root = bitcoin_root_from_txids(&txids)
            .map(|root| root.to_hex())
            .unwrap_or_default();
        let block = BtcBlock {
            height,
            merkle_root,
            txids,
        };
        chain.blocks.insert(height, block.clone());
        block
    }

    /// Mine `n` blocks.
    pub fn mine_blocks(&self, n: u64) {
        for _ in 0..n {
            self.mine_block();
        }
    }

    /// Overwrite a block's header root.
    pub fn corrupt_block(&self, height: u64) {
        if let Some(block) = self.chain.lock().blocks.get_mut(&height) {
            block.merkle_root = sha256(b"corrupt").to_hex();
        }
    }

    /// Current height.
    pub fn height(&self) -> u64 {
        self.chain.lock().height
    }

    /// Every transaction sent, replacements included.
    pub fn sent(&self) -> Vec<SentTx> {
        self.chain.lock().sent.clone()
    }

    /// `(replaced txid, fee rate)` for each replacement.
    pub fn replacements(&self) -> Vec<(String, u64)> {
        self.chain.lock().replacements.clone()
    }

    fn build_tx(chain: &mut MockChain, root: &Hash) -> SentTx {
        chain.nonce += 1;
        let mut raw = vec![0x02, 0x00, 0x00, 0x00, 0x01];
        raw.extend_from_slice(sha256(&chain.nonce.to_le_bytes()).as_bytes());
        raw.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0x01]);
        raw.extend_from_slice(&[0u8; 8]);
        raw.extend_from_slice(&[0x22, 0x6a, 0x20]);
        raw.extend_from_slice(root.as_bytes());
        raw.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

        let sent = SentTx {
            tx_id: sha256d(&raw).to_display_hex(),
            raw_tx: hex::encode(&raw),
        };
        chain.mempool.push(sent.tx_id.clone());
        chain.roots.insert(sent.tx_id.clone(), *root);
        chain.sent.push(sent.clone());
        sent
    }
}

#[async_trait]
impl BitcoinClient for MockBitcoin {
    async fn send_data_carrier_tx(&self, root: &Hash) -> Result<SentTx> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(AnchorError::Bitcoin("insufficient funds".into()));
        }
        Ok(Self::build_tx(&mut self.chain.lock(), root))
    }

    async fn replace_by_fee(&self, tx_id: &str, fee_rate_sat_vb: u64) -> Result<SentTx> {
        let mut chain = self.chain.lock();
        if !chain.mempool.iter().any(|t| t == tx_id) {
            return Err(AnchorError::Bitcoin(format!("{} not in mempool", tx_id)));
        }
        let root = chain
            .roots
            .get(tx_id)
            .copied()
            .ok_or_else(|| AnchorError::Bitcoin(format!("unknown tx {}", tx_id)))?;
        chain.mempool.retain(|t| t != tx_id);
        chain.replacements.push((tx_id.to_string(), fee_rate_sat_vb));
        Ok(Self::build_tx(&mut chain, &root))
    }

    async fn get_block_by_height(&self, height: u64) -> Result<BtcBlock> {
        self.chain
            .lock()
            .blocks
            .get(&height)
            .cloned()
            .ok_or_else(|| AnchorError::Bitcoin(format!("no block at height {}", height)))
    }

    async fn get_transaction(&self, tx_id: &str) -> Result<BtcTxInfo> {
        let chain = self.chain.lock();
        let block_height = match chain.mined.get(tx_id) {
            Some(height) => *height,
            None if chain.mempool.iter().any(|t| t == tx_id) => 0,
            None => return Err(AnchorError::Bitcoin(format!("unknown tx {}", tx_id))),
        };
        Ok(BtcTxInfo {
            tx_id: tx_id.to_string(),
            block_height,
        })
    }

    async fn block_height(&self) -> Result<u64> {
        Ok(self.chain.lock().height)
    }

    async fn estimate_fee_rate(&self) -> Result<u64> {
        Ok(self.fee_rate.load(Ordering::SeqCst))
    }
}

/// Records reward payments.
#[derive(Default)]
pub struct MockRewards {
    payments: Mutex<Vec<(CoreId, u64)>>,
    fail: AtomicBool,
}

impl MockRewards {
    /// Create a payer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make payments fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Payments made.
    pub fn payments(&self) -> Vec<(CoreId, u64)> {
        self.payments.lock().clone()
    }
}

#[async_trait]
impl RewardPayer for MockRewards {
    async fn send_payment(&self, destination: &CoreId, amount_sats: u64) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AnchorError::Payment("payment channel closed".into()));
        }
        self.payments.lock().push((destination.clone(), amount_sats));
        Ok(())
    }
}

/// Keeps the latest proof per id.
#[derive(Default)]
pub struct MemProofSink {
    proofs: Mutex<HashMap<String, Proof>>,
}

impl MemProofSink {
    /// Create a sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// A proof by id.
    pub fn get(&self, proof_id: &str) -> Option<Proof> {
        self.proofs.lock().get(proof_id).cloned()
    }

    /// Every proof held.
    pub fn proofs(&self) -> Vec<Proof> {
        self.proofs.lock().values().cloned().collect()
    }

    /// Number of proofs held.
    pub fn len(&self) -> usize {
        self.proofs.lock().len()
    }

    /// Whether the sink is empty.
    pub fn is_empty(&self) -> bool {
        self.proofs.lock().is_empty()
    }
}

impl ProofSink for MemProofSink {
    fn persist_proofs(&self, proofs: Vec<ProofOutput>) -> Result<()> {
        let mut held = self.proofs.lock();
        for output in proofs {
            held.insert(output.proof_id, output.proof);
        }
        Ok(())
    }
}
