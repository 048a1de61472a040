//! Bitcoin Core RPC client wrapper.

use std::str::FromStr;

use bitcoin::{Block, BlockHash, ScriptBuf, Transaction, Txid};
use bitcoincore_rpc::json::{EstimateMode, GetRawTransactionResult, GetTransactionResult};
use bitcoincore_rpc::{Auth, Client, RpcApi};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::json;

use crate::config::BitcoinConfig;
use crate::error::{BitcoinError, Result};
use crate::tx::Utxo;

/// `bumpfee` response.
#[derive(Debug, Deserialize)]
struct BumpFeeResult {
    txid: Option<String>,
    #[serde(default)]
    errors: Vec<String>,
}

/// Blocking wrapper around a Bitcoin Core RPC client.
pub struct BitcoinRpc {
    client: Client,
    config: BitcoinConfig,
    // (height, unix timestamp)
    cached_height: RwLock<Option<(u64, i64)>>,
}

impl BitcoinRpc {
    /// Create a client. No request is made.
    pub fn new(config: BitcoinConfig) -> Result<Self> {
        config.validate()?;

        let auth = match (&config.rpc_user, &config.rpc_password, &config.cookie_file) {
            (Some(user), Some(pass), _) => Auth::UserPass(user.clone(), pass.clone()),
            (_, _, Some(cookie)) => Auth::CookieFile(cookie.clone()),
            _ => Auth::None,
        };

        let client = Client::new(&config.endpoint(), auth)
            .map_err(|e| BitcoinError::RpcConnection(e.to_string()))?;

        Ok(Self {
            client,
            config,
            cached_height: RwLock::new(None),
        })
    }

    /// The configuration.
    pub fn config(&self) -> &BitcoinConfig {
        &self.config
    }

    /// Parse a display-order txid.
    pub fn parse_txid(tx_id: &str) -> Result<Txid> {
        Txid::from_str(tx_id).map_err(|e| BitcoinError::InvalidTx(format!("{}: {}", tx_id, e)))
    }

    /// Current block count.
    pub fn get_block_count(&self) -> Result<u64> {
        Ok(self.client.get_block_count()?)
    }

    /// Current block count, cached for `height_cache_secs`.
    pub fn get_block_height_cached(&self) -> Result<u64> {
        let now = chrono::Utc::now().timestamp();

        if let Some((height, ts)) = *self.cached_height.read() {
            if now - ts < self.config.height_cache_secs {
                return Ok(height);
            }
        }

        let height = self.get_block_count()?;
        *self.cached_height.write() = Some((height, now));
        Ok(height)
    }

    /// Block hash at `height`.
    pub fn get_block_hash(&self, height: u64) -> Result<BlockHash> {
        self.client
            .get_block_hash(height)
            .map_err(|e| BitcoinError::BlockNotFound(format!("height {}: {}", height, e)))
    }

    /// Block by hash.
    pub fn get_block(&self, hash: &BlockHash) -> Result<Block> {
        self.client
            .get_block(hash)
            .map_err(|e| BitcoinError::BlockNotFound(format!("{}: {}", hash, e)))
    }

    /// Height of the block with `hash`.
    pub fn get_block_height(&self, hash: &BlockHash) -> Result<u64> {
        let info = self.client.get_block_header_info(hash)?;
        Ok(info.height as u64)
    }

    /// Transaction from the node's index or mempool.
    pub fn get_raw_transaction_info(&self, txid: &Txid) -> Result<GetRawTransactionResult> {
        self.client
            .get_raw_transaction_info(txid, None)
            .map_err(|e| BitcoinError::TxNotFound(e.to_string()))
    }

    /// Transaction from the wallet.
    pub fn get_wallet_transaction(&self, txid: &Txid) -> Result<GetTransactionResult> {
        self.client
            .get_transaction(txid, None)
            .map_err(|e| BitcoinError::TxNotFound(e.to_string()))
    }

    /// Containing block hash, `None` while unconfirmed.
    ///
    /// Tries the node's transaction index first, then the wallet.
    pub fn get_tx_block_hash(&self, txid: &Txid) -> Result<Option<BlockHash>> {
        match self.get_raw_transaction_info(txid) {
            Ok(info) => Ok(info.blockhash),
            Err(BitcoinError::TxNotFound(_)) => {
                Ok(self.get_wallet_transaction(txid)?.info.blockhash)
            }
            Err(e) => Err(e),
        }
    }

    /// A wallet transaction's full body.
    pub fn get_wallet_tx_body(&self, txid: &Txid) -> Result<Transaction> {
        Ok(self.get_wallet_transaction(txid)?.transaction()?)
    }

    /// Spendable wallet outputs.
    pub fn list_unspent(&self) -> Result<Vec<Utxo>> {
        let unspent = self.client.list_unspent(
            Some(self.config.min_utxo_confirmations),
            None,
            None,
            Some(false),
            None,
        )?;
        Ok(unspent
            .into_iter()
            .filter(|u| u.spendable)
            .map(|u| Utxo {
                outpoint: bitcoin::OutPoint {
                    txid: u.txid,
                    vout: u.vout,
                },
                amount: u.amount,
            })
            .collect())
    }

    /// A fresh change script from the wallet.
    pub fn get_change_script(&self) -> Result<ScriptBuf> {
        let address = self
            .client
            .get_raw_change_address(None)?
            .require_network(self.config.network.to_bitcoin_network())
            .map_err(|e| BitcoinError::NetworkMismatch {
                expected: self.config.network.name().to_string(),
                got: e.to_string(),
            })?;
        Ok(address.script_pubkey())
    }

    /// Sign with the wallet's keys.
    pub fn sign_with_wallet(&self, tx: &Transaction) -> Result<Transaction> {
        let signed = self.client.sign_raw_transaction_with_wallet(tx, None, None)?;
        if !signed.complete {
            let reasons: Vec<String> = signed
                .errors
                .unwrap_or_default()
                .into_iter()
                .map(|e| e.error)
                .collect();
            return Err(BitcoinError::Signing(reasons.join("; ")));
        }
        Ok(signed.transaction()?)
    }

    /// Broadcast a signed transaction.
    pub fn send_raw_transaction(&self, tx: &Transaction) -> Result<Txid> {
        self.client
            .send_raw_transaction(tx)
            .map_err(|e| BitcoinError::Broadcast(e.to_string()))
    }

    /// Replace `txid` through the wallet at `fee_rate` sat/vB. Returns the
    /// replacement's txid.
    pub fn bump_fee(&self, txid: &Txid, fee_rate: u64) -> Result<Txid> {
        let result: BumpFeeResult = self
            .client
            .call("bumpfee", &[json!(txid.to_string()), json!({ "fee_rate": fee_rate })])
            .map_err(|e| BitcoinError::Fee(e.to_string()))?;

        match result.txid {
            Some(new_txid) => Self::parse_txid(&new_txid),
            None => Err(BitcoinError::Fee(result.errors.join("; "))),
        }
    }

    /// Fee estimate in sat/vB, or `None` when the node has no estimate.
    pub fn estimate_fee_rate(&self, target_blocks: u16) -> Result<Option<u64>> {
        let estimate = self
            .client
            .estimate_smart_fee(target_blocks, Some(EstimateMode::Conservative))
            .map_err(|e| BitcoinError::Fee(e.to_string()))?;

        Ok(estimate.fee_rate.map(|rate| btc_per_kvb_to_sat_per_vb(rate.to_btc())))
    }

    /// Check the node is reachable and on the configured network.
    pub fn test_connection(&self) -> Result<()> {
        let info = self.client.get_blockchain_info()?;

        let expected = self.config.network.to_bitcoin_network();
        if info.chain != expected {
            return Err(BitcoinError::NetworkMismatch {
                expected: format!("{:?}", expected),
                got: format!("{:?}", info.chain),
            });
        }

        Ok(())
    }
}

/// Convert a BTC/kvB rate to whole sat/vB, rounding up.
pub(crate) fn btc_per_kvb_to_sat_per_vb(btc_per_kvb: f64) -> u64 {
    // 1 BTC/kvB = 1e8 sat / 1000 vB
    (btc_per_kvb * 100_000.0).ceil().max(1.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_conversion() {
        assert_eq!(btc_per_kvb_to_sat_per_vb(0.0001), 10);
        assert_eq!(btc_per_kvb_to_sat_per_vb(0.000_012_34), 2);
        assert_eq!(btc_per_kvb_to_sat_per_vb(0.0), 1);
    }

    #[test]
    fn test_parse_txid_display_order() {
        let display = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";
        let txid = BitcoinRpc::parse_txid(display).unwrap();
        assert_eq!(txid.to_string(), display);
        assert!(BitcoinRpc::parse_txid("zz").is_err());
    }

    #[test]
    fn test_new_rejects_bad_config() {
        assert!(BitcoinRpc::new(BitcoinConfig::new("", crate::Network::Regtest)).is_err());
        let rpc = BitcoinRpc::new(BitcoinConfig::regtest("http://127.0.0.1:18443")).unwrap();
        assert_eq!(rpc.config().network, crate::Network::Regtest);
    }

    #[test]
    fn test_bumpfee_response() {
        let ok: BumpFeeResult = serde_json::from_str(
            r#"{"txid":"4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b","origfee":0.0001,"fee":0.0002,"errors":[]}"#,
        )
        .unwrap();
        assert!(ok.txid.is_some());

        let failed: BumpFeeResult =
            serde_json::from_str(r#"{"errors":["Transaction has descendants in the wallet"]}"#).unwrap();
        assert!(failed.txid.is_none());
        assert_eq!(failed.errors.len(), 1);
    }
}
