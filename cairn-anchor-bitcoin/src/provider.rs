//! [`BitcoinClient`] over Bitcoin Core.

use std::sync::Arc;

use async_trait::async_trait;
use cairn_anchor::{BitcoinClient, BtcBlock, BtcTxInfo, SentTx};
use cairn_core::Hash;
use tracing::{debug, info, warn};

use crate::config::BitcoinConfig;
use crate::error::{BitcoinError, Result};
use crate::rpc::BitcoinRpc;
use crate::tx::{block_summary, strip_witness, AnchorTxBuilder};
use crate::FALLBACK_FEE_RATE;

/// Bitcoin Core wallet and chain access.
///
/// RPC calls block, so each runs on tokio's blocking pool.
#[derive(Clone)]
pub struct BitcoinRpcClient {
    rpc: Arc<BitcoinRpc>,
}

impl BitcoinRpcClient {
    /// Create a client without contacting the node.
    pub fn new(config: BitcoinConfig) -> Result<Self> {
        Ok(Self {
            rpc: Arc::new(BitcoinRpc::new(config)?),
        })
    }

    /// Create a client and check the node's network.
    pub fn connect(config: BitcoinConfig) -> Result<Self> {
        let client = Self::new(config)?;
        client.rpc.test_connection()?;
        info!(
            network = client.rpc.config().network.name(),
            endpoint = %client.rpc.config().rpc_url,
            "Connected to Bitcoin Core"
        );
        Ok(client)
    }

    /// The RPC wrapper.
    pub fn rpc(&self) -> &BitcoinRpc {
        &self.rpc
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&BitcoinRpc) -> Result<T> + Send + 'static,
    {
        let rpc = self.rpc.clone();
        tokio::task::spawn_blocking(move || f(&rpc))
            .await
            .map_err(|e| BitcoinError::Task(e.to_string()))?
    }

    fn fee_rate(rpc: &BitcoinRpc) -> Result<u64> {
        let config = rpc.config();
        if config.fee_rate_sat_vb > 0 {
            return Ok(config.fee_rate_sat_vb);
        }
        match rpc.estimate_fee_rate(config.fee_target_blocks)? {
            Some(rate) => Ok(rate),
            None => {
                warn!(fallback = FALLBACK_FEE_RATE, "No fee estimate available");
                Ok(FALLBACK_FEE_RATE)
            }
        }
    }

    fn broadcast_anchor(rpc: &BitcoinRpc, root: &Hash) -> Result<SentTx> {
        let fee_rate = Self::fee_rate(rpc)?;
        let utxos = rpc.list_unspent()?;
        if utxos.is_empty() {
            return Err(BitcoinError::InsufficientFunds { need: 1, have: 0 });
        }

        let unsigned = AnchorTxBuilder::new()
            .with_utxos(utxos)
            .with_fee_rate(fee_rate)
            .with_change_script(rpc.get_change_script()?)
            .build(root)?;
        let signed = rpc.sign_with_wallet(&unsigned)?;
        let txid = rpc.send_raw_transaction(&signed)?;

        info!(btc_tx_id = %txid, root = %root, fee_rate, "Anchor transaction broadcast");
        Ok(SentTx {
            tx_id: txid.to_string(),
            raw_tx: hex::encode(strip_witness(&signed)),
        })
    }
}

#[async_trait]
impl BitcoinClient for BitcoinRpcClient {
    async fn send_data_carrier_tx(&self, root: &Hash) -> cairn_anchor::Result<SentTx> {
        let root = *root;
        Ok(self
            .blocking(move |rpc| Self::broadcast_anchor(rpc, &root))
            .await?)
    }

    async fn replace_by_fee(
        &self,
        tx_id: &str,
        fee_rate_sat_vb: u64,
    ) -> cairn_anchor::Result<SentTx> {
        let txid = BitcoinRpc::parse_txid(tx_id)?;
        let sent = self
            .blocking(move |rpc| {
                let replacement = rpc.bump_fee(&txid, fee_rate_sat_vb)?;
                let body = rpc.get_wallet_tx_body(&replacement)?;
                Ok(SentTx {
                    tx_id: replacement.to_string(),
                    raw_tx: hex::encode(strip_witness(&body)),
                })
            })
            .await?;
        info!(
            replaced = tx_id,
            btc_tx_id = %sent.tx_id,
            fee_rate = fee_rate_sat_vb,
            "Anchor transaction replaced"
        );
        Ok(sent)
    }

    async fn get_block_by_height(&self, height: u64) -> cairn_anchor::Result<BtcBlock> {
        Ok(self
            .blocking(move |rpc| {
                let hash = rpc.get_block_hash(height)?;
                let block = rpc.get_block(&hash)?;
                Ok(block_summary(height, &block))
            })
            .await?)
    }

    async fn get_transaction(&self, tx_id: &str) -> cairn_anchor::Result<BtcTxInfo> {
        let txid = BitcoinRpc::parse_txid(tx_id)?;
        let block_height = self
            .blocking(move |rpc| match rpc.get_tx_block_hash(&txid)? {
                Some(hash) => rpc.get_block_height(&hash),
                None => Ok(0),
            })
            .await?;
        debug!(btc_tx_id = tx_id, block_height, "Transaction looked up");
        Ok(BtcTxInfo {
            tx_id: tx_id.to_string(),
            block_height,
        })
    }

    async fn block_height(&self) -> cairn_anchor::Result<u64> {
        Ok(self.blocking(|rpc| rpc.get_block_height_cached()).await?)
    }

    async fn estimate_fee_rate(&self) -> cairn_anchor::Result<u64> {
        Ok(self.blocking(Self::fee_rate).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Network;

    #[tokio::test]
    async fn test_fixed_fee_skips_node() {
        let client =
            BitcoinRpcClient::new(BitcoinConfig::regtest("http://127.0.0.1:1").with_fee_rate(7))
                .unwrap();
        assert_eq!(client.estimate_fee_rate().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_bad_txid_rejected_before_rpc() {
        let client =
            BitcoinRpcClient::new(BitcoinConfig::new("http://127.0.0.1:1", Network::Regtest))
                .unwrap();
        let err = client.get_transaction("not-a-txid").await.unwrap_err();
        assert!(matches!(err, cairn_anchor::AnchorError::Bitcoin(_)));
        assert!(client.replace_by_fee("", 10).await.is_err());
    }
}
