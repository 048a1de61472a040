//! Bitcoin Core connection configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Bitcoin network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Bitcoin mainnet.
    #[default]
    Mainnet,
    /// Bitcoin testnet.
    Testnet,
    /// Bitcoin signet.
    Signet,
    /// Bitcoin regtest (local development).
    Regtest,
}

impl Network {
    /// Network name.
    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Signet => "signet",
            Network::Regtest => "regtest",
        }
    }

    /// Whether proofs should carry test-network anchor types.
    pub fn is_test(&self) -> bool {
        !matches!(self, Network::Mainnet)
    }

    /// Convert to the `bitcoin` crate's network type.
    pub fn to_bitcoin_network(&self) -> bitcoin::Network {
        match self {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
            Network::Signet => bitcoin::Network::Signet,
            Network::Regtest => bitcoin::Network::Regtest,
        }
    }
}

/// Configuration for [`crate::BitcoinRpcClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitcoinConfig {
    /// RPC endpoint URL.
    pub rpc_url: String,

    /// RPC username.
    pub rpc_user: Option<String>,

    /// RPC password.
    pub rpc_password: Option<String>,

    /// Cookie file, used when no user/password is set.
    pub cookie_file: Option<PathBuf>,

    /// Bitcoin network.
    pub network: Network,

    /// Wallet name, for multi-wallet nodes.
    pub wallet: Option<String>,

    /// Fixed fee rate in sat/vB (0 = estimate).
    pub fee_rate_sat_vb: u64,

    /// Target confirmation blocks for fee estimation.
    pub fee_target_blocks: u16,

    /// Minimum confirmations for spendable UTXOs.
    pub min_utxo_confirmations: usize,

    /// Seconds a cached chain height stays fresh.
    pub height_cache_secs: i64,
}

impl BitcoinConfig {
    /// Create a configuration.
    pub fn new(rpc_url: impl Into<String>, network: Network) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            rpc_user: None,
            rpc_password: None,
            cookie_file: None,
            network,
            wallet: None,
            fee_rate_sat_vb: 0,
            fee_target_blocks: 2,
            min_utxo_confirmations: 1,
            height_cache_secs: 10,
        }
    }

    /// Mainnet configuration.
    pub fn mainnet(rpc_url: impl Into<String>) -> Self {
        Self::new(rpc_url, Network::Mainnet)
    }

    /// Testnet configuration.
    pub fn testnet(rpc_url: impl Into<String>) -> Self {
        Self::new(rpc_url, Network::Testnet)
    }

    /// Regtest configuration.
    pub fn regtest(rpc_url: impl Into<String>) -> Self {
        Self::new(rpc_url, Network::Regtest)
    }

    /// Set RPC authentication.
    pub fn with_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.rpc_user = Some(user.into());
        self.rpc_password = Some(password.into());
        self
    }

    /// Authenticate with a cookie file.
    pub fn with_cookie_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookie_file = Some(path.into());
        self
    }

    /// Set wallet name.
    pub fn with_wallet(mut self, wallet: impl Into<String>) -> Self {
        self.wallet = Some(wallet.into());
        self
    }

    /// Set a fixed fee rate in sat/vB.
    pub fn with_fee_rate(mut self, sat_per_vb: u64) -> Self {
        self.fee_rate_sat_vb = sat_per_vb;
        self
    }

    /// Set fee estimation target blocks.
    pub fn with_fee_target(mut self, blocks: u16) -> Self {
        self.fee_target_blocks = blocks;
        self
    }

    /// Endpoint including the wallet path.
    pub fn endpoint(&self) -> String {
        match &self.wallet {
            Some(wallet) => format!("{}/wallet/{}", self.rpc_url.trim_end_matches('/'), wallet),
            None => self.rpc_url.clone(),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), super::BitcoinError> {
        if self.rpc_url.is_empty() {
            return Err(super::BitcoinError::Config("RPC URL is required".into()));
        }

        if self.rpc_user.is_some() != self.rpc_password.is_some() {
            return Err(super::BitcoinError::Config(
                "RPC user and password must be set together".into(),
            ));
        }

        if self.fee_rate_sat_vb == 0 && self.fee_target_blocks == 0 {
            return Err(super::BitcoinError::Config(
                "fee target must be at least 1 block when estimating".into(),
            ));
        }

        Ok(())
    }
}

impl Default for BitcoinConfig {
    fn default() -> Self {
        Self::new("http://127.0.0.1:8332", Network::Mainnet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = BitcoinConfig::testnet("http://localhost:18332/")
            .with_auth("user", "pass")
            .with_wallet("cairn")
            .with_fee_rate(10);

        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.rpc_user, Some("user".to_string()));
        assert_eq!(config.fee_rate_sat_vb, 10);
        assert_eq!(config.endpoint(), "http://localhost:18332/wallet/cairn");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert!(BitcoinConfig::new("", Network::Regtest).validate().is_err());

        let mut half_auth = BitcoinConfig::regtest("http://localhost:18443");
        half_auth.rpc_user = Some("user".into());
        assert!(half_auth.validate().is_err());

        let no_target = BitcoinConfig::regtest("http://localhost:18443").with_fee_target(0);
        assert!(no_target.validate().is_err());
        assert!(no_target.with_fee_rate(3).validate().is_ok());
    }

    #[test]
    fn test_network() {
        assert!(!Network::Mainnet.is_test());
        assert!(Network::Signet.is_test());
        assert_eq!(Network::Regtest.to_bitcoin_network(), bitcoin::Network::Regtest);

        let json = serde_json::to_string(&Network::Testnet).unwrap();
        assert_eq!(json, "\"testnet\"");
    }
}
