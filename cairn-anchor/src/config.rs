//! Anchoring configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{AnchorError, Result};

/// Thresholds and timings for the anchoring pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    /// Launch an epoch every this many calendar blocks.
    pub anchor_interval_blocks: u64,
    /// Bitcoin confirmations before an anchor is confirmed.
    pub confirmations_required: u64,
    /// Calendar blocks to wait for an anchor announcement before resetting.
    pub announce_timeout_blocks: u64,
    /// Bitcoin blocks an announced tx may sit in the mempool before RBF.
    pub rbf_after_btc_blocks: u64,
    /// Fee multiplier applied on replace-by-fee.
    pub rbf_fee_multiplier: u64,
    /// Floor for fee rates, sat/vB.
    pub min_fee_rate_sat_vb: u64,
    /// Bitcoin blocks after broadcast before a pending check expires.
    pub check_expiry_btc_blocks: u64,
    /// How long the confirmation loop keeps trying.
    #[serde(with = "duration_secs")]
    pub confirm_window: Duration,
    /// Pause between confirmation attempts (about one block interval).
    #[serde(with = "duration_secs")]
    pub confirm_poll_interval: Duration,
    /// Distinct recent contributors eligible to lead an epoch.
    pub contributor_window: usize,
    /// Reward paid to the anchoring Core, in satoshis.
    pub reward_sats: u64,
    /// Calendar blocks between Bitcoin fee reports.
    pub fee_interval_blocks: u64,
    /// Use test-network anchor types (`tcal`, `tbtc`).
    pub testnet: bool,
    /// Base URI published in proof anchors.
    pub public_uri: String,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            anchor_interval_blocks: 60,
            confirmations_required: 6,
            announce_timeout_blocks: 10,
            rbf_after_btc_blocks: 3,
            rbf_fee_multiplier: 2,
            min_fee_rate_sat_vb: 5,
            check_expiry_btc_blocks: 144,
            confirm_window: Duration::from_secs(300),
            confirm_poll_interval: Duration::from_secs(60),
            contributor_window: 10,
            reward_sats: 5_000,
            fee_interval_blocks: 30,
            testnet: false,
            public_uri: "http://127.0.0.1".to_string(),
        }
    }
}

impl AnchorConfig {
    /// Set the epoch interval.
    pub fn with_anchor_interval(mut self, blocks: u64) -> Self {
        self.anchor_interval_blocks = blocks;
        self
    }

    /// Set required confirmations.
    pub fn with_confirmations(mut self, confirmations: u64) -> Self {
        self.confirmations_required = confirmations;
        self
    }

    /// Set the announcement timeout.
    pub fn with_announce_timeout(mut self, blocks: u64) -> Self {
        self.announce_timeout_blocks = blocks;
        self
    }

    /// Set the RBF threshold.
    pub fn with_rbf_after(mut self, btc_blocks: u64) -> Self {
        self.rbf_after_btc_blocks = btc_blocks;
        self
    }

    /// Set the confirmation loop timings.
    pub fn with_confirm_timing(mut self, window: Duration, poll_interval: Duration) -> Self {
        self.confirm_window = window;
        self.confirm_poll_interval = poll_interval;
        self
    }

    /// Set the fee report interval.
    pub fn with_fee_interval(mut self, blocks: u64) -> Self {
        self.fee_interval_blocks = blocks;
        self
    }

    /// Use test-network anchor types.
    pub fn testnet(mut self, testnet: bool) -> Self {
        self.testnet = testnet;
        self
    }

    /// Set the public URI.
    pub fn with_public_uri(mut self, uri: impl Into<String>) -> Self {
        self.public_uri = uri.into();
        self
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.anchor_interval_blocks == 0 {
            return Err(AnchorError::Config("anchor_interval_blocks must be > 0".into()));
        }
        if self.confirmations_required == 0 {
            return Err(AnchorError::Config("confirmations_required must be > 0".into()));
        }
        if self.rbf_fee_multiplier < 1 {
            return Err(AnchorError::Config("rbf_fee_multiplier must be >= 1".into()));
        }
        if self.check_expiry_btc_blocks <= self.rbf_after_btc_blocks {
            return Err(AnchorError::Config(
                "check_expiry_btc_blocks must exceed rbf_after_btc_blocks".into(),
            ));
        }
        if self.confirm_poll_interval.is_zero()
            || self.confirm_window < self.confirm_poll_interval
        {
            return Err(AnchorError::Config(
                "confirm_window must cover at least one poll interval".into(),
            ));
        }
        if self.contributor_window == 0 {
            return Err(AnchorError::Config("contributor_window must be > 0".into()));
        }
        Ok(())
    }

    /// Data URI for a log transaction (calendar or confirmation).
    pub fn calendar_uri(&self, tx_id: &str) -> String {
        format!("{}/calendar/{}/data", self.public_uri.trim_end_matches('/'), tx_id)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("duration must be non-negative seconds"));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}
