pub mod validation;

use crate::params::{
    BitcoinRewardParams, CollateralParams, EpochParams, GovernanceParams, TokenomicsParams,
    ValidationParams,
};
use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path};
use validation::validate_config;

const ENV_PREFIX: &str = "SETTLE";

/// Main settings configuration for epoch settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level for application logging (e.g., "info", "debug", "warn", "error")
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Subsidy schedule, supply cap and payout vesting
    #[serde(default)]
    pub tokenomics: TokenomicsParams,
    /// Fixed exponential-decay emission; selects the policy when enabled
    #[serde(default)]
    pub bitcoin_rewards: BitcoinRewardParams,
    /// Downtime slashing of collateral
    #[serde(default)]
    pub collateral: CollateralParams,
    /// Must-validate probability curve used by claims
    #[serde(default)]
    pub validation: ValidationParams,
    /// Block-height layout of epochs
    #[serde(default)]
    pub epoch: EpochParams,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            tokenomics: TokenomicsParams::default(),
            bitcoin_rewards: BitcoinRewardParams::default(),
            collateral: CollateralParams::default(),
            validation: ValidationParams::default(),
            epoch: EpochParams::default(),
        }
    }
}

impl Settings {
    /// Load configuration from a specific config file path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        // env vars take priority over the file
        let settings = ConfigBuilder::builder()
            .add_source(File::with_name(&path.as_ref().to_string_lossy()))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        validate_config(&settings)?;

        Ok(settings)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // NOTE: It's ok if this fails (file might not exist)
        let _ = dotenvy::dotenv();

        let settings: Settings = ConfigBuilder::builder()
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        validate_config(&settings)?;

        Ok(settings)
    }

    /// Read-only governance snapshot handed to settlement and claims.
    pub fn governance(&self) -> GovernanceParams {
        GovernanceParams {
            tokenomics: self.tokenomics.clone(),
            bitcoin_rewards: self.bitcoin_rewards.clone(),
            collateral: self.collateral.clone(),
            validation: self.validation.clone(),
            epoch: self.epoch.clone(),
        }
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Settings {{\n\
             \tLog Level: {}\n\
             \tBitcoin Rewards: {}\n\
             \tInitial Epoch Reward: {}\n\
             \tDecay Rate: {}\n\
             \tSubsidy Reduction Interval: {}\n\
             \tSubsidy Reduction Amount: {}\n\
             \tTotal Subsidy Supply: {}\n\
             \tDowntime Threshold: {}\n\
             \tDowntime Slash Fraction: {}\n\
             \tEpoch Length: {}\n\
             }}",
            self.log_level,
            self.bitcoin_rewards.use_bitcoin_rewards,
            self.bitcoin_rewards.initial_epoch_reward,
            self.bitcoin_rewards.decay_rate,
            self.tokenomics.subsidy_reduction_interval,
            self.tokenomics.subsidy_reduction_amount,
            self.tokenomics.total_subsidy_supply,
            self.collateral.downtime_missed_percentage_threshold,
            self.collateral.slash_fraction_downtime,
            self.epoch.epoch_length,
        )
    }
}
