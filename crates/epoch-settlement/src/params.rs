//! Read-only governance parameters plus the cumulative tokenomics counters
//! that settlement and claims thread through explicitly.

use crate::math::SinglePrecisionRate;
use rust_decimal::{Decimal, dec};
use serde::{Deserialize, Serialize};

/// Inputs to the usage-proportional subsidy engine for one epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsidyParameters {
    pub current_subsidy_percentage: SinglePrecisionRate,
    pub total_subsidy_paid: i64,
    /// Fraction of `total_subsidy_supply` paid out per rate stage.
    pub stage_cutoff: Decimal,
    /// Fraction by which the rate shrinks when a stage boundary is crossed.
    pub stage_decrease: Decimal,
    pub total_subsidy_supply: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitcoinRewardParameters {
    pub initial_epoch_reward: u64,
    /// Expected negative; `exp(decay_rate * epochs)` scales the initial reward.
    pub decay_rate: Decimal,
    pub genesis_epoch: u64,
}

impl Default for BitcoinRewardParameters {
    fn default() -> Self {
        Self {
            initial_epoch_reward: 285_000_000_000_000,
            decay_rate: dec!(-0.000475),
            genesis_epoch: 1,
        }
    }
}

/// The emission policy active for a settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmissionPolicy {
    Subsidy(SubsidyParameters),
    BitcoinStyle(BitcoinRewardParameters),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenomicsParams {
    pub subsidy_reduction_interval: Decimal,
    pub subsidy_reduction_amount: Decimal,
    pub total_subsidy_supply: i64,
    /// Epochs; zero pays directly.
    pub work_vesting_period: u64,
    pub reward_vesting_period: u64,
}

impl Default for TokenomicsParams {
    fn default() -> Self {
        Self {
            subsidy_reduction_interval: dec!(0.05),
            subsidy_reduction_amount: dec!(0.20),
            total_subsidy_supply: 600_000_000_000_000_000,
            work_vesting_period: 0,
            reward_vesting_period: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BitcoinRewardParams {
    pub use_bitcoin_rewards: bool,
    pub initial_epoch_reward: u64,
    pub decay_rate: Decimal,
    pub genesis_epoch: u64,
}

impl BitcoinRewardParams {
    pub fn parameters(&self) -> BitcoinRewardParameters {
        BitcoinRewardParameters {
            initial_epoch_reward: self.initial_epoch_reward,
            decay_rate: self.decay_rate,
            genesis_epoch: self.genesis_epoch,
        }
    }
}

impl Default for BitcoinRewardParams {
    fn default() -> Self {
        let defaults = BitcoinRewardParameters::default();
        Self {
            use_bitcoin_rewards: true,
            initial_epoch_reward: defaults.initial_epoch_reward,
            decay_rate: defaults.decay_rate,
            genesis_epoch: defaults.genesis_epoch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollateralParams {
    pub slash_fraction_downtime: Decimal,
    pub downtime_missed_percentage_threshold: Decimal,
}

impl Default for CollateralParams {
    fn default() -> Self {
        Self {
            slash_fraction_downtime: dec!(0.10),
            downtime_missed_percentage_threshold: dec!(0.05),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationParams {
    pub min_validation_average: Decimal,
    pub max_validation_average: Decimal,
    pub full_validation_traffic_cutoff: u64,
    pub min_validation_halfway: Decimal,
    pub min_validation_traffic_cutoff: u64,
}

impl Default for ValidationParams {
    fn default() -> Self {
        Self {
            min_validation_average: dec!(0.01),
            max_validation_average: dec!(1.0),
            full_validation_traffic_cutoff: 10_000,
            min_validation_halfway: dec!(0.05),
            min_validation_traffic_cutoff: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpochParams {
    pub epoch_length: i64,
    pub epoch_shift: i64,
    pub inference_validation_cutoff: i64,
}

impl Default for EpochParams {
    fn default() -> Self {
        Self {
            epoch_length: 40,
            epoch_shift: 0,
            inference_validation_cutoff: 0,
        }
    }
}

/// Snapshot of every governance value settlement and claims read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceParams {
    pub tokenomics: TokenomicsParams,
    pub bitcoin_rewards: BitcoinRewardParams,
    pub collateral: CollateralParams,
    pub validation: ValidationParams,
    pub epoch: EpochParams,
}

impl GovernanceParams {
    /// Selects the emission policy, binding the subsidy engine to the current
    /// cumulative state.
    pub fn emission_policy(&self, state: &TokenomicsState) -> EmissionPolicy {
        if self.bitcoin_rewards.use_bitcoin_rewards {
            EmissionPolicy::BitcoinStyle(self.bitcoin_rewards.parameters())
        } else {
            EmissionPolicy::Subsidy(SubsidyParameters {
                current_subsidy_percentage: state.current_subsidy_percentage,
                total_subsidy_paid: state.total_subsidy_paid,
                stage_cutoff: self.tokenomics.subsidy_reduction_interval,
                stage_decrease: self.tokenomics.subsidy_reduction_amount,
                total_subsidy_supply: self.tokenomics.total_subsidy_supply,
            })
        }
    }
}

/// Cumulative counters mutated by settlement and claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenomicsState {
    pub total_subsidy_paid: i64,
    pub current_subsidy_percentage: SinglePrecisionRate,
    #[serde(default)]
    pub total_fees: u64,
    #[serde(default)]
    pub total_burned: u64,
}

impl Default for TokenomicsState {
    fn default() -> Self {
        Self {
            total_subsidy_paid: 0,
            // 0.9 is exactly a shortest binary32 rendering
            current_subsidy_percentage: SinglePrecisionRate::from_decimal(dec!(0.90))
                .unwrap_or(SinglePrecisionRate::ZERO),
            total_fees: 0,
            total_burned: 0,
        }
    }
}
