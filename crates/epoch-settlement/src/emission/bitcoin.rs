use super::{
    BonusStrategy, EmissionEngine, ParticipantShare, PoolDetail, RewardPool, distribute_remainder,
    pool_to_i64,
};
use crate::{
    downtime::DowntimePunisher,
    error::{Result, SettlementError, ShareFault},
    math,
    params::BitcoinRewardParameters,
    stats::MissedStatTest,
    types::{EpochWeightSnapshot, Participant},
};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use tracing::{debug, info, warn};

/// `floor(initial_reward * e^(decay_rate * epochs_since_genesis))`.
///
/// Results below one unit and non-finite results (exponent overflow) are 0.
pub fn calculate_fixed_epoch_reward(
    epochs_since_genesis: u64,
    initial_reward: u64,
    decay_rate: Decimal,
) -> u64 {
    if initial_reward == 0 {
        return 0;
    }
    if epochs_since_genesis == 0 {
        return initial_reward;
    }
    let Some(exponent) = decay_rate.checked_mul(Decimal::from(epochs_since_genesis)) else {
        return 0;
    };
    let Some(factor) = math::exp(exponent) else {
        warn!(%exponent, "epoch reward exponent is not finite");
        return 0;
    };
    Decimal::from(initial_reward)
        .checked_mul(factor)
        .and_then(|reward| reward.floor().to_u64())
        .unwrap_or(0)
}

/// Fixed per-epoch emission decaying exponentially from genesis, split by
/// PoC weight.
///
/// Invalid participants and participants with a negative coin balance hold no
/// weight: they are left out of the total, so the whole fixed reward goes to
/// participants that actually receive a settle amount.
pub struct BitcoinEmissionEngine<'a, T: MissedStatTest + ?Sized, B: BonusStrategy + ?Sized> {
    params: &'a BitcoinRewardParameters,
    current_epoch: u64,
    punisher: DowntimePunisher<'a, T>,
    bonus: &'a B,
}

impl<'a, T: MissedStatTest + ?Sized, B: BonusStrategy + ?Sized> BitcoinEmissionEngine<'a, T, B> {
    pub fn new(
        params: &'a BitcoinRewardParameters,
        current_epoch: u64,
        stat_test: &'a T,
        bonus: &'a B,
    ) -> Self {
        Self {
            params,
            current_epoch,
            punisher: DowntimePunisher::new(stat_test),
            bonus,
        }
    }

    pub fn epochs_since_genesis(&self) -> u64 {
        self.current_epoch.saturating_sub(self.params.genesis_epoch)
    }

    /// Snapshot weight scaled by the bonus multipliers, floored.
    fn poc_weight(&self, address: &str, snapshot: &EpochWeightSnapshot) -> u64 {
        let base = snapshot
            .weight_of(address)
            .map(|w| w.eligible_weight())
            .unwrap_or(0);
        if base == 0 {
            return 0;
        }
        let utilization = neutral_if_not_positive(self.bonus.utilization_multiplier(address, snapshot));
        let coverage = neutral_if_not_positive(self.bonus.coverage_multiplier(address, snapshot));
        Decimal::from(base)
            .checked_mul(utilization)
            .and_then(|w| w.checked_mul(coverage))
            .and_then(|w| w.floor().to_u64())
            .unwrap_or_else(|| {
                warn!(participant = %address, base, "bonus-adjusted weight overflow, using base weight");
                base
            })
    }
}

fn neutral_if_not_positive(multiplier: Decimal) -> Decimal {
    if multiplier > Decimal::ZERO {
        multiplier
    } else {
        Decimal::ONE
    }
}

impl<T: MissedStatTest + ?Sized, B: BonusStrategy + ?Sized> EmissionEngine
    for BitcoinEmissionEngine<'_, T, B>
{
    fn compute_pool_and_shares(
        &self,
        participants: &[Participant],
        snapshot: &EpochWeightSnapshot,
    ) -> Result<(Vec<ParticipantShare>, RewardPool)> {
        let epochs_since_genesis = self.epochs_since_genesis();
        let fixed_reward = calculate_fixed_epoch_reward(
            epochs_since_genesis,
            self.params.initial_epoch_reward,
            self.params.decay_rate,
        );

        let mut shares = Vec::with_capacity(participants.len());
        let mut weights = Vec::with_capacity(participants.len());
        let mut total_weight: u64 = 0;

        for participant in participants {
            if participant.is_invalid() {
                debug!(participant = %participant.address, "invalid participant, no PoC weight");
                shares.push(ParticipantShare::new(&participant.address, 0));
                weights.push(0);
                continue;
            }
            let Ok(balance) = u64::try_from(participant.coin_balance) else {
                let fault = ShareFault::NegativeCoinBalance(participant.coin_balance);
                warn!(participant = %participant.address, %fault, "excluding participant from emission");
                shares.push(ParticipantShare::faulted(&participant.address, fault));
                weights.push(0);
                continue;
            };
            let weight = self.poc_weight(&participant.address, snapshot);
            total_weight = total_weight
                .checked_add(weight)
                .ok_or(SettlementError::Arithmetic("total PoC weight overflow"))?;
            shares.push(ParticipantShare::new(&participant.address, balance));
            weights.push(weight);
        }

        // Punished participants keep their slot in the denominator
        for ((share, weight), participant) in shares.iter_mut().zip(weights.iter_mut()).zip(participants) {
            if *weight > 0
                && self
                    .punisher
                    .is_punished(&participant.address, &participant.current_epoch_stats)
            {
                share.punished = true;
                *weight = 0;
            }
        }

        if total_weight > 0 {
            for (share, weight) in shares.iter_mut().zip(&weights) {
                share.reward_coins = math::mul_div_floor(*weight, fixed_reward, total_weight)
                    .ok_or(SettlementError::Arithmetic("PoC share overflow"))?;
            }
        } else {
            info!("No PoC weight this epoch, nothing to distribute");
        }

        let recipient = shares
            .iter()
            .position(|s| s.reward_coins > 0)
            .or_else(|| weights.iter().position(|w| *w > 0));
        let distributed = distribute_remainder(&mut shares, fixed_reward, recipient)?;
        if distributed != fixed_reward {
            info!(
                "Epoch reward {} reduced to {} with no eligible recipient",
                fixed_reward, distributed
            );
        }

        info!(
            "Bitcoin-style rewards for epoch {}: pool {}, total weight {}",
            self.current_epoch, distributed, total_weight
        );
        Ok((
            shares,
            RewardPool {
                amount: pool_to_i64(distributed)?,
                detail: PoolDetail::Bitcoin {
                    epoch_number: self.current_epoch,
                    decay_applied: epochs_since_genesis > 0,
                },
            },
        ))
    }
}
