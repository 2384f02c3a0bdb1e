use super::{
    EmissionEngine, ParticipantShare, PoolDetail, RewardPool, distribute_remainder, pool_to_i64,
};
use crate::{
    downtime::DowntimePunisher,
    error::{Result, SettlementError, ShareFault},
    math::{self, SinglePrecisionRate},
    params::SubsidyParameters,
    stats::MissedStatTest,
    types::{EpochWeightSnapshot, Participant},
};
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use tracing::{debug, info, warn};

/// Usage-proportional subsidy: the pool is the work done grossed up by the
/// current subsidy rate, with a stepped rate decrease at each stage cutoff.
pub struct SubsidyEngine<'a, T: MissedStatTest + ?Sized> {
    params: &'a SubsidyParameters,
    punisher: DowntimePunisher<'a, T>,
}

impl<'a, T: MissedStatTest + ?Sized> SubsidyEngine<'a, T> {
    pub fn new(params: &'a SubsidyParameters, stat_test: &'a T) -> Self {
        Self {
            params,
            punisher: DowntimePunisher::new(stat_test),
        }
    }
}

impl<T: MissedStatTest + ?Sized> EmissionEngine for SubsidyEngine<'_, T> {
    fn compute_pool_and_shares(
        &self,
        participants: &[Participant],
        _snapshot: &EpochWeightSnapshot,
    ) -> Result<(Vec<ParticipantShare>, RewardPool)> {
        let mut shares = Vec::with_capacity(participants.len());
        // downtime-adjusted work per share
        let mut adjusted = Vec::with_capacity(participants.len());
        let mut total_work: u64 = 0;

        for participant in participants {
            if participant.is_invalid() {
                debug!(participant = %participant.address, "invalid participant, no subsidy");
                shares.push(ParticipantShare::new(&participant.address, 0));
                adjusted.push(0);
                continue;
            }
            let Ok(balance) = u64::try_from(participant.coin_balance) else {
                let fault = ShareFault::NegativeCoinBalance(participant.coin_balance);
                warn!(participant = %participant.address, %fault, "excluding participant from subsidy");
                shares.push(ParticipantShare::faulted(&participant.address, fault));
                adjusted.push(0);
                continue;
            };

            let mut share = ParticipantShare::new(&participant.address, balance);
            let mut work = balance;
            if balance > 0
                && self
                    .punisher
                    .is_punished(&participant.address, &participant.current_epoch_stats)
            {
                share.punished = true;
                work = 0;
            }
            total_work = total_work
                .checked_add(work)
                .ok_or(SettlementError::Arithmetic("total work overflow"))?;
            shares.push(share);
            adjusted.push(work);
        }

        let (amount, crossed_cutoff) = compute_subsidy_pool(self.params, total_work)?;
        if amount < 0 {
            return Err(SettlementError::NegativeRewardAmount(amount));
        }
        let pool = amount.unsigned_abs();

        if total_work > 0 {
            for (share, work) in shares.iter_mut().zip(&adjusted) {
                share.reward_coins = math::mul_div_floor(*work, pool, total_work)
                    .ok_or(SettlementError::Arithmetic("subsidy share overflow"))?;
            }
        }
        let recipient = adjusted.iter().position(|w| *w > 0);
        let distributed = distribute_remainder(&mut shares, pool, recipient)?;

        info!(
            "Subsidy pool for total work {}: {} (crossed cutoff: {})",
            total_work, distributed, crossed_cutoff
        );
        Ok((
            shares,
            RewardPool {
                amount: pool_to_i64(distributed)?,
                detail: PoolDetail::Subsidy { crossed_cutoff },
            },
        ))
    }
}

/// Sizes the subsidy pool for `total_work`.
///
/// Returns `(amount, crossed_cutoff)`. When the pool at the current rate would
/// pass the next stage boundary, the part up to the boundary is paid at the
/// current rate and the rest of the work at the decreased single-precision
/// rate.
pub fn compute_subsidy_pool(params: &SubsidyParameters, total_work: u64) -> Result<(i64, bool)> {
    if total_work == 0 || params.total_subsidy_paid >= params.total_subsidy_supply {
        return Ok((0, false));
    }

    let rate = params.current_subsidy_percentage;
    let one_minus_rate = Decimal::ONE - rate.as_decimal();
    if one_minus_rate <= Decimal::ZERO {
        return Err(SettlementError::InvalidParameters(format!(
            "subsidy percentage {rate} must be below 1"
        )));
    }

    let cutoff_unit = params
        .stage_cutoff
        .checked_mul(Decimal::from(params.total_subsidy_supply))
        .map(|v| v.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|v| v.to_i64())
        .filter(|unit| *unit > 0)
        .ok_or_else(|| {
            SettlementError::InvalidParameters(format!(
                "stage cutoff {} yields no cutoff unit",
                params.stage_cutoff
            ))
        })?;

    let paid = params.total_subsidy_paid;
    let next_cutoff = (paid / cutoff_unit)
        .checked_mul(cutoff_unit)
        .and_then(|v| v.checked_add(cutoff_unit))
        .ok_or(SettlementError::Arithmetic("cutoff overflow"))?;

    let work = Decimal::from(total_work);
    let at_current_rate = math::div_floor(work, one_minus_rate)
        .and_then(math::floor_to_i64)
        .ok_or(SettlementError::Arithmetic("subsidy at current rate"))?;

    if paid.saturating_add(at_current_rate) <= next_cutoff {
        return Ok((at_current_rate, false));
    }

    let until_cutoff = next_cutoff - paid;
    if next_cutoff >= params.total_subsidy_supply {
        return Ok((until_cutoff, true));
    }

    let work_until_cutoff = math::floor_to_i64(Decimal::from(until_cutoff) * one_minus_rate)
        .ok_or(SettlementError::Arithmetic("work until cutoff"))?;
    let next_rate: SinglePrecisionRate = rate
        .decreased_by(params.stage_decrease)
        .map_err(|e| SettlementError::InvalidParameters(e.to_string()))?;
    let remaining_work = work - Decimal::from(work_until_cutoff);
    let after_cutoff = math::div_floor(remaining_work.max(Decimal::ZERO), Decimal::ONE - next_rate.as_decimal())
        .and_then(math::floor_to_i64)
        .ok_or(SettlementError::Arithmetic("subsidy after cutoff"))?;

    debug!(
        "Subsidy crosses cutoff {}: {} at rate {}, {} at rate {}",
        next_cutoff, until_cutoff, rate, after_cutoff, next_rate
    );
    let amount = until_cutoff
        .checked_add(after_cutoff)
        .ok_or(SettlementError::Arithmetic("subsidy overflow"))?;
    Ok((amount, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{stats::CriticalValueTable, types::ParticipantStatus};
    use rust_decimal::dec;

    fn params(rate: Decimal, paid: i64) -> SubsidyParameters {
        SubsidyParameters {
            current_subsidy_percentage: SinglePrecisionRate::from_decimal(rate).unwrap(),
            total_subsidy_paid: paid,
            stage_cutoff: dec!(0.05),
            stage_decrease: dec!(0.20),
            total_subsidy_supply: 200_000,
        }
    }

    fn participant(address: &str, balance: i64) -> Participant {
        Participant::new(address, balance, ParticipantStatus::Active)
    }

    #[test]
    fn test_pool_crossing_cutoff() {
        assert_eq!(
            compute_subsidy_pool(&params(dec!(0.9), 9_500), 1_000).unwrap(),
            (3_892, true)
        );
    }

    #[test]
    fn test_pool_within_stage() {
        // 1000 / 0.1
        assert_eq!(
            compute_subsidy_pool(&params(dec!(0.9), 0), 1_000).unwrap(),
            (10_000, false)
        );
        // reaching the boundary exactly does not cross it
        assert_eq!(
            compute_subsidy_pool(&params(dec!(0.9), 0), 999).unwrap(),
            (9_990, false)
        );
    }

    #[test]
    fn test_pool_at_last_stage_stops_at_supply() {
        let p = params(dec!(0.9), 195_000);
        assert_eq!(compute_subsidy_pool(&p, 1_000).unwrap(), (5_000, true));
    }

    #[test]
    fn test_pool_after_supply_exhausted() {
        let p = params(dec!(0.9), 200_000);
        assert_eq!(compute_subsidy_pool(&p, 1_000).unwrap(), (0, false));
    }

    #[test]
    fn test_zero_work_gives_zero_pool() {
        assert_eq!(
            compute_subsidy_pool(&params(dec!(0.9), 0), 0).unwrap(),
            (0, false)
        );
    }

    #[test]
    fn test_full_rate_is_rejected() {
        let mut p = params(dec!(0.9), 0);
        p.current_subsidy_percentage = SinglePrecisionRate::from_decimal(Decimal::ONE).unwrap();
        assert!(matches!(
            compute_subsidy_pool(&p, 10),
            Err(SettlementError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_shares_sum_to_pool() {
        let p = params(dec!(0.9), 0);
        let engine = SubsidyEngine::new(&p, &CriticalValueTable);
        let participants = vec![
            participant("a", 333),
            participant("b", 333),
            participant("c", 334),
        ];
        let (shares, pool) = engine
            .compute_pool_and_shares(&participants, &EpochWeightSnapshot::default())
            .unwrap();

        assert_eq!(pool.amount, 10_000);
        assert_eq!(shares.iter().map(|s| s.reward_coins).sum::<u64>(), 10_000);
        // 3330 + 3330 + 3340
        assert_eq!(shares[0].reward_coins, 3_330);
        assert_eq!(shares.iter().map(|s| s.work_coins).collect::<Vec<_>>(), vec![333, 333, 334]);
    }

    #[test]
    fn test_remainder_goes_to_first_with_work() {
        let p = params(dec!(0.7), 0);
        let engine = SubsidyEngine::new(&p, &CriticalValueTable);
        let participants = vec![
            participant("idle", 0),
            participant("a", 1),
            participant("b", 1),
            participant("c", 2),
        ];
        let (shares, pool) = engine
            .compute_pool_and_shares(&participants, &EpochWeightSnapshot::default())
            .unwrap();

        // pool = floor(4 / 0.3) = 13; base shares 3, 3, 6 leave 1
        assert_eq!(pool.amount, 13);
        let rewards: Vec<u64> = shares.iter().map(|s| s.reward_coins).collect();
        assert_eq!(rewards, vec![0, 4, 3, 6]);
    }

    #[test]
    fn test_invalid_and_negative_participants() {
        let p = params(dec!(0.9), 0);
        let engine = SubsidyEngine::new(&p, &CriticalValueTable);
        let participants = vec![
            Participant::new("invalid", 500, ParticipantStatus::Invalid),
            participant("negative", -5),
            participant("ok", 100),
        ];
        let (shares, pool) = engine
            .compute_pool_and_shares(&participants, &EpochWeightSnapshot::default())
            .unwrap();

        assert_eq!((shares[0].work_coins, shares[0].reward_coins), (0, 0));
        assert_eq!(
            shares[1].fault,
            Some(ShareFault::NegativeCoinBalance(-5))
        );
        assert_eq!(shares[1].reward_coins, 0);
        assert_eq!(shares[2].reward_coins, 1_000);
        assert_eq!(pool.amount, 1_000);
    }

    #[test]
    fn test_punished_work_leaves_denominator() {
        let p = params(dec!(0.9), 0);
        let engine = SubsidyEngine::new(&p, &CriticalValueTable);
        let mut absent = participant("absent", 100);
        absent.current_epoch_stats.inference_count = 10;
        absent.current_epoch_stats.missed_requests = 90;
        let participants = vec![absent, participant("present", 100)];

        let (shares, pool) = engine
            .compute_pool_and_shares(&participants, &EpochWeightSnapshot::default())
            .unwrap();

        assert!(shares[0].punished);
        assert_eq!(shares[0].work_coins, 100);
        assert_eq!(shares[0].reward_coins, 0);
        assert_eq!(pool.amount, 1_000);
        assert_eq!(shares[1].reward_coins, 1_000);
    }
}
