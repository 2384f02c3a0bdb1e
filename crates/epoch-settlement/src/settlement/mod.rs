//! Per-epoch settlement driver.
//!
//! Runs strictly in order: load participants and the main weight snapshot,
//! compute pool and shares with the active emission policy, enforce the
//! supply cap, mint, then write per-participant bookkeeping and settle
//! amounts, and finally expire settle amounts older than the previous epoch.
//! Any error is fatal for the epoch; the host discards the block.

pub mod cap;

pub use cap::apply_supply_cap;

use crate::{
    downtime::CollateralDowntimeCheck,
    emission::{
        BitcoinEmissionEngine, BonusStrategy, EmissionEngine, NeutralBonus, ParticipantShare,
        RewardPool, SubsidyEngine,
    },
    error::{Result, SettlementError},
    math::SinglePrecisionRate,
    params::{EmissionPolicy, GovernanceParams, TokenomicsState},
    stats::MissedStatTest,
    store::{
        BURN_REASON_EXPIRED, BURN_REASON_REPLACED, CollateralSlasher, Ledger, MINT_REASON,
        SettlementStore,
    },
    types::{
        EpochPerformanceSummary, EpochWeightSnapshot, MAIN_MODEL_ID, Participant, SettleAmount,
    },
};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tabled::Tabled;
use tracing::{debug, error, info, warn};

/// Mutable collaborators of one settlement pass.
pub struct SettlementContext<'a> {
    pub store: &'a mut dyn SettlementStore,
    pub ledger: &'a mut dyn Ledger,
    pub slasher: &'a mut dyn CollateralSlasher,
}

/// Per-participant line of a settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Tabled)]
pub struct SettlementRecord {
    pub participant: String,
    pub work_coins: u64,
    pub reward_coins: u64,
    pub punished: bool,
    pub slashed: bool,
    pub settled: bool,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReport {
    pub epoch_index: u64,
    pub previous_epoch_index: u64,
    pub pool: RewardPool,
    pub capped: bool,
    pub minted: u64,
    pub replaced_burned: u64,
    pub expired_burned: u64,
    pub expired_removed: usize,
    pub records: Vec<SettlementRecord>,
}

impl SettlementReport {
    pub fn total_reward_coins(&self) -> u64 {
        self.records.iter().map(|r| r.reward_coins).sum()
    }

    pub fn total_work_coins(&self) -> u64 {
        self.records.iter().map(|r| r.work_coins).sum()
    }
}

/// Settles epochs against a fixed governance snapshot.
pub struct EpochSettler<'a> {
    params: &'a GovernanceParams,
    stat_test: &'a dyn MissedStatTest,
    bonus: &'a dyn BonusStrategy,
}

impl<'a> EpochSettler<'a> {
    pub fn new(params: &'a GovernanceParams, stat_test: &'a dyn MissedStatTest) -> Self {
        Self {
            params,
            stat_test,
            bonus: &NeutralBonus,
        }
    }

    pub fn with_bonus(mut self, bonus: &'a dyn BonusStrategy) -> Self {
        self.bonus = bonus;
        self
    }

    /// Settles `current_epoch`. Returns `Ok(None)` for the genesis epoch.
    ///
    /// `state` is only updated when the whole pass succeeds.
    pub fn settle_epoch(
        &self,
        ctx: &mut SettlementContext<'_>,
        state: &mut TokenomicsState,
        current_epoch: u64,
        previous_epoch: u64,
    ) -> Result<Option<SettlementReport>> {
        if current_epoch == 0 {
            info!("Settlement skipped for epoch 0");
            return Ok(None);
        }
        info!("Settling epoch {} (previous {})", current_epoch, previous_epoch);

        let participants = ctx.store.get_all_participants();
        let snapshot = ctx
            .store
            .get_epoch_weight_snapshot(current_epoch, MAIN_MODEL_ID)
            .ok_or_else(|| SettlementError::SnapshotNotFound {
                epoch: current_epoch,
                model_id: MAIN_MODEL_ID.to_string(),
            })?;
        debug!("Loaded {} participants", participants.len());

        let mut next_state = state.clone();
        let policy = self.params.emission_policy(&next_state);
        let (mut shares, mut pool) = self.compute(&policy, current_epoch, &participants, &snapshot)?;
        if pool.amount < 0 {
            error!("Reward pool is negative: {}", pool.amount);
            return Err(SettlementError::NegativeRewardAmount(pool.amount));
        }
        if shares.len() != participants.len() {
            return Err(SettlementError::Arithmetic("share count does not match participants"));
        }

        let capped = apply_supply_cap(
            &mut shares,
            &mut pool,
            next_state.total_subsidy_paid,
            self.params.tokenomics.total_subsidy_supply,
        )?;
        if capped {
            metrics::counter!("epoch_settlement_supply_capped").increment(1);
        }

        let minted = pool.amount.unsigned_abs();
        if minted > 0 {
            ctx.ledger
                .mint(minted, MINT_REASON)
                .map_err(SettlementError::Mint)?;
        } else {
            info!("Nothing to mint for epoch {}", current_epoch);
        }
        next_state.total_subsidy_paid = next_state
            .total_subsidy_paid
            .checked_add(pool.amount)
            .ok_or(SettlementError::Arithmetic("total subsidy paid overflow"))?;
        metrics::gauge!("epoch_settlement_minted").set(minted as f64);

        if pool.crossed_cutoff() {
            // The stored rate is rounded to 4 decimal places, so 0.9 at a 20%
            // decrease persists as 0.72 rather than the binary32 product.
            let reduced = reduced_subsidy_rate(
                next_state.current_subsidy_percentage.as_decimal(),
                self.params.tokenomics.subsidy_reduction_amount,
            )?;
            info!(
                "Subsidy cutoff crossed, rate {} -> {}",
                next_state.current_subsidy_percentage, reduced
            );
            next_state.current_subsidy_percentage = reduced;
        }

        let mut report = SettlementReport {
            epoch_index: current_epoch,
            previous_epoch_index: previous_epoch,
            pool,
            capped,
            minted,
            replaced_burned: 0,
            expired_burned: 0,
            expired_removed: 0,
            records: Vec::with_capacity(participants.len()),
        };

        let collateral = CollateralDowntimeCheck::new(&self.params.collateral);
        for (participant, share) in participants.into_iter().zip(shares) {
            let slashed = collateral.check(&mut *ctx.slasher, &participant);
            let record = self.record_participant(
                ctx,
                &mut next_state,
                &mut report,
                participant,
                &share,
                &snapshot,
                current_epoch,
            )?;
            report.records.push(SettlementRecord { slashed, ..record });
        }

        if previous_epoch != 0 {
            self.expire_settle_amounts(ctx, &mut next_state, &mut report, previous_epoch);
        }

        *state = next_state;
        metrics::counter!("epoch_settlement_epochs_settled").increment(1);
        info!(
            "Settled epoch {}: minted {}, {} participants",
            current_epoch,
            report.minted,
            report.records.len()
        );
        Ok(Some(report))
    }

    fn compute(
        &self,
        policy: &EmissionPolicy,
        current_epoch: u64,
        participants: &[Participant],
        snapshot: &EpochWeightSnapshot,
    ) -> Result<(Vec<ParticipantShare>, RewardPool)> {
        match policy {
            EmissionPolicy::Subsidy(params) => {
                info!("Using subsidy reward system");
                SubsidyEngine::new(params, self.stat_test).compute_pool_and_shares(participants, snapshot)
            }
            EmissionPolicy::BitcoinStyle(params) => {
                info!("Using bitcoin-style reward system");
                BitcoinEmissionEngine::new(params, current_epoch, self.stat_test, self.bonus)
                    .compute_pool_and_shares(participants, snapshot)
            }
        }
    }

    /// Summary, participant reset and settle amount for one participant.
    #[allow(clippy::too_many_arguments)]
    fn record_participant(
        &self,
        ctx: &mut SettlementContext<'_>,
        state: &mut TokenomicsState,
        report: &mut SettlementReport,
        mut participant: Participant,
        share: &ParticipantShare,
        snapshot: &EpochWeightSnapshot,
        current_epoch: u64,
    ) -> Result<SettlementRecord> {
        let stats = std::mem::take(&mut participant.current_epoch_stats);
        if !participant.is_invalid() {
            participant.epochs_completed = participant.epochs_completed.saturating_add(1);
        }
        ctx.store.set_performance_summary(EpochPerformanceSummary {
            epoch_index: current_epoch,
            participant_id: participant.address.clone(),
            inference_count: stats.inference_count,
            missed_requests: stats.missed_requests,
            validated_inferences: stats.validated_inferences,
            invalidated_inferences: stats.invalidated_inferences,
            earned_coins: stats.earned_coins,
            work_coins: share.work_coins,
            rewarded_coins: share.reward_coins,
            claimed: false,
        })?;
        debug!(
            participant = %participant.address,
            balance = participant.coin_balance,
            "resetting coin balance"
        );
        participant.coin_balance = 0;
        let address = participant.address.clone();
        ctx.store.set_participant(participant)?;

        let mut record = SettlementRecord {
            participant: address.clone(),
            work_coins: share.work_coins,
            reward_coins: share.reward_coins,
            punished: share.punished,
            slashed: false,
            settled: false,
            note: String::new(),
        };

        if let Some(fault) = share.fault {
            error!(participant = %address, %fault, "not settling participant");
            record.note = fault.to_string();
            return Ok(record);
        }
        if share.total_coins() == 0 {
            debug!(participant = %address, "no payment needed");
            return Ok(record);
        }

        if let Some(existing) = ctx.store.get_settle_amount(&address) {
            let burned = burn_settle_amount(ctx, &existing, BURN_REASON_REPLACED)?;
            state.total_burned = state.total_burned.saturating_add(burned);
            report.replaced_burned = report.replaced_burned.saturating_add(burned);
            record.note = format!("replaced unclaimed epoch {}", existing.epoch_index);
        }

        let settle_amount = SettleAmount {
            participant: address.clone(),
            epoch_index: current_epoch,
            work_coins: share.work_coins,
            reward_coins: share.reward_coins,
            seed_signature: snapshot
                .seed_signature_of(&address)
                .map(str::to_string)
                .unwrap_or_default(),
        };
        info!(
            participant = %address,
            work_coins = settle_amount.work_coins,
            reward_coins = settle_amount.reward_coins,
            "settle amount written"
        );
        ctx.store.set_settle_amount(settle_amount)?;
        record.settled = true;
        Ok(record)
    }

    /// Burns and removes settle amounts older than `before_epoch`. Failures
    /// are logged and the entry is left for the next pass.
    fn expire_settle_amounts(
        &self,
        ctx: &mut SettlementContext<'_>,
        state: &mut TokenomicsState,
        report: &mut SettlementReport,
        before_epoch: u64,
    ) {
        info!("Burning settle amounts older than epoch {}", before_epoch);
        for settle_amount in ctx.store.get_all_settle_amounts() {
            if settle_amount.epoch_index >= before_epoch {
                continue;
            }
            match burn_settle_amount(ctx, &settle_amount, BURN_REASON_EXPIRED) {
                Ok(burned) => {
                    ctx.store.remove_settle_amount(&settle_amount.participant);
                    state.total_burned = state.total_burned.saturating_add(burned);
                    report.expired_burned = report.expired_burned.saturating_add(burned);
                    report.expired_removed += 1;
                }
                Err(e) => {
                    warn!(participant = %settle_amount.participant, error = %e, "failed to expire settle amount");
                }
            }
        }
    }
}

fn burn_settle_amount(
    ctx: &mut SettlementContext<'_>,
    settle_amount: &SettleAmount,
    reason: &str,
) -> Result<u64> {
    let total = settle_amount.total_coins();
    if total == 0 {
        return Ok(0);
    }
    ctx.ledger
        .burn(total, &format!("{reason}:{}", settle_amount.participant))
        .map_err(SettlementError::Burn)?;
    info!(
        participant = %settle_amount.participant,
        amount = total,
        reason,
        "burned settle amount"
    );
    Ok(total)
}

/// Persisted rate after a stage cutoff: `rate * (1 - decrease)` to 4 places.
pub fn reduced_subsidy_rate(rate: Decimal, decrease: Decimal) -> Result<SinglePrecisionRate> {
    let reduced = (rate * (Decimal::ONE - decrease))
        .round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero);
    SinglePrecisionRate::from_decimal(reduced)
        .map_err(|e| SettlementError::InvalidParameters(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::dec;

    #[test]
    fn test_reduced_rate_rounds_to_four_places() {
        assert_eq!(
            reduced_subsidy_rate(dec!(0.9), dec!(0.2)).unwrap().as_decimal(),
            dec!(0.72)
        );
        // 0.72 * 0.8 = 0.576, 0.576 * 0.8 = 0.4608, then 0.36864 -> 0.3686
        assert_eq!(
            reduced_subsidy_rate(dec!(0.4608), dec!(0.2)).unwrap().as_decimal(),
            dec!(0.3686)
        );
    }
}
