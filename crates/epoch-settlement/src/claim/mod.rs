//! Reward claims against the previous epoch's settle amount.
//!
//! Expected rejections are returned as a [`ClaimResponse`] carrying a
//! [`ClaimOutcome`], not as errors. Only a failed finalization write is an
//! error.

pub mod coverage;
pub mod signature;

pub use coverage::{CoverageCheck, CoverageSummary, EpochContext, should_validate};
pub use signature::{SignatureError, verify_seed_signature};

use crate::{
    error::Result,
    params::{GovernanceParams, TokenomicsState},
    stats::MissedStatTest,
    store::{AccountService, Ledger, SettlementStore},
    types::SettleAmount,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub claimant: String,
    pub epoch_index: u64,
    pub seed: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimOutcome {
    EpochGroupNotFound,
    EpochNotClaimable,
    NoSettleAmount,
    EpochMismatch,
    NothingToClaim,
    InvalidSignature,
    CoverageUnavailable,
    ValidationsMissed,
    InsufficientWorkFunds,
    WorkPaymentFailed,
    WorkPaidRewardsFailed,
    Paid,
}

impl ClaimOutcome {
    pub fn result_text(&self) -> &'static str {
        match self {
            Self::EpochGroupNotFound => "Can't validate claim, current epoch group not found",
            Self::EpochNotClaimable => {
                "Can't validate claim, current epoch group does not match previous epoch"
            }
            Self::NoSettleAmount | Self::NothingToClaim => "No rewards for this address",
            Self::EpochMismatch => "No rewards for this block height",
            Self::InvalidSignature => "Seed signature validation failed",
            Self::CoverageUnavailable => "Failed to check for missed validations",
            Self::ValidationsMissed => "Inference validation missed significantly",
            Self::InsufficientWorkFunds => {
                "Insufficient funds for paying participant for work! Unpaid settlement"
            }
            Self::WorkPaymentFailed => "Error paying participant from escrow",
            Self::WorkPaidRewardsFailed => "Work paid, but rewards failed.",
            Self::Paid => "Rewards claimed successfully",
        }
    }

    /// Settle amount consumed by this claim.
    pub fn is_finalized(&self) -> bool {
        matches!(self, Self::WorkPaidRewardsFailed | Self::Paid)
    }

    fn label(&self) -> &'static str {
        match self {
            Self::EpochGroupNotFound => "epoch_group_not_found",
            Self::EpochNotClaimable => "epoch_not_claimable",
            Self::NoSettleAmount => "no_settle_amount",
            Self::EpochMismatch => "epoch_mismatch",
            Self::NothingToClaim => "nothing_to_claim",
            Self::InvalidSignature => "invalid_signature",
            Self::CoverageUnavailable => "coverage_unavailable",
            Self::ValidationsMissed => "validations_missed",
            Self::InsufficientWorkFunds => "insufficient_work_funds",
            Self::WorkPaymentFailed => "work_payment_failed",
            Self::WorkPaidRewardsFailed => "work_paid_rewards_failed",
            Self::Paid => "paid",
        }
    }
}

impl fmt::Display for ClaimOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.result_text())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub amount: u64,
    pub result: String,
    pub outcome: ClaimOutcome,
}

impl ClaimResponse {
    fn new(outcome: ClaimOutcome, amount: u64) -> Self {
        metrics::counter!("epoch_settlement_claims", "outcome" => outcome.label()).increment(1);
        Self {
            amount,
            result: outcome.result_text().to_string(),
            outcome,
        }
    }

    fn rejected(outcome: ClaimOutcome) -> Self {
        Self::new(outcome, 0)
    }
}

pub struct ClaimProcessor<'a> {
    params: &'a GovernanceParams,
    stat_test: &'a dyn MissedStatTest,
    accounts: &'a dyn AccountService,
}

impl<'a> ClaimProcessor<'a> {
    pub fn new(
        params: &'a GovernanceParams,
        stat_test: &'a dyn MissedStatTest,
        accounts: &'a dyn AccountService,
    ) -> Self {
        Self {
            params,
            stat_test,
            accounts,
        }
    }

    /// Validates and pays a claim. Repeating a successful claim returns
    /// [`ClaimOutcome::NoSettleAmount`] and pays nothing.
    pub fn claim_rewards(
        &self,
        store: &mut dyn SettlementStore,
        ledger: &mut dyn Ledger,
        state: &mut TokenomicsState,
        request: &ClaimRequest,
    ) -> Result<ClaimResponse> {
        info!(
            claimant = %request.claimant,
            epoch = request.epoch_index,
            "processing reward claim"
        );
        let settle_amount = match self.validate(&*store, request) {
            Ok(settle_amount) => settle_amount,
            Err(outcome) => {
                info!(claimant = %request.claimant, %outcome, "claim rejected");
                return Ok(ClaimResponse::rejected(outcome));
            }
        };
        self.pay(store, ledger, state, &settle_amount)
    }

    fn validate(
        &self,
        store: &dyn SettlementStore,
        request: &ClaimRequest,
    ) -> std::result::Result<SettleAmount, ClaimOutcome> {
        let current = store
            .current_epoch_index()
            .ok_or(ClaimOutcome::EpochGroupNotFound)?;
        if current.checked_sub(1) != Some(request.epoch_index) {
            warn!(
                current,
                requested = request.epoch_index,
                "claim is not for the previous epoch"
            );
            return Err(ClaimOutcome::EpochNotClaimable);
        }

        let settle_amount = store
            .get_settle_amount(&request.claimant)
            .ok_or(ClaimOutcome::NoSettleAmount)?;
        if settle_amount.epoch_index != request.epoch_index {
            return Err(ClaimOutcome::EpochMismatch);
        }
        if settle_amount.total_coins() == 0 {
            return Err(ClaimOutcome::NothingToClaim);
        }

        if let Err(e) = verify_seed_signature(
            self.accounts,
            &request.claimant,
            request.seed,
            &settle_amount.seed_signature,
        ) {
            warn!(claimant = %request.claimant, error = %e, "seed signature rejected");
            return Err(ClaimOutcome::InvalidSignature);
        }

        let summary = CoverageCheck::new(self.params, store)
            .evaluate(&request.claimant, request.epoch_index, request.seed)
            .map_err(|e| {
                error!(claimant = %request.claimant, error = %e, "coverage check failed");
                ClaimOutcome::CoverageUnavailable
            })?;
        match self.stat_test.missed_stat_test(summary.missed, summary.required()) {
            Ok(true) => Ok(settle_amount),
            Ok(false) => {
                warn!(
                    claimant = %request.claimant,
                    missed = summary.missed,
                    required = summary.required(),
                    "too many missed validations"
                );
                Err(ClaimOutcome::ValidationsMissed)
            }
            Err(e) => {
                error!(claimant = %request.claimant, error = %e, "missed validation test failed");
                Err(ClaimOutcome::CoverageUnavailable)
            }
        }
    }

    fn pay(
        &self,
        store: &mut dyn SettlementStore,
        ledger: &mut dyn Ledger,
        state: &mut TokenomicsState,
        settle_amount: &SettleAmount,
    ) -> Result<ClaimResponse> {
        let participant = &settle_amount.participant;
        let tokenomics = &self.params.tokenomics;

        if settle_amount.work_coins > 0 {
            if let Err(e) = ledger.pay_from_escrow(
                participant,
                settle_amount.work_coins,
                &format!("work_coins:{participant}"),
                vesting(tokenomics.work_vesting_period),
            ) {
                error!(participant = %participant, error = %e, "work payment failed");
                let outcome = if e.is_insufficient_funds() {
                    ClaimOutcome::InsufficientWorkFunds
                } else {
                    ClaimOutcome::WorkPaymentFailed
                };
                return Ok(ClaimResponse::rejected(outcome));
            }
            state.total_fees = state.total_fees.saturating_add(settle_amount.work_coins);
        }

        let mut outcome = ClaimOutcome::Paid;
        let mut amount = settle_amount.total_coins();
        if settle_amount.reward_coins > 0 {
            let paid = ledger.pay_from_module(
                participant,
                settle_amount.reward_coins,
                &format!("reward_coins:{participant}"),
                vesting(tokenomics.reward_vesting_period),
            );
            if let Err(e) = paid {
                error!(participant = %participant, error = %e, "reward payment failed after work was paid");
                outcome = ClaimOutcome::WorkPaidRewardsFailed;
                amount = settle_amount.work_coins;
            }
        }

        store.finalize_claim(participant, settle_amount.epoch_index)?;
        info!(
            participant = %participant,
            epoch = settle_amount.epoch_index,
            amount,
            %outcome,
            "claim finalized"
        );
        Ok(ClaimResponse::new(outcome, amount))
    }
}

fn vesting(period: u64) -> Option<u64> {
    (period > 0).then_some(period)
}
