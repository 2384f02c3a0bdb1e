//! Recomputes which inferences a claimant was obliged to validate and counts
//! the misses.

use crate::{
    error::CoverageError,
    params::{EpochParams, GovernanceParams, ValidationParams},
    store::SettlementStore,
    types::{EpochInfo, InferenceValidationDetails, MAIN_MODEL_ID, ValidationWeight},
};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Block-height arithmetic of one epoch.
#[derive(Debug, Clone, Copy)]
pub struct EpochContext<'a> {
    pub epoch: EpochInfo,
    params: &'a EpochParams,
}

impl<'a> EpochContext<'a> {
    pub fn new(epoch: EpochInfo, params: &'a EpochParams) -> Self {
        Self { epoch, params }
    }

    pub fn next_poc_start(&self) -> i64 {
        if self.epoch.index == 0 {
            return self.params.epoch_length - self.params.epoch_shift;
        }
        self.epoch.poc_start_block_height + self.params.epoch_length
    }

    /// Inferences created at or after this height overlap the next PoC.
    pub fn inference_validation_cutoff(&self) -> i64 {
        self.next_poc_start() - self.params.inference_validation_cutoff
    }

    pub fn overlaps_with_poc(&self, inference: &InferenceValidationDetails) -> bool {
        if inference.created_at_block_height <= 0 {
            // unset or corrupt heights never exempt
            return false;
        }
        inference.created_at_block_height >= self.inference_validation_cutoff()
    }
}

/// Piecewise-linear minimum validation average for the executor's traffic.
pub fn minimum_validation_average(traffic_basis: u64, params: &ValidationParams) -> Decimal {
    let count = Decimal::from(traffic_basis);
    let full = Decimal::from(params.full_validation_traffic_cutoff);
    if count >= full {
        return params.min_validation_average;
    }
    let halfway = full / Decimal::TWO;
    if count >= halfway {
        let remaining_fraction = (full - count) / halfway;
        let range = params.min_validation_halfway - params.min_validation_average;
        return params.min_validation_average + range * remaining_fraction;
    }
    let min_cutoff = Decimal::from(params.min_validation_traffic_cutoff);
    if count > min_cutoff {
        let to_minimum = (halfway - count) / (halfway - min_cutoff);
        let range = params.max_validation_average - params.min_validation_halfway;
        return params.min_validation_halfway + range * to_minimum;
    }
    params.max_validation_average
}

/// Uniform value in `[0, 1]` from `sha256("{seed}:{inference_id}")`.
pub fn deterministic_float(seed: i64, inference_id: &str) -> Decimal {
    let digest = Sha256::digest(format!("{seed}:{inference_id}").as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    Decimal::from(u64::from_be_bytes(head)) / Decimal::from(u64::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationDecision {
    pub should_validate: bool,
    pub probability: Decimal,
    pub roll: Decimal,
}

/// Seeded draw deciding whether the validator had to check this inference.
pub fn should_validate(
    seed: i64,
    inference: &InferenceValidationDetails,
    total_power: i64,
    validator_power: i64,
    executor_power: i64,
    params: &ValidationParams,
) -> ValidationDecision {
    let reputation = Decimal::from(inference.executor_reputation) / Decimal::ONE_HUNDRED;
    let min_average = minimum_validation_average(inference.traffic_basis, params);
    let range = params.max_validation_average - min_average;
    // full reputation targets the minimum
    let target = min_average + range * (Decimal::ONE - reputation);

    let others = total_power.saturating_sub(executor_power);
    let probability = if others <= 0 {
        Decimal::ZERO
    } else {
        target
            .checked_mul(Decimal::from(validator_power))
            .and_then(|v| v.checked_div(Decimal::from(others)))
            .unwrap_or(Decimal::ONE)
            .min(Decimal::ONE)
    };
    let roll = deterministic_float(seed, &inference.inference_id);
    ValidationDecision {
        should_validate: roll < probability,
        probability,
        roll,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageSummary {
    pub must_validate: Vec<String>,
    pub missed: u64,
    pub skipped_poc: usize,
    pub considered: usize,
}

impl CoverageSummary {
    pub fn required(&self) -> u64 {
        self.must_validate.len() as u64
    }
}

struct ModelWeights {
    members: IndexMap<String, ValidationWeight>,
    total: i64,
}

pub struct CoverageCheck<'a> {
    params: &'a GovernanceParams,
    store: &'a dyn SettlementStore,
}

impl<'a> CoverageCheck<'a> {
    pub fn new(params: &'a GovernanceParams, store: &'a dyn SettlementStore) -> Self {
        Self { params, store }
    }

    fn model_weights(&self, epoch: u64, model_id: &str) -> Option<(Vec<String>, ModelWeights)> {
        let snapshot = self.store.get_epoch_weight_snapshot(epoch, model_id)?;
        let total = snapshot.total_raw_weight();
        let members = snapshot
            .validation_weights
            .into_iter()
            .map(|w| (w.member_address.clone(), w))
            .collect();
        Some((snapshot.sub_group_models, ModelWeights { members, total }))
    }

    /// Inferences `claimant` had to validate in `epoch`, and how many it missed.
    pub fn evaluate(&self, claimant: &str, epoch: u64, seed: i64) -> Result<CoverageSummary, CoverageError> {
        let (sub_models, main) = self
            .model_weights(epoch, MAIN_MODEL_ID)
            .ok_or(CoverageError::EpochGroupNotFound(epoch))?;
        let epoch_info = self
            .store
            .get_epoch(epoch)
            .ok_or(CoverageError::EpochNotFound(epoch))?;
        let context = EpochContext::new(epoch_info, &self.params.epoch);

        if !main.members.contains_key(claimant) {
            return Err(CoverageError::ParticipantNotFound(claimant.to_string()));
        }

        let mut models: IndexMap<String, ModelWeights> = IndexMap::new();
        models.insert(MAIN_MODEL_ID.to_string(), main);
        for model_id in sub_models {
            match self.model_weights(epoch, &model_id) {
                Some((_, weights)) => {
                    models.insert(model_id, weights);
                }
                None => warn!(epoch, model = %model_id, "sub-model epoch data not found"),
            }
        }

        let mut summary = CoverageSummary::default();
        let inferences = self.store.get_inference_validation_details(epoch);
        for inference in &inferences {
            if inference.executor_id == claimant {
                continue;
            }
            let weights = models.get(&inference.model).ok_or_else(|| {
                CoverageError::InferenceHasInvalidModel {
                    inference_id: inference.inference_id.clone(),
                    model: inference.model.clone(),
                }
            })?;
            let Some(validator) = weights.members.get(claimant) else {
                debug!(model = %inference.model, "validator has no weight for model");
                continue;
            };
            let Some(executor) = weights.members.get(&inference.executor_id) else {
                warn!(executor = %inference.executor_id, model = %inference.model, "executor not in weight map");
                continue;
            };
            summary.considered += 1;

            if context.overlaps_with_poc(inference) && !validator.is_active_during_poc() {
                summary.skipped_poc += 1;
                continue;
            }

            let decision = should_validate(
                seed,
                inference,
                weights.total,
                validator.weight,
                executor.weight,
                &self.params.validation,
            );
            if decision.should_validate {
                summary.must_validate.push(inference.inference_id.clone());
            }
        }

        let validated: HashSet<String> = self
            .store
            .get_epoch_group_validations(claimant, epoch)
            .unwrap_or_default()
            .into_iter()
            .collect();
        summary.missed = summary
            .must_validate
            .iter()
            .filter(|id| !validated.contains(*id))
            .count() as u64;

        info!(
            claimant,
            required = summary.must_validate.len(),
            missed = summary.missed,
            skipped_poc = summary.skipped_poc,
            total = inferences.len(),
            "must-validate inferences computed"
        );
        Ok(summary)
    }
}
