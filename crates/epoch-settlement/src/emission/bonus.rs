use crate::types::EpochWeightSnapshot;
use rust_decimal::Decimal;

/// Per-participant multipliers applied to PoC weight before distribution.
///
/// Non-positive multipliers are treated as neutral by the engine.
pub trait BonusStrategy {
    fn utilization_multiplier(&self, participant: &str, snapshot: &EpochWeightSnapshot) -> Decimal;

    fn coverage_multiplier(&self, participant: &str, snapshot: &EpochWeightSnapshot) -> Decimal;
}

/// Every multiplier is 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeutralBonus;

impl BonusStrategy for NeutralBonus {
    fn utilization_multiplier(&self, _participant: &str, _snapshot: &EpochWeightSnapshot) -> Decimal {
        Decimal::ONE
    }

    fn coverage_multiplier(&self, _participant: &str, _snapshot: &EpochWeightSnapshot) -> Decimal {
        Decimal::ONE
    }
}
