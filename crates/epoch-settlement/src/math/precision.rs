use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrecisionError {
    #[error("value {0} is not representable as a single-precision rate")]
    Unrepresentable(String),
}

/// A decimal constrained to the values an IEEE-754 binary32 can hold.
///
/// The stored decimal is always the shortest decimal string that round-trips
/// through `f32`, e.g. `0.9` rather than `0.89999997615814208984375`. Products
/// are formed in binary32 (round-to-nearest-even) and re-rendered, which
/// matches how subsidy rates were historically persisted on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct SinglePrecisionRate(Decimal);

impl SinglePrecisionRate {
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Rounds `value` to the nearest binary32 and keeps its shortest decimal form.
    pub fn from_decimal(value: Decimal) -> Result<Self, PrecisionError> {
        let single = f32::from_str(&value.to_string())
            .map_err(|_| PrecisionError::Unrepresentable(value.to_string()))?;
        Self::from_f32(single)
    }

    pub fn from_f32(value: f32) -> Result<Self, PrecisionError> {
        if !value.is_finite() {
            return Err(PrecisionError::Unrepresentable(value.to_string()));
        }
        // `Display` for f32 yields the shortest round-trip digits without exponent
        let rendered = value.to_string();
        Decimal::from_str(&rendered)
            .map(|d| Self(d.normalize()))
            .map_err(|_| PrecisionError::Unrepresentable(rendered))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn to_f32(&self) -> f32 {
        // Always parses: the decimal was produced from an f32 rendering
        f32::from_str(&self.0.to_string()).unwrap_or(0.0)
    }

    /// `self * (1 - fraction)` evaluated in binary32.
    pub fn decreased_by(&self, fraction: Decimal) -> Result<Self, PrecisionError> {
        let fraction = Self::from_decimal(fraction)?.to_f32();
        Self::from_f32(self.to_f32() * (1.0f32 - fraction))
    }
}

impl TryFrom<Decimal> for SinglePrecisionRate {
    type Error = PrecisionError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::from_decimal(value)
    }
}

impl From<SinglePrecisionRate> for Decimal {
    fn from(value: SinglePrecisionRate) -> Self {
        value.0
    }
}

impl fmt::Display for SinglePrecisionRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::dec;

    #[test]
    fn test_shortest_representation_is_kept() {
        let rate = SinglePrecisionRate::from_decimal(dec!(0.9)).unwrap();
        assert_eq!(rate.as_decimal(), dec!(0.9));
    }

    #[test]
    fn test_excess_precision_is_dropped() {
        // 0.123456789 has no exact binary32 neighbour with that many digits
        let rate = SinglePrecisionRate::from_decimal(dec!(0.123456789)).unwrap();
        assert_eq!(rate.as_decimal(), dec!(0.12345679));
    }

    #[test]
    fn test_decrease_in_single_precision() {
        let rate = SinglePrecisionRate::from_decimal(dec!(0.9)).unwrap();
        let next = rate.decreased_by(dec!(0.2)).unwrap();
        // float32(0.9) * 0.8 rounds below 0.72
        assert_eq!(next.as_decimal(), dec!(0.71999997));
    }

    #[test]
    fn test_serde_round_trip_canonicalizes() {
        let rate: SinglePrecisionRate = serde_json::from_str("\"0.5\"").unwrap();
        assert_eq!(rate.as_decimal(), dec!(0.5));
        assert_eq!(serde_json::to_string(&rate).unwrap(), "\"0.5\"");
    }
}
