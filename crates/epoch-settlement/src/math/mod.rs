//! Integer and decimal helpers shared by the emission engines, the supply cap
//! and the claim coverage check.
//!
//! Everything feeding a distributed amount goes through integer or
//! `rust_decimal` arithmetic; binary floating point is confined to
//! [`SinglePrecisionRate`], which reproduces the historical float32 subsidy
//! rate bit for bit.

mod exp;
mod precision;

pub use exp::{EXP_INPUT_LIMIT, exp};
pub use precision::{PrecisionError, SinglePrecisionRate};

use rust_decimal::{Decimal, prelude::ToPrimitive};

/// `floor(value * numerator / denominator)` computed in 128 bits.
///
/// Returns `None` for a zero denominator, on overflow, or when the quotient
/// does not fit back into a `u64`.
pub fn mul_div_floor(value: u64, numerator: u64, denominator: u64) -> Option<u64> {
    if denominator == 0 {
        return None;
    }
    let product = u128::from(value).checked_mul(u128::from(numerator))?;
    u64::try_from(product / u128::from(denominator)).ok()
}

/// Truncates a non-negative decimal to an `i64`. Negative values and values
/// beyond `i64::MAX` yield `None`.
pub fn floor_to_i64(value: Decimal) -> Option<i64> {
    if value.is_sign_negative() && !value.is_zero() {
        return None;
    }
    value.floor().to_i64()
}

/// `floor(numerator / denominator)` for decimals; `None` when the denominator
/// is zero or the division overflows.
pub fn div_floor(numerator: Decimal, denominator: Decimal) -> Option<Decimal> {
    numerator.checked_div(denominator).map(|q| q.floor())
}
