use rust_decimal::{Decimal, dec};

/// Inputs above this bound overflow the 96-bit mantissa once multiplied by a
/// reward, inputs below it underflow to zero.
pub const EXP_INPUT_LIMIT: Decimal = dec!(66);

const REDUCTION_BOUND: Decimal = dec!(0.5);
const MAX_SERIES_TERMS: u32 = 64;

/// Deterministic `e^x` over `rust_decimal`.
///
/// The argument is halved until `|r| <= 0.5`, `e^r` is summed from its Taylor
/// series until the next term rounds to zero, then squared back up. Every
/// step is decimal arithmetic, so all nodes produce identical digits.
///
/// Returns `None` when `x` exceeds [`EXP_INPUT_LIMIT`] or an intermediate
/// overflows; callers treat that as a non-finite result.
pub fn exp(x: Decimal) -> Option<Decimal> {
    if x.is_zero() {
        return Some(Decimal::ONE);
    }
    if x > EXP_INPUT_LIMIT {
        return None;
    }
    if x < -EXP_INPUT_LIMIT {
        return Some(Decimal::ZERO);
    }

    let mut reduced = x;
    let mut halvings = 0u32;
    while reduced.abs() > REDUCTION_BOUND {
        reduced /= Decimal::TWO;
        halvings += 1;
    }

    let mut sum = Decimal::ONE;
    let mut term = Decimal::ONE;
    for n in 1..=MAX_SERIES_TERMS {
        term = term.checked_mul(reduced)?.checked_div(Decimal::from(n))?;
        if term.is_zero() {
            break;
        }
        sum = sum.checked_add(term)?;
    }

    for _ in 0..halvings {
        sum = sum.checked_mul(sum)?;
    }
    Some(sum)
}
