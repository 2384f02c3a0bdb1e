use crate::{
    emission::{ParticipantShare, RewardPool, distribute_remainder, pool_to_i64},
    error::{Result, SettlementError},
    math,
};
use tracing::{info, warn};

/// Shrinks the pool to the remaining supply headroom.
///
/// Rewards are scaled by `remaining / original` with the scaling remainder
/// given to the first participant still holding a reward (falling back to the
/// first that held one before scaling). Returns whether the cap bit.
///
/// Negative supply counters are rejected before any share is touched.
pub fn apply_supply_cap(
    shares: &mut [ParticipantShare],
    pool: &mut RewardPool,
    total_paid: i64,
    total_supply: i64,
) -> Result<bool> {
    if total_paid < 0 || total_supply < 0 {
        return Err(SettlementError::InvalidParameters(format!(
            "supply counters must be non-negative (paid {total_paid}, supply {total_supply})"
        )));
    }
    if total_paid >= total_supply {
        if pool.amount > 0 || shares.iter().any(|s| s.reward_coins > 0) {
            warn!(
                "Supply exhausted ({} of {}), zeroing pool of {}",
                total_paid, total_supply, pool.amount
            );
        }
        shares.iter_mut().for_each(|s| s.reward_coins = 0);
        pool.amount = 0;
        return Ok(true);
    }

    if total_paid.saturating_add(pool.amount) <= total_supply {
        return Ok(false);
    }

    let original = pool.amount.unsigned_abs();
    let remaining = total_supply
        .checked_sub(total_paid)
        .ok_or(SettlementError::Arithmetic("supply headroom overflow"))?
        .unsigned_abs();
    let first_before = shares.iter().position(|s| s.reward_coins > 0);
    for share in shares.iter_mut() {
        share.reward_coins = math::mul_div_floor(share.reward_coins, remaining, original)
            .ok_or(SettlementError::Arithmetic("supply cap scaling overflow"))?;
    }
    let recipient = shares
        .iter()
        .position(|s| s.reward_coins > 0)
        .or(first_before);
    let distributed = distribute_remainder(shares, remaining, recipient)?;

    info!(
        "Reward pool capped from {} to {} (paid {}, supply {})",
        original, distributed, total_paid, total_supply
    );
    pool.amount = pool_to_i64(distributed)?;
    Ok(true)
}
