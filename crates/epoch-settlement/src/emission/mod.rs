//! Emission policies: how big this epoch's reward pool is and how it is
//! split across participants.
//!
//! Both engines return one [`ParticipantShare`] per input participant, in
//! input order, and a [`RewardPool`] whose amount equals the sum of the
//! distributed reward coins.

pub mod bitcoin;
pub mod bonus;
pub mod subsidy;

pub use bitcoin::{BitcoinEmissionEngine, calculate_fixed_epoch_reward};
pub use bonus::{BonusStrategy, NeutralBonus};
pub use subsidy::{SubsidyEngine, compute_subsidy_pool};

use crate::{
    error::{Result, SettlementError, ShareFault},
    types::{Address, EpochWeightSnapshot, Participant},
};
use serde::{Deserialize, Serialize};

/// One participant's outcome of an emission computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantShare {
    pub address: Address,
    /// Preserved fee balance; independent of the emission policy.
    pub work_coins: u64,
    pub reward_coins: u64,
    /// Reward zeroed by the downtime test.
    pub punished: bool,
    pub fault: Option<ShareFault>,
}

impl ParticipantShare {
    pub fn new(address: &str, work_coins: u64) -> Self {
        Self {
            address: address.to_string(),
            work_coins,
            reward_coins: 0,
            punished: false,
            fault: None,
        }
    }

    pub fn faulted(address: &str, fault: ShareFault) -> Self {
        Self {
            fault: Some(fault),
            ..Self::new(address, 0)
        }
    }

    pub fn total_coins(&self) -> u64 {
        self.work_coins.saturating_add(self.reward_coins)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum PoolDetail {
    Subsidy { crossed_cutoff: bool },
    Bitcoin { epoch_number: u64, decay_applied: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardPool {
    pub amount: i64,
    pub detail: PoolDetail,
}

impl RewardPool {
    pub fn crossed_cutoff(&self) -> bool {
        matches!(
            self.detail,
            PoolDetail::Subsidy {
                crossed_cutoff: true
            }
        )
    }
}

/// A policy able to size and split an epoch's reward pool.
pub trait EmissionEngine {
    fn compute_pool_and_shares(
        &self,
        participants: &[Participant],
        snapshot: &EpochWeightSnapshot,
    ) -> Result<(Vec<ParticipantShare>, RewardPool)>;
}

/// Credits `pool - Σ reward_coins` to `shares[recipient]`.
///
/// Returns the amount that ends up distributed: `pool` when a recipient
/// exists, otherwise the plain sum (nothing is left unassigned).
pub(crate) fn distribute_remainder(
    shares: &mut [ParticipantShare],
    pool: u64,
    recipient: Option<usize>,
) -> Result<u64> {
    let distributed = shares
        .iter()
        .try_fold(0u64, |acc, s| acc.checked_add(s.reward_coins))
        .ok_or(SettlementError::Arithmetic("distributed reward overflow"))?;
    let remainder = pool
        .checked_sub(distributed)
        .ok_or(SettlementError::Arithmetic("distributed more than the pool"))?;
    if remainder == 0 {
        return Ok(pool);
    }
    match recipient.and_then(|i| shares.get_mut(i)) {
        Some(share) => {
            share.reward_coins = share
                .reward_coins
                .checked_add(remainder)
                .ok_or(SettlementError::Arithmetic("remainder overflow"))?;
            Ok(pool)
        }
        None => Ok(distributed),
    }
}

pub(crate) fn pool_to_i64(amount: u64) -> Result<i64> {
    i64::try_from(amount).map_err(|_| SettlementError::Arithmetic("reward pool exceeds i64"))
}
