//! Collaborators consumed by settlement and claims.
//!
//! Persistent storage, the bank/mint ledger, account lookup with signature
//! verification, and collateral are owned by the host chain; this crate only
//! sees these traits. [`memory`] provides an in-process implementation used
//! by the CLI and the integration tests.

pub mod memory;

pub use memory::{ChainState, MemoryCollateral, MemoryLedger, MemoryStore};

use crate::{
    error::{LedgerError, StoreError},
    types::{
        EpochInfo, EpochPerformanceSummary, EpochWeightSnapshot, InferenceValidationDetails,
        Participant, SettleAmount,
    },
};
use mockall::automock;
use rust_decimal::Decimal;

pub const MINT_REASON: &str = "reward_distribution";
pub const BURN_REASON_REPLACED: &str = "expired claim";
pub const BURN_REASON_EXPIRED: &str = "expired";

/// Key-value state read and written by settlement and claims.
pub trait SettlementStore {
    /// All participants in stable registration order.
    fn get_all_participants(&self) -> Vec<Participant>;

    fn get_participant(&self, address: &str) -> Option<Participant>;

    fn set_participant(&mut self, participant: Participant) -> Result<(), StoreError>;

    fn get_epoch_weight_snapshot(&self, epoch: u64, model_id: &str) -> Option<EpochWeightSnapshot>;

    /// Index of the epoch group currently accepting work.
    fn current_epoch_index(&self) -> Option<u64>;

    fn get_epoch(&self, index: u64) -> Option<EpochInfo>;

    fn get_settle_amount(&self, participant: &str) -> Option<SettleAmount>;

    fn get_all_settle_amounts(&self) -> Vec<SettleAmount>;

    fn set_settle_amount(&mut self, settle_amount: SettleAmount) -> Result<(), StoreError>;

    fn remove_settle_amount(&mut self, participant: &str);

    fn get_performance_summary(&self, epoch: u64, participant: &str) -> Option<EpochPerformanceSummary>;

    fn set_performance_summary(&mut self, summary: EpochPerformanceSummary) -> Result<(), StoreError>;

    fn get_inference_validation_details(&self, epoch: u64) -> Vec<InferenceValidationDetails>;

    /// Inference ids the participant validated during `epoch`, if recorded.
    fn get_epoch_group_validations(&self, participant: &str, epoch: u64) -> Option<Vec<String>>;

    /// Removes the settle amount and marks the matching performance summary
    /// claimed. Either both happen or neither does.
    fn finalize_claim(&mut self, participant: &str, epoch: u64) -> Result<(), StoreError>;
}

/// Mint, burn and payout operations of the host bank.
#[automock]
pub trait Ledger {
    fn mint(&mut self, amount: u64, reason: &str) -> Result<(), LedgerError>;

    fn burn(&mut self, amount: u64, reason: &str) -> Result<(), LedgerError>;

    /// Pays fee escrow to `address`, vesting over `vesting_epochs` when set.
    fn pay_from_escrow(
        &mut self,
        address: &str,
        amount: u64,
        memo: &str,
        vesting_epochs: Option<u64>,
    ) -> Result<(), LedgerError>;

    /// Pays minted rewards to `address`, vesting over `vesting_epochs` when set.
    fn pay_from_module(
        &mut self,
        address: &str,
        amount: u64,
        memo: &str,
        vesting_epochs: Option<u64>,
    ) -> Result<(), LedgerError>;
}

/// Account lookup and signature verification.
#[automock]
pub trait AccountService {
    /// Base64 public keys of `address` and of every grantee authorized to
    /// claim on its behalf, in enumeration order.
    fn pubkeys_with_grantees(&self, address: &str) -> Result<Vec<String>, StoreError>;

    fn verify_signature(&self, pubkey: &[u8], message: &[u8], signature: &[u8]) -> bool;
}

#[automock]
pub trait CollateralSlasher {
    fn slash(&mut self, address: &str, fraction: Decimal) -> Result<(), StoreError>;
}
