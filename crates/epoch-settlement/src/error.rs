use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T = ()> = std::result::Result<T, SettlementError>;

/// Errors that abort an epoch settlement as a whole.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("epoch weight snapshot not found for epoch {epoch} (model '{model_id}')")]
    SnapshotNotFound { epoch: u64, model_id: String },
    #[error("computed reward pool is negative: {0}")]
    NegativeRewardAmount(i64),
    #[error("minting reward pool failed: {0}")]
    Mint(#[source] LedgerError),
    #[error("burning settle amount failed: {0}")]
    Burn(#[source] LedgerError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("arithmetic failure: {0}")]
    Arithmetic(&'static str),
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("write rejected: {0}")]
    Write(String),
}

/// Failures reported by the mint/escrow ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("spendable balance {spendable} is smaller than {required}")]
    InsufficientFunds { spendable: u64, required: u64 },
    #[error("ledger rejected operation: {0}")]
    Rejected(String),
}

impl LedgerError {
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, Self::InsufficientFunds { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatTestError {
    #[error("invalid input: requires missed <= total (missed={missed}, total={total})")]
    InvalidInput { missed: u64, total: u64 },
    #[error("binomial distribution unavailable: {0}")]
    Distribution(String),
}

/// Per-participant faults; the participant is excluded, the epoch still settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ShareFault {
    #[error("negative coin balance: {0}")]
    NegativeCoinBalance(i64),
}

/// Failures of the validation-coverage computation during a claim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoverageError {
    #[error("epoch group data not found for epoch {0}")]
    EpochGroupNotFound(u64),
    #[error("epoch {0} not found")]
    EpochNotFound(u64),
    #[error("participant {0} not found in epoch weights")]
    ParticipantNotFound(String),
    #[error("inference {inference_id} references unknown model '{model}'")]
    InferenceHasInvalidModel { inference_id: String, model: String },
    #[error(transparent)]
    StatTest(#[from] StatTestError),
    #[error("arithmetic failure: {0}")]
    Arithmetic(&'static str),
}
