use serde::{Deserialize, Serialize};

/// Bech32-style account address; opaque to this crate.
pub type Address = String;

/// Model id of the main (parent) epoch group.
pub const MAIN_MODEL_ID: &str = "";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantStatus {
    #[default]
    Ramping,
    Active,
    Invalid,
}

/// Counters accumulated by a participant during the running epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentEpochStats {
    pub inference_count: u64,
    pub missed_requests: u64,
    pub validated_inferences: u64,
    pub invalidated_inferences: u64,
    pub earned_coins: u64,
}

impl CurrentEpochStats {
    /// Requests the participant was assigned: served plus missed.
    pub fn total_requests(&self) -> u64 {
        self.inference_count.saturating_add(self.missed_requests)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub address: Address,
    /// Unsettled work-fee revenue. Negative at settlement time is a fault.
    pub coin_balance: i64,
    #[serde(default)]
    pub status: ParticipantStatus,
    #[serde(default)]
    pub epochs_completed: u32,
    #[serde(default)]
    pub current_epoch_stats: CurrentEpochStats,
}

impl Participant {
    pub fn new(address: impl Into<Address>, coin_balance: i64, status: ParticipantStatus) -> Self {
        Self {
            address: address.into(),
            coin_balance,
            status,
            epochs_completed: 0,
            current_epoch_stats: CurrentEpochStats::default(),
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.status == ParticipantStatus::Invalid
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MlNodeInfo {
    pub node_id: String,
    #[serde(default)]
    pub poc_weight: i64,
    /// Indexed by timeslot; see [`MlNodeInfo::POC_SLOT`].
    #[serde(default)]
    pub timeslot_allocation: Vec<bool>,
}

impl MlNodeInfo {
    pub const POC_SLOT: usize = 1;

    pub fn is_active_during_poc(&self) -> bool {
        self.timeslot_allocation
            .get(Self::POC_SLOT)
            .copied()
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWeight {
    pub member_address: Address,
    /// Raw PoC weight; negative values count as zero eligible weight.
    pub weight: i64,
    #[serde(default)]
    pub reputation: i32,
    #[serde(default)]
    pub ml_nodes: Vec<MlNodeInfo>,
}

impl ValidationWeight {
    pub fn eligible_weight(&self) -> u64 {
        u64::try_from(self.weight).unwrap_or(0)
    }

    pub fn is_active_during_poc(&self) -> bool {
        self.ml_nodes.iter().any(MlNodeInfo::is_active_during_poc)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedSignature {
    pub member_address: Address,
    /// Hex-encoded signature over the big-endian claim seed.
    pub signature: String,
}

/// Computational-weight snapshot of an epoch group. Immutable once written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochWeightSnapshot {
    pub epoch_index: u64,
    #[serde(default)]
    pub model_id: String,
    pub validation_weights: Vec<ValidationWeight>,
    #[serde(default)]
    pub member_seed_signatures: Vec<SeedSignature>,
    #[serde(default)]
    pub sub_group_models: Vec<String>,
}

impl EpochWeightSnapshot {
    pub fn weight_of(&self, address: &str) -> Option<&ValidationWeight> {
        self.validation_weights
            .iter()
            .find(|w| w.member_address == address)
    }

    pub fn seed_signature_of(&self, address: &str) -> Option<&str> {
        self.member_seed_signatures
            .iter()
            .find(|s| s.member_address == address)
            .map(|s| s.signature.as_str())
    }

    /// Sum of raw weights, negatives included.
    pub fn total_raw_weight(&self) -> i64 {
        self.validation_weights
            .iter()
            .fold(0i64, |acc, w| acc.saturating_add(w.weight))
    }
}

/// Payable record produced by settlement and consumed by a claim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleAmount {
    pub participant: Address,
    pub epoch_index: u64,
    pub work_coins: u64,
    pub reward_coins: u64,
    #[serde(default)]
    pub seed_signature: String,
}

impl SettleAmount {
    pub fn total_coins(&self) -> u64 {
        self.work_coins.saturating_add(self.reward_coins)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochPerformanceSummary {
    pub epoch_index: u64,
    pub participant_id: Address,
    pub inference_count: u64,
    pub missed_requests: u64,
    pub validated_inferences: u64,
    pub invalidated_inferences: u64,
    pub earned_coins: u64,
    pub work_coins: u64,
    pub rewarded_coins: u64,
    pub claimed: bool,
}

/// Finished inference as seen by the claim coverage check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceValidationDetails {
    pub epoch_index: u64,
    pub inference_id: String,
    pub executor_id: Address,
    #[serde(default)]
    pub model: String,
    /// 0..=100
    pub executor_reputation: i32,
    pub traffic_basis: u64,
    #[serde(default)]
    pub created_at_block_height: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochInfo {
    pub index: u64,
    pub poc_start_block_height: i64,
}
