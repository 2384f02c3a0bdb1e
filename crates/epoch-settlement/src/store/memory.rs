use super::{CollateralSlasher, Ledger, SettlementStore};
use crate::{
    error::{LedgerError, StoreError},
    params::TokenomicsState,
    report::to_json_string,
    types::{
        Address, EpochInfo, EpochPerformanceSummary, EpochWeightSnapshot,
        InferenceValidationDetails, Participant, SettleAmount,
    },
};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};
use std::{fs, io::Write, path::Path};
use tempfile::NamedTempFile;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochGroupValidations {
    pub participant: Address,
    pub epoch_index: u64,
    pub validated_inferences: Vec<String>,
}

/// Ordered in-memory key-value state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    pub current_epoch: Option<u64>,
    #[serde(default)]
    pub epochs: Vec<EpochInfo>,
    /// Keyed by address, in registration order.
    #[serde(default)]
    pub participants: IndexMap<Address, Participant>,
    #[serde(default)]
    pub snapshots: Vec<EpochWeightSnapshot>,
    #[serde(default)]
    pub settle_amounts: IndexMap<Address, SettleAmount>,
    #[serde(default)]
    pub performance_summaries: Vec<EpochPerformanceSummary>,
    #[serde(default)]
    pub inferences: Vec<InferenceValidationDetails>,
    #[serde(default)]
    pub validations: Vec<EpochGroupValidations>,
}

impl MemoryStore {
    pub fn add_participant(&mut self, participant: Participant) {
        self.participants
            .insert(participant.address.clone(), participant);
    }

    pub fn performance_summaries_for(&self, participant: &str) -> impl Iterator<Item = &EpochPerformanceSummary> {
        self.performance_summaries
            .iter()
            .filter(move |s| s.participant_id == participant)
    }

    fn summary_position(&self, epoch: u64, participant: &str) -> Option<usize> {
        self.performance_summaries
            .iter()
            .position(|s| s.epoch_index == epoch && s.participant_id == participant)
    }
}

impl SettlementStore for MemoryStore {
    fn get_all_participants(&self) -> Vec<Participant> {
        self.participants.values().cloned().collect()
    }

    fn get_participant(&self, address: &str) -> Option<Participant> {
        self.participants.get(address).cloned()
    }

    fn set_participant(&mut self, participant: Participant) -> Result<(), StoreError> {
        self.participants
            .insert(participant.address.clone(), participant);
        Ok(())
    }

    fn get_epoch_weight_snapshot(&self, epoch: u64, model_id: &str) -> Option<EpochWeightSnapshot> {
        self.snapshots
            .iter()
            .find(|s| s.epoch_index == epoch && s.model_id == model_id)
            .cloned()
    }

    fn current_epoch_index(&self) -> Option<u64> {
        self.current_epoch
    }

    fn get_epoch(&self, index: u64) -> Option<EpochInfo> {
        self.epochs.iter().find(|e| e.index == index).copied()
    }

    fn get_settle_amount(&self, participant: &str) -> Option<SettleAmount> {
        self.settle_amounts.get(participant).cloned()
    }

    fn get_all_settle_amounts(&self) -> Vec<SettleAmount> {
        self.settle_amounts.values().cloned().collect()
    }

    fn set_settle_amount(&mut self, settle_amount: SettleAmount) -> Result<(), StoreError> {
        self.settle_amounts
            .insert(settle_amount.participant.clone(), settle_amount);
        Ok(())
    }

    fn remove_settle_amount(&mut self, participant: &str) {
        self.settle_amounts.shift_remove(participant);
    }

    fn get_performance_summary(&self, epoch: u64, participant: &str) -> Option<EpochPerformanceSummary> {
        self.summary_position(epoch, participant)
            .map(|i| self.performance_summaries[i].clone())
    }

    fn set_performance_summary(&mut self, summary: EpochPerformanceSummary) -> Result<(), StoreError> {
        match self.summary_position(summary.epoch_index, &summary.participant_id) {
            Some(i) => self.performance_summaries[i] = summary,
            None => self.performance_summaries.push(summary),
        }
        Ok(())
    }

    fn get_inference_validation_details(&self, epoch: u64) -> Vec<InferenceValidationDetails> {
        self.inferences
            .iter()
            .filter(|i| i.epoch_index == epoch)
            .cloned()
            .collect()
    }

    fn get_epoch_group_validations(&self, participant: &str, epoch: u64) -> Option<Vec<String>> {
        self.validations
            .iter()
            .find(|v| v.participant == participant && v.epoch_index == epoch)
            .map(|v| v.validated_inferences.clone())
    }

    fn finalize_claim(&mut self, participant: &str, epoch: u64) -> Result<(), StoreError> {
        if !self.settle_amounts.contains_key(participant) {
            return Err(StoreError::NotFound(format!("settle amount for {participant}")));
        }
        self.settle_amounts.shift_remove(participant);
        if let Some(i) = self.summary_position(epoch, participant) {
            self.performance_summaries[i].claimed = true;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VestingSchedule {
    pub address: Address,
    pub amount: u64,
    pub epochs: u64,
    pub memo: String,
}

/// Single module account holding both fee escrow and minted rewards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryLedger {
    pub module_balance: u64,
    #[serde(default)]
    pub balances: IndexMap<Address, u64>,
    #[serde(default)]
    pub vesting: Vec<VestingSchedule>,
    #[serde(default)]
    pub total_minted: u64,
    #[serde(default)]
    pub total_burned: u64,
}

impl MemoryLedger {
    pub fn balance_of(&self, address: &str) -> u64 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    fn debit_module(&mut self, amount: u64) -> Result<(), LedgerError> {
        self.module_balance = self
            .module_balance
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientFunds {
                spendable: self.module_balance,
                required: amount,
            })?;
        Ok(())
    }

    fn pay(&mut self, address: &str, amount: u64, memo: &str, vesting_epochs: Option<u64>) -> Result<(), LedgerError> {
        self.debit_module(amount)?;
        match vesting_epochs {
            Some(epochs) if epochs > 0 => self.vesting.push(VestingSchedule {
                address: address.to_string(),
                amount,
                epochs,
                memo: memo.to_string(),
            }),
            _ => {
                let balance = self.balances.entry(address.to_string()).or_default();
                *balance = balance.saturating_add(amount);
            }
        }
        debug!(address, amount, memo, "ledger payout");
        Ok(())
    }
}

impl Ledger for MemoryLedger {
    fn mint(&mut self, amount: u64, reason: &str) -> Result<(), LedgerError> {
        self.module_balance = self
            .module_balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Rejected("module balance overflow".to_string()))?;
        self.total_minted = self.total_minted.saturating_add(amount);
        debug!(amount, reason, "minted");
        Ok(())
    }

    fn burn(&mut self, amount: u64, reason: &str) -> Result<(), LedgerError> {
        self.debit_module(amount)?;
        self.total_burned = self.total_burned.saturating_add(amount);
        debug!(amount, reason, "burned");
        Ok(())
    }

    fn pay_from_escrow(&mut self, address: &str, amount: u64, memo: &str, vesting_epochs: Option<u64>) -> Result<(), LedgerError> {
        self.pay(address, amount, memo, vesting_epochs)
    }

    fn pay_from_module(&mut self, address: &str, amount: u64, memo: &str, vesting_epochs: Option<u64>) -> Result<(), LedgerError> {
        self.pay(address, amount, memo, vesting_epochs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashRecord {
    pub address: Address,
    pub fraction: Decimal,
    pub amount: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryCollateral {
    #[serde(default)]
    pub deposits: IndexMap<Address, u64>,
    #[serde(default)]
    pub slashes: Vec<SlashRecord>,
}

impl CollateralSlasher for MemoryCollateral {
    fn slash(&mut self, address: &str, fraction: Decimal) -> Result<(), StoreError> {
        if fraction < Decimal::ZERO || fraction > Decimal::ONE {
            return Err(StoreError::Write(format!("slash fraction {fraction} out of range")));
        }
        let Some(deposit) = self.deposits.get_mut(address) else {
            debug!(address, "no collateral to slash");
            return Ok(());
        };
        let amount = (Decimal::from(*deposit) * fraction)
            .floor()
            .to_u64()
            .unwrap_or(0);
        *deposit -= amount.min(*deposit);
        self.slashes.push(SlashRecord {
            address: address.to_string(),
            fraction,
            amount,
        });
        Ok(())
    }
}

/// Everything the CLI persists between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainState {
    #[serde(default)]
    pub tokenomics: TokenomicsState,
    #[serde(default)]
    pub store: MemoryStore,
    #[serde(default)]
    pub ledger: MemoryLedger,
    #[serde(default)]
    pub collateral: MemoryCollateral,
}

impl ChainState {
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading chain state from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {path:?}"))?;
        let state: ChainState = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse state file: {path:?}"))?;
        info!(
            "Loaded chain state: {} participants, current epoch {:?}",
            state.store.participants.len(),
            state.store.current_epoch
        );
        Ok(state)
    }

    /// Stages the state as pretty JSON in the target directory and swaps it
    /// over `path`, so readers never see a half-written file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).with_context(|| format!("Failed to create state directory: {dir:?}"))?;

        let json = to_json_string(self, true).context("Failed to encode chain state")?;
        let mut staged = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to stage chain state in {dir:?}"))?;
        staged
            .write_all(json.as_bytes())
            .and_then(|()| staged.as_file().sync_all())
            .with_context(|| format!("Failed to write staged chain state: {:?}", staged.path()))?;
        staged
            .persist(path)
            .with_context(|| format!("Failed to replace chain state: {path:?}"))?;

        info!(
            participants = self.store.participants.len(),
            settle_amounts = self.store.settle_amounts.len(),
            current_epoch = ?self.store.current_epoch,
            "Saved chain state to {:?}",
            path
        );
        Ok(())
    }
}
