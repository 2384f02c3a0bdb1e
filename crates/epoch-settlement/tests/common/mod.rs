#![allow(dead_code)]

use epoch_settlement::{
    params::GovernanceParams,
    store::{ChainState, MemoryStore},
    types::{
        EpochInfo, EpochWeightSnapshot, MlNodeInfo, Participant, ParticipantStatus,
        SeedSignature, ValidationWeight,
    },
};

/// Governance with the subsidy policy selected
pub fn create_subsidy_params() -> GovernanceParams {
    let mut params = GovernanceParams::default();
    params.bitcoin_rewards.use_bitcoin_rewards = false;
    params
}

/// Governance with a small fixed Bitcoin-style reward starting at epoch 1
pub fn create_bitcoin_params(initial_epoch_reward: u64) -> GovernanceParams {
    let mut params = GovernanceParams::default();
    params.bitcoin_rewards.use_bitcoin_rewards = true;
    params.bitcoin_rewards.initial_epoch_reward = initial_epoch_reward;
    params.bitcoin_rewards.genesis_epoch = 1;
    params
}

pub fn create_weight(address: &str, weight: i64, poc_active: bool) -> ValidationWeight {
    ValidationWeight {
        member_address: address.to_string(),
        weight,
        reputation: 0,
        ml_nodes: vec![MlNodeInfo {
            node_id: format!("{address}-node"),
            poc_weight: weight,
            timeslot_allocation: vec![true, poc_active],
        }],
    }
}

/// Main-model snapshot for `epoch` with a hex seed signature per member
pub fn create_snapshot(epoch: u64, weights: Vec<ValidationWeight>) -> EpochWeightSnapshot {
    let member_seed_signatures = weights
        .iter()
        .map(|w| SeedSignature {
            member_address: w.member_address.clone(),
            signature: hex::encode(w.member_address.as_bytes()),
        })
        .collect();
    EpochWeightSnapshot {
        epoch_index: epoch,
        model_id: String::new(),
        validation_weights: weights,
        member_seed_signatures,
        sub_group_models: vec![],
    }
}

/// Chain with `(address, coin_balance, weight)` participants and a snapshot
/// for `epoch`. Escrow holds the participants' fee balances.
pub fn create_test_chain(epoch: u64, participants: &[(&str, i64, i64)]) -> ChainState {
    let mut store = MemoryStore {
        current_epoch: Some(epoch),
        ..Default::default()
    };
    let mut weights = Vec::with_capacity(participants.len());
    let mut escrow = 0u64;
    for (address, balance, weight) in participants {
        store.add_participant(Participant::new(*address, *balance, ParticipantStatus::Active));
        weights.push(create_weight(address, *weight, true));
        escrow += u64::try_from(*balance).unwrap_or(0);
    }
    store.snapshots.push(create_snapshot(epoch, weights));
    store.epochs.push(EpochInfo {
        index: epoch,
        poc_start_block_height: epoch as i64 * 40,
    });

    let mut chain = ChainState {
        store,
        ..Default::default()
    };
    chain.ledger.module_balance = escrow;
    chain
}

/// Refills balances and adds a snapshot so the next epoch can be settled
pub fn advance_epoch(chain: &mut ChainState, epoch: u64, balances: &[(&str, i64)]) {
    let weights = chain
        .store
        .snapshots
        .last()
        .map(|s| s.validation_weights.clone())
        .unwrap_or_default();
    chain.store.snapshots.push(create_snapshot(epoch, weights));
    chain.store.epochs.push(EpochInfo {
        index: epoch,
        poc_start_block_height: epoch as i64 * 40,
    });
    for (address, balance) in balances {
        if let Some(participant) = chain.store.participants.get_mut(*address) {
            participant.coin_balance = *balance;
        }
        chain.ledger.module_balance += u64::try_from(*balance).unwrap_or(0);
    }
    chain.store.current_epoch = Some(epoch);
}
