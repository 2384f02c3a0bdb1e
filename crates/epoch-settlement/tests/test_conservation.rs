mod common;

use common::{create_bitcoin_params, create_subsidy_params, create_weight};
use epoch_settlement::{
    emission::{
        BitcoinEmissionEngine, EmissionEngine, NeutralBonus, ParticipantShare, SubsidyEngine,
    },
    params::{EmissionPolicy, GovernanceParams, TokenomicsState},
    settlement::{EpochSettler, SettlementContext, SettlementReport},
    stats::CriticalValueTable,
    store::ChainState,
    types::{CurrentEpochStats, EpochWeightSnapshot, Participant, ParticipantStatus},
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
struct ArbParticipant {
    balance: i64,
    weight: i64,
    status: ParticipantStatus,
    inference_count: u64,
    missed_requests: u64,
}

prop_compose! {
    fn arb_participant()
        (balance in -1_000i64..=1_000_000_000,
         weight in -10i64..=10_000,
         status in prop_oneof![
             8 => Just(ParticipantStatus::Active),
             1 => Just(ParticipantStatus::Ramping),
             1 => Just(ParticipantStatus::Invalid),
         ],
         inference_count in 0u64..200,
         missed_requests in 0u64..200) -> ArbParticipant {
        ArbParticipant { balance, weight, status, inference_count, missed_requests }
    }
}

fn build_chain(participants: &[ArbParticipant], state: TokenomicsState) -> ChainState {
    let mut chain = ChainState {
        tokenomics: state,
        ..Default::default()
    };
    let mut weights = Vec::with_capacity(participants.len());
    for (i, p) in participants.iter().enumerate() {
        let address = format!("participant-{i}");
        let mut participant = Participant::new(address.as_str(), p.balance, p.status);
        participant.current_epoch_stats = CurrentEpochStats {
            inference_count: p.inference_count,
            missed_requests: p.missed_requests,
            ..Default::default()
        };
        chain.store.add_participant(participant);
        weights.push(create_weight(&address, p.weight, true));
    }
    chain.store.snapshots.push(common::create_snapshot(7, weights));
    chain
}

fn settle(chain: &mut ChainState, params: &GovernanceParams) -> SettlementReport {
    let settler = EpochSettler::new(params, &CriticalValueTable);
    let mut ctx = SettlementContext {
        store: &mut chain.store,
        ledger: &mut chain.ledger,
        slasher: &mut chain.collateral,
    };
    settler
        .settle_epoch(&mut ctx, &mut chain.tokenomics, 7, 6)
        .unwrap()
        .unwrap()
}

fn assert_conserved(report: &SettlementReport, chain: &ChainState, paid_before: i64) {
    let distributed = report.total_reward_coins();
    assert_eq!(distributed, report.minted);
    assert_eq!(i64::try_from(distributed).unwrap(), report.pool.amount);
    assert_eq!(chain.ledger.total_minted, report.minted);
    assert_eq!(
        chain.tokenomics.total_subsidy_paid,
        paid_before + report.pool.amount
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_subsidy_pool_is_fully_distributed(
        participants in prop::collection::vec(arb_participant(), 1..40),
        paid in 0i64..600_000_000_000_000_000,
    ) {
        let params = create_subsidy_params();
        let state = TokenomicsState { total_subsidy_paid: paid, ..TokenomicsState::default() };
        let mut chain = build_chain(&participants, state);

        let report = settle(&mut chain, &params);
        assert_conserved(&report, &chain, paid);
        prop_assert!(chain.tokenomics.total_subsidy_paid <= params.tokenomics.total_subsidy_supply);
    }

    #[test]
    fn prop_bitcoin_pool_is_fully_distributed(
        participants in prop::collection::vec(arb_participant(), 1..40),
        initial_reward in 0u64..1_000_000_000_000,
    ) {
        let params = create_bitcoin_params(initial_reward);
        let mut chain = build_chain(&participants, TokenomicsState::default());

        let report = settle(&mut chain, &params);
        assert_conserved(&report, &chain, 0);
        prop_assert!(report.minted <= initial_reward);
    }

    #[test]
    fn prop_supply_cap_is_never_exceeded(
        participants in prop::collection::vec(arb_participant(), 1..20),
        supply in 1i64..1_000_000,
        paid_fraction in 0u32..=100,
        initial_reward in 0u64..10_000_000,
    ) {
        let mut params = create_bitcoin_params(initial_reward);
        params.tokenomics.total_subsidy_supply = supply;
        let paid = supply * i64::from(paid_fraction) / 100;
        let state = TokenomicsState { total_subsidy_paid: paid, ..TokenomicsState::default() };
        let mut chain = build_chain(&participants, state);

        let report = settle(&mut chain, &params);
        assert_conserved(&report, &chain, paid);
        prop_assert!(chain.tokenomics.total_subsidy_paid <= supply);
    }

    #[test]
    fn prop_work_coins_match_non_negative_balances(
        participants in prop::collection::vec(arb_participant(), 1..40),
    ) {
        let params = create_bitcoin_params(1_000_000);
        let mut chain = build_chain(&participants, TokenomicsState::default());

        let report = settle(&mut chain, &params);
        for (record, participant) in report.records.iter().zip(&participants) {
            let expected = match participant.status {
                ParticipantStatus::Invalid => 0,
                _ => u64::try_from(participant.balance).unwrap_or(0),
            };
            prop_assert_eq!(record.work_coins, expected);
        }
    }
}

fn subsidy_shares(
    participants: &[Participant],
    snapshot: &EpochWeightSnapshot,
) -> (Vec<ParticipantShare>, i64) {
    let params = create_subsidy_params();
    let EmissionPolicy::Subsidy(subsidy) = params.emission_policy(&TokenomicsState::default())
    else {
        panic!("subsidy policy expected");
    };
    let (shares, pool) = SubsidyEngine::new(&subsidy, &CriticalValueTable)
        .compute_pool_and_shares(participants, snapshot)
        .unwrap();
    (shares, pool.amount)
}

fn bitcoin_shares(
    initial_reward: u64,
    participants: &[Participant],
    snapshot: &EpochWeightSnapshot,
) -> (Vec<ParticipantShare>, i64) {
    let params = create_bitcoin_params(initial_reward).bitcoin_rewards.parameters();
    let (shares, pool) = BitcoinEmissionEngine::new(&params, 1, &CriticalValueTable, &NeutralBonus)
        .compute_pool_and_shares(participants, snapshot)
        .unwrap();
    (shares, pool.amount)
}

/// Expected reward of `recipient`: its floored share plus everything the
/// floors left over.
fn floored_with_remainder(amounts: &[u64], pool: u64, recipient: usize) -> Vec<u64> {
    let total: u128 = amounts.iter().map(|a| u128::from(*a)).sum();
    let mut expected: Vec<u64> = amounts
        .iter()
        .map(|a| u64::try_from(u128::from(*a) * u128::from(pool) / total).unwrap())
        .collect();
    let distributed: u64 = expected.iter().sum();
    expected[recipient] += pool - distributed;
    expected
}

#[test]
fn test_empty_participant_set_distributes_nothing() {
    let snapshot = common::create_snapshot(7, vec![]);

    let (shares, pool) = subsidy_shares(&[], &snapshot);
    assert!(shares.is_empty());
    assert_eq!(pool, 0);

    // the fixed reward has no recipient, so the pool shrinks to zero
    let (shares, pool) = bitcoin_shares(1_000_000, &[], &snapshot);
    assert!(shares.is_empty());
    assert_eq!(pool, 0);

    for params in [create_subsidy_params(), create_bitcoin_params(1_000_000)] {
        let mut chain = build_chain(&[], TokenomicsState::default());
        let report = settle(&mut chain, &params);
        assert!(report.records.is_empty());
        assert_eq!(report.minted, 0);
        assert_conserved(&report, &chain, 0);
    }
}

#[test]
fn test_large_subsidy_set_conserves_pool() {
    // index 0 has no work and index 1 is invalid, so index 2 takes the remainder
    let participants: Vec<Participant> = (0..1_200u64)
        .map(|i| {
            let balance = if i == 0 { 0 } else { (i * 7_919 % 1_000 + 1) as i64 };
            let status = if i == 1 {
                ParticipantStatus::Invalid
            } else {
                ParticipantStatus::Active
            };
            Participant::new(format!("participant-{i}"), balance, status)
        })
        .collect();
    let snapshot = common::create_snapshot(7, vec![]);

    let (shares, pool) = subsidy_shares(&participants, &snapshot);

    assert_eq!(shares.len(), participants.len());
    let pool = u64::try_from(pool).unwrap();
    assert!(pool > 0);
    assert_eq!(shares.iter().map(|s| s.reward_coins).sum::<u64>(), pool);

    let work: Vec<u64> = participants
        .iter()
        .map(|p| match p.status {
            ParticipantStatus::Invalid => 0,
            _ => u64::try_from(p.coin_balance).unwrap(),
        })
        .collect();
    let rewards: Vec<u64> = shares.iter().map(|s| s.reward_coins).collect();
    assert_eq!(rewards, floored_with_remainder(&work, pool, 2));
    assert_eq!(rewards[0], 0);
    assert_eq!(rewards[1], 0);
}

#[test]
fn test_large_bitcoin_set_conserves_pool() {
    let initial_reward = 285_000_000_000_000;
    let weights: Vec<u64> = (0..1_500u64).map(|i| if i == 0 { 0 } else { i % 97 + 1 }).collect();
    let participants: Vec<Participant> = (0..weights.len())
        .map(|i| Participant::new(format!("participant-{i}"), 10, ParticipantStatus::Active))
        .collect();
    let snapshot = common::create_snapshot(
        7,
        weights
            .iter()
            .enumerate()
            .map(|(i, w)| create_weight(&format!("participant-{i}"), *w as i64, true))
            .collect(),
    );

    let (shares, pool) = bitcoin_shares(initial_reward, &participants, &snapshot);

    assert_eq!(pool, initial_reward as i64);
    assert_eq!(shares.iter().map(|s| s.reward_coins).sum::<u64>(), initial_reward);
    let rewards: Vec<u64> = shares.iter().map(|s| s.reward_coins).collect();
    // index 0 has no weight, so index 1 takes the remainder
    assert_eq!(rewards, floored_with_remainder(&weights, initial_reward, 1));
    assert!(shares.iter().all(|s| s.work_coins == 10));
}
