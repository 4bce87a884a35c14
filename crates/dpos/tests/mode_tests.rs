//! Mode-switch, irreversibility and reward-pipeline tests.

mod common;

use common::*;
use vertex_dpos::ConsensusAlgorithm;
use vertex_types::{
    Amount, DposV2ClaimReward, DposV2ClaimRewardRealWithdraw, Payload, Program, ProgramHash,
    RevertToDpos, RevertToPow, RevertType, Transaction, TxType, UpdateVersion,
};

fn revert_to_pow_tx(height: u64) -> Transaction {
    Transaction::new(
        TxType::RevertToPow,
        Payload::RevertToPow(RevertToPow {
            revert_type: RevertType::NoBlock,
            working_height: height,
        }),
    )
}

fn revert_to_dpos_tx(interval: u64) -> Transaction {
    Transaction::new(
        TxType::RevertToDpos,
        Payload::RevertToDpos(RevertToDpos {
            work_height_interval: interval,
        }),
    )
}

fn claim_reward_tx(tag: u8, amount: i64) -> Transaction {
    let mut tx = Transaction::new(
        TxType::DposV2ClaimReward,
        Payload::DposV2ClaimReward(DposV2ClaimReward {
            amount: Amount::from_sela(amount),
        }),
    );
    tx.programs.push(Program::standard(&test_key(tag)));
    tx
}

#[test]
fn test_pow_fallback_and_scheduled_return() {
    let fixture = Fixture::new(Fixture::test_params());

    fixture.process_empty(1..=9);
    fixture.process(10, vec![revert_to_pow_tx(10)]);
    assert_eq!(
        fixture.state.get_consensus_algorithm(),
        ConsensusAlgorithm::Pow
    );
    let frame = fixture.state.snapshot();
    assert_eq!(frame.revert_to_pow_block_height, 10);
    assert_eq!(frame.dpos_work_height, 0);

    // Schedule the return five blocks out.
    fixture.process(11, vec![revert_to_dpos_tx(5)]);
    assert_eq!(fixture.state.snapshot().dpos_work_height, 16);
    fixture.process_empty(12..=15);
    assert_eq!(
        fixture.state.get_consensus_algorithm(),
        ConsensusAlgorithm::Pow
    );
    fixture.process(16, Vec::new());
    assert_eq!(
        fixture.state.get_consensus_algorithm(),
        ConsensusAlgorithm::Dpos
    );

    // Rolling back across the fallback restores DPoS mode state exactly.
    fixture.state.rollback_to(9).unwrap();
    let frame = fixture.state.snapshot();
    assert_eq!(frame.consensus_algorithm, ConsensusAlgorithm::Dpos);
    assert_eq!(frame.revert_to_pow_block_height, 0);
    assert_eq!(frame.dpos_work_height, 0);
}

#[test]
fn test_irreversible_height_tracking() {
    let mut params = Fixture::test_params();
    params.revert_to_pow_start_height = 100;
    let fixture = Fixture::new(params);

    fixture.process_empty(1..=99);
    assert_eq!(fixture.state.get_last_irreversible_height(), 0);

    // First observation initializes to height - 6.
    fixture.process(100, Vec::new());
    assert_eq!(fixture.state.get_last_irreversible_height(), 94);

    // Each further block advances by one once the gap reaches six.
    fixture.process(101, Vec::new());
    assert_eq!(fixture.state.get_last_irreversible_height(), 95);
    fixture.process_empty(102..=110);
    assert_eq!(fixture.state.get_last_irreversible_height(), 104);

    // Reorg admissibility.
    assert!(fixture.state.is_irreversible(110, 8));
    assert!(fixture.state.is_irreversible(110, 6));
    assert!(!fixture.state.is_irreversible(110, 3));

    // Rollback rewinds the tracking.
    fixture.state.rollback_to(101).unwrap();
    assert_eq!(fixture.state.get_last_irreversible_height(), 95);
}

#[test]
fn test_update_version_window_waives_penalty() {
    let fixture = Fixture::new(Fixture::test_params());
    let owner = test_key(3);

    fixture.process(1, vec![register_tx(3, "carol", 5_000, 0)]);
    fixture.process_empty(2..=6);

    // Declare a waiver window covering the emergency below.
    let update = Transaction::new(
        TxType::UpdateVersion,
        Payload::UpdateVersion(UpdateVersion {
            start_height: 7,
            end_height: 20,
        }),
    );
    fixture.process(7, vec![update]);

    fixture.process(
        8,
        vec![inactive_arbitrators_tx(test_key(99), vec![node_key(3)], 8)],
    );
    let producer = fixture.state.get_producer(&owner).unwrap();
    assert!(fixture.state.is_inactive_producer(&owner));
    assert_eq!(producer.penalty(), Amount::ZERO);
}

#[test]
fn test_claim_reward_and_real_withdraw_settlement() {
    let fixture = Fixture::new(Fixture::test_params());
    let recipient = ProgramHash::standard_from_public_key(&test_key(9));

    let claim = claim_reward_tx(9, 1_234);
    let claim_hash = claim.hash();
    fixture.process(19, Vec::new());
    fixture.process(20, vec![claim]);

    let frame = fixture.state.snapshot();
    assert_eq!(
        frame.dposv2_reward_claiming_info.get(&recipient),
        Some(&Amount::from_sela(1_234))
    );
    assert_eq!(
        frame.dposv2_reward_info.get(&recipient),
        Some(&Amount::from_sela(-1_234))
    );
    let pending = fixture.state.get_real_withdraw_transactions();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[&claim_hash].amount, Amount::from_sela(1_234));
    assert_eq!(pending[&claim_hash].recipient, recipient);

    // The aggregated settlement consumes the pending claim.
    let withdraw = Transaction::new(
        TxType::DposV2ClaimRewardRealWithdraw,
        Payload::DposV2ClaimRewardRealWithdraw(DposV2ClaimRewardRealWithdraw {
            withdraw_transaction_hashes: vec![claim_hash],
        }),
    );
    fixture.process(21, vec![withdraw]);

    let frame = fixture.state.snapshot();
    assert!(frame.withdrawable_tx_info.is_empty());
    assert!(frame.dposv2_reward_claiming_info.is_empty());
    assert_eq!(
        frame.dposv2_reward_claimed_info.get(&recipient),
        Some(&Amount::from_sela(1_234))
    );

    // Rollback walks the settlement and the claim back out.
    fixture.state.rollback_to(20).unwrap();
    let frame = fixture.state.snapshot();
    assert_eq!(frame.withdrawable_tx_info.len(), 1);
    fixture.state.rollback_to(19).unwrap();
    let frame = fixture.state.snapshot();
    assert!(frame.withdrawable_tx_info.is_empty());
    assert!(frame.dposv2_reward_info.is_empty());
    assert!(frame.dposv2_reward_claimed_info.is_empty());
}
