//! Rollback tests: illegal-evidence reversal, the retention window edges,
//! and replay equality over randomized block streams.

mod common;

use common::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vertex_dpos::{ProducerState, StateError};
use vertex_types::{Amount, Transaction};

#[test]
fn test_illegal_evidence_rollback() {
    let fixture = Fixture::new(Fixture::test_params());
    let owner = test_key(2);

    fixture.process(395, vec![register_tx(2, "bob", 5_000, 0)]);
    fixture.process_empty(396..=400);
    assert!(fixture.state.is_active_producer(&owner));
    let before = fixture.state.snapshot();

    let evidence = illegal_blocks_tx(node_key(2), 400);
    fixture.process(401, vec![evidence.clone()]);

    let producer = fixture.state.get_producer(&owner).unwrap();
    assert_eq!(producer.state(), ProducerState::Illegal);
    assert_eq!(producer.illegal_height(), 401);
    assert_eq!(producer.penalty(), Amount::from_sela(200));
    assert!(fixture.state.special_tx_exists(&evidence));
    assert!(!fixture.state.is_active_producer(&owner));

    fixture.state.rollback_to(400).unwrap();
    let producer = fixture.state.get_producer(&owner).unwrap();
    assert_eq!(producer.state(), ProducerState::Active);
    assert_eq!(producer.penalty(), Amount::ZERO);
    assert!(!fixture.state.special_tx_exists(&evidence));
    assert_eq!(fixture.state.snapshot(), before);
}

#[test]
fn test_history_window_edges() {
    let fixture = Fixture::new(Fixture::test_params());
    fixture.process_empty(1..=1000);

    // The window retains exactly the last 721 heights.
    assert!(fixture.state.get_history(280).is_ok());
    assert!(matches!(
        fixture.state.get_history(279),
        Err(StateError::RollbackBeyondWindow { .. })
    ));
    assert!(matches!(
        fixture.state.get_history(1001),
        Err(StateError::SeekOutOfRange { .. })
    ));

    assert!(fixture.state.rollback_to(280).is_ok());
    assert_eq!(fixture.state.current_height(), 280);
    assert!(matches!(
        fixture.state.rollback_to(279),
        Err(StateError::RollbackBeyondWindow { target: 279, oldest: 280 })
    ));
}

#[test]
fn test_historical_snapshot_leaves_live_state_alone() {
    let fixture = Fixture::new(Fixture::test_params());

    fixture.process(1, vec![register_tx(1, "alice", 5_000, 0)]);
    fixture.process_empty(2..=6);
    let at_six = fixture.state.snapshot();
    fixture.process(7, vec![cancel_tx(1)]);

    let historical = fixture.state.get_history(6).unwrap();
    assert_eq!(historical, at_six);

    // The live frame still shows the cancellation.
    assert!(fixture.state.is_canceled_producer(&test_key(1)));
    assert_eq!(fixture.state.current_height(), 7);
}

// Builds a deterministic pseudo-random block stream exercising the main
// handler families, then checks rollback + replay equality. Owner keys are
// never re-registered: upstream validation rejects a registration whose
// owner key still exists, so the engine never sees one.
fn random_block(
    rng: &mut StdRng,
    height: u64,
    registered: &mut Vec<u8>,
    live: &mut Vec<u8>,
    votes: &mut Vec<(vertex_types::H256, u16)>,
) -> Vec<Transaction> {
    let mut txs = Vec::new();
    for _ in 0..rng.gen_range(0..3) {
        match rng.gen_range(0u8..5) {
            0 => {
                let tag = rng.gen_range(1u8..40);
                if !registered.contains(&tag) {
                    registered.push(tag);
                    live.push(tag);
                    txs.push(register_tx(
                        tag,
                        &format!("producer-{tag}"),
                        5_000,
                        if tag % 2 == 0 { 100_000 } else { 0 },
                    ));
                }
            }
            1 => {
                if !live.is_empty() {
                    let tag = live[rng.gen_range(0..live.len())];
                    let vote = v1_vote_tx(&[test_key(tag)], rng.gen_range(1..500));
                    votes.push((vote.hash(), 0));
                    txs.push(vote);
                }
            }
            2 => {
                if !votes.is_empty() {
                    let outpoint = votes.swap_remove(rng.gen_range(0..votes.len()));
                    txs.push(spend_tx(&[outpoint]));
                }
            }
            3 => {
                if !live.is_empty() {
                    let idx = rng.gen_range(0..live.len());
                    let tag = live.swap_remove(idx);
                    txs.push(cancel_tx(tag));
                }
            }
            _ => {
                let staker = test_key(rng.gen_range(100u8..140));
                let (exchange, _) = exchange_votes_tx(&staker, rng.gen_range(1_000..20_000));
                txs.push(exchange);
                if let Some(&tag) = live.iter().find(|t| **t % 2 == 0) {
                    txs.push(dposv2_vote_tx(
                        &staker,
                        &test_key(tag),
                        rng.gen_range(100..2_000),
                        height + 7_200 + rng.gen_range(0..100),
                    ));
                }
            }
        }
    }
    txs
}

#[test]
fn test_rollback_then_replay_reaches_identical_state() {
    let fixture = Fixture::new(Fixture::test_params());
    let mut rng = StdRng::seed_from_u64(0x5eed);

    let mut registered = Vec::new();
    let mut live = Vec::new();
    let mut votes = Vec::new();
    let mut blocks: Vec<(u64, Vec<Transaction>)> = Vec::new();

    const SPLIT: u64 = 30;
    const END: u64 = 60;

    for height in 1..=END {
        let txs = random_block(&mut rng, height, &mut registered, &mut live, &mut votes);
        blocks.push((height, txs));
    }

    let mut at_split = None;
    for (height, txs) in &blocks {
        fixture.process(*height, txs.clone());
        if *height == SPLIT {
            at_split = Some(fixture.state.snapshot());
        }
    }
    let at_end = fixture.state.snapshot();

    // Rolling back reaches the exact mid-stream state.
    fixture.state.rollback_to(SPLIT).unwrap();
    assert_eq!(fixture.state.snapshot(), at_split.unwrap());

    // Replaying the same blocks reaches the exact end state.
    for (height, txs) in blocks.iter().filter(|(h, _)| *h > SPLIT) {
        fixture.process(*height, txs.clone());
    }
    assert_eq!(fixture.state.snapshot(), at_end);
}

#[test]
fn test_rollback_seek_caps_at_window() {
    let fixture = Fixture::new(Fixture::test_params());
    fixture.process_empty(1..=900);

    // 900 - 720 = 180 is the oldest retained height.
    fixture.state.rollback_seek_to(10);
    assert_eq!(fixture.state.current_height(), 179);
}
