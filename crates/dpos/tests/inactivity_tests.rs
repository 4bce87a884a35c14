//! Inactivity counter tests: the V2 split counter with random candidates,
//! the V0 height-window counter, and the emergency path.

mod common;

use common::*;
use vertex_dpos::ProducerState;
use vertex_types::Amount;

#[test]
fn test_v2_random_candidate_goes_inactive_after_three_misses() {
    let fixture = Fixture::new(Fixture::test_params());
    let owner = test_key(4);
    let sponsor = node_key(90);

    fixture.process(1, vec![register_tx(4, "dora", 5_000, 0)]);
    fixture.process_empty(2..=6);
    assert!(fixture.state.is_active_producer(&owner));

    fixture.set_arbiters(&[node_key(4)]);
    fixture.state.set_producer_selected(&owner, true);

    // Three consecutive missed rounds; inactive on the third.
    fixture.process_confirmed(7, Vec::new(), sponsor);
    fixture.process_confirmed(8, Vec::new(), sponsor);
    assert!(fixture.state.is_active_producer(&owner));

    fixture.process_confirmed(9, Vec::new(), sponsor);
    let producer = fixture.state.get_producer(&owner).unwrap();
    assert_eq!(producer.state(), ProducerState::Inactive);
    assert_eq!(producer.inactive_since(), 9);
    assert!(!producer.selected());
    assert_eq!(producer.penalty(), Amount::from_sela(50));

    // Rolling back before the third miss restores the active producer.
    fixture.state.rollback_to(8).unwrap();
    let producer = fixture.state.get_producer(&owner).unwrap();
    assert_eq!(producer.state(), ProducerState::Active);
    assert!(producer.selected());
    assert_eq!(producer.penalty(), Amount::ZERO);
}

#[test]
fn test_v2_sponsor_round_resets_counter() {
    let fixture = Fixture::new(Fixture::test_params());
    let owner = test_key(5);

    fixture.process(1, vec![register_tx(5, "ed", 5_000, 0)]);
    fixture.process_empty(2..=6);
    fixture.set_arbiters(&[node_key(5)]);
    fixture.state.set_producer_selected(&owner, true);

    fixture.process_confirmed(7, Vec::new(), node_key(90));
    fixture.process_confirmed(8, Vec::new(), node_key(90));
    // On-duty round: the producer sponsors the confirmed proposal.
    fixture.process_confirmed(9, Vec::new(), node_key(5));
    // Two more misses are not enough after the reset.
    fixture.process_confirmed(10, Vec::new(), node_key(90));
    fixture.process_confirmed(11, Vec::new(), node_key(90));
    assert!(fixture.state.is_active_producer(&owner));

    // The third consecutive miss crosses the bound again.
    fixture.process_confirmed(12, Vec::new(), node_key(90));
    assert!(fixture.state.is_inactive_producer(&owner));
}

#[test]
fn test_v2_non_contiguous_miss_resets_random_counter() {
    let fixture = Fixture::new(Fixture::test_params());
    let owner = test_key(6);

    fixture.process(1, vec![register_tx(6, "fay", 5_000, 0)]);
    fixture.process_empty(2..=6);
    fixture.set_arbiters(&[node_key(6)]);
    fixture.state.set_producer_selected(&owner, true);

    fixture.process_confirmed(7, Vec::new(), node_key(90));
    fixture.process_confirmed(8, Vec::new(), node_key(90));
    // A block without a confirm breaks the contiguity.
    fixture.process(9, Vec::new());
    fixture.process_confirmed(10, Vec::new(), node_key(90));
    fixture.process_confirmed(11, Vec::new(), node_key(90));
    // Counter restarted at height 10, so still active.
    assert!(fixture.state.is_active_producer(&owner));

    fixture.process_confirmed(12, Vec::new(), node_key(90));
    assert!(fixture.state.is_inactive_producer(&owner));
}

#[test]
fn test_v0_counts_in_height_window() {
    let mut params = Fixture::test_params();
    // Keep the V0 branch selected and bound the window at three rounds.
    params.cr_claim_dpos_node_start_height = 100_000;
    params.change_committee_new_cr_height = 100_000;
    params.max_inactive_rounds = 3;
    let fixture = Fixture::new(params);
    let owner = test_key(7);

    fixture.process(1, vec![register_tx(7, "gil", 5_000, 0)]);
    fixture.process_empty(2..=6);
    fixture.set_arbiters(&[node_key(7)]);

    // The first confirmed round only seeds the previous-round set.
    fixture.process_confirmed(7, Vec::new(), node_key(90));
    // Counting starts at height 8 and crosses the window at 11.
    for height in 8..=10 {
        fixture.process_confirmed(height, Vec::new(), node_key(90));
        assert!(fixture.state.is_active_producer(&owner));
    }
    fixture.process_confirmed(11, Vec::new(), node_key(90));
    assert!(fixture.state.is_inactive_producer(&owner));

    // No penalty before the committee-change height.
    let producer = fixture.state.get_producer(&owner).unwrap();
    assert_eq!(producer.penalty(), Amount::ZERO);
}

#[test]
fn test_emergency_inactive_and_recovery_predicate() {
    let fixture = Fixture::new(Fixture::test_params());
    let owner = test_key(8);

    fixture.process(1, vec![register_tx(8, "hal", 5_000, 0)]);
    fixture.process_empty(2..=6);

    fixture.process(
        7,
        vec![inactive_arbitrators_tx(test_key(99), vec![node_key(8)], 7)],
    );
    let producer = fixture.state.get_producer(&owner).unwrap();
    assert_eq!(producer.state(), ProducerState::Inactive);
    assert_eq!(producer.penalty(), Amount::from_sela(80));
    assert!(!fixture.state.is_able_to_recover_from_inactive_mode());

    // Re-activation clears the emergency condition.
    fixture.process(8, vec![activate_tx(node_key(8))]);
    fixture.process_empty(9..=13);
    assert!(fixture.state.is_active_producer(&owner));
    assert!(fixture.state.is_able_to_recover_from_inactive_mode());

    fixture.state.leave_emergency(14);
    assert!(fixture
        .state
        .snapshot()
        .emergency_inactive_arbiters
        .is_empty());
}

#[test]
fn test_emergency_rollback_restores_exact_counters() {
    let fixture = Fixture::new(Fixture::test_params());
    let owner = test_key(9);

    fixture.process(1, vec![register_tx(9, "ivy", 5_000, 0)]);
    fixture.process_empty(2..=6);
    let before = fixture.state.snapshot();

    fixture.process(
        7,
        vec![inactive_arbitrators_tx(test_key(99), vec![node_key(9)], 7)],
    );
    assert!(fixture.state.is_inactive_producer(&owner));

    fixture.state.rollback_to(6).unwrap();
    assert_eq!(fixture.state.snapshot(), before);
}
