//! Producer lifecycle tests: registration, activation, cancellation and
//! deposit return.

mod common;

use common::*;
use vertex_dpos::ProducerState;
use vertex_types::Amount;

#[test]
fn test_register_to_active_to_cancel_to_return() {
    let fixture = Fixture::new(Fixture::test_params());
    let owner = test_key(1);

    // Register at height 100 with a 5000 sela deposit.
    let register = register_tx(1, "alice", 5_000, 0);
    let register_hash = register.hash();
    fixture.process(100, vec![register]);

    let producer = fixture.state.get_producer(&owner).unwrap();
    assert_eq!(producer.state(), ProducerState::Pending);
    assert_eq!(producer.total_amount(), Amount::from_sela(5_000));
    assert_eq!(producer.deposit_amount(), Amount::from_sela(5_000));
    assert!(fixture.state.nickname_exists("alice"));
    assert!(fixture.state.is_pending_producer(&owner));
    // The node key resolves to the same producer.
    assert!(fixture.state.producer_exists(&node_key(1)));

    // Five more blocks accrue the six confirmations.
    fixture.process_empty(101..=104);
    assert!(fixture.state.is_pending_producer(&owner));
    fixture.process(105, Vec::new());
    assert!(fixture.state.is_active_producer(&owner));

    // Cancel at height 200.
    fixture.process_empty(106..=199);
    fixture.process(200, vec![cancel_tx(1)]);
    let producer = fixture.state.get_producer(&owner).unwrap();
    assert_eq!(producer.state(), ProducerState::Canceled);
    assert_eq!(producer.cancel_height(), 200);
    assert!(!fixture.state.nickname_exists("alice"));
    assert!(fixture.state.is_canceled_producer(&owner));

    // The deposit requirement releases after the lockup window.
    fixture.process_empty(201..=220);
    let producer = fixture.state.get_producer(&owner).unwrap();
    assert_eq!(producer.deposit_amount(), Amount::ZERO);

    // Return the deposit: spend the registration output, pay 4990 out.
    let refund = return_deposit_tx(1, &[(register_hash, 0)], 4_990);
    fixture.process(221, vec![refund]);

    let producer = fixture.state.get_producer(&owner).unwrap();
    assert_eq!(producer.state(), ProducerState::Returned);
    assert_eq!(producer.total_amount(), Amount::ZERO);
    assert_eq!(producer.available_amount(), Amount::ZERO);
    assert!(!fixture.state.nickname_exists("alice"));
    assert_eq!(fixture.state.get_returned_deposit_producers().len(), 1);
    assert!(fixture.state.get_canceled_producers().is_empty());
}

#[test]
fn test_pending_activation_is_exactly_five_blocks_later() {
    let fixture = Fixture::new(Fixture::test_params());
    fixture.process(50, vec![register_tx(2, "bob", 5_000, 0)]);

    for height in 51..=54 {
        fixture.process(height, Vec::new());
        assert!(
            fixture.state.is_pending_producer(&test_key(2)),
            "still pending at {height}"
        );
    }
    fixture.process(55, Vec::new());
    assert!(fixture.state.is_active_producer(&test_key(2)));
}

#[test]
fn test_register_indexes_and_rollback() {
    let fixture = Fixture::new(Fixture::test_params());
    let owner = test_key(3);

    fixture.process(10, Vec::new());
    fixture.process(11, vec![register_tx(3, "carol", 5_000, 0)]);

    assert!(fixture.state.producer_owner_public_key_exists(&owner));
    assert!(fixture.state.producer_node_public_key_exists(&node_key(3)));
    let deposit_hash =
        vertex_types::ProgramHash::deposit_from_public_key(&owner);
    assert!(fixture.state.exist_producer_by_deposit_hash(&deposit_hash));

    fixture.state.rollback_to(10).unwrap();
    assert!(!fixture.state.producer_owner_public_key_exists(&owner));
    assert!(!fixture.state.producer_node_public_key_exists(&node_key(3)));
    assert!(!fixture.state.exist_producer_by_deposit_hash(&deposit_hash));
    assert!(!fixture.state.nickname_exists("carol"));
}

#[test]
fn test_update_producer_rotates_nickname_and_node_key() {
    let fixture = Fixture::new(Fixture::test_params());
    fixture.process(10, vec![register_tx(4, "dave", 5_000, 0)]);

    // An update arriving as a second registration under the same node key.
    let mut info = producer_info(4, "dave-renamed", 0);
    info.node_public_key = node_key(44);
    let update = vertex_types::Transaction::new(
        vertex_types::TxType::UpdateProducer,
        vertex_types::Payload::UpdateProducer(info),
    );
    fixture.process(11, vec![update]);

    assert!(!fixture.state.nickname_exists("dave"));
    assert!(fixture.state.nickname_exists("dave-renamed"));
    assert!(!fixture.state.producer_node_public_key_exists(&node_key(4)));
    assert!(fixture.state.producer_node_public_key_exists(&node_key(44)));

    // Rolling back restores both indexes.
    fixture.state.rollback_to(10).unwrap();
    assert!(fixture.state.nickname_exists("dave"));
    assert!(!fixture.state.nickname_exists("dave-renamed"));
    assert!(fixture.state.producer_node_public_key_exists(&node_key(4)));
}

#[test]
fn test_cancel_from_pending_tracks_pending_canceled() {
    let fixture = Fixture::new(Fixture::test_params());
    fixture.process(10, vec![register_tx(5, "erin", 5_000, 0)]);
    fixture.process(11, vec![cancel_tx(5)]);

    assert_eq!(fixture.state.get_pending_canceled_producers().len(), 1);
    assert!(fixture.state.is_canceled_producer(&test_key(5)));

    fixture.state.rollback_to(10).unwrap();
    assert!(fixture.state.get_pending_canceled_producers().is_empty());
    assert!(fixture.state.is_pending_producer(&test_key(5)));
}

#[test]
fn test_inactive_producer_reactivates_after_request() {
    let mut params = Fixture::test_params();
    params.max_inactive_rounds_of_random_node = 2;
    let fixture = Fixture::new(params);
    let owner = test_key(6);

    fixture.process(1, vec![register_tx(6, "frank", 5_000, 0)]);
    fixture.process_empty(2..=6);
    assert!(fixture.state.is_active_producer(&owner));

    // Set inactive through the emergency path, then request activation.
    fixture.process(
        7,
        vec![inactive_arbitrators_tx(test_key(99), vec![node_key(6)], 7)],
    );
    assert!(fixture.state.is_inactive_producer(&owner));

    fixture.process(8, vec![activate_tx(node_key(6))]);
    fixture.process_empty(9..=13);
    assert!(fixture.state.is_active_producer(&owner));
}
