use chrono::Duration;

use super::*;

#[tokio::test]
async fn test_online_ranks_ahead_of_walkin() {
    // Capacity 2: ONLINE then WALKIN
    let utils = QueueTestUtils::new();
    let slot = utils.create_slot(2, 9).await;

    let online = utils.book(slot.id, TokenChannel::Online, "online").await;
    let walkin = utils.book(slot.id, TokenChannel::Walkin, "walkin").await;

    assert_eq!(online.queue_position, 1);
    assert_eq!(online.token_number, "T001");
    assert_eq!(walkin.queue_position, 2);
    assert_eq!(walkin.token_number, "T002");

    let slot = utils.service.get_slot(slot.id).await.unwrap();
    assert_eq!(slot.occupancy, 2);
    assert!(slot.is_full());
    utils.assert_queue_invariants(slot.id).await;
}

#[tokio::test]
async fn test_returned_token_reflects_final_position() {
    let utils = QueueTestUtils::new();
    let slot = utils.create_slot(5, 9).await;

    utils.book(slot.id, TokenChannel::Walkin, "first").await;
    utils.book(slot.id, TokenChannel::Walkin, "second").await;
    let priority = utils.book(slot.id, TokenChannel::Priority, "paid").await;

    assert_eq!(priority.queue_position, 1);
    assert_eq!(priority.token_number, "T001");
    assert_eq!(priority.estimated_time, slot.start_time);

    let stored = utils.service.get_token(priority.id).await.unwrap();
    assert_eq!(stored, priority);
}

#[tokio::test]
async fn test_insertion_shifts_later_positions_and_estimates() {
    let utils = QueueTestUtils::new();
    let slot = utils.create_slot(5, 9).await;

    let walkin = utils.book(slot.id, TokenChannel::Walkin, "walkin").await;
    assert_eq!(walkin.estimated_time, slot.start_time);

    utils.book(slot.id, TokenChannel::Followup, "followup").await;

    let walkin = utils.service.get_token(walkin.id).await.unwrap();
    assert_eq!(walkin.queue_position, 2);
    assert_eq!(walkin.token_number, "T002");
    assert_eq!(walkin.estimated_time, slot.start_time + Duration::minutes(10));
}

#[tokio::test]
async fn test_full_slot_rejects_non_emergency_intake() {
    let utils = QueueTestUtils::new();
    let slot = utils.create_slot(1, 9).await;
    utils.book(slot.id, TokenChannel::Walkin, "walkin").await;

    for channel in [
        TokenChannel::Online,
        TokenChannel::Walkin,
        TokenChannel::Priority,
        TokenChannel::Followup,
    ] {
        let result = utils
            .service
            .allocate(utils.request(slot.id, "late"), channel)
            .await;
        assert_matches!(result, Err(TokenQueueError::CapacityExceeded { capacity: 1, .. }));
    }

    let slot = utils.service.get_slot(slot.id).await.unwrap();
    assert_eq!(slot.capacity, 1);
    assert_eq!(slot.occupancy, 1);
}

#[tokio::test]
async fn test_unknown_slot_is_not_found() {
    let utils = QueueTestUtils::new();
    let missing = Uuid::new_v4();

    let result = utils.service.book_online_token(utils.request(missing, "ghost")).await;
    assert_matches!(result, Err(TokenQueueError::SlotNotFound(id)) if id == missing);

    assert_matches!(utils.service.get_queue(missing).await, Err(TokenQueueError::SlotNotFound(_)));
}

#[tokio::test]
async fn test_malformed_intake_is_rejected() {
    let utils = QueueTestUtils::new();
    let slot = utils.create_slot(3, 9).await;

    let mut blank_name = utils.request(slot.id, "   ");
    blank_name.patient_id = Some("p-1".to_string());
    assert_matches!(
        utils.service.book_online_token(blank_name).await,
        Err(TokenQueueError::ValidationError(_))
    );

    let mut no_patient = utils.request(slot.id, "Ravi");
    no_patient.patient_id = None;
    assert_matches!(
        utils.service.generate_followup_token(no_patient).await,
        Err(TokenQueueError::ValidationError(_))
    );

    let mut bad_phone = utils.request(slot.id, "Ravi");
    bad_phone.phone_number = Some("call me".to_string());
    assert_matches!(
        utils.service.generate_priority_token(bad_phone).await,
        Err(TokenQueueError::ValidationError(_))
    );

    // Nothing was admitted
    assert!(utils.service.get_queue(slot.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_walkin_without_patient_id_is_admitted() {
    let utils = QueueTestUtils::new();
    let slot = utils.create_slot(3, 9).await;

    let mut request = utils.request(slot.id, "Meena");
    request.patient_id = None;
    let token = tokio_test::assert_ok!(utils.service.generate_walkin_token(request).await);

    assert!(token.patient_id.starts_with("WALKIN-"));
    let by_patient = utils.service.get_tokens_by_patient(&token.patient_id).await.unwrap();
    assert_eq!(by_patient, vec![token]);
}

#[tokio::test]
async fn test_reorder_of_stored_queue_is_idempotent() {
    let utils = QueueTestUtils::new();
    let slot = utils.create_slot(6, 9).await;

    for (channel, name) in [
        (TokenChannel::Walkin, "a"),
        (TokenChannel::Priority, "b"),
        (TokenChannel::Online, "c"),
        (TokenChannel::Walkin, "d"),
    ] {
        utils.book(slot.id, channel, name).await;
    }

    let stored = utils.service.get_queue(slot.id).await.unwrap();
    let reordered = reorder(stored.clone());
    assert_eq!(positions(&reordered), positions(&stored));
    assert_eq!(reordered, stored);
}
