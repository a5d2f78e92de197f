use super::*;

#[tokio::test]
async fn test_emergency_into_full_slot_grows_capacity_by_one() {
    let utils = QueueTestUtils::new();
    let slot = utils.create_slot(2, 9).await;
    let online = utils.book(slot.id, TokenChannel::Online, "online").await;
    let walkin = utils.book(slot.id, TokenChannel::Walkin, "walkin").await;

    let emergency = utils
        .service
        .insert_emergency_token(utils.request(slot.id, "emergency"))
        .await
        .expect("Emergency intake must succeed on a full slot");

    assert_eq!(emergency.queue_position, 1);
    assert_eq!(emergency.token_number, "T001");
    assert_eq!(emergency.channel, TokenChannel::Emergency);

    // Every earlier token shifted by exactly one
    let online_now = utils.service.get_token(online.id).await.unwrap();
    let walkin_now = utils.service.get_token(walkin.id).await.unwrap();
    assert_eq!(online_now.queue_position, online.queue_position + 1);
    assert_eq!(walkin_now.queue_position, walkin.queue_position + 1);

    let slot = utils.service.get_slot(slot.id).await.unwrap();
    assert_eq!(slot.capacity, 3);
    assert_eq!(slot.occupancy, 3);
    assert_eq!(utils.queue_names(slot.id).await, vec!["emergency", "online", "walkin"]);
    utils.assert_queue_invariants(slot.id).await;
}

#[tokio::test]
async fn test_emergency_with_room_does_not_touch_capacity() {
    let utils = QueueTestUtils::new();
    let slot = utils.create_slot(3, 9).await;
    utils.book(slot.id, TokenChannel::Walkin, "walkin").await;

    let emergency = utils.book(slot.id, TokenChannel::Emergency, "emergency").await;
    assert_eq!(emergency.queue_position, 1);

    let slot = utils.service.get_slot(slot.id).await.unwrap();
    assert_eq!(slot.capacity, 3);
    assert_eq!(slot.occupancy, 2);
}

#[tokio::test]
async fn test_repeated_emergencies_each_add_one_unit() {
    let utils = QueueTestUtils::new();
    let slot = utils.create_slot(1, 9).await;
    utils.book(slot.id, TokenChannel::Online, "online").await;

    let first = utils.book(slot.id, TokenChannel::Emergency, "emergency-1").await;
    let second = utils.book(slot.id, TokenChannel::Emergency, "emergency-2").await;

    let slot_now = utils.service.get_slot(slot.id).await.unwrap();
    assert_eq!(slot_now.capacity, 3);
    assert_eq!(slot_now.occupancy, 3);

    // Equal scores fall back to arrival order
    let first = utils.service.get_token(first.id).await.unwrap();
    assert_eq!(first.queue_position, 1);
    assert_eq!(second.queue_position, 2);
    assert_eq!(
        utils.queue_names(slot.id).await,
        vec!["emergency-1", "emergency-2", "online"]
    );
    utils.assert_queue_invariants(slot.id).await;
}

#[tokio::test]
async fn test_capacity_is_not_reduced_after_emergency_leaves() {
    let utils = QueueTestUtils::new();
    let slot = utils.create_slot(1, 9).await;
    utils.book(slot.id, TokenChannel::Walkin, "walkin").await;
    let emergency = utils.book(slot.id, TokenChannel::Emergency, "emergency").await;

    utils.service.cancel_token(emergency.id, None).await.unwrap();

    let slot = utils.service.get_slot(slot.id).await.unwrap();
    assert_eq!(slot.capacity, 2);
    assert_eq!(slot.occupancy, 1);
}

#[tokio::test]
async fn test_emergency_without_patient_id_gets_generated_id() {
    let utils = QueueTestUtils::new();
    let slot = utils.create_slot(1, 9).await;

    let mut request = utils.request(slot.id, "Unknown Adult");
    request.patient_id = None;
    request.phone_number = None;
    let token = utils.service.insert_emergency_token(request).await.unwrap();

    assert!(token.patient_id.starts_with("EMERGENCY-"));
}
