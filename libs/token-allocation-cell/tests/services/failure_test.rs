use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use super::*;

/// Which ledger and store writes should fail on the next attempt
#[derive(Default)]
struct FailurePlan {
    occupancy: HashSet<Uuid>,
    capacity: bool,
    save_tokens: bool,
}

/// In-memory store whose writes can be made to fail per slot
#[derive(Default)]
struct UnreliableStore {
    inner: InMemoryQueueStore,
    plan: Mutex<FailurePlan>,
}

impl UnreliableStore {
    fn fail_occupancy_for(&self, slot_id: Uuid) {
        self.plan.lock().unwrap().occupancy.insert(slot_id);
    }

    fn fail_capacity(&self) {
        self.plan.lock().unwrap().capacity = true;
    }

    fn fail_saves(&self) {
        self.plan.lock().unwrap().save_tokens = true;
    }

    fn occupancy_fails(&self, slot_id: Uuid) -> bool {
        self.plan.lock().unwrap().occupancy.contains(&slot_id)
    }

    fn capacity_fails(&self) -> bool {
        self.plan.lock().unwrap().capacity
    }

    fn saves_fail(&self) -> bool {
        self.plan.lock().unwrap().save_tokens
    }

    fn unavailable(what: &str) -> TokenQueueError {
        TokenQueueError::StorageError(format!("{} unavailable", what))
    }
}

#[async_trait]
impl SlotLedger for UnreliableStore {
    async fn get_slot(&self, slot_id: Uuid) -> Result<Option<Slot>, TokenQueueError> {
        self.inner.get_slot(slot_id).await
    }

    async fn insert_slot(&self, slot: Slot) -> Result<(), TokenQueueError> {
        self.inner.insert_slot(slot).await
    }

    async fn list_slots_by_doctor(&self, doctor_id: Uuid) -> Result<Vec<Slot>, TokenQueueError> {
        self.inner.list_slots_by_doctor(doctor_id).await
    }

    async fn increment_capacity(&self, slot_id: Uuid, by: u32) -> Result<Slot, TokenQueueError> {
        if self.capacity_fails() {
            return Err(Self::unavailable("capacity"));
        }
        self.inner.increment_capacity(slot_id, by).await
    }

    async fn set_capacity(&self, slot_id: Uuid, expected: u32, value: u32) -> Result<Slot, TokenQueueError> {
        self.inner.set_capacity(slot_id, expected, value).await
    }

    async fn set_occupancy(&self, slot_id: Uuid, expected: u32, value: u32) -> Result<Slot, TokenQueueError> {
        if self.occupancy_fails(slot_id) {
            return Err(TokenQueueError::Busy {
                slot_id,
                reason: "occupancy changed concurrently".to_string(),
            });
        }
        self.inner.set_occupancy(slot_id, expected, value).await
    }

    async fn set_delay(&self, slot_id: Uuid, delay_minutes: u32) -> Result<Slot, TokenQueueError> {
        self.inner.set_delay(slot_id, delay_minutes).await
    }

    async fn set_status(&self, slot_id: Uuid, status: SlotStatus) -> Result<Slot, TokenQueueError> {
        self.inner.set_status(slot_id, status).await
    }
}

#[async_trait]
impl TokenStore for UnreliableStore {
    async fn next_sequence(&self) -> Result<u64, TokenQueueError> {
        self.inner.next_sequence().await
    }

    async fn get_token(&self, token_id: Uuid) -> Result<Option<Token>, TokenQueueError> {
        self.inner.get_token(token_id).await
    }

    async fn save_tokens(&self, tokens: &[Token]) -> Result<(), TokenQueueError> {
        if self.saves_fail() {
            return Err(Self::unavailable("token store"));
        }
        self.inner.save_tokens(tokens).await
    }

    async fn active_tokens(&self, slot_id: Uuid) -> Result<Vec<Token>, TokenQueueError> {
        self.inner.active_tokens(slot_id).await
    }

    async fn tokens_in_slot(&self, slot_id: Uuid) -> Result<Vec<Token>, TokenQueueError> {
        self.inner.tokens_in_slot(slot_id).await
    }

    async fn tokens_by_patient(&self, patient_id: &str) -> Result<Vec<Token>, TokenQueueError> {
        self.inner.tokens_by_patient(patient_id).await
    }
}

fn unreliable_utils() -> (QueueTestUtils, Arc<UnreliableStore>) {
    let store = Arc::new(UnreliableStore::default());
    let service = TokenAllocationService::new(TestConfig::default().to_arc(), store.clone(), store.clone());
    (QueueTestUtils::with_service(service), store)
}

async fn two_slots_with_queue(utils: &QueueTestUtils) -> (Slot, Slot) {
    let source = utils.create_slot(3, 9).await;
    let target = utils.create_slot(3, 10).await;
    utils.book(source.id, TokenChannel::Online, "first").await;
    utils.book(source.id, TokenChannel::Walkin, "second").await;
    (source, target)
}

async fn assert_reallocation_left_no_trace(utils: &QueueTestUtils, source: &Slot, target: &Slot) {
    assert_eq!(utils.queue_names(source.id).await, vec!["first", "second"]);
    assert!(utils.service.get_queue(target.id).await.unwrap().is_empty());
    assert_eq!(utils.service.get_slot(source.id).await.unwrap().occupancy, 2);
    assert_eq!(utils.service.get_slot(target.id).await.unwrap().occupancy, 0);
    utils.assert_queue_invariants(source.id).await;
    utils.assert_queue_invariants(target.id).await;
}

#[tokio::test]
async fn test_reallocation_keeps_source_when_target_credit_fails() {
    let (utils, store) = unreliable_utils();
    let (source, target) = two_slots_with_queue(&utils).await;

    store.fail_occupancy_for(target.id);
    let result = utils.service.reallocate_tokens(source.id, target.id).await;

    assert_matches!(result, Err(TokenQueueError::Busy { slot_id, .. }) if slot_id == target.id);
    assert_reallocation_left_no_trace(&utils, &source, &target).await;
}

#[tokio::test]
async fn test_reallocation_restores_target_when_source_debit_fails() {
    let (utils, store) = unreliable_utils();
    let (source, target) = two_slots_with_queue(&utils).await;

    store.fail_occupancy_for(source.id);
    let result = utils.service.reallocate_tokens(source.id, target.id).await;

    assert_matches!(result, Err(TokenQueueError::Busy { slot_id, .. }) if slot_id == source.id);
    assert_reallocation_left_no_trace(&utils, &source, &target).await;
}

#[tokio::test]
async fn test_reallocation_restores_both_slots_when_tokens_cannot_be_saved() {
    let (utils, store) = unreliable_utils();
    let (source, target) = two_slots_with_queue(&utils).await;

    store.fail_saves();
    let result = utils.service.reallocate_tokens(source.id, target.id).await;

    assert_matches!(result, Err(TokenQueueError::StorageError(_)));
    assert_reallocation_left_no_trace(&utils, &source, &target).await;
}

#[tokio::test]
async fn test_failed_emergency_admission_leaves_capacity_alone() {
    let (utils, store) = unreliable_utils();
    let slot = utils.create_slot(1, 9).await;
    utils.book(slot.id, TokenChannel::Online, "online").await;

    store.fail_occupancy_for(slot.id);
    let result = utils.service.insert_emergency_token(utils.request(slot.id, "emergency")).await;
    assert_matches!(result, Err(TokenQueueError::Busy { .. }));

    let slot_now = utils.service.get_slot(slot.id).await.unwrap();
    assert_eq!((slot_now.capacity, slot_now.occupancy), (1, 1));
    assert_eq!(utils.queue_names(slot.id).await, vec!["online"]);
}

#[tokio::test]
async fn test_failed_capacity_growth_undoes_occupancy() {
    let (utils, store) = unreliable_utils();
    let slot = utils.create_slot(1, 9).await;
    utils.book(slot.id, TokenChannel::Online, "online").await;

    store.fail_capacity();
    let result = utils.service.insert_emergency_token(utils.request(slot.id, "emergency")).await;
    assert_matches!(result, Err(TokenQueueError::StorageError(_)));

    let slot_now = utils.service.get_slot(slot.id).await.unwrap();
    assert_eq!((slot_now.capacity, slot_now.occupancy), (1, 1));
    utils.assert_queue_invariants(slot.id).await;
}

#[tokio::test]
async fn test_unsaved_emergency_undoes_capacity_and_occupancy() {
    let (utils, store) = unreliable_utils();
    let slot = utils.create_slot(1, 9).await;
    utils.book(slot.id, TokenChannel::Online, "online").await;

    store.fail_saves();
    let result = utils.service.insert_emergency_token(utils.request(slot.id, "emergency")).await;
    assert_matches!(result, Err(TokenQueueError::StorageError(_)));

    let slot_now = utils.service.get_slot(slot.id).await.unwrap();
    assert_eq!((slot_now.capacity, slot_now.occupancy), (1, 1));
    assert_eq!(utils.queue_names(slot.id).await, vec!["online"]);
}

#[tokio::test]
async fn test_unsaved_cancellation_restores_occupancy() {
    let (utils, store) = unreliable_utils();
    let slot = utils.create_slot(2, 9).await;
    let token = utils.book(slot.id, TokenChannel::Online, "online").await;

    store.fail_saves();
    let result = utils.service.cancel_token(token.id, None).await;
    assert_matches!(result, Err(TokenQueueError::StorageError(_)));

    let stored = utils.service.get_token(token.id).await.unwrap();
    assert_eq!(stored.status, TokenStatus::Pending);
    assert_eq!(utils.service.get_slot(slot.id).await.unwrap().occupancy, 1);
    utils.assert_queue_invariants(slot.id).await;
}

#[tokio::test]
async fn test_unsaved_delay_restores_slot() {
    let (utils, store) = unreliable_utils();
    let slot = utils.create_slot(2, 9).await;
    utils.book(slot.id, TokenChannel::Online, "online").await;

    store.fail_saves();
    let result = utils.service.mark_slot_delayed(slot.id, 20).await;
    assert_matches!(result, Err(TokenQueueError::StorageError(_)));

    let slot_now = utils.service.get_slot(slot.id).await.unwrap();
    assert_eq!(slot_now.delay_minutes, 0);
    assert_eq!(slot_now.status, SlotStatus::Active);
}
