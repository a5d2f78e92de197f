use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::TokenQueueError;
use crate::models::{Slot, SlotStatus, Token};

/// Slot capacity and occupancy owned by the slot collaborator.
#[async_trait]
pub trait SlotLedger: Send + Sync {
    async fn get_slot(&self, slot_id: Uuid) -> Result<Option<Slot>, TokenQueueError>;

    async fn insert_slot(&self, slot: Slot) -> Result<(), TokenQueueError>;

    async fn list_slots_by_doctor(&self, doctor_id: Uuid) -> Result<Vec<Slot>, TokenQueueError>;

    async fn increment_capacity(&self, slot_id: Uuid, by: u32) -> Result<Slot, TokenQueueError>;

    /// Compare-and-swap on capacity, used to undo an elastic increment.
    async fn set_capacity(&self, slot_id: Uuid, expected: u32, value: u32) -> Result<Slot, TokenQueueError>;

    /// Compare-and-swap on occupancy. Fails with `Busy` when the stored value
    /// is no longer `expected`, i.e. another writer got there first.
    async fn set_occupancy(&self, slot_id: Uuid, expected: u32, value: u32) -> Result<Slot, TokenQueueError>;

    /// Sets the delay; a positive delay marks an active slot DELAYED and zero
    /// returns a delayed slot to ACTIVE.
    async fn set_delay(&self, slot_id: Uuid, delay_minutes: u32) -> Result<Slot, TokenQueueError>;

    async fn set_status(&self, slot_id: Uuid, status: SlotStatus) -> Result<Slot, TokenQueueError>;
}

/// Token persistence. Tokens are never deleted, only moved to terminal states.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Monotonic creation ordinal shared by all slots.
    async fn next_sequence(&self) -> Result<u64, TokenQueueError>;

    async fn get_token(&self, token_id: Uuid) -> Result<Option<Token>, TokenQueueError>;

    /// Upserts the whole batch atomically; readers see all of it or none of it.
    async fn save_tokens(&self, tokens: &[Token]) -> Result<(), TokenQueueError>;

    /// Non-terminal tokens of a slot, in queue position order.
    async fn active_tokens(&self, slot_id: Uuid) -> Result<Vec<Token>, TokenQueueError>;

    async fn tokens_in_slot(&self, slot_id: Uuid) -> Result<Vec<Token>, TokenQueueError>;

    async fn tokens_by_patient(&self, patient_id: &str) -> Result<Vec<Token>, TokenQueueError>;
}

#[derive(Default)]
pub struct InMemoryQueueStore {
    slots: RwLock<HashMap<Uuid, Slot>>,
    tokens: RwLock<HashMap<Uuid, Token>>,
    sequence: AtomicU64,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update_slot<F>(&self, slot_id: Uuid, apply: F) -> Result<Slot, TokenQueueError>
    where
        F: FnOnce(&mut Slot) -> Result<(), TokenQueueError> + Send,
    {
        let mut slots = self.slots.write().await;
        let slot = slots
            .get_mut(&slot_id)
            .ok_or(TokenQueueError::SlotNotFound(slot_id))?;
        apply(slot)?;
        slot.updated_at = Utc::now();
        Ok(slot.clone())
    }
}

#[async_trait]
impl SlotLedger for InMemoryQueueStore {
    async fn get_slot(&self, slot_id: Uuid) -> Result<Option<Slot>, TokenQueueError> {
        Ok(self.slots.read().await.get(&slot_id).cloned())
    }

    async fn insert_slot(&self, slot: Slot) -> Result<(), TokenQueueError> {
        let mut slots = self.slots.write().await;
        let duplicate = slots.values().any(|existing| {
            existing.doctor_id == slot.doctor_id && existing.start_time == slot.start_time
        });
        if duplicate {
            return Err(TokenQueueError::ValidationError(
                "A slot with this doctor and start time already exists".to_string(),
            ));
        }
        slots.insert(slot.id, slot);
        Ok(())
    }

    async fn list_slots_by_doctor(&self, doctor_id: Uuid) -> Result<Vec<Slot>, TokenQueueError> {
        let mut slots: Vec<Slot> = self
            .slots
            .read()
            .await
            .values()
            .filter(|slot| slot.doctor_id == doctor_id)
            .cloned()
            .collect();
        slots.sort_by_key(|slot| slot.start_time);
        Ok(slots)
    }

    async fn increment_capacity(&self, slot_id: Uuid, by: u32) -> Result<Slot, TokenQueueError> {
        self.update_slot(slot_id, |slot| {
            slot.capacity += by;
            Ok(())
        })
        .await
    }

    async fn set_capacity(&self, slot_id: Uuid, expected: u32, value: u32) -> Result<Slot, TokenQueueError> {
        self.update_slot(slot_id, |slot| {
            if slot.capacity != expected {
                return Err(TokenQueueError::Busy {
                    slot_id,
                    reason: format!(
                        "capacity changed concurrently (expected {}, found {})",
                        expected, slot.capacity
                    ),
                });
            }
            slot.capacity = value;
            Ok(())
        })
        .await
    }

    async fn set_occupancy(&self, slot_id: Uuid, expected: u32, value: u32) -> Result<Slot, TokenQueueError> {
        self.update_slot(slot_id, |slot| {
            if slot.occupancy != expected {
                return Err(TokenQueueError::Busy {
                    slot_id,
                    reason: format!(
                        "occupancy changed concurrently (expected {}, found {})",
                        expected, slot.occupancy
                    ),
                });
            }
            slot.occupancy = value;
            Ok(())
        })
        .await
    }

    async fn set_delay(&self, slot_id: Uuid, delay_minutes: u32) -> Result<Slot, TokenQueueError> {
        self.update_slot(slot_id, |slot| {
            slot.delay_minutes = delay_minutes;
            slot.status = match (slot.status, delay_minutes) {
                (SlotStatus::Active, minutes) if minutes > 0 => SlotStatus::Delayed,
                (SlotStatus::Delayed, 0) => SlotStatus::Active,
                (status, _) => status,
            };
            Ok(())
        })
        .await
    }

    async fn set_status(&self, slot_id: Uuid, status: SlotStatus) -> Result<Slot, TokenQueueError> {
        self.update_slot(slot_id, |slot| {
            slot.status = status;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl TokenStore for InMemoryQueueStore {
    async fn next_sequence(&self) -> Result<u64, TokenQueueError> {
        Ok(self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn get_token(&self, token_id: Uuid) -> Result<Option<Token>, TokenQueueError> {
        Ok(self.tokens.read().await.get(&token_id).cloned())
    }

    async fn save_tokens(&self, tokens: &[Token]) -> Result<(), TokenQueueError> {
        let mut stored = self.tokens.write().await;
        for token in tokens {
            stored.insert(token.id, token.clone());
        }
        Ok(())
    }

    async fn active_tokens(&self, slot_id: Uuid) -> Result<Vec<Token>, TokenQueueError> {
        let mut active: Vec<Token> = self
            .tokens
            .read()
            .await
            .values()
            .filter(|token| token.slot_id == slot_id && token.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|token| (token.queue_position, token.sequence));
        Ok(active)
    }

    async fn tokens_in_slot(&self, slot_id: Uuid) -> Result<Vec<Token>, TokenQueueError> {
        let mut tokens: Vec<Token> = self
            .tokens
            .read()
            .await
            .values()
            .filter(|token| token.slot_id == slot_id)
            .cloned()
            .collect();
        tokens.sort_by_key(|token| token.sequence);
        Ok(tokens)
    }

    async fn tokens_by_patient(&self, patient_id: &str) -> Result<Vec<Token>, TokenQueueError> {
        let mut tokens: Vec<Token> = self
            .tokens
            .read()
            .await
            .values()
            .filter(|token| token.patient_id == patient_id)
            .cloned()
            .collect();
        tokens.sort_by_key(|token| token.sequence);
        Ok(tokens)
    }
}
