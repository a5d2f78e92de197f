use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::error::TokenQueueError;
use crate::models::{
    CreateSlotRequest, ReallocationResult, Slot, SlotStats, SlotStatus, Token, TokenChannel,
    TokenRequest, TokenStatus,
};
use crate::services::estimate::apply_estimates;
use crate::services::lock::{SlotGuard, SlotLockManager};
use crate::services::priority::PriorityPolicy;
use crate::services::reorder::reorder;
use crate::services::store::{InMemoryQueueStore, SlotLedger, TokenStore};
use crate::services::validation::{validate_intake, validate_slot};

// A token may be reallocated between reading its slot and locking it.
const SLOT_LOCK_ATTEMPTS: usize = 3;

const SNAPSHOT_ATTEMPTS: usize = 5;

/// Token lifecycle over per-slot priority queues.
///
/// Every mutation holds the owning slot's lock, rebuilds that slot's active
/// queue with [`reorder`], recomputes estimated times and writes the whole
/// queue back in one batch.
pub struct TokenAllocationService {
    config: Arc<AppConfig>,
    policy: PriorityPolicy,
    slots: Arc<dyn SlotLedger>,
    tokens: Arc<dyn TokenStore>,
    locks: SlotLockManager,
}

impl TokenAllocationService {
    pub fn new(config: Arc<AppConfig>, slots: Arc<dyn SlotLedger>, tokens: Arc<dyn TokenStore>) -> Self {
        let policy = PriorityPolicy::new(config.priority_weights);
        let locks = SlotLockManager::new(Duration::from_millis(config.slot_lock_timeout_ms));

        Self {
            config,
            policy,
            slots,
            tokens,
            locks,
        }
    }

    pub fn in_memory(config: Arc<AppConfig>) -> Self {
        let store = Arc::new(InMemoryQueueStore::new());
        Self::new(config, store.clone(), store)
    }

    pub fn policy(&self) -> &PriorityPolicy {
        &self.policy
    }

    pub fn locks(&self) -> &SlotLockManager {
        &self.locks
    }

    // ---------------------------------------------------------------------
    // Slots
    // ---------------------------------------------------------------------

    pub async fn create_slot(&self, request: CreateSlotRequest) -> Result<Slot, TokenQueueError> {
        let capacity = request.capacity.unwrap_or(self.config.default_slot_capacity);
        validate_slot(&request, capacity)?;

        let slot = Slot::new(request.doctor_id, request.start_time, request.end_time, capacity);
        self.slots.insert_slot(slot.clone()).await?;

        info!("Created slot {} for doctor {} with capacity {}", slot.id, slot.doctor_id, capacity);
        Ok(slot)
    }

    pub async fn get_slot(&self, slot_id: Uuid) -> Result<Slot, TokenQueueError> {
        self.slots
            .get_slot(slot_id)
            .await?
            .ok_or(TokenQueueError::SlotNotFound(slot_id))
    }

    /// Applies a delay to the slot and shifts every active token's estimate.
    pub async fn mark_slot_delayed(&self, slot_id: Uuid, delay_minutes: u32) -> Result<Slot, TokenQueueError> {
        if delay_minutes == 0 {
            return Err(TokenQueueError::ValidationError(
                "Delay minutes must be greater than zero".to_string(),
            ));
        }

        let _guard = self.locks.acquire(slot_id).await?;
        let previous = self.get_slot(slot_id).await?;
        Self::check_accepting(&previous)?;

        let slot = self.slots.set_delay(slot_id, delay_minutes).await?;
        let mut queue = self.tokens.active_tokens(slot_id).await?;
        apply_estimates(&mut queue, &slot, self.config.average_consultation_minutes);

        if let Err(err) = self.tokens.save_tokens(&queue).await {
            if let Err(undo) = self.slots.set_delay(slot_id, previous.delay_minutes).await {
                error!("Failed to restore delay of slot {}: {}", slot_id, undo);
            }
            return Err(err);
        }

        info!("Slot {} delayed by {} minutes, {} estimates updated", slot_id, delay_minutes, queue.len());
        Ok(slot)
    }

    /// Closes or reopens a slot. CANCELLED and COMPLETED slots stop taking tokens.
    pub async fn update_slot_status(&self, slot_id: Uuid, status: SlotStatus) -> Result<Slot, TokenQueueError> {
        if status == SlotStatus::Delayed {
            return Err(TokenQueueError::ValidationError(
                "Use the delay operation to mark a slot delayed".to_string(),
            ));
        }

        let _guard = self.locks.acquire(slot_id).await?;
        let previous = self.get_slot(slot_id).await?;
        let slot = self.slots.set_status(slot_id, status).await?;

        info!("Slot {} status updated from {:?} to {:?}", slot_id, previous.status, status);
        Ok(slot)
    }

    /// Slot counters and per-status token counts taken from one consistent view.
    ///
    /// Reads are lock-free, so the slot is read on both sides of the token read
    /// and the pair is only accepted when nothing moved in between.
    pub async fn get_slot_stats(&self, slot_id: Uuid) -> Result<SlotStats, TokenQueueError> {
        for _ in 0..SNAPSHOT_ATTEMPTS {
            let slot = self.get_slot(slot_id).await?;
            let tokens = self.tokens.tokens_in_slot(slot_id).await?;
            let after = self.get_slot(slot_id).await?;

            let active = tokens.iter().filter(|token| token.is_active()).count() as u32;
            if after != slot || active != slot.occupancy {
                debug!("Slot {} changed while reading stats, retrying", slot_id);
                continue;
            }

            let mut token_stats = BTreeMap::new();
            for token in &tokens {
                *token_stats.entry(token.status).or_insert(0) += 1;
            }

            return Ok(SlotStats {
                slot_id,
                capacity: slot.capacity,
                occupancy: slot.occupancy,
                available_capacity: slot.available_capacity(),
                is_full: slot.is_full(),
                is_delayed: slot.is_delayed(),
                delay_minutes: slot.delay_minutes,
                status: slot.status,
                token_stats,
            });
        }

        Err(TokenQueueError::Busy {
            slot_id,
            reason: "slot kept changing while reading stats".to_string(),
        })
    }

    /// A doctor's slots ordered by start time, optionally limited to one day.
    pub async fn list_slots_by_doctor(
        &self,
        doctor_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Slot>, TokenQueueError> {
        let slots = self.slots.list_slots_by_doctor(doctor_id).await?;
        Ok(slots
            .into_iter()
            .filter(|slot| date.map_or(true, |day| slot.start_time.date_naive() == day))
            .collect())
    }

    pub async fn list_available_slots(
        &self,
        doctor_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Slot>, TokenQueueError> {
        let slots = self.list_slots_by_doctor(doctor_id, date).await?;
        Ok(slots.into_iter().filter(|slot| !slot.is_full()).collect())
    }

    pub async fn list_filled_slots(
        &self,
        doctor_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Slot>, TokenQueueError> {
        let slots = self.list_slots_by_doctor(doctor_id, date).await?;
        Ok(slots.into_iter().filter(Slot::is_full).collect())
    }

    // ---------------------------------------------------------------------
    // Intake
    // ---------------------------------------------------------------------

    pub async fn book_online_token(&self, request: TokenRequest) -> Result<Token, TokenQueueError> {
        self.allocate(request, TokenChannel::Online).await
    }

    pub async fn generate_walkin_token(&self, request: TokenRequest) -> Result<Token, TokenQueueError> {
        self.allocate(request, TokenChannel::Walkin).await
    }

    pub async fn generate_priority_token(&self, request: TokenRequest) -> Result<Token, TokenQueueError> {
        self.allocate(request, TokenChannel::Priority).await
    }

    pub async fn generate_followup_token(&self, request: TokenRequest) -> Result<Token, TokenQueueError> {
        self.allocate(request, TokenChannel::Followup).await
    }

    /// Emergency intake never fails for lack of room: a full slot grows by one.
    pub async fn insert_emergency_token(&self, request: TokenRequest) -> Result<Token, TokenQueueError> {
        self.allocate(request, TokenChannel::Emergency).await
    }

    /// Core allocation: score, insert, reorder, estimate, then commit.
    ///
    /// The returned token carries its post-reorder position, number and
    /// estimated time.
    pub async fn allocate(&self, request: TokenRequest, channel: TokenChannel) -> Result<Token, TokenQueueError> {
        let patient_id = validate_intake(&request, channel)?;
        let slot_id = request.slot_id;

        let _guard = self.locks.acquire(slot_id).await?;
        let mut slot = self.get_slot(slot_id).await?;
        Self::check_accepting(&slot)?;

        let elastic = slot.is_full();
        if elastic {
            if channel != TokenChannel::Emergency {
                warn!("Rejected {} token: slot {} is full ({}/{})", channel, slot_id, slot.occupancy, slot.capacity);
                return Err(TokenQueueError::CapacityExceeded {
                    slot_id,
                    capacity: slot.capacity,
                });
            }
            slot.capacity += 1;
        }

        let now = Utc::now();
        let token = Token {
            id: Uuid::new_v4(),
            token_number: String::new(),
            patient_id,
            patient_name: request.patient_name.trim().to_string(),
            phone_number: request.phone_number,
            slot_id,
            channel,
            priority: self.policy.score(channel),
            sequence: self.tokens.next_sequence().await?,
            queue_position: 0,
            estimated_time: slot.start_time,
            status: TokenStatus::Pending,
            cancellation_reason: None,
            check_in_time: None,
            completed_time: None,
            created_at: now,
            updated_at: now,
        };
        let token_id = token.id;

        let mut active = self.tokens.active_tokens(slot_id).await?;
        active.push(token);
        let mut queue = reorder(active);
        apply_estimates(&mut queue, &slot, self.config.average_consultation_minutes);

        // Occupancy first: a lost race leaves nothing to undo.
        let occupancy = slot.occupancy;
        self.slots
            .set_occupancy(slot_id, occupancy, occupancy + 1)
            .await?;
        if elastic {
            if let Err(err) = self.slots.increment_capacity(slot_id, 1).await {
                self.rollback_occupancy(slot_id, occupancy + 1, occupancy).await;
                return Err(err);
            }
            info!(
                "EMERGENCY: extended slot {} capacity to {} for emergency case",
                slot_id, slot.capacity
            );
        }
        if let Err(err) = self.tokens.save_tokens(&queue).await {
            self.rollback_occupancy(slot_id, occupancy + 1, occupancy).await;
            if elastic {
                self.rollback_capacity(slot_id, slot.capacity, slot.capacity - 1).await;
            }
            return Err(err);
        }

        let allocated = match queue.into_iter().find(|t| t.id == token_id) {
            Some(token) => token,
            None => unreachable!("reorder dropped token {}", token_id),
        };

        info!(
            "Allocated {} token {} ({}) in slot {} at position {}",
            channel, allocated.token_number, allocated.id, slot_id, allocated.queue_position
        );
        Ok(allocated)
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Moves a token along its lifecycle. Terminal targets go through the
    /// cancel/no-show path so the slot queue is rebuilt.
    pub async fn update_token_status(
        &self,
        token_id: Uuid,
        status: TokenStatus,
        reason: Option<String>,
    ) -> Result<Token, TokenQueueError> {
        if status.is_terminal() {
            return self.remove_from_queue(token_id, status, reason).await;
        }

        let (_guard, mut token) = self.lock_token_slot(token_id).await?;
        Self::check_transition(&token, status)?;

        let now = Utc::now();
        match status {
            TokenStatus::CheckedIn => token.check_in_time = Some(now),
            TokenStatus::Completed => token.completed_time = Some(now),
            _ => {}
        }
        let previous = token.status;
        token.status = status;
        token.updated_at = now;
        self.tokens.save_tokens(std::slice::from_ref(&token)).await?;

        info!("Token {} status updated from {} to {}", token_id, previous, status);
        Ok(token)
    }

    pub async fn cancel_token(&self, token_id: Uuid, reason: Option<String>) -> Result<Token, TokenQueueError> {
        self.remove_from_queue(token_id, TokenStatus::Cancelled, reason).await
    }

    pub async fn mark_no_show(&self, token_id: Uuid) -> Result<Token, TokenQueueError> {
        self.remove_from_queue(token_id, TokenStatus::NoShow, None).await
    }

    async fn remove_from_queue(
        &self,
        token_id: Uuid,
        terminal: TokenStatus,
        reason: Option<String>,
    ) -> Result<Token, TokenQueueError> {
        debug_assert!(terminal.is_terminal());

        let (_guard, mut token) = self.lock_token_slot(token_id).await?;
        Self::check_transition(&token, terminal)?;

        let slot_id = token.slot_id;
        let slot = self.get_slot(slot_id).await?;

        token.status = terminal;
        token.cancellation_reason = reason;
        token.updated_at = Utc::now();

        let remaining: Vec<Token> = self
            .tokens
            .active_tokens(slot_id)
            .await?
            .into_iter()
            .filter(|t| t.id != token_id)
            .collect();
        let mut queue = reorder(remaining);
        apply_estimates(&mut queue, &slot, self.config.average_consultation_minutes);

        let occupancy = slot.occupancy;
        let debited = occupancy.saturating_sub(1);
        self.slots
            .set_occupancy(slot_id, occupancy, debited)
            .await?;

        queue.push(token.clone());
        if let Err(err) = self.tokens.save_tokens(&queue).await {
            self.rollback_occupancy(slot_id, debited, occupancy).await;
            return Err(err);
        }

        info!(
            "Token {} marked {} in slot {}, {} tokens remain queued",
            token_id,
            terminal,
            slot_id,
            queue.len() - 1
        );
        Ok(token)
    }

    /// Moves every active token from `source_slot_id` into `target_slot_id`.
    ///
    /// All or nothing: if the target cannot take every token, neither slot
    /// changes. Moved tokens keep their scores and creation order.
    pub async fn reallocate_tokens(
        &self,
        source_slot_id: Uuid,
        target_slot_id: Uuid,
    ) -> Result<ReallocationResult, TokenQueueError> {
        if source_slot_id == target_slot_id {
            return Err(TokenQueueError::ValidationError(
                "Source and target slot must differ".to_string(),
            ));
        }

        let _guard = self.locks.acquire_pair(source_slot_id, target_slot_id).await?;
        let source = self.get_slot(source_slot_id).await?;
        let target = self.get_slot(target_slot_id).await?;
        Self::check_accepting(&target)?;

        let moving = self.tokens.active_tokens(source_slot_id).await?;
        let required = moving.len() as u32;
        let available = target.available_capacity();
        if available < required {
            warn!(
                "Reallocation {} -> {} aborted: {} tokens, {} free",
                source_slot_id, target_slot_id, required, available
            );
            return Err(TokenQueueError::InsufficientCapacity { available, required });
        }

        let now = Utc::now();
        let mut merged = self.tokens.active_tokens(target_slot_id).await?;
        merged.extend(moving.into_iter().map(|mut token| {
            token.slot_id = target_slot_id;
            token.updated_at = now;
            token
        }));
        let mut queue = reorder(merged);
        apply_estimates(&mut queue, &target, self.config.average_consultation_minutes);

        // Credit the target before debiting the source so any failure can be undone.
        let credited = target.occupancy + required;
        self.slots
            .set_occupancy(target_slot_id, target.occupancy, credited)
            .await?;
        if let Err(err) = self.slots.set_occupancy(source_slot_id, source.occupancy, 0).await {
            self.rollback_occupancy(target_slot_id, credited, target.occupancy).await;
            return Err(err);
        }
        if let Err(err) = self.tokens.save_tokens(&queue).await {
            self.rollback_occupancy(source_slot_id, 0, source.occupancy).await;
            self.rollback_occupancy(target_slot_id, credited, target.occupancy).await;
            return Err(err);
        }

        info!(
            "Reallocated {} tokens from slot {} to slot {}",
            required, source_slot_id, target_slot_id
        );
        Ok(ReallocationResult {
            source_slot_id,
            target_slot_id,
            reallocated: required as usize,
            target_queue: queue,
        })
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub async fn get_token(&self, token_id: Uuid) -> Result<Token, TokenQueueError> {
        self.tokens
            .get_token(token_id)
            .await?
            .ok_or(TokenQueueError::TokenNotFound(token_id))
    }

    /// Active tokens of a slot in queue order.
    pub async fn get_queue(&self, slot_id: Uuid) -> Result<Vec<Token>, TokenQueueError> {
        self.get_slot(slot_id).await?;
        self.tokens.active_tokens(slot_id).await
    }

    pub async fn get_tokens_by_patient(&self, patient_id: &str) -> Result<Vec<Token>, TokenQueueError> {
        self.tokens.tokens_by_patient(patient_id).await
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    fn check_accepting(slot: &Slot) -> Result<(), TokenQueueError> {
        if slot.accepts_tokens() {
            return Ok(());
        }
        warn!("Rejected change to slot {} with status {:?}", slot.id, slot.status);
        Err(TokenQueueError::ValidationError(format!(
            "Slot {} is {:?} and no longer accepts tokens",
            slot.id, slot.status
        )))
    }

    /// Undoes an occupancy write. A failure here is logged; the caller reports
    /// the error that triggered the rollback.
    async fn rollback_occupancy(&self, slot_id: Uuid, current: u32, previous: u32) {
        match self.slots.set_occupancy(slot_id, current, previous).await {
            Ok(_) => warn!("Rolled back occupancy of slot {} to {}", slot_id, previous),
            Err(err) => error!("Failed to roll back occupancy of slot {}: {}", slot_id, err),
        }
    }

    async fn rollback_capacity(&self, slot_id: Uuid, current: u32, previous: u32) {
        match self.slots.set_capacity(slot_id, current, previous).await {
            Ok(_) => warn!("Rolled back capacity of slot {} to {}", slot_id, previous),
            Err(err) => error!("Failed to roll back capacity of slot {}: {}", slot_id, err),
        }
    }

    fn check_transition(token: &Token, target: TokenStatus) -> Result<(), TokenQueueError> {
        if token.status.is_terminal() {
            warn!("Rejected {} on terminal token {} ({})", target, token.id, token.status);
            return Err(TokenQueueError::AlreadyTerminal {
                token_id: token.id,
                status: token.status,
            });
        }
        if !token.status.can_transition_to(&target) {
            warn!("Invalid status transition attempted: {} -> {}", token.status, target);
            return Err(TokenQueueError::InvalidTransition {
                from: token.status,
                to: target,
            });
        }
        Ok(())
    }

    /// Locks the slot currently owning `token_id` and returns a fresh read of
    /// the token taken under that lock.
    async fn lock_token_slot(&self, token_id: Uuid) -> Result<(SlotGuard, Token), TokenQueueError> {
        let mut slot_id = self.get_token(token_id).await?.slot_id;

        for _ in 0..SLOT_LOCK_ATTEMPTS {
            let guard = self.locks.acquire(slot_id).await?;
            let token = self.get_token(token_id).await?;
            if token.slot_id == slot_id {
                return Ok((guard, token));
            }
            debug!("Token {} moved from slot {} to {} while locking", token_id, slot_id, token.slot_id);
            slot_id = token.slot_id;
        }

        Err(TokenQueueError::Busy {
            slot_id,
            reason: format!("token {} kept moving between slots", token_id),
        })
    }
}
