use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::TokenQueueError;

/// Per-slot mutual exclusion for mutating queue operations.
///
/// One async mutex per slot id, created on first use and pruned once nobody
/// holds or waits on it. Acquisition is bounded by `timeout` and surfaces as
/// [`TokenQueueError::Busy`] instead of waiting forever.
pub struct SlotLockManager {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    timeout: Duration,
}

/// Holds one or more slot locks; released on drop.
#[must_use]
pub struct SlotGuard {
    slots: Vec<Uuid>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl SlotGuard {
    pub fn slots(&self) -> &[Uuid] {
        &self.slots
    }
}

impl SlotLockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of slots with a live lock entry.
    pub async fn tracked_slots(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn acquire(&self, slot_id: Uuid) -> Result<SlotGuard, TokenQueueError> {
        let guard = self.lock_one(slot_id).await?;
        Ok(SlotGuard {
            slots: vec![slot_id],
            _guards: vec![guard],
        })
    }

    /// Locks two slots in ascending id order so opposing reallocations
    /// cannot deadlock on each other.
    pub async fn acquire_pair(&self, first: Uuid, second: Uuid) -> Result<SlotGuard, TokenQueueError> {
        if first == second {
            return self.acquire(first).await;
        }

        let (low, high) = if first < second { (first, second) } else { (second, first) };
        let low_guard = self.lock_one(low).await?;
        let high_guard = self.lock_one(high).await?;

        Ok(SlotGuard {
            slots: vec![low, high],
            _guards: vec![low_guard, high_guard],
        })
    }

    async fn lock_one(&self, slot_id: Uuid) -> Result<OwnedMutexGuard<()>, TokenQueueError> {
        let slot_lock = {
            let mut locks = self.locks.lock().await;
            // Handles are only cloned under this mutex, so a count of one means idle.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(slot_id).or_default().clone()
        };

        match timeout(self.timeout, slot_lock.lock_owned()).await {
            Ok(guard) => {
                debug!("Acquired lock for slot {}", slot_id);
                Ok(guard)
            }
            Err(_) => {
                warn!(
                    "Timed out after {:?} waiting for lock on slot {}",
                    self.timeout, slot_id
                );
                Err(TokenQueueError::Busy {
                    slot_id,
                    reason: format!("lock not acquired within {} ms", self.timeout.as_millis()),
                })
            }
        }
    }
}
