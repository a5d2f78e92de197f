use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use shared_config::{AppConfig, PriorityWeights};

pub struct TestConfig {
    pub priority_weights: PriorityWeights,
    pub average_consultation_minutes: u32,
    pub slot_lock_timeout_ms: u64,
    pub default_slot_capacity: u32,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            priority_weights: PriorityWeights::default(),
            average_consultation_minutes: 10,
            slot_lock_timeout_ms: 500,
            default_slot_capacity: 6,
        }
    }
}

impl TestConfig {
    pub fn with_lock_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.slot_lock_timeout_ms = timeout_ms;
        self
    }

    pub fn with_weights(mut self, weights: PriorityWeights) -> Self {
        self.priority_weights = weights;
        self
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            server_port: 0,
            priority_weights: self.priority_weights,
            average_consultation_minutes: self.average_consultation_minutes,
            slot_lock_timeout_ms: self.slot_lock_timeout_ms,
            default_slot_capacity: self.default_slot_capacity,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// Fixed one-hour consultation window starting at `hour`:00 UTC on 2024-01-15.
pub fn slot_window(hour: u32) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc
        .with_ymd_and_hms(2024, 1, 15, hour, 0, 0)
        .single()
        .unwrap_or_else(Utc::now);
    (start, start + Duration::hours(1))
}

pub fn test_doctor_id() -> Uuid {
    Uuid::new_v4()
}

pub fn test_patient_id() -> String {
    format!("patient-{}", Uuid::new_v4().simple())
}
