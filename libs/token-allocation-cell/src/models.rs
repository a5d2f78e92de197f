use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenChannel {
    Online,
    Walkin,
    Priority,
    Followup,
    Emergency,
}

impl TokenChannel {
    pub const ALL: [TokenChannel; 5] = [
        TokenChannel::Emergency,
        TokenChannel::Priority,
        TokenChannel::Followup,
        TokenChannel::Online,
        TokenChannel::Walkin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenChannel::Online => "ONLINE",
            TokenChannel::Walkin => "WALKIN",
            TokenChannel::Priority => "PRIORITY",
            TokenChannel::Followup => "FOLLOWUP",
            TokenChannel::Emergency => "EMERGENCY",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|channel| channel.as_str().eq_ignore_ascii_case(label.trim()))
    }

    /// Walk-in and emergency patients may arrive without a registered patient id.
    pub fn requires_patient_id(&self) -> bool {
        matches!(
            self,
            TokenChannel::Online | TokenChannel::Priority | TokenChannel::Followup
        )
    }
}

impl fmt::Display for TokenChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenStatus {
    Pending,
    CheckedIn,
    Consulting,
    Completed,
    Cancelled,
    NoShow,
}

impl TokenStatus {
    /// Cancelled and no-show tokens leave the active set for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TokenStatus::Cancelled | TokenStatus::NoShow)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(&self, target: &TokenStatus) -> bool {
        use TokenStatus::*;
        match (self, target) {
            (Pending, CheckedIn) => true,
            (CheckedIn, Consulting) => true,
            (Consulting, Completed) => true,
            (Pending | CheckedIn, Cancelled) => true,
            (Pending | CheckedIn, NoShow) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TokenStatus::Pending => "PENDING",
            TokenStatus::CheckedIn => "CHECKED_IN",
            TokenStatus::Consulting => "CONSULTING",
            TokenStatus::Completed => "COMPLETED",
            TokenStatus::Cancelled => "CANCELLED",
            TokenStatus::NoShow => "NO_SHOW",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Token {
    pub id: Uuid,
    pub token_number: String,
    pub patient_id: String,
    pub patient_name: String,
    pub phone_number: Option<String>,
    pub slot_id: Uuid,
    pub channel: TokenChannel,
    pub priority: i32,
    /// Creation ordinal, the tie-break between equal priority scores.
    pub sequence: u64,
    pub queue_position: u32,
    pub estimated_time: DateTime<Utc>,
    pub status: TokenStatus,
    pub cancellation_reason: Option<String>,
    pub check_in_time: Option<DateTime<Utc>>,
    pub completed_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Token {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    Active,
    Delayed,
    Cancelled,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Slot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub capacity: u32,
    pub occupancy: u32,
    pub delay_minutes: u32,
    pub status: SlotStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Slot {
    pub fn new(doctor_id: Uuid, start_time: DateTime<Utc>, end_time: DateTime<Utc>, capacity: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            doctor_id,
            start_time,
            end_time,
            capacity,
            occupancy: 0,
            delay_minutes: 0,
            status: SlotStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn available_capacity(&self) -> u32 {
        self.capacity.saturating_sub(self.occupancy)
    }

    pub fn is_full(&self) -> bool {
        self.occupancy >= self.capacity
    }

    pub fn is_delayed(&self) -> bool {
        self.delay_minutes > 0
    }

    pub fn accepts_tokens(&self) -> bool {
        matches!(self.status, SlotStatus::Active | SlotStatus::Delayed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRequest {
    pub slot_id: Uuid,
    pub patient_id: Option<String>,
    pub patient_name: String,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: TokenStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReallocateRequest {
    pub target_slot_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSlotRequest {
    pub doctor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub capacity: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayRequest {
    pub delay_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotStatusRequest {
    pub status: SlotStatus,
}

/// Optional `?date=YYYY-MM-DD` filter on slot listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlotQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReallocationResult {
    pub source_slot_id: Uuid,
    pub target_slot_id: Uuid,
    pub reallocated: usize,
    pub target_queue: Vec<Token>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotStats {
    pub slot_id: Uuid,
    pub capacity: u32,
    pub occupancy: u32,
    pub available_capacity: u32,
    pub is_full: bool,
    pub is_delayed: bool,
    pub delay_minutes: u32,
    pub status: SlotStatus,
    pub token_stats: BTreeMap<TokenStatus, u32>,
}
