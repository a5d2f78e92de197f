use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use crate::error::TokenQueueError;
use crate::models::{CreateSlotRequest, TokenChannel, TokenRequest};

static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+?[0-9]{7,15}$").unwrap());

/// Checks an intake request and resolves the patient id, generating one for
/// channels that admit unregistered patients.
pub fn validate_intake(request: &TokenRequest, channel: TokenChannel) -> Result<String, TokenQueueError> {
    if request.patient_name.trim().is_empty() {
        return Err(TokenQueueError::ValidationError(
            "Patient name is required".to_string(),
        ));
    }

    if let Some(phone) = &request.phone_number {
        if !PHONE_PATTERN.is_match(phone) {
            return Err(TokenQueueError::ValidationError(format!(
                "Invalid phone number: {}",
                phone
            )));
        }
    }

    let supplied = request
        .patient_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());

    match supplied {
        Some(id) => Ok(id.to_string()),
        None if channel.requires_patient_id() => Err(TokenQueueError::ValidationError(format!(
            "Patient id is required for {} tokens",
            channel
        ))),
        None => Ok(format!("{}-{}", channel, Uuid::new_v4().simple())),
    }
}

pub fn validate_slot(request: &CreateSlotRequest, capacity: u32) -> Result<(), TokenQueueError> {
    if capacity == 0 {
        return Err(TokenQueueError::ValidationError(
            "Slot capacity must be at least 1".to_string(),
        ));
    }
    if request.end_time <= request.start_time {
        return Err(TokenQueueError::ValidationError(
            "Slot end time must be after its start time".to_string(),
        ));
    }
    Ok(())
}
