use thiserror::Error;
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::TokenStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TokenQueueError {
    #[error("Slot not found: {0}")]
    SlotNotFound(Uuid),

    #[error("Token not found: {0}")]
    TokenNotFound(Uuid),

    #[error("Slot {slot_id} is full ({capacity} tokens). Token cannot be allocated")]
    CapacityExceeded { slot_id: Uuid, capacity: u32 },

    #[error("Target slot only has capacity for {available} tokens, but {required} need reallocation")]
    InsufficientCapacity { available: u32, required: u32 },

    #[error("Invalid token status transition from {from} to {to}")]
    InvalidTransition { from: TokenStatus, to: TokenStatus },

    #[error("Token {token_id} is already {status}")]
    AlreadyTerminal { token_id: Uuid, status: TokenStatus },

    #[error("Slot {slot_id} is busy: {reason}")]
    Busy { slot_id: Uuid, reason: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl From<TokenQueueError> for AppError {
    fn from(err: TokenQueueError) -> Self {
        match err {
            TokenQueueError::SlotNotFound(_) | TokenQueueError::TokenNotFound(_) => {
                AppError::NotFound(err.to_string())
            }
            TokenQueueError::CapacityExceeded { .. }
            | TokenQueueError::InsufficientCapacity { .. }
            | TokenQueueError::InvalidTransition { .. }
            | TokenQueueError::AlreadyTerminal { .. } => AppError::Conflict(err.to_string()),
            TokenQueueError::Busy { .. } => AppError::ServiceUnavailable(err.to_string()),
            TokenQueueError::ValidationError(msg) => AppError::ValidationError(msg),
            TokenQueueError::StorageError(msg) => AppError::Database(msg),
        }
    }
}
