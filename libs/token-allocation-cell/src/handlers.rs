use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use shared_models::error::AppError;

use crate::{
    CancelRequest, CreateSlotRequest, DelayRequest, ReallocateRequest, Slot, SlotQuery,
    SlotStatusRequest, StatusUpdateRequest, Token, TokenAllocationService, TokenChannel,
    TokenQueueError, TokenRequest,
};

type ServiceState = State<Arc<TokenAllocationService>>;

fn log_failure(operation: &str, err: TokenQueueError) -> AppError {
    error!("Failed to {}: {}", operation, err);
    AppError::from(err)
}

async fn intake(
    service: &TokenAllocationService,
    request: TokenRequest,
    channel: TokenChannel,
    message: &str,
) -> Result<(StatusCode, Json<Value>), AppError> {
    info!("{} token request for slot {}", channel, request.slot_id);

    let token = service
        .allocate(request, channel)
        .await
        .map_err(|e| log_failure("allocate token", e))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": message,
            "data": token
        })),
    ))
}

fn slot_list(slots: Vec<Slot>) -> Json<Value> {
    Json(json!({
        "success": true,
        "count": slots.len(),
        "data": slots
    }))
}

fn token_list(tokens: Vec<Token>) -> Json<Value> {
    Json(json!({
        "success": true,
        "count": tokens.len(),
        "data": tokens
    }))
}

/// Book an online token
pub async fn book_online_token(
    State(service): ServiceState,
    Json(request): Json<TokenRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    intake(&service, request, TokenChannel::Online, "Token booked successfully").await
}

/// Generate a walk-in token
pub async fn generate_walkin_token(
    State(service): ServiceState,
    Json(request): Json<TokenRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    intake(&service, request, TokenChannel::Walkin, "Walk-in token generated successfully").await
}

/// Generate a paid priority token
pub async fn generate_priority_token(
    State(service): ServiceState,
    Json(request): Json<TokenRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    intake(&service, request, TokenChannel::Priority, "Priority token generated successfully").await
}

/// Generate a follow-up token
pub async fn generate_followup_token(
    State(service): ServiceState,
    Json(request): Json<TokenRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    intake(&service, request, TokenChannel::Followup, "Follow-up token generated successfully").await
}

/// Insert an emergency token, growing a full slot by one
pub async fn insert_emergency_token(
    State(service): ServiceState,
    Json(request): Json<TokenRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    intake(&service, request, TokenChannel::Emergency, "Emergency token inserted successfully").await
}

pub async fn get_token(
    State(service): ServiceState,
    Path(token_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let token = service.get_token(token_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": token
    })))
}

pub async fn get_tokens_by_patient(
    State(service): ServiceState,
    Path(patient_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let tokens = service.get_tokens_by_patient(&patient_id).await?;
    Ok(token_list(tokens))
}

/// Active queue of a slot, ordered by position
pub async fn get_token_queue(
    State(service): ServiceState,
    Path(slot_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let tokens = service.get_queue(slot_id).await?;
    Ok(token_list(tokens))
}

pub async fn update_token_status(
    State(service): ServiceState,
    Path(token_id): Path<Uuid>,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<Value>, AppError> {
    info!("Status update for token {} to {}", token_id, request.status);

    let token = service
        .update_token_status(token_id, request.status, request.reason)
        .await
        .map_err(|e| log_failure("update token status", e))?;

    Ok(Json(json!({
        "success": true,
        "message": "Token status updated successfully",
        "data": token
    })))
}

/// Cancel a token; the JSON body carrying a reason is optional
pub async fn cancel_token(
    State(service): ServiceState,
    Path(token_id): Path<Uuid>,
    request: Option<Json<CancelRequest>>,
) -> Result<Json<Value>, AppError> {
    info!("Cancel request for token {}", token_id);
    let reason = request.and_then(|Json(body)| body.reason);

    let token = service
        .cancel_token(token_id, reason)
        .await
        .map_err(|e| log_failure("cancel token", e))?;

    Ok(Json(json!({
        "success": true,
        "message": "Token cancelled successfully and queue reordered",
        "data": token
    })))
}

pub async fn mark_no_show(
    State(service): ServiceState,
    Path(token_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let token = service
        .mark_no_show(token_id)
        .await
        .map_err(|e| log_failure("mark no-show", e))?;

    Ok(Json(json!({
        "success": true,
        "message": "Token marked as no-show and queue reordered",
        "data": token
    })))
}

/// Move every active token of a slot into another slot
pub async fn reallocate_tokens(
    State(service): ServiceState,
    Path(slot_id): Path<Uuid>,
    Json(request): Json<ReallocateRequest>,
) -> Result<Json<Value>, AppError> {
    info!("Reallocation request from slot {} to {}", slot_id, request.target_slot_id);

    let result = service
        .reallocate_tokens(slot_id, request.target_slot_id)
        .await
        .map_err(|e| log_failure("reallocate tokens", e))?;

    let message = if result.reallocated == 0 {
        "No tokens to reallocate"
    } else {
        "Tokens reallocated successfully"
    };

    Ok(Json(json!({
        "success": true,
        "message": message,
        "data": result
    })))
}

pub async fn create_slot(
    State(service): ServiceState,
    Json(request): Json<CreateSlotRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let slot = service
        .create_slot(request)
        .await
        .map_err(|e| log_failure("create slot", e))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Slot created successfully",
            "data": slot
        })),
    ))
}

pub async fn get_slot(
    State(service): ServiceState,
    Path(slot_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let slot = service.get_slot(slot_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": slot
    })))
}

pub async fn get_slot_stats(
    State(service): ServiceState,
    Path(slot_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let stats = service.get_slot_stats(slot_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": stats
    })))
}

pub async fn mark_slot_delayed(
    State(service): ServiceState,
    Path(slot_id): Path<Uuid>,
    Json(request): Json<DelayRequest>,
) -> Result<Json<Value>, AppError> {
    let slot = service
        .mark_slot_delayed(slot_id, request.delay_minutes)
        .await
        .map_err(|e| log_failure("mark slot delayed", e))?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Slot marked as delayed by {} minutes", request.delay_minutes),
        "data": slot
    })))
}

pub async fn update_slot_status(
    State(service): ServiceState,
    Path(slot_id): Path<Uuid>,
    Json(request): Json<SlotStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let slot = service
        .update_slot_status(slot_id, request.status)
        .await
        .map_err(|e| log_failure("update slot status", e))?;

    Ok(Json(json!({
        "success": true,
        "message": "Slot status updated successfully",
        "data": slot
    })))
}

pub async fn get_slots_by_doctor(
    State(service): ServiceState,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    let slots = service.list_slots_by_doctor(doctor_id, query.date).await?;
    Ok(slot_list(slots))
}

pub async fn get_available_slots(
    State(service): ServiceState,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    let slots = service.list_available_slots(doctor_id, query.date).await?;
    Ok(slot_list(slots))
}

pub async fn get_filled_slots(
    State(service): ServiceState,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    let slots = service.list_filled_slots(doctor_id, query.date).await?;
    Ok(slot_list(slots))
}
