use std::sync::Arc;
use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::handlers::{
    book_online_token,
    generate_walkin_token,
    generate_priority_token,
    generate_followup_token,
    insert_emergency_token,
    get_token,
    get_tokens_by_patient,
    get_token_queue,
    update_token_status,
    cancel_token,
    mark_no_show,
    reallocate_tokens,
    create_slot,
    get_slot,
    get_slot_stats,
    mark_slot_delayed,
    update_slot_status,
    get_slots_by_doctor,
    get_available_slots,
    get_filled_slots,
};
use crate::TokenAllocationService;

pub fn create_token_router(state: Arc<TokenAllocationService>) -> Router {
    Router::new()
        .route("/book", post(book_online_token))
        .route("/walkin", post(generate_walkin_token))
        .route("/priority", post(generate_priority_token))
        .route("/followup", post(generate_followup_token))
        .route("/emergency", post(insert_emergency_token))
        .route("/{token_id}", get(get_token))
        .route("/patient/{patient_id}", get(get_tokens_by_patient))
        .route("/queue/{slot_id}", get(get_token_queue))
        .route("/{token_id}/status", patch(update_token_status))
        .route("/{token_id}/cancel", post(cancel_token).delete(cancel_token))
        .route("/{token_id}/no-show", post(mark_no_show))
        .route("/reallocate/{slot_id}", post(reallocate_tokens))
        .with_state(state)
}

pub fn create_slot_router(state: Arc<TokenAllocationService>) -> Router {
    Router::new()
        .route("/", post(create_slot))
        .route("/{slot_id}", get(get_slot))
        .route("/{slot_id}/stats", get(get_slot_stats))
        .route("/{slot_id}/delay", patch(mark_slot_delayed))
        .route("/{slot_id}/status", patch(update_slot_status))
        .route("/doctor/{doctor_id}", get(get_slots_by_doctor))
        .route("/doctor/{doctor_id}/available", get(get_available_slots))
        .route("/doctor/{doctor_id}/filled", get(get_filled_slots))
        .with_state(state)
}
