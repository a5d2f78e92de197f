use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use token_allocation_cell::{create_slot_router, create_token_router, TokenAllocationService};

pub fn create_router(service: Arc<TokenAllocationService>) -> Router {
    Router::new()
        .route("/", get(|| async { "OPD Token Allocation API is running!" }))
        .route("/health", get(|| async { "ok" }))
        .nest("/api/tokens", create_token_router(service.clone()))
        .nest("/api/slots", create_slot_router(service))
}
