//! API route definitions
//!
//! This module defines all REST routes and builds the router.

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{
    infer, list_models, liveness, model_metadata, model_ready, server_live, server_metadata,
    server_ready, unload_model, AppState,
};

/// Build the API router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/", get(liveness))
        .nest("/v1", build_v1_routes())
        .nest("/v2", build_v2_routes())
        .with_state(state)
}

/// Build v1 routes
fn build_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/models", get(list_models))
        .route("/models/{name}", get(model_ready))
}

/// Build v2 (open inference protocol) routes
fn build_v2_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(server_metadata))
        .route("/health/live", get(server_live))
        .route("/health/ready", get(server_ready))
        .route("/models/{name}", get(model_metadata))
        .route("/models/{name}/ready", get(model_ready))
        .route("/models/{name}/infer", post(infer))
        .route("/repository/models/{name}/unload", post(unload_model))
}
