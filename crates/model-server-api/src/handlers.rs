//! API request handlers
//!
//! This module implements the HTTP request handlers of the REST data plane.
//! Handlers only use the registry's public interface; inference goes through
//! the shared [`InferenceDispatcher`].

use axum::{
    extract::{Path, State},
    Json,
};
use model_server_core::{InferRequest, InferResponse, ModelMetadata, ModelRegistry};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::{
    dispatch::InferenceDispatcher,
    error::{ApiError, ApiResult},
    responses::{
        LivenessResponse, ModelListResponse, ModelReadyResponse, ServerLiveResponse,
        ServerMetadataResponse, ServerReadyResponse, UnloadResponse,
    },
};

/// Protocol extensions advertised in server metadata
pub const EXTENSIONS: &[&str] = &["model_repository_extension"];

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Inference dispatcher over the shared registry
    pub dispatcher: InferenceDispatcher,

    /// Server name reported in metadata
    pub server_name: String,

    /// Server version reported in metadata
    pub server_version: String,
}

impl AppState {
    /// Create new application state
    pub fn new(dispatcher: InferenceDispatcher) -> Self {
        Self {
            dispatcher,
            server_name: env!("CARGO_PKG_NAME").to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn registry(&self) -> &Arc<ModelRegistry> {
        self.dispatcher.registry()
    }
}

// ============================================================================
// Health and Metadata Handlers
// ============================================================================

/// Liveness probe
pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse::alive())
}

/// Open inference protocol liveness
pub async fn server_live() -> Json<ServerLiveResponse> {
    Json(ServerLiveResponse { live: true })
}

/// Server readiness: every registered model is ready
pub async fn server_ready(State(state): State<AppState>) -> Json<ServerReadyResponse> {
    Json(ServerReadyResponse {
        ready: state.registry().is_ready(),
    })
}

/// Server metadata
pub async fn server_metadata(State(state): State<AppState>) -> Json<ServerMetadataResponse> {
    Json(ServerMetadataResponse {
        name: state.server_name.clone(),
        version: state.server_version.clone(),
        extensions: EXTENSIONS.iter().map(|e| e.to_string()).collect(),
    })
}

// ============================================================================
// Model Handlers
// ============================================================================

/// List registered model names
pub async fn list_models(State(state): State<AppState>) -> Json<ModelListResponse> {
    Json(ModelListResponse {
        models: state.registry().list_names().into_iter().collect(),
    })
}

/// Model readiness
#[instrument(skip(state))]
pub async fn model_ready(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<ModelReadyResponse>> {
    let ready = state.registry().is_model_ready(&name)?;
    Ok(Json(ModelReadyResponse { name, ready }))
}

/// Model metadata
#[instrument(skip(state))]
pub async fn model_metadata(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<ModelMetadata>> {
    let model = state
        .registry()
        .get(&name)
        .ok_or_else(|| ApiError::not_found(format!("Model with name {} does not exist.", name)))?;
    Ok(Json(model.metadata()))
}

/// Run inference
#[instrument(skip(state, request), fields(request_id))]
pub async fn infer(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(mut request): Json<InferRequest>,
) -> ApiResult<Json<InferResponse>> {
    if let Some(id) = &request.id {
        tracing::Span::current().record("request_id", id.as_str());
    }
    debug!("Inference request for model {}", name);

    request.model_name = name;
    let response = state.dispatcher.infer(request).await?;
    Ok(Json(response))
}

/// Unload a model from the registry
#[instrument(skip(state))]
pub async fn unload_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<UnloadResponse>> {
    state.registry().unload(&name)?;
    info!("Model {} unloaded", name);
    Ok(Json(UnloadResponse { name, unload: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_server_core::LoggingErrorSink;

    fn state() -> AppState {
        let registry = Arc::new(ModelRegistry::new());
        AppState::new(InferenceDispatcher::new(registry, Arc::new(LoggingErrorSink)))
    }

    #[tokio::test]
    async fn test_empty_server_is_ready() {
        let Json(body) = server_ready(State(state())).await;
        assert!(body.ready);
    }

    #[tokio::test]
    async fn test_model_ready_for_unknown_model() {
        let err = model_ready(State(state()), Path("missing".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_server_metadata_lists_extensions() {
        let Json(body) = server_metadata(State(state())).await;
        assert_eq!(body.extensions, vec!["model_repository_extension"]);
        assert!(!body.version.is_empty());
    }
}
