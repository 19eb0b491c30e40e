//! Model Server API Layer
//!
//! This crate provides the two data planes of the model server: a REST API
//! built with Axum and the open inference protocol over gRPC built with Tonic.
//! Both planes share one [`InferenceDispatcher`] over the model registry.
//!
//! # Architecture
//!
//! The API layer is organized into:
//!
//! - **Dispatch**: Per-call inference with worker limits and panic isolation
//! - **Handlers**: REST request handlers
//! - **Routes**: Route definitions and router configuration
//! - **gRPC**: Generated protobuf types, converters and the service impl
//! - **Middleware**: Request tracing and request IDs
//! - **Error Handling**: Conversion of server errors to HTTP responses and gRPC statuses
//!
//! # Example
//!
//! ```rust,no_run
//! use model_server_api::{build_rest_server, AppState, InferenceDispatcher};
//! use model_server_core::{LoggingErrorSink, ModelRegistry};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(ModelRegistry::new());
//! let dispatcher = InferenceDispatcher::new(registry, Arc::new(LoggingErrorSink));
//! let app = build_rest_server(AppState::new(dispatcher));
//! ```

pub mod dispatch;
pub mod error;
pub mod grpc;
pub mod handlers;
pub mod middleware;
pub mod responses;
pub mod routes;

// Re-export main types for convenience
pub use dispatch::InferenceDispatcher;
pub use error::{to_status, ApiError, ApiResult, ErrorResponse};
pub use grpc::{
    build_inference_service, logging_interceptor, GrpcInferenceServiceClient,
    GrpcInferenceServiceServer, InferenceServiceImpl, InterceptedInferenceService,
};
pub use handlers::AppState;
pub use middleware::UuidRequestIdGenerator;
pub use responses::{
    LivenessResponse, ModelListResponse, ModelReadyResponse, ServerLiveResponse,
    ServerMetadataResponse, ServerReadyResponse, UnloadResponse,
};
pub use routes::build_router;

use axum::Router;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};

/// Build the REST router with tracing and request ID middleware
pub fn build_rest_server(state: AppState) -> Router {
    build_router(state)
        .layer(middleware::trace_layer())
        // the last layer runs first: the id must be set before it is propagated
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(
            UuidRequestIdGenerator::default(),
        ))
}
