//! gRPC API implementation
//!
//! This module provides the open inference protocol over gRPC using Tonic.

pub mod converters;
pub mod service;

// Include the generated protobuf code
pub mod proto {
    tonic::include_proto!("inference");
}

pub use proto::grpc_inference_service_client::GrpcInferenceServiceClient;
pub use proto::grpc_inference_service_server::{GrpcInferenceService, GrpcInferenceServiceServer};
pub use service::InferenceServiceImpl;

use tonic::{service::interceptor::InterceptedService, Request, Status};
use tracing::debug;

/// Interceptor signature applied to every gRPC call
pub type LoggingInterceptor = fn(Request<()>) -> Result<Request<()>, Status>;

/// Inference service wrapped with the logging interceptor
pub type InterceptedInferenceService =
    InterceptedService<GrpcInferenceServiceServer<InferenceServiceImpl>, LoggingInterceptor>;

/// Log the peer, user agent and request ID of each incoming call
pub fn logging_interceptor(request: Request<()>) -> Result<Request<()>, Status> {
    let peer = request
        .remote_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let metadata = |key: &str| {
        request
            .metadata()
            .get(key)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string()
    };
    debug!(
        peer = %peer,
        user_agent = %metadata("user-agent"),
        request_id = %metadata("x-request-id"),
        "gRPC call received"
    );
    Ok(request)
}

/// Build the inference service with message size limits and call logging
pub fn build_inference_service(
    service: InferenceServiceImpl,
    max_send_message_length: usize,
    max_receive_message_length: usize,
) -> InterceptedInferenceService {
    let server = GrpcInferenceServiceServer::new(service)
        .max_encoding_message_size(max_send_message_length)
        .max_decoding_message_size(max_receive_message_length);
    InterceptedService::new(server, logging_interceptor as LoggingInterceptor)
}
