//! Core domain types for the model server
//!
//! This crate contains the data structures shared by the REST and gRPC data
//! planes and the server orchestrator: inference payloads, model handles,
//! remote deployment handles, the model registry and the error taxonomy.

pub mod error;
pub mod error_sink;
pub mod model;
pub mod registry;
pub mod remote;
pub mod tensor;

// Re-exports for convenience
pub use error::{Result, ServerError};
pub use error_sink::{default_error_handler, ErrorContext, ErrorSink, LoggingErrorSink};
pub use model::{ModelHandle, ModelMetadata, ModelSignature, Predictor, TensorMetadata};
pub use registry::{ModelRegistry, RegisteredModel, RemoteModel};
pub use remote::{Deployment, DeploymentHandle};
pub use tensor::{DataType, InferInput, InferOutput, InferRequest, InferResponse, TensorData};
