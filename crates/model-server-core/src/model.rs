//! Model handles and the predictor extension point
//!
//! A [`Predictor`] holds caller-supplied prediction logic. A [`ModelHandle`]
//! owns one predictor together with the serving flags the server is allowed
//! to mutate: readiness and latency logging.

use crate::error::{Result, ServerError};
use crate::tensor::{DataType, InferRequest, InferResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Caller-supplied prediction logic
///
/// Blocking or CPU-heavy implementations should move their work onto the
/// runtime's blocking pool with `tokio::task::spawn_blocking`.
#[async_trait]
pub trait Predictor: Send + Sync {
    /// Load model artifacts; called by [`ModelHandle::load`]
    async fn load(&self) -> Result<()> {
        Ok(())
    }

    async fn preprocess(&self, request: InferRequest) -> Result<InferRequest> {
        Ok(request)
    }

    async fn predict(&self, request: InferRequest) -> Result<InferResponse>;

    async fn postprocess(&self, response: InferResponse) -> Result<InferResponse> {
        Ok(response)
    }

    /// Input/output signature reported through the metadata endpoints
    fn signature(&self) -> ModelSignature {
        ModelSignature::default()
    }
}

/// Declared tensor of a model signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorMetadata {
    pub name: String,
    pub datatype: DataType,
    pub shape: Vec<i64>,
}

/// Model inputs and outputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSignature {
    pub inputs: Vec<TensorMetadata>,
    pub outputs: Vec<TensorMetadata>,
}

/// Model metadata as reported by the data plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub name: String,
    pub versions: Vec<String>,
    pub platform: String,
    pub inputs: Vec<TensorMetadata>,
    pub outputs: Vec<TensorMetadata>,
}

impl ModelMetadata {
    pub fn new(name: impl Into<String>, signature: ModelSignature) -> Self {
        Self {
            name: name.into(),
            versions: Vec::new(),
            platform: String::new(),
            inputs: signature.inputs,
            outputs: signature.outputs,
        }
    }
}

/// In-process model handle
pub struct ModelHandle {
    name: String,
    predictor: Box<dyn Predictor>,
    ready: AtomicBool,
    latency_logging: AtomicBool,
}

impl ModelHandle {
    /// Create a handle that is not yet ready
    pub fn new(name: impl Into<String>, predictor: impl Predictor + 'static) -> Self {
        Self {
            name: name.into(),
            predictor: Box::new(predictor),
            ready: AtomicBool::new(false),
            latency_logging: AtomicBool::new(false),
        }
    }

    /// Create a handle whose predictor needs no loading step
    pub fn new_ready(name: impl Into<String>, predictor: impl Predictor + 'static) -> Self {
        let handle = Self::new(name, predictor);
        handle.set_ready(true);
        handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    pub fn latency_logging(&self) -> bool {
        self.latency_logging.load(Ordering::Relaxed)
    }

    pub fn set_latency_logging(&self, enabled: bool) {
        self.latency_logging.store(enabled, Ordering::Relaxed);
    }

    /// Load the predictor and mark the handle ready on success
    pub async fn load(&self) -> Result<bool> {
        self.predictor.load().await?;
        self.set_ready(true);
        debug!(model = %self.name, "Model loaded");
        Ok(true)
    }

    pub fn metadata(&self) -> ModelMetadata {
        ModelMetadata::new(self.name.clone(), self.predictor.signature())
    }

    /// Run preprocess, predict and postprocess
    pub async fn infer(&self, request: InferRequest) -> Result<InferResponse> {
        if !self.is_ready() {
            return Err(ServerError::ModelNotReady(self.name.clone()));
        }
        let request_id = request.id.clone().unwrap_or_default();

        let started = Instant::now();
        let request = self.predictor.preprocess(request).await?;
        let preprocessed = Instant::now();
        let response = self.predictor.predict(request).await?;
        let predicted = Instant::now();
        let response = self.predictor.postprocess(response).await?;

        if self.latency_logging() {
            info!(
                model = %self.name,
                request_id = %request_id,
                preprocess_ms = ms(preprocessed - started),
                predict_ms = ms(predicted - preprocessed),
                postprocess_ms = ms(predicted.elapsed()),
                "Inference latency"
            );
        }
        Ok(response)
    }
}

fn ms(d: std::time::Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("name", &self.name)
            .field("ready", &self.is_ready())
            .field("latency_logging", &self.latency_logging())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tensor::{InferInput, InferOutput, TensorData};

    /// Doubles every FP32 element
    pub(crate) struct Doubler;

    #[async_trait]
    impl Predictor for Doubler {
        async fn predict(&self, request: InferRequest) -> Result<InferResponse> {
            let input = &request.inputs[0];
            let TensorData::Fp32(values) = &input.data else {
                return Err(ServerError::InvalidInput("expected FP32".into()));
            };
            let doubled = values.iter().map(|v| v * 2.0).collect();
            Ok(InferResponse::new(
                request.model_name.clone(),
                request.id.clone(),
                vec![InferOutput::new("output-0", input.shape.clone(), TensorData::Fp32(doubled))],
            ))
        }
    }

    struct FailingLoad;

    #[async_trait]
    impl Predictor for FailingLoad {
        async fn load(&self) -> Result<()> {
            Err(ServerError::Internal("weights missing".into()))
        }

        async fn predict(&self, _request: InferRequest) -> Result<InferResponse> {
            unreachable!("never loaded")
        }
    }

    fn request() -> InferRequest {
        InferRequest::new(
            "doubler",
            vec![InferInput::new("input-0", vec![2], TensorData::Fp32(vec![1.0, 3.0]))],
        )
    }

    #[tokio::test]
    async fn test_new_handle_is_not_ready() {
        let handle = ModelHandle::new("doubler", Doubler);
        assert!(!handle.is_ready());
        let err = handle.infer(request()).await.unwrap_err();
        assert!(matches!(err, ServerError::ModelNotReady(name) if name == "doubler"));
    }

    #[tokio::test]
    async fn test_load_marks_ready() {
        let handle = ModelHandle::new("doubler", Doubler);
        assert!(handle.load().await.unwrap());
        assert!(handle.is_ready());

        let response = handle.infer(request()).await.unwrap();
        assert_eq!(response.outputs[0].data, TensorData::Fp32(vec![2.0, 6.0]));
    }

    #[tokio::test]
    async fn test_failed_load_leaves_handle_unready() {
        let handle = ModelHandle::new("broken", FailingLoad);
        assert!(handle.load().await.is_err());
        assert!(!handle.is_ready());
    }

    #[tokio::test]
    async fn test_latency_logging_flag_does_not_change_result() {
        let handle = ModelHandle::new_ready("doubler", Doubler);
        handle.set_latency_logging(true);
        assert!(handle.latency_logging());
        let response = handle.infer(request().with_id("r-1")).await.unwrap();
        assert_eq!(response.id, "r-1");
    }
}
