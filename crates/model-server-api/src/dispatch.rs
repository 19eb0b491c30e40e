//! Per-call inference dispatch shared by both data planes
//!
//! Every call looks the model up in the registry, validates the request and
//! runs the model on its own task. A panicking predictor therefore only fails
//! its own call: the join error is reported to the error sink and converted
//! into an `Inference` error for the protocol layer.

use model_server_core::{
    ErrorContext, ErrorSink, InferRequest, InferResponse, ModelRegistry, Result, ServerError,
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// Routes inference calls to registered models
#[derive(Clone)]
pub struct InferenceDispatcher {
    registry: Arc<ModelRegistry>,
    error_sink: Arc<dyn ErrorSink>,
    workers: Option<Arc<Semaphore>>,
}

impl InferenceDispatcher {
    pub fn new(registry: Arc<ModelRegistry>, error_sink: Arc<dyn ErrorSink>) -> Self {
        Self {
            registry,
            error_sink,
            workers: None,
        }
    }

    /// Bound the number of inference calls running at once
    pub fn with_worker_limit(mut self, workers: usize) -> Self {
        self.workers = Some(Arc::new(Semaphore::new(workers.max(1))));
        self
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn error_sink(&self) -> &Arc<dyn ErrorSink> {
        &self.error_sink
    }

    /// Number of free worker slots, `None` when unbounded
    pub fn available_workers(&self) -> Option<usize> {
        self.workers.as_ref().map(|s| s.available_permits())
    }

    pub async fn infer(&self, request: InferRequest) -> Result<InferResponse> {
        let model = self
            .registry
            .get(&request.model_name)
            .ok_or_else(|| ServerError::ModelNotFound(request.model_name.clone()))?;
        if !model.is_ready() {
            return Err(ServerError::ModelNotReady(request.model_name.clone()));
        }
        request.validate()?;

        let permit = match &self.workers {
            Some(workers) => Some(
                Arc::clone(workers)
                    .acquire_owned()
                    .await
                    .map_err(|e| ServerError::Internal(e.to_string()))?,
            ),
            None => None,
        };

        let model_name = request.model_name.clone();
        debug!(model = %model_name, "Dispatching inference");
        let task = tokio::spawn(async move {
            let _permit = permit;
            model.infer(request).await
        });

        match task.await {
            Ok(result) => result,
            Err(join_err) => {
                let context = ErrorContext::new(
                    "inference",
                    format!("inference task for model {} did not complete", model_name),
                )
                .with_error(&join_err);
                self.error_sink.handle_error(&context);
                Err(ServerError::Inference(format!(
                    "model {} failed to produce a response",
                    model_name
                )))
            }
        }
    }
}
