//! Remotely hosted models
//!
//! A [`Deployment`] describes a model served by an external deployment
//! (for example a Ray Serve application). Activating it yields a
//! [`DeploymentHandle`], a proxy that forwards inference calls to the remote
//! replicas.

use crate::error::Result;
use crate::model::ModelSignature;
use crate::tensor::{InferRequest, InferResponse};
use async_trait::async_trait;
use std::sync::Arc;

/// Proxy to an externally served model
#[async_trait]
pub trait DeploymentHandle: Send + Sync {
    async fn infer(&self, request: InferRequest) -> Result<InferResponse>;

    fn is_ready(&self) -> bool {
        true
    }

    fn signature(&self) -> ModelSignature {
        ModelSignature::default()
    }
}

/// Deployable remote model
#[async_trait]
pub trait Deployment: Send + Sync {
    /// Deploy (or attach to) the remote application and return its handle
    async fn deploy(&self) -> Result<Arc<dyn DeploymentHandle>>;
}
