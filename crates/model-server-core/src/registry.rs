//! Model registry shared by the data planes
//!
//! The registry maps model names to handles. Structural changes take the
//! write lock; lookups clone the `Arc` under the read lock and release it
//! before any inference runs, so a long prediction never blocks
//! registration and a reader never sees a half-applied update.

use crate::error::{Result, ServerError};
use crate::model::{ModelHandle, ModelMetadata};
use crate::remote::DeploymentHandle;
use crate::tensor::{InferRequest, InferResponse};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Proxy entry for a remotely deployed model
#[derive(Clone)]
pub struct RemoteModel {
    pub name: String,
    pub handle: Arc<dyn DeploymentHandle>,
}

/// Registry entry
#[derive(Clone)]
pub enum RegisteredModel {
    Local(Arc<ModelHandle>),
    Remote(RemoteModel),
}

impl RegisteredModel {
    pub fn name(&self) -> &str {
        match self {
            RegisteredModel::Local(handle) => handle.name(),
            RegisteredModel::Remote(remote) => &remote.name,
        }
    }

    pub fn is_ready(&self) -> bool {
        match self {
            RegisteredModel::Local(handle) => handle.is_ready(),
            RegisteredModel::Remote(remote) => remote.handle.is_ready(),
        }
    }

    pub fn metadata(&self) -> ModelMetadata {
        match self {
            RegisteredModel::Local(handle) => handle.metadata(),
            RegisteredModel::Remote(remote) => {
                ModelMetadata::new(remote.name.clone(), remote.handle.signature())
            }
        }
    }

    pub async fn infer(&self, request: InferRequest) -> Result<InferResponse> {
        match self {
            RegisteredModel::Local(handle) => handle.infer(request).await,
            RegisteredModel::Remote(remote) => {
                if !remote.handle.is_ready() {
                    return Err(ServerError::ModelNotReady(remote.name.clone()));
                }
                remote.handle.infer(request).await
            }
        }
    }
}

impl fmt::Debug for RegisteredModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisteredModel::Local(handle) => f.debug_tuple("Local").field(handle).finish(),
            RegisteredModel::Remote(remote) => f.debug_tuple("Remote").field(&remote.name).finish(),
        }
    }
}

/// Thread-safe name → model mapping
#[derive(Default)]
pub struct ModelRegistry {
    models: RwLock<HashMap<String, RegisteredModel>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a local model, replacing any entry with the same name
    pub fn register(&self, handle: Arc<ModelHandle>) -> Result<()> {
        let name = validate_name(handle.name())?.to_string();
        self.insert(name, RegisteredModel::Local(handle));
        Ok(())
    }

    /// Register a remote deployment handle under `name`
    pub fn register_handle(
        &self,
        name: impl Into<String>,
        handle: Arc<dyn DeploymentHandle>,
    ) -> Result<()> {
        let name = name.into();
        validate_name(&name)?;
        let entry = RegisteredModel::Remote(RemoteModel {
            name: name.clone(),
            handle,
        });
        self.insert(name, entry);
        Ok(())
    }

    fn insert(&self, name: String, entry: RegisteredModel) {
        let replaced = self.models.write().insert(name.clone(), entry).is_some();
        if replaced {
            info!(model = %name, "Replaced registered model");
        } else {
            debug!(model = %name, "Registered model");
        }
    }

    /// Remove a model, returning the entry if it was registered
    pub fn unregister(&self, name: &str) -> Option<RegisteredModel> {
        self.models.write().remove(name)
    }

    /// Remove a model, failing if it is unknown
    pub fn unload(&self, name: &str) -> Result<()> {
        match self.unregister(name) {
            Some(_) => {
                info!(model = %name, "Unloaded model");
                Ok(())
            }
            None => Err(ServerError::ModelNotFound(name.to_string())),
        }
    }

    /// Remove every model, returning the removed names
    pub fn unload_all(&self) -> Vec<String> {
        let drained: Vec<String> = self.models.write().drain().map(|(name, _)| name).collect();
        for name in &drained {
            info!(model = %name, "Unloaded model");
        }
        drained
    }

    pub fn get(&self, name: &str) -> Option<RegisteredModel> {
        self.models.read().get(name).cloned()
    }

    pub fn list_names(&self) -> BTreeSet<String> {
        self.models.read().keys().cloned().collect()
    }

    pub fn get_models(&self) -> Vec<RegisteredModel> {
        self.models.read().values().cloned().collect()
    }

    pub fn is_model_ready(&self, name: &str) -> Result<bool> {
        self.get(name)
            .map(|m| m.is_ready())
            .ok_or_else(|| ServerError::ModelNotFound(name.to_string()))
    }

    /// Server readiness: every registered model is ready
    pub fn is_ready(&self) -> bool {
        self.models.read().values().all(RegisteredModel::is_ready)
    }

    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.read().is_empty()
    }
}

fn validate_name(name: &str) -> Result<&str> {
    if name.trim().is_empty() {
        return Err(ServerError::InvalidModel(
            "Failed to register model, model name must be provided".to_string(),
        ));
    }
    Ok(name)
}
