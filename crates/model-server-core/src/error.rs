//! Error types for the model server

use std::net::SocketAddr;
use thiserror::Error;

/// Result type alias for model server operations
pub type Result<T> = std::result::Result<T, ServerError>;

/// Main error type for model server operations
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid or incomplete startup configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A credential source could not be read or parsed
    #[error("Credential error ({source_name}): {reason}")]
    Credential { source_name: String, reason: String },

    /// A non-empty model list was supplied but no model was ready
    #[error("No model is ready: {}", .0.join(", "))]
    NoModelReady(Vec<String>),

    /// A model handle without a usable name was registered
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// A listener could not acquire its port
    #[error("{listener} listener failed to bind {addr}: {source}")]
    Bind {
        listener: &'static str,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A listener did not drain within its grace period
    #[error("{listener} listener did not drain within {grace_secs}s")]
    DrainTimeout { listener: &'static str, grace_secs: u64 },

    /// Listener lifecycle violation (e.g. restarting a stopped listener)
    #[error("{listener} listener cannot transition from {from} to {to}")]
    InvalidTransition {
        listener: &'static str,
        from: &'static str,
        to: &'static str,
    },

    /// Model not found in the registry
    #[error("Model with name {0} does not exist.")]
    ModelNotFound(String),

    /// Model registered but not ready to serve
    #[error("Model with name {0} is not ready.")]
    ModelNotReady(String),

    /// Malformed inference input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Failure inside prediction logic
    #[error("Inference error: {0}")]
    Inference(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Build a credential error for the named source
    pub fn credential(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        ServerError::Credential {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is attributable to the caller's request
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::ModelNotFound(_)
                | ServerError::ModelNotReady(_)
                | ServerError::InvalidInput(_)
                | ServerError::InvalidModel(_)
        )
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::InvalidInput(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_model_ready_lists_names() {
        let err = ServerError::NoModelReady(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "No model is ready: a, b");
    }

    #[test]
    fn test_credential_error_names_source() {
        let err = ServerError::credential("ssl_ca_cert", "file not found");
        assert!(err.to_string().contains("ssl_ca_cert"));
    }

    #[test]
    fn test_client_error_classification() {
        assert!(ServerError::ModelNotFound("m".into()).is_client_error());
        assert!(!ServerError::Inference("boom".into()).is_client_error());
    }
}
