//! Sink for errors that escape a task
//!
//! Listener tasks, per-call inference tasks and the orchestrator report
//! failures nobody else awaits (panics, serve-loop errors) to an
//! [`ErrorSink`]. The server installs [`LoggingErrorSink`] unless the caller
//! registers its own; custom sinks can defer to
//! [`default_error_handler`] to keep the default behaviour.

use std::fmt;
use tracing::error;

/// Description of an unhandled error
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Component that observed the error
    pub origin: &'static str,
    /// Human readable description
    pub message: String,
    /// Underlying error, when there is one
    pub error: Option<String>,
}

impl ErrorContext {
    pub fn new(origin: &'static str, message: impl Into<String>) -> Self {
        Self {
            origin,
            message: message.into(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Receiver of unhandled errors
pub trait ErrorSink: Send + Sync {
    fn handle_error(&self, context: &ErrorContext);
}

/// Log the error and the message; the task that raised it is already gone,
/// so the process keeps running.
pub fn default_error_handler(context: &ErrorContext) {
    if let Some(err) = &context.error {
        error!(origin = context.origin, "Caught exception: {}", err);
    }
    error!(origin = context.origin, "message: {}", context.message);
}

/// Default sink
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingErrorSink;

impl ErrorSink for LoggingErrorSink {
    fn handle_error(&self, context: &ErrorContext) {
        default_error_handler(context);
    }
}

impl<F> ErrorSink for F
where
    F: Fn(&ErrorContext) + Send + Sync,
{
    fn handle_error(&self, context: &ErrorContext) {
        self(context)
    }
}
