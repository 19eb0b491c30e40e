//! API error handling
//!
//! This module converts server errors into HTTP responses and gRPC statuses
//! with appropriate codes and error messages.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use model_server_core::ServerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tonic::{Code, Status};

/// API error type that can be converted to HTTP responses
#[derive(Debug)]
pub struct ApiError {
    status_code: StatusCode,
    message: String,
    error_code: Option<String>,
}

impl ApiError {
    /// Create a new API error
    pub fn new(status_code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
            error_code: None,
        }
    }

    /// Create an API error with an error code
    pub fn with_code(
        status_code: StatusCode,
        message: impl Into<String>,
        error_code: impl Into<String>,
    ) -> Self {
        Self {
            status_code,
            message: message.into(),
            error_code: Some(error_code.into()),
        }
    }

    /// Create a bad request error (400)
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Create a not found error (404)
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Create an internal server error (500)
    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

/// Error response JSON structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status code
    pub status: u16,

    /// Error message
    pub error: String,

    /// Optional error code for programmatic handling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Timestamp of the error
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_response = ErrorResponse {
            status: self.status_code.as_u16(),
            error: self.message,
            code: self.error_code,
            timestamp: chrono::Utc::now(),
        };

        (self.status_code, Json(error_response)).into_response()
    }
}

/// Convert ServerError to ApiError
impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        let message = err.to_string();
        match err {
            ServerError::ModelNotFound(_) => {
                ApiError::with_code(StatusCode::NOT_FOUND, message, "MODEL_NOT_FOUND")
            }
            ServerError::ModelNotReady(_) => {
                ApiError::with_code(StatusCode::SERVICE_UNAVAILABLE, message, "MODEL_NOT_READY")
            }
            ServerError::InvalidInput(_) => {
                ApiError::with_code(StatusCode::BAD_REQUEST, message, "INVALID_INPUT")
            }
            ServerError::InvalidModel(_) => {
                ApiError::with_code(StatusCode::BAD_REQUEST, message, "INVALID_MODEL")
            }
            ServerError::Inference(_) => {
                ApiError::with_code(StatusCode::INTERNAL_SERVER_ERROR, message, "INFERENCE_ERROR")
            }
            _ => ApiError::with_code(StatusCode::INTERNAL_SERVER_ERROR, message, "INTERNAL_ERROR"),
        }
    }
}

/// Convert ServerError to a gRPC status
pub fn to_status(err: ServerError) -> Status {
    let code = match &err {
        ServerError::ModelNotFound(_) => Code::NotFound,
        ServerError::ModelNotReady(_) => Code::Unavailable,
        ServerError::InvalidInput(_) | ServerError::InvalidModel(_) => Code::InvalidArgument,
        _ => Code::Internal,
    };
    Status::new(code, err.to_string())
}

/// Convert common errors to ApiError
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::bad_request(format!("Invalid JSON: {}", err))
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
