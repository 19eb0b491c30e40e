//! API response types
//!
//! JSON bodies returned by the REST data plane. Health and metadata bodies
//! follow the open inference protocol so existing clients can probe the
//! server unchanged.

use serde::{Deserialize, Serialize};

/// Body of `GET /`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub status: String,
}

impl LivenessResponse {
    pub fn alive() -> Self {
        Self {
            status: "alive".to_string(),
        }
    }
}

/// Body of `GET /v2/health/live`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerLiveResponse {
    pub live: bool,
}

/// Body of `GET /v2/health/ready`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerReadyResponse {
    pub ready: bool,
}

/// Body of `GET /v2`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerMetadataResponse {
    pub name: String,
    pub version: String,
    pub extensions: Vec<String>,
}

/// Body of `GET /v1/models`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelListResponse {
    pub models: Vec<String>,
}

/// Body of the model readiness routes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelReadyResponse {
    pub name: String,
    pub ready: bool,
}

/// Body of `POST /v2/repository/models/{name}/unload`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnloadResponse {
    pub name: String,
    pub unload: bool,
}
