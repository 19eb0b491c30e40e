//! Test fixtures
//!
//! This module provides test predictors, inference payloads and the PEM
//! certificates used by the integration tests.

use async_trait::async_trait;
use model_server_api::grpc::proto;
use model_server_core::{
    InferOutput, InferRequest, InferResponse, Predictor, Result, ServerError, TensorData,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Name the test model is registered under
pub const MODEL_NAME: &str = "custom-model";

/// Predictor adding one to each FP32 element and counting its invocations
#[derive(Clone, Default)]
pub struct CountingAddOne {
    calls: Arc<AtomicUsize>,
}

impl CountingAddOne {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Predictor for CountingAddOne {
    async fn predict(&self, request: InferRequest) -> Result<InferResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let input = request
            .inputs
            .first()
            .ok_or_else(|| ServerError::InvalidInput("missing input".to_string()))?;
        let values = match &input.data {
            TensorData::Fp32(values) => values.iter().map(|v| v + 1.0).collect(),
            _ => return Err(ServerError::InvalidInput("expected FP32".to_string())),
        };

        Ok(InferResponse::new(
            request.model_name.clone(),
            request.id.clone(),
            vec![InferOutput::new(
                "output-0",
                input.shape.clone(),
                TensorData::Fp32(values),
            )],
        ))
    }
}

/// Predictor that panics on every call
pub struct Panicking;

#[async_trait]
impl Predictor for Panicking {
    async fn predict(&self, _request: InferRequest) -> Result<InferResponse> {
        panic!("predictor exploded")
    }
}

/// gRPC inference request with one FP32 input
pub fn fp32_infer_request(model: &str, values: Vec<f32>) -> proto::ModelInferRequest {
    proto::ModelInferRequest {
        model_name: model.to_string(),
        id: "test-request".to_string(),
        inputs: vec![proto::model_infer_request::InferInputTensor {
            name: "input-0".to_string(),
            datatype: "FP32".to_string(),
            shape: vec![values.len() as i64],
            contents: Some(proto::InferTensorContents {
                fp32_contents: values,
                ..Default::default()
            }),
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// REST inference body with one FP32 input
pub fn fp32_infer_body(values: &[f32]) -> serde_json::Value {
    serde_json::json!({
        "id": "test-request",
        "inputs": [{
            "name": "input-0",
            "shape": [values.len()],
            "datatype": "FP32",
            "data": values,
        }]
    })
}

/// Directory holding the test PKI
pub fn certs_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("certs")
}

pub fn cert_path(name: &str) -> PathBuf {
    certs_dir().join(name)
}

pub fn read_cert(name: &str) -> Vec<u8> {
    std::fs::read(cert_path(name)).expect("Failed to read certificate fixture")
}
