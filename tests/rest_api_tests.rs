//! REST API Integration Tests
//!
//! Tests for the HTTP data plane served next to gRPC by one model server:
//! health probes, model listing and readiness, inference and unload.

mod common;

use common::fixtures::{fp32_infer_body, fp32_infer_request, Panicking, MODEL_NAME};
use common::{local_config, TestServer};
use model_server_core::ModelHandle;
use reqwest::StatusCode;
use std::sync::Arc;

#[tokio::test]
async fn test_liveness_endpoints() {
    let app = TestServer::start(local_config()).await;
    let client = app.client();

    let response = client.get(app.url()).send().await.expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "alive");

    let response = client
        .get(format!("{}/v2/health/live", app.url()))
        .send()
        .await
        .expect("Failed to send request");
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["live"], true);

    let response = client
        .get(format!("{}/v2/health/ready", app.url()))
        .send()
        .await
        .expect("Failed to send request");
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["ready"], true);

    app.shutdown().await;
}

#[tokio::test]
async fn test_list_models_and_readiness() {
    let app = TestServer::start(local_config()).await;
    let client = app.client();

    let body: serde_json::Value = client
        .get(format!("{}/v1/models", app.url()))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");
    assert_eq!(body["models"], serde_json::json!([MODEL_NAME]));

    let body: serde_json::Value = client
        .get(format!("{}/v2/models/{}/ready", app.url(), MODEL_NAME))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");
    assert_eq!(body["name"], MODEL_NAME);
    assert_eq!(body["ready"], true);

    app.shutdown().await;
}

#[tokio::test]
async fn test_rest_inference() {
    let app = TestServer::start(local_config()).await;

    let response = app
        .client()
        .post(format!("{}/v2/models/{}/infer", app.url(), MODEL_NAME))
        .json(&fp32_infer_body(&[1.0, 2.5]))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["id"], "test-request");
    assert_eq!(body["outputs"][0]["data"], serde_json::json!([2.0, 3.5]));
    assert_eq!(app.calls(), 1);

    app.shutdown().await;
}

#[tokio::test]
async fn test_rest_and_grpc_share_the_registry() {
    let app = TestServer::start(local_config()).await;

    let response = app
        .client()
        .post(format!("{}/v2/repository/models/{}/unload", app.url(), MODEL_NAME))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::OK);

    let status = app
        .grpc_client()
        .await
        .model_infer(fp32_infer_request(MODEL_NAME, vec![1.0]))
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::NotFound);

    app.shutdown().await;
}

#[tokio::test]
async fn test_unknown_model_is_not_found() {
    let app = TestServer::start(local_config()).await;

    let response = app
        .client()
        .post(format!("{}/v2/models/missing/infer", app.url()))
        .json(&fp32_infer_body(&[1.0]))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["code"], "MODEL_NOT_FOUND");

    app.shutdown().await;
}

#[tokio::test]
async fn test_panicking_model_does_not_crash_listener() {
    let app = TestServer::start(local_config()).await;
    app.server
        .register_model(Arc::new(ModelHandle::new_ready("panicky", Panicking)))
        .unwrap();
    let client = app.client();

    let response = client
        .post(format!("{}/v2/models/panicky/infer", app.url()))
        .json(&fp32_infer_body(&[1.0]))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = client
        .post(format!("{}/v2/models/{}/infer", app.url(), MODEL_NAME))
        .json(&fp32_infer_body(&[1.0]))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::OK);

    app.shutdown().await;
}

#[tokio::test]
async fn test_insecure_grpc_inference() {
    let app = TestServer::start(local_config()).await;

    let response = app
        .grpc_client()
        .await
        .model_infer(fp32_infer_request(MODEL_NAME, vec![1.0]))
        .await
        .expect("Inference failed")
        .into_inner();

    let contents = response.outputs[0].contents.clone().expect("typed contents");
    assert_eq!(contents.fp32_contents, vec![2.0]);

    app.shutdown().await;
}
