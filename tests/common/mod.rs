//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests: a
//! [`TestServer`] running a full `ModelServer` on ephemeral ports and gRPC
//! client helpers for insecure and mutually authenticated channels.

#![allow(dead_code)]

use model_server::{config::ServerConfig, CredentialSource, ModelServer, Models};
use model_server_api::GrpcInferenceServiceClient;
use model_server_core::{ModelHandle, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Identity};

pub mod fixtures;

use fixtures::{cert_path, read_cert, CountingAddOne, MODEL_NAME};

/// Configuration binding both listeners to ephemeral loopback ports
pub fn local_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.http_port = 0;
    config.server.shutdown_timeout_seconds = 5;
    config.grpc.host = "127.0.0.1".to_string();
    config.grpc.port = 0;
    config.grpc.grace_period_seconds = 5;
    config
}

/// Local configuration with mutual TLS on the gRPC listener
pub fn secure_config() -> ServerConfig {
    let mut config = local_config();
    config.tls.secure = true;
    config.tls.server_key = Some(CredentialSource::path(cert_path("server-key.pem")));
    config.tls.server_cert = Some(CredentialSource::path(cert_path("server-cert.pem")));
    config.tls.ca_cert = Some(CredentialSource::bytes(read_cert("ca-cert.pem")));
    config
}

/// Running model server serving one counting model
pub struct TestServer {
    pub server: Arc<ModelServer>,
    handle: JoinHandle<Result<()>>,
    calls: Arc<AtomicUsize>,
}

impl TestServer {
    /// Start a server serving [`MODEL_NAME`]
    pub async fn start(config: ServerConfig) -> Self {
        let server = Arc::new(ModelServer::new(config).expect("Failed to create server"));
        let predictor = CountingAddOne::new();
        let calls = predictor.counter();
        let model = Arc::new(ModelHandle::new_ready(MODEL_NAME, predictor));

        let running = Arc::clone(&server);
        let handle = tokio::spawn(async move { running.serve(Models::Local(vec![model])).await });

        tokio::time::timeout(Duration::from_secs(10), server.wait_started())
            .await
            .expect("Server did not start");

        Self {
            server,
            handle,
            calls,
        }
    }

    /// Number of times the model was invoked
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn rest_addr(&self) -> SocketAddr {
        self.server.rest_local_addr().expect("REST listener not bound")
    }

    pub fn grpc_addr(&self) -> SocketAddr {
        self.server.grpc_local_addr().expect("gRPC listener not bound")
    }

    /// Base URL of the REST listener
    pub fn url(&self) -> String {
        format!("http://{}", self.rest_addr())
    }

    /// Create HTTP client
    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to build client")
    }

    /// Plaintext gRPC client
    pub async fn grpc_client(&self) -> GrpcInferenceServiceClient<Channel> {
        GrpcInferenceServiceClient::connect(format!("http://{}", self.grpc_addr()))
            .await
            .expect("Failed to connect gRPC client")
    }

    /// gRPC client over TLS trusting the test CA
    ///
    /// `identity` names the certificate and key fixtures presented to the
    /// server; `None` connects without a client certificate.
    pub async fn secure_grpc_client(
        &self,
        identity: Option<(&str, &str)>,
    ) -> std::result::Result<GrpcInferenceServiceClient<Channel>, tonic::transport::Error> {
        let mut tls = ClientTlsConfig::new()
            .ca_certificate(Certificate::from_pem(read_cert("ca-cert.pem")))
            .domain_name("localhost");
        if let Some((cert, key)) = identity {
            tls = tls.identity(Identity::from_pem(read_cert(cert), read_cert(key)));
        }

        let channel = Channel::from_shared(format!("https://{}", self.grpc_addr()))
            .expect("Invalid endpoint")
            .tls_config(tls)?
            .connect_timeout(Duration::from_secs(5))
            .connect()
            .await?;
        Ok(GrpcInferenceServiceClient::new(channel))
    }

    /// Stop the server and wait for `serve` to return
    pub async fn shutdown(self) -> Arc<ModelServer> {
        self.server.stop(None).await;
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("Server did not stop")
            .expect("Server task panicked")
            .expect("Server returned an error");
        self.server
    }
}
