//! Model Server
//!
//! Main entry point serving an example model over REST and gRPC.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use model_server::{
    config::{self, ServerConfig},
    telemetry::{self, TelemetryConfig},
    CredentialSource, ModelServer, Models,
};
use model_server_core::{
    DataType, InferOutput, InferRequest, InferResponse, ModelHandle, ModelSignature, Predictor,
    ServerError, TensorData, TensorMetadata,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration directory
    #[arg(short, long, env = "CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,

    /// Environment (development, production, etc.)
    #[arg(short, long, env = "ENVIRONMENT")]
    environment: Option<String>,

    /// REST port
    #[arg(long)]
    http_port: Option<u16>,

    /// gRPC port
    #[arg(long)]
    grpc_port: Option<u16>,

    /// Async runtime worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// gRPC inference worker pool size
    #[arg(long)]
    max_threads: Option<usize>,

    /// Blocking pool size
    #[arg(long)]
    max_asyncio_workers: Option<usize>,

    /// Serve the gRPC data plane
    #[arg(long)]
    enable_grpc: Option<bool>,

    /// Log per-request latency
    #[arg(long)]
    enable_latency_logging: Option<bool>,

    /// Serve gRPC over mutual TLS
    #[arg(long)]
    secure_grpc_server: Option<bool>,

    /// Server private key (PEM)
    #[arg(long)]
    ssl_server_key: Option<PathBuf>,

    /// Server certificate chain (PEM)
    #[arg(long)]
    ssl_server_cert: Option<PathBuf>,

    /// CA bundle for client certificates (PEM)
    #[arg(long)]
    ssl_ca_cert: Option<PathBuf>,

    #[arg(long)]
    grpc_max_send_message_length: Option<usize>,

    #[arg(long)]
    grpc_max_receive_message_length: Option<usize>,

    /// Name the example model is served under
    #[arg(long, default_value = "custom-model")]
    model_name: String,

    /// Log level
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,
}

impl Args {
    /// Override file and environment values with the flags that were given
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(port) = self.http_port {
            config.server.http_port = port;
        }
        if let Some(port) = self.grpc_port {
            config.grpc.port = port;
        }
        if let Some(workers) = self.workers {
            config.server.workers = workers;
        }
        if let Some(threads) = self.max_threads {
            config.grpc.max_threads = threads;
        }
        if let Some(workers) = self.max_asyncio_workers {
            config.server.max_asyncio_workers = Some(workers);
        }
        if let Some(enabled) = self.enable_grpc {
            config.grpc.enabled = enabled;
        }
        if let Some(enabled) = self.enable_latency_logging {
            config.server.enable_latency_logging = enabled;
        }
        if let Some(secure) = self.secure_grpc_server {
            config.tls.secure = secure;
        }
        if let Some(path) = &self.ssl_server_key {
            config.tls.server_key = Some(CredentialSource::path(path));
        }
        if let Some(path) = &self.ssl_server_cert {
            config.tls.server_cert = Some(CredentialSource::path(path));
        }
        if let Some(path) = &self.ssl_ca_cert {
            config.tls.ca_cert = Some(CredentialSource::path(path));
        }
        if let Some(len) = self.grpc_max_send_message_length {
            config.grpc.max_send_message_length = len;
        }
        if let Some(len) = self.grpc_max_receive_message_length {
            config.grpc.max_receive_message_length = len;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

/// Example model adding one to every element of its first input
struct AddOne;

#[async_trait]
impl Predictor for AddOne {
    async fn predict(&self, request: InferRequest) -> model_server_core::Result<InferResponse> {
        let input = request
            .inputs
            .first()
            .ok_or_else(|| ServerError::InvalidInput("expected one input".to_string()))?;

        let data = match &input.data {
            TensorData::Fp32(values) => TensorData::Fp32(values.iter().map(|v| v + 1.0).collect()),
            TensorData::Fp64(values) => TensorData::Fp64(values.iter().map(|v| v + 1.0).collect()),
            _ => {
                return Err(ServerError::InvalidInput(format!(
                    "unsupported datatype {}",
                    input.datatype
                )))
            }
        };
        let output = InferOutput::new("output-0", input.shape.clone(), data);
        Ok(InferResponse::new(
            request.model_name.clone(),
            request.id.clone(),
            vec![output],
        ))
    }

    fn signature(&self) -> ModelSignature {
        let tensor = |name: &str| TensorMetadata {
            name: name.to_string(),
            datatype: DataType::Fp32,
            shape: vec![-1],
        };
        ModelSignature {
            inputs: vec![tensor("input-0")],
            outputs: vec![tensor("output-0")],
        }
    }
}

fn main() -> Result<()> {
    // Load .env file if it exists
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let environment = args
        .environment
        .clone()
        .unwrap_or_else(config::get_environment);

    let mut config = ServerConfig::load_or_default(&args.config_dir, &environment);
    args.apply(&mut config);

    telemetry::init_with_config(TelemetryConfig::from(&config.logging))
        .context("Failed to initialize logging")?;

    info!("Starting model server");
    info!("Environment: {}", environment);
    info!(
        http_port = config.server.http_port,
        grpc_port = config.grpc.port,
        grpc = config.grpc.enabled,
        secure = config.tls.secure,
        "Listener configuration"
    );

    let server = ModelServer::new(config).context("Invalid server configuration")?;
    let model = Arc::new(ModelHandle::new_ready(args.model_name.as_str(), AddOne));

    server
        .start(Models::Local(vec![model]))
        .context("Model server failed")?;

    info!("Server shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_override_config() {
        let args = Args::parse_from([
            "model-server",
            "--http-port",
            "9000",
            "--enable-grpc",
            "false",
            "--secure-grpc-server",
            "true",
            "--ssl-ca-cert",
            "/certs/ca.pem",
        ]);
        let mut config = ServerConfig::default();
        args.apply(&mut config);

        assert_eq!(config.server.http_port, 9000);
        assert_eq!(config.grpc.port, 8081);
        assert!(!config.grpc.enabled);
        assert!(config.tls.secure);
        assert_eq!(config.tls.ca_cert, Some(CredentialSource::path("/certs/ca.pem")));
        assert_eq!(args.model_name, "custom-model");
    }

    #[tokio::test]
    async fn test_add_one() {
        let request = InferRequest::new(
            "custom-model",
            vec![model_server_core::InferInput::new(
                "input-0",
                vec![1],
                TensorData::Fp32(vec![1.0]),
            )],
        );
        let response = AddOne.predict(request).await.unwrap();
        assert_eq!(response.outputs[0].data, TensorData::Fp32(vec![2.0]));
    }
}
