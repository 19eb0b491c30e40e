//! Server configuration
//!
//! This module handles hierarchical configuration loading from multiple sources:
//! - Default configuration file
//! - Environment-specific configuration file
//! - Environment variables
//! - Command-line arguments (applied by the binary)
//!
//! The resulting [`ServerConfig`] is an immutable snapshot threaded through
//! [`crate::ModelServer::new`]; nothing reads global argument state.

use config::{Config, ConfigError, Environment, File};
use model_server_core::{Result, ServerError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Fixed ceiling for gRPC message sizes
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = i32::MAX as usize;

/// Server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// REST server settings
    #[serde(default)]
    pub server: HttpServerConfig,

    /// gRPC server settings
    #[serde(default)]
    pub grpc: GrpcServerConfig,

    /// Secure gRPC settings
    #[serde(default)]
    pub tls: TlsConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Number of async runtime worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Upper bound of the blocking thread pool; computed at start when unset
    #[serde(default)]
    pub max_asyncio_workers: Option<usize>,

    /// Log per-request latency for every registered model
    #[serde(default = "default_true")]
    pub enable_latency_logging: bool,

    /// Graceful shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            workers: default_workers(),
            max_asyncio_workers: None,
            enable_latency_logging: default_true(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
        }
    }
}

/// gRPC server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrpcServerConfig {
    /// Enable gRPC server
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    #[serde(default = "default_grpc_port")]
    pub port: u16,

    /// Size of the worker pool handling inference calls
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,

    #[serde(default = "default_max_message_length")]
    pub max_send_message_length: usize,

    #[serde(default = "default_max_message_length")]
    pub max_receive_message_length: usize,

    /// Drain grace period in seconds
    #[serde(default = "default_grace_period")]
    pub grace_period_seconds: u64,
}

fn default_grpc_port() -> u16 {
    8081
}

fn default_max_threads() -> usize {
    4
}

fn default_max_message_length() -> usize {
    DEFAULT_MAX_MESSAGE_LENGTH
}

fn default_grace_period() -> u64 {
    10
}

impl Default for GrpcServerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            host: default_host(),
            port: default_grpc_port(),
            max_threads: default_max_threads(),
            max_send_message_length: default_max_message_length(),
            max_receive_message_length: default_max_message_length(),
            grace_period_seconds: default_grace_period(),
        }
    }
}

/// Where a PEM credential comes from
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CredentialSource {
    /// File to read in full
    Path(PathBuf),

    /// Raw PEM bytes, passed through unchanged
    Bytes(Vec<u8>),
}

impl CredentialSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(bytes.into())
    }
}

// Key material must never end up in logs.
impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Bytes(bytes) => write!(f, "Bytes(<{} bytes>)", bytes.len()),
        }
    }
}

/// Secure gRPC configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Serve gRPC over mutual TLS
    #[serde(default)]
    pub secure: bool,

    /// Server private key
    #[serde(default)]
    pub server_key: Option<CredentialSource>,

    /// Server certificate chain
    #[serde(default)]
    pub server_cert: Option<CredentialSource>,

    /// CA bundle used to verify client certificates
    #[serde(default)]
    pub ca_cert: Option<CredentialSource>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON formatting
    #[serde(default)]
    pub json_format: bool,

    /// Include timestamps
    #[serde(default = "default_true")]
    pub include_timestamps: bool,

    /// Include thread IDs
    #[serde(default)]
    pub include_thread_ids: bool,

    /// Include target module
    #[serde(default = "default_true")]
    pub include_target: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            include_timestamps: true,
            include_thread_ids: false,
            include_target: true,
        }
    }
}

impl ServerConfig {
    /// Load configuration from files and environment
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default configuration file (config/default.toml)
    /// 2. Environment-specific file (config/{env}.toml)
    /// 3. Environment variables (MODEL_SERVER__*)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or parsed
    pub fn load(
        config_dir: impl Into<PathBuf>,
        environment: &str,
    ) -> std::result::Result<Self, ConfigError> {
        let config_dir = config_dir.into();

        let config = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(
                File::from(config_dir.join(format!("{}.toml", environment))).required(false),
            )
            // e.g., MODEL_SERVER__GRPC__PORT=9081
            .add_source(
                Environment::with_prefix("MODEL_SERVER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration with defaults if files don't exist
    pub fn load_or_default(config_dir: impl Into<PathBuf>, environment: &str) -> Self {
        Self::load(config_dir, environment).unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load configuration: {}", e);
            eprintln!("Using default configuration");
            Self::default()
        })
    }

    /// Check the invariants a server can only be constructed with
    pub fn validate(&self) -> Result<()> {
        if self.server.workers == 0 {
            return Err(ServerError::Configuration(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.server.max_asyncio_workers == Some(0) {
            return Err(ServerError::Configuration(
                "max_asyncio_workers must be at least 1".to_string(),
            ));
        }
        if self.grpc.max_threads == 0 {
            return Err(ServerError::Configuration(
                "max_threads must be at least 1".to_string(),
            ));
        }
        if self.grpc.max_send_message_length == 0 || self.grpc.max_receive_message_length == 0 {
            return Err(ServerError::Configuration(
                "gRPC message length limits must be positive".to_string(),
            ));
        }
        if self.grpc.enabled
            && self.server.http_port != 0
            && self.server.http_port == self.grpc.port
            && self.server.host == self.grpc.host
        {
            return Err(ServerError::Configuration(format!(
                "HTTP and gRPC listeners cannot share port {}",
                self.grpc.port
            )));
        }

        if self.tls.secure {
            for (name, source) in self.tls.credential_sources() {
                if source.is_none() {
                    return Err(ServerError::Configuration(format!(
                        "{} is required when secure gRPC is enabled",
                        name
                    )));
                }
            }
        }

        self.http_addr()?;
        self.grpc_addr()?;
        Ok(())
    }

    /// REST bind address
    pub fn http_addr(&self) -> Result<SocketAddr> {
        socket_addr(&self.server.host, self.server.http_port)
    }

    /// gRPC bind address
    pub fn grpc_addr(&self) -> Result<SocketAddr> {
        socket_addr(&self.grpc.host, self.grpc.port)
    }
}

impl TlsConfig {
    /// Credential sources in the fixed (key, certificate, CA) order
    pub fn credential_sources(&self) -> [(&'static str, Option<&CredentialSource>); 3] {
        [
            ("server_key", self.server_key.as_ref()),
            ("server_cert", self.server_cert.as_ref()),
            ("ca_cert", self.ca_cert.as_ref()),
        ]
    }
}

fn socket_addr(host: &str, port: u16) -> Result<SocketAddr> {
    let ip: IpAddr = host
        .parse()
        .map_err(|e| ServerError::Configuration(format!("Invalid host '{}': {}", host, e)))?;
    Ok(SocketAddr::new(ip, port))
}

/// Get the current environment name
///
/// Reads from the `ENVIRONMENT` or `ENV` environment variable,
/// defaulting to "development" if not set.
pub fn get_environment() -> String {
    std::env::var("ENVIRONMENT")
        .or_else(|_| std::env::var("ENV"))
        .unwrap_or_else(|_| "development".to_string())
}
