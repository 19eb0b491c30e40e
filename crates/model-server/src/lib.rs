//! Model Server
//!
//! Serves registered models over REST and gRPC from a single process.
//! [`ModelServer`] owns the model registry and both listeners, starts them
//! together and stops them in order on a signal or an explicit stop.
//!
//! # Example
//!
//! ```rust,no_run
//! use model_server::{config::ServerConfig, Models, ModelServer};
//!
//! # fn example(models: Models) -> model_server_core::Result<()> {
//! let server = ModelServer::new(ServerConfig::default())?;
//! server.start(models)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod credentials;
pub mod grpc_listener;
pub mod lifecycle;
pub mod rest_listener;
pub mod server;
pub mod signals;
pub mod telemetry;

pub use config::{CredentialSource, ServerConfig};
pub use credentials::SecureCredentials;
pub use grpc_listener::GrpcListener;
pub use lifecycle::{Lifecycle, ListenerState};
pub use rest_listener::RestListener;
pub use server::{compute_max_asyncio_workers, ModelServer, Models};
pub use signals::{ShutdownSignal, ShutdownSignals};
