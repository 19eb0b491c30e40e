//! Server orchestrator
//!
//! [`ModelServer`] owns the model registry and both protocol listeners. It
//! registers models, sizes the worker pools, starts REST and gRPC together,
//! stops them in order on a signal or an explicit [`ModelServer::stop`], and
//! finally unregisters every model.

use crate::config::ServerConfig;
use crate::credentials::SecureCredentials;
use crate::grpc_listener::GrpcListener;
use crate::lifecycle::ListenerState;
use crate::rest_listener::RestListener;
use crate::signals::{ShutdownSignal, ShutdownSignals};
use model_server_api::{build_rest_server, AppState, InferenceDispatcher};
use model_server_core::{
    Deployment, DeploymentHandle, ErrorContext, ErrorSink, LoggingErrorSink, ModelHandle,
    ModelRegistry, Result, ServerError,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound of the computed blocking pool size
const MAX_COMPUTED_ASYNCIO_WORKERS: usize = 32;

/// Models handed to [`ModelServer::start`]
pub enum Models {
    /// In-process model handles; only ready models are registered
    Local(Vec<Arc<ModelHandle>>),

    /// Remote deployments keyed by model name, activated before registration
    Remote(HashMap<String, Arc<dyn Deployment>>),
}

impl Models {
    /// No models; the registry is served as populated before start
    pub fn none() -> Self {
        Models::Local(Vec::new())
    }
}

impl From<Vec<Arc<ModelHandle>>> for Models {
    fn from(handles: Vec<Arc<ModelHandle>>) -> Self {
        Models::Local(handles)
    }
}

/// Blocking pool size used when none is configured: `min(32, parallelism + 4)`
pub fn compute_max_asyncio_workers(available_parallelism: usize) -> usize {
    MAX_COMPUTED_ASYNCIO_WORKERS.min(available_parallelism + 4)
}

/// CPUs available to this process
///
/// Honors CPU affinity and cgroup quotas where the platform exposes them.
pub fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Error sink that can be replaced after the listeners captured it
struct SharedErrorSink {
    inner: RwLock<Arc<dyn ErrorSink>>,
}

impl ErrorSink for SharedErrorSink {
    fn handle_error(&self, context: &ErrorContext) {
        let sink = Arc::clone(&*self.inner.read());
        sink.handle_error(context);
    }
}

/// Model server orchestrating the REST and gRPC data planes
pub struct ModelServer {
    config: ServerConfig,
    registry: Arc<ModelRegistry>,
    error_sink: Arc<SharedErrorSink>,
    rest: RestListener,
    grpc: Option<GrpcListener>,
    shutdown: CancellationToken,
    stopped: tokio::sync::Mutex<bool>,
}

impl ModelServer {
    /// Create a server with an empty registry
    pub fn new(config: ServerConfig) -> Result<Self> {
        Self::with_registry(config, Arc::new(ModelRegistry::new()))
    }

    /// Create a server on an existing registry
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Configuration`] when the configuration is
    /// invalid or secure gRPC credentials are missing or unparsable.
    pub fn with_registry(config: ServerConfig, registry: Arc<ModelRegistry>) -> Result<Self> {
        config.validate()?;

        let credentials = SecureCredentials::from_config(&config.tls)?;

        let error_sink = Arc::new(SharedErrorSink {
            inner: RwLock::new(Arc::new(LoggingErrorSink)),
        });
        let dispatcher = InferenceDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&error_sink) as Arc<dyn ErrorSink>,
        );

        let server_name = env!("CARGO_PKG_NAME");
        let server_version = env!("CARGO_PKG_VERSION");

        let mut state = AppState::new(dispatcher.clone());
        state.server_name = server_name.to_string();
        state.server_version = server_version.to_string();
        let rest = RestListener::new(
            config.http_addr()?,
            build_rest_server(state),
            Duration::from_secs(config.server.shutdown_timeout_seconds),
        );

        let grpc = if config.grpc.enabled {
            let mut grpc = GrpcListener::new(
                config.grpc_addr()?,
                &config.grpc,
                dispatcher,
                credentials.as_ref(),
            )?;
            grpc.set_server_info(server_name, server_version);
            Some(grpc)
        } else {
            None
        };

        Ok(Self {
            config,
            registry,
            error_sink,
            rest,
            grpc,
            shutdown: CancellationToken::new(),
            stopped: tokio::sync::Mutex::new(false),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Register a local model; routable immediately
    pub fn register_model(&self, handle: Arc<ModelHandle>) -> Result<()> {
        self.registry.register(handle)
    }

    /// Register a remote deployment handle under `name`
    pub fn register_model_handle(
        &self,
        name: impl Into<String>,
        handle: Arc<dyn DeploymentHandle>,
    ) -> Result<()> {
        self.registry.register_handle(name, handle)
    }

    /// Replace the sink receiving per-call failures and abnormal listener exits
    pub fn register_error_sink(&self, sink: Arc<dyn ErrorSink>) {
        *self.error_sink.inner.write() = sink;
    }

    /// Blocking pool size: configured value, or computed from the CPUs available
    pub fn max_asyncio_workers(&self) -> usize {
        self.config
            .server
            .max_asyncio_workers
            .unwrap_or_else(|| compute_max_asyncio_workers(available_parallelism()))
    }

    pub fn rest_state(&self) -> ListenerState {
        self.rest.state()
    }

    /// State of the gRPC listener, `None` when gRPC is disabled
    pub fn grpc_state(&self) -> Option<ListenerState> {
        self.grpc.as_ref().map(GrpcListener::state)
    }

    pub fn rest_local_addr(&self) -> Option<SocketAddr> {
        self.rest.local_addr()
    }

    pub fn grpc_local_addr(&self) -> Option<SocketAddr> {
        self.grpc.as_ref().and_then(GrpcListener::local_addr)
    }

    /// Wait until every enabled listener left `Unstarted`
    pub async fn wait_started(&self) {
        let started = |s: &ListenerState| *s != ListenerState::Unstarted;
        self.rest.task().lifecycle().wait_until(started).await;
        if let Some(grpc) = &self.grpc {
            grpc.task().lifecycle().wait_until(started).await;
        }
    }

    /// Run the server on a dedicated runtime until it is stopped
    ///
    /// The runtime uses `workers` async threads and a blocking pool bounded
    /// by [`ModelServer::max_asyncio_workers`].
    pub fn start(&self, models: Models) -> Result<()> {
        let max_blocking = self.max_asyncio_workers();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.server.workers)
            .max_blocking_threads(max_blocking)
            .thread_name("model-server")
            .enable_all()
            .build()
            .map_err(|e| ServerError::Internal(format!("failed to build runtime: {}", e)))?;

        info!(
            workers = self.config.server.workers,
            max_asyncio_workers = max_blocking,
            "Runtime ready"
        );
        runtime.block_on(self.serve(models))
    }

    /// Register `models`, start both listeners and serve until stopped
    ///
    /// Returns once both listeners are stopped and every model is
    /// unregistered. A bind failure of either listener stops the other and
    /// is returned.
    pub async fn serve(&self, models: Models) -> Result<()> {
        if self.rest.state() != ListenerState::Unstarted {
            return Err(ServerError::InvalidTransition {
                listener: "REST",
                from: self.rest.state().as_str(),
                to: ListenerState::Running.as_str(),
            });
        }

        self.register_models(models).await?;
        let mut signals = ShutdownSignals::install();
        debug!(signals = ?signals.installed(), "Shutdown handlers installed");

        let rest_bind = self.rest.bind();
        let grpc_bind = async {
            match &self.grpc {
                Some(grpc) => grpc.bind().await.map(Some),
                None => Ok(None),
            }
        };
        let (rest_socket, grpc_socket) = match tokio::try_join!(rest_bind, grpc_bind) {
            Ok(sockets) => sockets,
            Err(err) => {
                warn!(error = %err, "Listener failed to bind, stopping the server");
                self.stop(None).await;
                return Err(err);
            }
        };

        let error_sink = Arc::clone(&self.error_sink) as Arc<dyn ErrorSink>;
        let launched = self.rest.serve(rest_socket, error_sink).and_then(|()| {
            match (&self.grpc, grpc_socket) {
                (Some(grpc), Some(socket)) => grpc.serve(socket, self.config.grpc.max_threads),
                _ => Ok(()),
            }
        });
        if let Err(err) = launched {
            self.stop(None).await;
            return Err(err);
        }
        info!(models = ?self.registry.list_names(), "Model server started");

        let listeners = async {
            tokio::select! {
                _ = self.rest.task().wait_stopped() => {}
                _ = self.wait_grpc_stopped() => {}
            }
            self.stop(None).await;
        };
        let on_signal = async {
            tokio::select! {
                signal = signals.recv() => self.stop(Some(signal)).await,
                _ = self.shutdown.cancelled() => {}
            }
        };
        tokio::join!(listeners, on_signal);

        info!("Model server shutdown complete");
        Ok(())
    }

    /// Stop REST, then gRPC, then unregister every model
    ///
    /// Idempotent: repeated and concurrent calls wait for the first stop and
    /// return without doing anything.
    pub async fn stop(&self, signal: Option<ShutdownSignal>) {
        let mut stopped = self.stopped.lock().await;
        if *stopped {
            debug!("Model server already stopped");
            return;
        }

        match signal {
            Some(signal) => info!("Received {}, stopping the model server", signal),
            None => info!("Stopping the model server"),
        }

        if let Err(e) = self.rest.stop().await {
            warn!(error = %e, "REST listener did not drain cleanly");
        }
        if let Some(grpc) = &self.grpc {
            if let Err(e) = grpc.stop(None).await {
                warn!(error = %e, "gRPC listener did not drain cleanly");
            }
        }

        let unloaded = self.registry.unload_all();
        info!(models = unloaded.len(), "Unregistered all models");

        *stopped = true;
        self.shutdown.cancel();
    }

    async fn wait_grpc_stopped(&self) {
        match &self.grpc {
            Some(grpc) => grpc.task().wait_stopped().await,
            None => std::future::pending().await,
        }
    }

    async fn register_models(&self, models: Models) -> Result<()> {
        match models {
            Models::Local(handles) => {
                if handles.is_empty() {
                    return Ok(());
                }

                let mut not_ready = Vec::new();
                let mut registered = 0;
                for handle in handles {
                    if handle.is_ready() {
                        handle.set_latency_logging(self.config.server.enable_latency_logging);
                        self.registry.register(handle)?;
                        registered += 1;
                    } else {
                        warn!(model = handle.name(), "Model is not ready, skipping");
                        not_ready.push(handle.name().to_string());
                    }
                }

                if registered == 0 {
                    return Err(ServerError::NoModelReady(not_ready));
                }
            }
            Models::Remote(deployments) => {
                for (name, deployment) in deployments {
                    let handle = deployment.deploy().await?;
                    self.registry.register_handle(name.as_str(), handle)?;
                    info!(model = %name, "Registered remote deployment");
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ModelServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelServer")
            .field("rest", &self.rest.state())
            .field("grpc", &self.grpc_state())
            .field("models", &self.registry.list_names())
            .finish()
    }
}
