//! REST listener
//!
//! Serves the Axum data plane router with graceful shutdown.

use crate::lifecycle::{self, ListenerState, ServeTask};
use axum::Router;
use model_server_core::{ErrorSink, Result, ServerError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

const LISTENER: &str = "REST";

/// REST data plane listener
pub struct RestListener {
    addr: SocketAddr,
    router: Router,
    grace: Duration,
    task: ServeTask,
}

impl RestListener {
    pub fn new(addr: SocketAddr, router: Router, grace: Duration) -> Self {
        Self {
            addr,
            router,
            grace,
            task: ServeTask::new(LISTENER),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.task.local_addr()
    }

    pub fn state(&self) -> ListenerState {
        self.task.state()
    }

    pub fn task(&self) -> &ServeTask {
        &self.task
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        lifecycle::bind(LISTENER, self.addr).await
    }

    /// Serve on an already bound socket
    pub fn serve(&self, listener: TcpListener, error_sink: Arc<dyn ErrorSink>) -> Result<()> {
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            listener: LISTENER,
            addr: self.addr,
            source,
        })?;

        let app = self.router.clone();
        let shutdown = self.task.shutdown_token();
        let serve = async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        };

        info!("Starting REST server on http://{}", local_addr);
        self.task.spawn(local_addr, serve, error_sink)
    }

    /// Stop accepting and wait for in-flight requests up to the grace period
    pub async fn stop(&self) -> Result<()> {
        self.task.stop(self.grace).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use model_server_core::LoggingErrorSink;

    #[tokio::test]
    async fn test_serve_and_stop() {
        let router = Router::new().route("/", get(|| async { "ok" }));
        let rest = RestListener::new(
            "127.0.0.1:0".parse().unwrap(),
            router,
            Duration::from_secs(1),
        );

        let socket = rest.bind().await.unwrap();
        rest.serve(socket, Arc::new(LoggingErrorSink)).unwrap();
        assert_eq!(rest.state(), ListenerState::Running);

        let addr = rest.local_addr().unwrap();
        let stream = tokio::net::TcpStream::connect(addr).await;
        assert!(stream.is_ok());
        drop(stream);

        rest.stop().await.unwrap();
        assert_eq!(rest.state(), ListenerState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_unstarted() {
        let rest = RestListener::new(
            "127.0.0.1:0".parse().unwrap(),
            Router::new(),
            Duration::from_secs(1),
        );
        rest.stop().await.unwrap();
        assert_eq!(rest.state(), ListenerState::Stopped);
    }
}
