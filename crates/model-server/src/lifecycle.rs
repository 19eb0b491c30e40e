//! Listener lifecycle
//!
//! Every listener moves through `Unstarted -> Running -> Stopping -> Stopped`
//! and never returns to `Running`. The state lives in a `watch` channel so the
//! orchestrator and tests can wait for a transition instead of polling.

use model_server_core::{ErrorContext, ErrorSink, Result, ServerError};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// State of a protocol listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Unstarted,
    Running,
    Stopping,
    Stopped,
}

impl ListenerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unstarted => "unstarted",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }

    fn can_transition_to(self, next: ListenerState) -> bool {
        use ListenerState::*;
        matches!(
            (self, next),
            (Unstarted, Running)
                | (Unstarted, Stopped)
                | (Running, Stopping)
                | (Running, Stopped)
                | (Stopping, Stopped)
        )
    }
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable state machine of one listener
#[derive(Clone)]
pub struct Lifecycle {
    listener: &'static str,
    state: Arc<watch::Sender<ListenerState>>,
}

impl Lifecycle {
    pub fn new(listener: &'static str) -> Self {
        let (state, _) = watch::channel(ListenerState::Unstarted);
        Self {
            listener,
            state: Arc::new(state),
        }
    }

    pub fn listener(&self) -> &'static str {
        self.listener
    }

    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Move to `next`, rejecting transitions the state machine forbids
    pub fn transition(&self, next: ListenerState) -> Result<()> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                outcome = Err(ServerError::InvalidTransition {
                    listener: self.listener,
                    from: current.as_str(),
                    to: next.as_str(),
                });
                false
            }
        });
        outcome
    }

    /// Claim the stop of this listener
    ///
    /// Returns `true` when the caller moved a running listener to `Stopping`
    /// and must finish the stop. An unstarted listener goes straight to
    /// `Stopped`.
    pub fn begin_stop(&self) -> bool {
        let mut claimed = false;
        self.state.send_if_modified(|current| match *current {
            ListenerState::Running => {
                *current = ListenerState::Stopping;
                claimed = true;
                true
            }
            ListenerState::Unstarted => {
                *current = ListenerState::Stopped;
                true
            }
            ListenerState::Stopping | ListenerState::Stopped => false,
        });
        claimed
    }

    /// Mark the listener stopped from whatever state it is in
    pub fn mark_stopped(&self) {
        self.state.send_if_modified(|current| {
            if *current == ListenerState::Stopped {
                false
            } else {
                *current = ListenerState::Stopped;
                true
            }
        });
    }

    /// Wait until the state satisfies `predicate`
    pub async fn wait_until(&self, predicate: impl FnMut(&ListenerState) -> bool) {
        let mut rx = self.state.subscribe();
        // the sender lives in `self`, so the channel cannot close while waiting
        let _ = rx.wait_for(predicate).await;
    }

    pub async fn wait_stopped(&self) {
        self.wait_until(|s| *s == ListenerState::Stopped).await
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("listener", &self.listener)
            .field("state", &self.state())
            .finish()
    }
}

/// Bind a TCP socket, reporting failures as [`ServerError::Bind`]
pub async fn bind(listener: &'static str, addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            listener,
            addr,
            source,
        })
}

/// Accept loop of a listener running on its own task
///
/// Owns the lifecycle, the cancellation token observed by the accept loop
/// and the join handle used to bound the drain.
pub struct ServeTask {
    lifecycle: Lifecycle,
    shutdown: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl ServeTask {
    pub fn new(listener: &'static str) -> Self {
        Self {
            lifecycle: Lifecycle::new(listener),
            shutdown: CancellationToken::new(),
            handle: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn state(&self) -> ListenerState {
        self.lifecycle.state()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Token cancelled when the listener must stop accepting
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run `serve` on a new task and mark the listener running
    ///
    /// An accept loop that ends with an error is reported to `error_sink`.
    /// Whenever the loop ends the listener becomes `Stopped`.
    pub fn spawn<F, E>(
        &self,
        local_addr: SocketAddr,
        serve: F,
        error_sink: Arc<dyn ErrorSink>,
    ) -> Result<()>
    where
        F: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        self.lifecycle.transition(ListenerState::Running)?;
        *self.local_addr.lock() = Some(local_addr);

        let lifecycle = self.lifecycle.clone();
        let listener = self.lifecycle.listener();
        let handle = tokio::spawn(async move {
            if let Err(e) = serve.await {
                error_sink.handle_error(
                    &ErrorContext::new(listener, format!("{} listener terminated", listener))
                        .with_error(e),
                );
            }
            lifecycle.mark_stopped();
        });
        *self.handle.lock() = Some(handle);

        info!(listener, addr = %local_addr, "Listener running");
        Ok(())
    }

    /// Stop accepting and drain for up to `grace`, then force termination
    ///
    /// Concurrent and repeated calls wait for the stop in progress. A forced
    /// termination is returned as [`ServerError::DrainTimeout`] after the
    /// listener is already `Stopped`.
    pub async fn stop(&self, grace: Duration) -> Result<()> {
        if !self.lifecycle.begin_stop() {
            self.lifecycle.wait_stopped().await;
            return Ok(());
        }

        let listener = self.lifecycle.listener();
        info!(listener, grace_secs = grace.as_secs(), "Stopping listener");
        self.shutdown.cancel();

        let handle = self.handle.lock().take();
        let mut outcome = Ok(());
        if let Some(mut handle) = handle {
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(listener, error = %e, "Listener task failed"),
                Err(_) => {
                    handle.abort();
                    let err = ServerError::DrainTimeout {
                        listener,
                        grace_secs: grace.as_secs(),
                    };
                    warn!("{}", err);
                    outcome = Err(err);
                }
            }
        }

        self.lifecycle.mark_stopped();
        info!(listener, "Listener stopped");
        outcome
    }

    pub async fn wait_stopped(&self) {
        self.lifecycle.wait_stopped().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_server_core::LoggingErrorSink;

    #[test]
    fn test_forward_transitions() {
        let lifecycle = Lifecycle::new("test");
        lifecycle.transition(ListenerState::Running).unwrap();
        lifecycle.transition(ListenerState::Stopping).unwrap();
        lifecycle.transition(ListenerState::Stopped).unwrap();
        assert_eq!(lifecycle.state(), ListenerState::Stopped);
    }

    #[test]
    fn test_stopped_cannot_restart() {
        let lifecycle = Lifecycle::new("test");
        lifecycle.transition(ListenerState::Stopped).unwrap();
        let err = lifecycle.transition(ListenerState::Running).unwrap_err();
        assert!(matches!(
            err,
            ServerError::InvalidTransition {
                from: "stopped",
                to: "running",
                ..
            }
        ));
    }

    #[test]
    fn test_begin_stop_on_unstarted() {
        let lifecycle = Lifecycle::new("test");
        assert!(!lifecycle.begin_stop());
        assert_eq!(lifecycle.state(), ListenerState::Stopped);
    }

    #[test]
    fn test_begin_stop_claims_once() {
        let lifecycle = Lifecycle::new("test");
        lifecycle.transition(ListenerState::Running).unwrap();
        assert!(lifecycle.begin_stop());
        assert!(!lifecycle.begin_stop());
        assert_eq!(lifecycle.state(), ListenerState::Stopping);
    }

    #[tokio::test]
    async fn test_stop_drains_task() {
        let task = ServeTask::new("test");
        let token = task.shutdown_token();
        task.spawn(
            "127.0.0.1:0".parse().unwrap(),
            async move {
                token.cancelled().await;
                Ok::<(), std::io::Error>(())
            },
            Arc::new(LoggingErrorSink),
        )
        .unwrap();
        assert_eq!(task.state(), ListenerState::Running);

        task.stop(Duration::from_secs(5)).await.unwrap();
        assert_eq!(task.state(), ListenerState::Stopped);

        // second stop is a no-op
        task.stop(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_forces_after_grace() {
        let task = ServeTask::new("stubborn");
        task.spawn(
            "127.0.0.1:0".parse().unwrap(),
            std::future::pending::<std::result::Result<(), std::io::Error>>(),
            Arc::new(LoggingErrorSink),
        )
        .unwrap();

        let err = task.stop(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(
            err,
            ServerError::DrainTimeout {
                listener: "stubborn",
                ..
            }
        ));
        assert_eq!(task.state(), ListenerState::Stopped);
    }

    #[tokio::test]
    async fn test_failed_accept_loop_reaches_stopped() {
        let task = ServeTask::new("failing");
        task.spawn(
            "127.0.0.1:0".parse().unwrap(),
            async { Err::<(), _>("accept failed") },
            Arc::new(LoggingErrorSink),
        )
        .unwrap();

        task.wait_stopped().await;
        assert_eq!(task.state(), ListenerState::Stopped);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_bind_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();
        let err = bind("gRPC", addr).await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { listener: "gRPC", .. }));
    }
}
