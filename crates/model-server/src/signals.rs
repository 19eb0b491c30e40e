//! OS signal handling
//!
//! Interrupt and terminate (plus quit on Unix) are turned into a
//! [`ShutdownSignal`] the orchestrator stops on. Handlers are registered by
//! [`ShutdownSignals::install`], before any listener accepts connections, so
//! a signal arriving during startup still leads to a graceful stop.

use std::fmt;
use tracing::error;

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

/// Signal that requested the shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
    Quit,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Quit => "SIGQUIT",
        })
    }
}

/// Registered shutdown signal handlers
///
/// A handler that cannot be installed is logged and never fires.
#[derive(Debug)]
pub struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: Option<Signal>,
    #[cfg(unix)]
    terminate: Option<Signal>,
    #[cfg(unix)]
    quit: Option<Signal>,
}

impl ShutdownSignals {
    /// Register the handlers now; must be called inside a Tokio runtime
    #[cfg(unix)]
    pub fn install() -> Self {
        Self {
            interrupt: install_unix(SignalKind::interrupt(), ShutdownSignal::Interrupt),
            terminate: install_unix(SignalKind::terminate(), ShutdownSignal::Terminate),
            quit: install_unix(SignalKind::quit(), ShutdownSignal::Quit),
        }
    }

    #[cfg(not(unix))]
    pub fn install() -> Self {
        Self {}
    }

    /// Kinds whose handler is registered
    pub fn installed(&self) -> Vec<ShutdownSignal> {
        #[cfg(unix)]
        {
            [
                (ShutdownSignal::Interrupt, self.interrupt.is_some()),
                (ShutdownSignal::Terminate, self.terminate.is_some()),
                (ShutdownSignal::Quit, self.quit.is_some()),
            ]
            .into_iter()
            .filter_map(|(kind, installed)| installed.then_some(kind))
            .collect()
        }
        #[cfg(not(unix))]
        {
            vec![ShutdownSignal::Interrupt]
        }
    }

    /// Wait for the first shutdown signal
    #[cfg(unix)]
    pub async fn recv(&mut self) -> ShutdownSignal {
        tokio::select! {
            _ = recv_or_pending(&mut self.interrupt) => ShutdownSignal::Interrupt,
            _ = recv_or_pending(&mut self.terminate) => ShutdownSignal::Terminate,
            _ = recv_or_pending(&mut self.quit) => ShutdownSignal::Quit,
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> ShutdownSignal {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        ShutdownSignal::Interrupt
    }
}

#[cfg(unix)]
fn install_unix(kind: SignalKind, name: ShutdownSignal) -> Option<Signal> {
    match signal(kind) {
        Ok(stream) => Some(stream),
        Err(e) => {
            error!("Failed to install {} handler: {}", name, e);
            None
        }
    }
}

#[cfg(unix)]
async fn recv_or_pending(stream: &mut Option<Signal>) {
    match stream {
        Some(stream) => {
            if stream.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_names() {
        assert_eq!(ShutdownSignal::Interrupt.to_string(), "SIGINT");
        assert_eq!(ShutdownSignal::Terminate.to_string(), "SIGTERM");
        assert_eq!(ShutdownSignal::Quit.to_string(), "SIGQUIT");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_handlers_registered_before_waiting() {
        let mut signals = ShutdownSignals::install();
        assert_eq!(
            signals.installed(),
            vec![
                ShutdownSignal::Interrupt,
                ShutdownSignal::Terminate,
                ShutdownSignal::Quit
            ]
        );

        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(20), signals.recv()).await;
        assert!(waited.is_err());
    }
}
