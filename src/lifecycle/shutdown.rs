//! Shutdown coordination.
//!
//! # States
//! ```text
//! Running ──(signal / trigger)──▶ Draining ──(listener stopped or deadline)──▶ Stopped
//! ```
//!
//! Entering `Draining` clears the readiness gate *before* the listener is
//! told to stop, so readiness probes fail ahead of refused connections. The
//! drain races the server task against a fixed deadline; losing the race is
//! reported, not escalated. Downstream resources are released by the caller
//! between [`Shutdown::drain`] and [`Shutdown::finish`].

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::health::ReadinessGate;
use crate::lifecycle::signals;

/// Coordinator phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Running,
    Draining,
    Stopped,
}

/// How the listener drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The listener stopped and every in-flight request finished in time.
    Drained,
    /// The deadline elapsed with requests still outstanding.
    TimedOut,
}

/// Coordinator for graceful shutdown.
pub struct Shutdown {
    /// Cancelled by signals or [`Shutdown::trigger`].
    requested: CancellationToken,
    /// Cancelled once readiness is cleared; stops the listener.
    listener: CancellationToken,
    readiness: Arc<ReadinessGate>,
    drain_timeout: Duration,
    phase: watch::Sender<ShutdownPhase>,
}

impl Shutdown {
    /// Create a new shutdown coordinator in the `Running` phase.
    pub fn new(readiness: Arc<ReadinessGate>, drain_timeout: Duration) -> Self {
        let (phase, _) = watch::channel(ShutdownPhase::Running);
        Self {
            requested: CancellationToken::new(),
            listener: CancellationToken::new(),
            readiness,
            drain_timeout,
            phase,
        }
    }

    /// Request shutdown, as if a termination signal had arrived.
    pub fn trigger(&self) {
        self.requested.cancel();
    }

    /// Resolves once shutdown has been requested through [`Shutdown::trigger`].
    pub async fn requested(&self) {
        self.requested.cancelled().await;
    }

    /// Token the HTTP listener stops on.
    pub fn listener_token(&self) -> CancellationToken {
        self.listener.clone()
    }

    /// Watch phase transitions.
    pub fn subscribe(&self) -> watch::Receiver<ShutdownPhase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> ShutdownPhase {
        *self.phase.borrow()
    }

    pub fn readiness(&self) -> &Arc<ReadinessGate> {
        &self.readiness
    }

    /// `Running → Draining`: clear readiness, then stop the listener.
    pub fn begin_drain(&self) {
        if self.phase() != ShutdownPhase::Running {
            return;
        }
        tracing::info!("Shutting down server...");
        self.readiness.set_ready(false);
        self.phase.send_replace(ShutdownPhase::Draining);
        self.requested.cancel();
        self.listener.cancel();
    }

    /// Wait for the server task to finish, bounded by the drain deadline.
    ///
    /// On timeout the server task is aborted; connections still being served
    /// are abandoned to process exit.
    pub async fn drain(&self, mut server: JoinHandle<io::Result<()>>) -> DrainOutcome {
        match tokio::time::timeout(self.drain_timeout, &mut server).await {
            Ok(Ok(Ok(()))) => {
                tracing::info!("Listener drained");
                DrainOutcome::Drained
            }
            Ok(Ok(Err(e))) => {
                tracing::error!(error = %e, "Server shutdown error");
                DrainOutcome::Drained
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Server task failed");
                DrainOutcome::Drained
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.drain_timeout.as_secs_f64(),
                    "Drain deadline elapsed with requests in flight, abandoning them"
                );
                server.abort();
                DrainOutcome::TimedOut
            }
        }
    }

    /// Block until a signal or trigger, then walk `Running → Draining` and drain.
    pub async fn wait_and_drain(&self, server: JoinHandle<io::Result<()>>) -> DrainOutcome {
        signals::wait_for_shutdown(self).await;
        self.begin_drain();
        self.drain(server).await
    }

    /// `Draining → Stopped`. Call after downstream resources are released.
    pub fn finish(&self) {
        self.phase.send_replace(ShutdownPhase::Stopped);
        tracing::info!("Server stopped");
    }
}

impl std::fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutdown")
            .field("phase", &self.phase())
            .field("drain_timeout", &self.drain_timeout)
            .finish()
    }
}
