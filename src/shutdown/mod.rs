//! Graceful shutdown for the push service.
//!
//! Shutdown runs in phases:
//! 1. Raise the shutdown flag; SSE streams and STOMP sessions end on it
//! 2. Wait for open streams and sessions to close, up to the drain timeout
//! 3. Report long-poll events that were never picked up

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::signal;
use tokio::sync::watch;
use tokio::time::timeout;

use crate::config::ShutdownSettings;
use crate::delivery::PushDispatcher;

/// How often open streams and sessions are re-counted while draining
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shutdown flag shared by every stream and session. Once raised it stays
/// raised, so receivers created afterwards still observe it.
pub type ShutdownSender = watch::Sender<bool>;
pub type ShutdownReceiver = watch::Receiver<bool>;

/// A lowered shutdown flag
pub fn shutdown_channel() -> ShutdownSender {
    let (tx, _) = watch::channel(false);
    tx
}

/// Resolve once shutdown has been requested, immediately if it already was.
///
/// A dropped sender counts as shutdown.
pub async fn shutdown_requested(rx: &mut ShutdownReceiver) {
    let _ = rx.wait_for(|stopping| *stopping).await;
}

#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for streams and sessions to close (default: 5 seconds)
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&ShutdownSettings> for ShutdownConfig {
    fn from(settings: &ShutdownSettings) -> Self {
        Self {
            drain_timeout: Duration::from_secs(settings.drain_timeout_secs),
        }
    }
}

/// Handles graceful shutdown of the push service
pub struct GracefulShutdown {
    dispatcher: Arc<PushDispatcher>,
    shutdown_tx: ShutdownSender,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(
        dispatcher: Arc<PushDispatcher>,
        shutdown_tx: ShutdownSender,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            dispatcher,
            shutdown_tx,
            config,
        }
    }

    /// Execute the graceful shutdown sequence
    #[tracing::instrument(name = "graceful_shutdown", skip(self))]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = Instant::now();
        let before = self.dispatcher.stats();
        let mut result = ShutdownResult {
            streams_open: before.streams_active,
            sessions_open: before.sessions_active,
            ..Default::default()
        };

        // Phase 1: Signal streams and sessions
        tracing::info!(
            reason = %reason,
            streams = before.streams_active,
            sessions = before.sessions_active,
            "Starting graceful shutdown - Phase 1: Signaling streams and sessions"
        );
        self.shutdown_tx.send_replace(true);
        tracing::debug!(receivers = self.shutdown_tx.receiver_count(), "Shutdown flag raised");

        // Phase 2: Wait for them to close
        tracing::info!("Phase 2: Waiting for streams and sessions to close");
        result.drained = self.wait_for_drain().await;

        // Phase 3: Report undelivered long-poll events
        result.pending_events = self.dispatcher.queue().len();
        if result.pending_events > 0 {
            tracing::warn!(
                pending_events = result.pending_events,
                "Discarding long-poll events that were never delivered"
            );
        }

        result.duration = start.elapsed();

        tracing::info!(
            streams_open = result.streams_open,
            sessions_open = result.sessions_open,
            drained = result.drained,
            pending_events = result.pending_events,
            duration_ms = result.duration.as_millis() as u64,
            "Graceful shutdown completed"
        );

        result
    }

    async fn wait_for_drain(&self) -> bool {
        let dispatcher = self.dispatcher.clone();
        let drain = async move {
            loop {
                let stats = dispatcher.stats();
                if stats.streams_active == 0 && stats.sessions_active == 0 {
                    break;
                }
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
        };

        match timeout(self.config.drain_timeout, drain).await {
            Ok(()) => true,
            Err(_) => {
                let stats = self.dispatcher.stats();
                tracing::warn!(
                    remaining_streams = stats.streams_active,
                    remaining_sessions = stats.sessions_active,
                    "Some streams or sessions did not close in time"
                );
                false
            }
        }
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// SSE streams open when shutdown started
    pub streams_open: usize,
    /// STOMP sessions open when shutdown started
    pub sessions_open: usize,
    /// Whether every stream and session closed before the drain timeout
    pub drained: bool,
    /// Long-poll events still queued at the end
    pub pending_events: usize,
    pub duration: Duration,
}

/// Resolve on Ctrl+C or SIGTERM; returns the signal name
pub async fn wait_for_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
            "SIGINT"
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
            "SIGTERM"
        }
    }
}
