//! Graceful Shutdown Handler
//!
//! Handles OS signals and stops the orchestrator's modules.

use super::{ApplicationOrchestrator, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

/// Handles graceful shutdown of the application
///
/// ShutdownHandler listens for OS signals (SIGTERM, SIGINT) and stops every
/// module, bounded by the configured timeout.
///
/// # Example
///
/// ```rust,ignore
/// let orchestrator = Arc::new(orchestrator);
/// let shutdown_handler = ShutdownHandler::new(Arc::clone(&orchestrator), Duration::from_secs(30));
///
/// tokio::spawn(async move {
///     let _ = shutdown_handler.wait_for_shutdown().await;
/// });
/// ```
pub struct ShutdownHandler {
    orchestrator: Arc<ApplicationOrchestrator>,
    timeout: Duration,
}

impl ShutdownHandler {
    /// Create a new ShutdownHandler
    pub fn new(orchestrator: Arc<ApplicationOrchestrator>, timeout: Duration) -> Self {
        Self {
            orchestrator,
            timeout,
        }
    }

    /// Wait for a shutdown signal and perform graceful shutdown
    pub async fn wait_for_shutdown(&self) -> Result<()> {
        shutdown_signal().await;
        self.shutdown().await
    }

    /// Stop every module now, giving up once the timeout elapses
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Starting graceful shutdown...");

        if let Err(e) = self.orchestrator.stop_with_timeout(self.timeout).await {
            tracing::error!("Error during shutdown: {}", e);
            return Err(e);
        }

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }
}

/// Create a future that completes when a shutdown signal is received
///
/// # Example
///
/// ```rust,ignore
/// use conductor::lifecycle::shutdown_signal;
///
/// tokio::select! {
///     _ = shutdown_signal() => {
///         tracing::info!("Shutdown signal received");
///     }
///     _ = server.serve() => {}
/// }
/// ```
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}
