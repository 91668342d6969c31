use actix_web::dev::ServerHandle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::janitor::Janitor;

/// Handles graceful shutdown of the gateway
///
/// This module orchestrates graceful shutdown by:
/// 1. Listening for shutdown signals (SIGTERM, SIGINT/CTRL+C)
/// 2. Stopping the HTTP server, which lets in-flight requests finish
/// 3. Signaling background tasks (the janitor) to stop
/// 4. Running a final janitor pass over the work directory
pub struct ShutdownCoordinator {
    server_handle: ServerHandle,
    server_task: JoinHandle<Result<(), std::io::Error>>,
    background_handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    janitor: Janitor,
}

impl ShutdownCoordinator {
    pub fn new(
        server_handle: ServerHandle,
        server_task: JoinHandle<Result<(), std::io::Error>>,
        background_handles: Vec<JoinHandle<()>>,
        shutdown_tx: watch::Sender<bool>,
        janitor: Janitor,
    ) -> Self {
        Self {
            server_handle,
            server_task,
            background_handles,
            shutdown_tx,
            janitor,
        }
    }

    /// Wait for shutdown signal and perform graceful shutdown
    ///
    /// This function will block until either:
    /// - CTRL+C is received
    /// - SIGTERM is received (Unix only)
    pub async fn wait_for_shutdown(self) -> Result<(), std::io::Error> {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install CTRL+C signal handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received CTRL+C signal, initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM signal, initiating graceful shutdown...");
            }
        }

        self.shutdown().await
    }

    async fn shutdown(self) -> Result<(), std::io::Error> {
        // 1. Stop HTTP server; in-flight jobs finish and release their workspaces
        info!("Stopping HTTP server (no longer accepting new requests)...");
        self.server_handle.stop(true).await;

        // 2. Signal background tasks to stop
        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal to background tasks: {:?}", e);
        }

        // 3. Wait for them
        let total = self.background_handles.len();
        for (i, handle) in self.background_handles.into_iter().enumerate() {
            match handle.await {
                Ok(_) => info!("Background task {} stopped ({}/{})", i + 1, i + 1, total),
                Err(e) => error!("Background task {} failed to stop: {:?}", i + 1, e),
            }
        }

        // 4. Wait for HTTP server task to complete
        match self.server_task.await {
            Ok(Ok(_)) => info!("HTTP server shut down successfully"),
            Ok(Err(e)) => error!("HTTP server encountered error during shutdown: {:?}", e),
            Err(e) => error!("HTTP server task panicked: {:?}", e),
        }

        // 5. Reclaim anything a dropped connection left behind
        let report = self.janitor.sweep().await;
        info!(
            "Final sweep: removed {}, skipped {} active",
            report.removed, report.skipped_active
        );

        info!("Graceful shutdown completed successfully");
        Ok(())
    }
}
