//! Shutdown coordination.

use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::error::Result;
use crate::types::Event;

use super::ChatForwarder;

/// Poll period while waiting for tasks to wind down
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

impl ChatForwarder {
    /// Gracefully shut down the forwarder
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new tasks
    /// 2. Signals every running task to stop; they finalize as Interrupted and
    ///    keep their snapshot for the next start
    /// 3. Waits for the tasks to release their claims, up to `shutdown_timeout`
    /// 4. Marks a clean shutdown in the database
    ///
    /// A second call is harmless.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);
        self.shutdown_token.cancel();
        tracing::info!(
            running = self.registry.len(),
            "Signaled all running tasks to stop"
        );

        let timeout = self.config.engine.shutdown_timeout;
        match tokio::time::timeout(timeout, self.wait_for_running_tasks()).await {
            Ok(()) => tracing::info!("All running tasks stopped"),
            Err(_) => tracing::warn!(
                remaining = self.registry.len(),
                "Timeout waiting for tasks to stop, proceeding with shutdown"
            ),
        }

        if let Err(e) = self.db.set_clean_shutdown().await {
            tracing::error!(error = %e, "Failed to mark clean shutdown in database");
        } else {
            tracing::info!("Marked clean shutdown in database");
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Whether new tasks are still accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }

    async fn wait_for_running_tasks(&self) {
        while !self.registry.is_empty() {
            tracing::debug!(running = self.registry.len(), "Waiting for tasks to stop");
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }
}
