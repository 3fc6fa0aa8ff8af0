//! Task engine split into focused submodules.
//!
//! The `ChatForwarder` struct and its methods are organized by domain:
//! - [`control`] - Starting, cancelling and querying tasks
//! - [`forward_task`] - The per-task loop and its finalization
//! - [`recovery`] - Resuming tasks persisted before a restart
//! - [`lifecycle`] - Shutdown coordination
//! - [`webhooks`] - Webhook notifications
//! - [`status_reporter`] - Periodic progress reports
//! - [`registry`] - Per-user locks and destination claims

mod control;
mod forward_task;
mod lifecycle;
mod recovery;
mod registry;
mod status_reporter;
mod webhooks;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::platform::ClientProvider;
use crate::state_store::TaskStateStore;
use crate::types::Event;

use registry::TaskRegistry;

/// Forwarding engine (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct ChatForwarder {
    /// Database instance for persistence
    /// Public for integration tests to inspect snapshots and history
    pub db: Arc<Database>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration
    pub(crate) config: Arc<Config>,
    /// Live counters of running tasks
    pub(crate) state_store: Arc<TaskStateStore>,
    /// User locks and destination claims
    pub(crate) registry: Arc<TaskRegistry>,
    /// Source of per-user platform clients
    pub(crate) provider: Arc<dyn ClientProvider>,
    /// Parent of every task's cancellation token; fired on shutdown
    pub(crate) shutdown_token: CancellationToken,
    /// Cleared when shutdown begins
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl ChatForwarder {
    /// Create a new ChatForwarder instance
    ///
    /// This opens (or creates) the SQLite database, runs migrations, sets up
    /// the event broadcast channel and, when enabled, resumes every task that
    /// was still active when the previous process stopped.
    pub async fn new(config: Config, provider: Arc<dyn ClientProvider>) -> Result<Self> {
        let db = Database::new(&config.persistence.database_path).await?;

        let unclean = db.was_unclean_shutdown().await?;
        db.set_clean_start().await?;

        let (event_tx, _rx) = tokio::sync::broadcast::channel(config.engine.event_capacity.max(1));

        let forwarder = Self {
            db: Arc::new(db),
            event_tx,
            config: Arc::new(config),
            state_store: Arc::new(TaskStateStore::new()),
            registry: Arc::new(TaskRegistry::new()),
            provider,
            shutdown_token: CancellationToken::new(),
            accepting_new: Arc::new(AtomicBool::new(true)),
        };

        if forwarder.config.recovery.resume_on_startup {
            forwarder.resume_active_tasks(unclean).await?;
        } else if unclean {
            tracing::warn!("Previous shutdown was not clean; task recovery is disabled");
        }

        Ok(forwarder)
    }

    /// Subscribe to task events
    ///
    /// Each subscriber receives all events independently. A subscriber that
    /// falls behind by more than the channel capacity gets `RecvError::Lagged`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use std::sync::Arc;
    /// # use chat_forwarder::{ChatForwarder, Config, ClientProvider};
    /// # async fn example(provider: Arc<dyn ClientProvider>) -> Result<(), Box<dyn std::error::Error>> {
    /// let forwarder = ChatForwarder::new(Config::default(), provider).await?;
    ///
    /// let mut events = forwarder.subscribe();
    /// tokio::spawn(async move {
    ///     while let Ok(event) = events.recv().await {
    ///         tracing::info!(?event, "task event");
    ///     }
    /// });
    /// # Ok(())
    /// # }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Emit an event to all subscribers; dropped silently when nobody listens
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Spawn the REST API server in a background task
    pub fn spawn_api_server(&self) -> tokio::task::JoinHandle<Result<()>> {
        let forwarder = Arc::new(self.clone());
        let config = self.config.clone();

        tokio::spawn(async move { crate::api::start_api_server(forwarder, config).await })
    }
}
