//! # chat-forwarder
//!
//! Engine for bulk forwarding of chat history from a source chat to a
//! destination chat, on behalf of many users at once.
//!
//! ## Overview
//!
//! - **One task per user** - each user runs at most one forwarding task, and a
//!   destination is claimed by at most one task at a time
//! - **Filtered** - content kinds, file extensions, keywords and size bounds
//!   decide what is forwarded
//! - **Deduplicated** - files already sent to a destination can be skipped,
//!   optionally across tasks through a durable store
//! - **Resumable** - progress is snapshotted to SQLite, and tasks interrupted
//!   by a shutdown or crash continue on the next start
//! - **Event-driven** - consumers subscribe to events, no polling required
//!
//! The messaging platform itself stays outside the crate: callers implement
//! [`PlatformClient`] and [`ClientProvider`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use chat_forwarder::{ChatForwarder, ChatRef, ClientProvider, Config, StartTaskRequest, TaskConfig, UserId};
//! use std::sync::Arc;
//!
//! # async fn example(provider: Arc<dyn ClientProvider>) -> Result<(), Box<dyn std::error::Error>> {
//! let forwarder = ChatForwarder::new(Config::default(), provider).await?;
//!
//! // Subscribe to events
//! let mut events = forwarder.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!     }
//! });
//!
//! let task_id = forwarder
//!     .start_task(StartTaskRequest {
//!         user_id: UserId(42),
//!         source: ChatRef::Username("news".into()),
//!         destination: ChatRef::Id(-1001234567890),
//!         skip: 0,
//!         limit: 1500,
//!         nonce: None,
//!         config: TaskConfig::default(),
//!     })
//!     .await?;
//! println!("started {task_id}");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Content deduplication per destination
pub mod dedup;
/// Delivering accepted messages to the destination
pub mod dispatch;
/// Walking a source chat's index range in batches
pub mod enumerator;
/// Error types
pub mod error;
/// Message filter pipeline
pub mod filter;
/// Task engine (decomposed into focused submodules)
pub mod forwarder;
/// Messaging platform abstraction
pub mod platform;
/// Throttle-aware retry
pub mod retry;
/// Per-task progress snapshots
pub mod state_store;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use forwarder::ChatForwarder;
pub use error::{
    ApiError, DatabaseError, Error, ErrorDetail, PlatformError, Result, TaskError, ToHttpStatus,
};
pub use platform::{AccessMode, AccountKind, ClientProvider, Media, MediaKind, Message, PlatformClient};
pub use types::{
    ChatRef, ContentKind, Event, ForwardMode, HistoryEntry, ProgressReport, ProgressSnapshot,
    StartTaskRequest, TaskConfig, TaskId, TaskStatus, UserId,
};

/// Run the forwarder until a termination signal arrives, then shut it down.
///
/// Running tasks are interrupted and resume on the next start.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use chat_forwarder::{ChatForwarder, ClientProvider, Config, run_with_shutdown};
/// use std::sync::Arc;
///
/// # async fn example(provider: Arc<dyn ClientProvider>) -> Result<(), Box<dyn std::error::Error>> {
/// let forwarder = ChatForwarder::new(Config::default(), provider).await?;
/// let _api = forwarder.spawn_api_server();
///
/// run_with_shutdown(forwarder).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_with_shutdown(forwarder: ChatForwarder) -> Result<()> {
    wait_for_signal().await;
    forwarder.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // registration can fail in restricted environments
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, stopping forwarder");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, stopping forwarder");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting for SIGINT");
            match signal(SignalKind::interrupt()) {
                Ok(mut sigint) => {
                    sigint.recv().await;
                    tracing::info!("Received SIGINT, stopping forwarder");
                }
                Err(_) => ctrl_c_fallback().await,
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "SIGINT handler unavailable, waiting for SIGTERM");
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, stopping forwarder");
                }
                Err(_) => ctrl_c_fallback().await,
            }
        }
    }
}

#[cfg(unix)]
async fn ctrl_c_fallback() {
    tracing::error!("No signal handlers could be registered, falling back to ctrl_c");
    tokio::signal::ctrl_c().await.ok();
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        return;
    }
    tracing::info!("Received Ctrl+C, stopping forwarder");
}
