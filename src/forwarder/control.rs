//! Task control -- start, cancel and query tasks.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::Utc;

use crate::config::WebhookEvent;
use crate::error::{Error, PlatformError, Result, TaskError};
use crate::filter::FilterPipeline;
use crate::platform::{AccessMode, PlatformClient};
use crate::state_store::TaskState;
use crate::types::{
    ChatRef, Event, HistoryEntry, ProgressReport, ProgressSnapshot, StartTaskRequest, TaskId,
    TaskStatus, UserId,
};

use super::ChatForwarder;
use super::forward_task::{ForwardTaskContext, open_dedup_cache, run_forward_task};

impl ChatForwarder {
    /// Start a forwarding task
    ///
    /// The user lock and the destination claim are reserved first, so the
    /// request is rejected with [`TaskError::UserBusy`] or
    /// [`TaskError::DestinationBusy`] without touching any other task. The
    /// same errors are returned while an interrupted task that could not be
    /// resumed yet still has its record for the user or destination. Then a
    /// client is acquired and access to both chats is verified; if that fails
    /// the reservation is released and [`Error::Setup`] is returned.
    ///
    /// On success the task is Running in the background and its id is returned.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use chat_forwarder::*;
    /// # async fn example(forwarder: ChatForwarder) -> Result<()> {
    /// let task_id = forwarder
    ///     .start_task(StartTaskRequest {
    ///         user_id: UserId(42),
    ///         source: ChatRef::Username("source_channel".into()),
    ///         destination: ChatRef::Id(-1001234567890),
    ///         skip: 0,
    ///         limit: 5000,
    ///         nonce: None,
    ///         config: TaskConfig::default(),
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn start_task(&self, request: StartTaskRequest) -> Result<TaskId> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let StartTaskRequest {
            user_id,
            source,
            destination,
            skip,
            limit,
            nonce,
            config,
        } = request;

        if skip > limit {
            return Err(TaskError::InvalidRange { skip, limit }.into());
        }
        let filters = FilterPipeline::from_config(&config)?;

        let task_id = TaskId::new(
            user_id,
            nonce.unwrap_or_else(|| Utc::now().timestamp_millis()),
        );
        let cancel_token = self.shutdown_token.child_token();
        let claim = self.registry.try_claim(
            user_id,
            task_id.clone(),
            destination.clone(),
            cancel_token,
        )?;

        // a record kept by recovery still owns its user and destination
        if let Some(row) = self
            .db
            .blocking_active_task(user_id, &destination)
            .await?
        {
            tracing::warn!(
                task_id = %task_id,
                blocking = %row.task_id,
                "Start rejected, an unresumed task still holds the user or destination"
            );
            let error = if row.user_id == user_id.get() {
                TaskError::UserBusy {
                    user_id: user_id.get(),
                }
            } else {
                TaskError::DestinationBusy {
                    destination: destination.to_string(),
                }
            };
            return Err(error.into());
        }

        let state = self.state_store.create(TaskState::new(
            task_id.clone(),
            user_id,
            source.clone(),
            destination.clone(),
            skip,
            limit,
        ));
        tracing::info!(
            task_id = %task_id,
            user_id = user_id.get(),
            source = %source,
            destination = %destination,
            skip,
            limit,
            "Starting forward task"
        );

        let client = match self.prepare_client(user_id, &source, &destination).await {
            Ok(client) => client,
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(task_id = %task_id, error = %message, "Forward task setup failed");
                let snapshot = state.snapshot();
                self.state_store.remove(&task_id);
                drop(claim);
                self.trigger_webhooks(WebhookEvent::OnFailed, &snapshot, Some(message.clone()));
                self.emit_event(Event::TaskFailed {
                    task_id,
                    user_id,
                    error: message.clone(),
                });
                return Err(Error::Setup(message));
            }
        };

        state.set_start(Utc::now());
        state.set_status(TaskStatus::Running);
        let snapshot = state.snapshot();

        if let Err(e) = self.db.insert_active_task(&snapshot, &config).await {
            tracing::error!(task_id = %task_id, error = %e, "Failed to persist active task");
            self.state_store.remove(&task_id);
            drop(claim);
            if let Err(stop_err) = client.stop().await {
                tracing::warn!(task_id = %task_id, error = %stop_err, "Failed to stop platform client");
            }
            return Err(e);
        }

        let dedup = open_dedup_cache(user_id, &destination, &config).await;

        self.emit_event(Event::TaskStarted {
            task_id: task_id.clone(),
            user_id,
            source: source.to_string(),
            destination: destination.to_string(),
            recovered: false,
        });
        self.trigger_webhooks(WebhookEvent::OnStarted, &snapshot, None);

        tokio::spawn(run_forward_task(ForwardTaskContext {
            forwarder: self.clone(),
            state,
            config,
            filters,
            client,
            dedup,
            claim,
        }));

        Ok(task_id)
    }

    /// Acquire the user's client and verify it can read the source and post to the destination
    async fn prepare_client(
        &self,
        user_id: UserId,
        source: &ChatRef,
        destination: &ChatRef,
    ) -> std::result::Result<Arc<dyn PlatformClient>, PlatformError> {
        let client = self.provider.client_for(user_id).await?;

        let verified = async {
            client.verify_access(source, AccessMode::Read).await.map_err(|e| {
                PlatformError::Other(format!("cannot read source {source}: {e}"))
            })?;
            client
                .verify_access(destination, AccessMode::Write)
                .await
                .map_err(|e| {
                    PlatformError::Other(format!("cannot post to destination {destination}: {e}"))
                })
        }
        .await;

        match verified {
            Ok(()) => Ok(client),
            Err(e) => {
                if let Err(stop_err) = client.stop().await {
                    tracing::warn!(user_id = user_id.get(), error = %stop_err, "Failed to stop platform client");
                }
                Err(e)
            }
        }
    }

    /// Request cancellation of the user's running task
    ///
    /// Cooperative: the task notices at its next item or while sleeping, and
    /// may finish one in-flight dispatch first. A no-op when the user has no
    /// running task.
    pub fn cancel_task(&self, user_id: UserId) -> Option<TaskId> {
        let task_id = self.registry.cancel(user_id)?;
        tracing::info!(task_id = %task_id, user_id = user_id.get(), "Cancellation requested");
        Some(task_id)
    }

    /// Current counters of the user's running task
    pub fn get_status(&self, user_id: UserId) -> Option<ProgressSnapshot> {
        let task_id = self.registry.task_of(user_id)?;
        self.state_store.snapshot(&task_id)
    }

    /// Current counters of the user's running task with speed and ETA
    pub fn progress(&self, user_id: UserId) -> Option<ProgressReport> {
        self.get_status(user_id)
            .map(|snapshot| ProgressReport::from_snapshot(snapshot, Utc::now()))
    }

    /// Snapshots of every running task
    pub fn active_tasks(&self) -> Vec<ProgressSnapshot> {
        let mut tasks = self.state_store.snapshots();
        tasks.sort_by(|a, b| a.task_id.as_str().cmp(b.task_id.as_str()));
        tasks
    }

    /// Finished tasks, newest first
    pub async fn history(&self, limit: usize, offset: usize) -> Result<Vec<HistoryEntry>> {
        self.db.query_history(limit, offset).await
    }

    /// Number of finished tasks recorded
    pub async fn history_count(&self) -> Result<i64> {
        self.db.count_history().await
    }

    /// Delete every history entry, returning how many were removed
    pub async fn clear_history(&self) -> Result<u64> {
        self.db.clear_history().await
    }
}
