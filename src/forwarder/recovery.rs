//! Resuming tasks that were active when the previous process stopped.

use chrono::Utc;

use crate::config::WebhookEvent;
use crate::db::ActiveTaskRow;
use crate::error::Result;
use crate::filter::FilterPipeline;
use crate::types::{Event, ProgressSnapshot, TaskConfig, TaskId, TaskStatus, UserId};

use super::ChatForwarder;
use super::forward_task::{ForwardTaskContext, open_dedup_cache, run_forward_task};
use super::registry::TaskClaim;

/// A validated record whose user and destination are already reserved
struct ResumePlan {
    snapshot: ProgressSnapshot,
    config: TaskConfig,
    filters: FilterPipeline,
    claim: TaskClaim,
}

impl ChatForwarder {
    /// Resume every persisted active task
    ///
    /// Records are validated and claimed here, oldest first, before any start
    /// request can be served. Only the run loops are spawned. A record whose
    /// user or destination is already held by an older record is dropped.
    ///
    /// Returns how many tasks were scheduled to resume.
    pub(crate) async fn resume_active_tasks(&self, unclean_shutdown: bool) -> Result<usize> {
        if unclean_shutdown {
            tracing::warn!("Previous shutdown was not clean, resuming tasks from last snapshots");
        }

        let rows = self.db.load_active_tasks().await?;
        if rows.is_empty() {
            tracing::debug!("No active tasks to resume");
            return Ok(0);
        }

        tracing::info!(count = rows.len(), "Resuming active tasks");
        let mut scheduled = 0;
        for row in rows {
            let task_id = TaskId(row.task_id.clone());
            let user_id = UserId(row.user_id);

            match self.plan_resume(&row) {
                Ok(plan) => {
                    scheduled += 1;
                    let forwarder = self.clone();
                    tokio::spawn(async move { forwarder.resume_task(plan).await });
                }
                Err(reason) => self.drop_record(task_id, user_id, reason).await,
            }
        }
        Ok(scheduled)
    }

    /// Decode a record and reserve its user and destination
    fn plan_resume(&self, row: &ActiveTaskRow) -> std::result::Result<ResumePlan, String> {
        let (snapshot, config) = row.decode()?;
        let filters = FilterPipeline::from_config(&config)
            .map_err(|e| format!("task configuration is invalid: {e}"))?;

        let claim = self
            .registry
            .try_claim(
                snapshot.user_id,
                snapshot.task_id.clone(),
                snapshot.destination.clone(),
                self.shutdown_token.child_token(),
            )
            .map_err(|e| format!("conflicts with another resumed task: {e}"))?;

        Ok(ResumePlan {
            snapshot,
            config,
            filters,
            claim,
        })
    }

    async fn drop_record(&self, task_id: TaskId, user_id: UserId, reason: String) {
        tracing::warn!(task_id = %task_id, reason = %reason, "Dropping unrecoverable task");
        if let Err(e) = self.db.delete_snapshot(&task_id).await {
            tracing::error!(task_id = %task_id, error = %e, "Failed to delete unrecoverable task");
        }
        self.emit_event(Event::TaskDropped {
            task_id,
            user_id,
            reason,
        });
    }

    async fn resume_task(&self, plan: ResumePlan) {
        let ResumePlan {
            snapshot,
            config,
            filters,
            claim,
        } = plan;
        let task_id = snapshot.task_id.clone();
        let user_id = snapshot.user_id;

        let client = match self.provider.client_for(user_id).await {
            Ok(client) => client,
            Err(e) => {
                // the record stays; start_task keeps refusing its user and destination
                tracing::error!(
                    task_id = %task_id,
                    user_id = user_id.get(),
                    error = %e,
                    "No client for recovered task, keeping it for the next start"
                );
                drop(claim);
                return;
            }
        };

        let state = self.state_store.restore(&snapshot);
        state.set_start(Utc::now());
        state.set_status(TaskStatus::Running);

        let dedup = open_dedup_cache(user_id, &snapshot.destination, &config).await;

        tracing::info!(
            task_id = %task_id,
            user_id = user_id.get(),
            skip = snapshot.skip,
            resume_at = snapshot.fetched,
            limit = snapshot.limit,
            "Resumed forward task"
        );
        self.emit_event(Event::TaskStarted {
            task_id,
            user_id,
            source: snapshot.source.to_string(),
            destination: snapshot.destination.to_string(),
            recovered: true,
        });
        self.trigger_webhooks(WebhookEvent::OnStarted, &state.snapshot(), None);

        run_forward_task(ForwardTaskContext {
            forwarder: self.clone(),
            state,
            config,
            filters,
            client,
            dedup,
            claim,
        })
        .await;
    }
}
