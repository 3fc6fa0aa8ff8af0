//! Forward task finalization -- settle the terminal status and release everything the task held.

use std::sync::Arc;

use crate::config::WebhookEvent;
use crate::db::NewHistoryEntry;
use crate::dedup::DedupCache;
use crate::platform::PlatformClient;
use crate::state_store::TaskState;
use crate::types::{Event, TaskStatus};

use super::super::ChatForwarder;
use super::super::registry::TaskClaim;
use super::orchestration::LoopOutcome;

/// Record the outcome of a task and release its resources.
///
/// A task stopped by shutdown keeps its active record so it resumes on the
/// next start; every other outcome moves the record into history. The claim
/// is dropped here, releasing the user lock and the destination.
pub(super) async fn finalize_task(
    forwarder: ChatForwarder,
    state: Arc<TaskState>,
    client: Arc<dyn PlatformClient>,
    dedup: DedupCache,
    claim: TaskClaim,
    outcome: LoopOutcome,
) {
    let (status, error) = match outcome {
        LoopOutcome::Exhausted => (TaskStatus::Completed, None),
        LoopOutcome::Failed(msg) => (TaskStatus::Failed, Some(msg)),
        LoopOutcome::Stopped
            if !claim.user_cancelled() && forwarder.shutdown_token.is_cancelled() =>
        {
            (TaskStatus::Interrupted, None)
        }
        LoopOutcome::Stopped => (TaskStatus::Cancelled, None),
    };
    state.set_status(status);
    let snapshot = state.snapshot();
    let task_id = snapshot.task_id.clone();

    if status == TaskStatus::Interrupted {
        if let Err(e) = forwarder.db.save_snapshot(&snapshot).await {
            tracing::error!(task_id = %task_id, error = %e, "Failed to save snapshot of interrupted task");
        }
    } else {
        if let Err(e) = forwarder.db.delete_snapshot(&task_id).await {
            tracing::error!(task_id = %task_id, error = %e, "Failed to delete active task record");
        }
        let entry = NewHistoryEntry {
            snapshot: snapshot.clone(),
            status,
            error: error.clone(),
            finished_at: chrono::Utc::now().timestamp(),
        };
        if let Err(e) = forwarder.db.insert_history(&entry).await {
            tracing::error!(task_id = %task_id, error = %e, "Failed to record task history");
        }
    }

    dedup.close().await;
    if let Err(e) = client.stop().await {
        tracing::warn!(task_id = %task_id, error = %e, "Failed to stop platform client");
    }
    drop(claim);
    forwarder.state_store.remove(&task_id);

    tracing::info!(
        task_id = %task_id,
        user_id = snapshot.user_id.get(),
        status = ?status,
        fetched = snapshot.fetched,
        limit = snapshot.limit,
        dispatched = snapshot.dispatched,
        duplicate = snapshot.duplicate,
        filtered = snapshot.filtered,
        deleted = snapshot.deleted,
        "Forward task finished"
    );

    let user_id = snapshot.user_id;
    match status {
        TaskStatus::Completed => {
            forwarder.trigger_webhooks(WebhookEvent::OnCompleted, &snapshot, None);
            forwarder.emit_event(Event::TaskCompleted {
                task_id,
                user_id,
                snapshot: Box::new(snapshot),
            });
        }
        TaskStatus::Cancelled => {
            forwarder.trigger_webhooks(WebhookEvent::OnCancelled, &snapshot, None);
            forwarder.emit_event(Event::TaskCancelled { task_id, user_id });
        }
        TaskStatus::Failed => {
            let error = error.unwrap_or_default();
            tracing::error!(task_id = %task_id, error = %error, "Forward task failed");
            forwarder.trigger_webhooks(WebhookEvent::OnFailed, &snapshot, Some(error.clone()));
            forwarder.emit_event(Event::TaskFailed {
                task_id,
                user_id,
                error,
            });
        }
        _ => {
            forwarder.emit_event(Event::TaskInterrupted {
                task_id,
                user_id,
                fetched: snapshot.fetched,
            });
        }
    }
}
