//! Periodic progress projection and snapshot mirroring for running tasks.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::db::Database;
use crate::state_store::TaskState;
use crate::types::{Event, ProgressReport};

/// Parameters for spawning a status reporter
pub(crate) struct StatusReporterParams {
    /// Live state of the task
    pub state: Arc<TaskState>,
    /// Database receiving the snapshot mirror
    pub db: Arc<Database>,
    /// Event broadcast sender
    pub event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Time between reports
    pub interval: Duration,
    /// Stops the reporter
    pub cancel_token: CancellationToken,
}

/// Spawn a background task that reports progress every `interval` until cancelled.
pub(crate) fn spawn_status_reporter(params: StatusReporterParams) -> tokio::task::JoinHandle<()> {
    let StatusReporterParams {
        state,
        db,
        event_tx,
        interval,
        cancel_token,
    } = params;
    tokio::spawn(async move {
        let period = interval.max(Duration::from_millis(10));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    report_once(&state, &db, &event_tx).await;
                }
                _ = cancel_token.cancelled() => {
                    break;
                }
            }
        }
    })
}

/// Project the current snapshot, broadcast it and mirror it to the database
pub(crate) async fn report_once(
    state: &TaskState,
    db: &Database,
    event_tx: &tokio::sync::broadcast::Sender<Event>,
) -> ProgressReport {
    let report = ProgressReport::from_snapshot(state.snapshot(), Utc::now());

    if let Err(e) = db.save_snapshot(&report.snapshot).await {
        tracing::error!(task_id = %state.task_id, error = %e, "Failed to mirror task snapshot");
    }

    event_tx
        .send(Event::Progress {
            task_id: report.snapshot.task_id.clone(),
            user_id: report.snapshot.user_id,
            fetched: report.snapshot.fetched,
            total: report.snapshot.total,
            dispatched: report.snapshot.dispatched,
            percent: report.percent,
            speed_per_sec: report.speed_per_sec,
            eta_secs: report.eta_secs,
        })
        .ok();

    tracing::debug!(
        task_id = %state.task_id,
        fetched = report.snapshot.fetched,
        total = report.snapshot.total,
        percent = report.percent,
        "Task progress"
    );
    report
}
