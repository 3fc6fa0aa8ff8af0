//! Waiting helpers for task outcomes

use chat_forwarder::{ChatForwarder, Event, HistoryEntry, TaskId};
use std::time::Duration;

/// Wait for the history row of a finished task
pub async fn wait_for_history(
    forwarder: &ChatForwarder,
    task_id: &TaskId,
    timeout: Duration,
) -> Option<HistoryEntry> {
    tokio::time::timeout(timeout, async {
        loop {
            if let Ok(entries) = forwarder.history(100, 0).await
                && let Some(entry) = entries.into_iter().find(|e| &e.task_id == task_id)
            {
                return entry;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .ok()
}

/// Wait until a running task has scanned at least `fetched` indices
pub async fn wait_for_fetched(
    forwarder: &ChatForwarder,
    user_id: chat_forwarder::UserId,
    fetched: u64,
    timeout: Duration,
) -> bool {
    tokio::time::timeout(timeout, async {
        loop {
            if forwarder
                .get_status(user_id)
                .is_some_and(|snapshot| snapshot.fetched >= fetched)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

/// Collect events until the predicate matches or the timeout passes
pub async fn collect_events_until<F>(
    rx: &mut tokio::sync::broadcast::Receiver<Event>,
    timeout: Duration,
    mut done: F,
) -> Vec<Event>
where
    F: FnMut(&Event) -> bool,
{
    let mut events = Vec::new();
    let _ = tokio::time::timeout(timeout, async {
        while let Ok(event) = rx.recv().await {
            let finished = done(&event);
            events.push(event);
            if finished {
                break;
            }
        }
    })
    .await;
    events
}
