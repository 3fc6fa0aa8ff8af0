//! Forward task orchestration -- top-level lifecycle for a single task.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::dedup::DedupCache;
use crate::dispatch::{DispatchFlow, Dispatcher};
use crate::enumerator::{EnumeratedItem, MessageEnumerator};
use crate::filter::{FilterPipeline, Verdict};
use crate::platform::PlatformClient;
use crate::state_store::TaskState;
use crate::types::{Counter, TaskConfig};

use super::super::ChatForwarder;
use super::super::status_reporter::{StatusReporterParams, spawn_status_reporter};
use super::context::ForwardTaskContext;
use super::finalization::finalize_task;

/// How the loop ended
#[derive(Debug)]
pub(super) enum LoopOutcome {
    /// The enumerator ran out of items
    Exhausted,
    /// The task's cancellation token fired
    Stopped,
    /// The loop panicked
    Failed(String),
}

/// Core forward task -- runs the loop, then finalizes whatever the outcome.
///
/// Phases:
/// 1. Start the status reporter
/// 2. Enumerate, classify and dispatch in source order
/// 3. Stop the reporter
/// 4. Finalize (always, including after a panic in phase 2)
pub(crate) async fn run_forward_task(ctx: ForwardTaskContext) {
    let ForwardTaskContext {
        forwarder,
        state,
        config,
        filters,
        client,
        mut dedup,
        claim,
    } = ctx;
    let cancel = claim.cancel_token();

    let reporter_token = CancellationToken::new();
    let reporter = spawn_status_reporter(StatusReporterParams {
        state: Arc::clone(&state),
        db: Arc::clone(&forwarder.db),
        event_tx: forwarder.event_tx.clone(),
        interval: forwarder.config.engine.progress_interval,
        cancel_token: reporter_token.clone(),
    });

    tracing::info!(
        task_id = %state.task_id,
        user_id = state.user_id.get(),
        source = %state.source,
        destination = %state.destination,
        from = state.get(Counter::Fetched),
        limit = state.limit,
        "Forward task running"
    );

    let outcome = AssertUnwindSafe(process_messages(
        &forwarder,
        &state,
        &config,
        &filters,
        Arc::clone(&client),
        &mut dedup,
        &cancel,
    ))
    .catch_unwind()
    .await
    .unwrap_or_else(|panic| LoopOutcome::Failed(panic_message(&*panic)));

    reporter_token.cancel();
    if let Err(e) = reporter.await {
        tracing::warn!(task_id = %state.task_id, error = %e, "Status reporter ended abnormally");
    }

    finalize_task(forwarder, state, client, dedup, claim, outcome).await;
}

async fn process_messages(
    forwarder: &ChatForwarder,
    state: &Arc<TaskState>,
    config: &TaskConfig,
    filters: &FilterPipeline,
    client: Arc<dyn PlatformClient>,
    dedup: &mut DedupCache,
    cancel: &CancellationToken,
) -> LoopOutcome {
    let engine = &forwarder.config.engine;
    let pacing = &forwarder.config.pacing;

    let mut enumerator = MessageEnumerator::new(
        Arc::clone(&client),
        state.source.clone(),
        state.get(Counter::Fetched),
        state.limit,
        engine.fetch_batch(),
        config.disabled_content.clone(),
        pacing.clone(),
        cancel.clone(),
    );
    let mut dispatcher = Dispatcher::new(
        client,
        config,
        pacing.clone(),
        engine.forward_batch(),
        Arc::clone(state),
        cancel.clone(),
    );

    loop {
        if cancel.is_cancelled() {
            return LoopOutcome::Stopped;
        }
        let Some(item) = enumerator.next().await else {
            break;
        };
        state.increment(Counter::Fetched, 1);

        let message = match item {
            EnumeratedItem::Gap { .. } => continue,
            EnumeratedItem::Filtered { id } => {
                tracing::trace!(task_id = %state.task_id, message_id = id, "Disabled content kind");
                state.increment(Counter::Filtered, 1);
                continue;
            }
            EnumeratedItem::Message(message) => message,
        };

        match filters.classify(&message, dedup) {
            Verdict::Unusable => state.increment(Counter::Deleted, 1),
            Verdict::Filtered(reason) => {
                tracing::trace!(
                    task_id = %state.task_id,
                    message_id = message.id,
                    ?reason,
                    "Message filtered"
                );
                state.increment(Counter::Filtered, 1);
            }
            Verdict::Duplicate => state.increment(Counter::Duplicate, 1),
            Verdict::Accept { record } => {
                if let Some(signature) = record {
                    dedup.persist(&signature).await;
                }
                if dispatcher.dispatch(&message).await == DispatchFlow::Cancelled {
                    return LoopOutcome::Stopped;
                }
            }
        }
    }

    if cancel.is_cancelled() {
        return LoopOutcome::Stopped;
    }
    match dispatcher.finish().await {
        DispatchFlow::Continue => LoopOutcome::Exhausted,
        DispatchFlow::Cancelled => LoopOutcome::Stopped,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("task panicked: {msg}")
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("task panicked: {msg}")
    } else {
        "task panicked".to_string()
    }
}
