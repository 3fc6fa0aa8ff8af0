//! Delivery of accepted messages to the destination chat
//!
//! A task uses one of two strategies, chosen from [`ForwardMode`]:
//!
//! - **Tag-preserving**: ids accumulate into a batch that is forwarded in a
//!   single call once full, then paced by `forward_batch_pause`. A partial
//!   batch is flushed by [`Dispatcher::finish`].
//! - **Transform**: every message is copied on its own with a rebuilt caption
//!   and optional buttons, followed by a pause sized for the account type.
//!
//! Throttled calls are retried with identical arguments until they go
//! through. Any other failure is counted as `deleted` and skipped.

mod caption;

pub use caption::{parse_buttons, render_caption};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{DelayRange, PacingConfig};
use crate::platform::{AccountKind, InlineKeyboard, Message, PlatformClient};
use crate::retry::{RetryOutcome, retry_on_throttle, sleep_or_cancel};
use crate::state_store::TaskState;
use crate::types::{ChatRef, Counter, ForwardMode, TaskConfig};

/// Whether the caller should keep feeding messages
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchFlow {
    /// Keep going
    Continue,
    /// Cancellation fired while waiting; stop the task loop
    Cancelled,
}

enum Strategy {
    Batch {
        pending: Vec<i64>,
        capacity: usize,
    },
    Copy {
        template: Option<String>,
        keyboard: Option<InlineKeyboard>,
        pause: DelayRange,
    },
}

/// Per-task sender bound to one client, source and destination
pub struct Dispatcher {
    client: Arc<dyn PlatformClient>,
    source: ChatRef,
    destination: ChatRef,
    protect: bool,
    strategy: Strategy,
    pacing: PacingConfig,
    state: Arc<TaskState>,
    cancel: CancellationToken,
}

impl Dispatcher {
    /// Build the dispatcher for a task
    pub fn new(
        client: Arc<dyn PlatformClient>,
        config: &TaskConfig,
        pacing: PacingConfig,
        batch_capacity: usize,
        state: Arc<TaskState>,
        cancel: CancellationToken,
    ) -> Self {
        let strategy = match config.forward_mode {
            ForwardMode::TagPreserving => Strategy::Batch {
                pending: Vec::with_capacity(batch_capacity),
                capacity: batch_capacity.max(1),
            },
            ForwardMode::Transform => Strategy::Copy {
                template: config.caption_template.clone(),
                keyboard: config.button.as_deref().and_then(parse_buttons),
                pause: match client.account_kind() {
                    AccountKind::Bot => pacing.copy_pause_bot,
                    AccountKind::User => pacing.copy_pause_user,
                },
            },
        };

        Self {
            source: state.source.clone(),
            destination: state.destination.clone(),
            client,
            protect: config.protect_content,
            strategy,
            pacing,
            state,
            cancel,
        }
    }

    /// Number of ids waiting in the current batch
    pub fn pending(&self) -> usize {
        match &self.strategy {
            Strategy::Batch { pending, .. } => pending.len(),
            Strategy::Copy { .. } => 0,
        }
    }

    /// Hand one accepted message to the strategy
    pub async fn dispatch(&mut self, message: &Message) -> DispatchFlow {
        match &mut self.strategy {
            Strategy::Batch { pending, capacity } => {
                pending.push(message.id);
                if pending.len() < *capacity {
                    return DispatchFlow::Continue;
                }
                let ids = std::mem::take(pending);
                if self.forward_batch(&ids).await == DispatchFlow::Cancelled {
                    return DispatchFlow::Cancelled;
                }
                let pause = self.pacing.forward_batch_pause.sample();
                self.pause(pause).await
            }
            Strategy::Copy {
                template,
                keyboard,
                pause,
            } => {
                let caption = render_caption(template.as_deref(), message);
                let keyboard = keyboard.clone();
                let pause = pause.sample();
                if self
                    .copy_one(message.id, caption.as_deref(), keyboard.as_ref())
                    .await
                    == DispatchFlow::Cancelled
                {
                    return DispatchFlow::Cancelled;
                }
                self.pause(pause).await
            }
        }
    }

    /// Flush a partial batch at end of stream; nothing is sent after cancellation
    pub async fn finish(&mut self) -> DispatchFlow {
        let Strategy::Batch { pending, .. } = &mut self.strategy else {
            return DispatchFlow::Continue;
        };
        if pending.is_empty() {
            return DispatchFlow::Continue;
        }
        let ids = std::mem::take(pending);
        if self.cancel.is_cancelled() {
            tracing::debug!(
                task_id = %self.state.task_id,
                dropped = ids.len(),
                "Task cancelled, partial batch not flushed"
            );
            return DispatchFlow::Cancelled;
        }
        self.forward_batch(&ids).await
    }

    async fn forward_batch(&self, ids: &[i64]) -> DispatchFlow {
        let outcome = retry_on_throttle(&self.pacing.dispatch_throttle_margin, &self.cancel, || {
            self.client
                .forward_messages(&self.destination, &self.source, ids, self.protect)
        })
        .await;

        match outcome {
            RetryOutcome::Success(()) => {
                self.state
                    .increment(Counter::Dispatched, ids.len() as u64);
                tracing::debug!(
                    task_id = %self.state.task_id,
                    count = ids.len(),
                    first_id = ids.first().copied(),
                    "Forwarded batch"
                );
                DispatchFlow::Continue
            }
            RetryOutcome::Failed(e) => {
                self.state.increment(Counter::Deleted, ids.len() as u64);
                tracing::warn!(
                    task_id = %self.state.task_id,
                    count = ids.len(),
                    error = %e,
                    "Batch forward failed, counting batch as deleted"
                );
                DispatchFlow::Continue
            }
            RetryOutcome::Cancelled => DispatchFlow::Cancelled,
        }
    }

    async fn copy_one(
        &self,
        message_id: i64,
        caption: Option<&str>,
        keyboard: Option<&InlineKeyboard>,
    ) -> DispatchFlow {
        let outcome = retry_on_throttle(&self.pacing.dispatch_throttle_margin, &self.cancel, || {
            self.client.copy_message(
                &self.destination,
                &self.source,
                message_id,
                caption,
                keyboard,
                self.protect,
            )
        })
        .await;

        match outcome {
            RetryOutcome::Success(()) => {
                self.state.increment(Counter::Dispatched, 1);
                DispatchFlow::Continue
            }
            RetryOutcome::Failed(e) => {
                self.state.increment(Counter::Deleted, 1);
                tracing::warn!(
                    task_id = %self.state.task_id,
                    message_id,
                    error = %e,
                    "Copy failed, counting message as deleted"
                );
                DispatchFlow::Continue
            }
            RetryOutcome::Cancelled => DispatchFlow::Cancelled,
        }
    }

    async fn pause(&self, duration: std::time::Duration) -> DispatchFlow {
        if sleep_or_cancel(duration, &self.cancel).await {
            DispatchFlow::Continue
        } else {
            DispatchFlow::Cancelled
        }
    }
}
