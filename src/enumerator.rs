//! Paced, batched walk over a source chat's message index range.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::PacingConfig;
use crate::platform::{Message, PlatformClient};
use crate::retry::sleep_or_cancel;
use crate::types::{ChatRef, ContentKind};

/// One slot of the source range, in ascending index order
#[derive(Clone, Debug, PartialEq)]
pub enum EnumeratedItem {
    /// A message that passed the coarse content rules
    Message(Message),
    /// A message excluded by a disabled content kind
    Filtered {
        /// Message index
        id: i64,
    },
    /// No message exists at this index
    Gap {
        /// Message index
        id: i64,
    },
}

/// Lazy, non-restartable sequence over `[cursor, limit)`.
///
/// Each index of the range yields exactly one item. A rate-limited batch is
/// re-fetched with the same ids after the signaled wait; any other fetch
/// error, or cancellation during a wait, ends the sequence early.
pub struct MessageEnumerator {
    client: Arc<dyn PlatformClient>,
    source: ChatRef,
    cursor: u64,
    limit: u64,
    batch_size: usize,
    disabled: Vec<ContentKind>,
    pacing: PacingConfig,
    cancel: CancellationToken,
    buffer: VecDeque<EnumeratedItem>,
    batches_fetched: u64,
    finished: bool,
}

impl MessageEnumerator {
    /// Build an enumerator starting at `cursor`
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<dyn PlatformClient>,
        source: ChatRef,
        cursor: u64,
        limit: u64,
        batch_size: usize,
        disabled: Vec<ContentKind>,
        pacing: PacingConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            source,
            cursor,
            limit,
            batch_size: batch_size.max(1),
            disabled,
            pacing,
            cancel,
            buffer: VecDeque::new(),
            batches_fetched: 0,
            finished: false,
        }
    }

    /// Index of the next slot to fetch
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Next item, or `None` once the range is exhausted or enumeration stopped
    pub async fn next(&mut self) -> Option<EnumeratedItem> {
        if let Some(item) = self.buffer.pop_front() {
            return Some(item);
        }
        if self.finished || self.cursor >= self.limit {
            return None;
        }
        if !self.fetch_batch().await {
            self.finished = true;
            return None;
        }
        self.buffer.pop_front()
    }

    /// Fill the buffer with the next batch; false ends the sequence
    async fn fetch_batch(&mut self) -> bool {
        if self.batches_fetched > 0 {
            let pause = self.pacing.fetch_pause.sample();
            if !sleep_or_cancel(pause, &self.cancel).await {
                return false;
            }
        }

        let end = self
            .limit
            .min(self.cursor.saturating_add(self.batch_size as u64));
        let ids: Vec<i64> = (self.cursor..end).map(|i| i as i64).collect();

        loop {
            match self.client.fetch_messages(&self.source, &ids).await {
                Ok(mut slots) => {
                    if slots.len() != ids.len() {
                        tracing::debug!(
                            requested = ids.len(),
                            returned = slots.len(),
                            "Fetch returned a misaligned batch"
                        );
                    }
                    slots.resize(ids.len(), None);
                    for (id, slot) in ids.iter().zip(slots) {
                        self.buffer.push_back(self.classify(*id, slot));
                    }
                    self.cursor = end;
                    self.batches_fetched += 1;
                    return true;
                }
                Err(e) => match e.retry_after() {
                    Some(wait) => {
                        let delay = wait + self.pacing.fetch_throttle_jitter.sample();
                        tracing::warn!(
                            source = %self.source,
                            first_id = self.cursor,
                            delay_ms = delay.as_millis() as u64,
                            "Fetch rate limited, sleeping before retrying the batch"
                        );
                        if !sleep_or_cancel(delay, &self.cancel).await {
                            return false;
                        }
                    }
                    None => {
                        tracing::error!(
                            source = %self.source,
                            first_id = self.cursor,
                            error = %e,
                            "Fetch failed, ending enumeration"
                        );
                        return false;
                    }
                },
            }
        }
    }

    fn classify(&self, id: i64, slot: Option<Message>) -> EnumeratedItem {
        match slot {
            None => EnumeratedItem::Gap { id },
            Some(message) if message.matches_disabled(&self.disabled) => {
                EnumeratedItem::Filtered { id }
            }
            Some(message) => EnumeratedItem::Message(message),
        }
    }
}
