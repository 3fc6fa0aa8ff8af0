//! Retry of platform calls that were throttled
//!
//! The platform answers bursts with a rate-limit error carrying the wait it
//! demands. [`retry_on_throttle`] sleeps for that wait plus a random margin
//! and repeats the call with identical arguments, until it succeeds, fails
//! with any other error, or the task is cancelled.
//!
//! # Example
//!
//! ```no_run
//! use chat_forwarder::config::DelayRange;
//! use chat_forwarder::error::PlatformError;
//! use chat_forwarder::retry::{RetryOutcome, retry_on_throttle};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let cancel = CancellationToken::new();
//! let outcome = retry_on_throttle(&DelayRange::secs(5, 10), &cancel, || async {
//!     Ok::<_, PlatformError>(())
//! })
//! .await;
//! assert!(matches!(outcome, RetryOutcome::Success(())));
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::DelayRange;
use crate::error::PlatformError;

/// Errors that may ask the caller to back off and try again
pub trait IsThrottle {
    /// The wait demanded by the platform, if this is a throttle response
    fn throttle_wait(&self) -> Option<Duration>;
}

impl IsThrottle for PlatformError {
    fn throttle_wait(&self) -> Option<Duration> {
        self.retry_after()
    }
}

/// How a retried operation ended
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    /// The call eventually went through
    Success(T),
    /// The call failed with an error that is not a throttle
    Failed(E),
    /// The cancellation token fired while waiting
    Cancelled,
}

/// Sleep for `duration` unless `cancel` fires first; returns false if cancelled
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    if duration.is_zero() {
        return true;
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Run `operation`, waiting out every throttle response plus a margin drawn from `margin`
pub async fn retry_on_throttle<F, Fut, T, E>(
    margin: &DelayRange,
    cancel: &CancellationToken,
    mut operation: F,
) -> RetryOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsThrottle + std::fmt::Display,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Platform call succeeded after throttling");
                }
                return RetryOutcome::Success(result);
            }
            Err(e) => {
                let Some(wait) = e.throttle_wait() else {
                    return RetryOutcome::Failed(e);
                };
                attempt += 1;
                let delay = wait + margin.sample();

                tracing::warn!(
                    error = %e,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Platform throttled the call, waiting before retry"
                );

                if !sleep_or_cancel(delay, cancel).await {
                    tracing::debug!(attempt, "Throttle wait interrupted by cancellation");
                    return RetryOutcome::Cancelled;
                }
            }
        }
    }
}
