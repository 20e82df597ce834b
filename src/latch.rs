//! Bounded polling until a predicate reports done.
//!
//! [`PollLatch`] evaluates a [`Predicate`] immediately, then once per
//! interval, until it reports done or the deadline passes. The deadline is
//! computed once on entry, so a slow predicate eats into the budget rather than
//! extending it. Errors returned by the predicate are terminal and surface
//! unchanged.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::{Error, Result};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_TIMEOUT_MESSAGE: &str = "Operation timed out";

/// A condition polled by [`PollLatch`].
#[async_trait]
pub trait Predicate: Send {
    /// Returns `Ok(true)` once the condition holds. An `Err` aborts polling.
    async fn is_done(&mut self) -> Result<bool>;
}

/// Adapter turning an async closure into a [`Predicate`].
pub struct FnPredicate<F>(F);

/// Wrap a closure returning a future of `Result<bool>` as a predicate.
pub fn poll_fn<F, Fut>(f: F) -> FnPredicate<F>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<bool>> + Send,
{
    FnPredicate(f)
}

#[async_trait]
impl<F, Fut> Predicate for FnPredicate<F>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<bool>> + Send,
{
    async fn is_done(&mut self) -> Result<bool> {
        (self.0)().await
    }
}

/// Polls a predicate at a fixed interval until it is done or a timeout passes.
#[derive(Debug, Clone)]
pub struct PollLatch {
    interval: Duration,
    timeout: Duration,
    timeout_message: String,
    verbose: bool,
}

impl PollLatch {
    /// Create a latch with the given overall timeout and default interval.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout,
            timeout_message: DEFAULT_TIMEOUT_MESSAGE.to_string(),
            verbose: false,
        }
    }

    /// Set the delay between predicate evaluations.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the message carried by the timeout error.
    #[must_use]
    pub fn timeout_message(mut self, message: impl Into<String>) -> Self {
        self.timeout_message = message.into();
        self
    }

    /// Log the delay before every re-check.
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn polling_interval(&self) -> Duration {
        self.interval
    }

    /// Wait until `predicate` reports done.
    ///
    /// The predicate is evaluated once before any sleep, so a zero timeout
    /// still gets exactly one evaluation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] with the configured message when the
    /// deadline passes, or the predicate's own error unchanged.
    pub async fn wait_for<P>(&self, predicate: &mut P) -> Result<()>
    where
        P: Predicate + ?Sized,
    {
        // A timeout past the end of the clock never expires.
        let deadline = Instant::now().checked_add(self.timeout);

        if predicate.is_done().await? {
            return Ok(());
        }

        loop {
            if matches!(deadline, Some(deadline) if Instant::now() >= deadline) {
                return Err(Error::Timeout {
                    message: self.timeout_message.clone(),
                });
            }

            if self.verbose {
                debug!(
                    next_check_ms = self.interval.as_millis() as u64,
                    "Condition not met yet"
                );
            }
            sleep(self.interval).await;

            if predicate.is_done().await? {
                return Ok(());
            }
        }
    }
}

impl Default for PollLatch {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counting(done_after: u32) -> (Arc<AtomicU32>, impl Predicate) {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let predicate = poll_fn(move || {
            let n = seen.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, Error>(n >= done_after) }
        });
        (calls, predicate)
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_evaluates_exactly_once() {
        let (calls, mut predicate) = counting(u32::MAX);
        let latch = PollLatch::new(Duration::ZERO).interval(Duration::from_millis(100));

        let err = latch.wait_for(&mut predicate).await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_success_does_not_sleep() {
        let (calls, mut predicate) = counting(0);
        let start = Instant::now();

        PollLatch::new(Duration::from_secs(5))
            .wait_for(&mut predicate)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn default_message_is_used() {
        let (_, mut predicate) = counting(u32::MAX);
        let err = PollLatch::default().wait_for(&mut predicate).await.unwrap_err();
        assert_eq!(err.to_string(), "Operation timed out");
    }
}
