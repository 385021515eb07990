//! Bounded retry with exponential backoff.
//!
//! Consumers run each delivery through a [`RetryPolicy`] so transient
//! failures (a briefly unreachable database, a lock timeout) are absorbed
//! before the delivery is parked in the dead-letter sink.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry configuration: attempt budget and backoff curve.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles each retry
    pub initial_backoff: Duration,
    /// Cap on the backoff growth
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Run `operation` until it succeeds or the attempt budget is spent.
    ///
    /// # Errors
    ///
    /// Returns the last error once `max_attempts` attempts have failed.
    pub async fn run<F, Fut, T, E>(&self, context: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut backoff = self.initial_backoff;

        for attempt in 1..=self.max_attempts.max(1) {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(context, attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if attempt >= self.max_attempts.max(1) => {
                    warn!(
                        context,
                        attempts = attempt,
                        error = %e,
                        "operation failed after max retries"
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        context,
                        attempt,
                        max_attempts = self.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "operation failed, backing off"
                    );
                    sleep(backoff).await;
                    backoff = std::cmp::min(backoff * 2, self.max_backoff);
                }
            }
        }

        unreachable!("retry loop returns within the attempt budget")
    }
}
