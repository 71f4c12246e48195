//! Bounded retry of optimistic-concurrency conflicts.
//!
//! Only [`MarketError::ConflictRetry`] is retried. Storage failures and
//! business outcomes are returned on the first attempt.

#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::errors::{MarketError, MarketResult};

/// Backoff settings for conflict retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Wait before the second attempt.
    pub base_delay: Duration,
    /// Upper bound for any single wait.
    pub max_delay: Duration,
    /// Growth factor of the wait per attempt.
    pub backoff_multiplier: f64,
    /// Spread retries of competing requests apart.
    pub use_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(200),
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A single attempt; conflicts go straight back to the caller.
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            use_jitter: false,
        }
    }

    /// Delay to wait before `attempt` (zero based). The first attempt never waits.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay_ms =
            self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi((attempt - 1) as i32);
        let capped = std::cmp::min(Duration::from_millis(delay_ms as u64), self.max_delay);

        if self.use_jitter {
            add_jitter(capped)
        } else {
            capped
        }
    }

    /// Runs `operation` until it stops reporting a conflict or attempts run out.
    pub async fn run<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> MarketResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = MarketResult<T>>,
    {
        let attempts = self.max_attempts.max(1);
        for attempt in 0..attempts {
            let delay = self.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match operation().await {
                Err(MarketError::ConflictRetry) if attempt + 1 < attempts => {
                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "[retry.conflict] concurrent modification, retrying"
                    );
                }
                Err(MarketError::ConflictRetry) => {
                    warn!(
                        operation = operation_name,
                        attempts, "[retry.exhausted] giving up after repeated conflicts"
                    );
                    return Err(MarketError::ConflictRetry);
                }
                other => return other,
            }
        }
        Err(MarketError::ConflictRetry)
    }
}

fn add_jitter(delay: Duration) -> Duration {
    let factor = rand::rng().random_range(0.8..1.2);
    Duration::from_millis((delay.as_millis() as f64 * factor) as u64)
}
