//! Bounded exponential-backoff retry over classified errors.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::{ApiError, ErrorKind, Result};

/// Largest exponent the backoff doubling is allowed to reach.
const MAX_BACKOFF_EXPONENT: u32 = 20;

/// Retry configuration: total attempts, base delay, and the error kinds
/// considered transient. Immutable after construction.
///
/// Backoff after the n-th failed attempt (0-based) is `base_delay * 2^n`,
/// with the exponent capped so pathological attempt budgets cannot overflow.
/// Only errors whose kind is in `retryable` are retried; anything else is
/// re-raised immediately, so a 4xx or a decode error never burns attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    retryable: HashSet<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500), ApiError::default_retryable_kinds())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, retryable: HashSet<ErrorKind>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            retryable,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `operation` up to `max_attempts` times.
    ///
    /// The final error — retryable or not — is surfaced unchanged.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let last = attempt + 1 >= self.max_attempts;
                    if last || !self.retryable.contains(&err.kind()) {
                        return Err(err);
                    }
                    // Cap the exponent so a large attempt budget cannot
                    // overflow the multiplier or the Duration itself.
                    let factor = 2u32.pow(attempt.min(MAX_BACKOFF_EXPONENT));
                    let delay = self.base_delay.saturating_mul(factor);
                    debug!(attempt, ?delay, error = %err, "retrying after transient failure");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
