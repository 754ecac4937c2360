//! Attempt loop used by the client facade.
//!
//! Every failure is retried until the budget runs out; attempts run back to
//! back with no delay.

use std::fmt::Display;
use std::future::Future;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first. Never zero.
    pub max_attempts: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 1 }
    }
}

impl RetryConfig {
    /// `0` is treated as a single attempt.
    pub fn new(attempts: usize) -> Self {
        Self {
            max_attempts: attempts.max(1),
        }
    }

    pub fn no_retry() -> Self {
        Self::default()
    }

    /// Run `op` until it succeeds or the budget is spent. `op` receives the
    /// 1-based attempt number. The last error is returned.
    pub async fn run<F, Fut, T, E>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if should_retry(attempt, self) => {
                    debug!(
                        attempt,
                        max = self.max_attempts,
                        error = %e,
                        "attempt failed, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => {
                    debug!(attempt, error = %e, "attempts exhausted");
                    return Err(e);
                }
            }
        }
    }
}

/// Whether another attempt fits after `attempt` (1-based) failed.
pub fn should_retry(attempt: usize, config: &RetryConfig) -> bool {
    attempt < config.max_attempts
}
