//! Retry policy for remote calls
//!
//! Every network call made by the orchestrator goes through
//! [`RetryPolicy::run`]: a per-call timeout, then in-place retries with
//! exponential backoff for transient failures only. Other failure classes
//! are returned immediately so the caller can apply its own policy.

use std::future::Future;
use std::time::Duration;

use notesync_core::config::RetryConfig;
use notesync_core::ports::RemoteError;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    call_timeout: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts the first call; values below 1 are raised to 1
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            call_timeout,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            config.base_delay(),
            config.max_delay(),
            config.call_timeout(),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Delay before retry number `attempt + 1`
    ///
    /// Backoff schedule with the defaults: 500ms, 1s, 2s, 4s ... capped at
    /// `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Runs `f` until it succeeds, fails with a non-transient error, or the
    /// attempts are used up
    pub async fn run<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut attempt = 0u32;
        loop {
            let result = match tokio::time::timeout(self.call_timeout, f()).await {
                Ok(result) => result,
                Err(_) => Err(RemoteError::Timeout(format!(
                    "{operation} did not complete within {:?}",
                    self.call_timeout
                ))),
            };

            match result {
                Ok(value) => {
                    if attempt > 0 {
                        info!(operation, attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt + 1 < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
