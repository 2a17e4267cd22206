use std::future::Future;
use std::time::Duration;

use prwarden_core::GitHubConfig;

use crate::error::PlatformError;

/// Retry budget for idempotent platform reads.
///
/// # Examples
///
/// ```
/// use prwarden_core::GitHubConfig;
/// use prwarden_github::RetryPolicy;
///
/// let policy = RetryPolicy::from_config(&GitHubConfig::default());
/// assert_eq!(policy.attempts, 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay before the second attempt; doubled for each later one.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &GitHubConfig) -> Self {
        Self {
            attempts: config.read_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(6);
        self.base_delay.saturating_mul(factor)
    }
}

/// Run an idempotent read, retrying retryable failures within `policy`.
///
/// Non-retryable errors (4xx other than 429, decode failures) return
/// immediately.
///
/// # Errors
///
/// Returns the last [`PlatformError`] once the budget is spent.
pub async fn with_read_retry<T, F, Fut>(
    operation: &str,
    policy: RetryPolicy,
    mut read: F,
) -> Result<T, PlatformError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PlatformError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match read().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts = policy.attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "platform read failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
