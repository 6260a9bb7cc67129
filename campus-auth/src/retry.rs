//! Bounded retry with linear backoff for transient provider failures.

use std::future::Future;
use std::time::Duration;

use crate::classify::{classify, ErrorKind};
use crate::config::RetryConfig;
use crate::error::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Sleep after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }
}

/// Run `op` until it succeeds, fails non-transiently, or runs out of attempts.
pub async fn retry_transient<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && classify(&e) == ErrorKind::Transient => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    operation = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
