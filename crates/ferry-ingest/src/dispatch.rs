//! Mutation sinks and batch retry
//!
//! Upserts are keyed by external id, so resubmitting a batch that may or may
//! not have been applied is safe. Transient failures are retried with capped
//! exponential backoff; anything else fails the batch at once.

use crate::batch::BatchDocument;
use crate::error::DispatchError;
use crate::types::ApiResult;
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

/// The remote batch-mutation API.
#[async_trait]
pub trait MutationSink: Send + Sync {
    /// Submit one batch; results may come back in any order and may omit
    /// records the API did not write.
    async fn send(&self, batch: &BatchDocument) -> Result<Vec<ApiResult>, DispatchError>;
}

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries per batch, the first one included
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Send `batch`, retrying transient failures according to `policy`.
pub async fn send_with_retry(
    sink: &dyn MutationSink,
    batch: &BatchDocument,
    policy: &RetryPolicy,
) -> Result<Vec<ApiResult>, DispatchError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match sink.send(batch).await {
            Ok(results) => return Ok(results),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    batch = batch.sequence,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Batch failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
