//! Bounded exponential backoff for throttled store calls.

use backon::{ExponentialBuilder, Retryable};
use std::future::Future;
use std::time::Duration;

use crate::config::RetryPolicy;
use crate::error::{RewindError, RewindResult};

fn backoff(policy: &RetryPolicy) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_max_times(policy.max_retries as usize)
        .with_min_delay(Duration::from_millis(policy.initial_delay_ms))
        .with_max_delay(Duration::from_millis(policy.max_delay_ms))
        .with_factor(policy.multiplier)
        .with_jitter()
}

/// Run `op`, retrying only while it fails with a retryable error.
///
/// Permission and other errors are returned on first occurrence. Throttling
/// that outlasts the policy becomes `StoreUnavailable`, which aborts a batch.
pub async fn with_backoff<T, F, Fut>(policy: &RetryPolicy, what: &str, op: F) -> RewindResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RewindResult<T>>,
{
    op.retry(backoff(policy))
        .when(RewindError::is_retryable)
        .notify(|err, dur| {
            tracing::warn!("{} throttled, retrying in {:?}: {}", what, dur, err);
        })
        .await
        .map_err(|err| {
            if err.is_retryable() {
                RewindError::store_unavailable(format!(
                    "{} still throttled after {} retries: {}",
                    what, policy.max_retries, err
                ))
            } else {
                err
            }
        })
}
