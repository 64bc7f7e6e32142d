//! Batch preview and restore of a target at a point in time.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::RewindConfig;
use crate::error::RewindResult;
use crate::history::{PathWalker, PointInTimeResolver, VersionHistoryFetcher};
use crate::restore::RestoreExecutor;
use crate::traits::{LiveStore, VersionedStore};
use crate::types::{
    BatchReport, KeyFailure, PreviewRow, ResolvedState, RestoreOutcome, RestoreRow, Target,
};

/// Entry point for point-in-time queries and restores.
///
/// The target is walked once; each key is then fetched, resolved and
/// optionally written independently, up to `max_concurrency` keys at a time.
/// A failing key gets a failed row. A fatal error aborts the batch.
pub struct RestoreEngine {
    config: RewindConfig,
    walker: PathWalker,
    fetcher: VersionHistoryFetcher,
    executor: RestoreExecutor,
}

impl RestoreEngine {
    /// Create a new engine over the given stores.
    pub fn new(
        config: RewindConfig,
        versioned: Arc<dyn VersionedStore>,
        live: Arc<dyn LiveStore>,
    ) -> RewindResult<Self> {
        config.validate()?;
        Ok(Self {
            walker: PathWalker::new(versioned.clone(), &config),
            fetcher: VersionHistoryFetcher::new(versioned, &config),
            executor: RestoreExecutor::new(live, &config),
            config,
        })
    }

    /// The engine's configuration.
    pub fn config(&self) -> &RewindConfig {
        &self.config
    }

    /// Resolve a single key at `at`, fetching the body only for the winning version.
    pub async fn resolve_key(&self, key: &str, at: DateTime<Utc>) -> RewindResult<ResolvedState> {
        let history = self.fetcher.fetch(key).await?;
        let resolution = PointInTimeResolver::resolve(&history, at);
        let body = match resolution.version() {
            Some(record) => Some(self.fetcher.fetch_body(record).await?),
            None => None,
        };
        Ok(resolution.into_state(key, body))
    }

    /// Report the state of every key under `target` at `at`.
    pub async fn resolve(
        &self,
        target: &Target,
        at: DateTime<Utc>,
        recurse: bool,
    ) -> RewindResult<BatchReport<PreviewRow>> {
        self.resolve_with_cancel(target, at, recurse, CancellationToken::new())
            .await
    }

    /// Like [`resolve`](Self::resolve), stopping early when `cancel` fires.
    pub async fn resolve_with_cancel(
        &self,
        target: &Target,
        at: DateTime<Utc>,
        recurse: bool,
        cancel: CancellationToken,
    ) -> RewindResult<BatchReport<PreviewRow>> {
        tracing::info!("Previewing {} at {} (recurse={})", target, at, recurse);
        self.run_batch(target, recurse, cancel, |key| async move {
            match self.resolve_key(&key, at).await {
                Ok(state) => Ok(self.executor.preview(&state)),
                Err(err) if err.is_fatal() => Err(err),
                Err(err) => {
                    tracing::warn!("Failed to resolve {}: {}", key, err);
                    Ok(PreviewRow::failed(key, KeyFailure::from(&err)))
                }
            }
        })
        .await
    }

    /// Write the state of every key under `target` at `at` back to the live store.
    pub async fn apply(
        &self,
        target: &Target,
        at: DateTime<Utc>,
        recurse: bool,
    ) -> RewindResult<BatchReport<RestoreRow>> {
        self.apply_with_cancel(target, at, recurse, CancellationToken::new())
            .await
    }

    /// Like [`apply`](Self::apply), stopping early when `cancel` fires.
    ///
    /// Keys already written stay written; the report lists them.
    pub async fn apply_with_cancel(
        &self,
        target: &Target,
        at: DateTime<Utc>,
        recurse: bool,
        cancel: CancellationToken,
    ) -> RewindResult<BatchReport<RestoreRow>> {
        tracing::info!("Restoring {} to {} (recurse={})", target, at, recurse);
        let report = self
            .run_batch(target, recurse, cancel, |key| async move {
                let outcome = match self.resolve_key(&key, at).await {
                    Ok(state) => self.executor.restore(&state).await?,
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => {
                        tracing::warn!("Failed to resolve {}: {}", key, err);
                        RestoreOutcome::Failed(KeyFailure::from(&err))
                    }
                };
                Ok(RestoreRow { key, outcome })
            })
            .await?;

        let restored = report.rows.iter().filter(|r| r.is_restored()).count();
        let failed = report.rows.iter().filter(|r| r.is_failed()).count();
        tracing::info!(
            "Restore of {}: {} restored, {} skipped, {} failed",
            target,
            restored,
            report.rows.len() - restored - failed,
            failed
        );
        Ok(report)
    }

    async fn run_batch<T, F, Fut>(
        &self,
        target: &Target,
        recurse: bool,
        cancel: CancellationToken,
        per_key: F,
    ) -> RewindResult<BatchReport<T>>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = RewindResult<T>>,
    {
        let deadline = self
            .config
            .batch_timeout_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));

        let keys = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!("Batch for {} cancelled while walking", target);
                return Ok(interrupted(Vec::new(), 0));
            }
            _ = expired(deadline) => {
                tracing::warn!("Batch for {} timed out while walking", target);
                return Ok(interrupted(Vec::new(), 0));
            }
            keys = self.walker.walk(target, recurse) => keys?,
        };

        let total_keys = keys.len();
        tracing::debug!("{} keys under {}", total_keys, target);

        let mut results = stream::iter(keys)
            .map(|key| per_key(key))
            .buffer_unordered(self.config.max_concurrency);
        let mut rows = Vec::with_capacity(total_keys);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::warn!("Batch for {} cancelled after {}/{} keys", target, rows.len(), total_keys);
                    return Ok(interrupted(rows, total_keys));
                }
                _ = expired(deadline) => {
                    tracing::warn!("Batch for {} timed out after {}/{} keys", target, rows.len(), total_keys);
                    return Ok(interrupted(rows, total_keys));
                }
                next = results.next() => match next {
                    Some(row) => rows.push(row?),
                    None => break,
                },
            }
        }

        Ok(BatchReport {
            rows,
            interrupted: false,
            total_keys,
        })
    }
}

fn interrupted<T>(rows: Vec<T>, total_keys: usize) -> BatchReport<T> {
    BatchReport {
        rows,
        interrupted: true,
        total_keys,
    }
}

async fn expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
