//! Reporting and applying resolved states.

use std::sync::Arc;

use crate::config::{RetryPolicy, RewindConfig};
use crate::error::RewindResult;
use crate::retry::with_backoff;
use crate::traits::{LiveStore, ParameterWrite};
use crate::types::{KeyFailure, PreviewRow, ResolvedState, RestoreOutcome};

/// Writes resolved states back to the live store.
///
/// Restores are additive: a key absent at the target time is left as it is
/// in the live store, never deleted.
#[derive(Clone)]
pub struct RestoreExecutor {
    live: Arc<dyn LiveStore>,
    retry: RetryPolicy,
}

impl RestoreExecutor {
    /// Create a new executor.
    pub fn new(live: Arc<dyn LiveStore>, config: &RewindConfig) -> Self {
        Self {
            live,
            retry: config.retry.clone(),
        }
    }

    /// Report a resolved state without touching the live store.
    pub fn preview(&self, resolved: &ResolvedState) -> PreviewRow {
        PreviewRow::from(resolved)
    }

    /// Apply one resolved state.
    ///
    /// Fatal errors are returned as `Err` so the caller can abort its batch;
    /// any other failure becomes [`RestoreOutcome::Failed`].
    pub async fn restore(&self, resolved: &ResolvedState) -> RewindResult<RestoreOutcome> {
        let Some(ref state) = resolved.state else {
            tracing::debug!("{} was absent, leaving live store untouched", resolved.key);
            return Ok(RestoreOutcome::SkippedAbsent);
        };

        let write = ParameterWrite::new(&resolved.key, &state.value, state.value_type)
            .with_description(state.description.clone());

        match with_backoff(&self.retry, "put_parameter", || {
            self.live.put_parameter(&write, true)
        })
        .await
        {
            Ok(revision) => {
                tracing::info!(
                    "Restored {} to its {} value (revision {})",
                    resolved.key,
                    state.change_timestamp,
                    revision
                );
                Ok(RestoreOutcome::Restored {
                    value_type: state.value_type,
                    change_timestamp: state.change_timestamp,
                })
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                tracing::warn!("Failed to restore {}: {}", resolved.key, err);
                Ok(RestoreOutcome::Failed(KeyFailure::from(&err)))
            }
        }
    }
}
