//! One-off capture of the live store's current state into the version log.
//!
//! Used when protection is first switched on for keys that already exist:
//! without a recorded version they would resolve as absent at every instant.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{RetryPolicy, RewindConfig};
use crate::error::{RewindError, RewindResult};
use crate::history::VersionLogWriter;
use crate::retry::with_backoff;
use crate::traits::{LiveParameter, LiveStore};
use crate::types::{ChangeEvent, KeyFailure, Operation, SEPARATOR};

/// What a seeding run did, or would do.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedReport {
    /// Whether nothing was written.
    pub dry_run: bool,
    /// Keys recorded, or that would be recorded.
    pub keys: Vec<String>,
    /// Keys that could not be recorded.
    pub failures: Vec<(String, KeyFailure)>,
}

/// Records a version for every live parameter under some prefixes.
pub struct Seeder {
    live: Arc<dyn LiveStore>,
    writer: VersionLogWriter,
    page_size: usize,
    retry: RetryPolicy,
}

impl Seeder {
    /// Create a new seeder.
    pub fn new(live: Arc<dyn LiveStore>, writer: VersionLogWriter, config: &RewindConfig) -> Self {
        Self {
            live,
            writer,
            page_size: config.page_size,
            retry: config.retry.clone(),
        }
    }

    /// Seed everything under `prefixes` (the whole store when empty).
    ///
    /// With `dry_run` the live store is listed but nothing is written.
    pub async fn seed(&self, prefixes: &[String], dry_run: bool) -> RewindResult<SeedReport> {
        let mut report = SeedReport {
            dry_run,
            ..SeedReport::default()
        };

        let paths: Vec<String> = if prefixes.is_empty() {
            vec![SEPARATOR.to_string()]
        } else {
            prefixes.iter().map(|p| normalize_path(p)).collect()
        };

        for path in paths {
            for param in self.list_all(&path).await? {
                if dry_run {
                    tracing::info!("Would record {}", param.key);
                    report.keys.push(param.key);
                    continue;
                }

                let key = param.key.clone();
                match self.record(param).await {
                    Ok(()) => report.keys.push(key),
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => {
                        tracing::warn!("Failed to seed {}: {}", key, err);
                        report.failures.push((key, KeyFailure::from(&err)));
                    }
                }
            }
        }

        tracing::info!(
            "Seeded {} keys ({} failed, dry_run={})",
            report.keys.len(),
            report.failures.len(),
            dry_run
        );
        Ok(report)
    }

    async fn record(&self, param: LiveParameter) -> RewindResult<()> {
        let mut event = ChangeEvent::new(param.key, Operation::Update)?
            .with_value(param.value, param.value_type)
            .at(param.last_modified);
        event.description = param.description;
        self.writer.record(&event).await.map(|_| ())
    }

    async fn list_all(&self, path: &str) -> RewindResult<Vec<LiveParameter>> {
        let mut params = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = with_backoff(&self.retry, "get_parameters_by_path", || {
                self.live
                    .get_parameters_by_path(path, true, cursor.clone(), self.page_size)
            })
            .await?;
            params.extend(page.parameters);
            match page.next_cursor {
                Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                    return Err(RewindError::store(format!(
                        "parameter listing under {} did not advance past cursor {}",
                        path, next
                    )));
                }
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(params)
    }
}

fn normalize_path(prefix: &str) -> String {
    let trimmed = prefix.trim();
    if trimmed.ends_with(SEPARATOR) {
        trimmed.to_string()
    } else {
        format!("{}{}", trimmed, SEPARATOR)
    }
}
