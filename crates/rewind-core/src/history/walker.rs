//! Key enumeration for a restore target.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::{RetryPolicy, RewindConfig};
use crate::error::{RewindError, RewindResult};
use crate::retry::with_backoff;
use crate::traits::VersionedStore;
use crate::types::Target;

/// Enumerates the keys a target covers, as observed in the version log.
///
/// Keys that were deleted are still listed: their history decides whether
/// they existed at the query instant.
#[derive(Clone)]
pub struct PathWalker {
    store: Arc<dyn VersionedStore>,
    page_size: usize,
    retry: RetryPolicy,
}

impl PathWalker {
    /// Create a new walker.
    pub fn new(store: Arc<dyn VersionedStore>, config: &RewindConfig) -> Self {
        Self {
            store,
            page_size: config.page_size,
            retry: config.retry.clone(),
        }
    }

    /// Distinct keys under `target`, in lexical order.
    pub async fn walk(&self, target: &Target, recurse: bool) -> RewindResult<Vec<String>> {
        let scope = target.scope();
        let mut keys = BTreeSet::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = with_backoff(&self.retry, "list_versions", || {
                self.store.list_versions(scope, cursor.clone(), self.page_size)
            })
            .await?;

            for entry in page.entries {
                if target.matches(&entry.key, recurse) {
                    keys.insert(entry.key);
                }
            }

            match page.next_cursor {
                Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                    return Err(RewindError::store(format!(
                        "listing under {} did not advance past cursor {}",
                        scope, next
                    )));
                }
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        tracing::debug!(
            "Walked {} (recurse={}): {} keys",
            target,
            recurse,
            keys.len()
        );
        Ok(keys.into_iter().collect())
    }
}
