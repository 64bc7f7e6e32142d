//! Full retrieval of one key's version history.

use std::sync::Arc;

use crate::config::{RetryPolicy, RewindConfig};
use crate::error::{RewindError, RewindResult};
use crate::retry::with_backoff;
use crate::traits::VersionedStore;
use crate::types::{KeyHistory, VersionRecord};

/// Drains every page of a key's version listing.
///
/// A needed version can sit on any page, so a partial listing is never used.
#[derive(Clone)]
pub struct VersionHistoryFetcher {
    store: Arc<dyn VersionedStore>,
    page_size: usize,
    retry: RetryPolicy,
}

impl VersionHistoryFetcher {
    /// Create a new fetcher.
    pub fn new(store: Arc<dyn VersionedStore>, config: &RewindConfig) -> Self {
        Self {
            store,
            page_size: config.page_size,
            retry: config.retry.clone(),
        }
    }

    /// Fetch all versions of exactly `key`, sorted for resolution.
    ///
    /// Listing by `key` also returns longer keys sharing it as a prefix
    /// (`/a` lists `/ab` and `/a/x`); those are dropped.
    pub async fn fetch(&self, key: &str) -> RewindResult<KeyHistory> {
        let mut history = KeyHistory::new(key);
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = with_backoff(&self.retry, "list_versions", || {
                self.store.list_versions(key, cursor.clone(), self.page_size)
            })
            .await?;
            pages += 1;

            history
                .records
                .extend(page.entries.into_iter().filter(|entry| entry.key == key));

            match page.next_cursor {
                Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                    return Err(RewindError::store(format!(
                        "version listing for {} did not advance past cursor {}",
                        key, next
                    )));
                }
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        history.sort_chronologically();
        tracing::debug!(
            "Fetched {} versions of {} in {} pages",
            history.len(),
            key,
            pages
        );
        Ok(history)
    }

    /// Fetch the body of one version, unless the listing already carried it.
    pub async fn fetch_body(&self, record: &VersionRecord) -> RewindResult<String> {
        if let Some(ref value) = record.value {
            return Ok(value.clone());
        }
        with_backoff(&self.retry, "get_body", || {
            self.store.get_body(&record.key, &record.version_id)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{MockVersionedStore, VersionPage};
    use crate::types::{ValueType, VersionMetadata};
    use chrono::{TimeZone, Utc};
    use mockall::predicate::eq;

    fn record(key: &str, ordinal: u64, seconds: i64) -> VersionRecord {
        VersionRecord {
            key: key.into(),
            version_id: format!("{}#{}", key, ordinal),
            ordinal,
            metadata: VersionMetadata::upsert(
                Utc.timestamp_opt(seconds, 0).unwrap(),
                ValueType::String,
            ),
            is_delete_marker: false,
            etag: None,
            value: None,
        }
    }

    fn config() -> RewindConfig {
        RewindConfig {
            page_size: 2,
            retry: RetryPolicy {
                max_retries: 2,
                initial_delay_ms: 1,
                max_delay_ms: 1,
                multiplier: 1.0,
            },
            ..RewindConfig::default()
        }
    }

    #[tokio::test]
    async fn test_drains_all_pages_and_filters_exact_key() {
        let mut store = MockVersionedStore::new();
        store
            .expect_list_versions()
            .with(eq("/a"), eq(None::<String>), eq(2usize))
            .times(1)
            .returning(|_, _, _| {
                Ok(VersionPage {
                    entries: vec![record("/a", 3, 300), record("/ab", 1, 50)],
                    next_cursor: Some("page-2".into()),
                })
            });
        store
            .expect_list_versions()
            .with(eq("/a"), eq(Some("page-2".to_string())), eq(2usize))
            .times(1)
            .returning(|_, _, _| {
                Ok(VersionPage {
                    entries: vec![record("/a/x", 2, 10), record("/a", 1, 100)],
                    next_cursor: None,
                })
            });

        let fetcher = VersionHistoryFetcher::new(Arc::new(store), &config());
        let history = fetcher.fetch("/a").await.unwrap();

        let ordinals: Vec<u64> = history.records.iter().map(|r| r.ordinal).collect();
        assert_eq!(ordinals, vec![1, 3]);
        assert!(history.records.iter().all(|r| r.key == "/a"));
    }

    #[tokio::test]
    async fn test_retries_throttled_pages() {
        let mut store = MockVersionedStore::new();
        let mut seq = mockall::Sequence::new();
        store
            .expect_list_versions()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(RewindError::throttled("slow down")));
        store
            .expect_list_versions()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| {
                Ok(VersionPage {
                    entries: vec![record("/a", 1, 100)],
                    next_cursor: None,
                })
            });

        let fetcher = VersionHistoryFetcher::new(Arc::new(store), &config());
        assert_eq!(fetcher.fetch("/a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stuck_cursor_is_an_error() {
        let mut store = MockVersionedStore::new();
        store.expect_list_versions().returning(|_, _, _| {
            Ok(VersionPage {
                entries: vec![],
                next_cursor: Some("same".into()),
            })
        });

        let fetcher = VersionHistoryFetcher::new(Arc::new(store), &config());
        assert!(fetcher.fetch("/a").await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_body_skips_store_when_present() {
        let store = MockVersionedStore::new();
        let fetcher = VersionHistoryFetcher::new(Arc::new(store), &config());
        let mut with_value = record("/a", 1, 100);
        with_value.value = Some("cached".into());
        assert_eq!(fetcher.fetch_body(&with_value).await.unwrap(), "cached");
    }
}
