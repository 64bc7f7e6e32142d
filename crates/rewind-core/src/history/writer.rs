//! Turns change events into immutable versions.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{RetryPolicy, RewindConfig};
use crate::error::RewindResult;
use crate::retry::with_backoff;
use crate::traits::{LiveStore, VersionedStore};
use crate::types::{decode_batch, ChangeEvent, KeyFailure, Operation, ValueType, VersionMetadata};

/// What recording one event did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WriteOutcome {
    /// A new version holding the key's value.
    Recorded {
        key: String,
        version_id: String,
        approximate: bool,
    },
    /// A delete marker for the key.
    DeleteMarked {
        key: String,
        version_id: String,
        approximate: bool,
    },
    /// Nothing was written.
    Skipped { key: String, reason: String },
}

impl WriteOutcome {
    /// The key the event was about.
    pub fn key(&self) -> &str {
        match self {
            Self::Recorded { key, .. } | Self::DeleteMarked { key, .. } | Self::Skipped { key, .. } => {
                key
            }
        }
    }

    /// Whether a version was written.
    pub fn wrote(&self) -> bool {
        !matches!(self, Self::Skipped { .. })
    }
}

/// Result for one message of a queue batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub result: Result<WriteOutcome, KeyFailure>,
}

/// Records each accepted change as exactly one version.
///
/// Delivery may be duplicated or out of order; the resolver sorts by change
/// timestamp, so the writer never needs to deduplicate.
#[derive(Clone)]
pub struct VersionLogWriter {
    versioned: Arc<dyn VersionedStore>,
    live: Arc<dyn LiveStore>,
    retry: RetryPolicy,
}

impl VersionLogWriter {
    /// Create a new writer.
    pub fn new(
        versioned: Arc<dyn VersionedStore>,
        live: Arc<dyn LiveStore>,
        config: &RewindConfig,
    ) -> Self {
        Self {
            versioned,
            live,
            retry: config.retry.clone(),
        }
    }

    /// Record one event.
    pub async fn record(&self, event: &ChangeEvent) -> RewindResult<WriteOutcome> {
        match event.operation {
            Operation::Create | Operation::Update => self.record_upsert(event).await,
            Operation::Delete => self.record_delete(event).await,
            Operation::Other(ref name) => {
                tracing::warn!("Skipping {} on {}: does not change the value", name, event.key);
                Ok(WriteOutcome::Skipped {
                    key: event.key.clone(),
                    reason: format!("operation {} does not change the value", name),
                })
            }
        }
    }

    async fn record_upsert(&self, event: &ChangeEvent) -> RewindResult<WriteOutcome> {
        let key = event.key.as_str();

        let (value, value_type, live_time, live_description) = match event.value {
            Some(ref value) => (value.clone(), event.value_type, None, None),
            None => {
                let current = with_backoff(&self.retry, "get_parameter", || {
                    self.live.get_parameter(key)
                })
                .await?;
                let Some(param) = current else {
                    tracing::warn!("Skipping {} on {}: key no longer exists", event.operation, key);
                    return Ok(WriteOutcome::Skipped {
                        key: key.to_string(),
                        reason: "key no longer exists in the live store".to_string(),
                    });
                };
                (
                    param.value,
                    Some(param.value_type),
                    Some(param.last_modified),
                    param.description,
                )
            }
        };

        let value_type = value_type.unwrap_or_else(|| {
            tracing::warn!("{} carries no value type, assuming {}", key, ValueType::default());
            ValueType::default()
        });

        let (metadata, approximate) = match event.changed_at.or(live_time) {
            Some(at) => (VersionMetadata::upsert(at, value_type), false),
            None => {
                tracing::warn!(
                    "No change timestamp for {}, using ingestion time (StaleChangeTimestamp)",
                    key
                );
                (
                    VersionMetadata::upsert(Utc::now(), value_type).approximate(),
                    true,
                )
            }
        };
        let metadata = metadata.with_description(event.description.clone().or(live_description));

        let version_id = with_backoff(&self.retry, "put_version", || {
            self.versioned.put_version(key, &value, &metadata)
        })
        .await?;

        tracing::info!(
            "Recorded {} of {} as version {} at {}",
            event.operation,
            key,
            version_id,
            metadata.change_timestamp
        );
        Ok(WriteOutcome::Recorded {
            key: key.to_string(),
            version_id,
            approximate,
        })
    }

    async fn record_delete(&self, event: &ChangeEvent) -> RewindResult<WriteOutcome> {
        let key = event.key.as_str();
        let (metadata, approximate) = match event.changed_at {
            Some(at) => (VersionMetadata::deletion(at), false),
            None => {
                tracing::warn!(
                    "No change timestamp for delete of {}, using ingestion time (StaleChangeTimestamp)",
                    key
                );
                (VersionMetadata::deletion(Utc::now()).approximate(), true)
            }
        };

        let version_id = with_backoff(&self.retry, "put_delete_marker", || {
            self.versioned.put_delete_marker(key, &metadata)
        })
        .await?;

        tracing::info!(
            "Recorded delete of {} as version {} at {}",
            key,
            version_id,
            metadata.change_timestamp
        );
        Ok(WriteOutcome::DeleteMarked {
            key: key.to_string(),
            version_id,
            approximate,
        })
    }

    /// Record every message of a queue batch, in delivery order.
    ///
    /// A malformed or failing message is reported in its own entry. A fatal
    /// error (permission, unavailable store) stops the batch.
    pub async fn record_batch(&self, payload: &str) -> RewindResult<Vec<BatchEntry>> {
        let messages = decode_batch(payload)?;
        let mut entries = Vec::with_capacity(messages.len());

        for message in messages {
            let result = match message.event {
                Ok(event) => match self.record(&event).await {
                    Ok(outcome) => Ok(outcome),
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => {
                        tracing::warn!("Failed to record {}: {}", event.key, err);
                        Err(KeyFailure::from(&err))
                    }
                },
                Err(err) => {
                    tracing::warn!(
                        "Rejected message {}: {}",
                        message.message_id.as_deref().unwrap_or("<unknown>"),
                        err
                    );
                    Err(KeyFailure::from(&err))
                }
            };
            entries.push(BatchEntry {
                message_id: message.message_id,
                result,
            });
        }

        let written = entries
            .iter()
            .filter(|e| matches!(e.result, Ok(ref outcome) if outcome.wrote()))
            .count();
        tracing::info!("Batch of {} messages: {} versions written", entries.len(), written);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, RewindError};
    use crate::traits::{LiveParameter, MockLiveStore, MockVersionedStore};
    use chrono::{DateTime, TimeZone};

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).unwrap()
    }

    fn writer(versioned: MockVersionedStore, live: MockLiveStore) -> VersionLogWriter {
        let config = RewindConfig {
            retry: RetryPolicy::none(),
            ..RewindConfig::default()
        };
        VersionLogWriter::new(Arc::new(versioned), Arc::new(live), &config)
    }

    fn live_param(key: &str, value: &str, modified: i64) -> LiveParameter {
        LiveParameter {
            key: key.into(),
            value: value.into(),
            value_type: ValueType::SecureString,
            last_modified: at(modified),
            description: Some("from live".into()),
            revision: 3,
        }
    }

    #[tokio::test]
    async fn test_upsert_reads_value_from_live_store() {
        let mut live = MockLiveStore::new();
        live.expect_get_parameter()
            .returning(|key| Ok(Some(live_param(key, "secret", 90))));

        let mut versioned = MockVersionedStore::new();
        versioned
            .expect_put_version()
            .withf(|key, body, meta| {
                key == "/app/pw"
                    && body == "secret"
                    && meta.change_timestamp == at(100)
                    && meta.value_type == Some(ValueType::SecureString)
                    && meta.description.as_deref() == Some("from live")
                    && !meta.approximate
            })
            .times(1)
            .returning(|_, _, _| Ok("ver-1".into()));

        let event = ChangeEvent::new("/app/pw", Operation::Update)
            .unwrap()
            .at(at(100));
        let outcome = writer(versioned, live).record(&event).await.unwrap();
        assert_eq!(
            outcome,
            WriteOutcome::Recorded {
                key: "/app/pw".into(),
                version_id: "ver-1".into(),
                approximate: false
            }
        );
    }

    #[tokio::test]
    async fn test_upsert_falls_back_to_live_modification_time() {
        let mut live = MockLiveStore::new();
        live.expect_get_parameter()
            .returning(|key| Ok(Some(live_param(key, "v", 90))));
        let mut versioned = MockVersionedStore::new();
        versioned
            .expect_put_version()
            .withf(|_, _, meta| meta.change_timestamp == at(90))
            .times(1)
            .returning(|_, _, _| Ok("ver-1".into()));

        let event = ChangeEvent::new("/app/x", Operation::Create).unwrap();
        assert!(writer(versioned, live).record(&event).await.unwrap().wrote());
    }

    #[tokio::test]
    async fn test_vanished_key_is_skipped() {
        let mut live = MockLiveStore::new();
        live.expect_get_parameter().returning(|_| Ok(None));
        let mut versioned = MockVersionedStore::new();
        versioned.expect_put_version().never();

        let event = ChangeEvent::new("/gone", Operation::Update)
            .unwrap()
            .at(at(5));
        let outcome = writer(versioned, live).record(&event).await.unwrap();
        assert!(matches!(outcome, WriteOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_missing_timestamp_is_approximate() {
        let live = MockLiveStore::new();
        let mut versioned = MockVersionedStore::new();
        versioned
            .expect_put_version()
            .withf(|_, body, meta| body == "inline" && meta.approximate)
            .times(1)
            .returning(|_, _, _| Ok("ver-9".into()));

        let event = ChangeEvent::new("/inline", Operation::Create)
            .unwrap()
            .with_value("inline", ValueType::String);
        let outcome = writer(versioned, live).record(&event).await.unwrap();
        assert!(matches!(
            outcome,
            WriteOutcome::Recorded {
                approximate: true,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_delete_writes_marker_only() {
        let live = MockLiveStore::new();
        let mut versioned = MockVersionedStore::new();
        versioned.expect_put_version().never();
        versioned
            .expect_put_delete_marker()
            .withf(|key, meta| key == "/d" && meta.change_timestamp == at(200) && meta.value_type.is_none())
            .times(1)
            .returning(|_, _| Ok("marker-1".into()));

        let event = ChangeEvent::new("/d", Operation::Delete).unwrap().at(at(200));
        let outcome = writer(versioned, live).record(&event).await.unwrap();
        assert!(matches!(outcome, WriteOutcome::DeleteMarked { .. }));
    }

    #[tokio::test]
    async fn test_other_operations_are_skipped() {
        let versioned = MockVersionedStore::new();
        let live = MockLiveStore::new();
        let event = ChangeEvent::new("/l", Operation::from_name("LabelParameterVersion")).unwrap();
        let outcome = writer(versioned, live).record(&event).await.unwrap();
        assert!(!outcome.wrote());
        assert_eq!(outcome.key(), "/l");
    }

    #[tokio::test]
    async fn test_batch_isolates_malformed_messages() {
        let live = MockLiveStore::new();
        let mut versioned = MockVersionedStore::new();
        versioned
            .expect_put_delete_marker()
            .times(1)
            .returning(|_, _| Ok("marker".into()));

        let payload = serde_json::json!({
            "Records": [
                {"messageId": "m1", "body": "not json"},
                {"messageId": "m2", "body": serde_json::json!({
                    "time": "2024-01-01T00:00:00Z",
                    "detail": {"name": "/a", "type": "String", "operation": "Delete"}
                }).to_string()}
            ]
        })
        .to_string();

        let entries = writer(versioned, live).record_batch(&payload).await.unwrap();
        assert_eq!(entries.len(), 2);
        let failure = entries[0].result.as_ref().unwrap_err();
        assert_eq!(failure.code, ErrorCode::EventMalformed);
        assert!(entries[1].result.is_ok());
    }

    #[tokio::test]
    async fn test_batch_aborts_on_permission_error() {
        let live = MockLiveStore::new();
        let mut versioned = MockVersionedStore::new();
        versioned
            .expect_put_delete_marker()
            .times(1)
            .returning(|_, _| Err(RewindError::permission("denied")));

        let body = serde_json::json!({
            "time": "2024-01-01T00:00:00Z",
            "detail": {"name": "/a", "type": "String", "operation": "Delete"}
        })
        .to_string();
        let payload = serde_json::json!({
            "Records": [{"messageId": "m1", "body": body}, {"messageId": "m2", "body": body}]
        })
        .to_string();

        let result = writer(versioned, live).record_batch(&payload).await;
        assert!(matches!(result, Err(RewindError::Permission { .. })));
    }
}
