//! Version records kept in the versioned store.
//!
//! Every observed change becomes one immutable [`VersionRecord`]. Listings
//! return records without their body; the body is fetched only for the
//! version a query actually resolves to.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::{RewindError, RewindResult};
use crate::types::ValueType;

/// Tag holding the change timestamp as unix seconds.
pub const TAG_TIME: &str = "rewindTime";
/// Tag holding the value type wire name.
pub const TAG_TYPE: &str = "rewindType";
/// Tag holding the parameter description.
pub const TAG_DESCRIPTION: &str = "rewindDescription";
/// Tag present when the change timestamp is an ingestion-time approximation.
pub const TAG_APPROXIMATE: &str = "rewindApproximate";

/// Out-of-band metadata stored next to each version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMetadata {
    /// When the change happened, by the live store's modification clock.
    pub change_timestamp: DateTime<Utc>,
    /// Value type. Absent on delete markers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    /// Parameter description at the time of the change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Set when `change_timestamp` is ingestion time rather than change time.
    #[serde(default)]
    pub approximate: bool,
}

impl VersionMetadata {
    /// Metadata for an upsert.
    pub fn upsert(change_timestamp: DateTime<Utc>, value_type: ValueType) -> Self {
        Self {
            change_timestamp: truncate_to_seconds(change_timestamp),
            value_type: Some(value_type),
            description: None,
            approximate: false,
        }
    }

    /// Metadata for a delete marker: only the timestamp.
    pub fn deletion(change_timestamp: DateTime<Utc>) -> Self {
        Self {
            change_timestamp: truncate_to_seconds(change_timestamp),
            value_type: None,
            description: None,
            approximate: false,
        }
    }

    /// Builder: set description
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Builder: mark the timestamp as approximate
    pub fn approximate(mut self) -> Self {
        self.approximate = true;
        self
    }

    /// Flatten into string tags for stores that only keep string metadata.
    pub fn to_tags(&self) -> HashMap<String, String> {
        let mut tags = HashMap::new();
        tags.insert(
            TAG_TIME.to_string(),
            self.change_timestamp.timestamp().to_string(),
        );
        if let Some(value_type) = self.value_type {
            tags.insert(TAG_TYPE.to_string(), value_type.as_str().to_string());
        }
        if let Some(ref description) = self.description {
            tags.insert(TAG_DESCRIPTION.to_string(), description.clone());
        }
        if self.approximate {
            tags.insert(TAG_APPROXIMATE.to_string(), "true".to_string());
        }
        tags
    }

    /// Rebuild metadata from string tags.
    pub fn from_tags(tags: &HashMap<String, String>) -> RewindResult<Self> {
        let raw_time = tags
            .get(TAG_TIME)
            .ok_or_else(|| RewindError::store(format!("version is missing tag {}", TAG_TIME)))?;
        let seconds: i64 = raw_time
            .parse()
            .map_err(|_| RewindError::store(format!("bad {} tag: {}", TAG_TIME, raw_time)))?;
        let change_timestamp = Utc
            .timestamp_opt(seconds, 0)
            .single()
            .ok_or_else(|| RewindError::store(format!("{} out of range: {}", TAG_TIME, seconds)))?;
        let value_type = tags
            .get(TAG_TYPE)
            .map(|t| {
                ValueType::from_str(t)
                    .map_err(|_| RewindError::store(format!("unknown value type tag: {}", t)))
            })
            .transpose()?;

        Ok(Self {
            change_timestamp,
            value_type,
            description: tags.get(TAG_DESCRIPTION).cloned(),
            approximate: tags.contains_key(TAG_APPROXIMATE),
        })
    }
}

/// The live store's clock has one-second granularity; so do version times.
fn truncate_to_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(at.timestamp(), 0).single().unwrap_or(at)
}

/// One immutable version of a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Key this version belongs to.
    pub key: String,
    /// Store-assigned opaque version identifier.
    pub version_id: String,
    /// Strictly increasing at ingestion; breaks ties between equal timestamps.
    pub ordinal: u64,
    /// Change metadata.
    pub metadata: VersionMetadata,
    /// Whether this version records the key's deletion.
    pub is_delete_marker: bool,
    /// Hex MD5 of the body. Absent on delete markers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Body, when it has been fetched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl VersionRecord {
    /// When the change happened.
    pub fn change_timestamp(&self) -> DateTime<Utc> {
        self.metadata.change_timestamp
    }

    /// Ordering key used by point-in-time resolution.
    pub fn sort_key(&self) -> (DateTime<Utc>, u64) {
        (self.metadata.change_timestamp, self.ordinal)
    }
}

/// Compute the ETag of a body.
pub fn etag(body: &str) -> String {
    format!("{:x}", md5::compute(body.as_bytes()))
}

/// All versions of one key, in whatever order the store listed them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyHistory {
    pub key: String,
    pub records: Vec<VersionRecord>,
}

impl KeyHistory {
    /// Create an empty history.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            records: Vec::new(),
        }
    }

    /// Whether no versions were found.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of versions.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Sort by `(change_timestamp, ordinal)` ascending.
    pub fn sort_chronologically(&mut self) {
        self.records.sort_by_key(VersionRecord::sort_key);
    }
}
