//! Point-in-time resolution over a key's version history.
//!
//! Given the versions `V₀ … Vₙ` of a key and an instant `T`:
//! 1. Order versions by `(change_timestamp, ordinal)` ascending.
//! 2. Take the last version with `change_timestamp ≤ T`.
//! 3. If there is none, or it is a delete marker, the key is absent at `T`.
//! 4. Otherwise that version is the key's state at `T`.
//!
//! The live store's clock has one-second granularity, so independent changes
//! can share a timestamp. The ordinal is assigned at ingestion and breaks such
//! ties: the last write observed wins. Listing order is never consulted.

use chrono::{DateTime, Utc};

use crate::types::{KeyHistory, ResolvedState, ResolvedValue, ValueType, VersionRecord};

/// Outcome of resolving one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// The key existed; this version holds its value.
    Present(&'a VersionRecord),
    /// The key did not exist. `deleted_at` is set when a delete marker says so.
    Absent { deleted_at: Option<DateTime<Utc>> },
}

impl<'a> Resolution<'a> {
    /// The resolved version, if the key existed.
    pub fn version(&self) -> Option<&'a VersionRecord> {
        match self {
            Resolution::Present(record) => Some(*record),
            Resolution::Absent { .. } => None,
        }
    }

    /// Turn the resolution into a state, given the resolved version's body.
    pub fn into_state(self, key: &str, body: Option<String>) -> ResolvedState {
        match self {
            Resolution::Present(record) => {
                let value_type = record.metadata.value_type.unwrap_or_else(|| {
                    tracing::warn!(
                        "Version {} of {} has no value type, assuming {}",
                        record.version_id,
                        key,
                        ValueType::default()
                    );
                    ValueType::default()
                });
                ResolvedState::present(
                    key,
                    ResolvedValue {
                        value: body.or_else(|| record.value.clone()).unwrap_or_default(),
                        value_type,
                        change_timestamp: record.metadata.change_timestamp,
                        description: record.metadata.description.clone(),
                        approximate: record.metadata.approximate,
                    },
                )
            }
            Resolution::Absent { deleted_at } => ResolvedState::absent(key, deleted_at),
        }
    }
}

/// Stateless resolver. Identical inputs always resolve identically.
pub struct PointInTimeResolver;

impl PointInTimeResolver {
    /// Resolve `history` at instant `at`.
    pub fn resolve(history: &KeyHistory, at: DateTime<Utc>) -> Resolution<'_> {
        let candidate = history
            .records
            .iter()
            .filter(|record| record.change_timestamp() <= at)
            .max_by_key(|record| record.sort_key());

        let Some(record) = candidate else {
            tracing::debug!("{} has no version at or before {}", history.key, at);
            return Resolution::Absent { deleted_at: None };
        };

        // The winner is at or before `at`, so every record sharing its
        // timestamp is a candidate too.
        let same_second = history
            .records
            .iter()
            .filter(|other| other.change_timestamp() == record.change_timestamp())
            .count();
        if same_second > 1 {
            tracing::debug!(
                "{} has {} versions at {}, ordinal {} wins",
                history.key,
                same_second,
                record.change_timestamp(),
                record.ordinal
            );
        }

        if record.is_delete_marker {
            Resolution::Absent {
                deleted_at: Some(record.change_timestamp()),
            }
        } else {
            Resolution::Present(record)
        }
    }
}
