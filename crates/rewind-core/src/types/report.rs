//! Resolution results and per-key report rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, RewindError};
use crate::types::ValueType;

/// State of a key at the query instant, when it existed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedValue {
    pub value: String,
    pub value_type: ValueType,
    pub change_timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Set when the version's timestamp is an ingestion-time approximation.
    #[serde(default)]
    pub approximate: bool,
}

/// A key paired with its state at the query instant. `None` means absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedState {
    pub key: String,
    pub state: Option<ResolvedValue>,
    /// Time of the delete marker that made the key absent, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ResolvedState {
    /// A key that existed with `value`.
    pub fn present(key: impl Into<String>, value: ResolvedValue) -> Self {
        Self {
            key: key.into(),
            state: Some(value),
            deleted_at: None,
        }
    }

    /// A key that did not exist.
    pub fn absent(key: impl Into<String>, deleted_at: Option<DateTime<Utc>>) -> Self {
        Self {
            key: key.into(),
            state: None,
            deleted_at,
        }
    }

    /// Whether the key was absent.
    pub fn is_absent(&self) -> bool {
        self.state.is_none()
    }
}

/// Why one key of a batch failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFailure {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&RewindError> for KeyFailure {
    fn from(err: &RewindError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for KeyFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

/// One preview row. Absent keys are listed explicitly, never omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewRow {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    pub was_absent_at_time: bool,
    /// Time of the resolved version, or of the delete marker for absent keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub approximate: bool,
    /// Set when this key could not be resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<KeyFailure>,
}

impl PreviewRow {
    /// A row for a key whose resolution failed.
    pub fn failed(key: impl Into<String>, failure: KeyFailure) -> Self {
        Self {
            key: key.into(),
            value: None,
            value_type: None,
            was_absent_at_time: false,
            change_timestamp: None,
            description: None,
            approximate: false,
            failure: Some(failure),
        }
    }
}

impl From<&ResolvedState> for PreviewRow {
    fn from(resolved: &ResolvedState) -> Self {
        match resolved.state {
            Some(ref state) => Self {
                key: resolved.key.clone(),
                value: Some(state.value.clone()),
                value_type: Some(state.value_type),
                was_absent_at_time: false,
                change_timestamp: Some(state.change_timestamp),
                description: state.description.clone(),
                approximate: state.approximate,
                failure: None,
            },
            None => Self {
                key: resolved.key.clone(),
                value: None,
                value_type: None,
                was_absent_at_time: true,
                change_timestamp: resolved.deleted_at,
                description: None,
                approximate: false,
                failure: None,
            },
        }
    }
}

/// What a restore did to one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RestoreOutcome {
    /// The live store now holds the resolved value.
    Restored {
        value_type: ValueType,
        change_timestamp: DateTime<Utc>,
    },
    /// The key was absent at the target time; the live store was left alone.
    SkippedAbsent,
    /// Fetching, resolving or writing this key failed.
    Failed(KeyFailure),
}

/// One restore row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreRow {
    pub key: String,
    #[serde(flatten)]
    pub outcome: RestoreOutcome,
}

impl RestoreRow {
    /// Whether the key was written.
    pub fn is_restored(&self) -> bool {
        matches!(self.outcome, RestoreOutcome::Restored { .. })
    }

    /// Whether the key failed.
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, RestoreOutcome::Failed(_))
    }
}

/// Rows of a batch operation.
///
/// Row order is unspecified. `interrupted` is set when cancellation or the
/// batch timeout stopped the run; `rows` then holds only finished keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport<T> {
    pub rows: Vec<T>,
    pub interrupted: bool,
    /// Number of keys the walk found.
    pub total_keys: usize,
}

impl<T> BatchReport<T> {
    /// An empty, complete report.
    pub fn empty() -> Self {
        Self {
            rows: Vec::new(),
            interrupted: false,
            total_keys: 0,
        }
    }

    /// Whether every key produced a row.
    pub fn is_complete(&self) -> bool {
        !self.interrupted && self.rows.len() == self.total_keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_absent_row_is_marked() {
        let deleted_at = Utc.timestamp_opt(200, 0).unwrap();
        let row = PreviewRow::from(&ResolvedState::absent("/p", Some(deleted_at)));
        assert!(row.was_absent_at_time);
        assert!(row.value.is_none());
        assert_eq!(row.change_timestamp, Some(deleted_at));
    }

    #[test]
    fn test_restore_row_serialization() {
        let row = RestoreRow {
            key: "/p".into(),
            outcome: RestoreOutcome::SkippedAbsent,
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["outcome"], "skipped_absent");
        assert_eq!(json["key"], "/p");
    }

    #[test]
    fn test_failure_from_error() {
        let failure = KeyFailure::from(&RewindError::store("boom"));
        assert_eq!(failure.code, ErrorCode::StoreOperationFailed);
        assert!(failure.to_string().starts_with("[STORE_001]"));
    }
}
