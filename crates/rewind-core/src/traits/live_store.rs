//! Live parameter store trait and related types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RewindResult;
use crate::types::ValueType;

/// A parameter as currently held by the live store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveParameter {
    pub key: String,
    pub value: String,
    pub value_type: ValueType,
    /// Server-side modification time.
    pub last_modified: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Live store's own revision counter for this key.
    pub revision: u64,
}

/// Upsert request for the live store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterWrite {
    pub key: String,
    pub value: String,
    pub value_type: ValueType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParameterWrite {
    /// Create a new write.
    pub fn new(key: impl Into<String>, value: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            value_type,
            description: None,
        }
    }

    /// Builder: set description
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

/// One page of a by-path listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterPage {
    pub parameters: Vec<LiveParameter>,
    pub next_cursor: Option<String>,
}

/// The mutable, hierarchical key-value store being protected.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LiveStore: Send + Sync {
    /// Get one parameter, or `None` if it does not exist.
    async fn get_parameter(&self, key: &str) -> RewindResult<Option<LiveParameter>>;

    /// List parameters under `path` (a prefix ending in `/`), one page at a time.
    async fn get_parameters_by_path(
        &self,
        path: &str,
        recursive: bool,
        cursor: Option<String>,
        page_size: usize,
    ) -> RewindResult<ParameterPage>;

    /// Create or overwrite a parameter. Returns the new revision.
    async fn put_parameter(&self, write: &ParameterWrite, overwrite: bool) -> RewindResult<u64>;

    /// Delete a parameter. Returns whether it existed.
    async fn delete_parameter(&self, key: &str) -> RewindResult<bool>;
}
