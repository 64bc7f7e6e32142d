//! Versioned object store trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RewindResult;
use crate::types::{VersionMetadata, VersionRecord};

/// One page of a version listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionPage {
    /// Versions without bodies, in the store's own order.
    pub entries: Vec<VersionRecord>,
    /// Cursor for the next page; `None` on the last page.
    pub next_cursor: Option<String>,
}

/// Backing store that keeps every write and delete of a key as a version.
///
/// Listing order is storage-internal. Callers must never treat it as
/// chronological.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VersionedStore: Send + Sync {
    /// Store a new version of `key` with `body` and metadata. Returns its version id.
    async fn put_version(
        &self,
        key: &str,
        body: &str,
        metadata: &VersionMetadata,
    ) -> RewindResult<String>;

    /// Store a delete marker for `key`. Returns its version id.
    async fn put_delete_marker(&self, key: &str, metadata: &VersionMetadata)
        -> RewindResult<String>;

    /// List versions of every key starting with `prefix`, one page at a time.
    async fn list_versions(
        &self,
        prefix: &str,
        cursor: Option<String>,
        page_size: usize,
    ) -> RewindResult<VersionPage>;

    /// Fetch the body of one version.
    async fn get_body(&self, key: &str, version_id: &str) -> RewindResult<String>;
}
