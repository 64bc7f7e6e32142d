//! Factory for opening the configured stores.

use std::path::Path;
use std::sync::Arc;

use crate::backends::{SqliteLiveStore, SqliteVersionedStore};
use crate::config::RewindConfig;
use crate::error::RewindResult;
use crate::traits::{LiveStore, VersionedStore};

/// Both stores an engine or writer needs.
#[derive(Clone)]
pub struct Stores {
    pub versioned: Arc<dyn VersionedStore>,
    pub live: Arc<dyn LiveStore>,
}

/// Factory for creating store handles.
pub struct StoreFactory;

impl StoreFactory {
    /// Open the versioned and live stores named by `config`, creating
    /// parent directories as needed.
    pub fn open(config: &RewindConfig) -> RewindResult<Stores> {
        Ok(Stores {
            versioned: Self::open_versioned(config)?,
            live: Self::open_live(config)?,
        })
    }

    /// Open the versioned store.
    pub fn open_versioned(config: &RewindConfig) -> RewindResult<Arc<dyn VersionedStore>> {
        ensure_parent(&config.versioned_db_path)?;
        let store = SqliteVersionedStore::new(&config.versioned_db_path, config.bucket.clone())?;
        tracing::debug!(
            "Opened versioned store {} (bucket {})",
            config.versioned_db_path.display(),
            config.bucket
        );
        Ok(Arc::new(store))
    }

    /// Open the live store.
    pub fn open_live(config: &RewindConfig) -> RewindResult<Arc<dyn LiveStore>> {
        ensure_parent(&config.live_db_path)?;
        let store = SqliteLiveStore::new(&config.live_db_path)?;
        tracing::debug!("Opened live store {}", config.live_db_path.display());
        Ok(Arc::new(store))
    }

    /// In-memory stores (for testing)
    pub fn in_memory(config: &RewindConfig) -> RewindResult<Stores> {
        Ok(Stores {
            versioned: Arc::new(SqliteVersionedStore::in_memory(config.bucket.clone())?),
            live: Arc::new(SqliteLiveStore::in_memory()?),
        })
    }
}

fn ensure_parent(path: &Path) -> RewindResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ValueType, VersionMetadata};
    use chrono::Utc;

    #[tokio::test]
    async fn test_open_on_disk_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let config = RewindConfig::builder()
            .versioned_db_path(dir.path().join("nested/versions.db"))
            .live_db_path(dir.path().join("nested/live.db"))
            .build()
            .unwrap();

        let stores = StoreFactory::open(&config).unwrap();
        let id = stores
            .versioned
            .put_version("/k", "v", &VersionMetadata::upsert(Utc::now(), ValueType::String))
            .await
            .unwrap();
        assert_eq!(stores.versioned.get_body("/k", &id).await.unwrap(), "v");
        assert!(dir.path().join("nested/versions.db").exists());
    }
}
