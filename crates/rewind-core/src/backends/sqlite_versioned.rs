//! SQLite-backed versioned object store.
//!
//! Every write appends a row; nothing is ever updated or removed. The row's
//! autoincrement sequence is the version's ordinal. Listings come back newest
//! first within a key, the way object stores list versions, so callers get no
//! chronological ordering for free.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::{RewindError, RewindResult};
use crate::traits::{VersionPage, VersionedStore};
use crate::types::{etag, VersionMetadata, VersionRecord};

/// Versioned store kept in a SQLite database, namespaced by bucket.
pub struct SqliteVersionedStore {
    conn: Mutex<Connection>,
    bucket: String,
}

impl SqliteVersionedStore {
    /// Open (or create) a store at the given path.
    pub fn new(path: impl AsRef<Path>, bucket: impl Into<String>) -> RewindResult<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, bucket.into())
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory(bucket: impl Into<String>) -> RewindResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, bucket.into())
    }

    fn with_connection(conn: Connection, bucket: String) -> RewindResult<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            bucket,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Namespace this store writes to.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn conn(&self) -> RewindResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RewindError::Internal("versioned store connection poisoned".into()))
    }

    fn init_schema(&self) -> RewindResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS versions (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                bucket TEXT NOT NULL,
                key TEXT NOT NULL,
                version_id TEXT NOT NULL UNIQUE,
                body TEXT,
                tags TEXT NOT NULL,
                etag TEXT,
                is_delete_marker INTEGER NOT NULL DEFAULT 0,
                stored_at TEXT NOT NULL
            );

            -- Listing by key prefix
            CREATE INDEX IF NOT EXISTS idx_versions_bucket_key
                ON versions(bucket, key, seq DESC);
        "#,
        )?;
        Ok(())
    }

    fn insert(
        &self,
        key: &str,
        body: Option<&str>,
        metadata: &VersionMetadata,
    ) -> RewindResult<String> {
        let version_id = Uuid::new_v4().to_string();
        let tags = serde_json::to_string(&metadata.to_tags())?;
        let conn = self.conn()?;
        conn.execute(
            r#"INSERT INTO versions
               (bucket, key, version_id, body, tags, etag, is_delete_marker, stored_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                self.bucket,
                key,
                version_id,
                body,
                tags,
                body.map(etag),
                body.is_none(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(version_id)
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
        Ok(RawRow {
            seq: row.get(0)?,
            key: row.get(1)?,
            version_id: row.get(2)?,
            tags: row.get(3)?,
            etag: row.get(4)?,
            is_delete_marker: row.get(5)?,
        })
    }
}

struct RawRow {
    seq: i64,
    key: String,
    version_id: String,
    tags: String,
    etag: Option<String>,
    is_delete_marker: bool,
}

impl RawRow {
    fn into_record(self) -> RewindResult<VersionRecord> {
        let tags: HashMap<String, String> = serde_json::from_str(&self.tags)?;
        Ok(VersionRecord {
            key: self.key,
            version_id: self.version_id,
            ordinal: self.seq as u64,
            metadata: VersionMetadata::from_tags(&tags)?,
            is_delete_marker: self.is_delete_marker,
            etag: self.etag,
            value: None,
        })
    }
}

fn encode_cursor(seq: i64, key: &str) -> String {
    format!("{}:{}", seq, key)
}

fn decode_cursor(cursor: &str) -> RewindResult<(i64, &str)> {
    let (seq, key) = cursor
        .split_once(':')
        .ok_or_else(|| RewindError::validation(format!("invalid listing cursor '{}'", cursor)))?;
    let seq = seq
        .parse()
        .map_err(|_| RewindError::validation(format!("invalid listing cursor '{}'", cursor)))?;
    Ok((seq, key))
}

#[async_trait]
impl VersionedStore for SqliteVersionedStore {
    async fn put_version(
        &self,
        key: &str,
        body: &str,
        metadata: &VersionMetadata,
    ) -> RewindResult<String> {
        self.insert(key, Some(body), metadata)
    }

    async fn put_delete_marker(
        &self,
        key: &str,
        metadata: &VersionMetadata,
    ) -> RewindResult<String> {
        self.insert(key, None, metadata)
    }

    async fn list_versions(
        &self,
        prefix: &str,
        cursor: Option<String>,
        page_size: usize,
    ) -> RewindResult<VersionPage> {
        let (after_seq, after_key) = match cursor.as_deref() {
            Some(c) => {
                let (seq, key) = decode_cursor(c)?;
                (Some(seq), Some(key.to_string()))
            }
            None => (None, None),
        };

        let rows: Vec<RawRow> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                r#"SELECT seq, key, version_id, tags, etag, is_delete_marker
                   FROM versions
                   WHERE bucket = ?1
                     AND substr(key, 1, length(?2)) = ?2
                     AND (?3 IS NULL OR key > ?3 OR (key = ?3 AND seq < ?4))
                   ORDER BY key ASC, seq DESC
                   LIMIT ?5"#,
            )?;
            let mapped = stmt.query_map(
                params![
                    self.bucket,
                    prefix,
                    after_key,
                    after_seq,
                    (page_size + 1) as i64
                ],
                Self::row_to_record,
            )?;
            mapped.collect::<Result<Vec<_>, _>>()?
        };

        let has_more = rows.len() > page_size;
        let mut entries = Vec::with_capacity(page_size.min(rows.len()));
        let mut next_cursor = None;
        for row in rows.into_iter().take(page_size) {
            if has_more {
                next_cursor = Some(encode_cursor(row.seq, &row.key));
            }
            entries.push(row.into_record()?);
        }
        if !has_more {
            next_cursor = None;
        }

        Ok(VersionPage {
            entries,
            next_cursor,
        })
    }

    async fn get_body(&self, key: &str, version_id: &str) -> RewindResult<String> {
        let conn = self.conn()?;
        let body: Option<Option<String>> = conn
            .query_row(
                "SELECT body FROM versions WHERE bucket = ?1 AND key = ?2 AND version_id = ?3",
                params![self.bucket, key, version_id],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(Some(body)) => Ok(body),
            _ => Err(RewindError::version_not_found(key, version_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValueType;
    use chrono::{DateTime, TimeZone};

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).unwrap()
    }

    async fn drain(store: &SqliteVersionedStore, prefix: &str, page_size: usize) -> Vec<VersionRecord> {
        let mut all = Vec::new();
        let mut cursor = None;
        loop {
            let page = store.list_versions(prefix, cursor, page_size).await.unwrap();
            all.extend(page.entries);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return all,
            }
        }
    }

    #[tokio::test]
    async fn test_put_and_list() {
        let store = SqliteVersionedStore::in_memory("test").unwrap();
        let meta = VersionMetadata::upsert(at(100), ValueType::String)
            .with_description(Some("first".into()));
        let id = store.put_version("/a", "v1", &meta).await.unwrap();
        store
            .put_delete_marker("/a", &VersionMetadata::deletion(at(200)))
            .await
            .unwrap();

        let entries = drain(&store, "/a", 10).await;
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_delete_marker);
        assert!(entries[0].ordinal > entries[1].ordinal);
        assert_eq!(entries[1].version_id, id);
        assert_eq!(entries[1].metadata, meta);
        assert_eq!(entries[1].etag.as_deref(), Some(etag("v1").as_str()));
        assert!(entries[1].value.is_none());

        assert_eq!(store.get_body("/a", &id).await.unwrap(), "v1");
    }

    #[tokio::test]
    async fn test_pagination_covers_everything_once() {
        let store = SqliteVersionedStore::in_memory("test").unwrap();
        for i in 0..7 {
            let key = format!("/p/{}", i % 3);
            store
                .put_version(&key, &i.to_string(), &VersionMetadata::upsert(at(i), ValueType::String))
                .await
                .unwrap();
        }

        let entries = drain(&store, "/p/", 2).await;
        assert_eq!(entries.len(), 7);
        let mut ordinals: Vec<u64> = entries.iter().map(|e| e.ordinal).collect();
        ordinals.sort();
        ordinals.dedup();
        assert_eq!(ordinals.len(), 7);
    }

    #[tokio::test]
    async fn test_buckets_are_isolated() {
        let store = SqliteVersionedStore::in_memory("one").unwrap();
        store
            .put_version("/a", "v", &VersionMetadata::upsert(at(1), ValueType::String))
            .await
            .unwrap();
        let page = store.list_versions("/b", None, 10).await.unwrap();
        assert!(page.entries.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_delete_marker_has_no_body() {
        let store = SqliteVersionedStore::in_memory("test").unwrap();
        let id = store
            .put_delete_marker("/a", &VersionMetadata::deletion(at(1)))
            .await
            .unwrap();
        let err = store.get_body("/a", &id).await.unwrap_err();
        assert!(matches!(err, RewindError::NotFound { .. }));
    }

    #[test]
    fn test_bad_cursor() {
        assert!(decode_cursor("nocolon").is_err());
        assert!(decode_cursor("x:/a").is_err());
        assert_eq!(decode_cursor("5:/a").unwrap(), (5, "/a"));
    }
}
