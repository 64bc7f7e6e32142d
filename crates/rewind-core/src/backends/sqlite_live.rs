//! SQLite-backed live parameter store.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use crate::error::{RewindError, RewindResult};
use crate::traits::{LiveParameter, LiveStore, ParameterPage, ParameterWrite};
use crate::types::{ValueType, SEPARATOR};

/// Hierarchical parameter store kept in a SQLite database.
///
/// Modification times have one-second granularity.
pub struct SqliteLiveStore {
    conn: Mutex<Connection>,
}

impl SqliteLiveStore {
    /// Open (or create) a store at the given path.
    pub fn new(path: impl AsRef<Path>) -> RewindResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> RewindResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> RewindResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RewindError::Internal("live store connection poisoned".into()))
    }

    fn init_schema(&self) -> RewindResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS parameters (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                value_type TEXT NOT NULL,
                description TEXT,
                last_modified INTEGER NOT NULL,
                revision INTEGER NOT NULL
            );
        "#,
        )?;
        Ok(())
    }

    fn row_to_parameter(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawParameter> {
        Ok(RawParameter {
            key: row.get(0)?,
            value: row.get(1)?,
            value_type: row.get(2)?,
            description: row.get(3)?,
            last_modified: row.get(4)?,
            revision: row.get(5)?,
        })
    }
}

struct RawParameter {
    key: String,
    value: String,
    value_type: String,
    description: Option<String>,
    last_modified: i64,
    revision: i64,
}

impl RawParameter {
    fn into_parameter(self) -> RewindResult<LiveParameter> {
        let value_type = ValueType::from_str(&self.value_type).map_err(|_| {
            RewindError::store(format!(
                "{} has unknown value type {}",
                self.key, self.value_type
            ))
        })?;
        Ok(LiveParameter {
            last_modified: from_unix(self.last_modified)?,
            key: self.key,
            value: self.value,
            value_type,
            description: self.description,
            revision: self.revision as u64,
        })
    }
}

fn from_unix(seconds: i64) -> RewindResult<DateTime<Utc>> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| RewindError::store(format!("modification time out of range: {}", seconds)))
}

#[async_trait]
impl LiveStore for SqliteLiveStore {
    async fn get_parameter(&self, key: &str) -> RewindResult<Option<LiveParameter>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                r#"SELECT key, value, value_type, description, last_modified, revision
                   FROM parameters WHERE key = ?1"#,
                params![key],
                Self::row_to_parameter,
            )
            .optional()?;
        raw.map(RawParameter::into_parameter).transpose()
    }

    async fn get_parameters_by_path(
        &self,
        path: &str,
        recursive: bool,
        cursor: Option<String>,
        page_size: usize,
    ) -> RewindResult<ParameterPage> {
        if !path.ends_with(SEPARATOR) {
            return Err(RewindError::validation_with_suggestion(
                format!("path '{}' must end with '{}'", path, SEPARATOR),
                format!("Use '{}{}'", path, SEPARATOR),
            ));
        }

        let rows: Vec<RawParameter> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                r#"SELECT key, value, value_type, description, last_modified, revision
                   FROM parameters
                   WHERE substr(key, 1, length(?1)) = ?1
                     AND (?2 OR instr(substr(key, length(?1) + 1), '/') = 0)
                     AND (?3 IS NULL OR key > ?3)
                   ORDER BY key ASC
                   LIMIT ?4"#,
            )?;
            let mapped = stmt.query_map(
                params![path, recursive, cursor, (page_size + 1) as i64],
                Self::row_to_parameter,
            )?;
            mapped.collect::<Result<Vec<_>, _>>()?
        };

        let has_more = rows.len() > page_size;
        let parameters = rows
            .into_iter()
            .take(page_size)
            .map(RawParameter::into_parameter)
            .collect::<RewindResult<Vec<_>>>()?;
        let next_cursor = if has_more {
            parameters.last().map(|p| p.key.clone())
        } else {
            None
        };

        Ok(ParameterPage {
            parameters,
            next_cursor,
        })
    }

    async fn put_parameter(&self, write: &ParameterWrite, overwrite: bool) -> RewindResult<u64> {
        let conn = self.conn()?;
        let current: Option<i64> = conn
            .query_row(
                "SELECT revision FROM parameters WHERE key = ?1",
                params![write.key],
                |row| row.get(0),
            )
            .optional()?;

        if current.is_some() && !overwrite {
            return Err(RewindError::validation(format!(
                "parameter {} already exists",
                write.key
            )));
        }

        let revision = current.unwrap_or(0) + 1;
        conn.execute(
            r#"INSERT INTO parameters (key, value, value_type, description, last_modified, revision)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)
               ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   value_type = excluded.value_type,
                   description = excluded.description,
                   last_modified = excluded.last_modified,
                   revision = excluded.revision"#,
            params![
                write.key,
                write.value,
                write.value_type.as_str(),
                write.description,
                Utc::now().timestamp(),
                revision,
            ],
        )?;
        Ok(revision as u64)
    }

    async fn delete_parameter(&self, key: &str) -> RewindResult<bool> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM parameters WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }
}
