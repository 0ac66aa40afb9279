//! Per-user saved filter presets.
//!
//! Backups are opaque JSON documents stored in the local database. Size and
//! count limits are checked before anything is written.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::config::BackupLimits;
use crate::error::QueryError;
use crate::exec::LocalStore;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS backups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    data TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS backups_user ON backups (user_id);";

/// Backup failures.
#[derive(Debug, Error)]
pub enum BackupError {
    /// The serialized document exceeds the size limit.
    #[error("backup is {size} bytes, limit is {limit}")]
    TooLarge {
        /// Serialized size.
        size: usize,
        /// Configured limit.
        limit: usize,
    },
    /// The user already has the maximum number of backups.
    #[error("backup limit of {limit} reached")]
    LimitReached {
        /// Configured limit.
        limit: usize,
    },
    /// No backup with that id belongs to the user.
    #[error("backup not found")]
    NotFound,
    /// Storage failure.
    #[error(transparent)]
    Store(#[from] QueryError),
}

impl From<rusqlite::Error> for BackupError {
    fn from(err: rusqlite::Error) -> Self {
        BackupError::Store(QueryError::Sqlite(err))
    }
}

/// Document submitted by a user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackupInput {
    /// Display name.
    pub name: String,
    /// Saved filter state.
    pub data: Value,
}

/// Stored backup.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    /// Row id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Saved filter state.
    pub data: Value,
    /// Creation time, epoch seconds.
    pub created_at: i64,
    /// Last update, epoch seconds.
    pub updated_at: i64,
}

/// Listing entry without the document.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSummary {
    /// Row id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Creation time, epoch seconds.
    pub created_at: i64,
    /// Last update, epoch seconds.
    pub updated_at: i64,
}

/// Backup table over a local store.
#[derive(Clone)]
pub struct BackupStore {
    store: LocalStore,
    limits: BackupLimits,
}

impl BackupStore {
    /// Creates the table if needed.
    pub async fn open(store: LocalStore, limits: BackupLimits) -> Result<Self, BackupError> {
        store
            .with_connection(|conn| conn.execute_batch(SCHEMA).map_err(QueryError::from))
            .await?;
        info!(
            size_limit = limits.size_limit,
            count_limit = limits.count_limit,
            "backup table ready"
        );
        Ok(Self { store, limits })
    }

    /// Stores a new backup for `user`.
    pub async fn create(&self, user: &str, input: BackupInput) -> Result<Backup, BackupError> {
        let data = self.encode(&input.data)?;
        let limit = self.limits.count_limit;
        let user = user.to_owned();
        let created = self
            .store
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                let count: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM backups WHERE user_id = ?1",
                    params![user],
                    |row| row.get(0),
                )?;
                if usize::try_from(count).unwrap_or(usize::MAX) >= limit {
                    return Ok(None);
                }
                let ts = now();
                tx.execute(
                    "INSERT INTO backups (user_id, name, data, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?4)",
                    params![user, input.name, data, ts],
                )?;
                let id = tx.last_insert_rowid();
                let backup = fetch(&tx, &user, id)?;
                tx.commit()?;
                Ok(backup)
            })
            .await?;
        created.ok_or(BackupError::LimitReached { limit })
    }

    /// Replaces name and document of an existing backup.
    pub async fn update(
        &self,
        user: &str,
        id: i64,
        input: BackupInput,
    ) -> Result<Backup, BackupError> {
        let data = self.encode(&input.data)?;
        let user = user.to_owned();
        self.store
            .with_connection(move |conn| {
                let changed = conn.execute(
                    "UPDATE backups SET name = ?1, data = ?2, updated_at = ?3
                     WHERE id = ?4 AND user_id = ?5",
                    params![input.name, data, now(), id, user],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                fetch(conn, &user, id)
            })
            .await?
            .ok_or(BackupError::NotFound)
    }

    /// One backup of `user`.
    pub async fn get(&self, user: &str, id: i64) -> Result<Backup, BackupError> {
        let user = user.to_owned();
        self.store
            .with_connection(move |conn| fetch(conn, &user, id))
            .await?
            .ok_or(BackupError::NotFound)
    }

    /// Backups of `user` that still hold a document, oldest first.
    pub async fn list(&self, user: &str) -> Result<Vec<BackupSummary>, BackupError> {
        let user = user.to_owned();
        let summaries = self
            .store
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, created_at, updated_at FROM backups
                     WHERE user_id = ?1 AND data IS NOT NULL ORDER BY id",
                )?;
                let rows = stmt.query_map(params![user], |row| {
                    Ok(BackupSummary {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                })?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await?;
        Ok(summaries)
    }

    /// Deletes one backup of `user`.
    pub async fn delete(&self, user: &str, id: i64) -> Result<(), BackupError> {
        let user = user.to_owned();
        let removed = self
            .store
            .with_connection(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM backups WHERE id = ?1 AND user_id = ?2",
                    params![id, user],
                )?)
            })
            .await?;
        if removed == 0 {
            return Err(BackupError::NotFound);
        }
        Ok(())
    }

    fn encode(&self, data: &Value) -> Result<String, BackupError> {
        let encoded = serde_json::to_string(data).map_err(QueryError::from)?;
        if encoded.len() > self.limits.size_limit {
            return Err(BackupError::TooLarge {
                size: encoded.len(),
                limit: self.limits.size_limit,
            });
        }
        Ok(encoded)
    }
}

fn fetch(conn: &Connection, user: &str, id: i64) -> Result<Option<Backup>, QueryError> {
    conn.query_row(
        "SELECT id, name, data, created_at, updated_at FROM backups
         WHERE id = ?1 AND user_id = ?2",
        params![id, user],
        decode,
    )
    .optional()?
    .transpose()
}

fn decode(row: &Row<'_>) -> rusqlite::Result<Result<Backup, QueryError>> {
    let data: Option<String> = row.get(2)?;
    let data = match data.as_deref().map(serde_json::from_str::<Value>) {
        Some(Ok(value)) => value,
        Some(Err(err)) => return Ok(Err(err.into())),
        None => Value::Null,
    };
    Ok(Ok(Backup {
        id: row.get(0)?,
        name: row.get(1)?,
        data,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    }))
}

fn now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
