use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::types::{ToSqlOutput, Value as SqliteValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags, ToSql};
use serde_json::{Map, Number, Value};
use tokio::task;
use tracing::{debug, warn};

use crate::compile::{RenderedSql, SelectQuery, SqlValue};
use crate::error::Result;

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(SqliteValue::Null),
            SqlValue::Int(value) => ToSqlOutput::Owned(SqliteValue::Integer(*value)),
            SqlValue::Float(value) => ToSqlOutput::Owned(SqliteValue::Real(*value)),
            SqlValue::Text(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
        })
    }
}

/// Shared SQLite connection. Statements run on the blocking pool.
#[derive(Clone)]
pub struct LocalStore {
    conn: Arc<Mutex<Connection>>,
    phase_timeout: Duration,
    query_debug: bool,
}

impl LocalStore {
    /// Opens (creating if needed) the database at `path`.
    pub fn open(path: &Path, phase_timeout: Duration, query_debug: bool) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(phase_timeout)?;
        Ok(Self::from_connection(conn, phase_timeout, query_debug))
    }

    /// Wraps an existing connection.
    pub fn from_connection(conn: Connection, phase_timeout: Duration, query_debug: bool) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            phase_timeout,
            query_debug,
        }
    }

    /// Runs `f` against the connection on the blocking pool.
    pub async fn with_connection<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await?
    }

    /// Runs a select and returns its rows as JSON objects. Failures and
    /// timeouts are logged and yield no rows.
    pub async fn fetch(&self, query: &SelectQuery) -> Vec<Value> {
        let rendered = query.render();
        if self.query_debug {
            debug!(sql = %rendered.sql, params = ?rendered.params, "local query");
        }
        let run = self.with_connection(move |conn| select_rows(conn, &rendered));
        match tokio::time::timeout(self.phase_timeout, run).await {
            Ok(Ok(rows)) => rows,
            Ok(Err(err)) => {
                warn!(error = %err, "local query failed");
                Vec::new()
            }
            Err(_) => {
                warn!(timeout_ms = self.phase_timeout.as_millis() as u64, "local query timed out");
                Vec::new()
            }
        }
    }
}

/// Executes `rendered` and converts every row into a JSON object keyed by
/// column name. A later column with the same name overwrites an earlier one.
pub fn select_rows(conn: &Connection, rendered: &RenderedSql) -> Result<Vec<Value>> {
    let mut stmt = conn.prepare(&rendered.sql)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(params_from_iter(rendered.params.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut object = Map::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            object.insert(name.clone(), to_json(row.get_ref(idx)?));
        }
        out.push(Value::Object(object));
    }
    Ok(out)
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(int) => Value::from(int),
        ValueRef::Real(real) => Number::from_f64(real).map_or(Value::Null, Value::Number),
        ValueRef::Text(text) | ValueRef::Blob(text) => {
            Value::String(String::from_utf8_lossy(text).into_owned())
        }
    }
}
