//! Query execution against the local store or the remote aggregator.
//!
//! Execution never fails from the caller's point of view: upstream errors,
//! timeouts and undecodable rows are logged and dropped, so a broken backend
//! degrades to an empty map instead of an error page.

mod local;
pub mod payload;
mod remote;

pub use local::{select_rows, LocalStore};
pub use remote::{RemoteClient, RemoteRequest, SECRET_HEADER};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::compile::SelectQuery;
use crate::config::Config;
use crate::error::{QueryError, Result};

/// A query in the form its backend understands.
#[derive(Clone, Debug, PartialEq)]
pub enum PreparedQuery {
    /// Compiled SQL for the local store.
    Sql(SelectQuery),
    /// HTTP call to the aggregator.
    Remote(RemoteRequest),
}

impl PreparedQuery {
    fn kind(&self) -> &'static str {
        match self {
            PreparedQuery::Sql(_) => "sql",
            PreparedQuery::Remote(_) => "remote",
        }
    }
}

/// Backend that answers entity queries.
#[derive(Clone)]
pub enum QueryTarget {
    /// Local SQLite database.
    Local(LocalStore),
    /// Remote aggregation service.
    Remote(RemoteClient),
}

impl QueryTarget {
    /// Builds the target named by configuration. Remote wins when both are
    /// configured.
    pub fn from_config(config: &Config) -> Result<Self> {
        if let Some(remote) = &config.remote {
            return Ok(QueryTarget::Remote(RemoteClient::new(
                remote,
                config.dev.query_debug,
            )?));
        }
        let path = config
            .store
            .path
            .as_deref()
            .ok_or(QueryError::NoBackend)?;
        Ok(QueryTarget::Local(LocalStore::open(
            path,
            config.limits.phase_timeout(),
            config.dev.query_debug,
        )?))
    }

    /// Whether this target is the remote aggregator.
    pub fn is_remote(&self) -> bool {
        matches!(self, QueryTarget::Remote(_))
    }

    /// Runs `query` and decodes each row. Rows that do not decode are
    /// skipped with a warning.
    pub async fn execute<T: DeserializeOwned>(&self, query: PreparedQuery) -> Vec<T> {
        let rows = match (self, query) {
            (QueryTarget::Local(store), PreparedQuery::Sql(select)) => store.fetch(&select).await,
            (QueryTarget::Remote(client), PreparedQuery::Remote(request)) => {
                rows_of(client.send(&request).await)
            }
            (_, query) => {
                warn!(kind = query.kind(), "query does not match the configured backend");
                return Vec::new();
            }
        };
        decode_rows(rows)
    }
}

/// A remote body is an array of rows, a single row, or nothing.
fn rows_of(body: Value) -> Vec<Value> {
    match body {
        Value::Array(rows) => rows,
        Value::Null => Vec::new(),
        row => vec![row],
    }
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                warn!(error = %err, "skipping undecodable row");
                None
            }
        })
        .collect()
}
