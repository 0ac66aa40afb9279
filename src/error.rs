//! Error types of the search core.

use thiserror::Error;

/// Result alias used across the compiler, executor and service layers.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Errors surfaced to callers of the entity search core.
///
/// Upstream failures (remote aggregator, SQLite execution) never appear here;
/// they are logged and degraded to empty results at the executor boundary.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Bounding box with inverted or non-finite corners.
    #[error("invalid bounding box: {0}")]
    InvalidBounds(String),
    /// Filter payload could not be interpreted.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    /// Local store failure outside of a scan (open, schema, backups).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// HTTP client could not be built.
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
    /// JSON encoding or decoding failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A blocking task panicked or was cancelled.
    #[error("internal task failure: {0}")]
    Join(#[from] tokio::task::JoinError),
    /// Configuration or reference data could not be loaded.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
    /// Neither a store nor a remote endpoint is configured.
    #[error("no backend configured")]
    NoBackend,
    /// Requested entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),
}

