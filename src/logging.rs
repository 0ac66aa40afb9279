//! Subscriber setup. Logs go to stderr so command output stays parseable.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ConfigError;

/// Installs the global `fmt` subscriber filtered by `level` (an `EnvFilter`
/// directive such as `info` or `spawnfilter=debug,tower_http=info`).
pub fn init_logging(level: &str) -> Result<(), ConfigError> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level)
                .map_err(|e| ConfigError::Logging(format!("invalid log level: {e}")))?,
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| ConfigError::Logging("logging already initialized".into()))
}

/// Installs a subscriber from `RUST_LOG` (default `info`) when none is set.
/// Returns whether this call installed it.
pub fn install_default_subscriber() -> bool {
    if tracing::dispatcher::has_been_set() {
        return false;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
