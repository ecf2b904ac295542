use thiserror::Error;

/// Errors produced by the cache layer.
///
/// Only [`StoreError::InvalidKey`] is meant to reach UI code; everything else
/// is swallowed by the best-effort store operations and logged.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the cache directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload could not be encoded to / decoded from JSON.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A key that must be non-empty was empty.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The blocking task running a storage operation panicked or was cancelled.
    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Collapse a fallible storage result into the documented safe default.
///
/// The cache is advisory: a degraded storage engine must never surface as a
/// UI error, so the failure is logged and `fallback` is returned instead.
pub(crate) fn best_effort<T>(
    store: &'static str,
    op: &'static str,
    result: Result<T>,
    fallback: T,
) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(store, op, error = %e, "cache operation failed");
            fallback
        }
    }
}
