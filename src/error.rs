use thiserror::Error;

use rusqlite::ErrorCode;

#[derive(Debug, Error)]
pub enum CacheDbError {
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Corrupted store: {0}")]
    CorruptedStore(String),

    #[error("Store busy: {0}")]
    Contention(String),

    #[error("Invalid version value: {version} > the latest {latest}")]
    InvalidVersion { version: i64, latest: i64 },

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),
}

impl CacheDbError {
    /// Classify a raw `rusqlite` failure, splitting lock contention off from
    /// ordinary execution errors.
    #[must_use]
    pub fn from_sqlite(err: rusqlite::Error) -> Self {
        if is_busy(&err) {
            CacheDbError::Contention(err.to_string())
        } else {
            CacheDbError::SqliteError(err)
        }
    }

    /// True when another writer held the store past the busy timeout.
    #[must_use]
    pub fn is_contention(&self) -> bool {
        match self {
            CacheDbError::Contention(_) => true,
            CacheDbError::SqliteError(err) => is_busy(err),
            _ => false,
        }
    }

    /// True when the store should be rebuilt rather than retried.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, CacheDbError::CorruptedStore(_))
    }
}

pub(crate) fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}
