use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cachedb::CacheDb;
use crate::error::CacheDbError;

/// Path token for a private in-memory store.
pub const MEMORY_PATH: &str = ":memory:";
/// Milliseconds to wait on a locked store before failing with contention.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 10_000;
/// Stores with a smaller page size are rewritten once on open.
pub const MIN_PAGE_SIZE: i64 = 8192;
/// Page cache budget, in pages.
pub const DEFAULT_CACHE_SIZE: i64 = 10_000;
/// Newest schema version this code understands.
pub const LATEST_DB_VERSION: i64 = 29;

pub const VERSION_QUERY: &str = "SELECT value FROM MyInfo WHERE entry == 'version'";
pub const VERSION_UPDATE: &str = "UPDATE MyInfo SET value = ? WHERE entry == 'version'";

/// Cleanup run by `clean_db` when no housekeeping statements are configured.
pub const DEFAULT_HOUSEKEEPING: &[&str] = &[
    "DELETE FROM TorrentFiles WHERE torrent_id IN (SELECT torrent_id FROM CollectedTorrent)",
    "DELETE FROM Torrent WHERE name IS NULL \
     AND torrent_id NOT IN (SELECT torrent_id FROM _ChannelTorrents)",
];

/// Options for opening a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    pub db_path: String,
    /// Schema script run once when the store is created. Without one the
    /// store runs headless: no schema, version pinned to 1.
    pub bootstrap_script: Option<PathBuf>,
    pub busy_timeout_ms: u64,
    pub latest_version: i64,
    pub min_page_size: i64,
    pub cache_size: i64,
    pub show_sql: bool,
    pub housekeeping: Vec<String>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::new(MEMORY_PATH.to_owned())
    }
}

impl StoreOptions {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            db_path,
            bootstrap_script: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            latest_version: LATEST_DB_VERSION,
            min_page_size: MIN_PAGE_SIZE,
            cache_size: DEFAULT_CACHE_SIZE,
            show_sql: false,
            housekeeping: DEFAULT_HOUSEKEEPING
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
        }
    }

    #[must_use]
    pub fn with_bootstrap_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.bootstrap_script = Some(script.into());
        self
    }

    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.db_path == MEMORY_PATH
    }
}

/// Fluent builder for [`StoreOptions`].
#[derive(Debug, Clone)]
pub struct StoreOptionsBuilder {
    opts: StoreOptions,
}

impl StoreOptionsBuilder {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            opts: StoreOptions::new(db_path),
        }
    }

    #[must_use]
    pub fn bootstrap_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.opts.bootstrap_script = Some(script.into());
        self
    }

    #[must_use]
    pub fn busy_timeout_ms(mut self, busy_timeout_ms: u64) -> Self {
        self.opts.busy_timeout_ms = busy_timeout_ms;
        self
    }

    #[must_use]
    pub fn latest_version(mut self, latest_version: i64) -> Self {
        self.opts.latest_version = latest_version;
        self
    }

    #[must_use]
    pub fn min_page_size(mut self, min_page_size: i64) -> Self {
        self.opts.min_page_size = min_page_size;
        self
    }

    #[must_use]
    pub fn cache_size(mut self, cache_size: i64) -> Self {
        self.opts.cache_size = cache_size;
        self
    }

    #[must_use]
    pub fn show_sql(mut self, show_sql: bool) -> Self {
        self.opts.show_sql = show_sql;
        self
    }

    #[must_use]
    pub fn housekeeping<I, S>(mut self, statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.opts.housekeeping = statements.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn finish(self) -> StoreOptions {
        self.opts
    }

    /// Open the store: connection, pragmas, bootstrap and version read.
    ///
    /// # Errors
    ///
    /// Returns `CacheDbError` if the worker cannot start or opening fails.
    pub async fn build(self) -> Result<CacheDb, CacheDbError> {
        CacheDb::initialize(self.finish()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let opts: StoreOptions =
            serde_json::from_str(r#"{"db_path": "/tmp/x.sdb", "busy_timeout_ms": 50}"#).unwrap();
        assert_eq!(opts.db_path, "/tmp/x.sdb");
        assert_eq!(opts.busy_timeout_ms, 50);
        assert_eq!(opts.latest_version, LATEST_DB_VERSION);
        assert_eq!(opts.housekeeping.len(), DEFAULT_HOUSEKEEPING.len());
        assert!(opts.bootstrap_script.is_none());
    }

    #[test]
    fn builder_overrides() {
        let opts = StoreOptionsBuilder::new(MEMORY_PATH.into())
            .latest_version(3)
            .housekeeping(["DELETE FROM t"])
            .show_sql(true)
            .finish();
        assert!(opts.is_memory());
        assert_eq!(opts.latest_version, 3);
        assert_eq!(opts.housekeeping, vec!["DELETE FROM t".to_owned()]);
        assert!(opts.show_sql);
    }
}
