use std::fs;
use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::types::Value;

use crate::error::{CacheDbError, is_busy};
use crate::sqlite::config::{StoreOptions, VERSION_QUERY, VERSION_UPDATE};
use crate::sqlite::cursor::ContextId;

use super::{SharedVersion, StoreState};

/// Open the connection, apply pragmas, bootstrap a new store and load its
/// schema version into `version`.
pub(crate) fn open_store(
    options: StoreOptions,
    version: SharedVersion,
) -> Result<StoreState, CacheDbError> {
    let is_new = is_new_store(&options)?;

    let conn = Connection::open(&options.db_path).map_err(|err| {
        CacheDbError::ConfigError(format!(
            "failed to open connection to {}: {err}",
            options.db_path
        ))
    })?;
    conn.busy_timeout(Duration::from_millis(options.busy_timeout_ms))
        .map_err(|err| open_failure("PRAGMA busy_timeout", err))?;
    tracing::info!(path = %options.db_path, is_new, "opened store");

    apply_pragmas(&conn, &options)?;

    if let Some(script) = &options.bootstrap_script {
        if is_new {
            run_bootstrap_script(&conn, script)?;
        }
        tracing::info!("reading database version");
        let current = read_version(&conn, options.latest_version)?;
        tracing::info!(version = current, "current database version");
        version.set(Some(current));
    } else {
        version.set(Some(1));
    }

    Ok(StoreState::new(conn, options, version))
}

fn is_new_store(options: &StoreOptions) -> Result<bool, CacheDbError> {
    if options.is_memory() {
        return Ok(true);
    }
    let path = Path::new(&options.db_path);
    if !path.exists() {
        return Ok(true);
    }
    if !path.is_file() {
        return Err(CacheDbError::ConfigError(format!(
            "not a file: {}",
            options.db_path
        )));
    }
    Ok(false)
}

/// Page size upgrade (first open only), durability and WAL.
fn apply_pragmas(conn: &Connection, options: &StoreOptions) -> Result<(), CacheDbError> {
    let page_size: i64 = conn
        .query_row("PRAGMA page_size", [], |row| row.get(0))
        .map_err(|err| open_failure("PRAGMA page_size", err))?;
    if page_size < options.min_page_size {
        // journal_mode and page_size only need to change once; the VACUUM
        // rewrites the whole file.
        tracing::info!(from = page_size, to = options.min_page_size, "begin page_size upgrade");
        run_open_sql(
            conn,
            &format!(
                "PRAGMA journal_mode = DELETE; PRAGMA page_size = {}; VACUUM;",
                options.min_page_size
            ),
        )?;
        tracing::info!("end page_size upgrade");
    }

    run_open_sql(
        conn,
        &format!(
            "PRAGMA synchronous = NORMAL; PRAGMA cache_size = {};",
            options.cache_size
        ),
    )?;
    // WAL is not guaranteed to survive the upgrade above; set it every time.
    run_open_sql(conn, "PRAGMA journal_mode = WAL;")
}

fn run_bootstrap_script(conn: &Connection, script: &Path) -> Result<(), CacheDbError> {
    tracing::info!(script = %script.display(), "initializing new database");
    if !script.exists() {
        return Err(CacheDbError::ConfigError(format!(
            "SQL script doesn't exist: {}",
            script.display()
        )));
    }
    if !script.is_file() {
        return Err(CacheDbError::ConfigError(format!(
            "SQL script is not a file: {}",
            script.display()
        )));
    }
    let sql = fs::read_to_string(script).map_err(|err| {
        CacheDbError::ConfigError(format!(
            "failed to load SQL script {}: {err}",
            script.display()
        ))
    })?;
    run_open_sql(conn, &sql)
}

fn run_open_sql(conn: &Connection, sql: &str) -> Result<(), CacheDbError> {
    conn.execute_batch(sql).map_err(|err| open_failure(sql, err))
}

/// Log a failure on the open path with its statement and classify it.
fn open_failure(sql: &str, err: rusqlite::Error) -> CacheDbError {
    if is_busy(&err) {
        tracing::error!(sql, error = %err, "busy lock while opening store");
    } else {
        tracing::error!(sql, error = %err, "failed to prepare store");
    }
    CacheDbError::from_sqlite(err)
}

fn read_version(conn: &Connection, latest: i64) -> Result<i64, CacheDbError> {
    let raw: Value = conn
        .query_row(VERSION_QUERY, [], |row| row.get(0))
        .map_err(|err| {
            CacheDbError::CorruptedStore(format!("failed to load database version: {err}"))
        })?;
    let version = match raw {
        Value::Integer(i) => i,
        Value::Text(text) => text.trim().parse::<i64>().map_err(|err| {
            CacheDbError::CorruptedStore(format!("unparsable database version {text:?}: {err}"))
        })?,
        other => {
            return Err(CacheDbError::CorruptedStore(format!(
                "unexpected database version value {other:?}"
            )));
        }
    };
    if version > latest {
        return Err(CacheDbError::CorruptedStore(format!(
            "database version {version} is newer than the latest known {latest}"
        )));
    }
    Ok(version)
}

impl StoreState {
    /// Store `version` in the metadata row, commit, and update the cache.
    pub(crate) fn write_version(
        &mut self,
        context: &ContextId,
        version: i64,
    ) -> Result<(), CacheDbError> {
        let latest = self.options.latest_version;
        if version > latest {
            return Err(CacheDbError::InvalidVersion { version, latest });
        }
        self.execute_write(context, VERSION_UPDATE, &[Value::Text(version.to_string())])?;
        self.commit(false, false)?;
        self.version.set(Some(version));
        Ok(())
    }

    /// Close every cursor, then the connection, and forget cached state.
    pub(crate) fn close(&mut self) -> Result<(), CacheDbError> {
        let Some(conn) = self.conn.take() else {
            return Err(CacheDbError::ConnectionError("store already closed".into()));
        };
        let cursors = self.cursors.close_all();
        tracing::info!(cursors, "closing store");
        self.tx = Default::default();
        self.version.set(None);
        conn.close().map_err(|(_conn, err)| {
            tracing::warn!(error = %err, "failed to close connection");
            CacheDbError::SqliteError(err)
        })
    }
}
