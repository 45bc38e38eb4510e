//! Process-wide handle to one store.
//!
//! [`CacheDb`] is cheap to clone and safe to share across tasks and threads.
//! Every operation is sent to the worker thread that owns the connection, so
//! operations issued from one context run in issue order. Writes accumulate in
//! one long-lived transaction until [`CacheDb::commit_now`] (or a scheduled
//! commit) flushes them.

use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::types::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::builder::{Delete, Insert, InsertMany, Select, Update};
use crate::error::CacheDbError;
use crate::query::{BatchQuery, QueryAndParams};
use crate::results::{CustomDbRow, ResultSet};
use crate::sqlite::config::StoreOptions;
use crate::sqlite::connection::SharedVersion;
use crate::sqlite::cursor::ContextId;
use crate::sqlite::params::Params;
use crate::sqlite::transaction::TxStats;
use crate::sqlite::worker::{CacheDbWorker, Command, Reply};
use crate::types::RowValues;

/// Async handle to the store, bound to one calling context.
#[derive(Clone)]
pub struct CacheDb {
    worker: Arc<CacheDbWorker>,
    context: ContextId,
    version: SharedVersion,
    latest_version: i64,
    cancel: CancellationToken,
}

impl std::fmt::Debug for CacheDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheDb")
            .field("context", &self.context)
            .field("version", &self.version.get())
            .field("latest_version", &self.latest_version)
            .finish_non_exhaustive()
    }
}

impl CacheDb {
    /// Start the worker and open the store: connection, pragmas, schema
    /// bootstrap for new stores, and version read.
    ///
    /// # Errors
    /// `ConfigError` for an unusable path or bootstrap script,
    /// `CorruptedStore` for a missing, unparsable or too new version.
    pub async fn initialize(options: StoreOptions) -> Result<Self, CacheDbError> {
        let db = Self::spawn(&options)?;
        db.worker
            .request(
                |respond_to| Command::Open {
                    options,
                    respond_to,
                },
                "cachedb worker dropped while opening the store",
            )
            .await?;
        Ok(db)
    }

    fn spawn(options: &StoreOptions) -> Result<Self, CacheDbError> {
        let version = SharedVersion::default();
        let cancel = CancellationToken::new();
        let worker = CacheDbWorker::spawn(version.clone(), cancel.clone())?;
        Ok(Self {
            worker: Arc::new(worker),
            context: ContextId::main(),
            version,
            latest_version: options.latest_version,
            cancel,
        })
    }

    /// A handle sharing this store but executing under `context`.
    #[must_use]
    pub fn for_context(&self, context: impl Into<ContextId>) -> Self {
        Self {
            context: context.into(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn context(&self) -> &ContextId {
        &self.context
    }

    /// Synchronous view of this handle for plain threads.
    #[must_use]
    pub fn blocking(&self) -> BlockingCacheDb {
        BlockingCacheDb { inner: self.clone() }
    }

    /// Cached schema version; `None` once the store is closed.
    #[must_use]
    pub fn version(&self) -> Option<i64> {
        self.version.get()
    }

    #[must_use]
    pub fn latest_version(&self) -> i64 {
        self.latest_version
    }

    /// Open the long-lived write transaction. Call once after `initialize`.
    ///
    /// # Errors
    /// Fatal for the session when `BEGIN` fails.
    pub async fn initial_begin(&self) -> Result<(), CacheDbError> {
        self.worker
            .request(
                |respond_to| Command::InitialBegin { respond_to },
                "cachedb worker dropped during initial begin",
            )
            .await
    }

    /// Cancel queued detached work and scheduled commits, close every cursor
    /// and the connection, and stop the worker. Uncommitted writes are lost.
    ///
    /// # Errors
    /// `ConnectionError` when the store was already closed.
    pub async fn close(&self) -> Result<(), CacheDbError> {
        self.cancel.cancel();
        self.worker
            .request(
                |respond_to| Command::Close { respond_to },
                "cachedb worker dropped while closing",
            )
            .await
    }

    /// Persist a new schema version and commit immediately.
    ///
    /// # Errors
    /// `InvalidVersion` when `version` exceeds the latest known version.
    pub async fn write_version(&self, version: i64) -> Result<(), CacheDbError> {
        if version > self.latest_version {
            return Err(CacheDbError::InvalidVersion {
                version,
                latest: self.latest_version,
            });
        }
        self.worker
            .request(
                write_version_cmd(self.context.clone(), version),
                "cachedb worker dropped while writing the version",
            )
            .await
    }

    /// Commit pending writes, optionally vacuum, and begin a new transaction
    /// unless `exiting`.
    ///
    /// # Errors
    /// A failed `COMMIT` or `BEGIN` is fatal for the session.
    pub async fn commit_now(&self, vacuum: bool, exiting: bool) -> Result<(), CacheDbError> {
        self.worker
            .request(
                commit_cmd(vacuum, exiting),
                "cachedb worker dropped while committing",
            )
            .await
    }

    /// Queue a commit without waiting for it.
    ///
    /// # Errors
    /// `ConnectionError` when the worker is gone.
    pub fn commit_now_detached(&self, vacuum: bool, exiting: bool) -> Result<(), CacheDbError> {
        self.worker
            .dispatch_detached(commit_cmd(vacuum, exiting), "commit")
    }

    /// Commit after `delay` unless the store is closed first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule_commit(&self, delay: Duration) -> JoinHandle<()> {
        let worker = Arc::clone(&self.worker);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("scheduled commit cancelled");
                }
                () = tokio::time::sleep(delay) => {
                    if let Err(err) = worker.dispatch_detached(commit_cmd(false, false), "scheduled commit") {
                        tracing::warn!(error = %err, "failed to dispatch scheduled commit");
                    }
                }
            }
        })
    }

    /// Run the housekeeping deletes; with `vacuum` also commit and compact.
    /// Returns the number of rows removed.
    ///
    /// # Errors
    /// The first failing statement's error: `Contention` when the store stays
    /// locked past the busy timeout, `SqliteError` otherwise.
    pub async fn clean_db(&self, vacuum: bool, exiting: bool) -> Result<usize, CacheDbError> {
        self.worker
            .request(
                clean_db_cmd(self.context.clone(), vacuum, exiting),
                "cachedb worker dropped while cleaning",
            )
            .await
    }

    /// Toggle logging of every statement with its parameters.
    ///
    /// # Errors
    /// `ConnectionError` when the store is not open.
    pub async fn set_show_sql(&self, show_sql: bool) -> Result<(), CacheDbError> {
        self.worker
            .request(
                |respond_to| Command::SetShowSql {
                    show_sql,
                    respond_to,
                },
                "cachedb worker dropped while toggling show_sql",
            )
            .await
    }

    /// Run a query and collect its rows. Never marks the store dirty.
    ///
    /// # Errors
    /// Propagates statement failures; `Contention` on a busy store.
    pub async fn execute_read(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, CacheDbError> {
        self.worker
            .request(
                read_cmd(self.context.clone(), sql, params),
                "cachedb worker dropped while executing read",
            )
            .await
    }

    /// Run a write inside the open transaction and return rows affected.
    ///
    /// # Errors
    /// Propagates statement failures; the store is marked dirty regardless.
    pub async fn execute_write(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<usize, CacheDbError> {
        self.worker
            .request(
                write_cmd(self.context.clone(), sql, params),
                "cachedb worker dropped while executing write",
            )
            .await
    }

    /// Queue a write without waiting; its failure is only logged.
    ///
    /// # Errors
    /// `ConnectionError` when the worker is gone.
    pub fn execute_write_detached(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<(), CacheDbError> {
        self.worker
            .dispatch_detached(write_cmd(self.context.clone(), sql, params), "write")
    }

    /// Run one statement for each parameter row.
    ///
    /// # Errors
    /// Stops at the first failing row.
    pub async fn execute_many(
        &self,
        sql: &str,
        rows: &[Vec<RowValues>],
    ) -> Result<usize, CacheDbError> {
        self.worker
            .request(
                write_many_cmd(self.context.clone(), sql, rows),
                "cachedb worker dropped while executing batch write",
            )
            .await
    }

    /// Run a parameterless multi-statement script inside the open transaction.
    ///
    /// # Errors
    /// Propagates the first failing statement.
    pub async fn execute_script(&self, sql: &str) -> Result<(), CacheDbError> {
        self.worker
            .request(
                script_cmd(self.context.clone(), sql),
                "cachedb worker dropped while executing script",
            )
            .await
    }

    /// # Errors
    /// `ParameterError` for an insert without values.
    pub async fn insert(&self, insert: Insert) -> Result<usize, CacheDbError> {
        let query = insert.build()?;
        self.execute_query(&query).await
    }

    /// # Errors
    /// `ParameterError` for an insert without values.
    pub async fn insert_or_ignore(&self, insert: Insert) -> Result<usize, CacheDbError> {
        self.insert(insert.or_ignore(true)).await
    }

    /// # Errors
    /// `ParameterError` for an empty or ragged batch.
    pub async fn insert_many(&self, insert: InsertMany) -> Result<usize, CacheDbError> {
        let batch = insert.build()?;
        self.execute_batch_query(&batch).await
    }

    /// # Errors
    /// `ParameterError` for an update without SET columns.
    pub async fn update(&self, update: Update) -> Result<usize, CacheDbError> {
        let query = update.build()?;
        self.execute_query(&query).await
    }

    /// # Errors
    /// `ParameterError` for a delete without filters.
    pub async fn delete(&self, delete: Delete) -> Result<usize, CacheDbError> {
        let query = delete.build()?;
        self.execute_query(&query).await
    }

    /// Run a built write statement.
    ///
    /// # Errors
    /// Propagates statement failures.
    pub async fn execute_query(&self, query: &QueryAndParams) -> Result<usize, CacheDbError> {
        self.execute_write(&query.query, &query.params).await
    }

    /// Run a built batch write.
    ///
    /// # Errors
    /// Propagates statement failures.
    pub async fn execute_batch_query(&self, batch: &BatchQuery) -> Result<usize, CacheDbError> {
        self.execute_many(&batch.query, &batch.rows).await
    }

    /// First row of the result, or `None`.
    ///
    /// # Errors
    /// Propagates statement failures.
    pub async fn fetch_one(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<Option<CustomDbRow>, CacheDbError> {
        self.worker
            .request(
                fetch_one_cmd(self.context.clone(), sql, params),
                "cachedb worker dropped while fetching one row",
            )
            .await
    }

    /// # Errors
    /// Propagates statement failures.
    pub async fn fetch_all(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<Vec<CustomDbRow>, CacheDbError> {
        Ok(self.execute_read(sql, params).await?.into_rows())
    }

    /// # Errors
    /// Propagates statement failures.
    pub async fn get_one(&self, select: Select) -> Result<Option<CustomDbRow>, CacheDbError> {
        let query = select.build();
        self.fetch_one(&query.query, &query.params).await
    }

    /// # Errors
    /// Propagates statement failures.
    pub async fn get_all(&self, select: Select) -> Result<Vec<CustomDbRow>, CacheDbError> {
        let query = select.build();
        self.fetch_all(&query.query, &query.params).await
    }

    /// Row count of `table`.
    ///
    /// # Errors
    /// Propagates statement failures (e.g. an unknown table).
    pub async fn size(&self, table: &str) -> Result<i64, CacheDbError> {
        self.worker
            .request(
                size_cmd(self.context.clone(), table),
                "cachedb worker dropped while counting rows",
            )
            .await
    }

    /// # Errors
    /// `ConnectionError` when the store is not open.
    pub async fn transaction_stats(&self) -> Result<TxStats, CacheDbError> {
        self.worker
            .request(
                |respond_to| Command::Stats { respond_to },
                "cachedb worker dropped while reading stats",
            )
            .await
    }

    /// Run `func` against the raw connection on the worker thread.
    ///
    /// Statements run this way bypass the cursor registry and do not mark the
    /// store dirty.
    ///
    /// # Errors
    /// Whatever `func` returns, or `ConnectionError` when the store is not open.
    pub async fn with_connection<F, R>(&self, func: F) -> Result<R, CacheDbError>
    where
        F: FnOnce(&mut Connection) -> Result<R, CacheDbError> + Send + 'static,
        R: Send + 'static,
    {
        self.worker.with_connection(func).await
    }
}

/// Synchronous twin of [`CacheDb`] for callers on plain threads.
///
/// Every call blocks the current thread until the worker replies, so it must
/// not be used from inside an async runtime.
#[derive(Clone, Debug)]
pub struct BlockingCacheDb {
    inner: CacheDb,
}

impl BlockingCacheDb {
    /// Blocking [`CacheDb::initialize`].
    ///
    /// # Errors
    /// Same as [`CacheDb::initialize`].
    pub fn initialize(options: StoreOptions) -> Result<Self, CacheDbError> {
        let inner = CacheDb::spawn(&options)?;
        inner.worker.request_blocking(
            |respond_to| Command::Open {
                options,
                respond_to,
            },
            "cachedb worker dropped while opening the store",
        )?;
        Ok(Self { inner })
    }

    /// The async handle this wraps.
    #[must_use]
    pub fn async_handle(&self) -> &CacheDb {
        &self.inner
    }

    #[must_use]
    pub fn for_context(&self, context: impl Into<ContextId>) -> Self {
        Self {
            inner: self.inner.for_context(context),
        }
    }

    #[must_use]
    pub fn context(&self) -> &ContextId {
        self.inner.context()
    }

    #[must_use]
    pub fn version(&self) -> Option<i64> {
        self.inner.version()
    }

    #[must_use]
    pub fn latest_version(&self) -> i64 {
        self.inner.latest_version()
    }

    /// # Errors
    /// Fatal for the session when `BEGIN` fails.
    pub fn initial_begin(&self) -> Result<(), CacheDbError> {
        self.inner.worker.request_blocking(
            |respond_to| Command::InitialBegin { respond_to },
            "cachedb worker dropped during initial begin",
        )
    }

    /// # Errors
    /// `ConnectionError` when the store was already closed.
    pub fn close(&self) -> Result<(), CacheDbError> {
        self.inner.cancel.cancel();
        self.inner.worker.request_blocking(
            |respond_to| Command::Close { respond_to },
            "cachedb worker dropped while closing",
        )
    }

    /// # Errors
    /// `InvalidVersion` when `version` exceeds the latest known version.
    pub fn write_version(&self, version: i64) -> Result<(), CacheDbError> {
        let latest = self.inner.latest_version;
        if version > latest {
            return Err(CacheDbError::InvalidVersion { version, latest });
        }
        self.inner.worker.request_blocking(
            write_version_cmd(self.inner.context.clone(), version),
            "cachedb worker dropped while writing the version",
        )
    }

    /// # Errors
    /// A failed `COMMIT` or `BEGIN` is fatal for the session.
    pub fn commit_now(&self, vacuum: bool, exiting: bool) -> Result<(), CacheDbError> {
        self.inner.worker.request_blocking(
            commit_cmd(vacuum, exiting),
            "cachedb worker dropped while committing",
        )
    }

    /// # Errors
    /// `ConnectionError` when the worker is gone.
    pub fn commit_now_detached(&self, vacuum: bool, exiting: bool) -> Result<(), CacheDbError> {
        self.inner.commit_now_detached(vacuum, exiting)
    }

    /// # Errors
    /// `Contention` when the store stays locked past the busy timeout.
    pub fn clean_db(&self, vacuum: bool, exiting: bool) -> Result<usize, CacheDbError> {
        self.inner.worker.request_blocking(
            clean_db_cmd(self.inner.context.clone(), vacuum, exiting),
            "cachedb worker dropped while cleaning",
        )
    }

    /// # Errors
    /// Propagates statement failures.
    pub fn execute_read(&self, sql: &str, params: &[RowValues]) -> Result<ResultSet, CacheDbError> {
        self.inner.worker.request_blocking(
            read_cmd(self.inner.context.clone(), sql, params),
            "cachedb worker dropped while executing read",
        )
    }

    /// # Errors
    /// Propagates statement failures.
    pub fn execute_write(&self, sql: &str, params: &[RowValues]) -> Result<usize, CacheDbError> {
        self.inner.worker.request_blocking(
            write_cmd(self.inner.context.clone(), sql, params),
            "cachedb worker dropped while executing write",
        )
    }

    /// # Errors
    /// `ConnectionError` when the worker is gone.
    pub fn execute_write_detached(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<(), CacheDbError> {
        self.inner.execute_write_detached(sql, params)
    }

    /// # Errors
    /// Stops at the first failing row.
    pub fn execute_many(&self, sql: &str, rows: &[Vec<RowValues>]) -> Result<usize, CacheDbError> {
        self.inner.worker.request_blocking(
            write_many_cmd(self.inner.context.clone(), sql, rows),
            "cachedb worker dropped while executing batch write",
        )
    }

    /// # Errors
    /// Propagates the first failing statement.
    pub fn execute_script(&self, sql: &str) -> Result<(), CacheDbError> {
        self.inner.worker.request_blocking(
            script_cmd(self.inner.context.clone(), sql),
            "cachedb worker dropped while executing script",
        )
    }

    /// # Errors
    /// `ParameterError` for an insert without values.
    pub fn insert(&self, insert: Insert) -> Result<usize, CacheDbError> {
        let query = insert.build()?;
        self.execute_write(&query.query, &query.params)
    }

    /// # Errors
    /// `ParameterError` for an insert without values.
    pub fn insert_or_ignore(&self, insert: Insert) -> Result<usize, CacheDbError> {
        self.insert(insert.or_ignore(true))
    }

    /// # Errors
    /// `ParameterError` for an empty or ragged batch.
    pub fn insert_many(&self, insert: InsertMany) -> Result<usize, CacheDbError> {
        let batch = insert.build()?;
        self.execute_many(&batch.query, &batch.rows)
    }

    /// # Errors
    /// `ParameterError` for an update without SET columns.
    pub fn update(&self, update: Update) -> Result<usize, CacheDbError> {
        let query = update.build()?;
        self.execute_write(&query.query, &query.params)
    }

    /// # Errors
    /// `ParameterError` for a delete without filters.
    pub fn delete(&self, delete: Delete) -> Result<usize, CacheDbError> {
        let query = delete.build()?;
        self.execute_write(&query.query, &query.params)
    }

    /// # Errors
    /// Propagates statement failures.
    pub fn fetch_one(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<Option<CustomDbRow>, CacheDbError> {
        self.inner.worker.request_blocking(
            fetch_one_cmd(self.inner.context.clone(), sql, params),
            "cachedb worker dropped while fetching one row",
        )
    }

    /// # Errors
    /// Propagates statement failures.
    pub fn fetch_all(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<Vec<CustomDbRow>, CacheDbError> {
        Ok(self.execute_read(sql, params)?.into_rows())
    }

    /// # Errors
    /// Propagates statement failures.
    pub fn get_one(&self, select: Select) -> Result<Option<CustomDbRow>, CacheDbError> {
        let query = select.build();
        self.fetch_one(&query.query, &query.params)
    }

    /// # Errors
    /// Propagates statement failures.
    pub fn get_all(&self, select: Select) -> Result<Vec<CustomDbRow>, CacheDbError> {
        let query = select.build();
        self.fetch_all(&query.query, &query.params)
    }

    /// # Errors
    /// Propagates statement failures.
    pub fn size(&self, table: &str) -> Result<i64, CacheDbError> {
        self.inner.worker.request_blocking(
            size_cmd(self.inner.context.clone(), table),
            "cachedb worker dropped while counting rows",
        )
    }

    /// # Errors
    /// `ConnectionError` when the store is not open.
    pub fn transaction_stats(&self) -> Result<TxStats, CacheDbError> {
        self.inner.worker.request_blocking(
            |respond_to| Command::Stats { respond_to },
            "cachedb worker dropped while reading stats",
        )
    }
}

fn to_values(params: &[RowValues]) -> Vec<Value> {
    Params::convert(params).0
}

fn read_cmd(
    context: ContextId,
    sql: &str,
    params: &[RowValues],
) -> impl FnOnce(Reply<ResultSet>) -> Command {
    let sql = sql.to_owned();
    let params = to_values(params);
    move |respond_to| Command::Read {
        context,
        sql,
        params,
        respond_to,
    }
}

fn fetch_one_cmd(
    context: ContextId,
    sql: &str,
    params: &[RowValues],
) -> impl FnOnce(Reply<Option<CustomDbRow>>) -> Command {
    let sql = sql.to_owned();
    let params = to_values(params);
    move |respond_to| Command::FetchOne {
        context,
        sql,
        params,
        respond_to,
    }
}

fn write_cmd(
    context: ContextId,
    sql: &str,
    params: &[RowValues],
) -> impl FnOnce(Reply<usize>) -> Command {
    let sql = sql.to_owned();
    let params = to_values(params);
    move |respond_to| Command::Write {
        context,
        sql,
        params,
        respond_to,
    }
}

fn write_many_cmd(
    context: ContextId,
    sql: &str,
    rows: &[Vec<RowValues>],
) -> impl FnOnce(Reply<usize>) -> Command {
    let sql = sql.to_owned();
    let rows: Vec<Vec<Value>> = rows.iter().map(|row| to_values(row)).collect();
    move |respond_to| Command::WriteMany {
        context,
        sql,
        rows,
        respond_to,
    }
}

fn script_cmd(context: ContextId, sql: &str) -> impl FnOnce(Reply<()>) -> Command {
    let sql = sql.to_owned();
    move |respond_to| Command::Script {
        context,
        sql,
        respond_to,
    }
}

fn commit_cmd(vacuum: bool, exiting: bool) -> impl FnOnce(Reply<()>) -> Command {
    move |respond_to| Command::Commit {
        vacuum,
        exiting,
        respond_to,
    }
}

fn write_version_cmd(context: ContextId, version: i64) -> impl FnOnce(Reply<()>) -> Command {
    move |respond_to| Command::WriteVersion {
        context,
        version,
        respond_to,
    }
}

fn clean_db_cmd(
    context: ContextId,
    vacuum: bool,
    exiting: bool,
) -> impl FnOnce(Reply<usize>) -> Command {
    move |respond_to| Command::CleanDb {
        context,
        vacuum,
        exiting,
        respond_to,
    }
}

fn size_cmd(context: ContextId, table: &str) -> impl FnOnce(Reply<i64>) -> Command {
    let table = table.to_owned();
    move |respond_to| Command::Size {
        context,
        table,
        respond_to,
    }
}
