//! Per-context statement executors bound to the single connection.
//!
//! Callers identify themselves with an explicit [`ContextId`]; the registry
//! hands each context exactly one [`Cursor`] for the lifetime of the
//! connection.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use rusqlite::types::Value;

use crate::error::{CacheDbError, is_busy};
use crate::results::ResultSet;

use super::params::values_as_tosql;
use super::query::build_result_set;

/// Opaque identity of a calling execution context (thread, task, actor...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(Arc<str>);

impl ContextId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(Arc::from(id.into()))
    }

    /// The context a fresh `CacheDb` handle runs under.
    #[must_use]
    pub fn main() -> Self {
        Self::new("main")
    }

    /// Context named after the calling thread, for callers that want one
    /// cursor per OS thread.
    #[must_use]
    pub fn current_thread() -> Self {
        let thread = std::thread::current();
        match thread.name() {
            Some(name) => Self::new(name),
            None => Self::new(format!("{:?}", thread.id())),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::main()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContextId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ContextId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CursorId(pub u64);

impl fmt::Display for CursorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cursor-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct CursorState {
    closed: bool,
    executed: u64,
}

/// Statement executor owned by one context.
#[derive(Debug)]
pub struct Cursor {
    id: CursorId,
    context: ContextId,
    state: Mutex<CursorState>,
}

impl Cursor {
    fn new(id: CursorId, context: ContextId) -> Self {
        Self {
            id,
            context,
            state: Mutex::new(CursorState::default()),
        }
    }

    #[must_use]
    pub fn id(&self) -> CursorId {
        self.id
    }

    #[must_use]
    pub fn context(&self) -> &ContextId {
        &self.context
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock_state().closed
    }

    /// Statements run through this cursor so far.
    #[must_use]
    pub fn executed(&self) -> u64 {
        self.lock_state().executed
    }

    pub(crate) fn close(&self) {
        self.lock_state().closed = true;
    }

    /// Run a statement and collect its rows.
    pub(crate) fn query(
        &self,
        conn: &Connection,
        sql: &str,
        params: &[Value],
        show_sql: bool,
    ) -> Result<ResultSet, CacheDbError> {
        self.run(sql, params, show_sql, || {
            let mut stmt = conn.prepare_cached(sql)?;
            build_result_set(&mut stmt, params)
        })
    }

    /// Run a statement that returns no rows; yields the affected row count.
    pub(crate) fn execute(
        &self,
        conn: &Connection,
        sql: &str,
        params: &[Value],
        show_sql: bool,
    ) -> Result<usize, CacheDbError> {
        self.run(sql, params, show_sql, || {
            let mut stmt = conn.prepare_cached(sql)?;
            Ok(stmt.execute(&values_as_tosql(params)[..])?)
        })
    }

    /// Run one statement once per parameter row.
    pub(crate) fn execute_many(
        &self,
        conn: &Connection,
        sql: &str,
        rows: &[Vec<Value>],
        show_sql: bool,
    ) -> Result<usize, CacheDbError> {
        let flat: Vec<Value> = rows.iter().flatten().cloned().collect();
        self.run(sql, &flat, show_sql, || {
            let mut stmt = conn.prepare_cached(sql)?;
            let mut affected = 0;
            for row in rows {
                affected += stmt.execute(&values_as_tosql(row)[..])?;
            }
            Ok(affected)
        })
    }

    /// Run a semicolon-separated script without parameters.
    pub(crate) fn execute_script(
        &self,
        conn: &Connection,
        sql: &str,
        show_sql: bool,
    ) -> Result<(), CacheDbError> {
        self.run(sql, &[], show_sql, || Ok(conn.execute_batch(sql)?))
    }

    fn run<T>(
        &self,
        sql: &str,
        params: &[Value],
        show_sql: bool,
        action: impl FnOnce() -> Result<T, CacheDbError>,
    ) -> Result<T, CacheDbError> {
        {
            let mut state = self.lock_state();
            if state.closed {
                return Err(CacheDbError::ConnectionError(format!(
                    "{} for context {} is closed",
                    self.id, self.context
                )));
            }
            state.executed += 1;
        }
        if show_sql {
            tracing::info!(context = %self.context, cursor = %self.id, sql, ?params, "execute");
        }
        action().map_err(|err| self.report(err, sql, params))
    }

    fn report(&self, err: CacheDbError, sql: &str, params: &[Value]) -> CacheDbError {
        match err {
            CacheDbError::SqliteError(inner) if is_busy(&inner) => {
                tracing::error!(context = %self.context, cursor = %self.id, error = %inner, "busy lock");
                CacheDbError::Contention(inner.to_string())
            }
            other => {
                tracing::error!(
                    context = %self.context,
                    cursor = %self.id,
                    sql,
                    ?params,
                    error = %other,
                    "statement failed"
                );
                other
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, CursorState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Context-to-cursor table.
#[derive(Debug, Default)]
pub struct CursorRegistry {
    table: Mutex<HashMap<ContextId, Arc<Cursor>>>,
    next_id: AtomicU64,
}

impl CursorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cursor of `context`, created on first use.
    ///
    /// Lookup and creation happen under one lock so two racing first calls
    /// for the same context get the same cursor.
    pub fn get_handle(&self, context: &ContextId) -> Arc<Cursor> {
        let mut table = self.lock_table();
        if let Some(cursor) = table.get(context) {
            return Arc::clone(cursor);
        }
        let id = CursorId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let cursor = Arc::new(Cursor::new(id, context.clone()));
        tracing::debug!(%context, cursor = %id, "created cursor");
        table.insert(context.clone(), Arc::clone(&cursor));
        cursor
    }

    #[must_use]
    pub fn contains(&self, context: &ContextId) -> bool {
        self.lock_table().contains_key(context)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_table().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_table().is_empty()
    }

    /// Close and forget every cursor; returns how many were closed.
    pub fn close_all(&self) -> usize {
        let mut table = self.lock_table();
        for cursor in table.values() {
            cursor.close();
        }
        let closed = table.len();
        table.clear();
        closed
    }

    fn lock_table(&self) -> MutexGuard<'_, HashMap<ContextId, Arc<Cursor>>> {
        self.table
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn same_context_same_cursor() {
        let registry = CursorRegistry::new();
        let a = registry.get_handle(&ContextId::new("a"));
        let again = registry.get_handle(&ContextId::new("a"));
        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn racing_first_access_never_shares_or_duplicates() {
        let registry = Arc::new(CursorRegistry::new());
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    // Pairs of threads race on the same context.
                    let context = ContextId::new(format!("ctx-{}", i / 2));
                    (context.clone(), registry.get_handle(&context).id())
                })
            })
            .collect();
        let results: Vec<(ContextId, CursorId)> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(registry.len(), 4);
        for (ctx_a, id_a) in &results {
            for (ctx_b, id_b) in &results {
                assert_eq!(ctx_a == ctx_b, id_a == id_b);
            }
        }
    }

    #[test]
    fn closed_cursors_refuse_work() {
        let conn = Connection::open_in_memory().unwrap();
        let registry = CursorRegistry::new();
        let cursor = registry.get_handle(&ContextId::main());
        cursor
            .execute_script(&conn, "CREATE TABLE t (a INTEGER)", false)
            .unwrap();
        assert_eq!(
            cursor
                .execute(&conn, "INSERT INTO t (a) VALUES (?)", &[Value::Integer(1)], false)
                .unwrap(),
            1
        );
        assert_eq!(cursor.executed(), 2);

        assert_eq!(registry.close_all(), 1);
        assert!(cursor.is_closed());
        assert!(registry.is_empty());
        let err = cursor
            .query(&conn, "SELECT a FROM t", &[], false)
            .unwrap_err();
        assert!(matches!(err, CacheDbError::ConnectionError(_)));

        // A new cursor replaces the closed one.
        let fresh = registry.get_handle(&ContextId::main());
        assert_ne!(fresh.id(), cursor.id());
        assert_eq!(fresh.query(&conn, "SELECT a FROM t", &[], false).unwrap().len(), 1);
    }

    #[test]
    fn execute_many_counts_every_row() {
        let conn = Connection::open_in_memory().unwrap();
        let cursor = CursorRegistry::new().get_handle(&ContextId::main());
        cursor
            .execute_script(&conn, "CREATE TABLE t (a INTEGER, b TEXT)", false)
            .unwrap();
        let rows = vec![
            vec![Value::Integer(1), Value::Text("x".into())],
            vec![Value::Integer(2), Value::Text("y".into())],
            vec![Value::Integer(3), Value::Text("z".into())],
        ];
        let affected = cursor
            .execute_many(&conn, "INSERT INTO t (a, b) VALUES (?, ?)", &rows, false)
            .unwrap();
        assert_eq!(affected, 3);
    }

    #[test]
    fn execution_errors_propagate_unchanged() {
        let conn = Connection::open_in_memory().unwrap();
        let cursor = CursorRegistry::new().get_handle(&ContextId::main());
        let err = cursor
            .execute(&conn, "INSERT INTO missing (a) VALUES (1)", &[], false)
            .unwrap_err();
        assert!(matches!(err, CacheDbError::SqliteError(_)));
    }
}
