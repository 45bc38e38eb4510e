//! Owner of the single physical connection and everything tied to its
//! lifetime: cursors, transaction state and the cached schema version.
//!
//! A [`StoreState`] lives on the worker thread only.

mod core;
mod dml;
mod select;

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::error::CacheDbError;

use super::config::StoreOptions;
use super::cursor::{ContextId, Cursor, CursorRegistry};
use super::transaction::{TxState, TxStats};

pub(crate) use self::core::open_store;

/// Schema version cache readable from any thread without a round trip to
/// the worker.
#[derive(Debug, Clone, Default)]
pub struct SharedVersion(Arc<Mutex<Option<i64>>>);

impl SharedVersion {
    #[must_use]
    pub fn get(&self) -> Option<i64> {
        *self
            .0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub(crate) fn set(&self, version: Option<i64>) {
        *self
            .0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = version;
    }
}

pub(crate) struct StoreState {
    conn: Option<Connection>,
    cursors: CursorRegistry,
    tx: TxState,
    version: SharedVersion,
    options: StoreOptions,
    show_sql: bool,
}

impl StoreState {
    fn new(conn: Connection, options: StoreOptions, version: SharedVersion) -> Self {
        let show_sql = options.show_sql;
        Self {
            conn: Some(conn),
            cursors: CursorRegistry::new(),
            tx: TxState::default(),
            version,
            options,
            show_sql,
        }
    }

    pub(crate) fn conn(&self) -> Result<&Connection, CacheDbError> {
        self.conn
            .as_ref()
            .ok_or_else(|| CacheDbError::ConnectionError("store is closed".into()))
    }

    pub(crate) fn conn_mut(&mut self) -> Result<&mut Connection, CacheDbError> {
        self.conn
            .as_mut()
            .ok_or_else(|| CacheDbError::ConnectionError("store is closed".into()))
    }

    pub(crate) fn cursor(&self, context: &ContextId) -> Arc<Cursor> {
        self.cursors.get_handle(context)
    }

    #[cfg(test)]
    pub(crate) fn cursor_count(&self) -> usize {
        self.cursors.len()
    }

    pub(crate) fn set_show_sql(&mut self, show_sql: bool) {
        self.show_sql = show_sql;
    }

    pub(crate) fn tx_stats(&self) -> TxStats {
        self.tx.stats()
    }

    pub(crate) fn begin_initial(&mut self) -> Result<(), CacheDbError> {
        let conn = self
            .conn
            .as_ref()
            .ok_or_else(|| CacheDbError::ConnectionError("store is closed".into()))?;
        self.tx.begin_initial(conn)
    }

    pub(crate) fn commit(&mut self, vacuum: bool, exiting: bool) -> Result<(), CacheDbError> {
        let conn = self
            .conn
            .as_ref()
            .ok_or_else(|| CacheDbError::ConnectionError("store is closed".into()))?;
        self.tx.commit(conn, vacuum, exiting)
    }
}
