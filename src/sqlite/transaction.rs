//! The long-lived write transaction.
//!
//! Writes are batched into one explicit transaction that stays open between
//! commits. `commit` is a no-op unless a write was issued since the last one.

use rusqlite::Connection;

use crate::error::CacheDbError;

/// Counters kept by the coordinator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TxStats {
    /// COMMITs that flushed pending writes.
    pub commits: u64,
    /// BEGINs issued, the initial one included.
    pub begins: u64,
    pub vacuums: u64,
    /// Writes issued since the last commit.
    pub pending: bool,
}

#[derive(Debug, Default)]
pub(crate) struct TxState {
    should_commit: bool,
    stats: TxStats,
}

impl TxState {
    /// Record that a write is about to run. Set before execution so a failed
    /// write still forces the next commit.
    pub(crate) fn mark_dirty(&mut self) {
        self.should_commit = true;
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.should_commit
    }

    pub(crate) fn stats(&self) -> TxStats {
        TxStats {
            pending: self.is_pending(),
            ..self.stats
        }
    }

    /// Open the first transaction after bootstrap. A failure here means the
    /// store cannot take writes at all.
    pub(crate) fn begin_initial(&mut self, conn: &Connection) -> Result<(), CacheDbError> {
        tracing::info!("beginning the first transaction");
        self.begin(conn).inspect_err(|err| {
            tracing::error!(error = %err, "failed to begin the first transaction");
        })?;
        self.should_commit = false;
        Ok(())
    }

    /// Flush pending writes, optionally compact, and reopen a transaction
    /// unless the session is ending or none was open.
    pub(crate) fn commit(
        &mut self,
        conn: &Connection,
        vacuum: bool,
        exiting: bool,
    ) -> Result<(), CacheDbError> {
        if self.is_pending() {
            // Without an open transaction the writes are already durable and
            // there is nothing to reopen; `begin_initial` stays possible.
            let was_open = !conn.is_autocommit();
            if !was_open {
                tracing::debug!("no open transaction, pending writes are already durable");
            } else {
                tracing::info!("committing");
                conn.execute_batch("COMMIT;")
                    .map_err(|err| {
                        tracing::error!(error = %err, "COMMIT failed");
                        CacheDbError::from_sqlite(err)
                    })?;
                self.stats.commits += 1;
            }
            self.should_commit = false;

            if vacuum {
                self.vacuum(conn)?;
            }
            if exiting {
                tracing::info!("exiting, not beginning another transaction");
            } else if was_open {
                tracing::info!("beginning another transaction");
                self.begin(conn).inspect_err(|err| {
                    tracing::error!(error = %err, "failed to execute BEGIN");
                })?;
            }
        } else if vacuum {
            // VACUUM cannot run inside a transaction; close the empty one
            // around it.
            let reopen = !conn.is_autocommit();
            if reopen {
                conn.execute_batch("COMMIT;")
                    .map_err(CacheDbError::from_sqlite)?;
            }
            self.vacuum(conn)?;
            if reopen && !exiting {
                self.begin(conn)?;
            }
        }
        Ok(())
    }

    fn begin(&mut self, conn: &Connection) -> Result<(), CacheDbError> {
        conn.execute_batch("BEGIN;")
            .map_err(CacheDbError::from_sqlite)?;
        self.stats.begins += 1;
        Ok(())
    }

    fn vacuum(&mut self, conn: &Connection) -> Result<(), CacheDbError> {
        tracing::info!("vacuuming");
        conn.execute_batch("VACUUM;")
            .map_err(CacheDbError::from_sqlite)?;
        self.stats.vacuums += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Connection, TxState) {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (a INTEGER)").unwrap();
        let mut tx = TxState::default();
        tx.begin_initial(&conn).unwrap();
        (conn, tx)
    }

    fn write(conn: &Connection, tx: &mut TxState, a: i64) {
        tx.mark_dirty();
        conn.execute("INSERT INTO t (a) VALUES (?1)", [a]).unwrap();
    }

    #[test]
    fn many_writes_one_commit_then_rebegin() {
        let (conn, mut tx) = setup();
        for a in 0..5 {
            write(&conn, &mut tx, a);
        }
        assert!(tx.is_pending());
        tx.commit(&conn, false, false).unwrap();

        let stats = tx.stats();
        assert_eq!(stats.commits, 1);
        assert_eq!(stats.begins, 2);
        assert!(!stats.pending);
        assert!(!conn.is_autocommit(), "a fresh transaction should be open");
    }

    #[test]
    fn commit_without_writes_is_a_noop() {
        let (conn, mut tx) = setup();
        tx.commit(&conn, false, false).unwrap();
        assert_eq!(tx.stats().commits, 0);
        assert_eq!(tx.stats().begins, 1);
    }

    #[test]
    fn exiting_leaves_no_transaction_open() {
        let (conn, mut tx) = setup();
        write(&conn, &mut tx, 1);
        tx.commit(&conn, false, true).unwrap();
        assert!(conn.is_autocommit());
        assert_eq!(tx.stats().begins, 1);
    }

    #[test]
    fn vacuum_runs_without_pending_writes() {
        let (conn, mut tx) = setup();
        tx.commit(&conn, true, false).unwrap();
        let stats = tx.stats();
        assert_eq!(stats.vacuums, 1);
        assert_eq!(stats.commits, 0);
        assert!(!conn.is_autocommit());
    }

    #[test]
    fn vacuum_after_pending_commit() {
        let (conn, mut tx) = setup();
        write(&conn, &mut tx, 1);
        tx.commit(&conn, true, true).unwrap();
        let stats = tx.stats();
        assert_eq!((stats.commits, stats.vacuums), (1, 1));
        assert!(conn.is_autocommit());
    }

    #[test]
    fn commit_outside_a_transaction_does_not_begin_one() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (a INTEGER)").unwrap();
        let mut tx = TxState::default();
        write(&conn, &mut tx, 1);
        tx.commit(&conn, false, false).unwrap();
        assert!(conn.is_autocommit());
        assert_eq!(tx.stats().begins, 0);
        assert!(!tx.is_pending());

        tx.begin_initial(&conn).unwrap();
        assert!(!conn.is_autocommit());
    }

    #[test]
    fn writes_after_exiting_stay_in_autocommit() {
        let (conn, mut tx) = setup();
        write(&conn, &mut tx, 1);
        tx.commit(&conn, false, true).unwrap();
        write(&conn, &mut tx, 2);
        tx.commit(&conn, false, false).unwrap();
        assert!(conn.is_autocommit());
        assert_eq!(tx.stats().commits, 1);
        assert_eq!(tx.stats().begins, 1);
    }

    #[test]
    fn failed_write_still_requires_commit() {
        let (conn, mut tx) = setup();
        tx.mark_dirty();
        assert!(conn.execute("INSERT INTO missing (a) VALUES (1)", []).is_err());
        assert!(tx.is_pending());
        tx.commit(&conn, false, false).unwrap();
        assert_eq!(tx.stats().commits, 1);
    }
}
