use rusqlite::types::Value;

use crate::error::CacheDbError;
use crate::sqlite::cursor::ContextId;

use super::StoreState;

impl StoreState {
    /// Execute a DML statement on the caller's cursor and return rows affected.
    ///
    /// The store is marked dirty before execution so a failed write still
    /// forces the next commit.
    pub(crate) fn execute_write(
        &mut self,
        context: &ContextId,
        sql: &str,
        params: &[Value],
    ) -> Result<usize, CacheDbError> {
        self.tx.mark_dirty();
        let cursor = self.cursor(context);
        cursor.execute(self.conn()?, sql, params, self.show_sql)
    }

    /// Execute one statement per parameter row.
    pub(crate) fn execute_many(
        &mut self,
        context: &ContextId,
        sql: &str,
        rows: &[Vec<Value>],
    ) -> Result<usize, CacheDbError> {
        self.tx.mark_dirty();
        let cursor = self.cursor(context);
        cursor.execute_many(self.conn()?, sql, rows, self.show_sql)
    }

    /// Run a parameterless script inside the open transaction.
    pub(crate) fn execute_script(
        &mut self,
        context: &ContextId,
        sql: &str,
    ) -> Result<(), CacheDbError> {
        self.tx.mark_dirty();
        let cursor = self.cursor(context);
        cursor.execute_script(self.conn()?, sql, self.show_sql)
    }

    /// Run the housekeeping statements; with `vacuum`, commit and compact.
    ///
    /// The first failing statement aborts the run and its error is returned.
    pub(crate) fn clean_db(
        &mut self,
        context: &ContextId,
        vacuum: bool,
        exiting: bool,
    ) -> Result<usize, CacheDbError> {
        let statements = self.options.housekeeping.clone();
        let mut removed = 0;
        for sql in &statements {
            removed += self.execute_write(context, sql, &[])?;
        }
        tracing::info!(removed, vacuum, "clean_db");
        if vacuum {
            self.commit(true, exiting)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::sqlite::config::{MEMORY_PATH, StoreOptions};
    use crate::sqlite::connection::{SharedVersion, open_store};

    fn store(housekeeping: &[&str]) -> StoreState {
        let mut opts = StoreOptions::new(MEMORY_PATH.into());
        opts.housekeeping = housekeeping.iter().map(|s| (*s).to_owned()).collect();
        let mut state = open_store(opts, SharedVersion::default()).unwrap();
        state.begin_initial().unwrap();
        state
            .execute_script(
                &ContextId::main(),
                "CREATE TABLE Peer (peer_id INTEGER PRIMARY KEY, name TEXT);",
            )
            .unwrap();
        state.commit(false, false).unwrap();
        state
    }

    #[test]
    fn writes_stay_pending_until_commit() {
        let mut state = store(&[]);
        let ctx = ContextId::main();
        for i in 0..3 {
            let n = state
                .execute_write(
                    &ctx,
                    "INSERT INTO Peer (name) VALUES (?)",
                    &[Value::Text(format!("peer-{i}"))],
                )
                .unwrap();
            assert_eq!(n, 1);
        }
        assert!(state.tx_stats().pending);
        let commits = state.tx_stats().commits;
        state.commit(false, false).unwrap();
        assert_eq!(state.tx_stats().commits, commits + 1);
    }

    #[test]
    fn failed_write_marks_pending() {
        let mut state = store(&[]);
        let err = state
            .execute_write(&ContextId::main(), "INSERT INTO Missing VALUES (1)", &[])
            .unwrap_err();
        assert!(matches!(err, CacheDbError::SqliteError(_)));
        assert!(state.tx_stats().pending);
    }

    #[test]
    fn clean_db_prunes_and_vacuums() {
        let mut state = store(&["DELETE FROM Peer WHERE name IS NULL"]);
        let ctx = ContextId::main();
        state
            .execute_many(
                &ctx,
                "INSERT INTO Peer (name) VALUES (?)",
                &[vec![Value::Null], vec![Value::Text("kept".into())], vec![Value::Null]],
            )
            .unwrap();

        let removed = state.clean_db(&ctx, true, false).unwrap();
        assert_eq!(removed, 2);
        let stats = state.tx_stats();
        assert_eq!(stats.vacuums, 1);
        assert!(!stats.pending);
    }

    #[test]
    fn clean_db_returns_the_first_failure() {
        let mut state = store(&[
            "DELETE FROM NoSuchTable WHERE x = 1",
            "DELETE FROM Peer WHERE name IS NULL",
        ]);
        let ctx = ContextId::main();
        state
            .execute_write(&ctx, "INSERT INTO Peer (name) VALUES (NULL)", &[])
            .unwrap();

        let err = state.clean_db(&ctx, true, false).unwrap_err();
        assert!(matches!(err, CacheDbError::SqliteError(_)), "{err}");
        // Nothing after the failing statement ran, and no vacuum happened.
        assert_eq!(state.tx_stats().vacuums, 0);
        let left: i64 = state
            .conn()
            .unwrap()
            .query_row("SELECT count(*) FROM Peer", [], |r| r.get(0))
            .unwrap();
        assert_eq!(left, 1);
    }
}
