use rusqlite::types::Value;

use crate::error::CacheDbError;
use crate::results::{CustomDbRow, ResultSet};
use crate::sqlite::cursor::ContextId;

use super::StoreState;

impl StoreState {
    /// Run a query on the caller's cursor. Reads never mark the store dirty.
    pub(crate) fn execute_read(
        &self,
        context: &ContextId,
        sql: &str,
        params: &[Value],
    ) -> Result<ResultSet, CacheDbError> {
        let cursor = self.cursor(context);
        cursor.query(self.conn()?, sql, params, self.show_sql)
    }

    /// First row of a query, or `None` when it matches nothing.
    pub(crate) fn fetch_one(
        &self,
        context: &ContextId,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<CustomDbRow>, CacheDbError> {
        let result = self.execute_read(context, sql, params)?;
        if result.len() > 1 {
            tracing::debug!(sql, rows = result.len(), "fetch_one discarded extra rows");
        }
        Ok(result.into_rows().into_iter().next())
    }

    /// Row count of `table`.
    pub(crate) fn size(&self, context: &ContextId, table: &str) -> Result<i64, CacheDbError> {
        let sql = format!("SELECT count(*) FROM {table} LIMIT 1");
        let row = self.fetch_one(context, &sql, &[])?;
        row.and_then(|row| row.get_by_index(0).and_then(|v| v.as_int().copied()))
            .ok_or_else(|| CacheDbError::ExecutionError(format!("no count returned for {table}")))
    }
}
