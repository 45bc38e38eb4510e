use std::fmt::Write;

use crate::query::QueryAndParams;
use crate::types::RowValues;

use super::{Conjunction, Filter, Operator, WhereClause};

/// `SELECT` with optional filters, grouping, ordering and paging.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    tables: Vec<String>,
    columns: Vec<String>,
    where_clause: WhereClause,
    group_by: Option<String>,
    having: Option<String>,
    order_by: Option<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Select {
    #[allow(clippy::should_implement_trait)]
    pub fn from(table: impl Into<String>) -> Self {
        Self::from_tables([table.into()])
    }

    /// Cross join of several relations, e.g. `FROM a, b`.
    pub fn from_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
            columns: Vec::new(),
            where_clause: WhereClause::default(),
            group_by: None,
            having: None,
            order_by: None,
            limit: None,
            offset: None,
        }
    }

    /// Columns or expressions to return; `*` when never called.
    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    #[must_use]
    pub fn where_clause(mut self, raw: impl Into<String>) -> Self {
        self.where_clause.set_raw(raw);
        self
    }

    #[must_use]
    pub fn filter(
        mut self,
        column: impl Into<String>,
        op: Operator,
        value: impl Into<RowValues>,
    ) -> Self {
        self.where_clause.push(Filter::new(column, op, value));
        self
    }

    #[must_use]
    pub fn eq(self, column: impl Into<String>, value: impl Into<RowValues>) -> Self {
        self.filter(column, Operator::Eq, value)
    }

    #[must_use]
    pub fn conjunction(mut self, conjunction: Conjunction) -> Self {
        self.where_clause.set_conjunction(conjunction);
        self
    }

    #[must_use]
    pub fn group_by(mut self, group_by: impl Into<String>) -> Self {
        self.group_by = Some(group_by.into());
        self
    }

    #[must_use]
    pub fn having(mut self, having: impl Into<String>) -> Self {
        self.having = Some(having.into());
        self
    }

    /// Raw ordering, e.g. `"last_seen DESC"`.
    #[must_use]
    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn build(self) -> QueryAndParams {
        let columns = if self.columns.is_empty() {
            "*".to_owned()
        } else {
            self.columns.join(", ")
        };
        let mut query = format!("SELECT {columns} FROM {}", self.tables.join(", "));
        let mut params = Vec::new();
        self.where_clause.write_to(&mut query, &mut params);
        // Writing into a String cannot fail.
        if let Some(group_by) = self.group_by {
            let _ = write!(query, " GROUP BY {group_by}");
        }
        if let Some(having) = self.having {
            let _ = write!(query, " HAVING {having}");
        }
        if let Some(order_by) = self.order_by {
            let _ = write!(query, " ORDER BY {order_by}");
        }
        if let Some(limit) = self.limit {
            let _ = write!(query, " LIMIT {limit}");
        }
        if let Some(offset) = self.offset {
            let _ = write!(query, " OFFSET {offset}");
        }
        QueryAndParams::new(query, params)
    }
}
