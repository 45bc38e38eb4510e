use crate::error::CacheDbError;
use crate::query::{BatchQuery, QueryAndParams};
use crate::types::RowValues;

use super::{Conjunction, Filter, Operator, WhereClause};

/// Single-row `INSERT`.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    table: String,
    values: Vec<(String, RowValues)>,
    or_ignore: bool,
}

impl Insert {
    #[allow(clippy::should_implement_trait)]
    pub fn into(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            values: Vec::new(),
            or_ignore: false,
        }
    }

    #[must_use]
    pub fn value(mut self, column: impl Into<String>, value: impl Into<RowValues>) -> Self {
        self.values.push((column.into(), value.into()));
        self
    }

    /// Skip the row instead of failing on a uniqueness conflict.
    #[must_use]
    pub fn or_ignore(mut self, ignore: bool) -> Self {
        self.or_ignore = ignore;
        self
    }

    /// # Errors
    /// Returns [`CacheDbError::ParameterError`] when no column was given.
    pub fn build(self) -> Result<QueryAndParams, CacheDbError> {
        if self.values.is_empty() {
            return Err(CacheDbError::ParameterError(format!(
                "insert into {} without values",
                self.table
            )));
        }
        let verb = if self.or_ignore {
            "INSERT OR IGNORE INTO"
        } else {
            "INSERT INTO"
        };
        let (columns, params): (Vec<String>, Vec<RowValues>) = self.values.into_iter().unzip();
        let query = format!(
            "{verb} {} ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            placeholders(columns.len())
        );
        Ok(QueryAndParams::new(query, params))
    }
}

/// One `INSERT` executed for many value tuples.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertMany {
    table: String,
    columns: Option<Vec<String>>,
    rows: Vec<Vec<RowValues>>,
}

impl InsertMany {
    #[allow(clippy::should_implement_trait)]
    pub fn into(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: None,
            rows: Vec::new(),
        }
    }

    /// Name the target columns; without this the tuples fill every column in
    /// table order.
    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn row(mut self, values: Vec<RowValues>) -> Self {
        self.rows.push(values);
        self
    }

    #[must_use]
    pub fn rows<I>(mut self, rows: I) -> Self
    where
        I: IntoIterator<Item = Vec<RowValues>>,
    {
        self.rows.extend(rows);
        self
    }

    /// # Errors
    /// Returns [`CacheDbError::ParameterError`] for an empty batch, an empty
    /// tuple, or tuples whose width does not match the first one (or the
    /// column list).
    pub fn build(self) -> Result<BatchQuery, CacheDbError> {
        let Some(first) = self.rows.first() else {
            return Err(CacheDbError::ParameterError(format!(
                "batch insert into {} without rows",
                self.table
            )));
        };
        let width = first.len();
        if width == 0 {
            return Err(CacheDbError::ParameterError(format!(
                "batch insert into {} with an empty tuple",
                self.table
            )));
        }
        if let Some(columns) = &self.columns {
            if columns.len() != width {
                return Err(CacheDbError::ParameterError(format!(
                    "batch insert into {}: {} columns but tuples of width {width}",
                    self.table,
                    columns.len()
                )));
            }
        }
        if let Some(pos) = self.rows.iter().position(|row| row.len() != width) {
            return Err(CacheDbError::ParameterError(format!(
                "batch insert into {}: tuple {pos} has width {}, expected {width}",
                self.table,
                self.rows[pos].len()
            )));
        }
        let query = match &self.columns {
            Some(columns) => format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.table,
                columns.join(", "),
                placeholders(width)
            ),
            None => format!("INSERT INTO {} VALUES ({})", self.table, placeholders(width)),
        };
        Ok(BatchQuery::new(query, self.rows))
    }
}

/// `UPDATE ... SET ... [WHERE ...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    table: String,
    assignments: Vec<(String, RowValues)>,
    where_clause: WhereClause,
}

impl Update {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            assignments: Vec::new(),
            where_clause: WhereClause::default(),
        }
    }

    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: impl Into<RowValues>) -> Self {
        self.assignments.push((column.into(), value.into()));
        self
    }

    /// Free-form condition, combined with any filters using the conjunction.
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

    /// # Errors
    /// Returns [`CacheDbError::ParameterError`] when nothing is assigned.
    pub fn build(self) -> Result<QueryAndParams, CacheDbError> {
        if self.assignments.is_empty() {
            return Err(CacheDbError::ParameterError(format!(
                "update of {} without values",
                self.table
            )));
        }
        let mut params = Vec::with_capacity(self.assignments.len());
        let sets: Vec<String> = self
            .assignments
            .into_iter()
            .map(|(column, value)| {
                params.push(value);
                format!("{column} = ?")
            })
            .collect();
        let mut query = format!("UPDATE {} SET {}", self.table, sets.join(", "));
        self.where_clause.write_to(&mut query, &mut params);
        Ok(QueryAndParams::new(query, params))
    }
}

/// `DELETE FROM ... WHERE ...`, filters only.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    table: String,
    where_clause: WhereClause,
}

impl Delete {
    #[allow(clippy::should_implement_trait)]
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            where_clause: WhereClause::default(),
        }
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

    /// # Errors
    /// Returns [`CacheDbError::ParameterError`] without filters; clearing a
    /// whole table goes through raw SQL.
    pub fn build(self) -> Result<QueryAndParams, CacheDbError> {
        if !self.where_clause.has_filters() {
            return Err(CacheDbError::ParameterError(format!(
                "delete from {} without filters",
                self.table
            )));
        }
        let mut query = format!("DELETE FROM {}", self.table);
        let mut params = Vec::new();
        self.where_clause.write_to(&mut query, &mut params);
        Ok(QueryAndParams::new(query, params))
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
