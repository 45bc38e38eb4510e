//! Structured statement construction.
//!
//! Builders take ordered `(column, operator, value)` filters and produce
//! [`QueryAndParams`](crate::query::QueryAndParams) with every value bound as
//! a `?` parameter. Table names, column names, raw WHERE/GROUP BY/HAVING/
//! ORDER BY fragments and LIMIT/OFFSET are structural and written into the SQL
//! text as given, so they must come from trusted call sites.
//!
//! Output depends only on the input, in insertion order:
//! ```rust
//! use sqlite_cachedb::prelude::*;
//!
//! let qp = Select::from("T").eq("a", 1).filter("b", Operator::Gt, 5).build();
//! assert_eq!(qp.query, "SELECT * FROM T WHERE a = ? AND b > ?");
//! assert_eq!(qp.params, vec![RowValues::Int(1), RowValues::Int(5)]);
//! ```

mod dml;
mod select;

pub use dml::{Delete, Insert, InsertMany, Update};
pub use select::Select;

use crate::types::RowValues;

/// Comparison operator of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operator {
    #[default]
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    NotLike,
    Glob,
    Is,
    IsNot,
}

impl Operator {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::Glob => "GLOB",
            Operator::Is => "IS",
            Operator::IsNot => "IS NOT",
        }
    }
}

/// How filters (and a raw WHERE fragment) are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Conjunction {
    #[default]
    And,
    Or,
}

impl Conjunction {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Conjunction::And => "AND",
            Conjunction::Or => "OR",
        }
    }
}

/// One `column op ?` term.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: Operator,
    pub value: RowValues,
}

impl Filter {
    pub fn new(column: impl Into<String>, op: Operator, value: impl Into<RowValues>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<RowValues>) -> Self {
        Self::new(column, Operator::Eq, value)
    }
}

/// WHERE state shared by update, delete and select.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct WhereClause {
    raw: Option<String>,
    filters: Vec<Filter>,
    conjunction: Conjunction,
}

impl WhereClause {
    pub(crate) fn set_raw(&mut self, raw: impl Into<String>) {
        self.raw = Some(raw.into());
    }

    pub(crate) fn push(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    pub(crate) fn set_conjunction(&mut self, conjunction: Conjunction) {
        self.conjunction = conjunction;
    }

    pub(crate) fn has_filters(&self) -> bool {
        !self.filters.is_empty()
    }

    /// Append ` WHERE ...` to `sql` and the filter values to `params`.
    pub(crate) fn write_to(self, sql: &mut String, params: &mut Vec<RowValues>) {
        let conj = self.conjunction.as_sql();
        let mut terms: Vec<String> = Vec::with_capacity(self.filters.len() + 1);
        match self.raw {
            Some(raw) if self.filters.is_empty() => terms.push(raw),
            Some(raw) => terms.push(format!("({raw})")),
            None => {}
        }
        for filter in self.filters {
            terms.push(format!("{} {} ?", filter.column, filter.op.as_sql()));
            params.push(filter.value);
        }
        if terms.is_empty() {
            return;
        }
        sql.push_str(" WHERE ");
        sql.push_str(&terms.join(&format!(" {conj} ")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(clause: WhereClause) -> (String, Vec<RowValues>) {
        let mut sql = String::new();
        let mut params = Vec::new();
        clause.write_to(&mut sql, &mut params);
        (sql, params)
    }

    #[test]
    fn empty_clause_writes_nothing() {
        let (sql, params) = render(WhereClause::default());
        assert_eq!(sql, "");
        assert!(params.is_empty());
    }

    #[test]
    fn raw_alone_is_not_parenthesized() {
        let mut clause = WhereClause::default();
        clause.set_raw("a IS NULL");
        assert_eq!(render(clause).0, " WHERE a IS NULL");
    }

    #[test]
    fn raw_and_filters_join_with_conjunction() {
        let mut clause = WhereClause::default();
        clause.set_raw("a IS NULL OR a = 0");
        clause.push(Filter::eq("b", "x"));
        clause.push(Filter::new("c", Operator::Le, 3));
        clause.set_conjunction(Conjunction::Or);
        let (sql, params) = render(clause);
        assert_eq!(sql, " WHERE (a IS NULL OR a = 0) OR b = ? OR c <= ?");
        assert_eq!(params, vec![RowValues::Text("x".into()), RowValues::Int(3)]);
    }
}
