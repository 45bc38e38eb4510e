use crate::types::RowValues;

/// A SQL string and its bound parameters bundled together.
///
/// Every statement builder produces one of these:
/// ```rust
/// use sqlite_cachedb::prelude::*;
///
/// let qp = QueryAndParams::new(
///     "INSERT INTO t (id, name) VALUES (?, ?)",
///     vec![RowValues::Int(1), RowValues::Text("alice".into())],
/// );
/// # let _ = qp;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAndParams {
    /// The SQL query string
    pub query: String,
    /// The parameters to be bound to the query
    pub params: Vec<RowValues>,
}

impl QueryAndParams {
    /// Create a new `QueryAndParams` with the given query string and parameters
    pub fn new(query: impl Into<String>, params: Vec<RowValues>) -> Self {
        Self {
            query: query.into(),
            params,
        }
    }

    /// Create a new `QueryAndParams` with no parameters
    pub fn new_without_params(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: Vec::new(),
        }
    }
}

/// One statement executed once per parameter row.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchQuery {
    /// The SQL query string
    pub query: String,
    /// One parameter row per execution, in order
    pub rows: Vec<Vec<RowValues>>,
}

impl BatchQuery {
    pub fn new(query: impl Into<String>, rows: Vec<Vec<RowValues>>) -> Self {
        Self {
            query: query.into(),
            rows,
        }
    }
}
