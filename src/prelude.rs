//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types so a single
//! `use sqlite_cachedb::prelude::*;` is enough to open a store and run
//! statements against it.

pub use crate::builder::{Conjunction, Delete, Filter, Insert, InsertMany, Operator, Select, Update};
pub use crate::cachedb::{BlockingCacheDb, CacheDb};
pub use crate::error::CacheDbError;
pub use crate::query::{BatchQuery, QueryAndParams};
pub use crate::results::{CustomDbRow, ResultSet};
pub use crate::sqlite::config::{MEMORY_PATH, StoreOptions, StoreOptionsBuilder};
pub use crate::sqlite::cursor::ContextId;
pub use crate::sqlite::transaction::TxStats;
pub use crate::types::RowValues;
