//! Embedded `SQLite` access layer for a long-running, multi-threaded process.
//!
//! One connection is owned by a dedicated worker thread; callers reach it
//! through a cloneable [`CacheDb`] handle (or [`BlockingCacheDb`] on plain
//! threads). Writes are batched into a long-lived transaction and flushed by
//! explicit or scheduled commits. Statements can be written by hand or built
//! with the structured builders in [`builder`].
//!
//! ```no_run
//! use sqlite_cachedb::prelude::*;
//!
//! # async fn demo() -> Result<(), CacheDbError> {
//! let db = StoreOptionsBuilder::new("cache.sdb".into())
//!     .bootstrap_script("schema.sql")
//!     .build()
//!     .await?;
//! db.initial_begin().await?;
//! db.insert(Insert::into("Peer").value("name", "alice")).await?;
//! db.commit_now(false, false).await?;
//! let peers = db.get_all(Select::from("Peer").order_by("name")).await?;
//! assert!(!peers.is_empty());
//! db.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod cachedb;
pub mod error;
pub mod prelude;
pub mod query;
pub mod results;
pub mod sqlite;
pub mod types;

pub use builder::{Conjunction, Delete, Filter, Insert, InsertMany, Operator, Select, Update};
pub use cachedb::{BlockingCacheDb, CacheDb};
pub use error::CacheDbError;
pub use query::{BatchQuery, QueryAndParams};
pub use results::{CustomDbRow, ResultSet};
pub use sqlite::config::{LATEST_DB_VERSION, MEMORY_PATH, StoreOptions, StoreOptionsBuilder};
pub use sqlite::cursor::ContextId;
pub use sqlite::transaction::TxStats;
pub use types::RowValues;
