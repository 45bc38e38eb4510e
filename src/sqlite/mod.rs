// SQLite module - the single connection and everything serialized through it
//
// - config: open options and store constants
// - params: parameter conversion to rusqlite values
// - query: result extraction and building
// - cursor: per-context statement executors
// - transaction: the long-lived write transaction
// - connection: store state owned by the worker
// - worker: the thread and channel that serialize all access

pub mod config;
pub(crate) mod connection;
pub mod cursor;
pub mod params;
pub mod query;
pub mod transaction;
pub(crate) mod worker;

pub use config::{StoreOptions, StoreOptionsBuilder};
pub use connection::SharedVersion;
pub use cursor::{ContextId, Cursor, CursorId, CursorRegistry};
pub use params::Params;
pub use query::build_result_set;
pub use transaction::TxStats;
