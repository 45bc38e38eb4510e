use std::any::Any;

use rusqlite::Connection;
use rusqlite::types::Value;
use tokio::sync::oneshot;

use crate::error::CacheDbError;
use crate::results::{CustomDbRow, ResultSet};
use crate::sqlite::config::StoreOptions;
use crate::sqlite::cursor::ContextId;
use crate::sqlite::transaction::TxStats;

pub(crate) type BoxedResponse = Result<Box<dyn Any + Send>, CacheDbError>;
pub(crate) type BoxedCallback = Box<dyn FnOnce(&mut Connection) -> BoxedResponse + Send>;

/// Where a command's result goes.
pub(crate) enum Reply<T> {
    Await(oneshot::Sender<Result<T, CacheDbError>>),
    /// Fire-and-forget; failures are only logged. Carries the operation name.
    Detached(&'static str),
}

impl<T> Reply<T> {
    pub(super) fn is_detached(&self) -> bool {
        matches!(self, Reply::Detached(_))
    }

    pub(super) fn send(self, result: Result<T, CacheDbError>) {
        match self {
            Reply::Await(respond_to) => {
                let _ = respond_to.send(result);
            }
            Reply::Detached(op) => {
                if let Err(err) = result {
                    tracing::warn!(op, error = %err, "detached command failed");
                }
            }
        }
    }
}

pub(crate) enum Command {
    Open {
        options: StoreOptions,
        respond_to: Reply<()>,
    },
    InitialBegin {
        respond_to: Reply<()>,
    },
    Close {
        respond_to: Reply<()>,
    },
    Read {
        context: ContextId,
        sql: String,
        params: Vec<Value>,
        respond_to: Reply<ResultSet>,
    },
    FetchOne {
        context: ContextId,
        sql: String,
        params: Vec<Value>,
        respond_to: Reply<Option<CustomDbRow>>,
    },
    Write {
        context: ContextId,
        sql: String,
        params: Vec<Value>,
        respond_to: Reply<usize>,
    },
    WriteMany {
        context: ContextId,
        sql: String,
        rows: Vec<Vec<Value>>,
        respond_to: Reply<usize>,
    },
    Script {
        context: ContextId,
        sql: String,
        respond_to: Reply<()>,
    },
    Commit {
        vacuum: bool,
        exiting: bool,
        respond_to: Reply<()>,
    },
    WriteVersion {
        context: ContextId,
        version: i64,
        respond_to: Reply<()>,
    },
    CleanDb {
        context: ContextId,
        vacuum: bool,
        exiting: bool,
        respond_to: Reply<usize>,
    },
    Size {
        context: ContextId,
        table: String,
        respond_to: Reply<i64>,
    },
    Stats {
        respond_to: Reply<TxStats>,
    },
    SetShowSql {
        show_sql: bool,
        respond_to: Reply<()>,
    },
    WithConnection {
        callback: BoxedCallback,
        respond_to: oneshot::Sender<BoxedResponse>,
    },
    Shutdown,
}

impl Command {
    pub(super) fn is_detached(&self) -> bool {
        match self {
            Command::Write { respond_to, .. } | Command::WriteMany { respond_to, .. } => {
                respond_to.is_detached()
            }
            Command::Commit { respond_to, .. } => respond_to.is_detached(),
            Command::SetShowSql { respond_to, .. } => respond_to.is_detached(),
            _ => false,
        }
    }
}
