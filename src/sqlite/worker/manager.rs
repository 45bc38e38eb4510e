use std::sync::mpsc::{self, Sender};
use std::thread;

use rusqlite::Connection;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::CacheDbError;
use crate::sqlite::connection::SharedVersion;

use super::channel::{BoxedCallback, Command, Reply};
use super::dispatcher::run_cachedb_worker;

/// Handle to the thread that owns the connection.
///
/// Dropping the last handle asks the worker to shut down; a store still open
/// at that point is closed without committing.
pub(crate) struct CacheDbWorker {
    sender: Sender<Command>,
}

impl CacheDbWorker {
    pub(crate) fn spawn(
        version: SharedVersion,
        cancel: CancellationToken,
    ) -> Result<Self, CacheDbError> {
        let (sender, receiver) = mpsc::channel::<Command>();
        thread::Builder::new()
            .name("cachedb-worker".into())
            .spawn(move || run_cachedb_worker(&receiver, &version, &cancel))
            .map_err(|err| {
                CacheDbError::ConnectionError(format!("failed to spawn cachedb worker thread: {err}"))
            })?;

        Ok(Self { sender })
    }

    fn send_command(&self, command: Command) -> Result<(), CacheDbError> {
        self.sender
            .send(command)
            .map_err(|_| connection_error("cachedb worker closed"))
    }

    /// Send a command and await its result.
    pub(crate) async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
        drop_message: &'static str,
    ) -> Result<T, CacheDbError> {
        let (tx, rx) = oneshot::channel();
        self.send_command(build(Reply::Await(tx)))?;
        rx.await.map_err(|_| connection_error(drop_message))?
    }

    /// Send a command and block the calling thread until it completes.
    ///
    /// # Panics
    /// Panics if called from within an asynchronous execution context.
    pub(crate) fn request_blocking<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
        drop_message: &'static str,
    ) -> Result<T, CacheDbError> {
        let (tx, rx) = oneshot::channel();
        self.send_command(build(Reply::Await(tx)))?;
        rx.blocking_recv().map_err(|_| connection_error(drop_message))?
    }

    /// Queue a command without waiting for it.
    pub(crate) fn dispatch_detached<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
        op: &'static str,
    ) -> Result<(), CacheDbError> {
        self.send_command(build(Reply::Detached(op)))
    }

    pub(crate) async fn with_connection<F, R>(&self, func: F) -> Result<R, CacheDbError>
    where
        F: FnOnce(&mut Connection) -> Result<R, CacheDbError> + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let callback: BoxedCallback = Box::new(move |conn| {
            func(conn).map(|value| Box::new(value) as Box<dyn std::any::Any + Send>)
        });
        self.send_command(Command::WithConnection {
            callback,
            respond_to: tx,
        })?;
        match rx.await {
            Ok(Ok(payload)) => payload.downcast::<R>().map(|boxed| *boxed).map_err(|_| {
                CacheDbError::ExecutionError("cachedb worker response downcast failure".into())
            }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(connection_error(
                "cachedb worker dropped while handling custom callback",
            )),
        }
    }
}

impl Drop for CacheDbWorker {
    fn drop(&mut self) {
        let _ = self.sender.send(Command::Shutdown);
    }
}

fn connection_error(message: &str) -> CacheDbError {
    CacheDbError::ConnectionError(message.into())
}
