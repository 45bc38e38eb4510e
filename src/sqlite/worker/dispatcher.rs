use std::sync::mpsc::Receiver;

use tokio_util::sync::CancellationToken;

use crate::error::CacheDbError;
use crate::sqlite::connection::{SharedVersion, StoreState, open_store};

use super::channel::{BoxedCallback, BoxedResponse, Command};

/// Worker loop: owns the store and executes commands in arrival order.
pub(super) fn run_cachedb_worker(
    receiver: &Receiver<Command>,
    version: &SharedVersion,
    cancel: &CancellationToken,
) {
    let mut store: Option<StoreState> = None;

    while let Ok(command) = receiver.recv() {
        if cancel.is_cancelled() && command.is_detached() {
            tracing::debug!("skipping detached command queued before close");
            continue;
        }
        match command {
            Command::Shutdown => break,
            Command::Open {
                options,
                respond_to,
            } => {
                if store.is_some() {
                    respond_to.send(Err(CacheDbError::ConnectionError(
                        "store already open".into(),
                    )));
                    continue;
                }
                match open_store(options, version.clone()) {
                    Ok(state) => {
                        store = Some(state);
                        respond_to.send(Ok(()));
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "failed to open store");
                        respond_to.send(Err(err));
                    }
                }
            }
            Command::Close { respond_to } => {
                let result = with_store(&mut store, StoreState::close);
                respond_to.send(result);
                // The connection is gone; nothing further can run here.
                break;
            }
            Command::InitialBegin { respond_to } => {
                respond_to.send(with_store(&mut store, StoreState::begin_initial));
            }
            Command::Read {
                context,
                sql,
                params,
                respond_to,
            } => {
                respond_to.send(with_store(&mut store, |s| {
                    s.execute_read(&context, &sql, &params)
                }));
            }
            Command::FetchOne {
                context,
                sql,
                params,
                respond_to,
            } => {
                respond_to.send(with_store(&mut store, |s| {
                    s.fetch_one(&context, &sql, &params)
                }));
            }
            Command::Write {
                context,
                sql,
                params,
                respond_to,
            } => {
                respond_to.send(with_store(&mut store, |s| {
                    s.execute_write(&context, &sql, &params)
                }));
            }
            Command::WriteMany {
                context,
                sql,
                rows,
                respond_to,
            } => {
                respond_to.send(with_store(&mut store, |s| {
                    s.execute_many(&context, &sql, &rows)
                }));
            }
            Command::Script {
                context,
                sql,
                respond_to,
            } => {
                respond_to.send(with_store(&mut store, |s| s.execute_script(&context, &sql)));
            }
            Command::Commit {
                vacuum,
                exiting,
                respond_to,
            } => {
                respond_to.send(with_store(&mut store, |s| s.commit(vacuum, exiting)));
            }
            Command::WriteVersion {
                context,
                version,
                respond_to,
            } => {
                respond_to.send(with_store(&mut store, |s| {
                    s.write_version(&context, version)
                }));
            }
            Command::CleanDb {
                context,
                vacuum,
                exiting,
                respond_to,
            } => {
                respond_to.send(with_store(&mut store, |s| {
                    s.clean_db(&context, vacuum, exiting)
                }));
            }
            Command::Size {
                context,
                table,
                respond_to,
            } => {
                respond_to.send(with_store(&mut store, |s| s.size(&context, &table)));
            }
            Command::Stats { respond_to } => {
                respond_to.send(with_store(&mut store, |s| Ok(s.tx_stats())));
            }
            Command::SetShowSql {
                show_sql,
                respond_to,
            } => {
                respond_to.send(with_store(&mut store, |s| {
                    s.set_show_sql(show_sql);
                    Ok(())
                }));
            }
            Command::WithConnection {
                callback,
                respond_to,
            } => {
                let _ = respond_to.send(run_custom_callback(&mut store, callback));
            }
        }
    }

    if let Some(mut state) = store.take() {
        if state.conn().is_ok() {
            tracing::info!("worker shutting down with the store still open");
            if let Err(err) = state.close() {
                tracing::warn!(error = %err, "failed to close store on shutdown");
            }
        }
    }
    tracing::debug!("cachedb worker stopped");
}

fn with_store<T>(
    store: &mut Option<StoreState>,
    action: impl FnOnce(&mut StoreState) -> Result<T, CacheDbError>,
) -> Result<T, CacheDbError> {
    match store.as_mut() {
        Some(state) => action(state),
        None => Err(CacheDbError::ConnectionError("store is not open".into())),
    }
}

fn run_custom_callback(store: &mut Option<StoreState>, callback: BoxedCallback) -> BoxedResponse {
    with_store(store, |state| {
        let conn = state.conn_mut()?;
        callback(conn)
    })
}
