//! The thread that owns the connection and the channel used to reach it.

mod channel;
mod dispatcher;
mod manager;

pub(crate) use channel::{Command, Reply};
pub(crate) use manager::CacheDbWorker;
