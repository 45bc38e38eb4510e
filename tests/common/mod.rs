#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use sqlite_cachedb::StoreOptions;

pub const SCHEMA_VERSION: i64 = 17;

pub const SCHEMA: &str = "
    CREATE TABLE MyInfo (entry PRIMARY KEY, value TEXT);
    INSERT INTO MyInfo (entry, value) VALUES ('version', '17');

    CREATE TABLE Peer (
        peer_id        INTEGER PRIMARY KEY AUTOINCREMENT,
        name           TEXT NOT NULL UNIQUE,
        last_seen      INTEGER DEFAULT 0,
        is_connectable INTEGER DEFAULT 0
    );
    CREATE TABLE Event (seq INTEGER NOT NULL, context TEXT NOT NULL);

    CREATE TABLE Torrent (torrent_id INTEGER PRIMARY KEY, name TEXT);
    CREATE TABLE TorrentFiles (torrent_id INTEGER NOT NULL, path TEXT);
    CREATE TABLE CollectedTorrent (torrent_id INTEGER NOT NULL);
    CREATE TABLE _ChannelTorrents (torrent_id INTEGER NOT NULL);
";

pub fn write_script(dir: &Path, body: &str) -> std::io::Result<PathBuf> {
    let path = dir.join("schema.sql");
    fs::write(&path, body)?;
    Ok(path)
}

pub fn db_path(dir: &Path) -> String {
    dir.join("cache.sdb").to_string_lossy().into_owned()
}

/// File-backed store in `dir`, bootstrapped from [`SCHEMA`].
pub fn store_options(dir: &Path) -> std::io::Result<StoreOptions> {
    let script = write_script(dir, SCHEMA)?;
    Ok(StoreOptions::new(db_path(dir)).with_bootstrap_script(script))
}
