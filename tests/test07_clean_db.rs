mod common;

use sqlite_cachedb::prelude::*;

async fn seed(db: &CacheDb) -> Result<(), CacheDbError> {
    db.execute_script(
        "INSERT INTO Torrent (torrent_id, name) VALUES (1, 'named'), (2, NULL), (3, NULL);
         INSERT INTO _ChannelTorrents (torrent_id) VALUES (3);
         INSERT INTO CollectedTorrent (torrent_id) VALUES (1);
         INSERT INTO TorrentFiles (torrent_id, path) VALUES (1, 'a'), (1, 'b'), (2, 'c');",
    )
    .await
}

#[tokio::test(flavor = "multi_thread")]
async fn default_housekeeping_prunes_and_vacuums() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let db = CacheDb::initialize(common::store_options(dir.path())?).await?;
    db.initial_begin().await?;
    seed(&db).await?;

    // Two files of the collected torrent, one unnamed torrent outside any channel.
    let removed = db.clean_db(true, false).await?;
    assert_eq!(removed, 3);
    assert_eq!(db.size("TorrentFiles").await?, 1);
    let remaining: Vec<i64> = db
        .get_all(Select::from("Torrent").column("torrent_id").order_by("torrent_id"))
        .await?
        .iter()
        .filter_map(|row| row.get("torrent_id").and_then(RowValues::as_int).copied())
        .collect();
    assert_eq!(remaining, [1, 3]);

    let stats = db.transaction_stats().await?;
    assert_eq!((stats.commits, stats.vacuums), (1, 1));
    assert!(!stats.pending);
    assert_eq!(db.version(), Some(common::SCHEMA_VERSION));
    db.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn clean_without_vacuum_leaves_writes_pending() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let mut options = common::store_options(dir.path())?;
    options.housekeeping = vec!["DELETE FROM Peer WHERE last_seen < 10".into()];
    let db = CacheDb::initialize(options).await?;
    db.initial_begin().await?;
    db.insert_many(
        InsertMany::into("Peer")
            .columns(["name", "last_seen"])
            .rows([
                vec![RowValues::from("stale"), RowValues::Int(1)],
                vec![RowValues::from("fresh"), RowValues::Int(50)],
            ]),
    )
    .await?;
    db.commit_now(false, false).await?;

    assert_eq!(db.clean_db(false, false).await?, 1);
    let stats = db.transaction_stats().await?;
    assert!(stats.pending);
    assert_eq!((stats.commits, stats.vacuums), (1, 0));

    db.commit_now(false, true).await?;
    assert_eq!(db.size("Peer").await?, 1);
    db.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_housekeeping_statement_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let mut options = common::store_options(dir.path())?;
    options.housekeeping = vec!["DELETE FROM NoSuchTable WHERE x = 1".into()];
    let db = CacheDb::initialize(options).await?;
    db.initial_begin().await?;

    let err = db.clean_db(false, false).await.unwrap_err();
    assert!(matches!(err, CacheDbError::SqliteError(_)), "{err}");
    assert!(!err.is_contention());

    let err = db.clean_db(true, false).await.unwrap_err();
    assert!(matches!(err, CacheDbError::SqliteError(_)), "{err}");
    assert_eq!(db.transaction_stats().await?.vacuums, 0);
    db.close().await?;
    Ok(())
}
