mod common;

use sqlite_cachedb::prelude::*;
use sqlite_cachedb::LATEST_DB_VERSION;

#[tokio::test(flavor = "multi_thread")]
async fn version_round_trip_survives_reopen() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let options = common::store_options(dir.path())?;

    let db = CacheDb::initialize(options.clone()).await?;
    assert_eq!(db.version(), Some(common::SCHEMA_VERSION));
    assert_eq!(db.latest_version(), LATEST_DB_VERSION);
    db.initial_begin().await?;

    db.write_version(common::SCHEMA_VERSION + 1).await?;
    assert_eq!(db.version(), Some(common::SCHEMA_VERSION + 1));

    let err = db.write_version(LATEST_DB_VERSION + 1).await.unwrap_err();
    assert!(matches!(
        err,
        CacheDbError::InvalidVersion { version, latest }
            if version == LATEST_DB_VERSION + 1 && latest == LATEST_DB_VERSION
    ));
    assert_eq!(db.version(), Some(common::SCHEMA_VERSION + 1));
    db.close().await?;

    let reopened = CacheDb::initialize(options).await?;
    assert_eq!(reopened.version(), Some(common::SCHEMA_VERSION + 1));
    let row = reopened
        .fetch_one("SELECT value FROM MyInfo WHERE entry = ?", &[RowValues::from("version")])
        .await?
        .expect("version row");
    assert_eq!(row.get("value").and_then(RowValues::as_text), Some("18"));
    reopened.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn close_drops_uncommitted_writes_and_state() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let options = common::store_options(dir.path())?;

    let db = CacheDb::initialize(options.clone()).await?;
    db.initial_begin().await?;
    db.insert(Insert::into("Peer").value("name", "committed")).await?;
    db.commit_now(false, false).await?;
    db.insert(Insert::into("Peer").value("name", "lost")).await?;
    assert!(db.transaction_stats().await?.pending);
    db.close().await?;

    assert_eq!(db.version(), None);
    assert!(matches!(
        db.close().await,
        Err(CacheDbError::ConnectionError(_))
    ));
    assert!(matches!(
        db.execute_read("SELECT 1", &[]).await,
        Err(CacheDbError::ConnectionError(_))
    ));

    let reopened = CacheDb::initialize(options).await?;
    let names: Vec<String> = reopened
        .get_all(Select::from("Peer").column("name"))
        .await?
        .iter()
        .filter_map(|row| row.get("name").and_then(RowValues::as_text).map(str::to_owned))
        .collect();
    assert_eq!(names, vec!["committed".to_owned()]);
    reopened.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn commits_are_counted_once_per_batch() -> Result<(), CacheDbError> {
    let db = StoreOptionsBuilder::new(MEMORY_PATH.into()).build().await?;
    assert_eq!(db.version(), Some(1), "headless stores report version 1");
    db.execute_script("CREATE TABLE Item (id INTEGER PRIMARY KEY, name TEXT);")
        .await?;
    db.initial_begin().await?;

    for i in 0..20 {
        db.execute_write("INSERT INTO Item (name) VALUES (?)", &[RowValues::from(format!("item-{i}"))])
            .await?;
    }
    db.commit_now(false, false).await?;
    // Nothing pending: no second physical COMMIT.
    db.commit_now(false, false).await?;

    let stats = db.transaction_stats().await?;
    assert_eq!(stats.commits, 1);
    assert_eq!(stats.begins, 2);
    assert!(!stats.pending);
    assert_eq!(db.size("Item").await?, 20);

    db.commit_now(true, false).await?;
    let stats = db.transaction_stats().await?;
    assert_eq!((stats.commits, stats.vacuums), (1, 1));

    db.close().await
}

#[tokio::test(flavor = "multi_thread")]
async fn version_written_before_initial_begin() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let db = CacheDb::initialize(common::store_options(dir.path())?).await?;

    db.write_version(common::SCHEMA_VERSION + 1).await?;
    db.commit_now(false, false).await?;
    db.initial_begin().await?;

    db.insert(Insert::into("Peer").value("name", "after")).await?;
    db.commit_now(false, false).await?;
    let stats = db.transaction_stats().await?;
    assert_eq!((stats.commits, stats.begins), (1, 2));
    assert_eq!(db.version(), Some(common::SCHEMA_VERSION + 1));
    db.close().await?;
    Ok(())
}
