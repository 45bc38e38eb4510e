use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sqlite_cachedb::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Maintenance commands for a cachedb store")]
struct Args {
    /// Store file to open. Required unless `--config` names one.
    #[arg(long, required_unless_present = "config")]
    db: Option<String>,
    /// Schema script used when the store does not exist yet.
    #[arg(long)]
    script: Option<PathBuf>,
    /// JSON file with `StoreOptions`; `--db` and `--script` override it.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Log every statement with its parameters.
    #[arg(long)]
    show_sql: bool,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the schema version and row counts.
    Info,
    /// Commit and compact the store.
    Vacuum,
    /// Run the housekeeping deletes, then vacuum.
    Clean,
    /// Store a new schema version.
    SetVersion { version: i64 },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();
    if let Err(err) = run(args).await {
        eprintln!("cachedb: {err}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let options = load_options(&args)?;
    tracing::info!(path = %options.db_path, "opening store");
    let db = CacheDb::initialize(options).await?;
    db.initial_begin().await?;

    let outcome = match args.command {
        Cmd::Info => info(&db).await,
        Cmd::Vacuum => db.commit_now(true, true).await,
        Cmd::Clean => db.clean_db(true, true).await.map(|removed| {
            println!("removed {removed} rows");
        }),
        Cmd::SetVersion { version } => db.write_version(version).await,
    };
    if outcome.is_ok() {
        db.commit_now(false, true).await?;
    }
    db.close().await?;
    Ok(outcome?)
}

fn load_options(args: &Args) -> Result<StoreOptions, Box<dyn std::error::Error>> {
    let mut options = match &args.config {
        Some(path) => serde_json::from_str::<StoreOptions>(&std::fs::read_to_string(path)?)?,
        None => StoreOptions::default(),
    };
    if let Some(db) = &args.db {
        options.db_path.clone_from(db);
    }
    if let Some(script) = &args.script {
        options.bootstrap_script = Some(script.clone());
    }
    options.show_sql |= args.show_sql;
    if options.is_memory() {
        return Err("no store file given: pass --db or set db_path in --config".into());
    }
    Ok(options)
}

async fn info(db: &CacheDb) -> Result<(), CacheDbError> {
    match db.version() {
        Some(version) => println!("version: {version}"),
        None => println!("version: unknown"),
    }
    println!("latest version: {}", db.latest_version());

    let tables = db
        .get_all(
            Select::from("sqlite_master")
                .column("name")
                .eq("type", "table")
                .filter("name", Operator::NotLike, "sqlite_%")
                .order_by("name"),
        )
        .await?;
    for row in tables {
        if let Some(RowValues::Text(name)) = row.get("name") {
            let count = db.size(&format!("\"{}\"", name.replace('"', "\"\""))).await?;
            println!("{name}: {count}");
        }
    }
    Ok(())
}
