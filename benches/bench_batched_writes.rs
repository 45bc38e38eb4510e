//! Criterion comparison of write throughput when many writes share one commit
//! versus committing after every write. Each iteration opens a fresh on-disk
//! store so WAL growth from earlier runs does not skew later ones.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use sqlite_cachedb::prelude::*;
use std::hint::black_box;
use std::sync::LazyLock;
use tokio::runtime::Runtime;

static TOKIO_RUNTIME: LazyLock<Runtime> =
    LazyLock::new(|| Runtime::new().expect("create tokio runtime"));

/// Resolve how many inserts each iteration performs.
fn write_count() -> usize {
    std::env::var("BENCH_WRITES")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(500)
}

async fn open_store(dir: &tempfile::TempDir) -> CacheDb {
    let path = dir.path().join("bench.sdb");
    let db = CacheDb::initialize(StoreOptions::new(path.to_string_lossy().into_owned()))
        .await
        .expect("open store");
    db.execute_script("CREATE TABLE IF NOT EXISTS Item (id INTEGER PRIMARY KEY, name TEXT NOT NULL);")
        .await
        .expect("create table");
    db.initial_begin().await.expect("begin");
    db
}

async fn run_writes(db: &CacheDb, count: usize, commit_each: bool) {
    for i in 0..count {
        db.insert(Insert::into("Item").value("name", format!("item-{i}")))
            .await
            .expect("insert");
        if commit_each {
            db.commit_now(false, false).await.expect("commit");
        }
    }
    db.commit_now(false, false).await.expect("final commit");
}

fn bench_batched_writes(c: &mut Criterion) {
    let count = write_count();
    let mut group = c.benchmark_group("batched_writes");
    group.throughput(Throughput::Elements(count as u64));
    group.sample_size(10);

    for (label, commit_each) in [("one_commit", false), ("commit_per_write", true)] {
        group.bench_with_input(BenchmarkId::new(label, count), &count, |b, &count| {
            b.to_async(&*TOKIO_RUNTIME).iter_custom(|iters| async move {
                let mut total = std::time::Duration::ZERO;
                for _ in 0..iters {
                    let dir = tempfile::tempdir().expect("tempdir");
                    let db = open_store(&dir).await;
                    let start = std::time::Instant::now();
                    run_writes(black_box(&db), count, commit_each).await;
                    total += start.elapsed();
                    db.close().await.expect("close");
                }
                total
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_batched_writes);
criterion_main!(benches);
