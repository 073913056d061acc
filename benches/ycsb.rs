//! YCSB-style macro-benchmarks for hybridstore's row tier.
//!
//! Measures sustained throughput under realistic mixed workloads
//! inspired by the Yahoo Cloud Serving Benchmark (YCSB), run against
//! the schema-bearing [`hybridstore::adapters::Table`] façade rather
//! than a raw key-value API.
//!
//! # Workloads
//!
//! | Name | Mix | Description |
//! |------|-----|-------------|
//! | **A** | 50% read, 50% update | Session store — heavy read/write |
//! | **B** | 95% read, 5% update | Photo tagging — read-mostly |
//! | **C** | 100% read | User profile cache — read-only |
//! | **D** | 95% read, 5% insert | Read-latest — status updates |
//! | **E** | 95% scan, 5% insert | Short ranges — threaded conversations |
//! | **F** | 50% read, 50% read-modify-write | User database — RMW |
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench ycsb               # all workloads
//! cargo bench --bench ycsb -- "load"     # load phase only
//! cargo bench --bench ycsb -- "A"        # workload A only
//! ```

use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};

use hybridstore::database::{Database, RowEngineKind};
use hybridstore::value::{Record, Value};
use rand::Rng;
use std::collections::BTreeMap;
use std::hint::black_box;
use tempfile::TempDir;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Number of records loaded into the table before running workloads.
const RECORD_COUNT: u64 = 10_000;

/// Number of operations per workload run.
const OPS_PER_RUN: u64 = 5_000;

/// Payload string length in bytes.
const VALUE_SIZE: usize = 256;

/// Scan length for workload E.
const SCAN_LENGTH: u64 = 50;

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

fn make_payload(rng: &mut impl Rng) -> String {
    (0..VALUE_SIZE).map(|_| rng.random_range(b'a'..=b'z') as char).collect()
}

fn users_schema() -> BTreeMap<String, String> {
    let mut s = BTreeMap::new();
    s.insert("payload".to_string(), "string".to_string());
    s
}

fn open_bench_db(dir: &std::path::Path) -> Database {
    Database::open(dir, RowEngineKind::Lsm).expect("open")
}

/// A query's fields are keyed by name, so a two-sided range on a single
/// field can't be expressed as one `Record` — this covers the lower
/// bound; `run_workload_e` post-filters the upper bound itself.
fn range_query_from(lo: i64) -> Record {
    let mut q = Record::new();
    q.set("id", Value::Map(vec![("$gte".to_string(), Value::Int(lo))]));
    q
}

/// Load phase: insert [`RECORD_COUNT`] sequential rows.
///
/// **Scenario:** Inserts 10,000 rows (256-byte string payloads)
/// sequentially, simulating the initial bulk-load of a dataset.
///
/// **What it measures:** Sustained sequential write throughput through
/// the LSM engine's WAL-append-then-memtable-insert path, including
/// any memtable-to-SSTable flushes triggered as the table fills.
fn load_table(db: &mut Database) {
    let mut rng = rand::rng();
    let mut table = db.table("users").unwrap();
    for i in 0..RECORD_COUNT {
        let mut row = Record::new();
        row.set("id", Value::Int(i as i64));
        row.set("payload", Value::Str(make_payload(&mut rng)));
        table.insert(row).unwrap();
    }
}

// ------------------------------------------------------------------------------------------------
// Workloads
// ------------------------------------------------------------------------------------------------

/// Workload A — 50% read, 50% update.
///
/// **Real-world analogy:** Session store. A web server reads and
/// updates session data equally — e.g., checking login state and
/// refreshing a session token.
fn run_workload_a(db: &mut Database) {
    let mut rng = rand::rng();
    let mut table = db.table("users").unwrap();
    for _ in 0..OPS_PER_RUN {
        let id = rng.random_range(0..RECORD_COUNT) as i64;
        if rng.random_bool(0.5) {
            let _ = black_box(table.read(id).unwrap());
        } else {
            let mut set = Record::new();
            set.set("payload", Value::Str(make_payload(&mut rng)));
            let mut q = Record::new();
            q.set("id", Value::Int(id));
            table.update(Some(&q), &set).unwrap();
        }
    }
}

/// Workload B — 95% read, 5% update.
///
/// **Real-world analogy:** Photo tagging or social-media metadata. The
/// vast majority of accesses are reads, with occasional writes.
fn run_workload_b(db: &mut Database) {
    let mut rng = rand::rng();
    let mut table = db.table("users").unwrap();
    for _ in 0..OPS_PER_RUN {
        let id = rng.random_range(0..RECORD_COUNT) as i64;
        if rng.random_bool(0.95) {
            let _ = black_box(table.read(id).unwrap());
        } else {
            let mut set = Record::new();
            set.set("payload", Value::Str(make_payload(&mut rng)));
            let mut q = Record::new();
            q.set("id", Value::Int(id));
            table.update(Some(&q), &set).unwrap();
        }
    }
}

/// Workload C — 100% read.
///
/// **Real-world analogy:** User profile cache with no write
/// contention — the theoretical ceiling for point-read performance.
fn run_workload_c(db: &mut Database) {
    let mut rng = rand::rng();
    let mut table = db.table("users").unwrap();
    for _ in 0..OPS_PER_RUN {
        let id = rng.random_range(0..RECORD_COUNT) as i64;
        let _ = black_box(table.read(id).unwrap());
    }
}

/// Workload D — 95% read, 5% insert (new rows beyond the initial range).
///
/// **Real-world analogy:** Status/timeline feed. Most operations read
/// recent posts; a small fraction inserts new ones.
fn run_workload_d(db: &mut Database, insert_base: &mut u64) {
    let mut rng = rand::rng();
    let mut table = db.table("users").unwrap();
    for _ in 0..OPS_PER_RUN {
        if rng.random_bool(0.95) {
            let id = rng.random_range(0..RECORD_COUNT + *insert_base) as i64;
            let _ = black_box(table.read(id).unwrap());
        } else {
            let mut row = Record::new();
            row.set("id", Value::Int((RECORD_COUNT + *insert_base) as i64));
            row.set("payload", Value::Str(make_payload(&mut rng)));
            table.insert(row).unwrap();
            *insert_base += 1;
        }
    }
}

/// Workload E — 95% scan (short range), 5% insert.
///
/// **Real-world analogy:** Threaded conversations. Reading a thread
/// requires scanning a contiguous id range ([`SCAN_LENGTH`] = 50 rows);
/// posting adds a new row.
fn run_workload_e(db: &mut Database, insert_base: &mut u64) {
    let mut rng = rand::rng();
    let mut table = db.table("users").unwrap();
    for _ in 0..OPS_PER_RUN {
        if rng.random_bool(0.95) {
            let start = rng.random_range(0..RECORD_COUNT.saturating_sub(SCAN_LENGTH)) as i64;
            let end = start + SCAN_LENGTH as i64;
            let lower = range_query_from(start);
            let rows = table.select(Some(&lower)).unwrap();
            let scanned: Vec<_> = rows.into_iter().filter(|r| matches!(r.get("id"), Some(Value::Int(id)) if *id <= end)).collect();
            let _ = black_box(scanned);
        } else {
            let mut row = Record::new();
            row.set("id", Value::Int((RECORD_COUNT + *insert_base) as i64));
            row.set("payload", Value::Str(make_payload(&mut rng)));
            table.insert(row).unwrap();
            *insert_base += 1;
        }
    }
}

/// Workload F — 50% read, 50% read-modify-write (RMW).
///
/// **Real-world analogy:** User database with counters — half the
/// operations read a row, the other half read-then-overwrite it.
fn run_workload_f(db: &mut Database) {
    let mut rng = rand::rng();
    let mut table = db.table("users").unwrap();
    for _ in 0..OPS_PER_RUN {
        let id = rng.random_range(0..RECORD_COUNT) as i64;
        if rng.random_bool(0.5) {
            let _ = black_box(table.read(id).unwrap());
        } else {
            let _ = table.read(id).unwrap();
            let mut set = Record::new();
            set.set("payload", Value::Str(make_payload(&mut rng)));
            let mut q = Record::new();
            q.set("id", Value::Int(id));
            table.update(Some(&q), &set).unwrap();
        }
    }
}

// ================================================================================================
// Criterion benchmark functions
// ================================================================================================

/// Criterion registration for the load phase. Sample size is reduced
/// to 10 because each iteration creates and fills an entire database
/// from scratch.
fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/load");
    group.sample_size(10);
    group.bench_function(BenchmarkId::new("sequential", RECORD_COUNT), |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let mut db = open_bench_db(dir.path());
                db.create_table("users", users_schema()).unwrap();
                (dir, db)
            },
            |(dir, mut db)| {
                load_table(&mut db);
                db.close().unwrap();
                drop(dir);
            },
            BatchSize::PerIteration,
        );
    });
    group.finish();
}

fn loaded_db() -> (TempDir, Database) {
    let dir = TempDir::new().unwrap();
    let mut db = open_bench_db(dir.path());
    db.create_table("users", users_schema()).unwrap();
    load_table(&mut db);
    (dir, db)
}

fn bench_workload_a(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/workload");
    group.sample_size(10);
    group.bench_function("A_50read_50update", |b| {
        b.iter_batched(loaded_db, |(_dir, mut db)| run_workload_a(&mut db), BatchSize::PerIteration);
    });
    group.finish();
}

fn bench_workload_b(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/workload");
    group.sample_size(10);
    group.bench_function("B_95read_5update", |b| {
        b.iter_batched(loaded_db, |(_dir, mut db)| run_workload_b(&mut db), BatchSize::PerIteration);
    });
    group.finish();
}

fn bench_workload_c(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/workload");
    group.sample_size(10);
    group.bench_function("C_100read", |b| {
        b.iter_batched(loaded_db, |(_dir, mut db)| run_workload_c(&mut db), BatchSize::PerIteration);
    });
    group.finish();
}

fn bench_workload_d(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/workload");
    group.sample_size(10);
    group.bench_function("D_95read_5insert", |b| {
        b.iter_batched(
            || {
                let (dir, db) = loaded_db();
                (dir, db, 0u64)
            },
            |(_dir, mut db, mut insert_base)| run_workload_d(&mut db, &mut insert_base),
            BatchSize::PerIteration,
        );
    });
    group.finish();
}

fn bench_workload_e(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/workload");
    group.sample_size(10);
    group.bench_function("E_95scan_5insert", |b| {
        b.iter_batched(
            || {
                let (dir, db) = loaded_db();
                (dir, db, 0u64)
            },
            |(_dir, mut db, mut insert_base)| run_workload_e(&mut db, &mut insert_base),
            BatchSize::PerIteration,
        );
    });
    group.finish();
}

fn bench_workload_f(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/workload");
    group.sample_size(10);
    group.bench_function("F_50read_50rmw", |b| {
        b.iter_batched(loaded_db, |(_dir, mut db)| run_workload_f(&mut db), BatchSize::PerIteration);
    });
    group.finish();
}

// ================================================================================================
// Group registration
// ================================================================================================

criterion_group!(
    benches,
    bench_load,
    bench_workload_a,
    bench_workload_b,
    bench_workload_c,
    bench_workload_d,
    bench_workload_e,
    bench_workload_f,
);

criterion_main!(benches);
