//! Micro-benchmarks for hybridstore's core operations.
//!
//! Uses Criterion for statistically rigorous measurement with
//! regression detection and HTML reports.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench micro              # run all micro-benchmarks
//! cargo bench --bench micro -- table     # filter by name
//! ```
//!
//! Reports are generated in `target/criterion/report/index.html`.

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use hybridstore::database::{Database, RowEngineKind};
use hybridstore::value::{Record, Value};
use std::collections::BTreeMap;
use tempfile::TempDir;

fn users_schema() -> BTreeMap<String, String> {
    let mut s = BTreeMap::new();
    s.insert("name".to_string(), "string".to_string());
    s.insert("age".to_string(), "integer".to_string());
    s
}

fn user(i: u64) -> Record {
    let mut r = Record::new();
    r.set("name", Value::Str(format!("user-{i:08}")));
    r.set("age", Value::Int((i % 100) as i64));
    r
}

fn open_db(dir: &std::path::Path, kind: RowEngineKind) -> Database {
    Database::open(dir, kind).expect("open")
}

// ------------------------------------------------------------------------------------------------
// Row tier — insert
// ------------------------------------------------------------------------------------------------

fn bench_table_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_insert");
    for kind in [RowEngineKind::Append, RowEngineKind::Lsm] {
        let label = format!("{kind:?}");
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(label), &kind, |b, &kind| {
            b.iter_batched(
                || {
                    let dir = TempDir::new().unwrap();
                    let db = open_db(dir.path(), kind);
                    (dir, db, 0u64)
                },
                |(dir, mut db, _)| {
                    let mut table = db.create_table("users", users_schema()).unwrap();
                    for i in 0..100 {
                        table.insert(black_box(user(i))).unwrap();
                    }
                    drop(dir);
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

// ------------------------------------------------------------------------------------------------
// Row tier — point read
// ------------------------------------------------------------------------------------------------

fn bench_table_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_read");
    for kind in [RowEngineKind::Append, RowEngineKind::Lsm] {
        let dir = TempDir::new().unwrap();
        let mut db = open_db(dir.path(), kind);
        {
            let mut table = db.create_table("users", users_schema()).unwrap();
            for i in 0..1000 {
                table.insert(user(i)).unwrap();
            }
        }
        let label = format!("{kind:?}");
        group.bench_with_input(BenchmarkId::from_parameter(label), &kind, |b, _| {
            b.iter(|| {
                let mut table = db.table("users").unwrap();
                black_box(table.read(black_box(500)).unwrap());
            });
        });
    }
    group.finish();
}

// ------------------------------------------------------------------------------------------------
// Vector tier — cosine search
// ------------------------------------------------------------------------------------------------

fn bench_vector_search(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mut db = open_db(dir.path(), RowEngineKind::Lsm);
    db.create_vector_index("embeddings", 32).unwrap();
    {
        let index = db.vector_index_mut("embeddings").unwrap();
        for i in 0..2000u32 {
            let vec: Vec<f32> = (0..32).map(|d| ((i * 31 + d) % 97) as f32 / 97.0).collect();
            index.add(&vec, None).unwrap();
        }
    }
    let query: Vec<f32> = (0..32).map(|d| (d as f32) / 32.0).collect();

    c.bench_function("vector_search_top10_of_2000x32", |b| {
        b.iter(|| {
            let index = db.vector_index("embeddings").unwrap();
            black_box(index.search(black_box(&query), 10).unwrap());
        });
    });
}

// ------------------------------------------------------------------------------------------------
// Columnar tier — aggregation
// ------------------------------------------------------------------------------------------------

fn bench_columnar_aggregate(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mut db = open_db(dir.path(), RowEngineKind::Lsm);
    db.create_analytics_table(
        "metrics",
        vec![("name".to_string(), "string".to_string()), ("value".to_string(), "float".to_string())],
    )
    .unwrap();
    {
        let table = db.analytics_table_mut("metrics").unwrap();
        let rows: Vec<Record> = (0..5000u64)
            .map(|i| {
                let mut r = Record::new();
                r.set("name", Value::Str(format!("m{i}")));
                r.set("value", Value::Float(i as f64));
                r
            })
            .collect();
        table.insert_many(&rows).unwrap();
    }

    c.bench_function("columnar_aggregate_sum_5000_rows", |b| {
        b.iter(|| {
            let table = db.analytics_table("metrics").unwrap();
            black_box(table.aggregate("value", "sum").unwrap());
        });
    });
}

criterion_group!(benches, bench_table_insert, bench_table_read, bench_vector_search, bench_columnar_aggregate);
criterion_main!(benches);
