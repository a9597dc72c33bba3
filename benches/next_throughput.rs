//! Benchmarks for issuing sequence numbers.
//!
//! Run with: cargo bench
//! View results in: target/criterion/report/index.html

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use docseq::contracts::SequenceGenerator;
use docseq::storage::{
    format_number, MemorySequenceStore, RocksDbSequenceStore, SqliteSequenceStore,
    StoreSequenceGenerator,
};
use tempfile::TempDir;

fn create_sqlite() -> (StoreSequenceGenerator<SqliteSequenceStore>, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = SqliteSequenceStore::open(dir.path().join("bench.db")).unwrap();
    (StoreSequenceGenerator::with_defaults(Arc::new(store)), dir)
}

fn create_rocksdb() -> (StoreSequenceGenerator<RocksDbSequenceStore>, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = RocksDbSequenceStore::open(dir.path()).unwrap();
    (StoreSequenceGenerator::with_defaults(Arc::new(store)), dir)
}

// =============================================================================
// next() per backend
// =============================================================================

fn bench_next(c: &mut Criterion) {
    let mut group = c.benchmark_group("next");
    group.throughput(Throughput::Elements(1));

    let memory = StoreSequenceGenerator::with_defaults(Arc::new(MemorySequenceStore::new()));
    group.bench_function("memory", |b| {
        b.iter(|| memory.next(black_box("SalesInvoice")).unwrap());
    });

    let (sqlite, _sqlite_dir) = create_sqlite();
    group.bench_function("sqlite", |b| {
        b.iter(|| sqlite.next(black_box("SalesInvoice")).unwrap());
    });

    let (rocksdb, _rocksdb_dir) = create_rocksdb();
    group.bench_function("rocksdb", |b| {
        b.iter(|| rocksdb.next(black_box("SalesInvoice")).unwrap());
    });

    group.finish();
}

/// Cost of spreading calls over many distinct counters.
fn bench_next_many_names(c: &mut Criterion) {
    let mut group = c.benchmark_group("next_many_names");

    for names in [1usize, 16, 256].iter() {
        let (gen, _dir) = create_rocksdb();
        let keys: Vec<String> = (0..*names).map(|i| format!("Doc{i}")).collect();
        let mut i = 0usize;

        group.bench_with_input(BenchmarkId::from_parameter(names), names, |b, _| {
            b.iter(|| {
                i = (i + 1) % keys.len();
                gen.next(black_box(&keys[i])).unwrap()
            });
        });
    }

    group.finish();
}

fn bench_format(c: &mut Criterion) {
    c.bench_function("format_number", |b| {
        b.iter(|| format_number(black_box(123_456), black_box(8), "INV-", "/26"));
    });
}

criterion_group!(benches, bench_next, bench_next_many_names, bench_format);
criterion_main!(benches);
