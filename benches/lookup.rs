//! Criterion benchmarks for database lookups.
//!
//! Run with:
//!   cargo bench --bench lookup
//!
//! Builds a throwaway database in a temp directory, then measures find()
//! for present and absent keys and a full iteration pass.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mcdb::{Mcdb, McdbWriter};
use tempfile::TempDir;

fn build_db(dir: &TempDir, records: usize) -> std::path::PathBuf {
    let path = dir.path().join(format!("bench-{}.mcdb", records));
    let mut w = McdbWriter::create(&path).unwrap();
    for i in 0..records {
        let key = format!("key-{:08}", i);
        let val = format!("value payload number {:08}", i);
        w.add(key.as_bytes(), val.as_bytes()).unwrap();
    }
    w.finish(false).unwrap();
    path
}

fn bench_find(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mut group = c.benchmark_group("find");

    for &n in &[1_000usize, 100_000] {
        let path = build_db(&dir, n);
        let mut db = Mcdb::open(&path).unwrap();

        group.bench_with_input(BenchmarkId::new("hit", n), &n, |b, &n| {
            let mut i = 0usize;
            b.iter(|| {
                let key = format!("key-{:08}", i % n);
                i = i.wrapping_add(7919);
                db.find(key.as_bytes()).unwrap().len()
            })
        });

        group.bench_with_input(BenchmarkId::new("miss", n), &n, |b, _| {
            let mut i = 0usize;
            b.iter(|| {
                let key = format!("absent-{:08}", i);
                i = i.wrapping_add(1);
                db.find(key.as_bytes()).is_none()
            })
        });
    }
    group.finish();
}

fn bench_iterate(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let path = build_db(&dir, 100_000);
    let db = Mcdb::open(&path).unwrap();
    let total: usize = db.iter().map(|(k, v)| k.len() + v.len()).sum();

    let mut group = c.benchmark_group("iterate");
    group.throughput(Throughput::Bytes(total as u64));
    group.bench_function("full_scan", |b| {
        b.iter(|| {
            let mut bytes = 0usize;
            for (k, v) in db.iter() {
                bytes += k.len() + v.len();
            }
            bytes
        })
    });
    group.finish();
}

criterion_group!(benches, bench_find, bench_iterate);
criterion_main!(benches);
