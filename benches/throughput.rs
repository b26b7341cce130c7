//! Throughput benchmarks for the stashkv storage engine.

use chrono::{TimeDelta, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use stashkv::storage::{Entry, Patch, StorageEngine};
use std::sync::Arc;
use tempfile::TempDir;

fn open_engine() -> (TempDir, Arc<StorageEngine>) {
    let dir = TempDir::new().expect("temp dir");
    let engine = StorageEngine::open(dir.path().join("bench.json")).expect("open engine");
    (dir, Arc::new(engine))
}

fn populate(engine: &StorageEngine, count: usize, value: &str) {
    let now = Utc::now();
    for i in 0..count {
        engine
            .create(Entry::from_parts(
                format!("key:{}", i),
                value,
                now,
                now + TimeDelta::hours(1),
            ))
            .expect("create");
    }
}

fn bench_create(c: &mut Criterion) {
    let (_dir, engine) = open_engine();
    let expires = Utc::now() + TimeDelta::hours(1);

    let mut group = c.benchmark_group("create");
    group.throughput(Throughput::Elements(1));

    for size in [16usize, 1024] {
        let value = "x".repeat(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &value, |b, value| {
            let mut i = 0u64;
            b.iter(|| {
                let key = format!("key:{}:{}", value.len(), i);
                black_box(engine.create(Entry::from_parts(key, value.as_str(), Utc::now(), expires)))
                    .ok();
                i += 1;
            });
        });
    }

    group.finish();
}

fn bench_read(c: &mut Criterion) {
    let (_dir, engine) = open_engine();
    populate(&engine, 100_000, "value");

    let mut group = c.benchmark_group("read");
    group.throughput(Throughput::Elements(1));

    group.bench_function("existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(engine.read(&key)).ok();
            i += 1;
        });
    });

    group.bench_function("missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("missing:{}", i);
            black_box(engine.read(&key)).ok();
            i += 1;
        });
    });

    group.finish();
}

fn bench_update(c: &mut Criterion) {
    let (_dir, engine) = open_engine();
    populate(&engine, 10_000, "value");
    let patch = Patch::new("updated", None);

    let mut group = c.benchmark_group("update");
    group.throughput(Throughput::Elements(1));

    group.bench_function("data_only", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 10_000);
            black_box(engine.update(&key, &patch)).ok();
            i += 1;
        });
    });

    group.finish();
}

fn bench_concurrent_reads(c: &mut Criterion) {
    let (_dir, engine) = open_engine();
    populate(&engine, 10_000, "value");

    let mut group = c.benchmark_group("concurrent");

    for threads in [2usize, 4, 8] {
        group.throughput(Throughput::Elements(threads as u64 * 1_000));
        group.bench_with_input(BenchmarkId::new("read", threads), &threads, |b, &threads| {
            b.iter(|| {
                std::thread::scope(|s| {
                    for t in 0..threads {
                        let engine = &engine;
                        s.spawn(move || {
                            for i in 0..1_000 {
                                let key = format!("key:{}", (t * 1_000 + i) % 10_000);
                                black_box(engine.read(&key)).ok();
                            }
                        });
                    }
                });
            });
        });
    }

    group.finish();
}

fn bench_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("flush");
    group.sample_size(20);

    for count in [1_000usize, 10_000] {
        let (_dir, engine) = open_engine();
        populate(&engine, count, "value");

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                // a clean index skips the write, so dirty it first
                engine.update("key:0", &Patch::new("v", None)).ok();
                black_box(engine.flush()).ok();
            });
        });
    }

    group.finish();
}

fn bench_sweep(c: &mut Criterion) {
    c.bench_function("sweep_nothing_expired_10k", |b| {
        let (_dir, engine) = open_engine();
        populate(&engine, 10_000, "value");
        b.iter(|| black_box(engine.sweep_expired()));
    });
}

criterion_group!(
    benches,
    bench_create,
    bench_read,
    bench_update,
    bench_concurrent_reads,
    bench_flush,
    bench_sweep,
);

criterion_main!(benches);
