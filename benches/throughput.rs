//! Throughput Benchmark for hash operations
//!
//! Measures the hash object in both encodings and the keyspace under
//! contention.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flashkv_hash::hash::{HashConfig, HashObject};
use flashkv_hash::storage::StorageEngine;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;

const NOW: u64 = 1_700_000_000_000;

fn filled(fields: usize) -> HashObject {
    let mut hash = HashObject::new(HashConfig::default());
    for i in 0..fields {
        hash.set(
            Bytes::from(format!("field:{}", i)),
            Bytes::from(format!("value:{}", i)),
            NOW,
        );
    }
    hash
}

/// HSET into a compact hash vs an expanded one
fn bench_hset(c: &mut Criterion) {
    let mut group = c.benchmark_group("hset");
    group.throughput(Throughput::Elements(1));

    for fields in [16usize, 10_000] {
        group.bench_with_input(BenchmarkId::new("overwrite", fields), &fields, |b, &fields| {
            let mut hash = filled(fields);
            let mut i = 0usize;
            b.iter(|| {
                let field = Bytes::from(format!("field:{}", i % fields));
                black_box(hash.set(field, Bytes::from("new"), NOW));
                i += 1;
            });
        });
    }

    group.bench_function("grow_with_rehash", |b| {
        b.iter(|| {
            let hash = filled(4_096);
            black_box(hash.stored_len());
        });
    });

    group.finish();
}

/// HGET, both encodings
fn bench_hget(c: &mut Criterion) {
    let mut group = c.benchmark_group("hget");
    group.throughput(Throughput::Elements(1));

    for fields in [16usize, 100, 10_000] {
        group.bench_with_input(BenchmarkId::new("existing", fields), &fields, |b, &fields| {
            let mut hash = filled(fields);
            let mut i = 0usize;
            b.iter(|| {
                let field = format!("field:{}", i % fields);
                black_box(hash.get(field.as_bytes(), NOW));
                i += 1;
            });
        });
    }

    group.finish();
}

/// Full HSCAN walk
fn bench_hscan(c: &mut Criterion) {
    let mut group = c.benchmark_group("hscan");

    group.bench_function("full_walk_10k", |b| {
        let mut hash = filled(10_000);
        b.iter(|| {
            let mut cursor = 0;
            loop {
                let page = hash.scan(cursor, None, 100, NOW);
                black_box(&page.entries);
                cursor = page.cursor;
                if cursor == 0 {
                    break;
                }
            }
        });
    });

    group.finish();
}

/// HRANDFIELD on a table that shrank after mass deletion
fn bench_hrandfield(c: &mut Criterion) {
    let mut group = c.benchmark_group("hrandfield");
    group.throughput(Throughput::Elements(1));

    group.bench_function("sparse_table", |b| {
        let mut hash = filled(10_000);
        for i in 0..9_900 {
            hash.delete(format!("field:{}", i).as_bytes(), NOW);
        }
        let mut rng = StdRng::seed_from_u64(7);
        b.iter(|| black_box(hash.rand_field(&mut rng, NOW)));
    });

    group.bench_function("distinct_10_of_10k", |b| {
        let mut hash = filled(10_000);
        let mut rng = StdRng::seed_from_u64(7);
        b.iter(|| black_box(hash.rand_fields(10, &mut rng, NOW)));
    });

    group.finish();
}

/// HINCRBY on a single hot field
fn bench_hincrby(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    let mut group = c.benchmark_group("hincrby");
    group.throughput(Throughput::Elements(1));

    group.bench_function("single_counter", |b| {
        b.iter(|| {
            black_box(engine.hincrby(Bytes::from("counters"), Bytes::from("hits"), 1))
        });
    });

    group.finish();
}

/// Keyspace under concurrent access
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let engine = Arc::new(StorageEngine::new());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let engine = Arc::clone(&engine);
                    thread::spawn(move || {
                        let key = Bytes::from(format!("hash:{}", t));
                        for i in 0..10_000 {
                            let field = Bytes::from(format!("field:{}", i));
                            engine.hset(key.clone(), vec![(field.clone(), Bytes::from("v"))]);
                            engine.hget(&key, &field);
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(engine.len());
        });
    });

    group.finish();
}

/// Active expiry over fields that all expired
fn bench_active_expiry(c: &mut Criterion) {
    let mut group = c.benchmark_group("expiry");

    group.bench_function("purge_10k_fields", |b| {
        b.iter(|| {
            let mut hash = HashObject::new(HashConfig::default());
            for i in 0..10_000 {
                hash.set_with_ttl(Bytes::from(format!("f{}", i)), Bytes::from("v"), 1, NOW);
            }
            black_box(hash.purge_expired(NOW + 1_000, usize::MAX));
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_hset,
    bench_hget,
    bench_hscan,
    bench_hrandfield,
    bench_hincrby,
    bench_concurrent,
    bench_active_expiry,
);

criterion_main!(benches);
