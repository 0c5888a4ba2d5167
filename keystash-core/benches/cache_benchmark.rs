use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use keystash_core::remote::MemoryRemote;
use keystash_core::{BackendRegistry, Cache, CacheKey, StorageKind};
use serde_json::json;
use std::hint::black_box;
use std::sync::Arc;
use std::thread;

fn local_cache(key: &str) -> Cache {
    Cache::with_registry(key, Arc::new(BackendRegistry::new()))
}

fn remote_cache(key: &str) -> Cache {
    let registry = BackendRegistry::new();
    registry.configure_remote(Arc::new(MemoryRemote::connect("bench")));
    Cache::with_registry(key, Arc::new(registry))
}

fn backends() -> Vec<(&'static str, fn(&str) -> Cache)> {
    vec![("local", local_cache), ("memory", remote_cache)]
}

fn bench_key_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_derivation");

    group.bench_function("string", |b| {
        b.iter(|| CacheKey::derive(black_box("us-east-1/prod/web")))
    });

    for size in [4, 64, 1024].iter() {
        let items: Vec<String> = (0..*size).rev().map(|i| format!("item{}", i)).collect();
        group.bench_with_input(BenchmarkId::new("collection", size), &items, |b, items| {
            b.iter(|| CacheKey::derive(black_box(items)))
        });
    }

    group.finish();
}

fn bench_init(c: &mut Criterion) {
    let mut group = c.benchmark_group("init");

    for (backend, build) in backends() {
        group.bench_function(BenchmarkId::new("existing", backend), |b| {
            let cache = build("bench-init");
            cache.init("items", StorageKind::Sequence).unwrap();
            b.iter(|| cache.init(black_box("items"), StorageKind::Sequence).unwrap())
        });
    }

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");

    for (backend, build) in backends() {
        group.bench_function(BenchmarkId::new("hit", backend), |b| {
            let cache = build("bench-get");
            cache.init("items", StorageKind::Mapping).unwrap();
            b.iter(|| black_box(cache.get("items").unwrap()))
        });
    }

    group.finish();
}

fn bench_clear(c: &mut Criterion) {
    let mut group = c.benchmark_group("clear");

    for (backend, build) in backends() {
        for handles in [1, 10].iter() {
            let cache = build("bench-clear");
            for i in 0..*handles {
                cache.init(&format!("list{}", i), StorageKind::Sequence).unwrap();
            }
            group.bench_with_input(
                BenchmarkId::new(backend, handles),
                handles,
                |b, &handles| {
                    b.iter(|| {
                        for i in 0..handles {
                            let list = cache.sequence(&format!("list{}", i)).unwrap().unwrap();
                            list.push(json!(i)).unwrap();
                        }
                        cache.clear(&[]).unwrap()
                    })
                },
            );
        }
    }

    group.finish();
}

fn bench_concurrent_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_get");

    for threads in [2, 4, 8].iter() {
        group.bench_with_input(
            BenchmarkId::new("local", threads),
            threads,
            |b, &threads| {
                let cache = Arc::new(local_cache("bench-concurrent"));
                cache.init("items", StorageKind::Sequence).unwrap();
                b.iter(|| {
                    let handles: Vec<_> = (0..threads)
                        .map(|_| {
                            let cache = Arc::clone(&cache);
                            thread::spawn(move || {
                                for _ in 0..100 {
                                    black_box(cache.get("items").unwrap());
                                }
                            })
                        })
                        .collect();

                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_key_derivation,
    bench_init,
    bench_get,
    bench_clear,
    bench_concurrent_get
);
criterion_main!(benches);
