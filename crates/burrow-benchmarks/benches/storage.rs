//! Storage benchmarks
//!
//! Measures the serialized update path of the in-memory backend, alone and
//! under contention, plus tarball round trips.

use std::sync::Arc;

use burrow_benchmarks::{criterion_config, package_record};
use burrow_core::types::{PackageRecord, VersionManifest};
use burrow_storage::{MemoryStorage, PackageStorage};
use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

/// Benchmark single updates against documents of different sizes
fn bench_update_package(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_package");
    let rt = runtime();

    for count in [10, 100, 1000].iter() {
        let storage = MemoryStorage::with_data(vec![package_record("pkg", *count)], Vec::new()).unwrap();

        group.bench_with_input(BenchmarkId::new("versions", count), &storage, |b, storage| {
            b.iter(|| {
                rt.block_on(async {
                    let updated = storage
                        .update_package(
                            "pkg",
                            Box::new(|record: &mut PackageRecord| {
                                record.dist_tags.insert("next".to_string(), "9.9.9".to_string());
                                Ok(())
                            }),
                            None,
                        )
                        .await
                        .unwrap();
                    black_box(updated)
                })
            });
        });
    }

    group.finish();
}

/// Benchmark concurrent updates that all target one package
fn bench_contended_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_updates");
    group.measurement_time(std::time::Duration::from_secs(10));
    group.sample_size(20);
    let rt = runtime();

    for writers in [1, 4, 16].iter() {
        group.throughput(Throughput::Elements(*writers as u64));

        group.bench_with_input(BenchmarkId::new("writers", writers), writers, |b, &writers| {
            b.iter(|| {
                let storage = Arc::new(MemoryStorage::with_data(vec![package_record("pkg", 50)], Vec::new()).unwrap());
                rt.block_on(async {
                    let tasks: Vec<_> = (0..writers)
                        .map(|i| {
                            let storage = Arc::clone(&storage);
                            tokio::spawn(async move {
                                let version = format!("100.0.{}", i);
                                storage
                                    .update_package(
                                        "pkg",
                                        Box::new(move |record: &mut PackageRecord| {
                                            record.versions.insert(version.clone(), VersionManifest::new(version));
                                            Ok(())
                                        }),
                                        None,
                                    )
                                    .await
                            })
                        })
                        .collect();
                    for task in tasks {
                        black_box(task.await.unwrap().unwrap());
                    }
                });
            });
        });
    }

    group.finish();
}

/// Benchmark writing a tarball and reading it back
fn bench_tarball_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("tarball_round_trip");
    let rt = runtime();

    for size in [16 * 1024, 1024 * 1024].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        let payload = Bytes::from(vec![42u8; *size]);

        group.bench_with_input(BenchmarkId::new("bytes", size), &payload, |b, payload| {
            b.iter(|| {
                rt.block_on(async {
                    let storage = MemoryStorage::new();
                    let mut upload = storage.write_tarball("pkg.tgz").await.unwrap();
                    upload.write(payload.clone()).await.unwrap();
                    upload.done().await.unwrap();

                    let stream = storage.read_tarball("pkg.tgz").await.unwrap();
                    black_box(stream.into_bytes().await.unwrap())
                })
            });
        });
    }

    group.finish();
}

criterion_group! {
    name = benches;
    config = criterion_config();
    targets = bench_update_package, bench_contended_updates, bench_tarball_round_trip
}
criterion_main!(benches);
