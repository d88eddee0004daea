//! Benchmarks for priority queue operations using criterion.
//!
//! These benchmarks measure the queue over the in-memory ordered store:
//! - Single enqueue
//! - Peek of the first page of a populated queue
//! - Dequeue with contention from concurrent consumers
//! - Typed round trip (enqueue_json -> dequeue_json) of a notebook descriptor

#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use spawnq::*;
use spawnq_testkit::{InMemoryOrderedStore, running_notebook};
use tokio::runtime::Runtime;

/// Creates a tokio runtime for async benchmarks.
fn create_runtime() -> Runtime {
    Runtime::new().expect("Failed to create tokio runtime")
}

fn new_queue() -> Arc<PriorityQueue<InMemoryOrderedStore>> {
    Arc::new(PriorityQueue::new(InMemoryOrderedStore::new(), "spawnq:bench"))
}

/// Benchmark: Enqueue single entry.
fn bench_enqueue_single(c: &mut Criterion) {
    let rt = create_runtime();

    let mut group = c.benchmark_group("enqueue_single");
    group.sample_size(100);

    group.bench_function("in_memory", |b| {
        let queue = new_queue();
        let mut seq: u64 = 0;

        b.to_async(&rt).iter(|| {
            seq += 1;
            let queue = Arc::clone(&queue);
            let payload = seq.to_be_bytes();
            async move {
                queue
                    .enqueue((seq % 3) as f64, &payload)
                    .await
                    .expect("enqueue should succeed");
            }
        });
    });

    group.finish();
}

/// Benchmark: Peek the first page of queues of increasing depth.
fn bench_peek_page(c: &mut Criterion) {
    let rt = create_runtime();

    let mut group = c.benchmark_group("peek_page");
    for depth in [100u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(depth));
        group.bench_with_input(BenchmarkId::new("depth", depth), &depth, |b, &depth| {
            let queue = new_queue();
            rt.block_on(async {
                for i in 0..depth {
                    queue.enqueue(i as f64, &i.to_be_bytes()).await.unwrap();
                }
            });

            b.to_async(&rt).iter(|| async {
                let page = queue
                    .peek_range(ScoreRange::all(), 0, 50)
                    .await
                    .expect("peek should succeed");
                assert_eq!(page.len(), 50);
            });
        });
    }
    group.finish();
}

/// Benchmark: Dequeue with contention.
///
/// Several consumers pop concurrently from one key; every pop is the atomic
/// take of the lowest score.
fn bench_dequeue_contention(c: &mut Criterion) {
    let rt = create_runtime();

    let mut group = c.benchmark_group("dequeue_contention");
    group.sample_size(50);

    for workers in [1usize, 5, 10, 20] {
        group.bench_with_input(
            BenchmarkId::new("workers", workers),
            &workers,
            |b, &workers| {
                let queue = new_queue();

                b.to_async(&rt).iter(|| {
                    let queue = Arc::clone(&queue);
                    async move {
                        for i in 0..workers as u64 {
                            queue.enqueue(i as f64, &i.to_be_bytes()).await.unwrap();
                        }

                        let mut handles = Vec::with_capacity(workers);
                        for _ in 0..workers {
                            let queue = Arc::clone(&queue);
                            handles.push(tokio::spawn(async move {
                                let _ = queue.dequeue_highest(ScoreRange::all()).await;
                            }));
                        }
                        for handle in handles {
                            let _ = handle.await;
                        }
                    }
                });
            },
        );
    }

    group.finish();
}

/// Benchmark: Typed descriptor round trip through the queue.
fn bench_descriptor_round_trip(c: &mut Criterion) {
    let rt = create_runtime();

    let mut group = c.benchmark_group("descriptor_round_trip");
    group.bench_function("in_memory", |b| {
        let queue = new_queue();
        let descriptor = running_notebook();

        b.to_async(&rt).iter(|| async {
            queue
                .enqueue_json(PriorityBand::High, &descriptor)
                .await
                .unwrap();
            let back: NotebookDescriptor = queue.dequeue_json(ScoreRange::all()).await.unwrap();
            assert_eq!(back.id, descriptor.id);
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_enqueue_single,
    bench_peek_page,
    bench_dequeue_contention,
    bench_descriptor_round_trip
);
criterion_main!(benches);
