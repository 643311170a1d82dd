//! Tick Benchmarks
//!
//! Measures the per-frame cost of the request manager:
//! - Registration: handle allocation plus registry insert
//! - Tick over many in-flight requests (drive, reap, dispatch)
//! - Batch fan-out and aggregate completion
//!
//! Run with: `cargo bench --bench tick_benchmarks`

#![allow(missing_docs)] // Benchmarks don't need extensive docs
#![allow(clippy::expect_used)] // Benchmarks can use expect for setup

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use std::time::Duration;
use tickwire_core::{Callbacks, RequestKind};
use tickwire_runtime::RequestManager;
use tickwire_testing::{CallbackRecorder, InMemoryPersistence, MockTransport};

const FRAME: Duration = Duration::from_millis(16);

fn manager() -> RequestManager {
    RequestManager::builder(Arc::new(MockTransport::new()))
        .persistence(Arc::new(InMemoryPersistence::new()))
        .build()
}

fn bench_register(c: &mut Criterion) {
    c.bench_function("register_single", |b| {
        b.iter_batched(
            manager,
            |manager| {
                let handle = manager.register(RequestKind::Single, Callbacks::new());
                black_box((handle, manager))
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_tick_many(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick_many");

    for count in [10usize, 100, 1_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || {
                    let manager = manager();
                    let recorder = CallbackRecorder::new();
                    for i in 0..count {
                        manager
                            .submit_get(&format!("http://bench/{i}"), recorder.callbacks())
                            .expect("submit");
                    }
                    (manager, recorder)
                },
                |(manager, recorder)| {
                    let report = manager.tick(FRAME);
                    black_box((report, recorder.completions().len()))
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_batch_fan_out(c: &mut Criterion) {
    let urls: Vec<String> = (0..64).map(|i| format!("http://bench/batch/{i}")).collect();

    c.bench_function("batch_64_issue_and_tick", |b| {
        b.iter_batched(
            manager,
            |manager| {
                let handle = manager
                    .submit_get_many(&urls, Callbacks::new().on_all_complete(|_| {}))
                    .expect("submit");
                let report = manager.tick(FRAME);
                black_box((handle, report))
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_idle_tick(c: &mut Criterion) {
    let manager = manager();

    c.bench_function("idle_tick", |b| {
        b.iter(|| black_box(manager.tick(FRAME)));
    });
}

criterion_group!(
    benches,
    bench_register,
    bench_tick_many,
    bench_batch_fan_out,
    bench_idle_tick
);
criterion_main!(benches);
