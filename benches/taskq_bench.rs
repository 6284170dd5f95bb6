use criterion::{black_box, BatchSize, Criterion};
use criterion::{criterion_group, criterion_main};
use rand::prelude::*;
use slog::{o, Logger};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use taskq::TaskQueue;

/// 生成100个随机大小的自旋负载
fn generate_workloads() -> Vec<u32> {
    let mut workloads = Vec::with_capacity(100);
    let mut rng = rand::thread_rng();

    for _ in 0..100 {
        workloads.push(rng.gen_range(1, 10_001));
    }

    workloads
}

fn spin(n: u32) {
    let mut acc = 0u64;
    for i in 0..n {
        acc = acc.wrapping_add(u64::from(i));
    }
    black_box(acc);
}

fn dispatch_bench(c: &mut Criterion) {
    let workloads = generate_workloads();
    let threads = num_cpus::get() as u32;
    let mut group = c.benchmark_group("dispatch_bench");

    group.bench_function("taskq", |b| {
        b.iter_batched(
            || {
                // 创建一个空闲的taskq
                let logger = Logger::root(slog::Discard, o!());
                TaskQueue::new("bench", threads, 0, 1024, false, logger).unwrap()
            },
            |queue| {
                let counter = Arc::new(AtomicUsize::new(0));
                for &w in workloads.iter() {
                    let counter = Arc::clone(&counter);
                    let res = queue.dispatch(move || {
                        spin(w);
                        counter.fetch_add(1, Ordering::SeqCst);
                    });
                    assert!(res.is_ok());
                }
                queue.wait();
                assert_eq!(counter.load(Ordering::SeqCst), workloads.len());
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("rayon", |b| {
        b.iter_batched(
            || {
                // 创建一个等量线程的rayon线程池
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads as usize)
                    .build()
                    .unwrap()
            },
            |pool| {
                let counter = AtomicUsize::new(0);
                pool.scope(|s| {
                    for &w in workloads.iter() {
                        let counter = &counter;
                        s.spawn(move |_| {
                            spin(w);
                            counter.fetch_add(1, Ordering::SeqCst);
                        });
                    }
                });
                assert_eq!(counter.load(Ordering::SeqCst), workloads.len());
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, dispatch_bench);
criterion_main!(benches);
