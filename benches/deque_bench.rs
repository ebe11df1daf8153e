//! Single-thread and contended throughput benchmarks for both deques.
//!
//! Run with `cargo bench --features profiling`.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use lfdeque::core::container::Deque;
use lfdeque::core::mm_deque::MmDeque;
use lfdeque::core::of_deque::OfDeque;

const EMPTY: i32 = i32::MIN;

fn single_thread_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread_push_pop");

    group.bench_function("of_deque", |b| {
        let deque = OfDeque::<1024>::new(EMPTY, 1, false);
        b.iter(|| {
            deque.right_push(1, 0);
            deque.left_pop(0);
        });
    });

    group.bench_function("mm_deque", |b| {
        let deque = MmDeque::new(EMPTY, 1);
        b.iter(|| {
            deque.right_push(1, 0);
            deque.left_pop(0);
        });
    });

    group.finish();
}

fn contended_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_push_pop");

    for threads in [2usize, 4, 8] {
        group.bench_with_input(BenchmarkId::new("of_deque", threads), &threads, |b, &threads| {
            b.iter(|| {
                let deque: Arc<dyn Deque<Item = i32>> = Arc::new(OfDeque::<1024>::new(EMPTY, threads, false));
                std::thread::scope(|scope| {
                    for tid in 0..threads {
                        let deque = &deque;
                        scope.spawn(move || {
                            for i in 0..1000 {
                                deque.right_push(i, tid);
                                deque.left_pop(tid);
                            }
                        });
                    }
                });
            });
        });

        group.bench_with_input(BenchmarkId::new("mm_deque", threads), &threads, |b, &threads| {
            b.iter(|| {
                let deque: Arc<dyn Deque<Item = i32>> = Arc::new(MmDeque::new(EMPTY, threads));
                std::thread::scope(|scope| {
                    for tid in 0..threads {
                        let deque = &deque;
                        scope.spawn(move || {
                            for i in 0..1000 {
                                deque.right_push(i, tid);
                                deque.left_pop(tid);
                            }
                        });
                    }
                });
            });
        });
    }

    group.finish();
}

criterion_group!(benches, single_thread_push_pop, contended_push_pop);
criterion_main!(benches);
