//! Hot-potato liveness/latency test (SPEC_FULL.md §4.6, end-to-end scenario 6).
//!
//! Thread 0 starts "hot". A hot thread waits `delay`, then pushes a negated
//! UID to mark the potato as in flight; every thread polls for a negative
//! value, and whichever one receives it becomes hot in turn. Under a
//! correct, live deque exactly one thread is ever hot at a time, and the
//! potato keeps moving until the deadline passes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::container::Deque;
use crate::core::uid::UidGenerator;

use super::TestReport;

/// Runs the potato test for `duration` across `thread_count` threads, with
/// `starting_tid` initially hot and each hot thread holding the potato for
/// `delay` before passing it on.
///
/// # Panics
/// Panics if `thread_count` is `0` or `starting_tid >= thread_count`.
#[must_use]
pub fn run(
    deque: &Arc<dyn Deque<Item = i32>>,
    thread_count: usize,
    starting_tid: usize,
    delay: Duration,
    duration: Duration,
) -> TestReport {
    assert!(thread_count > 0, "thread_count must be at least 1");
    assert!(starting_tid < thread_count, "starting_tid out of range");

    let empty = deque.empty_sentinel();
    let deadline = Instant::now() + duration;

    let ins_each = vec![AtomicU64::new(0); thread_count];
    let rem_each = vec![AtomicU64::new(0); thread_count];
    let rem_empty_each = vec![AtomicU64::new(0); thread_count];
    let hot_count = vec![AtomicU64::new(0); thread_count];

    std::thread::scope(|scope| {
        for tid in 0..thread_count {
            let deque = &*deque;
            let ins_each = &ins_each;
            let rem_each = &rem_each;
            let rem_empty_each = &rem_empty_each;
            let hot_count = &hot_count;
            scope.spawn(move || {
                let gen = UidGenerator::new(thread_count as u32, tid as u32);
                let mut prev = gen.initial();
                let mut hot = tid == starting_tid;
                let mut ins = 0u64;
                let mut rem = 0u64;
                let mut rem_empty = 0u64;

                while Instant::now() < deadline {
                    if hot {
                        hot_count[tid].fetch_add(1, Ordering::Relaxed);
                        std::thread::sleep(delay);
                        if prev == 0 {
                            break;
                        }
                        let negated = -(prev as i64) as i32;
                        deque.right_push(negated, tid);
                        ins += 1;
                        prev = gen.next(prev);
                        hot = false;
                    } else {
                        let popped = deque.right_pop(tid);
                        if popped == empty {
                            rem_empty += 1;
                        } else {
                            rem += 1;
                            if popped < 0 {
                                hot = true;
                            }
                        }
                    }
                }

                ins_each[tid].store(ins, Ordering::Relaxed);
                rem_each[tid].store(rem, Ordering::Relaxed);
                rem_empty_each[tid].store(rem_empty, Ordering::Relaxed);
            });
        }
    });

    let load = |v: &[AtomicU64]| v.iter().map(|x| x.load(Ordering::Relaxed)).collect::<Vec<_>>();
    let mut report = TestReport::from_counts(load(&ins_each), load(&rem_each), load(&rem_empty_each));

    // Liveness check per scenario 6: `remOps >= insOps - N` (at most one
    // potato value per thread left in flight when the deadline hits).
    let total_ins: u64 = report.ins_ops;
    let total_rem: u64 = report.rem_ops;
    let times_hot: Vec<u64> = load(&hot_count);
    let live = total_rem + thread_count as u64 >= total_ins;
    report.notes = if live {
        "verify pass".to_string()
    } else {
        format!("verify fail (liveness: insOps={total_ins} remOps={total_rem}, hot counts={times_hot:?})")
    };
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::of_deque::OfDeque;

    #[test]
    fn short_run_on_of_deque_is_live() {
        let deque: Arc<dyn Deque<Item = i32>> = Arc::new(OfDeque::<512>::new(i32::MIN, 2, false));
        let report = run(&deque, 2, 0, Duration::from_millis(5), Duration::from_millis(200));
        assert_eq!(report.notes, "verify pass", "{report:?}");
    }
}
