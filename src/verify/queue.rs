//! FIFO order-violation test (SPEC_FULL.md §4.6, invariant I1).
//!
//! Each thread alternates `right_push(uid)` with `left_pop`. A popped value
//! decodes to `(producer_tid, count)`; since each producer's own counts
//! strictly increase, any FIFO-correct queue must deliver them to *some*
//! consumer in increasing-count order per producer, regardless of how pushes
//! and pops from different threads interleave.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::core::container::Deque;
use crate::core::uid::UidGenerator;

use super::TestReport;

/// Runs the queue-verification test for `duration` across `thread_count`
/// threads, each producing into and draining from the same `deque`.
///
/// # Panics
/// Panics if `thread_count` is `0`.
#[must_use]
pub fn run(deque: &Arc<dyn Deque<Item = i32>>, thread_count: usize, duration: Duration) -> TestReport {
    assert!(thread_count > 0, "thread_count must be at least 1");

    let empty = deque.empty_sentinel();
    let violations = AtomicU64::new(0);
    let deadline = Instant::now() + duration;

    let ins_each = vec![AtomicU64::new(0); thread_count];
    let rem_each = vec![AtomicU64::new(0); thread_count];
    let rem_empty_each = vec![AtomicU64::new(0); thread_count];

    std::thread::scope(|scope| {
        for tid in 0..thread_count {
            let deque = &*deque;
            let violations = &violations;
            let ins_each = &ins_each;
            let rem_each = &rem_each;
            let rem_empty_each = &rem_empty_each;
            scope.spawn(move || {
                let gen = UidGenerator::new(thread_count as u32, tid as u32);
                let mut found = vec![0u32; thread_count];
                let mut prev = gen.initial();
                let mut ins = 0u64;
                let mut rem = 0u64;
                let mut rem_empty = 0u64;

                while Instant::now() < deadline {
                    if prev == 0 {
                        break;
                    }
                    deque.right_push(prev as i32, tid);
                    ins += 1;

                    let popped = deque.left_pop(tid);
                    if popped == empty {
                        rem_empty += 1;
                    } else {
                        let v = popped as u32;
                        let producer = gen.id(v) as usize;
                        let count = gen.count(v);
                        if count <= found[producer] {
                            violations.fetch_add(1, Ordering::Relaxed);
                            warn!(
                                tid,
                                producer,
                                count,
                                last_seen = found[producer],
                                "FIFO order violation: producer count did not increase"
                            );
                        } else {
                            found[producer] = count;
                        }
                        rem += 1;
                    }

                    prev = gen.next(prev);
                }

                ins_each[tid].store(ins, Ordering::Relaxed);
                rem_each[tid].store(rem, Ordering::Relaxed);
                rem_empty_each[tid].store(rem_empty, Ordering::Relaxed);
            });
        }
    });

    let load = |v: &[AtomicU64]| v.iter().map(|x| x.load(Ordering::Relaxed)).collect::<Vec<_>>();
    let mut report = TestReport::from_counts(load(&ins_each), load(&rem_each), load(&rem_empty_each));
    let violation_count = violations.load(Ordering::Relaxed);
    report.notes = if violation_count == 0 {
        "verify pass".to_string()
    } else {
        format!("verify fail ({violation_count} violations)")
    };
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::of_deque::OfDeque;

    #[test]
    fn short_run_on_of_deque_passes() {
        let deque: Arc<dyn Deque<Item = i32>> =
            Arc::new(OfDeque::<512>::new(i32::MIN, 4, false));
        let report = run(&deque, 4, Duration::from_millis(200));
        assert_eq!(report.notes, "verify pass", "{report:?}");
        assert!(report.ins_ops > 0);
    }
}
