//! Phased LIFO order-violation test (SPEC_FULL.md §4.6, invariant I2).
//!
//! Threads alternate between a push phase (each issues `opsPerPhase`
//! `right_push` operations, then waits at a barrier) and a pop phase (each
//! `right_pop`s until empty, then waits at a barrier). Within a pop phase,
//! a consumer must see strictly *decreasing* per-producer counts: the last
//! item a producer pushed that phase must be the first of its items popped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::core::container::Deque;
use crate::core::uid::UidGenerator;

use super::TestReport;

const OPS_PER_PHASE: u32 = 5000;

/// Runs the phased stack-verification test for `duration` across
/// `thread_count` threads sharing `deque`.
///
/// # Panics
/// Panics if `thread_count` is `0`.
#[must_use]
pub fn run(deque: &Arc<dyn Deque<Item = i32>>, thread_count: usize, duration: Duration) -> TestReport {
    assert!(thread_count > 0, "thread_count must be at least 1");

    let empty = deque.empty_sentinel();
    let violations = AtomicU64::new(0);
    let deadline = Instant::now() + duration;
    let barrier = Barrier::new(thread_count);
    let stop = AtomicBool::new(false);

    let ins_each = vec![AtomicU64::new(0); thread_count];
    let rem_each = vec![AtomicU64::new(0); thread_count];
    let rem_empty_each = vec![AtomicU64::new(0); thread_count];
    let phase1_ops = AtomicU64::new(0);
    let phase2_ops = AtomicU64::new(0);

    std::thread::scope(|scope| {
        for tid in 0..thread_count {
            let deque = &*deque;
            let violations = &violations;
            let barrier = &barrier;
            let stop = &stop;
            let ins_each = &ins_each;
            let rem_each = &rem_each;
            let rem_empty_each = &rem_empty_each;
            let phase1_ops = &phase1_ops;
            let phase2_ops = &phase2_ops;
            scope.spawn(move || {
                let gen = UidGenerator::new(thread_count as u32, tid as u32);
                let mut prev = gen.initial();
                let mut ins = 0u64;
                let mut rem = 0u64;
                let mut rem_empty = 0u64;
                let mut phase = 0u64;

                loop {
                    if phase % 2 == 1 {
                        let mut pushed = 0u64;
                        for _ in 0..OPS_PER_PHASE {
                            if prev == 0 {
                                break;
                            }
                            deque.right_push(prev as i32, tid);
                            ins += 1;
                            pushed += 1;
                            prev = gen.next(prev);
                        }
                        phase1_ops.fetch_add(pushed, Ordering::Relaxed);
                    } else {
                        let mut found = vec![u32::MAX; thread_count];
                        let mut popped_this_phase = 0u64;
                        loop {
                            let v = deque.right_pop(tid);
                            if v == empty {
                                rem_empty += 1;
                                break;
                            }
                            let v = v as u32;
                            let producer = gen.id(v) as usize;
                            let count = gen.count(v);
                            if count >= found[producer] {
                                violations.fetch_add(1, Ordering::Relaxed);
                                warn!(
                                    tid,
                                    producer,
                                    count,
                                    last_seen = found[producer],
                                    "LIFO order violation: producer count did not decrease"
                                );
                            }
                            found[producer] = count;
                            rem += 1;
                            popped_this_phase += 1;
                        }
                        phase2_ops.fetch_add(popped_this_phase, Ordering::Relaxed);
                    }

                    // Every thread joins both barriers each round regardless
                    // of the deadline, so a thread never stops mid-round and
                    // strands its peers waiting on a party that never comes.
                    barrier.wait();
                    if tid == 0 {
                        stop.store(Instant::now() >= deadline, Ordering::Relaxed);
                    }
                    barrier.wait();
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    phase += 1;
                }

                ins_each[tid].store(ins, Ordering::Relaxed);
                rem_each[tid].store(rem, Ordering::Relaxed);
                rem_empty_each[tid].store(rem_empty, Ordering::Relaxed);
            });
        }
    });

    let load = |v: &[AtomicU64]| v.iter().map(|x| x.load(Ordering::Relaxed)).collect::<Vec<_>>();
    let mut report = TestReport::from_counts(load(&ins_each), load(&rem_each), load(&rem_empty_each));
    report.phase1_ops = phase1_ops.load(Ordering::Relaxed);
    report.phase2_ops = phase2_ops.load(Ordering::Relaxed);
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
        let deque: Arc<dyn Deque<Item = i32>> = Arc::new(OfDeque::<512>::new(i32::MIN, 4, false));
        let report = run(&deque, 4, Duration::from_millis(300));
        assert_eq!(report.notes, "verify pass", "{report:?}");
    }
}
