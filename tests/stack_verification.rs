//! End-to-end scenario 4 (SPEC_FULL.md §8): N=8 phased stack verification,
//! 5s, `opsPerPhase=5000`, asserting `phase1_ops <= N * opsPerPhase`.

use std::sync::Arc;
use std::time::Duration;

use lfdeque::core::container::Deque;
use lfdeque::core::of_deque::OfDeque;
use lfdeque::verify::stack;

const EMPTY: i32 = i32::MIN;
const THREADS: usize = 8;
const OPS_PER_PHASE: u64 = 5000;

#[test]
fn eight_threads_of_deque_phased_stack_passes() {
    let deque: Arc<dyn Deque<Item = i32>> = Arc::new(OfDeque::<1024>::new(EMPTY, THREADS, false));
    let report = stack::run(&deque, THREADS, Duration::from_secs(5));
    assert_eq!(report.notes, "verify pass", "{report:?}");
    assert!(
        report.phase1_ops <= THREADS as u64 * OPS_PER_PHASE,
        "phase1_ops {} exceeds N*opsPerPhase {}",
        report.phase1_ops,
        THREADS as u64 * OPS_PER_PHASE
    );
}
