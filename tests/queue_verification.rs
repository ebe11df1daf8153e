//! End-to-end scenario 3 (SPEC_FULL.md §8): two threads running the queue
//! verification test against both deque implementations with elimination
//! enabled on OFDeque.

use std::sync::Arc;
use std::time::Duration;

use lfdeque::core::container::Deque;
use lfdeque::core::mm_deque::MmDeque;
use lfdeque::core::of_deque::OfDeque;
use lfdeque::verify::queue;

const EMPTY: i32 = i32::MIN;

#[test]
fn two_threads_of_deque_with_elimination_passes() {
    let deque: Arc<dyn Deque<Item = i32>> = Arc::new(OfDeque::<1024>::new(EMPTY, 2, true));
    let report = queue::run(&deque, 2, Duration::from_secs(2));
    assert_eq!(report.notes, "verify pass", "{report:?}");
}

#[test]
fn two_threads_mm_deque_passes() {
    let deque: Arc<dyn Deque<Item = i32>> = Arc::new(MmDeque::new(EMPTY, 2));
    let report = queue::run(&deque, 2, Duration::from_secs(2));
    assert_eq!(report.notes, "verify pass", "{report:?}");
}

#[test]
fn eight_threads_of_deque_small_buffer_forces_append_and_seal_paths() {
    let deque: Arc<dyn Deque<Item = i32>> = Arc::new(OfDeque::<512>::new(EMPTY, 8, false));
    let report = queue::run(&deque, 8, Duration::from_millis(500));
    assert_eq!(report.notes, "verify pass", "{report:?}");
}
