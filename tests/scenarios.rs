//! Literal end-to-end scenarios from SPEC_FULL.md §8.
//!
//! Scenarios 3-6 are exercised by the `verify` module's own tests (queue,
//! stack, and potato runs against live deques); this file covers the two
//! deterministic, single-threaded sequences (1-2) plus a cross-check that
//! both deques agree on the same literal traces.

use lfdeque::core::container::Deque;
use lfdeque::core::mm_deque::MmDeque;
use lfdeque::core::of_deque::OfDeque;

const EMPTY: i32 = i32::MIN;

#[test]
fn scenario_1_single_thread_of_deque_1024() {
    let deque = OfDeque::<1024>::new(EMPTY, 1, false);
    deque.right_push(1, 0);
    deque.right_push(2, 0);
    deque.left_push(3, 0);
    assert_eq!(deque.right_pop(0), 2);
    assert_eq!(deque.left_pop(0), 3);
    assert_eq!(deque.left_pop(0), 1);
    assert_eq!(deque.left_pop(0), EMPTY);
}

#[test]
fn scenario_2_single_thread_of_deque_1024() {
    let deque = OfDeque::<1024>::new(EMPTY, 1, false);
    deque.left_push(10, 0);
    deque.right_push(20, 0);
    deque.left_push(30, 0);
    assert_eq!(deque.right_pop(0), 20);
    assert_eq!(deque.right_pop(0), 10);
    assert_eq!(deque.right_pop(0), 30);
    assert_eq!(deque.right_pop(0), EMPTY);
}

#[test]
fn scenario_1_holds_on_mm_deque_too() {
    let deque = MmDeque::new(EMPTY, 1);
    deque.right_push(1, 0);
    deque.right_push(2, 0);
    deque.left_push(3, 0);
    assert_eq!(deque.right_pop(0), 2);
    assert_eq!(deque.left_pop(0), 3);
    assert_eq!(deque.left_pop(0), 1);
    assert_eq!(deque.left_pop(0), EMPTY);
}
