//! `AllocatorChurnTest` (SPEC_FULL.md §4.1, §8 I4, end-to-end scenario 5).
//!
//! N threads alloc/free blocks against a shared, tracking-enabled
//! `BlockPool` for a fixed duration, occasionally freeing into a peer
//! thread's list (cross-thread free is part of the contract). Afterward no
//! pointer may appear in more than one thread's outstanding set.

use std::time::{Duration, Instant};

use lfdeque::core::memory::BlockPool;
use lfdeque::core::rand::HarnessRng;

const THREADS: usize = 4;

#[test]
fn no_pointer_is_outstanding_under_two_threads_at_once() {
    let pool: BlockPool<[u8; 64]> = BlockPool::with_tracking(THREADS);
    let deadline = Instant::now() + Duration::from_millis(300);

    std::thread::scope(|scope| {
        for tid in 0..THREADS {
            let pool = &pool;
            scope.spawn(move || {
                let mut rng = HarnessRng::new(tid as u64 + 1);
                let mut held = Vec::new();
                while Instant::now() < deadline {
                    let block = pool.alloc(tid).expect("allocation must succeed under test");
                    held.push(block);
                    if held.len() > 4 || rng.next_bounded(2) == 0 {
                        let idx = rng.next_bounded(held.len() as u32) as usize;
                        let block = held.swap_remove(idx);
                        let target = rng.next_bounded(THREADS as u32) as usize;
                        pool.free_block(block, target);
                    }
                }
                for block in held {
                    pool.free_block(block, tid);
                }
            });
        }
    });

    let snapshots = pool.outstanding_snapshot();
    let mut seen = std::collections::HashSet::new();
    for set in &snapshots {
        for ptr in set {
            assert!(seen.insert(*ptr), "pointer {ptr:#x} outstanding under more than one thread");
        }
    }
}
