//! Hazard-pointer memory reclamation, generalized over the block type `T`
//! and the number of hazard slots a thread needs (`K` — 2 for OFDeque, 3 for
//! MMDeque). Each consumer constructs its own tracker; there is no global
//! hazard domain, matching SPEC_FULL.md's "construct explicit context
//! values" redesign note for the historical global-singleton idioms.

use std::collections::HashSet;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::block_pool::{BlockPool, BlockPtr};

const CACHE_LINE: usize = 64;

#[repr(align(64))]
struct CacheAligned<T>(T);

// SAFETY: `retired` only ever stores `NonNull<T>` values obtained from the
// same `BlockPool<T>` passed in at construction and never dereferences them;
// the pointee is only read/written through the pool's own alloc/free path,
// which is itself thread-safe. `NonNull<T>` is otherwise !Send/!Sync purely
// because it *could* alias a `&mut T`, which doesn't apply to opaque block
// handles.
unsafe impl<T> Send for HazardTracker<T> {}
unsafe impl<T> Sync for HazardTracker<T> {}

pub struct HazardTracker<T> {
    thread_count: usize,
    slots_per_thread: usize,
    freq: usize,
    collect: bool,
    slots: Vec<CacheAligned<AtomicPtr<T>>>,
    retired: Vec<Mutex<Vec<NonNull<T>>>>,
    cntrs: Vec<CacheAligned<AtomicUsize>>,
    pool: Arc<BlockPool<T>>,
}

impl<T> HazardTracker<T> {
    /// `collect` defaults to `true`: every `freq`-th retirement on a thread
    /// triggers that thread's scan. Pass `collect = false` to defer all
    /// scanning to explicit `empty` calls (used by tests that want a
    /// deterministic point to inspect the retired list).
    #[must_use]
    pub fn new(thread_count: usize, slots_per_thread: usize, freq: usize, pool: Arc<BlockPool<T>>) -> Self {
        Self::with_collect(thread_count, slots_per_thread, freq, pool, true)
    }

    #[must_use]
    pub fn with_collect(
        thread_count: usize,
        slots_per_thread: usize,
        freq: usize,
        pool: Arc<BlockPool<T>>,
        collect: bool,
    ) -> Self {
        let mut slots = Vec::with_capacity(thread_count * slots_per_thread);
        for _ in 0..thread_count * slots_per_thread {
            slots.push(CacheAligned(AtomicPtr::new(std::ptr::null_mut())));
        }
        let retired = (0..thread_count).map(|_| Mutex::new(Vec::new())).collect();
        let cntrs = (0..thread_count)
            .map(|_| CacheAligned(AtomicUsize::new(0)))
            .collect();
        Self {
            thread_count,
            slots_per_thread,
            freq,
            collect,
            slots,
            retired,
            cntrs,
            pool,
        }
    }

    fn index(&self, tid: usize, slot: usize) -> usize {
        debug_assert!(tid < self.thread_count);
        debug_assert!(slot < self.slots_per_thread);
        tid * self.slots_per_thread + slot
    }

    /// Publishes `ptr` into `slots[tid*K + slot]` with release semantics.
    pub fn reserve(&self, ptr: *mut T, slot: usize, tid: usize) {
        let i = self.index(tid, slot);
        self.slots[i].0.store(ptr, Ordering::Release);
    }

    pub fn clear_slot(&self, slot: usize, tid: usize) {
        let i = self.index(tid, slot);
        self.slots[i].0.store(std::ptr::null_mut(), Ordering::Release);
    }

    pub fn clear_all(&self, tid: usize) {
        for slot in 0..self.slots_per_thread {
            self.clear_slot(slot, tid);
        }
    }

    /// Appends `ptr` to thread `tid`'s retired list. If the thread's
    /// retirement counter has reached `freq`, triggers `empty(tid)` first
    /// (matching the historical check-then-reset-then-increment order).
    pub fn retire(&self, ptr: *mut T, tid: usize) {
        let Some(nn) = NonNull::new(ptr) else {
            return;
        };
        {
            let mut trash = self.retired[tid].lock();
            debug_assert!(
                !trash.contains(&nn),
                "pointer retired twice by the same thread before a free"
            );
            trash.push(nn);
        }
        if self.collect && self.cntrs[tid].0.load(Ordering::Relaxed) == self.freq {
            self.cntrs[tid].0.store(0, Ordering::Relaxed);
            self.empty(tid);
        }
        self.cntrs[tid].0.fetch_add(1, Ordering::Relaxed);
    }

    /// Scans all `N*K` hazard slots; frees via the backing `BlockPool` every
    /// retired pointer not currently named by any slot. Bounded to a single
    /// pass over the retired list — the historical iterate-and-erase loop's
    /// exact resumption semantics are not reproduced, only its outcome
    /// (every non-hazarded pointer is eventually freed).
    pub fn empty(&self, tid: usize) {
        let hazarded: HashSet<usize> = self
            .slots
            .iter()
            .map(|s| s.0.load(Ordering::Acquire) as usize)
            .filter(|addr| *addr != 0)
            .collect();
        let mut trash = self.retired[tid].lock();
        let before = trash.len();
        let mut freed = 0usize;
        trash.retain(|ptr| {
            if hazarded.contains(&(ptr.as_ptr() as usize)) {
                true
            } else {
                self.pool.free_block(BlockPtr(*ptr), tid);
                freed += 1;
                false
            }
        });
        debug!(tid, freed, still_retired = trash.len(), "hazard scan reclaimed retired blocks");
        if freed == 0 && before > 0 {
            warn!(tid, retired = before, "hazard scan reclaimed nothing; every retired block is still hazarded");
        }
    }

    #[must_use]
    pub fn retired_len(&self, tid: usize) -> usize {
        self.retired[tid].lock().len()
    }
}

const _ALIGNMENT_CHECK: () = assert!(std::mem::align_of::<CacheAligned<u8>>() == CACHE_LINE);

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(align(8))]
    struct Cell(u64);

    #[test]
    fn hazarded_pointer_survives_empty() {
        let pool = Arc::new(BlockPool::<Cell>::new(2));
        let tracker = HazardTracker::with_collect(2, 2, 100, pool.clone(), false);
        let block = pool.alloc(0).unwrap();
        tracker.reserve(block.0.as_ptr(), 0, 1);
        tracker.retire(block.0.as_ptr(), 0);
        tracker.empty(0);
        assert_eq!(tracker.retired_len(0), 1, "hazarded pointer must not be freed");
        tracker.clear_slot(0, 1);
        tracker.empty(0);
        assert_eq!(tracker.retired_len(0), 0);
    }

    #[test]
    fn auto_scan_fires_at_freq() {
        let pool = Arc::new(BlockPool::<Cell>::new(1));
        let tracker = HazardTracker::new(1, 2, 2, pool.clone());
        let a = pool.alloc(0).unwrap();
        let b = pool.alloc(0).unwrap();
        tracker.retire(a.0.as_ptr(), 0);
        tracker.retire(b.0.as_ptr(), 0);
        // Third retire crosses freq=2 and triggers a scan first.
        let c = pool.alloc(0).unwrap();
        tracker.retire(c.0.as_ptr(), 0);
        assert_eq!(tracker.retired_len(0), 1);
    }

    #[test]
    #[should_panic(expected = "retired twice")]
    fn double_retire_is_a_bug() {
        let pool = Arc::new(BlockPool::<Cell>::new(1));
        let tracker = HazardTracker::with_collect(1, 1, 100, pool.clone(), false);
        let a = pool.alloc(0).unwrap();
        tracker.retire(a.0.as_ptr(), 0);
        tracker.retire(a.0.as_ptr(), 0);
    }
}
