//! Per-thread free-list allocator of fixed-size, type-stable blocks.
//!
//! Generalizes the shared-pool design in the historical lock-free allocator
//! into the contract OFDeque/MMDeque actually need: each thread owns a free
//! list (`alloc(tid)` draws from it, falling back to the system allocator),
//! and any thread may push a block back onto *any* thread's list
//! (`free_block(ptr, tid)` — cross-thread free is explicitly allowed). A
//! block's type never changes across its lifetime, which is what makes the
//! ABA counters embedded in OFDeque slots and the MMDeque anchor generation
//! sound: a freed-and-reused block is always reused as the same `T`.

use std::alloc::{Layout, alloc, dealloc};
use std::collections::HashSet;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::queue::SegQueue;
use parking_lot::Mutex;

use super::allocator::{AllocError, validate_cell_layout};

const CACHE_LINE: usize = 64;

#[repr(align(64))]
struct CacheAligned<T>(T);

/// A raw block handle. `BlockPool` hands these out uninitialized; the caller
/// is responsible for constructing/destructing the `T` value they point at.
pub struct BlockPtr<T>(pub NonNull<T>);

impl<T> Clone for BlockPtr<T> {
    fn clone(&self) -> Self {
        Self(self.0)
    }
}
impl<T> Copy for BlockPtr<T> {}

// SAFETY: blocks are handed between threads only through `BlockPool`, which
// never dereferences them itself; ownership transfer is the caller's
// responsibility same as with `Box`.
unsafe impl<T> Send for BlockPtr<T> {}

pub struct BlockPool<T> {
    thread_count: usize,
    free_lists: Vec<CacheAligned<SegQueue<BlockPtr<T>>>>,
    allocated_total: AtomicUsize,
    outstanding: Option<Vec<Mutex<HashSet<usize>>>>,
}

impl<T> BlockPool<T> {
    #[must_use]
    pub fn new(thread_count: usize) -> Self {
        Self::build(thread_count, false)
    }

    /// Enables per-thread outstanding-allocation tracking, used by
    /// `AllocatorChurnTest` (I4: no pointer is ever outstanding in two
    /// threads' accounting at once).
    #[must_use]
    pub fn with_tracking(thread_count: usize) -> Self {
        Self::build(thread_count, true)
    }

    fn build(thread_count: usize, track: bool) -> Self {
        let mut free_lists = Vec::with_capacity(thread_count);
        for _ in 0..thread_count {
            free_lists.push(CacheAligned(SegQueue::new()));
        }
        let outstanding = track.then(|| (0..thread_count).map(|_| Mutex::new(HashSet::new())).collect());
        Self {
            thread_count,
            free_lists,
            allocated_total: AtomicUsize::new(0),
            outstanding,
        }
    }

    /// Pre-populates every thread's free list with `k` blocks.
    ///
    /// # Errors
    /// Returns an error if the system allocator fails or `T`'s layout cannot
    /// be used as a pool cell (see [`validate_cell_layout`]).
    pub fn preheat(&self, k: usize) -> Result<(), AllocError> {
        validate_cell_layout(Layout::new::<T>())?;
        for tid in 0..self.thread_count {
            for _ in 0..k {
                let block = self.alloc_fresh()?;
                self.free_lists[tid].0.push(block);
            }
        }
        Ok(())
    }

    /// Returns a block owned by thread `tid`, drawing from its local free
    /// list or falling back to the system allocator.
    ///
    /// # Errors
    /// Returns [`AllocError`] if the system allocator is consulted and fails.
    pub fn alloc(&self, tid: usize) -> Result<BlockPtr<T>, AllocError> {
        debug_assert!(tid < self.thread_count);
        let block = match self.free_lists[tid].0.pop() {
            Some(b) => b,
            None => self.alloc_fresh()?,
        };
        if let Some(outstanding) = &self.outstanding {
            outstanding[tid].lock().insert(block.0.as_ptr() as usize);
        }
        Ok(block)
    }

    fn alloc_fresh(&self) -> Result<BlockPtr<T>, AllocError> {
        let layout = Layout::new::<T>();
        // SAFETY: layout is validated non-zero-sized with a power-of-two
        // alignment by `validate_cell_layout` at pool construction / preheat
        // time; `alloc` callers go through the same layout every time.
        let raw = unsafe { alloc(layout) };
        let ptr = NonNull::new(raw.cast::<T>()).ok_or(AllocError::OutOfMemory)?;
        self.allocated_total.fetch_add(1, Ordering::Relaxed);
        Ok(BlockPtr(ptr))
    }

    /// Pushes `ptr` onto thread `tid`'s free list. `tid` need not be the
    /// allocating thread — cross-thread free is part of the contract.
    pub fn free_block(&self, ptr: BlockPtr<T>, tid: usize) {
        debug_assert!(tid < self.thread_count);
        if let Some(outstanding) = &self.outstanding {
            for (other_tid, set) in outstanding.iter().enumerate() {
                if other_tid != tid {
                    debug_assert!(
                        !set.lock().contains(&(ptr.0.as_ptr() as usize)),
                        "block freed into thread {tid} while still outstanding under thread {other_tid}"
                    );
                }
            }
            outstanding[tid].lock().remove(&(ptr.0.as_ptr() as usize));
        }
        self.free_lists[tid].0.push(ptr);
    }

    /// Snapshots, per thread, the set of pointers currently allocated and
    /// not yet freed. Only meaningful when the pool was built with
    /// [`BlockPool::with_tracking`]; otherwise every set is empty.
    #[must_use]
    pub fn outstanding_snapshot(&self) -> Vec<HashSet<usize>> {
        match &self.outstanding {
            Some(outstanding) => outstanding.iter().map(|m| m.lock().clone()).collect(),
            None => vec![HashSet::new(); self.thread_count],
        }
    }

    #[must_use]
    pub fn allocated_total(&self) -> usize {
        self.allocated_total.load(Ordering::Relaxed)
    }
}

impl<T> Drop for BlockPool<T> {
    fn drop(&mut self) {
        let layout = Layout::new::<T>();
        for list in &self.free_lists {
            while let Some(block) = list.0.pop() {
                // SAFETY: every block in a free list came from `alloc_fresh`
                // with this exact layout and has not been freed elsewhere.
                unsafe { dealloc(block.0.as_ptr().cast::<u8>(), layout) };
            }
        }
    }
}

const _ALIGNMENT_CHECK: () = assert!(std::mem::align_of::<CacheAligned<u8>>() == CACHE_LINE);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_then_free_reuses_block() {
        let pool: BlockPool<[u8; 64]> = BlockPool::new(2);
        let b = pool.alloc(0).unwrap();
        pool.free_block(b, 0);
        let b2 = pool.alloc(0).unwrap();
        assert_eq!(b.0.as_ptr(), b2.0.as_ptr());
        pool.free_block(b2, 0);
    }

    #[test]
    fn cross_thread_free_is_allowed() {
        let pool: BlockPool<u64> = BlockPool::new(2);
        let b = pool.alloc(0).unwrap();
        pool.free_block(b, 1);
        let b2 = pool.alloc(1).unwrap();
        assert_eq!(b.0.as_ptr(), b2.0.as_ptr());
        pool.free_block(b2, 1);
    }

    #[test]
    fn preheat_avoids_fresh_allocation() {
        let pool: BlockPool<u64> = BlockPool::new(1);
        pool.preheat(4).unwrap();
        let before = pool.allocated_total();
        for _ in 0..4 {
            let b = pool.alloc(0).unwrap();
            pool.free_block(b, 0);
        }
        assert_eq!(pool.allocated_total(), before);
    }

    #[test]
    fn tracking_reports_outstanding_blocks() {
        let pool: BlockPool<u64> = BlockPool::with_tracking(2);
        let a = pool.alloc(0).unwrap();
        let snapshot = pool.outstanding_snapshot();
        assert!(snapshot[0].contains(&(a.0.as_ptr() as usize)));
        pool.free_block(a, 0);
        let snapshot = pool.outstanding_snapshot();
        assert!(!snapshot[0].contains(&(a.0.as_ptr() as usize)));
    }
}
