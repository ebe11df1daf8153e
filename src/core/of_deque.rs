//! Oracle-based, finger-search, lock-free two-ended deque ("OFDeque").
//!
//! Ported from `OFDeque.hpp`: a doubly-linked chain of fixed-size `Buffer`s,
//! each an array of slots. Interior slots hold values; the two slots nearest
//! each end of a buffer are either still-unused placeholders (tagged `Left`
//! or `Right`, whichever end owns them) or link to the neighboring buffer.
//! Pushes/pops walk from a globally-published "hint" buffer toward the
//! active edge using a thread-local finger (`local_hint`) to skip buffers
//! that have filled since the hint was last updated, falling back to a full
//! `find_edge` scan when the finger is stale.
//!
//! `T` is fixed to `i32` here (the historical template enforced `sizeof(T)
//! <= 4`, and the harness's Random/Queue/Stack tests only ever exercise
//! machine-word payloads — see SPEC_FULL.md §3).
//!
//! A `Slot` packs a tag (unused-left/unused-right/sealed/value), an ABA
//! counter, and either an `i32` value or a `Buffer` pointer into a single
//! word, same as the historical `union { T; Buffer* } + count:30,type:2`
//! bitfield struct — except the historical struct is 16 bytes (a pointer
//! doesn't fit a union with a 4-byte bitfield) and relies on a double-word
//! CAS. Rust's std doesn't expose 128-bit atomics on stable, so slots (and
//! the `GlobalHint` pointer+epoch pair) use `portable_atomic::AtomicU128`
//! instead — same bit-packing idea, portable backing.

#![allow(unsafe_code)]

use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicPtr, AtomicU32, Ordering};

use portable_atomic::AtomicU128;
use tracing::{debug, trace};

use crate::core::container::{Capability, Deque, Side, SideOffsets, SlotTag};
use crate::core::elim::ElimTable;
use crate::core::memory::{BlockPool, HazardTracker};

const CACHE_LINE: usize = 64;

#[repr(align(64))]
struct CacheAligned<T>(T);

fn pack_slot(payload: u64, count: u32, tag: SlotTag) -> u128 {
    (payload as u128) | ((u128::from(count) & 0x3FFF_FFFF) << 64) | ((tag as u128) << 94)
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct SlotView {
    payload: u64,
    count: u32,
    tag: SlotTag,
}

impl SlotView {
    fn unpack(word: u128) -> Self {
        Self {
            payload: word as u64,
            count: ((word >> 64) & 0x3FFF_FFFF) as u32,
            tag: SlotTag::from_bits(((word >> 94) & 0x3) as u8),
        }
    }

    fn pack(self) -> u128 {
        pack_slot(self.payload, self.count, self.tag)
    }

    fn link<const N: usize>(self) -> *mut Buffer<N> {
        self.payload as *mut Buffer<N>
    }

    fn value(self) -> i32 {
        self.payload as u32 as i32
    }
}

/// A fixed-size run of slots plus each side's finger into it.
pub struct Buffer<const N: usize> {
    left_local_hint: CacheAligned<AtomicI32>,
    right_local_hint: CacheAligned<AtomicI32>,
    slots: [AtomicU128; N],
}

impl<const N: usize> Buffer<N> {
    /// Slots `[0, split)` are unused-left placeholders, `[split, N)` unused-
    /// right; matches `Buffer::fill`.
    fn filled(split: usize) -> Self {
        debug_assert!(split > 0 && split < N);
        let slots = std::array::from_fn(|i| {
            let tag = if i < split { SlotTag::Left } else { SlotTag::Right };
            AtomicU128::new(pack_slot(0, 0, tag))
        });
        Self {
            left_local_hint: CacheAligned(AtomicI32::new(split as i32)),
            right_local_hint: CacheAligned(AtomicI32::new(split as i32 - 1)),
            slots,
        }
    }

    fn local_hint(&self, side: Side) -> &AtomicI32 {
        match side {
            Side::Left => &self.left_local_hint.0,
            Side::Right => &self.right_local_hint.0,
        }
    }

    fn load_slot(&self, index: usize) -> SlotView {
        SlotView::unpack(self.slots[index].load(Ordering::Acquire))
    }

    fn load_tag(&self, index: usize) -> SlotTag {
        self.load_slot(index).tag
    }

    fn cas_safe(&self, index: usize, exp: SlotView) -> bool {
        let desired = SlotView { count: exp.count + 1, ..exp }.pack();
        self.slots[index]
            .compare_exchange(exp.pack(), desired, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn cas_tag(&self, index: usize, exp: SlotView, tag: SlotTag) -> bool {
        let desired = pack_slot(0, exp.count + 1, tag);
        self.slots[index]
            .compare_exchange(exp.pack(), desired, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn cas_value(&self, index: usize, exp: SlotView, value: i32) -> bool {
        let desired = pack_slot(value as u32 as u64, exp.count + 1, SlotTag::Value);
        self.slots[index]
            .compare_exchange(exp.pack(), desired, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn cas_link(&self, index: usize, exp: SlotView, link: *mut Buffer<N>) -> bool {
        let desired = pack_slot(link as u64, exp.count + 1, SlotTag::Value);
        self.slots[index]
            .compare_exchange(exp.pack(), desired, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Mirrors `Buffer::isSealed`: the count-stable double read of slot `1`
    /// guards against observing a torn (type, count) pair while a CAS on that
    /// slot is in flight.
    fn sealed_index(&self) -> Option<usize> {
        loop {
            let n0 = self.load_slot(1);
            let n1 = self.load_slot(N - 2);
            let n0_again = self.load_slot(1);
            if n0.count == n0_again.count {
                return if n0.tag == SlotTag::Sealed {
                    Some(1)
                } else if n1.tag == SlotTag::Sealed {
                    Some(N - 2)
                } else {
                    None
                };
            }
        }
    }
}

#[derive(Clone, Copy)]
struct GlobalHint<const N: usize> {
    buffer: *mut Buffer<N>,
    count: u32,
}

impl<const N: usize> GlobalHint<N> {
    fn pack(self) -> u128 {
        (self.buffer as u64 as u128) | (u128::from(self.count) << 64)
    }

    fn unpack(word: u128) -> Self {
        Self {
            buffer: (word as u64) as *mut Buffer<N>,
            count: (word >> 64) as u32,
        }
    }
}

#[derive(Clone, Copy)]
struct Edge<const N: usize> {
    buffer: *mut Buffer<N>,
    index: usize,
}

#[derive(Clone, Copy)]
struct OracleResult<const N: usize> {
    hint: GlobalHint<N>,
    edge: Edge<N>,
}

#[derive(Default)]
struct ThreadLog {
    elim_pushes: AtomicU32,
    elim_pops: AtomicU32,
}

/// Lock-free, hazard-pointer-reclaimed deque over fixed-size linked buffers.
/// `N` is the buffer size (a runtime array length fixed at the type level,
/// standing in for the historical `template<int BufferSize>` parameter).
pub struct OfDeque<const N: usize> {
    left_global_hint: CacheAligned<AtomicU128>,
    right_global_hint: CacheAligned<AtomicU128>,
    left_buffer_cache: Vec<CacheAligned<AtomicPtr<Buffer<N>>>>,
    right_buffer_cache: Vec<CacheAligned<AtomicPtr<Buffer<N>>>>,
    pool: Arc<BlockPool<Buffer<N>>>,
    haz: HazardTracker<Buffer<N>>,
    left_elim: ElimTable,
    right_elim: ElimTable,
    thread_logs: Vec<CacheAligned<ThreadLog>>,
    empty_value: i32,
    thread_count: usize,
    scan_count_start: usize,
    elimination: bool,
}

const _ALIGNMENT_CHECK: () = assert!(std::mem::align_of::<CacheAligned<u8>>() == CACHE_LINE);

impl<const N: usize> OfDeque<N> {
    /// `empty_value` is returned from a pop observed against an empty deque
    /// (the historical `m_empty` sentinel — callers must pick a value that
    /// never appears as a real payload, matching `RDeque`'s convention).
    #[must_use]
    pub fn new(empty_value: i32, thread_count: usize, elimination: bool) -> Self {
        assert!(N >= 4, "buffer size must hold at least two near and two far slots");
        assert!(thread_count > 0, "thread_count must be positive");

        let pool = Arc::new(BlockPool::new(thread_count));
        let haz = HazardTracker::new(thread_count, 2, 2, pool.clone());

        let left_buffer_cache = (0..thread_count)
            .map(|_| CacheAligned(AtomicPtr::new(ptr::null_mut())))
            .collect();
        let right_buffer_cache = (0..thread_count)
            .map(|_| CacheAligned(AtomicPtr::new(ptr::null_mut())))
            .collect();

        let initial = match pool.alloc(0) {
            Ok(block) => block,
            Err(err) => panic!("initial buffer allocation must succeed: {err}"),
        };
        // SAFETY: `initial` is freshly allocated, uninitialized memory sized
        // for exactly one `Buffer<N>`, and no other thread can observe it
        // until it's published below.
        unsafe { initial.0.as_ptr().write(Buffer::filled(N / 2)) };
        let hint = GlobalHint { buffer: initial.0.as_ptr(), count: 0 }.pack();

        let thread_logs = (0..thread_count).map(|_| CacheAligned(ThreadLog::default())).collect();

        Self {
            left_global_hint: CacheAligned(AtomicU128::new(hint)),
            right_global_hint: CacheAligned(AtomicU128::new(hint)),
            left_buffer_cache,
            right_buffer_cache,
            pool,
            haz,
            left_elim: ElimTable::new(thread_count),
            right_elim: ElimTable::new(thread_count),
            thread_logs,
            empty_value,
            thread_count,
            scan_count_start: thread_count,
            elimination,
        }
    }

    fn global_hint_cell(&self, side: Side) -> &AtomicU128 {
        match side {
            Side::Left => &self.left_global_hint.0,
            Side::Right => &self.right_global_hint.0,
        }
    }

    fn buffer_cache(&self, side: Side) -> &[CacheAligned<AtomicPtr<Buffer<N>>>] {
        match side {
            Side::Left => &self.left_buffer_cache,
            Side::Right => &self.right_buffer_cache,
        }
    }

    fn elim_table(&self, side: Side) -> &ElimTable {
        match side {
            Side::Left => &self.left_elim,
            Side::Right => &self.right_elim,
        }
    }

    fn record_elim_push(&self, tid: usize) {
        let count = self.thread_logs[tid].0.elim_pushes.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(tid, count, "push eliminated without touching the buffer chain");
    }

    fn record_elim_pop(&self, tid: usize) {
        let count = self.thread_logs[tid].0.elim_pops.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(tid, count, "pop eliminated without touching the buffer chain");
    }

    #[must_use]
    pub fn elim_push_count(&self, tid: usize) -> u32 {
        self.thread_logs[tid].0.elim_pushes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn elim_pop_count(&self, tid: usize) -> u32 {
        self.thread_logs[tid].0.elim_pops.load(Ordering::Relaxed)
    }

    fn reserve_hint(&self, side: Side, slot: usize, tid: usize) -> GlobalHint<N> {
        loop {
            let hint = GlobalHint::unpack(self.global_hint_cell(side).load(Ordering::Acquire));
            self.haz.reserve(hint.buffer, slot, tid);
            let recheck = GlobalHint::unpack(self.global_hint_cell(side).load(Ordering::Acquire));
            if hint.count == recheck.count {
                return hint;
            }
        }
    }

    fn oracle(&self, side: Side, tid: usize) -> OracleResult<N> {
        loop {
            let hint = self.reserve_hint(side, 0, tid);
            if let Some(edge) = self.find_edge(side, hint, tid) {
                return OracleResult { hint, edge };
            }
            trace!(?side, tid, "oracle: global hint advanced mid-walk, restarting");
        }
    }

    /// Ports `findEdge<S>`: walks from `hint.buffer` along the thread-local
    /// finger toward the live boundary, restarting (returning `None`) if the
    /// global hint advances underneath it.
    fn find_edge(&self, side: Side, hint: GlobalHint<N>, tid: usize) -> Option<Edge<N>> {
        let off = side.offsets(N);
        let mut buffer = hint.buffer;
        // SAFETY: `buffer` is hazard-protected by `reserve_hint` for the
        // caller's whole `oracle` iteration.
        let mut buf = unsafe { &*buffer };
        let mut index = buf.local_hint(side).load(Ordering::Acquire).clamp(1, N as i32 - 2);
        let mut next_haz_slot = 1usize;

        loop {
            let i = index as usize;
            let hint_stale = |this: &Self| {
                hint.count != GlobalHint::<N>::unpack(this.global_hint_cell(side).load(Ordering::Acquire)).count
            };

            if i == off.far_link {
                let slot = buf.load_slot(i);
                if slot.tag == off.far_tag {
                    index -= off.far_direction as i32;
                    continue;
                }
                let neighbor = slot.link();
                self.haz.reserve(neighbor, next_haz_slot, tid);
                next_haz_slot ^= 1;
                if hint_stale(self) {
                    return None;
                }
                // SAFETY: hazard-reserved above while the hint epoch hadn't
                // moved, so `neighbor` is still live.
                let neighbor_ref = unsafe { &*neighbor };
                let far_type = neighbor_ref.load_tag(off.near_value);
                if far_type == off.far_tag || far_type == SlotTag::Sealed {
                    return Some(Edge { buffer, index: off.far_value });
                }
                buffer = neighbor;
                buf = neighbor_ref;
                index = buf.local_hint(side).load(Ordering::Acquire).clamp(1, N as i32 - 2);
            } else if i == off.near_link {
                let slot = buf.load_slot(i);
                if slot.tag == off.near_tag {
                    if buf.load_tag((i as isize + off.far_direction) as usize) == off.far_tag {
                        return Some(Edge { buffer, index: i });
                    }
                    index += off.far_direction as i32;
                } else {
                    debug_assert_eq!(slot.tag, SlotTag::Value);
                    let neighbor = slot.link();
                    self.haz.reserve(neighbor, next_haz_slot, tid);
                    next_haz_slot ^= 1;
                    if hint_stale(self) {
                        return None;
                    }
                    let neighbor_ref = unsafe { &*neighbor };
                    let far_type = neighbor_ref.load_tag(off.far_value);
                    if far_type != off.far_tag {
                        return Some(Edge { buffer: neighbor, index: off.far_value });
                    }
                    buffer = neighbor;
                    buf = neighbor_ref;
                    index = buf.local_hint(side).load(Ordering::Acquire).clamp(1, N as i32 - 2);
                }
            } else {
                let tag = buf.load_tag(i);
                if tag == off.far_tag {
                    index -= off.far_direction as i32;
                } else if tag == off.near_tag || tag == SlotTag::Value {
                    if buf.load_tag((i as isize + off.far_direction) as usize) == off.far_tag {
                        return Some(Edge { buffer, index: i });
                    }
                    index += off.far_direction as i32;
                } else {
                    debug_assert_eq!(tag, SlotTag::Sealed);
                    if i == off.far_value {
                        let neighbor = buf.load_slot(off.far_link).link();
                        self.haz.reserve(neighbor, next_haz_slot, tid);
                        next_haz_slot ^= 1;
                        if hint_stale(self) {
                            return None;
                        }
                        let neighbor_ref = unsafe { &*neighbor };
                        if neighbor_ref.load_tag(off.near_value) == off.far_tag {
                            return Some(Edge { buffer, index: i });
                        }
                        buffer = neighbor;
                        buf = neighbor_ref;
                        index = buf.local_hint(side).load(Ordering::Acquire).clamp(1, N as i32 - 2);
                    } else {
                        debug_assert_eq!(i, off.near_value);
                        let neighbor = buf.load_slot(off.near_link).link();
                        self.haz.reserve(neighbor, next_haz_slot, tid);
                        next_haz_slot ^= 1;
                        if hint_stale(self) {
                            return None;
                        }
                        let neighbor_ref = unsafe { &*neighbor };
                        let far_type = neighbor_ref.load_tag(off.far_value);
                        if far_type == off.near_tag || far_type == SlotTag::Value {
                            return Some(Edge { buffer: neighbor, index: off.far_value });
                        }
                        buffer = neighbor;
                        buf = neighbor_ref;
                        index = buf.local_hint(side).load(Ordering::Acquire).clamp(1, N as i32 - 2);
                    }
                }
            }
        }
    }

    /// Ports `findActiveBuffer<S>`: follows sealed buffers toward their
    /// still-live neighbor, or `None` if the hint advanced mid-walk.
    fn find_active_buffer(&self, side: Side, hint: GlobalHint<N>, tid: usize) -> Option<*mut Buffer<N>> {
        let off = side.offsets(N);
        let mut buffer = hint.buffer;
        let mut next_haz_slot = 1usize;
        loop {
            // SAFETY: `buffer` starts hazard-protected by the caller and is
            // reassigned only to neighbors hazard-reserved in this loop.
            let buf = unsafe { &*buffer };
            let Some(sealed_index) = buf.sealed_index() else {
                return Some(buffer);
            };
            let link_index = if sealed_index == off.far_value {
                off.far_link
            } else {
                debug_assert_eq!(sealed_index, off.near_value);
                off.near_link
            };
            let neighbor = buf.load_slot(link_index).link();
            self.haz.reserve(neighbor, next_haz_slot, tid);
            next_haz_slot ^= 1;
            if hint.count != GlobalHint::<N>::unpack(self.global_hint_cell(side).load(Ordering::Acquire)).count {
                return None;
            }
            buffer = neighbor;
        }
    }

    /// Ports `updateHint<S>`: re-publishes the global hint past any sealed
    /// buffers, advancing the epoch so in-flight `oracle` calls restart.
    fn update_hint(&self, side: Side, tid: usize) {
        let threshold = GlobalHint::<N>::unpack(self.global_hint_cell(side).load(Ordering::Acquire)).count;
        loop {
            let hint = GlobalHint::unpack(self.global_hint_cell(side).load(Ordering::Acquire));
            // SAFETY: `hint.buffer` is the currently published buffer; it
            // cannot be freed while it's reachable from the global hint.
            let buf = unsafe { &*hint.buffer };
            let buffer = if buf.sealed_index().is_none() {
                if hint.count > threshold {
                    break;
                }
                hint.buffer
            } else {
                match self.find_active_buffer(side, hint, tid) {
                    Some(active) => active,
                    None => continue,
                }
            };
            let desired = GlobalHint { buffer, count: hint.count + 1 };
            if self
                .global_hint_cell(side)
                .compare_exchange(hint.pack(), desired.pack(), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }
    }

    /// Ports `retire`: both sides' hints must be pushed past a retired
    /// buffer before the hazard tracker gets to see it, or a concurrent
    /// walker could still be mid-traversal through it.
    fn retire(&self, buffer: *mut Buffer<N>, tid: usize) {
        self.update_hint(Side::Left, tid);
        self.update_hint(Side::Right, tid);
        self.haz.retire(buffer, tid);
    }

    /// One attempt at the edge found by `oracle`. `None` means "go back
    /// around the backoff/retry loop"; `Some` (possibly `self.empty_value`)
    /// means the push is done.
    fn try_push_once(&self, side: Side, off: SideOffsets, value: i32, tid: usize, oracle_result: OracleResult<N>) -> bool {
        let buffer = oracle_result.edge.buffer;
        let near_index = oracle_result.edge.index;
        let far_index = (near_index as isize + off.far_direction) as usize;

        // SAFETY: `buffer` is hazard-protected by the `oracle` call that
        // produced this edge.
        let buf = unsafe { &*buffer };
        let near_slot = buf.load_slot(near_index);
        let far_slot = buf.load_slot(far_index);

        let edge_ok = !(near_slot.tag == off.far_tag || (near_slot.tag == SlotTag::Sealed && near_index != off.far_value))
            && !(far_index != off.far_link && far_slot.tag != off.far_tag)
            && !(near_index == off.near_link && near_slot.tag != off.near_tag);

        if !edge_ok {
            return false;
        }

        if near_index != off.far_value {
            return buf.cas_safe(near_index, near_slot)
                && buf.cas_value(far_index, far_slot, value)
                && {
                    buf.local_hint(side).fetch_add(off.far_direction as i32, Ordering::AcqRel);
                    true
                };
        }

        if far_slot.tag == off.far_tag {
            return self.try_append(side, off, buffer, buf, near_index, near_slot, far_index, far_slot, value, tid, oracle_result);
        }

        // Either a straddling push onto the neighbor, or helping remove a
        // sealed neighbor out of the way first.
        let neighbor = far_slot.link::<N>();
        // SAFETY: `neighbor` is reachable as `buffer`'s far link, which
        // (being a hazard-protected live buffer) keeps its own far-link
        // neighbor alive per the deque's retirement protocol.
        let neighbor_ref = unsafe { &*neighbor };
        let reaching_slot = neighbor_ref.load_slot(off.near_value);
        let back_slot = neighbor_ref.load_slot(off.near_link);

        if back_slot.link::<N>() != buffer {
            return false;
        }

        if reaching_slot.tag == off.far_tag {
            return buf.cas_safe(near_index, near_slot)
                && neighbor_ref.cas_value(off.near_value, reaching_slot, value)
                && {
                    self.advance_global_hint(side, oracle_result.hint, neighbor);
                    true
                };
        }

        if reaching_slot.tag == SlotTag::Sealed && buf.cas_safe(near_index, near_slot) && buf.cas_tag(far_index, far_slot, off.far_tag) {
            self.retire(neighbor, tid);
        }

        false
    }

    #[allow(clippy::too_many_arguments)]
    fn try_append(
        &self,
        side: Side,
        off: SideOffsets,
        buffer: *mut Buffer<N>,
        buf: &Buffer<N>,
        near_index: usize,
        near_slot: SlotView,
        far_index: usize,
        far_slot: SlotView,
        value: i32,
        tid: usize,
        oracle_result: OracleResult<N>,
    ) -> bool {
        let cache = &self.buffer_cache(side)[tid].0;
        let mut new_buffer = cache.load(Ordering::Relaxed);
        if new_buffer.is_null() {
            let Ok(block) = self.pool.alloc(tid) else {
                return false;
            };
            // SAFETY: freshly allocated, uninitialized memory sized for one
            // `Buffer<N>`; nothing else observes it until linked in below.
            unsafe { block.0.as_ptr().write(Buffer::filled(off.near_value)) };
            new_buffer = block.0.as_ptr();
            // SAFETY: just initialized above and not yet shared.
            let nb = unsafe { &*new_buffer };
            nb.local_hint(Side::Left).store(off.near_value as i32, Ordering::Relaxed);
            nb.local_hint(Side::Right).store(off.near_value as i32, Ordering::Relaxed);
            for slot in &nb.slots {
                slot.store(pack_slot(0, 0, off.far_tag), Ordering::Relaxed);
            }
            nb.slots[off.near_link].store(pack_slot(buffer as u64, 0, SlotTag::Value), Ordering::Relaxed);
            nb.slots[off.near_value].store(pack_slot(value as u32 as u64, 0, SlotTag::Value), Ordering::Relaxed);
            cache.store(new_buffer, Ordering::Relaxed);
        }

        if buf.cas_safe(near_index, near_slot) && buf.cas_link(far_index, far_slot, new_buffer) {
            cache.store(ptr::null_mut(), Ordering::Relaxed);
            self.advance_global_hint(side, oracle_result.hint, new_buffer);
            return true;
        }
        false
    }

    fn advance_global_hint(&self, side: Side, expected: GlobalHint<N>, buffer: *mut Buffer<N>) {
        let desired = GlobalHint { buffer, count: expected.count + 1 };
        let _ = self
            .global_hint_cell(side)
            .compare_exchange(expected.pack(), desired.pack(), Ordering::AcqRel, Ordering::Acquire);
    }

    /// One attempt at the edge found by `oracle`. `None` means retry;
    /// `Some` carries either a popped value or `self.empty_value`.
    fn try_pop_once(&self, side: Side, off: SideOffsets, tid: usize, oracle_result: OracleResult<N>) -> Option<i32> {
        let buffer = oracle_result.edge.buffer;
        let near_index = oracle_result.edge.index;
        let far_index = (near_index as isize + off.far_direction) as usize;

        // SAFETY: `buffer` is hazard-protected by the `oracle` call that
        // produced this edge.
        let buf = unsafe { &*buffer };
        let mut near_slot = buf.load_slot(near_index);
        let mut far_slot = buf.load_slot(far_index);
        let near_type = near_slot.tag;

        let edge_ok = !(near_type == off.far_tag || (near_type == SlotTag::Sealed && near_index != off.far_value))
            && !(far_index != off.far_link && far_slot.tag != off.far_tag)
            && !(near_index == off.near_link && near_type != off.near_tag);

        if !edge_ok {
            return None;
        }

        if near_index != off.far_value {
            if near_type == off.near_tag && buf.load_slot(near_index).count == near_slot.count {
                return Some(self.empty_value);
            }
            return if buf.cas_safe(far_index, far_slot) && buf.cas_tag(near_index, near_slot, off.far_tag) {
                buf.local_hint(side).fetch_add(-(off.far_direction as i32), Ordering::AcqRel);
                Some(near_slot.value())
            } else {
                None
            };
        }

        // Border edge: maybe a straddling pop off the neighbor, maybe the
        // neighbor needs sealing/removing first, maybe a plain boundary pop.
        if far_slot.tag != off.far_tag {
            let neighbor = far_slot.link::<N>();
            // SAFETY: reachable as `buffer`'s far link, kept alive by the
            // same invariant as in `try_push_once`.
            let neighbor_ref = unsafe { &*neighbor };
            let mut reach_slot = neighbor_ref.load_slot(off.near_value);
            let back_slot = neighbor_ref.load_slot(off.near_link);

            if back_slot.link::<N>() != buffer {
                return None;
            }

            if reach_slot.tag == off.far_tag {
                if (near_type == off.near_tag || near_type == SlotTag::Sealed) && near_slot.count == buf.load_slot(near_index).count {
                    return Some(self.empty_value);
                }
                if buf.cas_safe(near_index, near_slot) {
                    if neighbor_ref.cas_tag(off.near_value, reach_slot, SlotTag::Sealed) {
                        reach_slot.tag = SlotTag::Sealed;
                        reach_slot.count += 1;
                    }
                    near_slot.count += 1;
                }
            }

            if reach_slot.tag == SlotTag::Sealed {
                if near_type == off.near_tag && near_slot.count == buf.load_slot(near_index).count {
                    return Some(self.empty_value);
                }
                if buf.cas_safe(near_index, near_slot) {
                    if buf.cas_tag(far_index, far_slot, off.far_tag) {
                        self.retire(neighbor, tid);
                        far_slot.tag = off.far_tag;
                        far_slot.count += 1;
                    }
                    near_slot.count += 1;
                }
            }
        }

        if far_slot.tag == off.far_tag {
            if near_type == off.near_tag && near_slot.count == buf.load_slot(near_index).count {
                return Some(self.empty_value);
            }
            if buf.cas_safe(far_index, far_slot) && buf.cas_tag(near_index, near_slot, off.far_tag) {
                self.advance_global_hint(side, oracle_result.hint, buffer);
                return Some(near_slot.value());
            }
        }

        None
    }

    fn do_push(&self, side: Side, value: i32, tid: usize) {
        let off = side.offsets(N);
        let elim = self.elim_table(side);
        let mut backoff_scan = self.scan_count_start;
        if self.elimination {
            elim.insert_push(value, tid);
        }
        loop {
            let oracle_result = self.oracle(side, tid);

            if self.elimination && elim.remove_push(tid) {
                self.record_elim_push(tid);
                self.haz.clear_all(tid);
                return;
            }

            if self.try_push_once(side, off, value, tid, oracle_result) {
                self.haz.clear_all(tid);
                return;
            }
            trace!(?side, tid, "push CAS lost the race, retrying from the oracle");

            if self.elimination {
                elim.insert_push(value, tid);
                if elim.try_eliminate_push(backoff_scan, value, tid) {
                    self.record_elim_push(tid);
                    self.haz.clear_all(tid);
                    return;
                }
                backoff_scan <<= 1;
            }
        }
    }

    fn do_pop(&self, side: Side, tid: usize) -> i32 {
        let off = side.offsets(N);
        let elim = self.elim_table(side);
        let mut backoff_scan = self.scan_count_start;
        if self.elimination {
            elim.insert_pop(tid);
        }
        loop {
            let oracle_result = self.oracle(side, tid);

            if self.elimination {
                if let Some(v) = elim.remove_pop(tid) {
                    self.record_elim_pop(tid);
                    self.haz.clear_all(tid);
                    return v;
                }
            }

            if let Some(value) = self.try_pop_once(side, off, tid, oracle_result) {
                self.haz.clear_all(tid);
                return value;
            }
            trace!(?side, tid, "pop CAS lost the race, retrying from the oracle");

            if self.elimination {
                elim.insert_pop(tid);
                if let Some(v) = elim.try_eliminate_pop(backoff_scan, tid) {
                    self.record_elim_pop(tid);
                    self.haz.clear_all(tid);
                    return v;
                }
                backoff_scan <<= 1;
            }
        }
    }

    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }
}

impl<const N: usize> Deque for OfDeque<N> {
    type Item = i32;

    fn insert(&self, side: Side, value: i32, tid: usize) {
        self.do_push(side, value, tid);
    }

    fn remove(&self, side: Side, tid: usize) -> i32 {
        self.do_pop(side, tid)
    }

    fn empty_sentinel(&self) -> i32 {
        self.empty_value
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::Queue, Capability::Stack, Capability::Random]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY: i32 = i32::MIN;

    #[test]
    fn single_thread_left_push_then_left_pop_is_lifo() {
        let deque: OfDeque<8> = OfDeque::new(EMPTY, 1, false);
        deque.left_push(1, 0);
        deque.left_push(2, 0);
        deque.left_push(3, 0);
        assert_eq!(deque.left_pop(0), 3);
        assert_eq!(deque.left_pop(0), 2);
        assert_eq!(deque.left_pop(0), 1);
        assert_eq!(deque.left_pop(0), EMPTY);
    }

    #[test]
    fn single_thread_left_push_right_pop_is_fifo() {
        let deque: OfDeque<8> = OfDeque::new(EMPTY, 1, false);
        for v in 0..20 {
            deque.left_push(v, 0);
        }
        for v in 0..20 {
            assert_eq!(deque.right_pop(0), v);
        }
        assert_eq!(deque.right_pop(0), EMPTY);
    }

    #[test]
    fn grows_across_many_buffers() {
        let deque: OfDeque<4> = OfDeque::new(EMPTY, 1, false);
        for v in 0..200 {
            deque.right_push(v, 0);
        }
        for v in 0..200 {
            assert_eq!(deque.left_pop(0), v);
        }
        assert_eq!(deque.left_pop(0), EMPTY);
    }

    #[test]
    fn elimination_path_round_trips_a_value() {
        let deque: OfDeque<8> = OfDeque::new(EMPTY, 2, true);
        deque.left_push(42, 0);
        assert_eq!(deque.left_pop(1), 42);
    }

    #[test]
    fn two_threads_each_push_and_pop_their_own_side() {
        use std::sync::Arc as StdArc;
        use std::thread;

        let deque: StdArc<OfDeque<16>> = StdArc::new(OfDeque::new(EMPTY, 2, false));
        let d1 = deque.clone();
        let h1 = thread::spawn(move || {
            for v in 0..500 {
                d1.left_push(v, 0);
            }
        });
        let d2 = deque.clone();
        let h2 = thread::spawn(move || {
            for v in 0..500 {
                d2.right_push(-v, 1);
            }
        });
        h1.join().unwrap();
        h2.join().unwrap();

        let mut left_seen = 0;
        let mut right_seen = 0;
        loop {
            let l = deque.left_pop(0);
            let r = deque.right_pop(1);
            if l != EMPTY {
                left_seen += 1;
            }
            if r != EMPTY {
                right_seen += 1;
            }
            if l == EMPTY && r == EMPTY {
                break;
            }
        }
        assert_eq!(left_seen + right_seen, 1000);
    }
}
