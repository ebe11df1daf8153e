//! Elimination array: pairs an opposite-operation push/pop without either
//! side touching the deque's linked-buffer structure. One `ElimTable`
//! instance exists per side (left/right) of a deque.

use std::sync::atomic::{AtomicU64, Ordering};

const CACHE_LINE: usize = 64;

#[repr(align(64))]
struct CacheAligned<T>(T);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
enum Flag {
    Inactive = 0,
    Eliminated = 1,
    Push = 2,
    Pop = 3,
}

impl Flag {
    fn from_bits(bits: u64) -> Self {
        match bits & 0x3 {
            0 => Flag::Inactive,
            1 => Flag::Eliminated,
            2 => Flag::Push,
            3 => Flag::Pop,
            _ => unreachable!(),
        }
    }
}

fn pack(value: i32, flag: Flag) -> u64 {
    (value as u32 as u64) | ((flag as u64) << 32)
}

fn unpack(word: u64) -> (i32, Flag) {
    (word as u32 as i32, Flag::from_bits(word >> 32))
}

/// Per-thread elimination slot table. `T` is fixed to `i32` (the deque's
/// machine-word-sized payload, see SPEC_FULL.md §6); packing the slot into a
/// single `AtomicU64` keeps insert/remove/eliminate lock-free without the
/// wide `atomic<Slot>` the historical implementation relied on.
pub struct ElimTable {
    thread_count: usize,
    table: Vec<CacheAligned<AtomicU64>>,
    rand_state: Vec<CacheAligned<AtomicU64>>,
}

impl ElimTable {
    #[must_use]
    pub fn new(thread_count: usize) -> Self {
        let table = (0..thread_count)
            .map(|_| CacheAligned(AtomicU64::new(pack(0, Flag::Inactive))))
            .collect();
        // Seed per-thread RNG state distinctly so peer scans don't all pick
        // the same offset; the value itself doesn't need to be secret.
        let rand_state = (0..thread_count)
            .map(|tid| CacheAligned(AtomicU64::new(0x9E37_79B9 ^ tid as u64)))
            .collect();
        Self {
            thread_count,
            table,
            rand_state,
        }
    }

    /// Same LCG as [`crate::core::rand::HarnessRng`], inlined here because
    /// each thread only ever touches its own `rand_state` entry and an
    /// owning `&mut HarnessRng` would require a lock this path can't pay
    /// for.
    fn next_rand(&self, tid: usize) -> u32 {
        let prev = self.rand_state[tid].0.load(Ordering::Relaxed);
        let next = prev.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        self.rand_state[tid].0.store(next, Ordering::Relaxed);
        ((next / 65_536) % 32_768) as u32
    }

    pub fn insert_push(&self, value: i32, tid: usize) {
        self.table[tid].0.store(pack(value, Flag::Push), Ordering::Release);
    }

    pub fn insert_pop(&self, tid: usize) {
        self.table[tid].0.store(pack(0, Flag::Pop), Ordering::Release);
    }

    /// Returns `true` iff this thread's slot was already `Eliminated`.
    /// Otherwise resets the slot to `Inactive` and returns whether it was
    /// *already* `Inactive` at the moment of the reset (this mirrors the
    /// historical implementation's literal check; under normal use the
    /// slot is `Push` at this point and the answer is `false`).
    pub fn remove_push(&self, tid: usize) -> bool {
        let slot = self.table[tid].0.load(Ordering::Acquire);
        if unpack(slot).1 == Flag::Eliminated {
            return true;
        }
        let old = self.table[tid].0.swap(pack(0, Flag::Inactive), Ordering::AcqRel);
        unpack(old).1 == Flag::Inactive
    }

    /// Symmetric to [`ElimTable::remove_push`]; returns the eliminated
    /// value on success.
    pub fn remove_pop(&self, tid: usize) -> Option<i32> {
        let slot = self.table[tid].0.load(Ordering::Acquire);
        let (value, flag) = unpack(slot);
        if flag == Flag::Eliminated {
            return Some(value);
        }
        let old = self.table[tid].0.swap(pack(0, Flag::Inactive), Ordering::AcqRel);
        let (old_value, old_flag) = unpack(old);
        (old_flag == Flag::Inactive).then_some(old_value)
    }

    /// Scans up to `scan_count` peer slots starting at a pseudo-random
    /// offset; pairs with the first one found waiting on the opposite
    /// operation. `scan_count` is clamped to `thread_count`.
    pub fn try_eliminate_push(&self, scan_count: usize, value: i32, tid: usize) -> bool {
        let start = self.next_rand(tid) as usize;
        let scan_count = scan_count.min(self.thread_count);
        for n in 0..scan_count {
            let i = (start + n) % self.thread_count;
            if i == tid {
                continue;
            }
            loop {
                let slot = self.table[i].0.load(Ordering::Acquire);
                if unpack(slot).1 != Flag::Pop {
                    break;
                }
                if self.remove_push(tid) {
                    return true;
                }
                if self.table[i]
                    .0
                    .compare_exchange(slot, pack(value, Flag::Eliminated), Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    return true;
                }
                self.insert_push(value, tid);
            }
        }
        false
    }

    pub fn try_eliminate_pop(&self, scan_count: usize, tid: usize) -> Option<i32> {
        let start = self.next_rand(tid) as usize;
        let scan_count = scan_count.min(self.thread_count);
        for n in 0..scan_count {
            let i = (start + n) % self.thread_count;
            if i == tid {
                continue;
            }
            loop {
                let slot = self.table[i].0.load(Ordering::Acquire);
                let (peer_value, peer_flag) = unpack(slot);
                if peer_flag != Flag::Push {
                    break;
                }
                if let Some(out) = self.remove_pop(tid) {
                    return Some(out);
                }
                if self.table[i]
                    .0
                    .compare_exchange(slot, pack(0, Flag::Eliminated), Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    return Some(peer_value);
                }
                self.insert_pop(tid);
            }
        }
        None
    }
}

const _ALIGNMENT_CHECK: () = assert!(std::mem::align_of::<CacheAligned<u8>>() == CACHE_LINE);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_pop_eliminate_each_other() {
        let table = ElimTable::new(4);
        table.insert_push(42, 0);
        let got = table.try_eliminate_pop(4, 1);
        assert_eq!(got, Some(42));
        // The pusher's own removal call should observe the elimination.
        assert!(table.remove_push(0));
    }

    #[test]
    fn pop_then_push_eliminate_each_other() {
        let table = ElimTable::new(4);
        table.insert_pop(0);
        let eliminated = table.try_eliminate_push(4, 7, 1);
        assert!(eliminated);
        assert_eq!(table.remove_pop(0), Some(7));
    }

    #[test]
    fn no_peer_waiting_fails_to_eliminate() {
        let table = ElimTable::new(4);
        table.insert_push(1, 0);
        assert_eq!(table.try_eliminate_pop(4, 1), None);
        assert!(!table.remove_push(0));
    }
}
