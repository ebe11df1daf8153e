//! Side-indexed offset tables and the `Deque` trait.
//!
//! The historical implementation specialized a template on
//! `OFDequeTypes::Side` and built a separate `RContainer`/`RDeque`/`RQueue`/
//! `RStack` interface hierarchy for introspecting what a rideable structure
//! supports. Neither translates well: Rust has no partial template
//! specialization, and a downcast-based capability hierarchy is exactly the
//! kind of dynamic-typing workaround idiomatic Rust avoids. This module
//! replaces both with a `Side` enum carrying its per-side offsets as plain
//! data, and a single `Deque` trait advertising its capabilities as data too.

/// Which end of the deque an operation targets.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Tag carried by an OFDeque slot: which side "owns" an unused slot, or
/// whether it holds a retired buffer-link marker or a live value.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum SlotTag {
    Left = 0,
    Right = 1,
    Sealed = 2,
    Value = 3,
}

impl SlotTag {
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0 => SlotTag::Left,
            1 => SlotTag::Right,
            2 => SlotTag::Sealed,
            3 => SlotTag::Value,
            _ => unreachable!(),
        }
    }
}

/// The per-side constant table the historical `OFDequeUtils<Side, ...>`
/// partial specializations computed at compile time. `buffer_size` is a
/// runtime value here (OFDeque's buffer size is a const generic parameter on
/// the deque type, not threaded through this table), so the table is
/// computed once per deque construction rather than resolved at compile
/// time — the values themselves are identical to the historical constants.
#[derive(Clone, Copy, Debug)]
pub struct SideOffsets {
    pub far_link: usize,
    pub near_link: usize,
    pub far_value: usize,
    pub near_value: usize,
    pub far_direction: isize,
    pub far_tag: SlotTag,
    pub near_tag: SlotTag,
}

impl Side {
    #[must_use]
    pub fn offsets(self, buffer_size: usize) -> SideOffsets {
        match self {
            Side::Left => SideOffsets {
                far_link: 0,
                near_link: buffer_size - 1,
                far_value: 1,
                near_value: buffer_size - 2,
                far_direction: -1,
                far_tag: SlotTag::Left,
                near_tag: SlotTag::Right,
            },
            Side::Right => SideOffsets {
                far_link: buffer_size - 1,
                near_link: 0,
                far_value: buffer_size - 2,
                near_value: 1,
                far_direction: 1,
                far_tag: SlotTag::Right,
                near_tag: SlotTag::Left,
            },
        }
    }
}

/// What a rideable structure can be asked to do. The historical
/// `RContainer`/`RQueue`/`RStack`/`RDeque` hierarchy distinguished these via
/// separate abstract base classes and runtime downcasts; a capability set is
/// sufficient here because no caller needs anything beyond "can I call
/// `left_*`/`right_*` on this."
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Capability {
    /// Supports `insert`/`remove` on exactly one side (FIFO when driven from
    /// opposite ends).
    Queue,
    /// Supports `insert`/`remove` on the same side (LIFO).
    Stack,
    /// Supports independent push/pop on both ends concurrently.
    Random,
}

/// A concurrent container addressable from both ends.
///
/// Implementors provide `insert`/`remove`; the `*_push`/`*_pop` helpers are
/// thin, side-fixing wrappers kept for call-site readability, mirroring the
/// historical `left_push`/`right_push`/`left_pop`/`right_pop` methods.
pub trait Deque: Send + Sync {
    type Item;

    fn insert(&self, side: Side, value: Self::Item, tid: usize);
    fn remove(&self, side: Side, tid: usize) -> Self::Item;
    fn capabilities(&self) -> &'static [Capability];

    /// The constructor-supplied sentinel a `remove` returns when its side
    /// was empty at the linearization point. Carries forward the historical
    /// `RContainer::is_empty(data)` convention (compare a popped value
    /// against this sentinel) as data rather than a separate predicate.
    fn empty_sentinel(&self) -> Self::Item;

    fn left_push(&self, value: Self::Item, tid: usize) {
        self.insert(Side::Left, value, tid);
    }
    fn right_push(&self, value: Self::Item, tid: usize) {
        self.insert(Side::Right, value, tid);
    }
    fn left_pop(&self, tid: usize) -> Self::Item {
        self.remove(Side::Left, tid)
    }
    fn right_pop(&self, tid: usize) -> Self::Item {
        self.remove(Side::Right, tid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn left_offsets_match_historical_constants() {
        let o = Side::Left.offsets(8);
        assert_eq!(o.far_link, 0);
        assert_eq!(o.near_link, 7);
        assert_eq!(o.far_value, 1);
        assert_eq!(o.near_value, 6);
        assert_eq!(o.far_direction, -1);
        assert_eq!(o.far_tag, SlotTag::Left);
        assert_eq!(o.near_tag, SlotTag::Right);
    }

    #[test]
    fn right_offsets_match_historical_constants() {
        let o = Side::Right.offsets(8);
        assert_eq!(o.far_link, 7);
        assert_eq!(o.near_link, 0);
        assert_eq!(o.far_value, 6);
        assert_eq!(o.near_value, 1);
        assert_eq!(o.far_direction, 1);
        assert_eq!(o.far_tag, SlotTag::Right);
        assert_eq!(o.near_tag, SlotTag::Left);
    }
}
