//! Entity identifiers.
//!
//! An entity is a stable non-zero integer id minted by the [`Manager`]; it
//! has no intrinsic data and is merely a grouping key for components. Two
//! peers that apply the same command stream must mint the same ids in the
//! same order, so allocation is a plain monotonic counter with no reuse --
//! the simplest policy that is trivially deterministic (a future revision
//! could reuse freed ids, but nothing requires it).
//!
//! [`Manager`]: crate::manager::Manager

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(u32);

impl EntityId {
    /// Build an `EntityId` from its raw wire/storage value. Only ever
    /// produced by [`EntityAllocator`] or by decoding a packet.
    pub fn from_raw(raw: u32) -> Self {
        debug_assert_ne!(raw, 0, "entity id 0 is reserved (never minted)");
        Self(raw)
    }

    pub fn to_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Monotonic, non-reusing entity id allocator.
///
/// `next` starts at 1 (id 0 is never minted, so it can serve as a sentinel
/// in wire formats and tests). The counter is part of a [`Manager`]'s
/// snapshotted state, written to the wire as `i32 next_entity_id`.
///
/// [`Manager`]: crate::manager::Manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityAllocator {
    next: u32,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next += 1;
        id
    }

    pub fn next_raw(&self) -> u32 {
        self.next
    }

    pub fn restore(next_raw: u32) -> Self {
        Self { next: next_raw }
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_minted_in_ascending_order() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        assert!(a < b);
        assert_eq!(a.to_raw(), 1);
        assert_eq!(b.to_raw(), 2);
    }

    #[test]
    fn two_allocators_given_the_same_number_of_allocations_agree() {
        let mut a = EntityAllocator::new();
        let mut b = EntityAllocator::new();
        let ids_a: Vec<_> = (0..10).map(|_| a.allocate()).collect();
        let ids_b: Vec<_> = (0..10).map(|_| b.allocate()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn restore_continues_from_saved_counter() {
        let mut alloc = EntityAllocator::restore(5);
        assert_eq!(alloc.allocate().to_raw(), 5);
        assert_eq!(alloc.next_raw(), 6);
    }
}
