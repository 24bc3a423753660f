//! Entity identifiers and allocation.
//!
//! An [`EntityId`] is an opaque 64-bit value. Ids are handed out by a
//! monotonically increasing counter and are never reused while the owning
//! [`Manager`](crate::manager::Manager) lives. Zero is reserved as
//! [`EntityId::NIL`], "no entity".

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::handler::EntityIds;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// An opaque entity identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// The reserved "no entity" id.
    pub const NIL: EntityId = EntityId(0);

    /// Reconstruct from a raw `u64`.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Whether this is the reserved nil id.
    #[inline]
    pub fn is_nil(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EntityAllocator
// ---------------------------------------------------------------------------

/// Allocates [`EntityId`]s and tracks which of them are live.
///
/// An id is live from the moment it is allocated until it is deallocated.
/// Deallocated ids are never handed out again: the counter only moves up.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    /// The last id handed out. The next allocation returns `next_id + 1`.
    next_id: u64,
    /// Live ids, ordered so that enumeration and snapshots are deterministic.
    live: BTreeSet<EntityId>,
}

impl EntityAllocator {
    /// Create a new, empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh, live [`EntityId`]. Never fails.
    pub fn allocate(&mut self) -> EntityId {
        self.next_id += 1;
        let id = EntityId(self.next_id);
        self.live.insert(id);
        id
    }

    /// Drop `id` from the live set.
    ///
    /// Returns `true` if the entity was live and is now gone, `false` if it
    /// was never allocated or has already been deallocated.
    pub fn deallocate(&mut self, id: EntityId) -> bool {
        self.live.remove(&id)
    }

    /// Returns `true` if `id` is currently live.
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.live.contains(&id)
    }

    /// Total number of currently live entities.
    pub fn alive_count(&self) -> usize {
        self.live.len()
    }

    /// The value of the id counter (the most recently allocated raw id).
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Snapshot iterator over the live ids in ascending order.
    pub fn iter(&self) -> EntityIds {
        EntityIds::new(self.live.iter().copied().collect())
    }

    /// Capture the allocator state as `(next_id, live ids)`.
    pub fn snapshot_state(&self) -> (u64, Vec<EntityId>) {
        (self.next_id, self.live.iter().copied().collect())
    }

    /// Rebuild an allocator from a previously captured state.
    pub fn restore_from_snapshot(next_id: u64, live: impl IntoIterator<Item = EntityId>) -> Self {
        Self {
            next_id,
            live: live.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_id_is_one() {
        let mut alloc = EntityAllocator::new();
        let e = alloc.allocate();
        assert_eq!(e.to_raw(), 1);
        assert!(!e.is_nil());
    }

    #[test]
    fn allocate_unique_ids() {
        let mut alloc = EntityAllocator::new();
        let ids: Vec<EntityId> = (0..100).map(|_| alloc.allocate()).collect();
        let mut raw: Vec<u64> = ids.iter().map(|id| id.to_raw()).collect();
        raw.dedup();
        assert_eq!(raw.len(), 100);
        assert!(raw.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn ids_are_not_reused_after_deallocate() {
        let mut alloc = EntityAllocator::new();
        let e0 = alloc.allocate();
        assert!(alloc.deallocate(e0));
        let e1 = alloc.allocate();
        assert_ne!(e0, e1);
        assert!(!alloc.is_alive(e0));
        assert!(alloc.is_alive(e1));
    }

    #[test]
    fn double_deallocate_returns_false() {
        let mut alloc = EntityAllocator::new();
        let e = alloc.allocate();
        assert!(alloc.deallocate(e));
        assert!(!alloc.deallocate(e));
    }

    #[test]
    fn iter_is_a_snapshot() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        let ids = alloc.iter();
        // Mutating while holding the iterator is allowed.
        alloc.deallocate(a);
        assert_eq!(ids.collect::<Vec<_>>(), vec![a, b]);
        assert_eq!(alloc.iter().collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    fn snapshot_state_roundtrip() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        alloc.deallocate(a);

        let (next, live) = alloc.snapshot_state();
        let restored = EntityAllocator::restore_from_snapshot(next, live);
        assert_eq!(restored.next_id(), 2);
        assert!(restored.is_alive(b));
        assert!(!restored.is_alive(a));
        assert_eq!(restored.alive_count(), 1);
    }

    #[test]
    fn display_and_debug() {
        let id = EntityId::from_raw(42);
        assert_eq!(id.to_string(), "#42");
        assert_eq!(format!("{id:?}"), "EntityId(42)");
        assert!(EntityId::NIL.is_nil());
    }
}
