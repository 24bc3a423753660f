//! The handler abstraction.
//!
//! A handler stores and persists every component of one family. The
//! [`Manager`](crate::manager::Manager) keeps handlers as `Box<dyn Handler>`
//! and only needs the type-erased [`Handler`] capabilities (removal for the
//! destruction cascade, persistence for snapshots). Game code reaches the
//! typed [`ComponentHandler`] API by downcasting through the manager.
//!
//! Enumerations capture the keys they will walk when they are created, so a
//! caller may collect ids, finish iterating, and then mutate the store (or,
//! for the owning [`EntityIds`] iterator, mutate while iterating).

use std::any::Any;
use std::io::{Read, Write};

use crate::entity::EntityId;
use crate::Result;

// ---------------------------------------------------------------------------
// Handler (object-safe)
// ---------------------------------------------------------------------------

/// Type-erased storage and persistence for one component family.
pub trait Handler: Any {
    /// Remove all data this handler holds for `id`. Removing an entity the
    /// handler knows nothing about is a no-op.
    fn remove(&mut self, id: EntityId);

    /// Whether the handler holds any data for `id`.
    fn has_component(&self, id: EntityId) -> bool;

    /// Snapshot of every entity id the handler holds data for, ascending.
    fn entity_ids(&self) -> EntityIds;

    /// Number of stored entries.
    fn len(&self) -> usize;

    /// Whether the handler is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every stored entry.
    fn clear(&mut self);

    /// Write the handler block of a snapshot.
    fn serialize(&self, out: &mut dyn Write) -> Result<()>;

    /// Replace the handler's contents with a handler block read from `input`.
    fn deserialize(&mut self, input: &mut dyn Read) -> Result<()>;

    /// Verify internal invariants. The default has none to check.
    fn check_invariants(&self) -> Result<()> {
        Ok(())
    }

    /// Concrete type name, for diagnostics.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// ---------------------------------------------------------------------------
// ComponentHandler (typed)
// ---------------------------------------------------------------------------

/// The typed side of a handler: add, look up and enumerate components.
pub trait ComponentHandler: Handler {
    /// The per-entity value this handler stores.
    type Component;

    /// Associate `component` with `id`, replacing whatever was there.
    fn add(&mut self, id: EntityId, component: Self::Component);

    /// Look up the component of `id`. A miss is `None`, never an error.
    fn get(&self, id: EntityId) -> Option<&Self::Component>;

    /// Enumerate `(id, component)` pairs in ascending id order.
    fn entity_components(&self) -> EntityComponents<'_, Self::Component>;
}

// ---------------------------------------------------------------------------
// EntityIds
// ---------------------------------------------------------------------------

/// An owning iterator over a snapshot of entity ids.
///
/// It borrows nothing from the store it came from, so the store may be
/// mutated while the iterator is alive. Cloning restarts from the clone
/// point.
#[derive(Debug, Clone, Default)]
pub struct EntityIds {
    ids: std::vec::IntoIter<EntityId>,
}

impl EntityIds {
    pub(crate) fn new(ids: Vec<EntityId>) -> Self {
        Self {
            ids: ids.into_iter(),
        }
    }
}

impl Iterator for EntityIds {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        self.ids.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}

impl ExactSizeIterator for EntityIds {}

impl DoubleEndedIterator for EntityIds {
    fn next_back(&mut self) -> Option<EntityId> {
        self.ids.next_back()
    }
}

// ---------------------------------------------------------------------------
// EntityComponents
// ---------------------------------------------------------------------------

/// Iterator over `(id, &component)` pairs captured when it was created.
#[derive(Debug)]
pub struct EntityComponents<'a, C> {
    entries: std::vec::IntoIter<(EntityId, &'a C)>,
}

impl<'a, C> EntityComponents<'a, C> {
    pub(crate) fn new(entries: Vec<(EntityId, &'a C)>) -> Self {
        Self {
            entries: entries.into_iter(),
        }
    }
}

// Manual impl: cloning only copies references, so `C: Clone` is not needed.
impl<C> Clone for EntityComponents<'_, C> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<'a, C> Iterator for EntityComponents<'a, C> {
    type Item = (EntityId, &'a C);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl<C> ExactSizeIterator for EntityComponents<'_, C> {}
