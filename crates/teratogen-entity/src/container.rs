//! The default component handler: one value per entity.
//!
//! Component values live in an arena of reference-counted slots addressed by
//! [`InstanceHandle`]. Each entity maps to one handle. Several entities may
//! map to the *same* handle ([`Container::share`]); they then observe each
//! other's mutations, and the snapshot codec keeps them shared across a
//! save/load cycle.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec;
use crate::entity::EntityId;
use crate::handler::{ComponentHandler, EntityComponents, EntityIds, Handler};
use crate::{EntityError, Result};

// ---------------------------------------------------------------------------
// InstanceHandle
// ---------------------------------------------------------------------------

/// Stable handle of one component instance inside a [`Container`].
///
/// Two entities share a component exactly when their handles are equal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceHandle(u32);

impl InstanceHandle {
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceHandle({})", self.0)
    }
}

#[derive(Debug)]
struct Slot<T> {
    value: T,
    /// Number of entities mapped to this slot.
    refs: u32,
}

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

/// Holds at most one component of type `T` per entity.
pub struct Container<T> {
    slots: Vec<Option<Slot<T>>>,
    free_slots: Vec<u32>,
    assignments: BTreeMap<EntityId, InstanceHandle>,
}

impl<T> Default for Container<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            assignments: BTreeMap::new(),
        }
    }
}

impl<T> fmt::Debug for Container<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("component", &std::any::type_name::<T>())
            .field("entities", &self.assignments.len())
            .field("instances", &self.instance_count())
            .finish()
    }
}

impl<T> Container<T> {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `id` a fresh component instance holding `value`, replacing any
    /// component it had. Returns the new instance's handle.
    pub fn add(&mut self, id: EntityId, value: T) -> InstanceHandle {
        if id.is_nil() {
            tracing::warn!(entity = %id, "adding a component to the nil entity");
        }
        let handle = self.alloc_slot(value);
        self.attach(id, handle);
        handle
    }

    /// Make `id` share the existing instance `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError::UnknownInstance`] if no live instance has that
    /// handle.
    pub fn share(&mut self, id: EntityId, handle: InstanceHandle) -> Result<()> {
        if self.instance(handle).is_none() {
            return Err(EntityError::UnknownInstance { handle: handle.0 });
        }
        self.attach(id, handle);
        Ok(())
    }

    /// The instance handle of `id`'s component.
    pub fn handle(&self, id: EntityId) -> Option<InstanceHandle> {
        self.assignments.get(&id).copied()
    }

    /// The component of `id`, or `None` if it has none.
    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.handle(id).and_then(|h| self.instance(h))
    }

    /// Mutable access to `id`'s component. Entities sharing the instance see
    /// the change.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        let handle = self.handle(id)?;
        self.slot_mut(handle).map(|slot| &mut slot.value)
    }

    /// The component instance behind `handle`.
    pub fn instance(&self, handle: InstanceHandle) -> Option<&T> {
        self.slots
            .get(handle.0 as usize)
            .and_then(Option::as_ref)
            .map(|slot| &slot.value)
    }

    /// Drop `id`'s component. A no-op if it has none.
    pub fn remove(&mut self, id: EntityId) {
        if let Some(handle) = self.assignments.remove(&id) {
            self.release(handle);
        }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.assignments.contains_key(&id)
    }

    /// Number of entities with a component.
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Number of distinct live component instances.
    pub fn instance_count(&self) -> usize {
        self.slots.len() - self.free_slots.len()
    }

    /// Remove every component.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free_slots.clear();
        self.assignments.clear();
    }

    /// Snapshot of the ids holding a component, ascending.
    pub fn ids(&self) -> EntityIds {
        EntityIds::new(self.assignments.keys().copied().collect())
    }

    /// `(id, component)` pairs in ascending id order.
    pub fn iter(&self) -> EntityComponents<'_, T> {
        EntityComponents::new(
            self.assignments
                .iter()
                .filter_map(|(&id, &h)| self.instance(h).map(|value| (id, value)))
                .collect(),
        )
    }

    // -- slot management -----------------------------------------------------

    fn alloc_slot(&mut self, value: T) -> InstanceHandle {
        // New slots start unreferenced; `attach` takes the first reference.
        let slot = Slot { value, refs: 0 };
        if let Some(index) = self.free_slots.pop() {
            self.slots[index as usize] = Some(slot);
            InstanceHandle(index)
        } else {
            self.slots.push(Some(slot));
            InstanceHandle((self.slots.len() - 1) as u32)
        }
    }

    fn slot_mut(&mut self, handle: InstanceHandle) -> Option<&mut Slot<T>> {
        self.slots.get_mut(handle.0 as usize).and_then(Option::as_mut)
    }

    /// Point `id` at `handle`, which must name a live slot.
    fn attach(&mut self, id: EntityId, handle: InstanceHandle) {
        if let Some(slot) = self.slot_mut(handle) {
            slot.refs += 1;
        }
        if let Some(previous) = self.assignments.insert(id, handle) {
            self.release(previous);
        }
    }

    fn release(&mut self, handle: InstanceHandle) {
        let Some(slot) = self.slot_mut(handle) else {
            return;
        };
        slot.refs = slot.refs.saturating_sub(1);
        if slot.refs == 0 {
            self.free_slot(handle);
        }
    }

    fn free_slot(&mut self, handle: InstanceHandle) {
        self.slots[handle.0 as usize] = None;
        self.free_slots.push(handle.0);
    }
}

// ---------------------------------------------------------------------------
// Handler impls
// ---------------------------------------------------------------------------

impl<T> Handler for Container<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn remove(&mut self, id: EntityId) {
        Container::remove(self, id);
    }

    fn has_component(&self, id: EntityId) -> bool {
        self.contains(id)
    }

    fn entity_ids(&self) -> EntityIds {
        self.ids()
    }

    fn len(&self) -> usize {
        Container::len(self)
    }

    fn clear(&mut self) {
        Container::clear(self);
    }

    fn serialize(&self, out: &mut dyn Write) -> Result<()> {
        let assignments: Vec<(EntityId, InstanceHandle)> =
            self.assignments.iter().map(|(&id, &h)| (id, h)).collect();
        codec::write_instances(out, &assignments, |h| self.instance(h))
    }

    fn deserialize(&mut self, input: &mut dyn Read) -> Result<()> {
        let decoded = codec::read_instances::<T>(input)?;

        // Build into a fresh container so a failed read leaves `self` alone.
        // Dense index `i` becomes slot `i`.
        let mut fresh = Container::new();
        for value in decoded.instances {
            fresh.alloc_slot(value);
        }
        for (id, index) in decoded.assignments {
            if fresh.contains(id) {
                return Err(EntityError::DuplicateAssignment { entity: id });
            }
            fresh.attach(id, InstanceHandle(index));
        }

        // Instances nobody references cannot come from a well-formed snapshot,
        // but drop them rather than keep unreachable slots.
        let orphans: Vec<InstanceHandle> = fresh
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.as_ref().is_some_and(|s| s.refs == 0))
            .map(|(i, _)| InstanceHandle(i as u32))
            .collect();
        if !orphans.is_empty() {
            tracing::warn!(
                count = orphans.len(),
                component = std::any::type_name::<T>(),
                "snapshot carried unreferenced component instances -- dropping"
            );
        }
        for handle in orphans {
            fresh.free_slot(handle);
        }

        *self = fresh;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<T> ComponentHandler for Container<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    type Component = T;

    fn add(&mut self, id: EntityId, component: T) {
        Container::add(self, id, component);
    }

    fn get(&self, id: EntityId) -> Option<&T> {
        Container::get(self, id)
    }

    fn entity_components(&self) -> EntityComponents<'_, T> {
        self.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Pos {
        x: i32,
        y: i32,
    }

    fn e(raw: u64) -> EntityId {
        EntityId::from_raw(raw)
    }

    #[test]
    fn add_get_remove() {
        let mut c = Container::new();
        c.add(e(1), Pos { x: 1, y: 2 });
        assert_eq!(c.get(e(1)), Some(&Pos { x: 1, y: 2 }));
        assert_eq!(c.get(e(2)), None);

        c.remove(e(1));
        assert_eq!(c.get(e(1)), None);
        assert!(c.is_empty());
        assert_eq!(c.instance_count(), 0);
    }

    #[test]
    fn add_overwrites() {
        let mut c = Container::new();
        c.add(e(1), Pos { x: 1, y: 1 });
        c.add(e(1), Pos { x: 9, y: 9 });
        assert_eq!(c.len(), 1);
        assert_eq!(c.instance_count(), 1);
        assert_eq!(c.get(e(1)), Some(&Pos { x: 9, y: 9 }));
    }

    #[test]
    fn remove_unknown_is_noop() {
        let mut c: Container<Pos> = Container::new();
        c.remove(e(42));
        assert!(c.is_empty());
    }

    #[test]
    fn shared_instance_co_varies() {
        let mut c = Container::new();
        let h = c.add(e(1), Pos { x: 0, y: 0 });
        c.share(e(2), h).unwrap();
        assert_eq!(c.instance_count(), 1);

        c.get_mut(e(1)).unwrap().x = 7;
        assert_eq!(c.get(e(2)).unwrap().x, 7);
        assert_eq!(c.handle(e(1)), c.handle(e(2)));
    }

    #[test]
    fn shared_instance_survives_partial_removal() {
        let mut c = Container::new();
        let h = c.add(e(1), Pos { x: 3, y: 3 });
        c.share(e(2), h).unwrap();

        c.remove(e(1));
        assert_eq!(c.get(e(2)), Some(&Pos { x: 3, y: 3 }));
        assert_eq!(c.instance_count(), 1);

        c.remove(e(2));
        assert_eq!(c.instance_count(), 0);
        assert!(c.instance(h).is_none());
    }

    #[test]
    fn share_unknown_handle_fails() {
        let mut c: Container<Pos> = Container::new();
        let h = c.add(e(1), Pos { x: 0, y: 0 });
        c.remove(e(1));
        let err = c.share(e(2), h).unwrap_err();
        assert!(matches!(err, EntityError::UnknownInstance { .. }));
    }

    #[test]
    fn resharing_same_handle_keeps_refcount() {
        let mut c = Container::new();
        let h = c.add(e(1), Pos { x: 0, y: 0 });
        c.share(e(1), h).unwrap();
        c.remove(e(1));
        assert_eq!(c.instance_count(), 0);
    }

    #[test]
    fn freed_slots_are_recycled() {
        let mut c = Container::new();
        let h1 = c.add(e(1), Pos { x: 0, y: 0 });
        c.remove(e(1));
        let h2 = c.add(e(2), Pos { x: 1, y: 1 });
        assert_eq!(h1, h2);
    }

    #[test]
    fn iteration_is_ascending_snapshot() {
        let mut c = Container::new();
        c.add(e(3), Pos { x: 3, y: 0 });
        c.add(e(1), Pos { x: 1, y: 0 });
        c.add(e(2), Pos { x: 2, y: 0 });

        let xs: Vec<i32> = c.iter().map(|(_, p)| p.x).collect();
        assert_eq!(xs, vec![1, 2, 3]);

        // Collect ids, then mutate.
        for id in c.ids() {
            if id.to_raw() % 2 == 1 {
                c.remove(id);
            }
        }
        assert_eq!(c.ids().collect::<Vec<_>>(), vec![e(2)]);
    }

    #[test]
    fn serialize_roundtrip_keeps_sharing() {
        let mut c = Container::new();
        let h = c.add(e(1), Pos { x: 5, y: 5 });
        c.share(e(2), h).unwrap();
        c.add(e(3), Pos { x: 6, y: 6 });

        let mut bytes = Vec::new();
        Handler::serialize(&c, &mut bytes).unwrap();

        let mut back: Container<Pos> = Container::new();
        Handler::deserialize(&mut back, &mut bytes.as_slice()).unwrap();
        assert_eq!(back.len(), 3);
        assert_eq!(back.instance_count(), 2);
        assert_eq!(back.handle(e(1)), back.handle(e(2)));

        back.get_mut(e(2)).unwrap().y = -1;
        assert_eq!(back.get(e(1)).unwrap().y, -1);

        let mut again = Vec::new();
        let mut reread: Container<Pos> = Container::new();
        Handler::deserialize(&mut reread, &mut bytes.as_slice()).unwrap();
        Handler::serialize(&reread, &mut again).unwrap();
        assert_eq!(again, bytes);
    }

    #[test]
    fn duplicate_assignment_is_rejected() {
        let mut bytes = Vec::new();
        codec::write_u32(&mut bytes, 1, "").unwrap();
        codec::encode_component(&mut bytes, &Pos { x: 0, y: 0 }).unwrap();
        codec::write_u32(&mut bytes, 2, "").unwrap();
        for _ in 0..2 {
            codec::write_u64(&mut bytes, 1, "").unwrap();
            codec::write_u32(&mut bytes, 0, "").unwrap();
        }

        let mut c: Container<Pos> = Container::new();
        let err = Handler::deserialize(&mut c, &mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, EntityError::DuplicateAssignment { .. }));
    }

    #[test]
    fn unreferenced_instances_are_dropped_on_load() {
        // Three instances, only the middle one assigned.
        let mut bytes = Vec::new();
        codec::write_u32(&mut bytes, 3, "").unwrap();
        for x in 0..3 {
            codec::encode_component(&mut bytes, &Pos { x, y: 0 }).unwrap();
        }
        codec::write_u32(&mut bytes, 1, "").unwrap();
        codec::write_u64(&mut bytes, 4, "").unwrap();
        codec::write_u32(&mut bytes, 1, "").unwrap();

        let mut c: Container<Pos> = Container::new();
        Handler::deserialize(&mut c, &mut bytes.as_slice()).unwrap();
        assert_eq!(c.len(), 1);
        assert_eq!(c.instance_count(), 1);
        assert_eq!(c.get(e(4)), Some(&Pos { x: 1, y: 0 }));

        // Freed slots are reused by later adds.
        c.add(e(5), Pos { x: 7, y: 7 });
        assert_eq!(c.instance_count(), 2);
        assert_eq!(c.get(e(4)), Some(&Pos { x: 1, y: 0 }));
    }

    #[test]
    fn clearing_through_the_handler_empties_everything() {
        let mut c = Container::new();
        c.add(e(1), Pos { x: 1, y: 1 });
        let h = c.handle(e(1)).unwrap();
        c.share(e(2), h).unwrap();

        Handler::clear(&mut c);
        assert!(Handler::is_empty(&c));
        assert_eq!(c.instance_count(), 0);
    }

    #[test]
    fn failed_deserialize_leaves_container_untouched() {
        let mut c = Container::new();
        c.add(e(1), Pos { x: 1, y: 1 });

        let truncated = [2u8, 0, 0];
        assert!(Handler::deserialize(&mut c, &mut truncated.as_slice()).is_err());
        assert_eq!(c.get(e(1)), Some(&Pos { x: 1, y: 1 }));
    }
}
