//! The entity manager.
//!
//! [`Manager`] owns entity identity (allocation and the live set) and one
//! handler per component family. It cascades entity destruction across every
//! handler and composes the handlers' blocks into a whole-state snapshot.
//!
//! # Snapshot layout
//!
//! All integers little-endian:
//!
//! ```text
//! u64 next_id
//! u32 live_count, live_count x u64 id          (ascending)
//! u32 handler_count, handler_count x {
//!     u32 name_len, name_len x u8 family name   (ascending by name)
//!     handler block
//! }
//! ```
//!
//! There is no type registry in the stream: a manager can only load a
//! snapshot if handlers of the same types are already registered under the
//! same family names.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec;
use crate::container::Container;
use crate::entity::{EntityAllocator, EntityId};
use crate::family::ComponentFamily;
use crate::handler::{EntityIds, Handler};
use crate::relation::{Cardinality, Relation};
use crate::{EntityError, Result};

/// Owns entity ids and the per-family handler registry.
#[derive(Default)]
pub struct Manager {
    allocator: EntityAllocator,
    /// Ordered by family name, which is also the snapshot order.
    handlers: BTreeMap<ComponentFamily, Box<dyn Handler>>,
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers: BTreeMap<&str, &str> = self
            .handlers
            .iter()
            .map(|(family, h)| (family.as_str(), h.type_name()))
            .collect();
        f.debug_struct("Manager")
            .field("next_id", &self.allocator.next_id())
            .field("entities", &self.allocator.alive_count())
            .field("handlers", &handlers)
            .finish()
    }
}

impl Manager {
    /// Create a manager with no entities and no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    // -- entities ------------------------------------------------------------

    /// Allocate a new live entity.
    pub fn new_entity(&mut self) -> EntityId {
        let id = self.allocator.allocate();
        tracing::debug!(entity = %id, "entity created");
        id
    }

    /// Destroy `id`: every handler drops its data for it, then it leaves the
    /// live set. Removing an entity that is not live still cleans handlers.
    pub fn remove_entity(&mut self, id: EntityId) {
        for handler in self.handlers.values_mut() {
            handler.remove(id);
        }
        if self.allocator.deallocate(id) {
            tracing::debug!(entity = %id, "entity removed");
        } else {
            tracing::warn!(entity = %id, "removing an entity that is not live");
        }
    }

    pub fn has_entity(&self, id: EntityId) -> bool {
        self.allocator.is_alive(id)
    }

    /// Snapshot of the live ids, ascending. The manager may be mutated while
    /// the iterator is in use.
    pub fn entities(&self) -> EntityIds {
        self.allocator.iter()
    }

    pub fn entity_count(&self) -> usize {
        self.allocator.alive_count()
    }

    // -- handler registry ----------------------------------------------------

    /// Register `handler` for `family`, returning the handler it replaces.
    pub fn set_handler<H: Handler>(
        &mut self,
        family: impl Into<ComponentFamily>,
        handler: H,
    ) -> Option<Box<dyn Handler>> {
        let family = family.into();
        tracing::debug!(family = %family, handler = handler.type_name(), "handler registered");
        let previous = self.handlers.insert(family.clone(), Box::new(handler));
        if let Some(previous) = &previous {
            tracing::warn!(
                family = %family,
                replaced = previous.type_name(),
                "replacing an existing handler -- its data is dropped from the manager"
            );
        }
        previous
    }

    /// Register an empty [`Container<T>`] for `family`.
    pub fn register_container<T>(&mut self, family: impl Into<ComponentFamily>)
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        self.set_handler(family, Container::<T>::new());
    }

    /// Register an empty [`Relation`] for `family`.
    pub fn register_relation(&mut self, family: impl Into<ComponentFamily>, cardinality: Cardinality) {
        self.set_handler(family, Relation::new(cardinality));
    }

    pub fn handler(&self, family: &str) -> Option<&dyn Handler> {
        self.handlers.get(family).map(|h| h.as_ref())
    }

    pub fn handler_mut(&mut self, family: &str) -> Option<&mut dyn Handler> {
        match self.handlers.get_mut(family) {
            Some(h) => Some(h.as_mut()),
            None => None,
        }
    }

    /// Registered family names, ascending.
    pub fn families(&self) -> impl Iterator<Item = &ComponentFamily> {
        self.handlers.keys()
    }

    /// The handler of `family`, downcast to `H`.
    ///
    /// # Errors
    ///
    /// [`EntityError::UnregisteredFamily`] if nothing is registered for
    /// `family`; [`EntityError::HandlerTypeMismatch`] if the handler is not an
    /// `H`.
    pub fn handler_as<H: Handler>(&self, family: &str) -> Result<&H> {
        let handler = self
            .handlers
            .get(family)
            .ok_or_else(|| self.unregistered(family))?;
        let found = handler.type_name();
        handler
            .as_any()
            .downcast_ref::<H>()
            .ok_or_else(|| type_mismatch::<H>(family, found))
    }

    /// Mutable counterpart of [`Manager::handler_as`].
    pub fn handler_as_mut<H: Handler>(&mut self, family: &str) -> Result<&mut H> {
        let found = match self.handlers.get(family) {
            Some(handler) => handler.type_name(),
            None => return Err(self.unregistered(family)),
        };
        self.handlers
            .get_mut(family)
            .and_then(|handler| handler.as_any_mut().downcast_mut::<H>())
            .ok_or_else(|| type_mismatch::<H>(family, found))
    }

    pub fn container<T>(&self, family: &str) -> Result<&Container<T>>
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        self.handler_as::<Container<T>>(family)
    }

    pub fn container_mut<T>(&mut self, family: &str) -> Result<&mut Container<T>>
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        self.handler_as_mut::<Container<T>>(family)
    }

    pub fn relation(&self, family: &str) -> Result<&Relation> {
        self.handler_as::<Relation>(family)
    }

    pub fn relation_mut(&mut self, family: &str) -> Result<&mut Relation> {
        self.handler_as_mut::<Relation>(family)
    }

    fn unregistered(&self, family: &str) -> EntityError {
        EntityError::UnregisteredFamily {
            family: family.into(),
            registered: self
                .handlers
                .keys()
                .map(ComponentFamily::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    // -- snapshots -----------------------------------------------------------

    /// Write a full snapshot of the manager and every handler.
    pub fn serialize(&self, out: &mut dyn Write) -> Result<()> {
        let _span = tracing::info_span!("manager_serialize").entered();

        let (next_id, live) = self.allocator.snapshot_state();
        codec::write_u64(out, next_id, "id counter")?;
        codec::write_count(out, live.len(), "live entity count")?;
        for &id in &live {
            codec::write_entity(out, id, "live entity")?;
        }

        codec::write_count(out, self.handlers.len(), "handler count")?;
        for (family, handler) in &self.handlers {
            codec::write_string(out, family.as_str(), "family name")?;
            handler.serialize(out).map_err(|e| e.in_handler(family))?;
        }

        tracing::info!(
            entities = live.len(),
            handlers = self.handlers.len(),
            "snapshot written"
        );
        Ok(())
    }

    /// Serialize into a fresh byte vector.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.serialize(&mut bytes)?;
        tracing::debug!(bytes = bytes.len(), "snapshot encoded");
        Ok(bytes)
    }

    /// Replace the manager's state with a snapshot read from `input`.
    ///
    /// Every handler is emptied first, so a registered family the stream does
    /// not mention comes back empty. Every family in the stream must already
    /// have a handler of the type used at save time, and may appear only
    /// once. On error the manager may be partially loaded and must be
    /// discarded.
    pub fn deserialize(&mut self, input: &mut dyn Read) -> Result<()> {
        let _span = tracing::info_span!("manager_deserialize").entered();

        let next_id = codec::read_u64(input, "id counter")?;
        let live_count = codec::read_u32(input, "live entity count")?;
        let mut live = codec::vec_for_count(live_count);
        for _ in 0..live_count {
            let id = codec::read_entity(input, "live entity")?;
            if id.is_nil() || id.to_raw() > next_id {
                tracing::error!(entity = %id, next_id, "live set contradicts id counter");
                return Err(EntityError::CorruptLiveSet { entity: id, next_id });
            }
            live.push(id);
        }
        self.allocator = EntityAllocator::restore_from_snapshot(next_id, live);
        for handler in self.handlers.values_mut() {
            handler.clear();
        }

        let handler_count = codec::read_u32(input, "handler count")?;
        let mut seen = BTreeSet::new();
        for _ in 0..handler_count {
            let family = ComponentFamily::new(codec::read_string(input, "family name")?);
            if !seen.insert(family.clone()) {
                tracing::error!(family = %family, "snapshot repeats a family block");
                return Err(EntityError::DuplicateFamily { family });
            }
            let Some(handler) = self.handlers.get_mut(family.as_str()) else {
                tracing::error!(family = %family, "snapshot names a family with no registered handler");
                return Err(self.unregistered(family.as_str()));
            };
            handler.deserialize(input).map_err(|e| e.in_handler(&family))?;
        }

        let absent: Vec<&str> = self
            .handlers
            .keys()
            .filter(|family| !seen.contains(*family))
            .map(ComponentFamily::as_str)
            .collect();
        if !absent.is_empty() {
            tracing::warn!(?absent, "registered families missing from snapshot -- left empty");
        }

        tracing::info!(
            entities = self.allocator.alive_count(),
            handlers = handler_count,
            "snapshot loaded"
        );
        Ok(())
    }

    /// Verify every handler's internal invariants and that no handler holds
    /// data for an entity that is not live.
    pub fn check_invariants(&self) -> Result<()> {
        for (family, handler) in &self.handlers {
            if let Err(e) = handler.check_invariants() {
                tracing::error!(family = %family, error = %e, "handler invariant violated");
                return Err(e.in_handler(family));
            }
            if let Some(orphan) = handler.entity_ids().find(|&id| !self.has_entity(id)) {
                tracing::error!(family = %family, entity = %orphan, "handler holds data for a dead entity");
                return Err(EntityError::OrphanComponent { entity: orphan }.in_handler(family));
            }
        }
        Ok(())
    }
}

fn type_mismatch<H>(family: &str, found: &'static str) -> EntityError {
    EntityError::HandlerTypeMismatch {
        family: family.into(),
        expected: std::any::type_name::<H>(),
        found,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
