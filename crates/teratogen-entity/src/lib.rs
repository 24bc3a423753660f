//! Teratogen Entity -- the entity substrate of the Teratogen roguelike.
//!
//! Entities are bare 64-bit identifiers. All per-entity data lives in
//! *handlers*, one per named component family, registered with a
//! [`Manager`](manager::Manager). Two handler kinds ship with the crate:
//!
//! - [`Container<T>`](container::Container) -- exactly one component value per
//!   entity, with arena-backed instances that several entities may share.
//! - [`Relation`](relation::Relation) -- a cardinality-constrained binary
//!   relation between entity ids (containment, equipment slots, ...).
//!
//! Entity prototypes are described declaratively with
//! [`Assemblage`](template::Assemblage)s of component templates, and the
//! whole manager state round-trips through a compact binary snapshot.
//!
//! # Quick Start
//!
//! ```
//! use teratogen_entity::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Pos { x: i32, y: i32 }
//!
//! let mut manager = Manager::new();
//! manager.register_container::<Pos>("pos");
//! manager.register_relation("contains", Cardinality::OneToMany);
//!
//! let bag = manager.new_entity();
//! let coin = manager.new_entity();
//! manager.container_mut::<Pos>("pos").unwrap().add(bag, Pos { x: 3, y: 4 });
//! manager.relation_mut("contains").unwrap().add_pair(bag, coin);
//!
//! let bytes = manager.to_bytes().unwrap();
//!
//! let mut restored = Manager::new();
//! restored.register_container::<Pos>("pos");
//! restored.register_relation("contains", Cardinality::OneToMany);
//! restored.deserialize(&mut bytes.as_slice()).unwrap();
//!
//! assert_eq!(restored.relation("contains").unwrap().get_lhs(coin), Some(bag));
//! assert_eq!(restored.to_bytes().unwrap(), bytes);
//! ```

#![deny(unsafe_code)]

pub mod codec;
pub mod container;
pub mod entity;
pub mod family;
pub mod handler;
pub mod manager;
pub mod relation;
pub mod template;

use entity::EntityId;
use family::ComponentFamily;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by entity substrate operations.
#[derive(Debug, thiserror::Error)]
pub enum EntityError {
    /// A snapshot or accessor referenced a family with no registered handler.
    #[error("no handler registered for component family '{family}'. Registered families: [{registered}]")]
    UnregisteredFamily {
        family: ComponentFamily,
        registered: String,
    },

    /// The handler registered for a family is not of the requested type.
    #[error("handler for family '{family}' is a {found}, not a {expected}")]
    HandlerTypeMismatch {
        family: ComponentFamily,
        expected: &'static str,
        found: &'static str,
    },

    /// An error raised inside one family's handler, tagged with that family.
    #[error("in handler for family '{family}': {source}")]
    InHandler {
        family: ComponentFamily,
        #[source]
        source: Box<EntityError>,
    },

    /// The input stream ended before a complete value could be read.
    #[error("snapshot truncated while reading {context}")]
    Truncated { context: &'static str },

    /// An I/O error other than a short read.
    #[error("i/o error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// A collection is too large for its 4-byte length prefix.
    #[error("{context} count {count} does not fit the 32-bit length prefix")]
    CountOverflow { context: &'static str, count: usize },

    /// A relation block carried an unknown cardinality tag.
    #[error("invalid relation cardinality tag {0}")]
    InvalidCardinality(u8),

    /// A length-prefixed string was not valid UTF-8.
    #[error("invalid utf-8 in {context}")]
    InvalidString { context: &'static str },

    /// An assignment referenced a component instance that does not exist.
    #[error("component instance index {index} out of range (snapshot holds {count} instances)")]
    InstanceIndexOutOfRange { index: u32, count: u32 },

    /// A component body could not be encoded.
    #[error("failed to encode component: {details}")]
    ComponentEncode { details: String },

    /// A component body could not be decoded.
    #[error("failed to decode component: {details}")]
    ComponentDecode { details: String },

    /// A snapshot carried two blocks for the same family.
    #[error("snapshot contains more than one block for family '{family}'")]
    DuplicateFamily { family: ComponentFamily },

    /// A container block assigned two components to one entity.
    #[error("snapshot assigns more than one component to entity {entity}")]
    DuplicateAssignment { entity: EntityId },

    /// A container was asked to share an instance handle it does not hold.
    #[error("unknown component instance {handle}")]
    UnknownInstance { handle: u32 },

    /// The live-entity set in a snapshot contradicts the id counter.
    #[error("snapshot lists live entity {entity} but the id counter is {next_id}")]
    CorruptLiveSet { entity: EntityId, next_id: u64 },

    /// A relation's forward and reverse indices disagree about a pair.
    #[error("relation indices disagree about pair ({lhs}, {rhs})")]
    RelationAsymmetry { lhs: EntityId, rhs: EntityId },

    /// A handler still reports data for an entity that is not live.
    #[error("handler reports data for entity {entity}, which is not live")]
    OrphanComponent { entity: EntityId },

    /// A template could not build its component.
    #[error("template for family '{family}' failed: {details}")]
    TemplateMaterialize {
        family: ComponentFamily,
        details: String,
    },
}

impl EntityError {
    /// Wrap `self` with the family whose handler produced it.
    pub fn in_handler(self, family: &ComponentFamily) -> Self {
        EntityError::InHandler {
            family: family.clone(),
            source: Box::new(self),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = EntityError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::container::{Container, InstanceHandle};
    pub use crate::entity::{EntityAllocator, EntityId};
    pub use crate::family::ComponentFamily;
    pub use crate::handler::{ComponentHandler, EntityComponents, EntityIds, Handler};
    pub use crate::manager::Manager;
    pub use crate::relation::{Cardinality, Pair, Pairs, Relation};
    pub use crate::template::{Assemblage, Attributes, ComponentTemplate, DataTemplate, MarkerTemplate};
    pub use crate::{EntityError, Result};
}
