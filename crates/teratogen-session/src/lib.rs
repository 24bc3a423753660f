//! Teratogen Session -- the game-facing layer over the entity substrate.
//!
//! A [`Session`](session::Session) owns one [`Manager`] pre-wired with the
//! standard component families, the turn counter, and the bestiary of entity
//! prototypes. Game subsystems receive the session (or its manager)
//! explicitly; there is no global state.
//!
//! ```
//! use teratogen_session::prelude::*;
//!
//! let mut session = Session::new(SessionConfig::default());
//! let hero = session.spawn("protagonist").unwrap();
//! let knife = session.spawn("knife").unwrap();
//! containment::set_parent(session.manager_mut(), knife, Some(hero)).unwrap();
//!
//! let mut save = Vec::new();
//! session.save(&mut save).unwrap();
//! let loaded = Session::load(SessionConfig::default(), &mut save.as_slice()).unwrap();
//! assert_eq!(containment::parent(loaded.manager(), knife).unwrap(), Some(hero));
//! ```

#![deny(unsafe_code)]

pub mod bestiary;
pub mod config;
pub mod containment;
pub mod equipment;
pub mod families;
pub mod save;
pub mod session;

use teratogen_entity::entity::EntityId;
use teratogen_entity::EntityError;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by the session layer.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// An error from the entity substrate.
    #[error(transparent)]
    Entity(#[from] EntityError),

    /// Placing an entity inside `container` would make it contain itself.
    #[error("cannot put {item} inside {container}: it would contain itself")]
    ContainmentCycle {
        item: EntityId,
        container: EntityId,
    },

    /// The stored containment pairs loop back to `entity`.
    #[error("containment of {entity} loops back on itself")]
    CyclicContainment { entity: EntityId },

    /// The bestiary has no assemblage with this name.
    #[error("no assemblage named '{name}'. Known: [{known}]")]
    UnknownAssemblage { name: String, known: String },

    /// The input does not start with the save-file magic.
    #[error("not a save file (magic {found:?})")]
    BadMagic { found: [u8; 8] },

    /// The stored digest does not match the snapshot bytes.
    #[error("save checksum mismatch: recorded {recorded}, computed {computed}")]
    ChecksumMismatch { recorded: String, computed: String },
}

/// Result alias for session-layer operations.
pub type Result<T, E = SessionError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Install a `tracing` fmt subscriber as the global default.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` (e.g. `"warn"` or
/// `"teratogen_entity=debug"`) is used. Returns `false` and changes nothing
/// when a global subscriber is already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok()
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::bestiary::{Bestiary, SpawnInfo};
    pub use crate::config::SessionConfig;
    pub use crate::containment;
    pub use crate::equipment;
    pub use crate::families::{
        standard_manager, Creature, EquipSlot, Item, Name, Position, Pronoun,
    };
    pub use crate::session::Session;
    pub use crate::{init_tracing, SessionError};
    pub use teratogen_entity::prelude::*;
}
