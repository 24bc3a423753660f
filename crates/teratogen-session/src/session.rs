//! One game session: the manager, the turn counter, and save/load.

use std::io::{Read, Write};

use anyhow::Context;
use teratogen_entity::entity::EntityId;
use teratogen_entity::manager::Manager;

use crate::bestiary::Bestiary;
use crate::config::SessionConfig;
use crate::containment;
use crate::families::standard_manager;
use crate::save;

/// Top-level game state container.
///
/// Loading never touches an existing session: [`Session::load`] builds a new
/// one from a fresh [`standard_manager`], and a failed load leaves nothing
/// behind to clean up.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    manager: Manager,
    bestiary: Bestiary,
    turn: u64,
}

impl Session {
    /// Start a new session with an empty standard manager at turn 0.
    ///
    /// Installs the config's log filter unless a subscriber already exists.
    pub fn new(config: SessionConfig) -> Self {
        config.init_tracing();
        Self {
            config,
            manager: standard_manager(),
            bestiary: Bestiary::standard(),
            turn: 0,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut Manager {
        &mut self.manager
    }

    pub fn bestiary(&self) -> &Bestiary {
        &self.bestiary
    }

    pub fn turn(&self) -> u64 {
        self.turn
    }

    /// Move to the next turn, returning its number.
    pub fn advance_turn(&mut self) -> u64 {
        self.turn += 1;
        self.turn
    }

    /// Spawn a bestiary prototype into this session.
    pub fn spawn(&mut self, prototype: &str) -> anyhow::Result<EntityId> {
        self.bestiary
            .spawn(prototype, &mut self.manager)
            .with_context(|| format!("failed to spawn '{prototype}'"))
    }

    /// Write a save file.
    pub fn save(&self, out: &mut dyn Write) -> anyhow::Result<()> {
        let snapshot = self
            .manager
            .to_bytes()
            .context("failed to snapshot entity manager")?;
        save::write_save(out, self.turn, &snapshot).context("failed to write save file")?;
        tracing::info!(
            turn = self.turn,
            bytes = snapshot.len(),
            entities = self.manager.entity_count(),
            "session saved"
        );
        Ok(())
    }

    /// Load a session from a save file.
    ///
    /// With `check_invariants_on_load`, the manager's invariants are checked
    /// and the containment pairs must form a forest.
    pub fn load(config: SessionConfig, input: &mut dyn Read) -> anyhow::Result<Self> {
        config.init_tracing();
        let file = save::read_save(input, config.verify_checksum).context("failed to read save file")?;

        let mut manager = standard_manager();
        manager
            .deserialize(&mut file.snapshot.as_slice())
            .context("failed to restore entity manager from save")?;
        if config.check_invariants_on_load {
            manager
                .check_invariants()
                .context("loaded save violates entity invariants")?;
            containment::check_forest(&manager).context("loaded save has looping containment")?;
        }

        tracing::info!(
            turn = file.turn,
            entities = manager.entity_count(),
            "session loaded"
        );
        Ok(Self {
            config,
            manager,
            bestiary: Bestiary::standard(),
            turn: file.turn,
        })
    }
}
