//! Named entity prototypes.
//!
//! Every prototype carries a [`SPAWN_METADATA`] marker telling the level
//! generator how rare it is and at which depths it may appear. Creatures are
//! derived from a shared `creature` base so they all get a position and
//! default stats.

use std::collections::BTreeMap;

use teratogen_entity::entity::EntityId;
use teratogen_entity::manager::Manager;
use teratogen_entity::template::{Assemblage, ComponentTemplate, DataTemplate, MarkerTemplate};

use crate::families::{
    intrinsics, Creature, Item, Name, Position, CREATURE, ITEM, NAME, POSITION, SPAWN_METADATA,
};
use crate::{Result, SessionError};

/// Spawner metadata read from a prototype's marker template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnInfo {
    /// Higher is rarer. Negative means never placed by the random spawner.
    pub scarcity: i64,
    pub min_depth: i64,
    /// Negative for no maximum.
    pub max_depth: i64,
}

impl SpawnInfo {
    pub fn spawns_at(&self, depth: i64) -> bool {
        self.scarcity >= 0 && depth >= self.min_depth && (self.max_depth < 0 || depth <= self.max_depth)
    }
}

fn spawn_metadata(scarcity: i64, min_depth: i64, max_depth: i64) -> MarkerTemplate {
    MarkerTemplate::new()
        .with("scarcity", scarcity)
        .with("min_depth", min_depth)
        .with("max_depth", max_depth)
}

fn name(name: &str, icon: &str, pronoun: &str) -> DataTemplate<Name> {
    DataTemplate::new()
        .with("name", name)
        .with("icon", icon)
        .with("pronoun", pronoun)
}

/// The catalog of named prototypes.
#[derive(Debug, Clone, Default)]
pub struct Bestiary {
    assemblages: BTreeMap<String, Assemblage>,
}

impl Bestiary {
    /// An empty bestiary.
    pub fn new() -> Self {
        Self::default()
    }

    /// The game's standard creatures and items.
    pub fn standard() -> Self {
        let creature = Assemblage::new()
            .with(SPAWN_METADATA, spawn_metadata(-1, 0, -1))
            .with(POSITION, DataTemplate::<Position>::new())
            .with(NAME, name("creature", "", "it"))
            .with(CREATURE, DataTemplate::<Creature>::new().with("hp", 10).with("attack1", "fist"));

        let item = Assemblage::new()
            .with(SPAWN_METADATA, spawn_metadata(-1, 0, -1))
            .with(POSITION, DataTemplate::<Position>::new())
            .with(NAME, name("item", "", "it"))
            .with(ITEM, DataTemplate::<Item>::new());

        let mut b = Bestiary::new();
        b.insert(
            "protagonist",
            creature.derive(
                &Assemblage::new()
                    .with(NAME, name("protagonist", "chars:16", "they").with("is_proper", true))
                    .with(
                        CREATURE,
                        DataTemplate::<Creature>::new()
                            .with("hp", 100)
                            .with("attack2", "pistol")
                            .with("intrinsics", intrinsics::MARTIAL_ARTIST),
                    ),
            ),
        );
        b.insert(
            "zombie",
            creature.derive(
                &Assemblage::new()
                    .with(SPAWN_METADATA, spawn_metadata(100, 2, -1))
                    .with(NAME, name("zombie", "chars:1", "it"))
                    .with(CREATURE, DataTemplate::<Creature>::new().with("hp", 25)),
            ),
        );
        b.insert(
            "dog-thing",
            creature.derive(
                &Assemblage::new()
                    .with(SPAWN_METADATA, spawn_metadata(150, 0, 7))
                    .with(NAME, name("dog-thing", "chars:2", "it"))
                    .with(
                        CREATURE,
                        DataTemplate::<Creature>::new().with("hp", 15).with("attack1", "jaws"),
                    ),
            ),
        );
        b.insert(
            "ogre",
            creature.derive(
                &Assemblage::new()
                    .with(SPAWN_METADATA, spawn_metadata(600, 5, -1))
                    .with(NAME, name("ogre", "chars:15", "he"))
                    .with(
                        CREATURE,
                        DataTemplate::<Creature>::new().with("hp", 60).with("attack1", "club"),
                    ),
            ),
        );
        b.insert(
            "wendigo",
            creature.derive(
                &Assemblage::new()
                    .with(SPAWN_METADATA, spawn_metadata(300, 6, 13))
                    .with(NAME, name("wendigo", "chars:8", "it"))
                    .with(
                        CREATURE,
                        DataTemplate::<Creature>::new()
                            .with("hp", 50)
                            .with("attack1", "claw")
                            .with("intrinsics", intrinsics::FAST),
                    ),
            ),
        );

        b.insert(
            "knife",
            item.derive(
                &Assemblage::new()
                    .with(SPAWN_METADATA, spawn_metadata(200, 0, 5))
                    .with(NAME, name("knife", "items:1", "it"))
                    .with(
                        ITEM,
                        DataTemplate::<Item>::new()
                            .with("slot", "melee")
                            .with("wound_bonus", 1)
                            .with("durability", 20),
                    ),
            ),
        );
        b.insert(
            "pistol",
            item.derive(
                &Assemblage::new()
                    .with(SPAWN_METADATA, spawn_metadata(400, 1, -1))
                    .with(NAME, name("pistol", "items:2", "it"))
                    .with(ITEM, DataTemplate::<Item>::new().with("slot", "gun").with("wound_bonus", 2)),
            ),
        );
        b.insert(
            "kevlar",
            item.derive(
                &Assemblage::new()
                    .with(SPAWN_METADATA, spawn_metadata(500, 3, -1))
                    .with(NAME, name("kevlar armor", "items:3", "it"))
                    .with(
                        ITEM,
                        DataTemplate::<Item>::new()
                            .with("slot", "armor")
                            .with("defense_bonus", 3)
                            .with("durability", 40),
                    ),
            ),
        );
        b
    }

    /// Add or replace a prototype.
    pub fn insert(&mut self, name: impl Into<String>, assemblage: Assemblage) -> Option<Assemblage> {
        self.assemblages.insert(name.into(), assemblage)
    }

    pub fn get(&self, name: &str) -> Option<&Assemblage> {
        self.assemblages.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.assemblages.keys().map(String::as_str)
    }

    /// Spawner metadata for `name`, if it has a marker.
    pub fn spawn_info(&self, name: &str) -> Option<SpawnInfo> {
        let marker = self.get(name)?.get(SPAWN_METADATA)?;
        let attrs = marker.attributes();
        let field = |key: &str| attrs.get(key).and_then(|v| v.as_i64());
        Some(SpawnInfo {
            scarcity: field("scarcity")?,
            min_depth: field("min_depth").unwrap_or(0),
            max_depth: field("max_depth").unwrap_or(-1),
        })
    }

    /// Prototypes the random spawner may place at `depth`, with their
    /// scarcity, in name order.
    pub fn spawnable_at(&self, depth: i64) -> Vec<(&str, i64)> {
        self.names()
            .filter_map(|name| {
                let info = self.spawn_info(name)?;
                info.spawns_at(depth).then_some((name, info.scarcity))
            })
            .collect()
    }

    /// Build a new entity from the prototype `name`.
    pub fn spawn(&self, name: &str, manager: &mut Manager) -> Result<EntityId> {
        let assemblage = self.get(name).ok_or_else(|| SessionError::UnknownAssemblage {
            name: name.to_owned(),
            known: self.names().collect::<Vec<_>>().join(", "),
        })?;
        let id = assemblage.make_entity(manager)?;
        tracing::debug!(entity = %id, prototype = name, "spawned");
        Ok(id)
    }
}
