//! The standard component families of the game and their component types.
//!
//! Every component derives serde with `#[serde(default)]`, so prototype
//! templates only need to name the attributes they care about.

use serde::{Deserialize, Serialize};
use teratogen_entity::manager::Manager;
use teratogen_entity::relation::Cardinality;

// ---------------------------------------------------------------------------
// Family names
// ---------------------------------------------------------------------------

pub const POSITION: &str = "position";
pub const NAME: &str = "name";
pub const CREATURE: &str = "creature";
pub const ITEM: &str = "item";

/// Prototype metadata for the random spawner. Never registered with a
/// manager; it only lives in assemblages.
pub const SPAWN_METADATA: &str = "spawn-metadata";

/// Containment: lhs is the container, rhs the directly contained entity.
pub const CONTAINS: &str = "contains";
pub const MELEE_EQUIP: &str = "melee-equip";
pub const GUN_EQUIP: &str = "gun-equip";
pub const ARMOR_EQUIP: &str = "armor-equip";

/// A manager with every standard handler registered.
pub fn standard_manager() -> Manager {
    let mut manager = Manager::new();
    manager.register_container::<Position>(POSITION);
    manager.register_container::<Name>(NAME);
    manager.register_container::<Creature>(CREATURE);
    manager.register_container::<Item>(ITEM);
    manager.register_relation(CONTAINS, Cardinality::OneToMany);
    manager.register_relation(MELEE_EQUIP, Cardinality::OneToOne);
    manager.register_relation(GUN_EQUIP, Cardinality::OneToOne);
    manager.register_relation(ARMOR_EQUIP, Cardinality::OneToOne);
    manager
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pronoun {
    #[default]
    It,
    He,
    She,
    They,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Name {
    pub name: String,
    /// Tile id used by the renderer, e.g. `"chars:16"`.
    pub icon: String,
    pub pronoun: Pronoun,
    /// Proper names take no article ("Alice", not "the Alice").
    pub is_proper: bool,
}

/// Creature intrinsic trait bits.
pub mod intrinsics {
    pub const SLOW: u32 = 1 << 0;
    pub const FAST: u32 = 1 << 1;
    pub const DEATHSPLODE: u32 = 1 << 2;
    pub const ENDBOSS: u32 = 1 << 3;
    pub const UNLIVING: u32 = 1 << 4;
    pub const MARTIAL_ARTIST: u32 = 1 << 5;
    pub const IMMOBILE: u32 = 1 << 6;
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Creature {
    pub hp: i32,
    pub wounds: i32,
    /// Primary attack, usually melee.
    pub attack1: String,
    /// Secondary attack, usually ranged. Empty for none.
    pub attack2: String,
    pub intrinsics: u32,
}

impl Creature {
    pub fn has_intrinsic(&self, bit: u32) -> bool {
        self.intrinsics & bit != 0
    }

    pub fn is_dead(&self) -> bool {
        self.wounds >= self.hp
    }
}

/// Which equipment relation an item goes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EquipSlot {
    #[default]
    None,
    Melee,
    Gun,
    Armor,
}

impl EquipSlot {
    /// The relation family for this slot. Lhs is the wearer, rhs the item.
    pub fn family(self) -> Option<&'static str> {
        match self {
            EquipSlot::None => None,
            EquipSlot::Melee => Some(MELEE_EQUIP),
            EquipSlot::Gun => Some(GUN_EQUIP),
            EquipSlot::Armor => Some(ARMOR_EQUIP),
        }
    }

    pub const ALL: [EquipSlot; 3] = [EquipSlot::Melee, EquipSlot::Gun, EquipSlot::Armor];
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Item {
    pub slot: EquipSlot,
    pub durability: i32,
    pub wound_bonus: i32,
    pub defense_bonus: i32,
}
