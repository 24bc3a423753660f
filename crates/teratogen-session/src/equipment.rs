//! Equipment slots.
//!
//! Each [`EquipSlot`] has its own one-to-one relation from wearer to item, so
//! a wearer holds at most one item per slot and an item is worn by at most
//! one wearer.

use teratogen_entity::entity::EntityId;
use teratogen_entity::manager::Manager;

use crate::containment;
use crate::families::{EquipSlot, Item, ITEM};
use crate::Result;

/// The slot `item` fits in, or [`EquipSlot::None`] for non-equipment.
pub fn slot_of(manager: &Manager, item: EntityId) -> Result<EquipSlot> {
    Ok(manager
        .container::<Item>(ITEM)?
        .get(item)
        .map_or(EquipSlot::None, |i| i.slot))
}

/// Put `item` into `wearer`'s matching slot, replacing whatever was there.
///
/// The item is moved into the wearer's inventory first if it is elsewhere.
/// Returns `false` (and changes nothing) if the item has no slot.
pub fn equip(manager: &mut Manager, wearer: EntityId, item: EntityId) -> Result<bool> {
    let Some(family) = slot_of(manager, item)?.family() else {
        return Ok(false);
    };
    if containment::parent(manager, item)? != Some(wearer) {
        containment::set_parent(manager, item, Some(wearer))?;
    }
    manager.relation_mut(family)?.add_pair(wearer, item);
    Ok(true)
}

/// The item `wearer` has in `slot`.
pub fn equipped(manager: &Manager, wearer: EntityId, slot: EquipSlot) -> Result<Option<EntityId>> {
    match slot.family() {
        Some(family) => Ok(manager.relation(family)?.get_rhs(wearer)),
        None => Ok(None),
    }
}

/// Whether anybody is wearing `item`.
pub fn is_equipped(manager: &Manager, item: EntityId) -> Result<bool> {
    match slot_of(manager, item)?.family() {
        Some(family) => Ok(manager.relation(family)?.get_lhs(item).is_some()),
        None => Ok(false),
    }
}

/// Take `item` off whoever is wearing it. A no-op for unworn items.
pub fn unequip_item(manager: &mut Manager, item: EntityId) -> Result<()> {
    if let Some(family) = slot_of(manager, item)?.family() {
        manager.relation_mut(family)?.remove_with_rhs(item);
    }
    Ok(())
}
