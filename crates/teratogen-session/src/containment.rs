//! Containment queries and moves over the [`CONTAINS`] relation.
//!
//! An entity is in at most one container (the relation is one-to-many, so
//! each rhs has one lhs). Only direct containment is stored; "inside a bag
//! inside a chest" is a chain of pairs.

use std::collections::BTreeSet;

use teratogen_entity::entity::EntityId;
use teratogen_entity::handler::EntityIds;
use teratogen_entity::manager::Manager;
use teratogen_entity::relation::Relation;

use crate::equipment;
use crate::families::{Position, CONTAINS, POSITION};
use crate::{Result, SessionError};

/// The direct container of `id`.
pub fn parent(manager: &Manager, id: EntityId) -> Result<Option<EntityId>> {
    Ok(manager.relation(CONTAINS)?.get_lhs(id))
}

/// The containers of `id` from the innermost outwards.
fn ancestors(contains: &Relation, id: EntityId) -> Result<Vec<EntityId>> {
    let mut chain = Vec::new();
    let mut seen = BTreeSet::from([id]);
    let mut current = id;
    while let Some(up) = contains.get_lhs(current) {
        if !seen.insert(up) {
            tracing::error!(entity = %id, at = %up, "containment chain loops");
            return Err(SessionError::CyclicContainment { entity: up });
        }
        chain.push(up);
        current = up;
    }
    Ok(chain)
}

/// The outermost container of `id`, or `None` if it is not contained.
///
/// # Errors
///
/// [`SessionError::CyclicContainment`] if the chain above `id` loops.
pub fn top_parent(manager: &Manager, id: EntityId) -> Result<Option<EntityId>> {
    Ok(ancestors(manager.relation(CONTAINS)?, id)?.last().copied())
}

pub fn is_contained(manager: &Manager, id: EntityId) -> Result<bool> {
    Ok(parent(manager, id)?.is_some())
}

/// Direct contents of `id`, not their contents.
pub fn contents(manager: &Manager, id: EntityId) -> Result<EntityIds> {
    Ok(manager.relation(CONTAINS)?.iter_rhs(id))
}

/// Every entity inside `id` at any depth, depth-first.
///
/// # Errors
///
/// [`SessionError::CyclicContainment`] if some entity is reached twice.
pub fn recursive_contents(manager: &Manager, id: EntityId) -> Result<Vec<EntityId>> {
    let contains = manager.relation(CONTAINS)?;
    let mut out = Vec::new();
    let mut seen = BTreeSet::from([id]);
    let mut stack: Vec<EntityId> = contains.iter_rhs(id).rev().collect();
    while let Some(next) = stack.pop() {
        if !seen.insert(next) {
            tracing::error!(entity = %id, at = %next, "containment tree loops");
            return Err(SessionError::CyclicContainment { entity: next });
        }
        out.push(next);
        stack.extend(contains.iter_rhs(next).rev());
    }
    Ok(out)
}

pub fn has_contents(manager: &Manager, id: EntityId) -> Result<bool> {
    Ok(manager.relation(CONTAINS)?.get_rhs(id).is_some())
}

pub fn count_contents(manager: &Manager, id: EntityId) -> Result<usize> {
    Ok(manager.relation(CONTAINS)?.count_rhs(id))
}

/// Where `id` is on the map: the position of its outermost positioned
/// container, or its own position when no container has one.
pub fn map_position(manager: &Manager, id: EntityId) -> Result<Option<Position>> {
    let positions = manager.container::<Position>(POSITION)?;
    let chain = ancestors(manager.relation(CONTAINS)?, id)?;
    Ok(chain
        .iter()
        .rev()
        .chain(std::iter::once(&id))
        .find_map(|&e| positions.get(e).copied()))
}

/// Check that the stored containment pairs form a forest.
///
/// `set_parent` never creates a loop, but pairs added straight through the
/// relation or read from a save can.
pub fn check_forest(manager: &Manager) -> Result<()> {
    let contains = manager.relation(CONTAINS)?;
    let mut acyclic = BTreeSet::new();
    for pair in contains.iter_pairs() {
        if acyclic.contains(&pair.rhs) {
            continue;
        }
        let chain = ancestors(contains, pair.rhs)?;
        acyclic.insert(pair.rhs);
        acyclic.extend(chain);
    }
    Ok(())
}

/// Move `id` into `new_parent`, or out of containment with `None`.
///
/// Taking an entity out of a container drops it at the container's map
/// position. Any move unequips the entity from whoever was wearing it.
///
/// # Errors
///
/// [`SessionError::ContainmentCycle`] if `new_parent` is `id` itself or is
/// somewhere inside `id`. Nothing is changed in that case.
pub fn set_parent(manager: &mut Manager, id: EntityId, new_parent: Option<EntityId>) -> Result<()> {
    let old_parent = parent(manager, id)?;
    if new_parent == old_parent {
        return Ok(());
    }

    if let Some(container) = new_parent {
        if container == id || recursive_contents(manager, id)?.contains(&container) {
            return Err(SessionError::ContainmentCycle { item: id, container });
        }
    }

    if new_parent.is_none() && old_parent.is_some() {
        if let Some(drop_at) = map_position(manager, id)? {
            if let Some(pos) = manager.container_mut::<Position>(POSITION)?.get_mut(id) {
                *pos = drop_at;
            }
        }
    }

    manager.relation_mut(CONTAINS)?.remove_with_rhs(id);
    equipment::unequip_item(manager, id)?;

    if let Some(container) = new_parent {
        manager.relation_mut(CONTAINS)?.add_pair(container, id);
    }
    tracing::debug!(entity = %id, parent = ?new_parent, "containment changed");
    Ok(())
}
