//! Binary relations between entities.
//!
//! A [`Relation`] is a set of ordered `(lhs, rhs)` pairs with a
//! [`Cardinality`] constraint. It keeps two indices that are exact transposes
//! of each other:
//!
//! - Forward: lhs -> set of rhs
//! - Reverse: rhs -> set of lhs
//!
//! A key with no partners is absent from its index. Constraints are enforced
//! by replacement: adding a pair first removes the existing pairs it would
//! conflict with.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::{Read, Write};

use crate::codec;
use crate::entity::EntityId;
use crate::handler::{ComponentHandler, EntityComponents, EntityIds, Handler};
use crate::{EntityError, Result};

// ---------------------------------------------------------------------------
// Cardinality
// ---------------------------------------------------------------------------

/// How many partners an entity may have on each side of a relation.
///
/// The discriminants are the snapshot tags. Bit 0 clear means each lhs
/// appears in at most one pair; bit 1 clear means each rhs appears in at most
/// one pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Cardinality {
    /// Each lhs has at most one rhs and each rhs at most one lhs.
    OneToOne = 0,
    /// Each rhs has at most one lhs (a container holds many items, an item
    /// is in one container).
    OneToMany = 1,
    /// Each lhs has at most one rhs.
    ManyToOne = 2,
    /// Unconstrained.
    ManyToMany = 3,
}

impl Cardinality {
    /// The snapshot tag.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Parse a snapshot tag.
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Cardinality::OneToOne),
            1 => Ok(Cardinality::OneToMany),
            2 => Ok(Cardinality::ManyToOne),
            3 => Ok(Cardinality::ManyToMany),
            other => Err(EntityError::InvalidCardinality(other)),
        }
    }

    /// Whether an lhs may appear in at most one pair.
    pub fn lhs_unique(self) -> bool {
        self.tag() & 1 == 0
    }

    /// Whether an rhs may appear in at most one pair.
    pub fn rhs_unique(self) -> bool {
        self.tag() & 2 == 0
    }
}

// ---------------------------------------------------------------------------
// Pair
// ---------------------------------------------------------------------------

/// One `(lhs, rhs)` element of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pair {
    pub lhs: EntityId,
    pub rhs: EntityId,
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.lhs, self.rhs)
    }
}

/// Owning snapshot iterator over relation pairs, ordered by `(lhs, rhs)`.
#[derive(Debug, Clone, Default)]
pub struct Pairs {
    pairs: std::vec::IntoIter<Pair>,
}

impl Iterator for Pairs {
    type Item = Pair;

    fn next(&mut self) -> Option<Pair> {
        self.pairs.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.pairs.size_hint()
    }
}

impl ExactSizeIterator for Pairs {}

// ---------------------------------------------------------------------------
// Relation
// ---------------------------------------------------------------------------

type Index = BTreeMap<EntityId, BTreeSet<EntityId>>;

/// A cardinality-constrained binary relation between entity ids.
#[derive(Debug, Clone)]
pub struct Relation {
    cardinality: Cardinality,
    /// lhs -> set of rhs.
    forward: Index,
    /// rhs -> set of lhs.
    reverse: Index,
}

impl Relation {
    /// Create an empty relation with the given constraint.
    pub fn new(cardinality: Cardinality) -> Self {
        Self {
            cardinality,
            forward: Index::new(),
            reverse: Index::new(),
        }
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Remove every pair. The constraint is kept.
    pub fn clear(&mut self) {
        self.forward.clear();
        self.reverse.clear();
    }

    /// Add `(lhs, rhs)`.
    ///
    /// If lhs values are constrained to one pair, every existing pair with
    /// this lhs is removed first; likewise for rhs. Adding a pair that is
    /// already present leaves the relation unchanged.
    pub fn add_pair(&mut self, lhs: EntityId, rhs: EntityId) {
        if self.has_pair(lhs, rhs) {
            return;
        }
        if self.cardinality.lhs_unique() {
            self.remove_with_lhs(lhs);
        }
        if self.cardinality.rhs_unique() {
            self.remove_with_rhs(rhs);
        }
        self.forward.entry(lhs).or_default().insert(rhs);
        self.reverse.entry(rhs).or_default().insert(lhs);
    }

    /// Remove `(lhs, rhs)`. Returns whether it was present.
    pub fn remove_pair(&mut self, lhs: EntityId, rhs: EntityId) -> bool {
        let removed = unlink(&mut self.forward, lhs, rhs);
        let removed_rev = unlink(&mut self.reverse, rhs, lhs);
        if removed != removed_rev {
            tracing::error!(%lhs, %rhs, "relation indices disagreed during removal");
        }
        removed
    }

    /// Remove every pair `(lhs, *)`.
    pub fn remove_with_lhs(&mut self, lhs: EntityId) {
        // Partners are captured before any removal touches the index.
        for rhs in self.iter_rhs(lhs) {
            self.remove_pair(lhs, rhs);
        }
    }

    /// Remove every pair `(*, rhs)`.
    pub fn remove_with_rhs(&mut self, rhs: EntityId) {
        for lhs in self.iter_lhs(rhs) {
            self.remove_pair(lhs, rhs);
        }
    }

    /// Remove every pair with `entity` on either side.
    pub fn remove_all_with(&mut self, entity: EntityId) {
        self.remove_with_lhs(entity);
        self.remove_with_rhs(entity);
    }

    pub fn has_pair(&self, lhs: EntityId, rhs: EntityId) -> bool {
        self.forward.get(&lhs).is_some_and(|set| set.contains(&rhs))
    }

    /// Some lhs partner of `rhs`.
    ///
    /// It is *the* partner only when rhs values are constrained
    /// ([`Cardinality::rhs_unique`]); otherwise it is the lowest id.
    pub fn get_lhs(&self, rhs: EntityId) -> Option<EntityId> {
        self.reverse.get(&rhs).and_then(|set| set.first().copied())
    }

    /// Some rhs partner of `lhs`. See [`Relation::get_lhs`].
    pub fn get_rhs(&self, lhs: EntityId) -> Option<EntityId> {
        self.forward.get(&lhs).and_then(|set| set.first().copied())
    }

    /// Snapshot of the lhs partners of `rhs`.
    pub fn iter_lhs(&self, rhs: EntityId) -> EntityIds {
        partners(&self.reverse, rhs)
    }

    /// Snapshot of the rhs partners of `lhs`.
    pub fn iter_rhs(&self, lhs: EntityId) -> EntityIds {
        partners(&self.forward, lhs)
    }

    /// Snapshot of every pair.
    pub fn iter_pairs(&self) -> Pairs {
        let pairs: Vec<Pair> = self
            .forward
            .iter()
            .flat_map(|(&lhs, rhss)| rhss.iter().map(move |&rhs| Pair { lhs, rhs }))
            .collect();
        Pairs {
            pairs: pairs.into_iter(),
        }
    }

    pub fn count_lhs(&self, rhs: EntityId) -> usize {
        self.reverse.get(&rhs).map_or(0, BTreeSet::len)
    }

    pub fn count_rhs(&self, lhs: EntityId) -> usize {
        self.forward.get(&lhs).map_or(0, BTreeSet::len)
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.forward.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Verify that the two indices are exact transposes and hold no empty
    /// sets.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError::RelationAsymmetry`] naming the first offending
    /// pair.
    pub fn check_symmetry(&self) -> Result<()> {
        check_transpose(&self.forward, &self.reverse, false)?;
        check_transpose(&self.reverse, &self.forward, true)
    }
}

fn partners(index: &Index, key: EntityId) -> EntityIds {
    EntityIds::new(
        index
            .get(&key)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default(),
    )
}

/// Remove `value` from `index[key]`, dropping the key when its set empties.
fn unlink(index: &mut Index, key: EntityId, value: EntityId) -> bool {
    let Some(set) = index.get_mut(&key) else {
        return false;
    };
    let removed = set.remove(&value);
    if set.is_empty() {
        index.remove(&key);
    }
    removed
}

fn check_transpose(index: &Index, other: &Index, swapped: bool) -> Result<()> {
    for (&key, values) in index {
        let asymmetry = |value: EntityId| {
            let (lhs, rhs) = if swapped { (value, key) } else { (key, value) };
            EntityError::RelationAsymmetry { lhs, rhs }
        };
        if values.is_empty() {
            return Err(asymmetry(EntityId::NIL));
        }
        for &value in values {
            if !other.get(&value).is_some_and(|set| set.contains(&key)) {
                return Err(asymmetry(value));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Handler impls
// ---------------------------------------------------------------------------

impl Handler for Relation {
    /// Entity destruction drops every pair the entity takes part in.
    fn remove(&mut self, id: EntityId) {
        self.remove_all_with(id);
    }

    fn has_component(&self, id: EntityId) -> bool {
        self.forward.contains_key(&id) || self.reverse.contains_key(&id)
    }

    /// Every id on either side of some pair.
    fn entity_ids(&self) -> EntityIds {
        let ids: BTreeSet<EntityId> = self
            .forward
            .keys()
            .chain(self.reverse.keys())
            .copied()
            .collect();
        EntityIds::new(ids.into_iter().collect())
    }

    fn len(&self) -> usize {
        Relation::len(self)
    }

    fn clear(&mut self) {
        Relation::clear(self);
    }

    fn serialize(&self, out: &mut dyn Write) -> Result<()> {
        codec::write_u8(out, self.cardinality.tag(), "relation cardinality")?;
        let pairs = self.iter_pairs();
        codec::write_count(out, pairs.len(), "relation pair count")?;
        for pair in pairs {
            codec::write_entity(out, pair.lhs, "relation lhs")?;
            codec::write_entity(out, pair.rhs, "relation rhs")?;
        }
        Ok(())
    }

    /// Reset to the stored constraint and replay every stored pair through
    /// [`Relation::add_pair`], so constraints are enforced again on load.
    fn deserialize(&mut self, input: &mut dyn Read) -> Result<()> {
        let cardinality = Cardinality::from_tag(codec::read_u8(input, "relation cardinality")?)?;
        if cardinality != self.cardinality {
            tracing::warn!(
                registered = ?self.cardinality,
                stored = ?cardinality,
                "relation cardinality in snapshot differs from registration -- using snapshot"
            );
        }

        let count = codec::read_u32(input, "relation pair count")?;
        let mut fresh = Relation::new(cardinality);
        for _ in 0..count {
            let lhs = codec::read_entity(input, "relation lhs")?;
            let rhs = codec::read_entity(input, "relation rhs")?;
            fresh.add_pair(lhs, rhs);
        }

        *self = fresh;
        Ok(())
    }

    fn check_invariants(&self) -> Result<()> {
        self.check_symmetry()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Viewed as a component store, the component of an lhs is its rhs partner.
impl ComponentHandler for Relation {
    type Component = EntityId;

    fn add(&mut self, lhs: EntityId, rhs: EntityId) {
        self.add_pair(lhs, rhs);
    }

    fn get(&self, lhs: EntityId) -> Option<&EntityId> {
        self.forward.get(&lhs).and_then(|set| set.first())
    }

    fn entity_components(&self) -> EntityComponents<'_, EntityId> {
        EntityComponents::new(
            self.forward
                .iter()
                .flat_map(|(&lhs, rhss)| rhss.iter().map(move |rhs| (lhs, rhs)))
                .collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
