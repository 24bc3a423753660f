//! Declarative entity prototypes.
//!
//! A [`ComponentTemplate`] describes one component as an attribute map. An
//! [`Assemblage`] maps each component family to a template, i.e. a whole
//! kind of entity. Prototypes are refined by derivation: a child's
//! attributes override the parent's, and families only the parent names pass
//! through untouched.
//!
//! ```
//! use teratogen_entity::prelude::*;
//!
//! #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Stats { hp: i32, speed: i32 }
//!
//! let creature = Assemblage::new()
//!     .with("stats", DataTemplate::<Stats>::new().with("hp", 10).with("speed", 1));
//! let runner = creature.derive(
//!     &Assemblage::new().with("stats", DataTemplate::<Stats>::new().with("speed", 3)),
//! );
//!
//! let mut manager = Manager::new();
//! manager.register_container::<Stats>("stats");
//! let id = runner.make_entity(&mut manager).unwrap();
//! let stats = manager.container::<Stats>("stats").unwrap().get(id);
//! assert_eq!(stats, Some(&Stats { hp: 10, speed: 3 }));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::entity::EntityId;
use crate::family::ComponentFamily;
use crate::manager::Manager;
use crate::{EntityError, Result};

/// Attribute map of a template, keyed by component field name.
pub type Attributes = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// ComponentTemplate
// ---------------------------------------------------------------------------

/// Something that can build one component for a new entity.
pub trait ComponentTemplate: fmt::Debug + Send + Sync {
    /// The attributes this template materializes from.
    fn attributes(&self) -> &Attributes;

    /// A new template equal to `self` with every attribute of `child`
    /// overriding `self`'s. Neither input is modified.
    fn derive(&self, child: &dyn ComponentTemplate) -> Arc<dyn ComponentTemplate>;

    /// Build the component and add it to `family`'s handler for `id`.
    fn make_component(
        &self,
        manager: &mut Manager,
        family: &ComponentFamily,
        id: EntityId,
    ) -> Result<()>;
}

fn overlay(base: &Attributes, child: &Attributes) -> Attributes {
    let mut merged = base.clone();
    for (key, value) in child {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

// ---------------------------------------------------------------------------
// DataTemplate
// ---------------------------------------------------------------------------

/// Template for a serde component stored in a [`Container<T>`].
///
/// Missing attributes fall back to whatever `T`'s `Deserialize` impl allows
/// (typically `#[serde(default)]`).
///
/// [`Container<T>`]: crate::container::Container
pub struct DataTemplate<T> {
    attributes: Attributes,
    _component: PhantomData<fn() -> T>,
}

impl<T> DataTemplate<T> {
    pub fn new() -> Self {
        Self::from_attributes(Attributes::new())
    }

    pub fn from_attributes(attributes: Attributes) -> Self {
        Self {
            attributes,
            _component: PhantomData,
        }
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

impl<T: Serialize> DataTemplate<T> {
    /// Template whose attributes are the fields of `value`.
    ///
    /// # Errors
    ///
    /// Fails with [`EntityError::ComponentEncode`] unless `value` serializes to
    /// a JSON object.
    pub fn from_component(value: &T) -> Result<Self> {
        match serde_json::to_value(value) {
            Ok(Value::Object(attributes)) => Ok(Self::from_attributes(attributes)),
            Ok(other) => Err(EntityError::ComponentEncode {
                details: format!("template source is not a struct: {other}"),
            }),
            Err(e) => Err(EntityError::ComponentEncode {
                details: e.to_string(),
            }),
        }
    }
}

impl<T> Default for DataTemplate<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for DataTemplate<T> {
    fn clone(&self) -> Self {
        Self::from_attributes(self.attributes.clone())
    }
}

impl<T> fmt::Debug for DataTemplate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataTemplate")
            .field("component", &std::any::type_name::<T>())
            .field("attributes", &self.attributes)
            .finish()
    }
}

impl<T> ComponentTemplate for DataTemplate<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn derive(&self, child: &dyn ComponentTemplate) -> Arc<dyn ComponentTemplate> {
        Arc::new(Self::from_attributes(overlay(
            &self.attributes,
            child.attributes(),
        )))
    }

    fn make_component(
        &self,
        manager: &mut Manager,
        family: &ComponentFamily,
        id: EntityId,
    ) -> Result<()> {
        let component: T = serde_json::from_value(Value::Object(self.attributes.clone()))
            .map_err(|e| EntityError::TemplateMaterialize {
                family: family.clone(),
                details: e.to_string(),
            })?;
        manager.container_mut::<T>(family.as_str())?.add(id, component);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MarkerTemplate
// ---------------------------------------------------------------------------

/// A template that carries attributes but builds nothing.
///
/// Used for prototype metadata (spawn rarity, minimum depth) that the entity
/// generator reads from the assemblage itself.
#[derive(Debug, Clone, Default)]
pub struct MarkerTemplate {
    attributes: Attributes,
}

impl MarkerTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

impl ComponentTemplate for MarkerTemplate {
    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn derive(&self, child: &dyn ComponentTemplate) -> Arc<dyn ComponentTemplate> {
        Arc::new(MarkerTemplate {
            attributes: overlay(&self.attributes, child.attributes()),
        })
    }

    fn make_component(&self, _: &mut Manager, _: &ComponentFamily, _: EntityId) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Assemblage
// ---------------------------------------------------------------------------

/// A complete entity prototype: one template per component family.
#[derive(Debug, Clone, Default)]
pub struct Assemblage {
    templates: BTreeMap<ComponentFamily, Arc<dyn ComponentTemplate>>,
}

impl Assemblage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Assemblage::insert`].
    pub fn with(
        mut self,
        family: impl Into<ComponentFamily>,
        template: impl ComponentTemplate + 'static,
    ) -> Self {
        self.insert(family, Arc::new(template));
        self
    }

    /// Set the template of `family`, returning the one it replaces.
    pub fn insert(
        &mut self,
        family: impl Into<ComponentFamily>,
        template: Arc<dyn ComponentTemplate>,
    ) -> Option<Arc<dyn ComponentTemplate>> {
        self.templates.insert(family.into(), template)
    }

    pub fn get(&self, family: &str) -> Option<&Arc<dyn ComponentTemplate>> {
        self.templates.get(family)
    }

    pub fn families(&self) -> impl Iterator<Item = &ComponentFamily> {
        self.templates.keys()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Union of `self` and `child`. Families present in both combine as
    /// `parent.derive(child)`.
    pub fn derive(&self, child: &Assemblage) -> Assemblage {
        let mut templates = self.templates.clone();
        for (family, template) in &child.templates {
            let merged = match templates.get(family) {
                Some(parent) => parent.derive(template.as_ref()),
                None => Arc::clone(template),
            };
            templates.insert(family.clone(), merged);
        }
        Assemblage { templates }
    }

    /// Allocate an entity and materialize every template onto it.
    ///
    /// Templates run in ascending family order and must not depend on one
    /// another. If any fails, the half-built entity is removed again.
    pub fn make_entity(&self, manager: &mut Manager) -> Result<EntityId> {
        let id = manager.new_entity();
        for (family, template) in &self.templates {
            if let Err(e) = template.make_component(manager, family, id) {
                tracing::warn!(
                    entity = %id,
                    family = %family,
                    error = %e,
                    "assemblage failed to materialize -- discarding entity"
                );
                manager.remove_entity(id);
                return Err(e);
            }
        }
        Ok(id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Stats {
        hp: i32,
        speed: i32,
        tag: String,
    }

    impl Default for Stats {
        fn default() -> Self {
            Self {
                hp: 1,
                speed: 1,
                tag: String::new(),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Pos {
        x: i32,
        y: i32,
    }

    fn manager() -> Manager {
        let mut m = Manager::new();
        m.register_container::<Stats>("stats");
        m.register_container::<Pos>("pos");
        m
    }

    #[test]
    fn derive_overlays_without_mutating_inputs() {
        let parent = DataTemplate::<Stats>::new().with("hp", 10).with("speed", 2);
        let child = DataTemplate::<Stats>::new().with("speed", 5).with("tag", "fast");
        let derived = parent.derive(&child);

        assert_eq!(derived.attributes()["hp"], 10);
        assert_eq!(derived.attributes()["speed"], 5);
        assert_eq!(derived.attributes()["tag"], "fast");
        assert_eq!(parent.attributes()["speed"], 2);
        assert!(!parent.attributes().contains_key("tag"));
        assert_eq!(child.attributes().len(), 2);
    }

    #[test]
    fn missing_attributes_use_serde_defaults() {
        let mut m = manager();
        let id = m.new_entity();
        DataTemplate::<Stats>::new()
            .with("hp", 7)
            .make_component(&mut m, &"stats".into(), id)
            .unwrap();
        let stats = m.container::<Stats>("stats").unwrap().get(id).unwrap();
        assert_eq!(stats.hp, 7);
        assert_eq!(stats.speed, 1);
    }

    #[test]
    fn from_component_copies_fields() {
        let t = DataTemplate::from_component(&Pos { x: 3, y: -1 }).unwrap();
        assert_eq!(t.attributes()["x"], 3);
        assert_eq!(t.attributes()["y"], -1);
        assert!(DataTemplate::<i32>::from_component(&5).is_err());
    }

    #[test]
    fn marker_builds_nothing() {
        let mut m = manager();
        let a = Assemblage::new().with("spawn", MarkerTemplate::new().with("rarity", 100));
        let id = a.make_entity(&mut m).unwrap();
        assert!(m.has_entity(id));
        assert!(m.handler("spawn").is_none());
        let marker = a.get("spawn").unwrap();
        assert_eq!(marker.attributes()["rarity"], 100);
    }

    #[test]
    fn assemblage_derive_keeps_unmentioned_families() {
        let base = Assemblage::new()
            .with("stats", DataTemplate::<Stats>::new().with("hp", 10))
            .with("pos", DataTemplate::<Pos>::new().with("x", 1).with("y", 2));
        let child = Assemblage::new().with("stats", DataTemplate::<Stats>::new().with("speed", 4));
        let derived = base.derive(&child);
        assert_eq!(derived.len(), 2);

        let mut m = manager();
        let id = derived.make_entity(&mut m).unwrap();
        assert_eq!(
            m.container::<Stats>("stats").unwrap().get(id),
            Some(&Stats {
                hp: 10,
                speed: 4,
                tag: String::new()
            })
        );
        assert_eq!(m.container::<Pos>("pos").unwrap().get(id), Some(&Pos { x: 1, y: 2 }));

        // The parent is unchanged.
        let id2 = base.make_entity(&mut m).unwrap();
        assert_eq!(m.container::<Stats>("stats").unwrap().get(id2).unwrap().speed, 1);
    }

    #[test]
    fn failed_template_discards_entity() {
        let mut m = manager();
        // `Pos` has no defaults, so a missing `y` cannot materialize.
        let broken = Assemblage::new()
            .with("stats", DataTemplate::<Stats>::new())
            .with("pos", DataTemplate::<Pos>::new().with("x", 1));
        let err = broken.make_entity(&mut m).unwrap_err();
        assert!(matches!(err, EntityError::TemplateMaterialize { .. }));
        assert_eq!(m.entity_count(), 0);
        assert!(m.container::<Stats>("stats").unwrap().is_empty());
    }

    #[test]
    fn unregistered_family_fails() {
        let mut m = Manager::new();
        let err = Assemblage::new()
            .with("stats", DataTemplate::<Stats>::new())
            .make_entity(&mut m)
            .unwrap_err();
        assert!(matches!(err, EntityError::UnregisteredFamily { .. }));
    }
}
