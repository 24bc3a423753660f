//! Component family names.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The name of a category of per-entity data, e.g. `"position"` or
/// `"contains"`. Each family has exactly one handler in a manager.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentFamily(String);

impl ComponentFamily {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ComponentFamily {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl From<String> for ComponentFamily {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&ComponentFamily> for ComponentFamily {
    fn from(family: &ComponentFamily) -> Self {
        family.clone()
    }
}

// Lets registries keyed by family be queried with plain `&str`.
impl Borrow<str> for ComponentFamily {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ComponentFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentFamily({:?})", self.0)
    }
}

impl fmt::Display for ComponentFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn lookup_by_str() {
        let mut map = BTreeMap::new();
        map.insert(ComponentFamily::from("position"), 1);
        assert_eq!(map.get("position"), Some(&1));
        assert_eq!(map.get("creature"), None);
    }

    #[test]
    fn ordering_follows_name() {
        let a = ComponentFamily::new("contains");
        let b = ComponentFamily::new("position");
        assert!(a < b);
        assert_eq!(b.to_string(), "position");
    }
}
