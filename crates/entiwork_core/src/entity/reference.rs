//! Entity reference.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use uuid::Uuid;

/// Globally unique, immutable name of one entity instance.
///
/// References are opaque strings; the engine only hashes, orders and
/// compares them.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityReference(String);

impl EntityReference {
    /// Creates a reference from any string.
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Creates a fresh reference from a random UUID.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EntityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityReference({})", self.0)
    }
}

impl fmt::Display for EntityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityReference {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EntityReference {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<Uuid> for EntityReference {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }
}

impl AsRef<str> for EntityReference {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for EntityReference {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn random_is_unique() {
        assert_ne!(EntityReference::random(), EntityReference::random());
    }

    #[test]
    fn display_is_the_raw_string() {
        let reference = EntityReference::from("cargo:ABC");
        assert_eq!(reference.to_string(), "cargo:ABC");
        assert_eq!(format!("{reference:?}"), "EntityReference(cargo:ABC)");
    }

    #[test]
    fn map_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(EntityReference::from("cargo:ABC"), 1);
        assert_eq!(map.get("cargo:ABC"), Some(&1));
    }

    #[test]
    fn ordering_follows_strings() {
        assert!(EntityReference::from("a") < EntityReference::from("b"));
    }
}
