//! Version ledger.

use crate::entity::EntityReference;
use crate::types::Version;
use std::collections::HashMap;

/// Versions observed by one unit of work, keyed by reference.
///
/// The first observation of a reference wins; later reads of the same
/// reference within the unit of work do not move it.
#[derive(Debug, Default, Clone)]
pub struct VersionLedger {
    versions: HashMap<EntityReference, Version>,
}

impl VersionLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `version` for `reference` unless one is already recorded.
    ///
    /// Returns `true` if this was the first observation.
    pub fn record(&mut self, reference: &EntityReference, version: Version) -> bool {
        if self.versions.contains_key(reference) {
            return false;
        }
        self.versions.insert(reference.clone(), version);
        true
    }

    /// The version first observed for `reference`.
    #[must_use]
    pub fn version_of(&self, reference: &EntityReference) -> Option<Version> {
        self.versions.get(reference).copied()
    }

    /// Drops the entries for `references`.
    pub fn forget<'a>(&mut self, references: impl IntoIterator<Item = &'a EntityReference>) {
        for reference in references {
            self.versions.remove(reference);
        }
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.versions.clear();
    }

    /// Number of recorded references.
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Returns `true` if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_wins() {
        let mut ledger = VersionLedger::new();
        let reference = EntityReference::from("cargo:ABC");

        assert!(ledger.record(&reference, Version::new(3)));
        assert!(!ledger.record(&reference, Version::new(4)));
        assert_eq!(ledger.version_of(&reference), Some(Version::new(3)));
    }

    #[test]
    fn forget_removes_only_named_entries() {
        let mut ledger = VersionLedger::new();
        let a = EntityReference::from("a");
        let b = EntityReference::from("b");
        ledger.record(&a, Version::INITIAL);
        ledger.record(&b, Version::INITIAL);

        ledger.forget([&a]);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.version_of(&a).is_none());

        ledger.clear();
        assert!(ledger.is_empty());
    }
}
