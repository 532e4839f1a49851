//! The in-memory state table shared by every store implementation.

use crate::entity::{EntityReference, EntityState};
use crate::error::{CoreError, CoreResult, VersionConflict};
use crate::store::{BatchReceipt, StateBatch, StoreStats};
use crate::types::{Timestamp, Version};
use std::collections::{HashMap, HashSet};

/// Current states plus counters. Not synchronized; owners wrap it in a lock.
///
/// Removing an entity leaves its last version behind in `retired`. A later
/// insert of the same reference continues from there, so a reference never
/// sees the same version twice.
#[derive(Debug, Default)]
pub(crate) struct StateTable {
    states: HashMap<EntityReference, EntityState>,
    retired: HashMap<EntityReference, Version>,
    batches_applied: u64,
    batches_rejected: u64,
}

impl StateTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, reference: &EntityReference) -> CoreResult<EntityState> {
        self.states
            .get(reference)
            .cloned()
            .ok_or_else(|| CoreError::entity_not_found(reference))
    }

    pub(crate) fn contains(&self, reference: &EntityReference) -> bool {
        self.states.contains_key(reference)
    }

    pub(crate) fn current_version(&self, reference: &EntityReference) -> Option<Version> {
        self.states.get(reference).map(EntityState::version)
    }

    pub(crate) fn references(&self) -> Vec<EntityReference> {
        let mut references: Vec<_> = self.states.keys().cloned().collect();
        references.sort();
        references
    }

    pub(crate) fn stats(&self) -> StoreStats {
        StoreStats {
            entities: self.states.len(),
            batches_applied: self.batches_applied,
            batches_rejected: self.batches_rejected,
        }
    }

    /// Checks every batch rule without mutating anything.
    pub(crate) fn validate(&self, batch: &StateBatch) -> CoreResult<()> {
        let mut seen = HashSet::with_capacity(batch.len());
        for reference in batch.references() {
            if !seen.insert(reference) {
                return Err(CoreError::invalid_operation(format!(
                    "entity {reference} appears more than once in one batch"
                )));
            }
        }

        for state in &batch.new_states {
            if self.contains(state.reference()) {
                return Err(CoreError::duplicate_entity(state.reference()));
            }
        }

        let mut conflicts = Vec::new();
        let expectations = batch
            .updated_states
            .iter()
            .map(|s| (s.reference(), s.version()))
            .chain(batch.removed.iter().map(|r| (&r.reference, r.expected)));
        for (reference, expected) in expectations {
            match self.current_version(reference) {
                None => return Err(CoreError::entity_not_found(reference)),
                Some(actual) if actual != expected => conflicts.push(VersionConflict {
                    reference: reference.clone(),
                    expected,
                    actual: Some(actual),
                }),
                Some(_) => {}
            }
        }
        if !conflicts.is_empty() {
            return Err(CoreError::ConcurrentModification { conflicts });
        }

        Ok(())
    }

    /// Applies a batch that has passed [`validate`](Self::validate).
    pub(crate) fn apply(&mut self, batch: &StateBatch, committed_at: Timestamp) -> BatchReceipt {
        let mut receipt = BatchReceipt {
            committed_at,
            ..BatchReceipt::default()
        };

        for state in &batch.new_states {
            let version = self
                .retired
                .remove(state.reference())
                .map_or(Version::INITIAL, Version::next);
            let stored = state.clone().committed(version, committed_at);
            receipt.versions.insert(state.reference().clone(), version);
            self.states.insert(state.reference().clone(), stored);
        }

        for state in &batch.updated_states {
            let version = self
                .current_version(state.reference())
                .unwrap_or(Version::NONE)
                .next();
            let stored = state.clone().committed(version, committed_at);
            receipt.versions.insert(state.reference().clone(), version);
            self.states.insert(state.reference().clone(), stored);
        }

        for removal in &batch.removed {
            if let Some(state) = self.states.remove(&removal.reference) {
                self.retired.insert(removal.reference.clone(), state.version());
            }
            receipt.removed.push(removal.reference.clone());
        }

        self.batches_applied += 1;
        receipt
    }

    pub(crate) fn record_rejection(&mut self) {
        self.batches_rejected += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RemovedEntity;

    fn new_state(reference: &str) -> EntityState {
        EntityState::new(EntityReference::from(reference), "Cargo")
    }

    fn insert(table: &mut StateTable, reference: &str) -> EntityState {
        let batch = StateBatch {
            new_states: vec![new_state(reference)],
            ..StateBatch::default()
        };
        table.validate(&batch).unwrap();
        table.apply(&batch, Timestamp(10));
        table.get(&EntityReference::from(reference)).unwrap()
    }

    #[test]
    fn insert_assigns_initial_version() {
        let mut table = StateTable::new();
        let stored = insert(&mut table, "cargo:ABC");
        assert_eq!(stored.version(), Version::INITIAL);
        assert_eq!(stored.last_modified(), Timestamp(10));
        assert_eq!(table.stats().entities, 1);
    }

    #[test]
    fn update_increments_current_version() {
        let mut table = StateTable::new();
        let mut stored = insert(&mut table, "cargo:ABC");
        stored.set_property("origin", "HONGKONG").unwrap();

        let batch = StateBatch {
            updated_states: vec![stored],
            ..StateBatch::default()
        };
        table.validate(&batch).unwrap();
        let receipt = table.apply(&batch, Timestamp(20));

        let reference = EntityReference::from("cargo:ABC");
        assert_eq!(receipt.version_of(&reference), Some(Version::new(2)));
        assert_eq!(table.get(&reference).unwrap().last_modified(), Timestamp(20));
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut table = StateTable::new();
        insert(&mut table, "cargo:ABC");
        let batch = StateBatch {
            new_states: vec![new_state("cargo:ABC")],
            ..StateBatch::default()
        };
        assert!(matches!(
            table.validate(&batch),
            Err(CoreError::DuplicateEntity { .. })
        ));
    }

    #[test]
    fn stale_update_is_a_conflict() {
        let mut table = StateTable::new();
        let stale = insert(&mut table, "cargo:ABC");

        let mut fresh = stale.clone();
        fresh.set_property("origin", "A").unwrap();
        let first = StateBatch {
            updated_states: vec![fresh],
            ..StateBatch::default()
        };
        table.validate(&first).unwrap();
        table.apply(&first, Timestamp(30));

        let second = StateBatch {
            updated_states: vec![stale],
            ..StateBatch::default()
        };
        let err = table.validate(&second).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn removing_missing_entity_fails() {
        let table = StateTable::new();
        let batch = StateBatch {
            removed: vec![RemovedEntity {
                reference: EntityReference::from("missing:1"),
                expected: Version::INITIAL,
            }],
            ..StateBatch::default()
        };
        assert!(matches!(
            table.validate(&batch),
            Err(CoreError::EntityNotFound { .. })
        ));
    }

    #[test]
    fn repeated_reference_is_rejected() {
        let table = StateTable::new();
        let batch = StateBatch {
            new_states: vec![new_state("cargo:ABC"), new_state("cargo:ABC")],
            ..StateBatch::default()
        };
        assert!(matches!(
            table.validate(&batch),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    fn remove(table: &mut StateTable, reference: &str, expected: Version) {
        let batch = StateBatch {
            removed: vec![RemovedEntity {
                reference: EntityReference::from(reference),
                expected,
            }],
            ..StateBatch::default()
        };
        table.validate(&batch).unwrap();
        table.apply(&batch, Timestamp(40));
    }

    #[test]
    fn recreated_entity_continues_past_removed_version() {
        let mut table = StateTable::new();
        let stale = insert(&mut table, "cargo:ABC");
        remove(&mut table, "cargo:ABC", Version::INITIAL);
        assert!(!table.contains(&EntityReference::from("cargo:ABC")));

        let recreated = insert(&mut table, "cargo:ABC");
        assert_eq!(recreated.version(), Version::new(2));
        assert!(table.retired.is_empty());

        let batch = StateBatch {
            updated_states: vec![stale],
            ..StateBatch::default()
        };
        assert!(matches!(
            table.validate(&batch),
            Err(CoreError::ConcurrentModification { .. })
        ));
    }

    #[test]
    fn references_are_sorted() {
        let mut table = StateTable::new();
        insert(&mut table, "b");
        insert(&mut table, "a");
        assert_eq!(
            table.references(),
            vec![EntityReference::from("a"), EntityReference::from("b")]
        );
    }
}
