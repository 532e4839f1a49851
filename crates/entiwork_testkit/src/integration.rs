//! Cross-crate integration test helpers.
//!
//! [`IntegrationHarness`] drives a store with generated operations, keeps a
//! plain model of what should be committed, and checks the two agree.

use crate::fixtures::TestStore;
use crate::generators::Operation;
use entiwork_core::{
    CoreError, CoreResult, EntityDescriptor, EntityReference, StateStore, UnitOfWork, Value,
    Version,
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
struct ModelEntry {
    version: Version,
    properties: BTreeMap<String, Value>,
}

/// A test harness for integration testing.
pub struct IntegrationHarness {
    /// The store under test.
    pub store: TestStore,
    model: BTreeMap<EntityReference, ModelEntry>,
    retired: BTreeMap<EntityReference, Version>,
    descriptor: EntityDescriptor,
}

impl IntegrationHarness {
    /// Creates a harness over `store`, which must start empty.
    pub fn new(store: TestStore) -> Self {
        Self {
            store,
            model: BTreeMap::new(),
            retired: BTreeMap::new(),
            descriptor: EntityDescriptor::new("Generated"),
        }
    }

    /// Runs one operation in its own unit of work and updates the model.
    ///
    /// Operations the model says must fail are checked to fail with the
    /// matching error and leave the store unchanged.
    pub fn apply(&mut self, operation: &Operation) {
        let exists = self.model.contains_key(operation.reference());
        let result = self.run(operation);

        match (operation, exists) {
            (Operation::Create(reference, properties), false) => {
                result.expect("Create of a fresh reference failed");
                let version = self
                    .retired
                    .remove(reference)
                    .map_or(Version::INITIAL, Version::next);
                self.model.insert(
                    reference.clone(),
                    ModelEntry {
                        version,
                        properties: properties.clone(),
                    },
                );
            }
            (Operation::Create(..), true) => {
                assert!(
                    matches!(result, Err(CoreError::DuplicateEntity { .. })),
                    "expected duplicate entity, got {result:?}"
                );
            }
            (Operation::Update(reference, name, value), true) => {
                result.expect("Update of an existing reference failed");
                if let Some(entry) = self.model.get_mut(reference) {
                    entry.version = entry.version.next();
                    entry.properties.insert(name.clone(), value.clone());
                }
            }
            (Operation::Remove(reference), true) => {
                result.expect("Remove of an existing reference failed");
                if let Some(entry) = self.model.remove(reference) {
                    self.retired.insert(reference.clone(), entry.version);
                }
            }
            (Operation::Update(..) | Operation::Remove(..), false) => {
                assert!(
                    matches!(result, Err(CoreError::EntityNotFound { .. })),
                    "expected entity not found, got {result:?}"
                );
            }
        }
    }

    fn run(&self, operation: &Operation) -> CoreResult<()> {
        let mut uow = self.store.open_unit_of_work("generated operation");
        match operation {
            Operation::Create(reference, properties) => {
                let state = uow.new_entity_state(reference.clone(), &self.descriptor)?;
                for (name, value) in properties {
                    state.set_property(name.clone(), value.clone())?;
                }
            }
            Operation::Update(reference, name, value) => {
                uow.get_entity_state(reference)?
                    .set_property(name.clone(), value.clone())?;
            }
            Operation::Remove(reference) => {
                uow.get_entity_state(reference)?.remove();
            }
        }
        uow.complete().map(|_| ())
    }

    /// Checks every modelled entity against the store, and that the store
    /// holds nothing else.
    pub fn verify(&self) {
        let states = self.store.state_store();
        let references = states.references().expect("Failed to list references");
        let expected: Vec<_> = self.model.keys().cloned().collect();
        assert_eq!(references, expected, "Store and model hold different entities");

        for (reference, entry) in &self.model {
            let state = states.get(reference).expect("Modelled entity missing");
            assert_eq!(state.version(), entry.version, "Version mismatch for {reference}");
            assert_eq!(
                state.properties(),
                &entry.properties,
                "Property mismatch for {reference}"
            );
        }
    }

    /// Reopens the underlying store from its journal and verifies it.
    pub fn reopen_and_verify(self) -> Self {
        let Self {
            store,
            model,
            retired,
            descriptor,
        } = self;
        let harness = Self {
            store: store.reopen(),
            model,
            retired,
            descriptor,
        };
        harness.verify();
        harness
    }

    /// Number of entities the model expects.
    pub fn len(&self) -> usize {
        self.model.len()
    }

    /// Returns `true` if the model expects no entities.
    pub fn is_empty(&self) -> bool {
        self.model.is_empty()
    }
}
