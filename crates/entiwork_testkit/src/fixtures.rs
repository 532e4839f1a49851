//! Test fixtures and store helpers.
//!
//! Provides convenience functions for setting up test stores
//! and common test entities.

use entiwork_core::{
    Config, DescriptorRegistry, EntityDescriptor, EntityReference, EntityStore, UnitOfWork, Value,
};
use entiwork_storage::{FileBackend, InMemoryBackend};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

enum Medium {
    Memory,
    Journal(InMemoryBackend),
    File { path: PathBuf, _temp_dir: TempDir },
}

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: EntityStore,
    medium: Medium,
}

impl TestStore {
    /// Creates a store backed by an in-memory state map.
    pub fn memory() -> Self {
        Self {
            store: EntityStore::in_memory().with_descriptors(Arc::new(sample_registry())),
            medium: Medium::Memory,
        }
    }

    /// Creates a journalled store over an in-memory backend.
    pub fn journaled() -> Self {
        let backend = InMemoryBackend::new();
        Self {
            store: open_journal(Box::new(backend.clone())),
            medium: Medium::Journal(backend),
        }
    }

    /// Creates a journalled store in a temporary file.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("journal.ewj");
        let backend =
            FileBackend::open_with_create_dirs(&path).expect("Failed to create journal file");

        Self {
            store: open_journal(Box::new(backend)),
            medium: Medium::File {
                path,
                _temp_dir: temp_dir,
            },
        }
    }

    /// Closes the store and opens it again from its journal.
    ///
    /// A memory store has no journal and comes back empty.
    pub fn reopen(self) -> Self {
        let Self { store, medium } = self;
        drop(store);
        let store = match &medium {
            Medium::Memory => {
                EntityStore::in_memory().with_descriptors(Arc::new(sample_registry()))
            }
            Medium::Journal(backend) => open_journal(Box::new(backend.clone())),
            Medium::File { path, .. } => open_journal(Box::new(
                FileBackend::open(path).expect("Failed to reopen journal file"),
            )),
        };
        Self { store, medium }
    }

    /// Returns the journal path if file-based.
    pub fn path(&self) -> Option<&Path> {
        match &self.medium {
            Medium::File { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Returns the raw journal bytes, if the store has a journal.
    pub fn journal_bytes(&self) -> Option<Vec<u8>> {
        match &self.medium {
            Medium::Memory => None,
            Medium::Journal(backend) => Some(backend.snapshot()),
            Medium::File { path, .. } => {
                Some(std::fs::read(path).expect("Failed to read journal file"))
            }
        }
    }
}

impl std::ops::Deref for TestStore {
    type Target = EntityStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

fn open_journal(backend: Box<dyn entiwork_storage::StorageBackend>) -> EntityStore {
    EntityStore::open_journaled(backend, Config::default())
        .expect("Failed to open journalled store")
        .with_descriptors(Arc::new(sample_registry()))
}

/// Runs a test with a temporary in-memory store.
///
/// # Example
///
/// ```rust
/// use entiwork_testkit::with_temp_store;
///
/// with_temp_store(|store| {
///     assert_eq!(store.state_store().stats().entities, 0);
/// });
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&EntityStore) -> R,
{
    let store = TestStore::memory();
    f(&store)
}

/// Runs a test with a temporary file-backed store.
pub fn with_temp_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&EntityStore) -> R,
{
    let store = TestStore::file();
    f(&store)
}

/// Descriptor for the cargo entity used throughout the tests.
pub fn cargo_descriptor() -> EntityDescriptor {
    EntityDescriptor::new("Cargo")
        .property("origin", Value::Null)
        .property("destination", Value::Null)
        .association("itinerary")
        .many_association("handling_events")
}

/// Descriptor for a single-property counter entity.
pub fn counter_descriptor() -> EntityDescriptor {
    EntityDescriptor::new("Counter").property("count", 0)
}

/// Registry holding [`cargo_descriptor`] and [`counter_descriptor`].
pub fn sample_registry() -> DescriptorRegistry {
    DescriptorRegistry::new()
        .with(cargo_descriptor())
        .with(counter_descriptor())
}

/// Commits a fresh counter at zero and returns its reference.
pub fn seed_counter(store: &EntityStore, name: &str) -> EntityReference {
    let reference = EntityReference::from(name);
    let mut uow = store.open_unit_of_work("seed counter");
    uow.new_entity_state(reference.clone(), &counter_descriptor())
        .expect("Failed to create counter");
    uow.complete().expect("Failed to commit counter");
    reference
}

/// Reads a counter's committed value.
pub fn read_counter(store: &EntityStore, reference: &EntityReference) -> i64 {
    store
        .current_state(reference)
        .expect("Counter not found")
        .property("count")
        .and_then(Value::as_integer)
        .expect("Counter has no integer count")
}
