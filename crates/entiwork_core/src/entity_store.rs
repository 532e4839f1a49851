//! The entity store facade.

use crate::config::Config;
use crate::entity::{DescriptorLookup, EntityDescriptor, EntityReference, EntityState};
use crate::error::{CoreError, CoreResult};
use crate::guard::ConcurrencyGuard;
use crate::retry::{with_retry_policy, RetryPolicy};
use crate::store::{InMemoryStateStore, JournaledStateStore, StateStore};
use crate::types::UnitOfWorkId;
use crate::uow::{StoreUnitOfWork, UnitOfWork};
use entiwork_storage::{FileBackend, StorageBackend};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// The unit of work handed out by [`EntityStore::open_unit_of_work`].
pub type GuardedUnitOfWork = ConcurrencyGuard<StoreUnitOfWork>;

/// Entry point tying a [`StateStore`] to its configuration.
///
/// Units of work are opened explicitly and passed to whoever needs them;
/// there is no ambient "current" unit of work.
///
/// # Example
///
/// ```rust
/// use entiwork_core::{EntityDescriptor, EntityReference, EntityStore, UnitOfWork};
///
/// let store = EntityStore::in_memory();
/// let reference = EntityReference::from("counter");
/// let mut uow = store.open_unit_of_work("create counter");
/// uow.new_entity_state(reference.clone(), &EntityDescriptor::new("Counter").property("count", 0))?;
/// uow.complete()?;
///
/// store.with_retry("increment", |uow| {
///     let state = uow.get_entity_state(&reference)?;
///     let count = state.property("count").and_then(|v| v.as_integer()).unwrap_or(0);
///     state.set_property("count", count + 1)
/// })?;
/// # Ok::<(), entiwork_core::CoreError>(())
/// ```
pub struct EntityStore {
    states: Arc<dyn StateStore>,
    config: Config,
    next_uow: AtomicU64,
    descriptors: Option<Arc<dyn DescriptorLookup>>,
}

impl EntityStore {
    /// Creates a store over an existing state store.
    pub fn new(states: Arc<dyn StateStore>, config: Config) -> Self {
        Self {
            states,
            config,
            next_uow: AtomicU64::new(1),
            descriptors: None,
        }
    }

    /// Creates a store backed by an empty [`InMemoryStateStore`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStateStore::new()), Config::default())
    }

    /// Opens a journalled store over `backend`, replaying its contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal is corrupt or the backend fails.
    pub fn open_journaled(backend: Box<dyn StorageBackend>, config: Config) -> CoreResult<Self> {
        let states = JournaledStateStore::open(backend, config.sync_on_commit)?;
        Ok(Self::new(Arc::new(states), config))
    }

    /// Opens a journalled store in the file at `path`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the journal is
    /// corrupt.
    pub fn open_file(path: &Path, config: Config) -> CoreResult<Self> {
        let backend = FileBackend::open_with_create_dirs(path)?;
        info!(path = %path.display(), "opening journal file");
        Self::open_journaled(Box::new(backend), config)
    }

    /// Attaches a descriptor lookup used by [`descriptor`](Self::descriptor).
    #[must_use]
    pub fn with_descriptors(mut self, descriptors: Arc<dyn DescriptorLookup>) -> Self {
        self.descriptors = Some(descriptors);
        self
    }

    /// Looks up the descriptor for `entity_type`.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownEntityType`] if no lookup is attached or it has no
    /// descriptor for the type.
    pub fn descriptor(&self, entity_type: &str) -> CoreResult<Arc<EntityDescriptor>> {
        self.descriptors
            .as_ref()
            .and_then(|lookup| lookup.descriptor(entity_type))
            .ok_or_else(|| CoreError::UnknownEntityType {
                entity_type: entity_type.to_string(),
            })
    }

    /// Opens a unit of work guarded by optimistic version checks.
    pub fn open_unit_of_work(&self, usecase: impl Into<String>) -> GuardedUnitOfWork {
        ConcurrencyGuard::new(self.open_unguarded(usecase), Arc::clone(&self.states))
    }

    /// Opens a unit of work without the concurrency guard.
    ///
    /// Reads are not version-checked. Updates and removals are still refused
    /// by the store if their entity moved on.
    pub fn open_unguarded(&self, usecase: impl Into<String>) -> StoreUnitOfWork {
        let id = UnitOfWorkId::new(self.next_uow.fetch_add(1, Ordering::SeqCst));
        StoreUnitOfWork::new(id, usecase, Arc::clone(&self.states))
    }

    /// Runs `operation` under [`with_retry`](crate::with_retry) with the
    /// configured attempts and backoff.
    ///
    /// # Errors
    ///
    /// See [`with_retry`](crate::with_retry).
    pub fn with_retry<T, F>(&self, usecase: &str, operation: F) -> CoreResult<T>
    where
        F: FnMut(&mut dyn UnitOfWork) -> CoreResult<T>,
    {
        with_retry_policy(self, RetryPolicy::from_config(&self.config), usecase, operation)
    }

    /// Reads the current state of `reference` outside any unit of work.
    ///
    /// # Errors
    ///
    /// [`CoreError::EntityNotFound`] if there is none.
    pub fn current_state(&self, reference: &EntityReference) -> CoreResult<EntityState> {
        self.states.get(reference)
    }

    /// The underlying state store.
    #[must_use]
    pub fn state_store(&self) -> &Arc<dyn StateStore> {
        &self.states
    }

    /// The store configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("stats", &self.states.stats())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::DescriptorRegistry;
    use crate::uow::UnitOfWorkStatus;
    use entiwork_storage::InMemoryBackend;

    #[test]
    fn unit_of_work_ids_are_unique() {
        let store = EntityStore::in_memory();
        let a = store.open_unit_of_work("a");
        let b = store.open_unguarded("b");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.usecase(), "a");
        assert_eq!(a.status(), UnitOfWorkStatus::Open);
    }

    #[test]
    fn descriptors_resolve_through_lookup() {
        let registry =
            DescriptorRegistry::new().with(EntityDescriptor::new("Cargo").property("origin", "?"));
        let store = EntityStore::in_memory().with_descriptors(Arc::new(registry));

        assert_eq!(store.descriptor("Cargo").unwrap().entity_type(), "Cargo");
        assert!(matches!(
            store.descriptor("Voyage"),
            Err(CoreError::UnknownEntityType { .. })
        ));
    }

    #[test]
    fn journaled_store_survives_reopen() {
        let backend = InMemoryBackend::new();
        let reference = EntityReference::from("cargo:ABC");
        {
            let store =
                EntityStore::open_journaled(Box::new(backend.clone()), Config::default()).unwrap();
            let mut uow = store.open_unit_of_work("book");
            uow.new_entity_state(reference.clone(), &EntityDescriptor::new("Cargo"))
                .unwrap();
            uow.complete().unwrap();
        }

        let store = EntityStore::open_journaled(Box::new(backend), Config::default()).unwrap();
        assert_eq!(store.current_state(&reference).unwrap().entity_type(), "Cargo");
    }

    #[test]
    fn with_retry_uses_configured_attempts() {
        let store = EntityStore::new(
            Arc::new(InMemoryStateStore::new()),
            Config::new().max_retry_attempts(1),
        );
        let result: CoreResult<()> = store.with_retry("noop", |_| Ok(()));
        assert!(result.is_ok());
        assert_eq!(store.config().max_retry_attempts, 1);
    }
}
