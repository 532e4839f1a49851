//! Unit of work over a [`StateStore`].

use crate::entity::{EntityDescriptor, EntityReference, EntityState, EntityStatus};
use crate::error::{CoreError, CoreResult};
use crate::store::{RemovedEntity, StateBatch, StateStore};
use crate::types::UnitOfWorkId;
use crate::uow::{BatchCommitter, Lifecycle, StateCommitter, UnitOfWork, UnitOfWorkStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// The plain unit of work: tracks states in memory and prepares them as one
/// batch against a shared store.
///
/// It performs no version checks of its own; wrap it in a
/// [`ConcurrencyGuard`](crate::ConcurrencyGuard) for that. The store still
/// refuses updates and removals whose version moved.
pub struct StoreUnitOfWork {
    id: UnitOfWorkId,
    usecase: String,
    store: Arc<dyn StateStore>,
    lifecycle: Arc<Lifecycle>,
    states: Vec<EntityState>,
    index: HashMap<EntityReference, usize>,
}

impl StoreUnitOfWork {
    /// Opens a unit of work against `store`.
    pub fn new(id: UnitOfWorkId, usecase: impl Into<String>, store: Arc<dyn StateStore>) -> Self {
        let usecase = usecase.into();
        debug!(uow = %id, usecase = %usecase, "unit of work opened");
        Self {
            id,
            usecase,
            store,
            lifecycle: Arc::new(Lifecycle::new(id)),
            states: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Every state tracked so far, in the order it was first seen.
    #[must_use]
    pub fn tracked_states(&self) -> &[EntityState] {
        &self.states
    }

    /// The store this unit of work reads from and commits to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    fn track(&mut self, state: EntityState) -> &mut EntityState {
        let position = self.states.len();
        self.index.insert(state.reference().clone(), position);
        self.states.push(state);
        &mut self.states[position]
    }

    fn prepare_batch(&self) -> StateBatch {
        let mut batch = StateBatch::new();
        for state in &self.states {
            match state.status() {
                EntityStatus::New => batch.new_states.push(state.clone()),
                EntityStatus::Updated => batch.updated_states.push(state.clone()),
                EntityStatus::Removed if !state.is_discarded_creation() => {
                    batch.removed.push(RemovedEntity {
                        reference: state.reference().clone(),
                        expected: state.version(),
                    });
                }
                EntityStatus::Removed | EntityStatus::Loaded => {}
            }
        }
        batch
    }
}

impl UnitOfWork for StoreUnitOfWork {
    fn id(&self) -> UnitOfWorkId {
        self.id
    }

    fn usecase(&self) -> &str {
        &self.usecase
    }

    fn status(&self) -> UnitOfWorkStatus {
        self.lifecycle.status()
    }

    fn new_entity_state(
        &mut self,
        reference: EntityReference,
        descriptor: &EntityDescriptor,
    ) -> CoreResult<&mut EntityState> {
        self.lifecycle.ensure_open("create entity state")?;
        if self.index.contains_key(&reference) {
            return Err(CoreError::DuplicateLocalState {
                reference,
                uow: self.id,
            });
        }
        Ok(self.track(EntityState::from_descriptor(reference, descriptor)))
    }

    fn get_entity_state(&mut self, reference: &EntityReference) -> CoreResult<&mut EntityState> {
        self.lifecycle.ensure_open("get entity state")?;
        if let Some(&position) = self.index.get(reference) {
            let state = &mut self.states[position];
            if state.status() == EntityStatus::Removed {
                return Err(CoreError::entity_not_found(reference));
            }
            return Ok(state);
        }

        let state = self.store.get(reference)?;
        Ok(self.track(state))
    }

    fn entity_state_mut(&mut self, reference: &EntityReference) -> Option<&mut EntityState> {
        let position = *self.index.get(reference)?;
        self.states.get_mut(position)
    }

    fn apply(&mut self) -> CoreResult<Box<dyn StateCommitter>> {
        let batch = {
            let mut status = self.lifecycle.lock();
            if *status != UnitOfWorkStatus::Open {
                return Err(self.lifecycle.invalid(*status, "apply"));
            }
            *status = UnitOfWorkStatus::Preparing;
            self.prepare_batch()
        };

        debug!(
            uow = %self.id,
            usecase = %self.usecase,
            new = batch.new_states.len(),
            updated = batch.updated_states.len(),
            removed = batch.removed.len(),
            "unit of work prepared"
        );
        Ok(Box::new(BatchCommitter::new(
            self.id,
            Arc::clone(&self.store),
            batch,
            Arc::clone(&self.lifecycle),
        )))
    }

    fn discard(&mut self) -> CoreResult<()> {
        if self.lifecycle.discard()? {
            debug!(uow = %self.id, usecase = %self.usecase, "unit of work discarded");
        }
        Ok(())
    }
}

impl Drop for StoreUnitOfWork {
    fn drop(&mut self) {
        let mut status = self.lifecycle.lock();
        if *status == UnitOfWorkStatus::Open {
            *status = UnitOfWorkStatus::Discarded;
            debug!(uow = %self.id, usecase = %self.usecase, "open unit of work dropped");
        }
    }
}

impl std::fmt::Debug for StoreUnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreUnitOfWork")
            .field("id", &self.id)
            .field("usecase", &self.usecase)
            .field("status", &self.lifecycle.status())
            .field("states", &self.states.len())
            .finish_non_exhaustive()
    }
}
