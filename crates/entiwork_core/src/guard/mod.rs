//! Optimistic concurrency guard.
//!
//! [`ConcurrencyGuard`] decorates any [`UnitOfWork`]. It remembers the version
//! of every state the unit of work loads and, when the unit of work is
//! applied, compares those versions against the store. Any difference aborts
//! the apply with [`CoreError::ConcurrentModification`] before a committer
//! exists, so nothing is written.
//!
//! States created with `new_entity_state` are not tracked; the store's
//! duplicate check covers them.

mod ledger;

pub use ledger::VersionLedger;

use crate::entity::{EntityDescriptor, EntityReference, EntityState, EntityStatus};
use crate::error::{CoreError, CoreResult, VersionConflict};
use crate::store::{BatchReceipt, StateStore};
use crate::types::{UnitOfWorkId, Version};
use crate::uow::{StateCommitter, UnitOfWork, UnitOfWorkStatus};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Unit-of-work decorator enforcing optimistic concurrency.
pub struct ConcurrencyGuard<U: UnitOfWork> {
    inner: U,
    store: Arc<dyn StateStore>,
    ledger: Arc<Mutex<VersionLedger>>,
    loaded: Vec<EntityReference>,
}

impl<U: UnitOfWork> ConcurrencyGuard<U> {
    /// Wraps `inner`, checking versions against `store`.
    pub fn new(inner: U, store: Arc<dyn StateStore>) -> Self {
        Self {
            inner,
            store,
            ledger: Arc::new(Mutex::new(VersionLedger::new())),
            loaded: Vec::new(),
        }
    }

    /// The decorated unit of work.
    #[must_use]
    pub fn inner(&self) -> &U {
        &self.inner
    }

    /// Number of references whose versions are being tracked.
    #[must_use]
    pub fn ledger_len(&self) -> usize {
        self.ledger.lock().len()
    }

    /// The version recorded when `reference` was first loaded.
    #[must_use]
    pub fn observed_version(&self, reference: &EntityReference) -> Option<Version> {
        self.ledger.lock().version_of(reference)
    }

    fn conflicts(&self) -> CoreResult<Vec<VersionConflict>> {
        let ledger = self.ledger.lock();
        let mut conflicts = Vec::new();
        for reference in &self.loaded {
            let Some(expected) = ledger.version_of(reference) else {
                continue;
            };
            let actual = self.store.current_version(reference)?;
            if actual != Some(expected) {
                conflicts.push(VersionConflict {
                    reference: reference.clone(),
                    expected,
                    actual,
                });
            }
        }
        Ok(conflicts)
    }
}

impl<U: UnitOfWork> UnitOfWork for ConcurrencyGuard<U> {
    fn id(&self) -> UnitOfWorkId {
        self.inner.id()
    }

    fn usecase(&self) -> &str {
        self.inner.usecase()
    }

    fn status(&self) -> UnitOfWorkStatus {
        self.inner.status()
    }

    fn new_entity_state(
        &mut self,
        reference: EntityReference,
        descriptor: &EntityDescriptor,
    ) -> CoreResult<&mut EntityState> {
        self.inner.new_entity_state(reference, descriptor)
    }

    fn get_entity_state(&mut self, reference: &EntityReference) -> CoreResult<&mut EntityState> {
        let state = self.inner.get_entity_state(reference)?;
        if state.status() != EntityStatus::New
            && self.ledger.lock().record(reference, state.version())
        {
            self.loaded.push(reference.clone());
        }
        Ok(state)
    }

    fn entity_state_mut(&mut self, reference: &EntityReference) -> Option<&mut EntityState> {
        self.inner.entity_state_mut(reference)
    }

    fn apply(&mut self) -> CoreResult<Box<dyn StateCommitter>> {
        let status = self.inner.status();
        if status != UnitOfWorkStatus::Open {
            return Err(CoreError::InvalidState {
                uow: self.inner.id(),
                status,
                operation: "apply",
            });
        }

        let conflicts = self.conflicts()?;
        if !conflicts.is_empty() {
            warn!(
                uow = %self.inner.id(),
                usecase = %self.inner.usecase(),
                conflicts = conflicts.len(),
                "concurrent modification detected"
            );
            return Err(CoreError::ConcurrentModification { conflicts });
        }

        let inner = self.inner.apply()?;
        Ok(Box::new(GuardedCommitter {
            inner,
            ledger: Arc::clone(&self.ledger),
            loaded: std::mem::take(&mut self.loaded),
        }))
    }

    fn discard(&mut self) -> CoreResult<()> {
        self.ledger.lock().clear();
        self.loaded.clear();
        self.inner.discard()
    }
}

impl<U: UnitOfWork + std::fmt::Debug> std::fmt::Debug for ConcurrencyGuard<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrencyGuard")
            .field("inner", &self.inner)
            .field("loaded", &self.loaded)
            .finish_non_exhaustive()
    }
}

/// Committer that releases the guard's ledger entries once finalized.
struct GuardedCommitter {
    inner: Box<dyn StateCommitter>,
    ledger: Arc<Mutex<VersionLedger>>,
    loaded: Vec<EntityReference>,
}

impl StateCommitter for GuardedCommitter {
    fn commit(&mut self) -> CoreResult<BatchReceipt> {
        let receipt = self.inner.commit()?;
        self.ledger.lock().forget(&self.loaded);
        debug!(uow = %self.inner.unit_of_work(), released = self.loaded.len(), "version ledger released");
        Ok(receipt)
    }

    fn cancel(&mut self) {
        self.inner.cancel();
        self.ledger.lock().forget(&self.loaded);
    }

    fn unit_of_work(&self) -> UnitOfWorkId {
        self.inner.unit_of_work()
    }
}
