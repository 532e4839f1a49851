//! One-shot state committers.

use crate::error::CoreResult;
use crate::store::{BatchReceipt, StateBatch, StateStore};
use crate::types::UnitOfWorkId;
use crate::uow::{Lifecycle, UnitOfWorkStatus};
use std::sync::Arc;
use tracing::debug;

/// Capability to finalize a prepared unit of work.
///
/// Exactly one of [`commit`](Self::commit) or [`cancel`](Self::cancel) may be
/// called, once. A second call of either panics.
pub trait StateCommitter: Send {
    /// Writes the prepared batch to the store.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the batch is rejected; the store is then
    /// unchanged and the unit of work stays `Preparing`. Returns
    /// [`CoreError::InvalidState`](crate::CoreError::InvalidState) if the
    /// unit of work was discarded meanwhile.
    ///
    /// # Panics
    ///
    /// Panics if the committer was already used.
    fn commit(&mut self) -> CoreResult<BatchReceipt>;

    /// Drops the prepared batch without touching the store.
    ///
    /// # Panics
    ///
    /// Panics if the committer was already used.
    fn cancel(&mut self);

    /// The unit of work this committer finalizes.
    fn unit_of_work(&self) -> UnitOfWorkId;
}

/// Committer that writes a [`StateBatch`] to a [`StateStore`] in one call.
pub struct BatchCommitter {
    uow: UnitOfWorkId,
    store: Arc<dyn StateStore>,
    batch: StateBatch,
    lifecycle: Arc<Lifecycle>,
    used: Option<&'static str>,
}

impl BatchCommitter {
    pub(crate) fn new(
        uow: UnitOfWorkId,
        store: Arc<dyn StateStore>,
        batch: StateBatch,
        lifecycle: Arc<Lifecycle>,
    ) -> Self {
        Self {
            uow,
            store,
            batch,
            lifecycle,
            used: None,
        }
    }

    /// The batch this committer will write.
    #[must_use]
    pub fn batch(&self) -> &StateBatch {
        &self.batch
    }

    fn mark_used(&mut self, operation: &'static str) {
        if let Some(previous) = self.used {
            panic!(
                "state committer for {} already used by {previous}; cannot {operation}",
                self.uow
            );
        }
        self.used = Some(operation);
    }
}

impl StateCommitter for BatchCommitter {
    fn commit(&mut self) -> CoreResult<BatchReceipt> {
        self.mark_used("commit");

        // Held across the write so a concurrent discard sees the outcome.
        let mut status = self.lifecycle.lock();
        if *status != UnitOfWorkStatus::Preparing {
            return Err(self.lifecycle.invalid(*status, "commit"));
        }

        let receipt = self.store.apply_batch(&self.batch)?;
        *status = UnitOfWorkStatus::Committed;
        debug!(uow = %self.uow, entities = self.batch.len(), "unit of work committed");
        Ok(receipt)
    }

    fn cancel(&mut self) {
        self.mark_used("cancel");

        let mut status = self.lifecycle.lock();
        if *status == UnitOfWorkStatus::Preparing {
            *status = UnitOfWorkStatus::Discarded;
        }
        debug!(uow = %self.uow, "unit of work cancelled");
    }

    fn unit_of_work(&self) -> UnitOfWorkId {
        self.uow
    }
}

impl Drop for BatchCommitter {
    fn drop(&mut self) {
        if self.used.is_some() {
            return;
        }
        let mut status = self.lifecycle.lock();
        if *status == UnitOfWorkStatus::Preparing {
            *status = UnitOfWorkStatus::Discarded;
            debug!(uow = %self.uow, "unused committer dropped; unit of work discarded");
        }
    }
}

impl std::fmt::Debug for BatchCommitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCommitter")
            .field("uow", &self.uow)
            .field("batch", &self.batch)
            .field("used", &self.used)
            .finish_non_exhaustive()
    }
}
