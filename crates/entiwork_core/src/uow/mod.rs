//! Units of work.
//!
//! A unit of work collects the states one business operation creates, reads
//! and changes, and on [`apply`](UnitOfWork::apply) turns them into a single
//! [`StateBatch`](crate::StateBatch) bound to a one-shot
//! [`StateCommitter`]. Status moves
//! `Open -> Preparing -> {Committed, Discarded}`, with `Open -> Discarded`
//! allowed directly.

mod committer;
mod store_uow;

pub use committer::{BatchCommitter, StateCommitter};
pub use store_uow::StoreUnitOfWork;

use crate::entity::{EntityDescriptor, EntityReference, EntityState};
use crate::error::{CoreError, CoreResult};
use crate::store::BatchReceipt;
use crate::types::UnitOfWorkId;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;

/// Lifecycle status of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitOfWorkStatus {
    /// Accepting new and loaded states.
    Open,
    /// Applied; a committer holds the prepared batch.
    Preparing,
    /// The batch reached the store.
    Committed,
    /// Abandoned; nothing reached the store.
    Discarded,
}

impl UnitOfWorkStatus {
    /// Returns `true` for `Committed` and `Discarded`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Discarded)
    }
}

impl fmt::Display for UnitOfWorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Preparing => "preparing",
            Self::Committed => "committed",
            Self::Discarded => "discarded",
        };
        f.write_str(name)
    }
}

/// A transactional session over entity states.
pub trait UnitOfWork {
    /// Returns this unit of work's identifier.
    fn id(&self) -> UnitOfWorkId;

    /// Returns the label given when the unit of work was opened.
    fn usecase(&self) -> &str;

    /// Returns the current status.
    fn status(&self) -> UnitOfWorkStatus;

    /// Registers a fresh state for `reference`, populated from the
    /// descriptor's defaults.
    ///
    /// # Errors
    ///
    /// [`CoreError::DuplicateLocalState`] if the reference is already tracked;
    /// [`CoreError::InvalidState`] unless the unit of work is open.
    fn new_entity_state(
        &mut self,
        reference: EntityReference,
        descriptor: &EntityDescriptor,
    ) -> CoreResult<&mut EntityState>;

    /// Returns the tracked state for `reference`, loading it from the store
    /// the first time.
    ///
    /// # Errors
    ///
    /// [`CoreError::EntityNotFound`] if the store holds no state or this unit
    /// of work removed it; [`CoreError::InvalidState`] unless open.
    fn get_entity_state(&mut self, reference: &EntityReference) -> CoreResult<&mut EntityState>;

    /// Returns an already tracked state without touching the store.
    fn entity_state_mut(&mut self, reference: &EntityReference) -> Option<&mut EntityState>;

    /// Prepares the tracked changes as one batch and returns the committer
    /// that will write it.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidState`] unless open. Decorators may reject the
    /// batch, e.g. with [`CoreError::ConcurrentModification`].
    fn apply(&mut self) -> CoreResult<Box<dyn StateCommitter>>;

    /// Abandons the unit of work. Never touches the store.
    ///
    /// Discarding twice is a no-op.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidState`] if the unit of work already committed.
    fn discard(&mut self) -> CoreResult<()>;

    /// Applies and commits in one step.
    ///
    /// # Errors
    ///
    /// Any error from [`apply`](Self::apply) or
    /// [`StateCommitter::commit`]. After a commit failure the unit of work is
    /// still `Preparing` and may be discarded.
    fn complete(&mut self) -> CoreResult<BatchReceipt> {
        let mut committer = self.apply()?;
        committer.commit()
    }
}

/// Status cell shared between a unit of work and its committer.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    uow: UnitOfWorkId,
    status: Mutex<UnitOfWorkStatus>,
}

impl Lifecycle {
    pub(crate) fn new(uow: UnitOfWorkId) -> Self {
        Self {
            uow,
            status: Mutex::new(UnitOfWorkStatus::Open),
        }
    }

    pub(crate) fn status(&self) -> UnitOfWorkStatus {
        *self.status.lock()
    }

    /// Locks the status for a transition that must not interleave with
    /// another.
    pub(crate) fn lock(&self) -> MutexGuard<'_, UnitOfWorkStatus> {
        self.status.lock()
    }

    pub(crate) fn ensure_open(&self, operation: &'static str) -> CoreResult<()> {
        let status = self.status();
        if status == UnitOfWorkStatus::Open {
            Ok(())
        } else {
            Err(self.invalid(status, operation))
        }
    }

    pub(crate) fn invalid(&self, status: UnitOfWorkStatus, operation: &'static str) -> CoreError {
        CoreError::InvalidState {
            uow: self.uow,
            status,
            operation,
        }
    }

    /// Moves to `Discarded`. Returns `false` if already discarded.
    pub(crate) fn discard(&self) -> CoreResult<bool> {
        let mut status = self.status.lock();
        match *status {
            UnitOfWorkStatus::Open | UnitOfWorkStatus::Preparing => {
                *status = UnitOfWorkStatus::Discarded;
                Ok(true)
            }
            UnitOfWorkStatus::Discarded => Ok(false),
            UnitOfWorkStatus::Committed => Err(self.invalid(*status, "discard")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discard_is_idempotent_until_committed() {
        let lifecycle = Lifecycle::new(UnitOfWorkId::new(1));
        assert!(lifecycle.discard().unwrap());
        assert!(!lifecycle.discard().unwrap());

        let committed = Lifecycle::new(UnitOfWorkId::new(2));
        *committed.lock() = UnitOfWorkStatus::Committed;
        let err = committed.discard().unwrap_err();
        assert_eq!(err.to_string(), "uow:2 is committed; cannot discard");
    }

    #[test]
    fn only_open_admits_operations() {
        let lifecycle = Lifecycle::new(UnitOfWorkId::new(3));
        lifecycle.ensure_open("apply").unwrap();
        *lifecycle.lock() = UnitOfWorkStatus::Preparing;
        assert!(matches!(
            lifecycle.ensure_open("apply"),
            Err(CoreError::InvalidState {
                status: UnitOfWorkStatus::Preparing,
                ..
            })
        ));
    }
}
