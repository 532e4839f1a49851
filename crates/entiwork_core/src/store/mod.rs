//! Versioned state stores.
//!
//! A state store maps each [`EntityReference`] to its current
//! [`EntityState`] and assigns versions as batches are applied. Every store
//! applies a [`StateBatch`] all-or-nothing: the batch is validated against
//! the current table first, and only a batch that passes in full is written.
//!
//! ## Batch rules
//!
//! - a new state must not already exist → [`CoreError::DuplicateEntity`]
//! - an updated or removed entity must exist → [`CoreError::EntityNotFound`]
//! - an updated or removed entity must still be at the version it was read
//!   at → [`CoreError::ConcurrentModification`]
//! - a reference may appear only once per batch
//!
//! New states are stored at version 1; updated states at their current
//! version + 1. Both get the batch's commit timestamp.

pub mod journal;
mod journaled;
mod memory;
mod table;

pub use journaled::JournaledStateStore;
pub use memory::InMemoryStateStore;

use crate::entity::{EntityReference, EntityState};
use crate::error::CoreResult;
use crate::types::{Timestamp, Version};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A versioned map of entity states shared by all units of work.
///
/// Implementations serialize [`apply_batch`](Self::apply_batch) against reads
/// of the same references, so a reader observes either the whole batch or
/// none of it.
pub trait StateStore: Send + Sync {
    /// Returns the current state of `reference`, with status `Loaded`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::EntityNotFound`] if absent.
    fn get(&self, reference: &EntityReference) -> CoreResult<EntityState>;

    /// Returns `true` if a current state exists for `reference`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium fails.
    fn contains(&self, reference: &EntityReference) -> CoreResult<bool>;

    /// Returns the current version of `reference`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium fails.
    fn current_version(&self, reference: &EntityReference) -> CoreResult<Option<Version>>;

    /// Atomically applies `batch`.
    ///
    /// # Errors
    ///
    /// Returns the first rule the batch violates (see the module docs), or
    /// [`crate::CoreError::StoreUnavailable`] if the medium fails. On error
    /// the store is unchanged.
    fn apply_batch(&self, batch: &StateBatch) -> CoreResult<BatchReceipt>;

    /// Returns every current reference in sorted order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium fails.
    fn references(&self) -> CoreResult<Vec<EntityReference>>;

    /// Returns store counters.
    fn stats(&self) -> StoreStats;
}

/// An entity removal, with the version the remover read it at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedEntity {
    /// The entity to remove.
    pub reference: EntityReference,
    /// Version observed when the entity was loaded.
    pub expected: Version,
}

/// One prepared set of changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateBatch {
    /// States to insert.
    pub new_states: Vec<EntityState>,
    /// States to overwrite; each carries the version it was loaded at.
    pub updated_states: Vec<EntityState>,
    /// Entities to remove.
    pub removed: Vec<RemovedEntity>,
}

impl StateBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the batch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.new_states.is_empty() && self.updated_states.is_empty() && self.removed.is_empty()
    }

    /// Number of entities the batch touches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.new_states.len() + self.updated_states.len() + self.removed.len()
    }

    /// Every reference the batch touches.
    pub fn references(&self) -> impl Iterator<Item = &EntityReference> {
        self.new_states
            .iter()
            .chain(&self.updated_states)
            .map(EntityState::reference)
            .chain(self.removed.iter().map(|r| &r.reference))
    }
}

/// Outcome of a successfully applied batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReceipt {
    /// Commit time stamped on every written state.
    pub committed_at: Timestamp,
    /// Version assigned to every inserted or updated reference.
    pub versions: BTreeMap<EntityReference, Version>,
    /// References removed by the batch.
    pub removed: Vec<EntityReference>,
}

impl BatchReceipt {
    /// Version the batch assigned to `reference`, if it wrote it.
    #[must_use]
    pub fn version_of(&self, reference: &EntityReference) -> Option<Version> {
        self.versions.get(reference).copied()
    }
}

/// Store counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Current number of entities.
    pub entities: usize,
    /// Batches applied since the store was opened (including replayed ones).
    pub batches_applied: u64,
    /// Batches rejected by validation or by the medium.
    pub batches_rejected: u64,
}
