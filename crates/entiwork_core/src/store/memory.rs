//! In-memory state store.

use crate::entity::{EntityReference, EntityState};
use crate::error::CoreResult;
use crate::store::table::StateTable;
use crate::store::{BatchReceipt, StateBatch, StateStore, StoreStats};
use crate::types::{Timestamp, Version};
use parking_lot::RwLock;
use tracing::debug;

/// A state store held entirely in memory.
///
/// Reads share a read lock; [`apply_batch`](StateStore::apply_batch) holds the
/// write lock from validation to the last write, so readers never observe a
/// partially applied batch.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    table: RwLock<StateTable>,
}

impl InMemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: RwLock::new(StateTable::new()),
        }
    }
}

impl StateStore for InMemoryStateStore {
    fn get(&self, reference: &EntityReference) -> CoreResult<EntityState> {
        self.table.read().get(reference)
    }

    fn contains(&self, reference: &EntityReference) -> CoreResult<bool> {
        Ok(self.table.read().contains(reference))
    }

    fn current_version(&self, reference: &EntityReference) -> CoreResult<Option<Version>> {
        Ok(self.table.read().current_version(reference))
    }

    fn apply_batch(&self, batch: &StateBatch) -> CoreResult<BatchReceipt> {
        let mut table = self.table.write();
        if let Err(e) = table.validate(batch) {
            table.record_rejection();
            debug!(error = %e, "batch rejected");
            return Err(e);
        }
        let receipt = table.apply(batch, Timestamp::now());
        debug!(entities = batch.len(), "batch applied");
        Ok(receipt)
    }

    fn references(&self) -> CoreResult<Vec<EntityReference>> {
        Ok(self.table.read().references())
    }

    fn stats(&self) -> StoreStats {
        self.table.read().stats()
    }
}
