//! Journalled state store.

use crate::entity::{EntityReference, EntityState};
use crate::error::{CoreError, CoreResult};
use crate::store::journal::{self, JournalRecord};
use crate::store::table::StateTable;
use crate::store::{BatchReceipt, StateBatch, StateStore, StoreStats};
use crate::types::{Timestamp, Version};
use entiwork_storage::StorageBackend;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// A state store whose batches are made durable in an append-only journal.
///
/// The current states live in memory; the journal is the source of truth and
/// is replayed by [`open`](Self::open). Each batch is validated, appended as a
/// single record and flushed before the in-memory table changes, so a batch
/// that fails on the medium leaves both the table and the journal as they
/// were.
///
/// Lock order is table, then journal.
pub struct JournaledStateStore {
    table: RwLock<StateTable>,
    journal: Mutex<JournalWriter>,
}

struct JournalWriter {
    backend: Box<dyn StorageBackend>,
    next_sequence: u64,
    sync_on_commit: bool,
}

impl JournalWriter {
    /// Appends one record; on any medium failure the journal is cut back to
    /// its previous length.
    fn append(&mut self, record: &JournalRecord) -> CoreResult<()> {
        let data = record.encode()?;
        let before = self.backend.size()?;

        let written = self
            .backend
            .append(&data)
            .and_then(|_| self.backend.flush())
            .and_then(|()| {
                if self.sync_on_commit {
                    self.backend.sync()
                } else {
                    Ok(())
                }
            });

        if let Err(e) = written {
            self.rollback(before);
            return Err(e.into());
        }

        self.next_sequence += 1;
        Ok(())
    }

    fn rollback(&mut self, len: u64) {
        match self.backend.size() {
            Ok(size) if size > len => {
                if let Err(e) = self.backend.truncate(len) {
                    warn!(error = %e, len, "failed to cut back torn journal append");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "journal size unknown after failed append"),
        }
    }
}

impl JournaledStateStore {
    /// Opens a store over `backend`, replaying every complete record.
    ///
    /// A torn record at the end of the journal is discarded and truncated
    /// away.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if a record fails its checksum, is
    /// malformed, is out of sequence or no longer applies to the replayed
    /// table; [`CoreError::StoreUnavailable`] if the backend fails.
    pub fn open(mut backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> CoreResult<Self> {
        let scan = journal::scan(&*backend)?;
        let mut table = StateTable::new();
        let mut next_sequence = 1;

        for entry in &scan.entries {
            let record = &entry.record;
            if record.sequence != next_sequence {
                return Err(CoreError::journal_corruption(
                    entry.offset,
                    format!(
                        "expected sequence {next_sequence}, found {}",
                        record.sequence
                    ),
                ));
            }

            let batch = record.to_batch();
            table.validate(&batch).map_err(|e| {
                CoreError::journal_corruption(
                    entry.offset,
                    format!("record {} does not replay: {e}", record.sequence),
                )
            })?;
            table.apply(&batch, record.committed_at);
            next_sequence += 1;
        }

        if scan.has_torn_tail() {
            warn!(
                valid_len = scan.valid_len,
                torn_bytes = scan.torn_bytes,
                "discarding torn journal tail"
            );
            backend.truncate(scan.valid_len)?;
        }

        info!(
            records = scan.entries.len(),
            entities = table.stats().entities,
            "journal replayed"
        );

        Ok(Self {
            table: RwLock::new(table),
            journal: Mutex::new(JournalWriter {
                backend,
                next_sequence,
                sync_on_commit,
            }),
        })
    }

    /// Sequence number of the last journalled batch (0 if none).
    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        self.journal.lock().next_sequence - 1
    }

    /// Current journal length in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot report its size.
    pub fn journal_len(&self) -> CoreResult<u64> {
        Ok(self.journal.lock().backend.size()?)
    }
}

impl StateStore for JournaledStateStore {
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

        let committed_at = Timestamp::now();
        if batch.is_empty() {
            return Ok(table.apply(batch, committed_at));
        }

        let mut journal = self.journal.lock();
        let record = JournalRecord::from_batch(journal.next_sequence, committed_at, batch);
        if let Err(e) = journal.append(&record) {
            table.record_rejection();
            warn!(error = %e, sequence = record.sequence, "journal append failed");
            return Err(e);
        }

        debug!(
            sequence = record.sequence,
            entities = batch.len(),
            "batch journalled"
        );
        Ok(table.apply(batch, committed_at))
    }

    fn references(&self) -> CoreResult<Vec<EntityReference>> {
        Ok(self.table.read().references())
    }

    fn stats(&self) -> StoreStats {
        self.table.read().stats()
    }
}

impl std::fmt::Debug for JournaledStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournaledStateStore")
            .field("stats", &self.stats())
            .field("last_sequence", &self.last_sequence())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RemovedEntity;
    use entiwork_storage::InMemoryBackend;

    fn open(backend: &InMemoryBackend) -> JournaledStateStore {
        JournaledStateStore::open(Box::new(backend.clone()), true).unwrap()
    }

    fn insert(store: &JournaledStateStore, reference: &str, origin: &str) {
        let mut state = EntityState::new(EntityReference::from(reference), "Cargo");
        state.set_property("origin", origin).unwrap();
        store
            .apply_batch(&StateBatch {
                new_states: vec![state],
                ..StateBatch::default()
            })
            .unwrap();
    }

    #[test]
    fn empty_journal_opens_empty() {
        let store = open(&InMemoryBackend::new());
        assert_eq!(store.stats(), StoreStats::default());
        assert_eq!(store.last_sequence(), 0);
    }

    #[test]
    fn reopen_replays_versions_and_timestamps() {
        let backend = InMemoryBackend::new();
        let reference = EntityReference::from("cargo:ABC");
        let before = {
            let store = open(&backend);
            insert(&store, "cargo:ABC", "HONGKONG");

            let mut state = store.get(&reference).unwrap();
            state.set_property("origin", "SHANGHAI").unwrap();
            store
                .apply_batch(&StateBatch {
                    updated_states: vec![state],
                    ..StateBatch::default()
                })
                .unwrap();
            store.get(&reference).unwrap()
        };

        let store = open(&backend);
        let after = store.get(&reference).unwrap();
        assert_eq!(after, before);
        assert_eq!(after.version(), Version::new(2));
        assert_eq!(store.last_sequence(), 2);
    }

    #[test]
    fn removal_is_replayed() {
        let backend = InMemoryBackend::new();
        {
            let store = open(&backend);
            insert(&store, "cargo:ABC", "HONGKONG");
            store
                .apply_batch(&StateBatch {
                    removed: vec![RemovedEntity {
                        reference: EntityReference::from("cargo:ABC"),
                        expected: Version::INITIAL,
                    }],
                    ..StateBatch::default()
                })
                .unwrap();
        }

        let store = open(&backend);
        assert!(!store.contains(&EntityReference::from("cargo:ABC")).unwrap());
        assert_eq!(store.stats().batches_applied, 2);
    }

    #[test]
    fn recreated_version_survives_replay() {
        let backend = InMemoryBackend::new();
        let reference = EntityReference::from("cargo:ABC");
        {
            let store = open(&backend);
            insert(&store, "cargo:ABC", "HONGKONG");
            store
                .apply_batch(&StateBatch {
                    removed: vec![RemovedEntity {
                        reference: reference.clone(),
                        expected: Version::INITIAL,
                    }],
                    ..StateBatch::default()
                })
                .unwrap();
        }

        let store = open(&backend);
        insert(&store, "cargo:ABC", "SHANGHAI");
        assert_eq!(store.current_version(&reference).unwrap(), Some(Version::new(2)));

        let store = open(&backend);
        assert_eq!(store.current_version(&reference).unwrap(), Some(Version::new(2)));
    }

    #[test]
    fn rejected_batch_is_not_journalled() {
        let backend = InMemoryBackend::new();
        let store = open(&backend);
        insert(&store, "cargo:ABC", "HONGKONG");
        let len = store.journal_len().unwrap();

        let duplicate = StateBatch {
            new_states: vec![EntityState::new(EntityReference::from("cargo:ABC"), "Cargo")],
            ..StateBatch::default()
        };
        assert!(store.apply_batch(&duplicate).is_err());
        assert_eq!(store.journal_len().unwrap(), len);
    }

    #[test]
    fn empty_batch_writes_nothing() {
        let backend = InMemoryBackend::new();
        let store = open(&backend);
        store.apply_batch(&StateBatch::new()).unwrap();
        assert_eq!(store.journal_len().unwrap(), 0);
    }

    #[test]
    fn torn_tail_is_truncated_on_open() {
        let backend = InMemoryBackend::new();
        {
            let store = open(&backend);
            insert(&store, "cargo:ABC", "HONGKONG");
        }
        let complete = backend.snapshot().len();
        let mut writer = backend.clone();
        writer.append(b"EWJL\x01\xff").unwrap();

        let store = open(&backend);
        assert!(store.contains(&EntityReference::from("cargo:ABC")).unwrap());
        assert_eq!(backend.snapshot().len(), complete);
    }

    #[test]
    fn corrupted_record_fails_open() {
        let backend = InMemoryBackend::new();
        {
            let store = open(&backend);
            insert(&store, "cargo:ABC", "HONGKONG");
        }
        backend.corrupt_byte(12);

        let result = JournaledStateStore::open(Box::new(backend.clone()), true);
        assert!(matches!(result, Err(CoreError::ChecksumMismatch { .. })));
    }

    #[test]
    fn damaged_length_fails_open_without_truncating() {
        let backend = InMemoryBackend::new();
        {
            let store = open(&backend);
            insert(&store, "cargo:A", "HONGKONG");
            insert(&store, "cargo:B", "SHANGHAI");
            insert(&store, "cargo:C", "OSLO");
        }
        let len = backend.snapshot().len();
        // high byte of the first record's length
        backend.corrupt_byte(8);

        let result = JournaledStateStore::open(Box::new(backend.clone()), true);
        assert!(matches!(
            result,
            Err(CoreError::ChecksumMismatch { offset: 0, .. })
        ));
        assert_eq!(backend.snapshot().len(), len);
    }
}
