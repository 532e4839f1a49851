//! Journal record format.
//!
//! The journalled store appends one record per applied batch:
//!
//! ```text
//! | magic (4) | format (1) | length (4) | header crc32 (4) | payload (N) | crc32 (4) |
//! ```
//!
//! The payload is the CBOR encoding of a [`JournalRecord`]. The header CRC
//! covers magic, format and length; the trailing CRC covers every byte before
//! it. Lengths and CRCs are little-endian.
//!
//! ## Recovery policy
//!
//! - a truncated header, or a payload whose checked length runs past the end
//!   of the journal, is a write torn by a crash: scanning stops there and
//!   reports the discarded tail, which is never more than one record
//! - a bad magic, unknown format, header CRC mismatch or record CRC mismatch
//!   is corruption and fails the scan; no heuristic repair is attempted

use crate::entity::EntityState;
use crate::error::{CoreError, CoreResult};
use crate::store::{RemovedEntity, StateBatch};
use crate::types::Timestamp;
use entiwork_codec::{from_cbor, to_cbor};
use entiwork_storage::StorageBackend;
use serde::{Deserialize, Serialize};

/// Magic bytes opening every journal record.
pub const JOURNAL_MAGIC: [u8; 4] = *b"EWJL";

/// Current record format.
pub const JOURNAL_FORMAT: u8 = 1;

/// magic (4) + format (1) + length (4)
const PREFIX_SIZE: usize = 9;

/// prefix + header crc32 (4)
const HEADER_SIZE: usize = PREFIX_SIZE + 4;

const CRC_SIZE: usize = 4;

/// One applied batch as written to the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRecord {
    /// Position of the batch in commit order, starting at 1.
    pub sequence: u64,
    /// Commit timestamp stamped on the written states.
    pub committed_at: Timestamp,
    /// Inserted states.
    pub new_states: Vec<EntityState>,
    /// Overwritten states, each at the version it replaced.
    pub updated_states: Vec<EntityState>,
    /// Removed entities.
    pub removed: Vec<RemovedEntity>,
}

impl JournalRecord {
    /// Captures `batch` as the record with the given sequence and time.
    #[must_use]
    pub fn from_batch(sequence: u64, committed_at: Timestamp, batch: &StateBatch) -> Self {
        Self {
            sequence,
            committed_at,
            new_states: batch.new_states.clone(),
            updated_states: batch.updated_states.clone(),
            removed: batch.removed.clone(),
        }
    }

    /// Rebuilds the batch this record was written for.
    #[must_use]
    pub fn to_batch(&self) -> StateBatch {
        StateBatch {
            new_states: self.new_states.clone(),
            updated_states: self.updated_states.clone(),
            removed: self.removed.clone(),
        }
    }

    /// Encodes the record with its envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if CBOR encoding fails or the payload exceeds 4 GiB.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let payload = to_cbor(self)?;
        let len = u32::try_from(payload.len())
            .map_err(|_| CoreError::invalid_operation("journal record payload too large"))?;

        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        data.extend_from_slice(&JOURNAL_MAGIC);
        data.push(JOURNAL_FORMAT);
        data.extend_from_slice(&len.to_le_bytes());
        let header_crc = crc32fast::hash(&data);
        data.extend_from_slice(&header_crc.to_le_bytes());
        data.extend_from_slice(&payload);
        let crc = crc32fast::hash(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        Ok(data)
    }
}

/// A decoded record and where it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Byte offset of the record envelope.
    pub offset: u64,
    /// The record.
    pub record: JournalRecord,
}

/// Result of reading a journal front to back.
#[derive(Debug, Clone, Default)]
pub struct JournalScan {
    /// Every complete record, in order.
    pub entries: Vec<JournalEntry>,
    /// Length of the journal prefix made of complete records.
    pub valid_len: u64,
    /// Number of bytes after `valid_len` belonging to a torn write.
    pub torn_bytes: u64,
}

impl JournalScan {
    /// Returns `true` if the journal ends with a torn write.
    #[must_use]
    pub fn has_torn_tail(&self) -> bool {
        self.torn_bytes > 0
    }
}

/// Reads every record from `backend`.
///
/// # Errors
///
/// Returns [`CoreError::StoreUnavailable`] if the backend cannot be read, or a
/// corruption error as described in the module docs.
pub fn scan(backend: &dyn StorageBackend) -> CoreResult<JournalScan> {
    let bytes = backend.read_all()?;
    decode_records(&bytes)
}

/// Decodes every record in `bytes`.
///
/// # Errors
///
/// Returns a corruption error as described in the module docs.
pub fn decode_records(bytes: &[u8]) -> CoreResult<JournalScan> {
    let mut scan = JournalScan::default();
    let mut pos = 0usize;

    while pos < bytes.len() {
        let offset = pos as u64;
        let rest = &bytes[pos..];
        if rest.len() < HEADER_SIZE {
            scan.torn_bytes = rest.len() as u64;
            break;
        }

        if rest[..4] != JOURNAL_MAGIC {
            return Err(CoreError::journal_corruption(offset, "bad magic bytes"));
        }
        if rest[4] != JOURNAL_FORMAT {
            return Err(CoreError::journal_corruption(
                offset,
                format!("unsupported record format {}", rest[4]),
            ));
        }
        check_crc(offset, &rest[..PREFIX_SIZE], read_u32(rest, PREFIX_SIZE))?;

        // The length is trusted only once the header CRC has passed.
        let len = read_u32(rest, 5) as usize;
        let total = HEADER_SIZE + len + CRC_SIZE;
        if rest.len() < total {
            scan.torn_bytes = rest.len() as u64;
            break;
        }

        let body_end = HEADER_SIZE + len;
        check_crc(offset, &rest[..body_end], read_u32(rest, body_end))?;

        let record: JournalRecord = from_cbor(&rest[HEADER_SIZE..body_end])?;
        scan.entries.push(JournalEntry { offset, record });
        pos += total;
        scan.valid_len = pos as u64;
    }

    Ok(scan)
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn check_crc(offset: u64, covered: &[u8], expected: u32) -> CoreResult<()> {
    let actual = crc32fast::hash(covered);
    if expected != actual {
        return Err(CoreError::ChecksumMismatch {
            offset,
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityReference;
    use crate::types::Version;
    use entiwork_storage::InMemoryBackend;

    fn record(sequence: u64) -> JournalRecord {
        let mut state = EntityState::new(EntityReference::from("cargo:ABC"), "Cargo");
        state.set_property("origin", "HONGKONG").unwrap();
        JournalRecord {
            sequence,
            committed_at: Timestamp(1_000 + sequence),
            new_states: vec![state],
            updated_states: Vec::new(),
            removed: vec![RemovedEntity {
                reference: EntityReference::from("cargo:OLD"),
                expected: Version::new(3),
            }],
        }
    }

    #[test]
    fn records_decode_in_order() {
        let mut bytes = record(1).encode().unwrap();
        let first_len = bytes.len() as u64;
        bytes.extend(record(2).encode().unwrap());

        let scan = decode_records(&bytes).unwrap();
        assert_eq!(scan.entries.len(), 2);
        assert_eq!(scan.entries[0].record, record(1));
        assert_eq!(scan.entries[1].offset, first_len);
        assert_eq!(scan.valid_len, bytes.len() as u64);
        assert!(!scan.has_torn_tail());
    }

    #[test]
    fn torn_tail_is_reported_not_fatal() {
        let mut bytes = record(1).encode().unwrap();
        let complete = bytes.len() as u64;
        let second = record(2).encode().unwrap();
        bytes.extend_from_slice(&second[..second.len() - 3]);

        let scan = decode_records(&bytes).unwrap();
        assert_eq!(scan.entries.len(), 1);
        assert_eq!(scan.valid_len, complete);
        assert_eq!(scan.torn_bytes, second.len() as u64 - 3);
    }

    #[test]
    fn short_header_is_torn() {
        let mut bytes = record(1).encode().unwrap();
        bytes.extend_from_slice(&JOURNAL_MAGIC);
        let scan = decode_records(&bytes).unwrap();
        assert_eq!(scan.entries.len(), 1);
        assert_eq!(scan.torn_bytes, 4);
    }

    #[test]
    fn flipped_payload_byte_fails_checksum() {
        let mut bytes = record(1).encode().unwrap();
        bytes[HEADER_SIZE + 2] ^= 0xFF;
        assert!(matches!(
            decode_records(&bytes),
            Err(CoreError::ChecksumMismatch { offset: 0, .. })
        ));
    }

    #[test]
    fn damaged_length_is_corruption_not_a_torn_tail() {
        let mut bytes = record(1).encode().unwrap();
        bytes.extend(record(2).encode().unwrap());
        bytes.extend(record(3).encode().unwrap());
        // high byte of the first record's length
        bytes[8] ^= 0xFF;

        assert!(matches!(
            decode_records(&bytes),
            Err(CoreError::ChecksumMismatch { offset: 0, .. })
        ));
    }

    #[test]
    fn damaged_length_in_a_later_record_is_corruption() {
        let first = record(1).encode().unwrap();
        let mut bytes = first.clone();
        bytes.extend(record(2).encode().unwrap());
        bytes[first.len() + 5] ^= 0x40;

        assert!(matches!(
            decode_records(&bytes),
            Err(CoreError::ChecksumMismatch { offset, .. }) if offset == first.len() as u64
        ));
    }

    #[test]
    fn torn_tail_never_exceeds_one_record() {
        let mut bytes = record(1).encode().unwrap();
        let second = record(2).encode().unwrap();
        bytes.extend_from_slice(&second[..HEADER_SIZE + 1]);

        let scan = decode_records(&bytes).unwrap();
        assert_eq!(scan.entries.len(), 1);
        assert!(scan.torn_bytes < second.len() as u64);
    }

    #[test]
    fn bad_magic_is_corruption() {
        let mut bytes = record(1).encode().unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            decode_records(&bytes),
            Err(CoreError::JournalCorruption { offset: 0, .. })
        ));
    }

    #[test]
    fn scan_reads_backend() {
        let mut backend = InMemoryBackend::new();
        backend.append(&record(1).encode().unwrap()).unwrap();
        let scan = scan(&backend).unwrap();
        assert_eq!(scan.entries.len(), 1);
    }

    #[test]
    fn batch_conversion_keeps_contents() {
        let rec = record(4);
        let batch = rec.to_batch();
        assert_eq!(JournalRecord::from_batch(4, rec.committed_at, &batch), rec);
    }
}
