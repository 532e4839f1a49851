//! Error types for EntiWork core.

use crate::entity::EntityReference;
use crate::types::{UnitOfWorkId, Version};
use crate::uow::UnitOfWorkStatus;
use std::fmt;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in EntiWork core operations.
///
/// Calling `commit` or `cancel` twice on a [`crate::StateCommitter`] is not
/// represented here: it panics.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No current state exists for the reference.
    #[error("entity not found: {reference}")]
    EntityNotFound {
        /// The reference that was looked up.
        reference: EntityReference,
    },

    /// The store already holds a state for a reference being created.
    #[error("entity already exists: {reference}")]
    DuplicateEntity {
        /// The reference that already exists.
        reference: EntityReference,
    },

    /// The unit of work already tracks a state for the reference.
    #[error("entity {reference} is already registered in {uow}")]
    DuplicateLocalState {
        /// The reference registered twice.
        reference: EntityReference,
        /// The unit of work holding the first registration.
        uow: UnitOfWorkId,
    },

    /// States read by the unit of work changed version before it completed.
    #[error("concurrent modification: {}", describe_conflicts(.conflicts))]
    ConcurrentModification {
        /// Every conflicting reference with the versions involved.
        conflicts: Vec<VersionConflict>,
    },

    /// The unit of work is not in a status that allows the operation.
    #[error("{uow} is {status}; cannot {operation}")]
    InvalidState {
        /// The unit of work.
        uow: UnitOfWorkId,
        /// Its status at the time of the call.
        status: UnitOfWorkStatus,
        /// The operation that was attempted.
        operation: &'static str,
    },

    /// The backing medium failed; the whole operation may be retried.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] entiwork_storage::StorageError),

    /// Entity state could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] entiwork_codec::CodecError),

    /// The journal is structurally invalid.
    #[error("journal corruption at offset {offset}: {message}")]
    JournalCorruption {
        /// Offset of the offending record.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// A journal record failed its checksum.
    #[error("checksum mismatch at offset {offset}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Offset of the offending record.
        offset: u64,
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// No descriptor is registered for an entity type.
    #[error("unknown entity type: {entity_type}")]
    UnknownEntityType {
        /// The entity type name.
        entity_type: String,
    },

    /// Operation not permitted on the value it was called on.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an entity not found error.
    pub fn entity_not_found(reference: &EntityReference) -> Self {
        Self::EntityNotFound {
            reference: reference.clone(),
        }
    }

    /// Creates a duplicate entity error.
    pub fn duplicate_entity(reference: &EntityReference) -> Self {
        Self::DuplicateEntity {
            reference: reference.clone(),
        }
    }

    /// Creates a journal corruption error.
    pub fn journal_corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            offset,
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns `true` if a fresh unit of work repeating the same logical
    /// operation may succeed. Only optimistic conflicts qualify.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }

    /// Returns `true` for failures of the backing medium.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// References named by a concurrent modification error; empty otherwise.
    #[must_use]
    pub fn conflicting_references(&self) -> Vec<&EntityReference> {
        match self {
            Self::ConcurrentModification { conflicts } => {
                conflicts.iter().map(|c| &c.reference).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// One reference whose version moved underneath a unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConflict {
    /// The conflicting entity.
    pub reference: EntityReference,
    /// Version the unit of work observed.
    pub expected: Version,
    /// Version found in the store; `None` if the entity was removed.
    pub actual: Option<Version>,
}

impl fmt::Display for VersionConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.actual {
            Some(actual) => write!(
                f,
                "{} (expected {}, found {})",
                self.reference, self.expected, actual
            ),
            None => write!(
                f,
                "{} (expected {}, entity removed)",
                self.reference, self.expected
            ),
        }
    }
}

fn describe_conflicts(conflicts: &[VersionConflict]) -> String {
    conflicts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_names_every_reference() {
        let err = CoreError::ConcurrentModification {
            conflicts: vec![
                VersionConflict {
                    reference: EntityReference::from("cargo:ABC"),
                    expected: Version::new(1),
                    actual: Some(Version::new(2)),
                },
                VersionConflict {
                    reference: EntityReference::from("cargo:XYZ"),
                    expected: Version::new(4),
                    actual: None,
                },
            ],
        };

        assert_eq!(
            err.to_string(),
            "concurrent modification: cargo:ABC (expected v1, found v2), \
             cargo:XYZ (expected v4, entity removed)"
        );
        assert!(err.is_retryable());
        assert_eq!(err.conflicting_references().len(), 2);
    }

    #[test]
    fn only_storage_failures_are_transient() {
        let unavailable =
            CoreError::from(entiwork_storage::StorageError::unavailable("disk gone"));
        assert!(unavailable.is_transient());
        assert!(!unavailable.is_retryable());

        let missing = CoreError::entity_not_found(&EntityReference::from("missing:1"));
        assert!(!missing.is_transient());
        assert!(!missing.is_retryable());
        assert!(missing.conflicting_references().is_empty());
    }
}
