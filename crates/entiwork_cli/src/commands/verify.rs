//! Verify command implementation.

use super::CliError;
use entiwork_core::journal;
use entiwork_core::{JournaledStateStore, StateStore};
use entiwork_storage::{FileBackend, InMemoryBackend, StorageBackend};
use std::path::Path;
use tracing::info;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of records whose checksum passed.
    pub valid_records: usize,
    /// Bytes after the last complete record.
    pub torn_bytes: u64,
    /// Live entities after a full replay.
    pub entities: usize,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), CliError> {
    println!("Verifying journal at {:?}", path);
    println!();

    if !path.is_file() {
        return Err(CliError::NotFound(path.display().to_string()));
    }
    let backend = FileBackend::open(path)?;
    let result = verify_journal(&backend)?;
    print_result(&result);

    println!();
    if result.is_ok() {
        println!("✓ Journal verification passed");
        Ok(())
    } else {
        println!("✗ Journal verification failed");
        Err(CliError::VerificationFailed)
    }
}

/// Checks every record's framing and checksum, then replays the journal
/// into a scratch store to confirm each batch still applies.
///
/// The backend is only read.
pub fn verify_journal(backend: &dyn StorageBackend) -> Result<VerifyResult, CliError> {
    let bytes = backend.read_all()?;
    let mut result = VerifyResult::default();

    match journal::decode_records(&bytes) {
        Ok(scan) => {
            result.valid_records = scan.entries.len();
            result.torn_bytes = scan.torn_bytes;
        }
        Err(e) => {
            result.errors.push(e.to_string());
            return Ok(result);
        }
    }

    match JournaledStateStore::open(Box::new(InMemoryBackend::with_data(bytes)), false) {
        Ok(store) => result.entities = store.stats().entities,
        Err(e) => result.errors.push(e.to_string()),
    }

    info!(
        records = result.valid_records,
        errors = result.errors.len(),
        "journal verified"
    );
    Ok(result)
}

fn print_result(result: &VerifyResult) {
    println!("  Records checked: {}", result.valid_records);
    println!("  Live entities:   {}", result.entities);
    if result.torn_bytes > 0 {
        println!("  Torn tail:       {} bytes (dropped on next open)", result.torn_bytes);
    }
    if !result.errors.is_empty() {
        println!("  Errors:");
        for error in &result.errors {
            println!("    - {}", error);
        }
    }
}
