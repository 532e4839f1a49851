//! CLI command implementations.

pub mod dump;
pub mod inspect;
pub mod verify;

use entiwork_core::journal::{self, JournalScan};
use entiwork_core::CoreError;
use entiwork_storage::{FileBackend, StorageError};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// No journal file at the given path.
    #[error("no journal found at {0}")]
    NotFound(String),

    /// The journal could not be read.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The journal is malformed or does not replay.
    #[error("{0}")]
    Core(#[from] CoreError),

    /// Output could not be produced.
    #[error("output error: {0}")]
    Output(#[from] serde_json::Error),

    /// Unrecognised `--format` value.
    #[error("unknown output format '{0}' (expected text or json)")]
    UnknownFormat(String),

    /// Verification found problems.
    #[error("verification failed")]
    VerificationFailed,
}

/// Output format shared by the commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl FromStr for OutputFormat {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(CliError::UnknownFormat(other.to_string())),
        }
    }
}

/// Reads every complete record of the journal at `path`.
///
/// The file is opened but never modified.
pub fn load_journal(path: &Path) -> Result<(u64, JournalScan), CliError> {
    if !path.is_file() {
        return Err(CliError::NotFound(path.display().to_string()));
    }
    let backend = FileBackend::open(path)?;
    let size = entiwork_storage::StorageBackend::size(&backend)?;
    let scan = journal::scan(&backend)?;
    Ok((size, scan))
}

/// Formats a byte count for display.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
