//! Dump command implementation.

use super::{load_journal, CliError, OutputFormat};
use entiwork_core::journal::JournalEntry;
use serde::Serialize;
use std::path::Path;

/// Printable form of one journal record.
#[derive(Debug, Serialize)]
pub struct RecordInfo {
    /// Byte offset in the journal.
    pub offset: u64,
    /// Record sequence number.
    pub sequence: u64,
    /// Commit time in milliseconds since the epoch.
    pub committed_at: u64,
    /// Entities created, as `reference (type)`.
    pub created: Vec<String>,
    /// Entities updated, as `reference (expected version)`.
    pub updated: Vec<String>,
    /// Entities removed, as `reference (expected version)`.
    pub removed: Vec<String>,
}

impl From<&JournalEntry> for RecordInfo {
    fn from(entry: &JournalEntry) -> Self {
        let record = &entry.record;
        Self {
            offset: entry.offset,
            sequence: record.sequence,
            committed_at: record.committed_at.as_millis(),
            created: record
                .new_states
                .iter()
                .map(|s| format!("{} ({})", s.reference(), s.entity_type()))
                .collect(),
            updated: record
                .updated_states
                .iter()
                .map(|s| format!("{} ({})", s.reference(), s.version()))
                .collect(),
            removed: record
                .removed
                .iter()
                .map(|r| format!("{} ({})", r.reference, r.expected))
                .collect(),
        }
    }
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    from_sequence: u64,
    format: OutputFormat,
) -> Result<(), CliError> {
    let (_, scan) = load_journal(path)?;
    let records = select(&scan.entries, limit, from_sequence);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        OutputFormat::Text => print_text_output(&records),
    }

    if scan.has_torn_tail() {
        eprintln!("note: {} torn bytes after the last record", scan.torn_bytes);
    }
    Ok(())
}

/// Picks records at or after `from_sequence`, at most `limit` of them.
pub fn select(entries: &[JournalEntry], limit: Option<usize>, from_sequence: u64) -> Vec<RecordInfo> {
    entries
        .iter()
        .filter(|e| e.record.sequence >= from_sequence)
        .take(limit.unwrap_or(usize::MAX))
        .map(RecordInfo::from)
        .collect()
}

fn print_text_output(records: &[RecordInfo]) {
    println!("Journal Records");
    println!("===============");
    println!();

    for record in records {
        println!(
            "#{:<6} @{:<8} at {}ms",
            record.sequence, record.offset, record.committed_at
        );
        for created in &record.created {
            println!("    + {}", created);
        }
        for updated in &record.updated {
            println!("    ~ {}", updated);
        }
        for removed in &record.removed {
            println!("    - {}", removed);
        }
    }

    println!();
    println!("Total: {} records", records.len());
}
