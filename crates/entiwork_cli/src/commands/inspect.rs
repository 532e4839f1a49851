//! Inspect command implementation.

use super::{format_size, load_journal, CliError, OutputFormat};
use entiwork_core::journal::JournalScan;
use entiwork_core::Version;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Journal inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Journal path.
    pub path: String,
    /// Journal size in bytes.
    pub journal_size: u64,
    /// Number of complete records.
    pub record_count: usize,
    /// Bytes after the last complete record.
    pub torn_bytes: u64,
    /// Sequence number of the last record.
    pub last_sequence: u64,
    /// Commit time of the last record, in milliseconds since the epoch.
    pub last_commit_ms: Option<u64>,
    /// Number of live entities after replay.
    pub entity_count: usize,
    /// Number of removals recorded.
    pub removal_count: usize,
    /// Live entities per entity type.
    pub entity_types: BTreeMap<String, usize>,
    /// Live entities (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<EntitySummary>>,
}

/// One live entity.
#[derive(Debug, Serialize)]
pub struct EntitySummary {
    /// Reference.
    pub reference: String,
    /// Entity type.
    pub entity_type: String,
    /// Current version.
    pub version: u64,
}

/// Runs the inspect command.
pub fn run(path: &Path, show_entities: bool, format: OutputFormat) -> Result<(), CliError> {
    let (size, scan) = load_journal(path)?;
    debug!(records = scan.entries.len(), "journal loaded");

    let mut result = summarize(&scan, show_entities);
    result.path = path.display().to_string();
    result.journal_size = size;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_text_output(&result),
    }
    Ok(())
}

/// Folds the journal's records into the live entity set.
pub fn summarize(scan: &JournalScan, show_entities: bool) -> InspectResult {
    let mut live: BTreeMap<String, (String, Version)> = BTreeMap::new();
    let mut retired: BTreeMap<String, Version> = BTreeMap::new();
    let mut removal_count = 0;

    for entry in &scan.entries {
        let record = &entry.record;
        for state in &record.new_states {
            let reference = state.reference().to_string();
            let version = retired
                .remove(&reference)
                .map_or(Version::INITIAL, Version::next);
            live.insert(reference, (state.entity_type().to_string(), version));
        }
        for state in &record.updated_states {
            if let Some((_, version)) = live.get_mut(state.reference().as_str()) {
                *version = version.next();
            }
        }
        for removed in &record.removed {
            if let Some((_, version)) = live.remove(removed.reference.as_str()) {
                retired.insert(removed.reference.to_string(), version);
            }
            removal_count += 1;
        }
    }

    let mut entity_types = BTreeMap::new();
    for (entity_type, _) in live.values() {
        *entity_types.entry(entity_type.clone()).or_insert(0) += 1;
    }

    let last = scan.entries.last().map(|e| &e.record);
    InspectResult {
        path: String::new(),
        journal_size: scan.valid_len + scan.torn_bytes,
        record_count: scan.entries.len(),
        torn_bytes: scan.torn_bytes,
        last_sequence: last.map_or(0, |r| r.sequence),
        last_commit_ms: last.map(|r| r.committed_at.as_millis()),
        entity_count: live.len(),
        removal_count,
        entity_types,
        entities: show_entities.then(|| {
            live.into_iter()
                .map(|(reference, (entity_type, version))| EntitySummary {
                    reference,
                    entity_type,
                    version: version.as_u64(),
                })
                .collect()
        }),
    }
}

fn print_text_output(result: &InspectResult) {
    println!("EntiWork Journal Inspection");
    println!("===========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Journal:");
    println!("  Size:          {}", format_size(result.journal_size));
    println!("  Records:       {}", result.record_count);
    println!("  Last sequence: {}", result.last_sequence);
    if let Some(ms) = result.last_commit_ms {
        println!("  Last commit:   {}ms", ms);
    }
    if result.torn_bytes > 0 {
        println!("  Torn tail:     {} (dropped on next open)", format_size(result.torn_bytes));
    }
    println!();
    println!("Entities:");
    println!("  Live:     {}", result.entity_count);
    println!("  Removals: {}", result.removal_count);
    for (entity_type, count) in &result.entity_types {
        println!("  [{}] {}", entity_type, count);
    }

    if let Some(entities) = &result.entities {
        println!();
        for entity in entities {
            println!(
                "  {} ({}) v{}",
                entity.reference, entity.entity_type, entity.version
            );
        }
    }
}
