//! EntiWork CLI
//!
//! Command-line tools for EntiWork journal files.
//!
//! # Commands
//!
//! - `inspect` - Display journal statistics and the entities it holds
//! - `verify` - Verify checksums and that the journal replays cleanly
//! - `dump` - Dump journal records for debugging

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// EntiWork command-line journal tools.
#[derive(Parser)]
#[command(name = "entiwork")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the journal file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display journal statistics
    Inspect {
        /// List every live entity
        #[arg(short, long)]
        entities: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify journal integrity
    Verify,

    /// Dump journal records for debugging
    Dump {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Start from this sequence number
        #[arg(short, long, default_value = "1")]
        from: u64,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { entities, format } => {
            let path = cli.path.ok_or("Journal path required for inspect")?;
            commands::inspect::run(&path, entities, format.parse()?)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Journal path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Dump {
            limit,
            from,
            format,
        } => {
            let path = cli.path.ok_or("Journal path required for dump")?;
            commands::dump::run(&path, limit, from, format.parse()?)?;
        }
        Commands::Version => {
            println!("EntiWork CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Journal format v{}", entiwork_core::journal::JOURNAL_FORMAT);
        }
    }

    Ok(())
}
