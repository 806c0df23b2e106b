//! kvdex CLI
//!
//! Command-line tools for inspecting kvdex indexes built from JSON files.
//!
//! # Commands
//!
//! - `query` - Show how a query is planned and which keys it resolves to
//! - `inspect` - Display index statistics
//! - `sync` - Reconcile the index against a source rows file

mod commands;
mod workspace;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use workspace::Workspace;

/// kvdex command-line index tools.
#[derive(Parser)]
#[command(name = "kvdex")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a JSON array of index schemas
    #[arg(global = true, short, long)]
    schema: Option<PathBuf>,

    /// Path to a JSON object of table rows to index
    #[arg(global = true, short, long)]
    rows: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan and run a query against the index
    Query {
        /// Table to query
        #[arg(short, long)]
        table: String,

        /// Equality condition, `field=value` (repeatable)
        #[arg(short = 'w', long = "where")]
        conditions: Vec<String>,

        /// Ordering, `field` or `field:desc` (repeatable)
        #[arg(short, long)]
        order_by: Vec<String>,

        /// Grouping field (repeatable)
        #[arg(short, long)]
        group_by: Vec<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Display index statistics
    Inspect {
        /// Show every bucket with its size
        #[arg(short, long)]
        buckets: bool,

        /// List keys matching a glob pattern
        #[arg(short, long)]
        pattern: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Reconcile the index against a source rows file
    Sync {
        /// Path to the source rows file
        #[arg(long)]
        source: PathBuf,

        /// Sync mode (full, incremental)
        #[arg(short, long, default_value = "full")]
        mode: String,

        /// High-water mark for incremental sync, `%Y-%m-%d %H:%M:%S`
        #[arg(long)]
        since: Option<String>,

        /// Apply deletion markers afterwards
        #[arg(short, long)]
        cleanup: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
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
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let load = || -> Result<Workspace, Box<dyn std::error::Error>> {
        let schema = cli.schema.as_deref().ok_or("--schema is required")?;
        Ok(Workspace::load(schema, cli.rows.as_deref())?)
    };

    match &cli.command {
        Commands::Query {
            table,
            conditions,
            order_by,
            group_by,
            format,
        } => {
            commands::query::run(&load()?, table, conditions, order_by, group_by, format)?;
        }
        Commands::Inspect {
            buckets,
            pattern,
            format,
        } => {
            commands::inspect::run(&load()?, *buckets, pattern.as_deref(), format)?;
        }
        Commands::Sync {
            source,
            mode,
            since,
            cleanup,
            format,
        } => {
            commands::sync::run(&load()?, source, mode, since.as_deref(), *cleanup, format)?;
        }
        Commands::Version => {
            println!("kvdex CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
