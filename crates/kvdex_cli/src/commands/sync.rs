//! Sync command implementation.

use crate::workspace::{load_rows, CliError, Workspace};
use chrono::NaiveDateTime;
use kvdex_sync_engine::{MemorySource, RetryConfig, RunSummary, SyncConfig, SyncEngine};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Outcome of one table's sync.
#[derive(Debug, Serialize)]
pub struct TableOutcome {
    /// Table name.
    pub table: String,
    /// Rows re-indexed.
    pub reindexed: usize,
    /// Records soft-deleted.
    pub removed: usize,
    /// Source row count, full sync only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_count: Option<u64>,
    /// Store key count before the run, full sync only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_count: Option<u64>,
    /// Whether the table was skipped.
    pub skipped: bool,
}

/// Sync command result.
#[derive(Debug, Serialize)]
pub struct SyncOutcome {
    /// `full` or `incremental`.
    pub mode: String,
    /// Per-table outcomes.
    pub tables: Vec<TableOutcome>,
    /// Failed tables with their errors.
    pub failures: Vec<(String, String)>,
    /// Markers applied by the cleanup pass, if it ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markers_applied: Option<usize>,
}

fn outcome(mode: &str, summary: RunSummary) -> SyncOutcome {
    SyncOutcome {
        mode: mode.to_string(),
        tables: summary
            .reports
            .into_iter()
            .map(|r| TableOutcome {
                table: r.table,
                reindexed: r.reindexed,
                removed: r.removed,
                source_count: r.drift.map(|d| d.source_count),
                store_count: r.drift.map(|d| d.store_count),
                skipped: r.skipped,
            })
            .collect(),
        failures: summary.failures,
        markers_applied: None,
    }
}

/// Loads `source` as the authoritative tables and reconciles the
/// workspace store against them.
pub fn reconcile(
    workspace: &Workspace,
    source: &Path,
    mode: &str,
    since: Option<&str>,
    cleanup: bool,
) -> Result<SyncOutcome, CliError> {
    let memory = Arc::new(MemorySource::new());
    for (table, rows) in load_rows(source)? {
        let Some(schema) = workspace.registry.get(&table) else {
            continue;
        };
        memory.create_table(&table, schema.indexed_fields());
        for row in rows {
            memory.upsert(&table, &schema.primary_key, row);
        }
    }
    for table in workspace.registry.snapshot().tables() {
        memory.create_table(&table, std::iter::empty::<String>());
    }

    let config = SyncConfig::new().with_retry(RetryConfig::no_retry());
    let engine = SyncEngine::new(
        config,
        workspace.store.clone(),
        memory,
        workspace.registry.clone(),
    );

    let mut result = match mode {
        "full" => outcome(mode, engine.run_full()),
        "incremental" => {
            if let Some(since) = since {
                let format = engine.config().timestamp_format.clone();
                let mark = NaiveDateTime::parse_from_str(since, &format).map_err(|e| {
                    CliError::Argument(format!("--since {since:?} does not match {format}: {e}"))
                })?;
                for table in workspace.registry.snapshot().tables() {
                    engine.set_high_water_mark(&table, mark);
                }
            }
            outcome(mode, engine.run_incremental())
        }
        other => return Err(CliError::Argument(format!("unknown sync mode {other:?}"))),
    };

    if cleanup {
        result.markers_applied = Some(engine.run_cleanup()?);
    }
    Ok(result)
}

/// Runs the sync command.
pub fn run(
    workspace: &Workspace,
    source: &Path,
    mode: &str,
    since: Option<&str>,
    cleanup: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = reconcile(workspace, source, mode, since, cleanup)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &SyncOutcome) {
    println!("Sync ({})", result.mode);
    for table in &result.tables {
        if table.skipped {
            println!("  {:<24} skipped", table.table);
            continue;
        }
        print!(
            "  {:<24} reindexed {:>6}  removed {:>6}",
            table.table, table.reindexed, table.removed
        );
        if let (Some(source), Some(store)) = (table.source_count, table.store_count) {
            print!("  (source {source}, store {store})");
        }
        println!();
    }
    for (table, error) in &result.failures {
        println!("  {table:<24} FAILED: {error}");
    }
    if let Some(applied) = result.markers_applied {
        println!("Markers applied: {applied}");
    }
}
