//! Inspect command implementation.

use crate::workspace::Workspace;
use kvdex_storage::{keys, KeyValueStore, StoreResult};
use serde::Serialize;

/// Store contents of one table.
#[derive(Debug, Serialize)]
pub struct TableStats {
    /// Table name.
    pub table: String,
    /// Primary keys with a reverse mapping.
    pub mapped_keys: usize,
    /// Index buckets.
    pub index_keys: usize,
    /// Pending deletion markers.
    pub markers: usize,
    /// Bucket sizes (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buckets: Option<Vec<BucketStats>>,
}

/// Size of one index bucket.
#[derive(Debug, Serialize)]
pub struct BucketStats {
    /// Index key.
    pub key: String,
    /// Number of members.
    pub members: usize,
}

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Keys in the store.
    pub total_keys: usize,
    /// Per-table statistics.
    pub tables: Vec<TableStats>,
    /// Keys matching the requested pattern.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<Vec<String>>,
}

fn table_stats(store: &dyn KeyValueStore, table: &str, show_buckets: bool) -> StoreResult<TableStats> {
    let mut stats = TableStats {
        table: table.to_string(),
        mapped_keys: 0,
        index_keys: 0,
        markers: 0,
        buckets: show_buckets.then(Vec::new),
    };

    for key in store.get_all_keys(&format!("{table}_*"))? {
        if keys::is_marker_key(&key) {
            stats.markers += 1;
        } else if keys::primary_key_from_mapping_key(table, &key).is_some() {
            stats.mapped_keys += 1;
        }
    }
    for key in store.get_all_keys(&format!("{table}:*"))? {
        if keys::is_marker_key(&key) {
            stats.markers += 1;
            continue;
        }
        if key.matches(':').count() < 2 {
            continue;
        }
        stats.index_keys += 1;
        if let Some(buckets) = stats.buckets.as_mut() {
            let members = store.query_primary_keys_by_index(&key, 0, -1)?.len();
            buckets.push(BucketStats { key, members });
        }
    }
    Ok(stats)
}

/// Collects statistics for every table in the workspace.
pub fn collect(
    workspace: &Workspace,
    show_buckets: bool,
    pattern: Option<&str>,
) -> StoreResult<InspectResult> {
    let store = workspace.store.as_ref();
    let mut tables = Vec::new();
    for table in workspace.registry.snapshot().tables() {
        tables.push(table_stats(store, &table, show_buckets)?);
    }
    let matched = match pattern {
        Some(pattern) => Some(store.get_all_keys(pattern)?.into_iter().collect()),
        None => None,
    };
    Ok(InspectResult {
        total_keys: workspace.store.key_count(),
        tables,
        matched,
    })
}

/// Runs the inspect command.
pub fn run(
    workspace: &Workspace,
    show_buckets: bool,
    pattern: Option<&str>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = collect(workspace, show_buckets, pattern)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Store Inspection");
    println!("================");
    println!("Total keys: {}", result.total_keys);
    for table in &result.tables {
        println!();
        println!("{}", table.table);
        println!("  Mapped keys:  {}", table.mapped_keys);
        println!("  Index keys:   {}", table.index_keys);
        println!("  Markers:      {}", table.markers);
        if let Some(buckets) = &table.buckets {
            for bucket in buckets {
                println!("    {:<40} {:>6}", bucket.key, bucket.members);
            }
        }
    }
    if let Some(matched) = &result.matched {
        println!();
        println!("Matched keys ({}):", matched.len());
        for key in matched {
            println!("  {key}");
        }
    }
}
