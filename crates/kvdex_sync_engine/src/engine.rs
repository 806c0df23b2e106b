//! Reconciliation between source tables and the index store.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::source::{Comparison, SourceTable};
use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use kvdex_core::{Indexer, SchemaRegistry};
use kvdex_storage::{keys, KeyValueStore};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Which reconciliation a run performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Rows modified since the table's high-water mark.
    Incremental,
    /// Primary-key set difference between source and store.
    Full,
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Completed incremental runs.
    pub incremental_runs: u64,
    /// Completed full runs.
    pub full_runs: u64,
    /// Completed marker sweeps.
    pub cleanup_runs: u64,
    /// Rows re-indexed from the source.
    pub rows_reindexed: u64,
    /// Store records soft-deleted because the source lost them.
    pub rows_removed: u64,
    /// Markers applied by sweeps.
    pub markers_applied: u64,
    /// Per-table runs that failed.
    pub table_failures: u64,
    /// Total number of retries.
    pub retries: u64,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Row-count comparison made by a full sync.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Drift {
    /// Rows in the source table.
    pub source_count: u64,
    /// Primary keys inventoried in the store.
    pub store_count: u64,
    /// `|source - store| / source`; 1.0 when the source is empty but the
    /// store is not.
    pub ratio: f64,
    /// Whether `ratio` is below the configured threshold.
    pub within_threshold: bool,
}

/// Outcome of one table's sync run.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Table synced.
    pub table: String,
    /// Kind of run.
    pub mode: SyncMode,
    /// Rows re-indexed.
    pub reindexed: usize,
    /// Store records soft-deleted.
    pub removed: usize,
    /// Batches fetched from the source.
    pub batches: usize,
    /// Count comparison (full runs only).
    pub drift: Option<Drift>,
    /// True when the table was skipped, e.g. no last-modified column.
    pub skipped: bool,
    /// Duration of the run.
    pub duration: Duration,
}

impl SyncReport {
    fn new(table: &str, mode: SyncMode) -> Self {
        Self {
            table: table.to_string(),
            mode,
            reindexed: 0,
            removed: 0,
            batches: 0,
            drift: None,
            skipped: false,
            duration: Duration::ZERO,
        }
    }
}

/// Outcome of a run over every registered table.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Reports of tables that synced.
    pub reports: Vec<SyncReport>,
    /// Tables that failed, with the error message.
    pub failures: Vec<(String, String)>,
    /// True if the run stopped early because of cancellation.
    pub cancelled: bool,
}

impl RunSummary {
    /// Returns true if every table synced.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    /// Report for `table`, if it synced.
    pub fn report(&self, table: &str) -> Option<&SyncReport> {
        self.reports.iter().find(|r| r.table == table)
    }
}

/// Keeps the index store consistent with the source tables.
///
/// Store writes go through the same [`Indexer`] the live write path uses,
/// so a run may overlap with application writes.
pub struct SyncEngine {
    config: SyncConfig,
    store: Arc<dyn KeyValueStore>,
    source: Arc<dyn SourceTable>,
    registry: Arc<SchemaRegistry>,
    indexer: Indexer,
    high_water_marks: RwLock<HashMap<String, NaiveDateTime>>,
    stats: RwLock<SyncStats>,
    cancelled: AtomicBool,
}

impl SyncEngine {
    /// Creates a new sync engine.
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn KeyValueStore>,
        source: Arc<dyn SourceTable>,
        registry: Arc<SchemaRegistry>,
    ) -> Self {
        let indexer = Indexer::new(Arc::clone(&store), Arc::clone(&registry));
        Self::with_indexer(config, source, indexer)
    }

    /// Creates a sync engine that writes through an existing indexer.
    pub fn with_indexer(config: SyncConfig, source: Arc<dyn SourceTable>, indexer: Indexer) -> Self {
        Self {
            config,
            store: Arc::clone(indexer.store()),
            source,
            registry: Arc::clone(indexer.registry()),
            indexer,
            high_water_marks: RwLock::new(HashMap::new()),
            stats: RwLock::new(SyncStats::default()),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Cancels any ongoing sync operation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Resets the cancelled flag.
    pub fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Returns true if the engine has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// High-water mark of `table`, if an incremental run has completed.
    pub fn high_water_mark(&self, table: &str) -> Option<NaiveDateTime> {
        self.high_water_marks.read().get(table).copied()
    }

    /// Overrides the high-water mark of `table`.
    pub fn set_high_water_mark(&self, table: &str, mark: NaiveDateTime) {
        self.high_water_marks.write().insert(table.to_string(), mark);
    }

    /// Runs an incremental sync over every registered table.
    ///
    /// A failing table is logged and recorded; the remaining tables still
    /// sync.
    pub fn run_incremental(&self) -> RunSummary {
        let summary = self.run_each(SyncMode::Incremental, |table| self.sync_table_incremental(table));
        self.stats.write().incremental_runs += 1;
        summary
    }

    /// Runs a full reconciliation over every registered table.
    pub fn run_full(&self) -> RunSummary {
        let summary = self.run_each(SyncMode::Full, |table| self.sync_table_full(table));
        self.stats.write().full_runs += 1;
        summary
    }

    /// Applies the deletion markers still present; expired markers have
    /// already vanished. Returns the number applied.
    pub fn run_cleanup(&self) -> SyncResult<usize> {
        let applied = self.with_retry(|| Ok(self.store.cleanup_marked_records()?))?;
        let mut stats = self.stats.write();
        stats.cleanup_runs += 1;
        stats.markers_applied += applied as u64;
        if applied > 0 {
            info!(applied, "deletion markers applied");
        }
        Ok(applied)
    }

    fn run_each(
        &self,
        mode: SyncMode,
        sync_table: impl Fn(&str) -> SyncResult<SyncReport>,
    ) -> RunSummary {
        let mut summary = RunSummary::default();
        for table in self.registry.snapshot().tables() {
            match sync_table(&table) {
                Ok(report) => summary.reports.push(report),
                Err(SyncError::Cancelled) => {
                    info!(?mode, table = %table, "sync cancelled");
                    summary.cancelled = true;
                    break;
                }
                Err(e) => {
                    warn!(?mode, table = %table, error = %e, "table sync failed");
                    let mut stats = self.stats.write();
                    stats.table_failures += 1;
                    stats.last_error = Some(format!("{table}: {e}"));
                    summary.failures.push((table, e.to_string()));
                }
            }
        }
        summary
    }

    /// Re-indexes rows of `table` modified since its high-water mark, then
    /// advances the mark to the current time.
    ///
    /// # Errors
    ///
    /// Returns an error if the source or store fails after retries, or if
    /// the run is cancelled. The high-water mark only moves on success.
    pub fn sync_table_incremental(&self, table: &str) -> SyncResult<SyncReport> {
        let start = Instant::now();
        let schema = self
            .registry
            .get(table)
            .ok_or_else(|| SyncError::UnknownTable(table.to_string()))?;
        let mut report = SyncReport::new(table, SyncMode::Incremental);
        let field = self.config.last_modified_field.as_str();

        if !self.with_retry(|| Ok(self.source.has_column(table, field)?))? {
            debug!(table, field, "no last-modified column, skipping incremental sync");
            report.skipped = true;
            return Ok(report);
        }

        let since = self.high_water_mark(table).unwrap_or_else(|| {
            Utc::now().naive_utc() - lookback(self.config.initial_lookback)
        });
        let since_text = since.format(&self.config.timestamp_format).to_string();
        let changed = self.with_retry(|| {
            Ok(self.source.select_where(
                table,
                &schema.primary_key,
                field,
                Comparison::Gt,
                &since_text,
                field,
            )?)
        })?;

        report.reindexed = self.reindex_keys(table, &schema.primary_key, &changed, &mut report.batches)?;
        self.set_high_water_mark(table, Utc::now().naive_utc());

        report.duration = start.elapsed();
        if report.reindexed > 0 {
            info!(table, since = %since_text, rows = report.reindexed, "incremental sync complete");
        } else {
            debug!(table, since = %since_text, "incremental sync found no changes");
        }
        Ok(report)
    }

    /// Reconciles the primary keys of `table` between source and store:
    /// keys only in the source are indexed, keys only in the store are
    /// soft-deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the source or store fails after retries, or if
    /// the run is cancelled.
    pub fn sync_table_full(&self, table: &str) -> SyncResult<SyncReport> {
        let start = Instant::now();
        let schema = self
            .registry
            .get(table)
            .ok_or_else(|| SyncError::UnknownTable(table.to_string()))?;
        let mut report = SyncReport::new(table, SyncMode::Full);

        let source_count = self.with_retry(|| Ok(self.source.count(table)?))?;
        let stored = self.store_primary_keys(table)?;
        let drift = self.drift(source_count, stored.len() as u64);
        report.drift = Some(drift);
        if drift.within_threshold {
            debug!(table, source_count, store_count = drift.store_count, "counts agree, verifying keys");
        } else {
            warn!(
                table,
                source_count,
                store_count = drift.store_count,
                ratio = drift.ratio,
                "large drift between source and index, repairing"
            );
        }

        self.check_cancelled()?;
        let source_keys: BTreeSet<String> = self
            .with_retry(|| Ok(self.source.select_column(table, &schema.primary_key)?))?
            .into_iter()
            .collect();

        let missing: Vec<String> = source_keys.difference(&stored).cloned().collect();
        report.reindexed = self.reindex_keys(table, &schema.primary_key, &missing, &mut report.batches)?;

        for pk in stored.difference(&source_keys) {
            self.check_cancelled()?;
            self.with_retry(|| Ok(self.indexer.soft_delete(table, pk)?))?;
            report.removed += 1;
        }

        {
            let mut stats = self.stats.write();
            stats.rows_removed += report.removed as u64;
        }
        report.duration = start.elapsed();
        info!(
            table,
            reindexed = report.reindexed,
            removed = report.removed,
            "full sync complete"
        );
        Ok(report)
    }

    /// Primary keys of `table` with a reverse mapping in the store.
    ///
    /// Keys belonging to another registered table whose name extends this
    /// one (`orders` vs `orders_archive`) are excluded.
    pub fn store_primary_keys(&self, table: &str) -> SyncResult<BTreeSet<String>> {
        let prefix = format!("{table}_");
        let shadowing: Vec<String> = self
            .registry
            .snapshot()
            .tables()
            .into_iter()
            .filter(|other| other != table && other.starts_with(&prefix))
            .map(|other| format!("{other}_"))
            .collect();

        let found = self.with_retry(|| Ok(self.store.get_all_keys(&format!("{prefix}*"))?))?;
        Ok(found
            .iter()
            .filter(|key| !keys::is_marker_key(key))
            .filter(|key| !shadowing.iter().any(|p| key.starts_with(p.as_str())))
            .filter_map(|key| keys::primary_key_from_mapping_key(table, key))
            .map(str::to_string)
            .collect())
    }

    fn drift(&self, source_count: u64, store_count: u64) -> Drift {
        let ratio = if source_count == 0 {
            if store_count == 0 {
                0.0
            } else {
                1.0
            }
        } else {
            source_count.abs_diff(store_count) as f64 / source_count as f64
        };
        Drift {
            source_count,
            store_count,
            ratio,
            within_threshold: ratio < self.config.drift_threshold || source_count == store_count,
        }
    }

    fn reindex_keys(
        &self,
        table: &str,
        key_column: &str,
        pks: &[String],
        batches: &mut usize,
    ) -> SyncResult<usize> {
        let mut reindexed = 0;
        for batch in pks.chunks(self.config.batch_size.max(1)) {
            self.check_cancelled()?;
            let rows = self.with_retry(|| Ok(self.source.select_rows(table, key_column, batch)?))?;
            for row in &rows {
                self.with_retry(|| Ok(self.indexer.reindex_row(table, row)?))?;
            }
            *batches += 1;
            reindexed += rows.len();
            self.stats.write().rows_reindexed += rows.len() as u64;
            debug!(table, batch = *batches, rows = rows.len(), "batch re-indexed");
        }
        Ok(reindexed)
    }

    fn with_retry<T>(&self, mut op: impl FnMut() -> SyncResult<T>) -> SyncResult<T> {
        let retry_config = &self.config.retry;
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                std::thread::sleep(retry_config.delay_for_attempt(attempt));
                self.stats.write().retries += 1;
            }
            self.check_cancelled()?;

            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < retry_config.max_attempts => {
                    debug!(attempt, error = %e, "retrying after transient failure");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn lookback(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or_else(|_| ChronoDuration::days(1))
}
