//! The key-value store contract.

use crate::error::StoreResult;
use std::collections::BTreeSet;

/// Storage operations required by the index planner, indexer and sync engine.
///
/// Implementations hold the derived index structures described in
/// [`crate::keys`]. Callers are written only against this trait, so any two
/// implementations agreeing on the key formats are interchangeable.
///
/// # Invariants
///
/// - Absence is never an error: unknown keys yield empty collections or `None`.
/// - `add_index_record` is an upsert. A primary key appears at most once per
///   index key; re-adding it moves its score.
/// - Every operation is idempotent and safe to call concurrently. The last
///   write to a given `(index_key, primary_key)` pair wins.
/// - Only connectivity or backing-service failures return `Err`.
pub trait KeyValueStore: Send + Sync {
    /// Adds `primary_key` to the ordered set at `index_key` with `score`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing service fails.
    fn add_index_record(&self, index_key: &str, primary_key: &str, score: f64) -> StoreResult<()>;

    /// Adds `index_key` to the reverse mapping of `(table, primary_key)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing service fails.
    fn add_primary_key_to_index_mapping(
        &self,
        table: &str,
        primary_key: &str,
        index_key: &str,
    ) -> StoreResult<()>;

    /// Removes `index_key` from the reverse mapping of `(table, primary_key)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing service fails.
    fn remove_primary_key_mapping(
        &self,
        table: &str,
        primary_key: &str,
        index_key: &str,
    ) -> StoreResult<()>;

    /// Returns primary keys at `index_key` by ascending score within the rank
    /// window `[start, end]`.
    ///
    /// Negative ranks count from the end, so `(0, -1)` is the whole bucket.
    /// Equal scores are ordered by primary key.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing service fails.
    fn query_primary_keys_by_index(
        &self,
        index_key: &str,
        start: i64,
        end: i64,
    ) -> StoreResult<Vec<String>>;

    /// Writes a deletion marker for `primary_key` within `scope`.
    ///
    /// `scope` is a table name (the whole record) or an index key (one
    /// membership). The marker lives for a randomized, bounded duration.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing service fails.
    fn mark_for_deletion(&self, scope: &str, primary_key: &str) -> StoreResult<()>;

    /// Physically removes everything referenced by live deletion markers,
    /// then the markers themselves. Returns the number of markers applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing service fails.
    fn cleanup_marked_records(&self) -> StoreResult<usize>;

    /// Removes `primary_key` from the ordered set at `index_key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing service fails.
    fn remove_index_record(&self, index_key: &str, primary_key: &str) -> StoreResult<()>;

    /// Returns the index keys currently containing `(table, primary_key)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing service fails.
    fn get_primary_key_mappings(&self, table: &str, primary_key: &str)
        -> StoreResult<BTreeSet<String>>;

    /// Sets one field of the data hash of `(table, primary_key)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing service fails.
    fn add_data_field(
        &self,
        table: &str,
        primary_key: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<()>;

    /// Clears one field of the data hash of `(table, primary_key)`. No-op if
    /// the field is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing service fails.
    fn remove_data_field(&self, table: &str, primary_key: &str, field: &str) -> StoreResult<()>;

    /// Reads one field of the data hash of `(table, primary_key)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing service fails.
    fn get_field_value(
        &self,
        table: &str,
        primary_key: &str,
        field: &str,
    ) -> StoreResult<Option<String>>;

    /// Returns every stored key matching the glob `pattern`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is invalid or the backing service fails.
    fn get_all_keys(&self, pattern: &str) -> StoreResult<BTreeSet<String>>;
}
