//! In-memory store for tests and single-process deployments.

use crate::error::StoreResult;
use crate::glob::KeyPattern;
use crate::keys;
use crate::keyspace::Keyspace;
use crate::store::KeyValueStore;
use crate::ttl::DeletionTtl;
use parking_lot::RwLock;
use std::collections::BTreeSet;

/// A [`KeyValueStore`] backed by an in-process [`Keyspace`].
///
/// Thread-safe; every operation takes the keyspace lock once, so the marker
/// sweep is atomic with respect to concurrent writers.
///
/// # Example
///
/// ```rust
/// use kvdex_storage::{InMemoryStore, KeyValueStore};
///
/// let store = InMemoryStore::new();
/// store.add_index_record("orders:status:OPEN", "42", 0.0).unwrap();
/// let keys = store.query_primary_keys_by_index("orders:status:OPEN", 0, -1).unwrap();
/// assert_eq!(keys, vec!["42".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    keyspace: RwLock<Keyspace>,
    deletion_ttl: DeletionTtl,
}

impl InMemoryStore {
    /// Creates an empty store with the default marker lifetime.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the lifetime range of deletion markers.
    #[must_use]
    pub fn with_deletion_ttl(mut self, ttl: DeletionTtl) -> Self {
        self.deletion_ttl = ttl;
        self
    }

    /// Returns a copy of the whole keyspace.
    ///
    /// Useful for asserting on store state in tests.
    #[must_use]
    pub fn snapshot(&self) -> Keyspace {
        self.keyspace.read().clone()
    }

    /// Number of live keys.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.keyspace.read().len()
    }

    /// Removes every key.
    pub fn clear(&self) {
        *self.keyspace.write() = Keyspace::new();
    }
}

impl KeyValueStore for InMemoryStore {
    fn add_index_record(&self, index_key: &str, primary_key: &str, score: f64) -> StoreResult<()> {
        self.keyspace.write().zadd(index_key, primary_key, score)?;
        Ok(())
    }

    fn add_primary_key_to_index_mapping(
        &self,
        table: &str,
        primary_key: &str,
        index_key: &str,
    ) -> StoreResult<()> {
        let mapping = keys::reverse_mapping_key(table, primary_key);
        self.keyspace.write().sadd(&mapping, index_key)?;
        Ok(())
    }

    fn remove_primary_key_mapping(
        &self,
        table: &str,
        primary_key: &str,
        index_key: &str,
    ) -> StoreResult<()> {
        let mapping = keys::reverse_mapping_key(table, primary_key);
        self.keyspace.write().srem(&mapping, index_key)?;
        Ok(())
    }

    fn query_primary_keys_by_index(
        &self,
        index_key: &str,
        start: i64,
        end: i64,
    ) -> StoreResult<Vec<String>> {
        self.keyspace.read().zrange(index_key, start, end)
    }

    fn mark_for_deletion(&self, scope: &str, primary_key: &str) -> StoreResult<()> {
        let marker = keys::marker_key(scope, primary_key);
        self.keyspace
            .write()
            .set_ex(&marker, primary_key, self.deletion_ttl.sample());
        Ok(())
    }

    fn cleanup_marked_records(&self) -> StoreResult<usize> {
        let applied = self.keyspace.write().sweep_markers()?;
        if applied > 0 {
            tracing::debug!(applied, "applied deletion markers");
        }
        Ok(applied)
    }

    fn remove_index_record(&self, index_key: &str, primary_key: &str) -> StoreResult<()> {
        self.keyspace.write().zrem(index_key, primary_key)?;
        Ok(())
    }

    fn get_primary_key_mappings(
        &self,
        table: &str,
        primary_key: &str,
    ) -> StoreResult<BTreeSet<String>> {
        self.keyspace
            .read()
            .smembers(&keys::reverse_mapping_key(table, primary_key))
    }

    fn add_data_field(
        &self,
        table: &str,
        primary_key: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<()> {
        self.keyspace
            .write()
            .hset(&keys::data_key(table, primary_key), field, value)?;
        Ok(())
    }

    fn remove_data_field(&self, table: &str, primary_key: &str, field: &str) -> StoreResult<()> {
        self.keyspace
            .write()
            .hdel(&keys::data_key(table, primary_key), field)?;
        Ok(())
    }

    fn get_field_value(
        &self,
        table: &str,
        primary_key: &str,
        field: &str,
    ) -> StoreResult<Option<String>> {
        self.keyspace
            .read()
            .hget(&keys::data_key(table, primary_key), field)
    }

    fn get_all_keys(&self, pattern: &str) -> StoreResult<BTreeSet<String>> {
        let pattern = KeyPattern::new(pattern)?;
        Ok(self.keyspace.read().keys(&pattern))
    }
}
