//! Invariant checkers over the store contract.
//!
//! The checkers only use [`KeyValueStore`] operations, so they work
//! against any implementation. Primary keys and field values must not
//! contain `:`.

use kvdex_storage::{keys, KeyValueStore, StoreResult};
use std::collections::{BTreeMap, BTreeSet};

/// Index keys of `table` currently present in the store.
pub fn index_keys(store: &dyn KeyValueStore, table: &str) -> StoreResult<BTreeSet<String>> {
    Ok(store
        .get_all_keys(&format!("{table}:*"))?
        .into_iter()
        .filter(|key| !keys::is_marker_key(key))
        .filter(|key| key.matches(':').count() >= 2)
        .collect())
}

/// Primary keys of `table` with a reverse mapping.
pub fn mapped_primary_keys(store: &dyn KeyValueStore, table: &str) -> StoreResult<BTreeSet<String>> {
    Ok(store
        .get_all_keys(&format!("{table}_*"))?
        .iter()
        .filter(|key| !keys::is_marker_key(key))
        .filter_map(|key| keys::primary_key_from_mapping_key(table, key))
        .map(str::to_string)
        .collect())
}

/// Index contents of one table: every index key with its members in
/// score order, and every reverse mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDump {
    /// Index key to ordered members.
    pub entries: BTreeMap<String, Vec<String>>,
    /// Primary key to mapped index keys.
    pub mappings: BTreeMap<String, BTreeSet<String>>,
}

/// Reads the index contents of `table`.
pub fn dump_index(store: &dyn KeyValueStore, table: &str) -> StoreResult<IndexDump> {
    let mut dump = IndexDump::default();
    for key in index_keys(store, table)? {
        let members = store.query_primary_keys_by_index(&key, 0, -1)?;
        dump.entries.insert(key, members);
    }
    for pk in mapped_primary_keys(store, table)? {
        let mapped = store.get_primary_key_mappings(table, &pk)?;
        dump.mappings.insert(pk, mapped);
    }
    Ok(dump)
}

/// Checks that an index key lists a primary key exactly when the primary
/// key's reverse mapping lists the index key.
///
/// Returns a description of the first violation found.
pub fn check_reverse_mapping(store: &dyn KeyValueStore, table: &str) -> Result<(), String> {
    let dump = dump_index(store, table).map_err(|e| format!("store read failed: {e}"))?;

    for (index_key, members) in &dump.entries {
        let unique: BTreeSet<&String> = members.iter().collect();
        if unique.len() != members.len() {
            return Err(format!("{index_key} lists a member twice"));
        }
        for pk in members {
            let mapped = dump.mappings.get(pk).is_some_and(|m| m.contains(index_key));
            if !mapped {
                return Err(format!("{index_key} contains {pk} but its mapping does not"));
            }
        }
    }
    for (pk, mapped) in &dump.mappings {
        for index_key in mapped {
            let listed = dump
                .entries
                .get(index_key)
                .is_some_and(|members| members.contains(pk));
            if !listed {
                return Err(format!("mapping of {pk} names {index_key} which does not contain it"));
            }
        }
    }
    Ok(())
}
