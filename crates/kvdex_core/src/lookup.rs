//! Index bucket lookups shared by the planner and the write path.

use crate::schema::IndexSchema;
use crate::statement::Predicate;
use kvdex_storage::{keys, KeyValueStore, StoreResult};
use std::collections::HashSet;

/// One index bucket to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    /// Fields constrained by this bucket.
    pub fields: Vec<String>,
    /// The bucket key.
    pub index_key: String,
}

/// Equalities on fields accepted by `accept`, in predicate order.
///
/// A field constrained twice keeps its first position and its last value.
/// `NULL` comparisons are ignored.
pub(crate) fn extract_equalities(
    predicate: &Predicate,
    accept: impl Fn(&str) -> bool,
) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    for (column, literal) in predicate.equalities() {
        if !accept(column) {
            continue;
        }
        let Some(value) = literal.to_value() else {
            continue;
        };
        match out.iter_mut().find(|(field, _)| field == column) {
            Some(slot) => slot.1 = value,
            None => out.push((column.to_string(), value)),
        }
    }
    out
}

/// Single-field lookups for the `equalities` whose field has buckets of its
/// own, followed by a composite lookup for every composite index whose fields
/// are all constrained.
pub(crate) fn build_lookups(
    schema: &IndexSchema,
    equalities: &[(String, String)],
    include_unique: bool,
    include_composite: bool,
) -> Vec<Lookup> {
    let mut lookups: Vec<Lookup> = equalities
        .iter()
        .filter(|(field, _)| schema.has_own_bucket(field))
        .map(|(field, value)| Lookup {
            fields: vec![field.clone()],
            index_key: keys::index_key(&schema.table_name, field, value),
        })
        .collect();

    if include_composite {
        for index in schema.indexes.iter().filter(|i| i.is_composite()) {
            if index.unique && !include_unique {
                continue;
            }
            let values: Option<Vec<(&str, &str)>> = index
                .fields
                .iter()
                .map(|field| {
                    equalities
                        .iter()
                        .find(|(f, _)| f == field)
                        .map(|(f, v)| (f.as_str(), v.as_str()))
                })
                .collect();
            if let Some(pairs) = values {
                lookups.push(Lookup {
                    fields: index.fields.clone(),
                    index_key: keys::composite_index_key(&schema.table_name, pairs),
                });
            }
        }
    }
    lookups
}

/// Reads every member of a bucket in score order.
pub(crate) fn fetch_bucket(store: &dyn KeyValueStore, index_key: &str) -> StoreResult<Vec<String>> {
    store.query_primary_keys_by_index(index_key, 0, -1)
}

/// Keeps members of `base` present in every other list, in `base` order.
pub(crate) fn intersect(base: Vec<String>, others: &[Vec<String>]) -> Vec<String> {
    let sets: Vec<HashSet<&str>> = others
        .iter()
        .map(|list| list.iter().map(String::as_str).collect())
        .collect();
    base.into_iter()
        .filter(|key| sets.iter().all(|set| set.contains(key.as_str())))
        .collect()
}
