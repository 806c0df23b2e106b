//! Key formats shared by every store implementation.
//!
//! These layouts are a compatibility contract: two stores that agree on them
//! can be swapped for one another.
//!
//! | structure | key |
//! |-----------|-----|
//! | index bucket (ordered set) | `table:field:value[:field:value...]` |
//! | reverse mapping (set) | `table_primaryKey` |
//! | data hash | `table:primaryKey` |
//! | deletion marker (string) | `<scope>_primaryKey_deleted` |

/// Suffix appended to every deletion marker key.
pub const MARKER_SUFFIX: &str = "_deleted";

/// Builds the key of a single-field index bucket.
#[must_use]
pub fn index_key(table: &str, field: &str, value: &str) -> String {
    format!("{table}:{field}:{value}")
}

/// Builds the key of a composite index bucket.
///
/// Pairs are appended in the order given, which must be the field
/// declaration order of the index.
#[must_use]
pub fn composite_index_key<'a, I>(table: &str, pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut key = String::from(table);
    for (field, value) in pairs {
        key.push(':');
        key.push_str(field);
        key.push(':');
        key.push_str(value);
    }
    key
}

/// Builds the key of the reverse mapping set for a primary key.
#[must_use]
pub fn reverse_mapping_key(table: &str, primary_key: &str) -> String {
    format!("{table}_{primary_key}")
}

/// Builds the key of the data hash for a primary key.
#[must_use]
pub fn data_key(table: &str, primary_key: &str) -> String {
    format!("{table}:{primary_key}")
}

/// Builds the deletion marker key for `primary_key` within `scope`.
///
/// `scope` is either a table name (the whole record) or an index key
/// (a single index membership).
#[must_use]
pub fn marker_key(scope: &str, primary_key: &str) -> String {
    format!("{scope}_{primary_key}{MARKER_SUFFIX}")
}

/// Returns true if `key` is a deletion marker.
#[must_use]
pub fn is_marker_key(key: &str) -> bool {
    key.ends_with(MARKER_SUFFIX)
}

/// Returns the table prefix of an index key.
#[must_use]
pub fn table_of_index_key(index_key: &str) -> Option<&str> {
    index_key.split_once(':').map(|(table, _)| table)
}

/// Extracts the primary key from a reverse mapping key of `table`.
///
/// Marker keys and keys of other tables yield `None`.
#[must_use]
pub fn primary_key_from_mapping_key<'a>(table: &str, key: &'a str) -> Option<&'a str> {
    if is_marker_key(key) {
        return None;
    }
    key.strip_prefix(table)
        .and_then(|rest| rest.strip_prefix('_'))
        .filter(|pk| !pk.is_empty())
}

/// What a deletion marker refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkedEntry {
    /// The whole record: reverse mapping, index memberships and data hash.
    Record {
        /// Table name.
        table: String,
        /// Primary key.
        primary_key: String,
    },
    /// One membership of a primary key in one index bucket.
    IndexEntry {
        /// Index bucket key.
        index_key: String,
        /// Table the bucket belongs to.
        table: String,
        /// Primary key.
        primary_key: String,
    },
}

/// Decodes a marker from its key and stored value.
///
/// The marker value is the primary key itself, so the scope is recovered by
/// stripping `_<pk>_deleted` and never by splitting on `_` (table names may
/// contain underscores).
#[must_use]
pub fn parse_marker(key: &str, value: &str) -> Option<MarkedEntry> {
    let scope = key
        .strip_suffix(MARKER_SUFFIX)?
        .strip_suffix(value)?
        .strip_suffix('_')?;
    if scope.is_empty() || value.is_empty() {
        return None;
    }

    match table_of_index_key(scope) {
        Some(table) => Some(MarkedEntry::IndexEntry {
            index_key: scope.to_string(),
            table: table.to_string(),
            primary_key: value.to_string(),
        }),
        None => Some(MarkedEntry::Record {
            table: scope.to_string(),
            primary_key: value.to_string(),
        }),
    }
}
