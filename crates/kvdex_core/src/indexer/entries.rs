//! Index entries produced by one row.

use crate::schema::{IndexDefinition, IndexSchema};
use crate::statement::Row;
use kvdex_storage::keys;
use std::collections::BTreeMap;

/// Score of a row within `index`: the numeric value of its sort field, else 0.
#[must_use]
pub fn score(index: &IndexDefinition, row: &Row) -> f64 {
    index
        .sort_field
        .as_deref()
        .and_then(|field| row.get(field))
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|score| score.is_finite())
        .unwrap_or(0.0)
}

/// Every index key `row` belongs to, with its score.
///
/// - Composite indexes produce one key, and only if every field is present.
///   Their values are used verbatim.
/// - Single-field values containing `delimiter` fan out into one key per
///   trimmed, non-empty token.
/// - The version field gets its own key with score 0.
#[must_use]
pub fn index_entries(schema: &IndexSchema, row: &Row, delimiter: char) -> BTreeMap<String, f64> {
    let table = schema.table_name.as_str();
    let mut entries = BTreeMap::new();

    for index in &schema.indexes {
        let score = score(index, row);
        if index.is_composite() {
            let pairs: Option<Vec<(&str, &str)>> = index
                .fields
                .iter()
                .map(|field| row.get(field).map(|value| (field.as_str(), value.as_str())))
                .collect();
            if let Some(pairs) = pairs {
                entries.insert(keys::composite_index_key(table, pairs), score);
            }
            continue;
        }

        let Some(field) = index.fields.first() else {
            continue;
        };
        let Some(value) = row.get(field) else {
            continue;
        };
        if value.contains(delimiter) {
            for token in value.split(delimiter).map(str::trim).filter(|t| !t.is_empty()) {
                entries.insert(keys::index_key(table, field, token), score);
            }
        } else {
            entries.insert(keys::index_key(table, field, value), score);
        }
    }

    if let Some(version) = schema.version_field() {
        if let Some(value) = row.get(version) {
            entries.insert(keys::index_key(table, version, value), 0.0);
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn schema() -> IndexSchema {
        IndexSchema::new("t", "id")
            .with_index(IndexDefinition::new("tags", ["tags"]).with_sort_field("rank"))
            .with_index(IndexDefinition::new("ab", ["a", "b"]).with_sort_field("rank"))
    }

    #[test]
    fn fan_out_and_composite() {
        let entries = index_entries(
            &schema(),
            &row(&[("tags", "x, y,,z"), ("a", "1,2"), ("b", "q"), ("rank", "7"), ("jpa_version", "3")]),
            ',',
        );
        let expected: Vec<(&str, f64)> = vec![
            ("t:a:1,2:b:q", 7.0),
            ("t:jpa_version:3", 0.0),
            ("t:tags:x", 7.0),
            ("t:tags:y", 7.0),
            ("t:tags:z", 7.0),
        ];
        let actual: Vec<(&str, f64)> = entries.iter().map(|(k, s)| (k.as_str(), *s)).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn partial_composite_is_skipped() {
        let entries = index_entries(&schema(), &row(&[("a", "1")]), ',');
        assert!(entries.is_empty());
    }

    #[test]
    fn unparseable_sort_value_scores_zero() {
        let entries = index_entries(&schema(), &row(&[("tags", "x"), ("rank", "soon")]), ',');
        assert_eq!(entries.get("t:tags:x"), Some(&0.0));
    }
}
