//! Write-path index maintenance.
//!
//! The [`Indexer`] keeps the store in line with INSERT, UPDATE and DELETE
//! statements once they have been executed against the source table.
//!
//! Within one write the data hash is written first, then index entries, then
//! reverse mappings: a reader that finds an index entry can always resolve
//! its data, and a reader that finds none falls back to the source.
//!
//! Store failures never escape: they are logged and reported as a zero count.
//! The one hard error is [`CoreError::SchemaViolation`], raised when an UPDATE
//! or DELETE cannot be tied to the index at all.

mod entries;
mod version;

pub use entries::{index_entries, score};

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::lookup;
use crate::schema::{IndexSchema, SchemaRegistry};
use crate::statement::{
    column_name, DeleteStatement, InsertStatement, Predicate, Row, UpdateStatement,
};
use kvdex_storage::{keys, KeyValueStore, StoreResult};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use version::VersionOutcome;

/// Keeps index structures consistent with source-table writes.
pub struct Indexer {
    store: Arc<dyn KeyValueStore>,
    registry: Arc<SchemaRegistry>,
    config: Config,
}

impl Indexer {
    /// Creates an indexer with the default configuration.
    pub fn new(store: Arc<dyn KeyValueStore>, registry: Arc<SchemaRegistry>) -> Self {
        Self::with_config(store, registry, Config::default())
    }

    /// Creates an indexer with `config`.
    pub fn with_config(
        store: Arc<dyn KeyValueStore>,
        registry: Arc<SchemaRegistry>,
        config: Config,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// The store being maintained.
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// The schema registry in use.
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Indexes an inserted row. Returns the number of structures written.
    ///
    /// Returns 0 without touching the store when the table has no schema, the
    /// statement omits the version field, the values cannot be matched to
    /// columns, or the primary key is generated by the source. In the last
    /// case call [`Indexer::insert_with_generated_key`] once the key is known.
    pub fn insert(&self, stmt: &InsertStatement) -> usize {
        self.insert_row(stmt, None)
    }

    /// Indexes an inserted row whose primary key was generated by the source.
    pub fn insert_with_generated_key(&self, stmt: &InsertStatement, key: &str) -> usize {
        self.insert_row(stmt, Some(key))
    }

    fn insert_row(&self, stmt: &InsertStatement, generated: Option<&str>) -> usize {
        let Some(schema) = self.registry.get(&stmt.table) else {
            tracing::debug!(table = %stmt.table, "no index schema, skipping insert");
            return 0;
        };
        let Some((columns, mut row)) = extract_row(&schema, stmt, generated.is_some()) else {
            tracing::debug!(table = %stmt.table, "insert values do not match columns");
            return 0;
        };
        if let Some(version) = schema.version_field() {
            if !columns.iter().any(|c| c == version) {
                tracing::debug!(table = %stmt.table, version, "insert lacks version field");
                return 0;
            }
        }
        if let Some(key) = generated {
            row.insert(schema.primary_key.clone(), key.to_string());
        }
        let Some(pk) = row.get(&schema.primary_key).cloned() else {
            tracing::debug!(table = %stmt.table, "primary key not known yet, deferring");
            return 0;
        };

        match self.write_row(&schema, &pk, &row) {
            Ok(written) => written,
            Err(e) => {
                tracing::warn!(table = %stmt.table, pk = %pk, error = %e, "insert indexing failed");
                0
            }
        }
    }

    /// Indexes a row given as a field map. Returns the number of structures
    /// written, or 0 if the table is unknown or the row lacks its primary key.
    pub fn index_row(&self, table: &str, row: &Row) -> usize {
        let Some(schema) = self.registry.get(table) else {
            return 0;
        };
        let Some(pk) = row.get(&schema.primary_key) else {
            return 0;
        };
        match self.write_row(&schema, pk, row) {
            Ok(written) => written,
            Err(e) => {
                tracing::warn!(table, pk = %pk, error = %e, "row indexing failed");
                0
            }
        }
    }

    /// Brings the index entries of `row` in line with its current values.
    ///
    /// Unlike [`Indexer::index_row`], index keys left in the reverse mapping
    /// that the row no longer produces are removed, and store errors are
    /// returned instead of logged.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] if the store fails.
    pub fn reindex_row(&self, table: &str, row: &Row) -> CoreResult<usize> {
        let Some(schema) = self.registry.get(table) else {
            return Ok(0);
        };
        let Some(pk) = row.get(&schema.primary_key) else {
            return Ok(0);
        };

        let wanted = index_entries(&schema, row, self.config.multi_value_delimiter);
        let current = self.store.get_primary_key_mappings(table, pk)?;
        let mut removed = 0;
        for stale in current.iter().filter(|k| !wanted.contains_key(*k)) {
            if keys::table_of_index_key(stale) != Some(table) {
                continue;
            }
            self.store.remove_index_record(stale, pk)?;
            self.store.remove_primary_key_mapping(table, pk, stale)?;
            removed += 1;
        }
        Ok(self.write_row(&schema, pk, row)? + removed)
    }

    fn write_row(&self, schema: &IndexSchema, pk: &str, row: &Row) -> StoreResult<usize> {
        let table = schema.table_name.as_str();
        for (field, value) in row {
            self.store.add_data_field(table, pk, field, value)?;
        }
        let entries = index_entries(schema, row, self.config.multi_value_delimiter);
        for (index_key, score) in &entries {
            self.store.add_index_record(index_key, pk, *score)?;
        }
        for index_key in entries.keys() {
            self.store.add_primary_key_to_index_mapping(table, pk, index_key)?;
        }
        Ok(usize::from(!row.is_empty()) + entries.len())
    }

    /// Re-indexes the rows touched by an UPDATE. Returns the number of
    /// structures written; 0 also reports a version conflict.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SchemaViolation`] if the WHERE clause references
    /// neither the primary key nor an indexed field.
    pub fn update(&self, stmt: &UpdateStatement) -> CoreResult<usize> {
        let Some(schema) = self.registry.get(&stmt.table) else {
            return Ok(0);
        };
        let Some(targets) = self.resolve_targets(&schema, stmt.predicate.as_ref(), "UPDATE")? else {
            return Ok(0);
        };

        let mut written = 0;
        for pk in targets {
            match self.update_one(&schema, stmt, &pk) {
                Ok(n) => written += n,
                Err(e) => {
                    tracing::warn!(table = %stmt.table, pk = %pk, error = %e, "update indexing failed");
                    break;
                }
            }
        }
        Ok(written)
    }

    fn update_one(&self, schema: &IndexSchema, stmt: &UpdateStatement, pk: &str) -> StoreResult<usize> {
        let table = schema.table_name.as_str();
        let mut changes = Row::new();
        // Fields set to NULL or to a value only the source can compute.
        let mut cleared: BTreeSet<&str> = BTreeSet::new();

        for assignment in &stmt.assignments {
            let column = column_name(&assignment.column);
            if column == schema.primary_key {
                tracing::debug!(table, "ignoring primary key assignment");
                continue;
            }
            if schema.version_field() == Some(column) {
                let guard = stmt
                    .predicate
                    .as_ref()
                    .and_then(|p| p.equality_on(column))
                    .and_then(|l| l.to_value());
                let stored = self.store.get_field_value(table, pk, column)?;
                match version::check(column, &assignment.value, guard.as_deref(), stored.as_deref()) {
                    VersionOutcome::Accept(Some(next)) => {
                        changes.insert(column.to_string(), next);
                    }
                    VersionOutcome::Accept(None) => {}
                    VersionOutcome::Conflict { expected, stored } => {
                        tracing::warn!(table, pk, %expected, %stored, "version conflict, index not updated");
                        return Ok(0);
                    }
                }
                continue;
            }
            match assignment.value.literal_value() {
                Some(value) => {
                    cleared.remove(column);
                    changes.insert(column.to_string(), value);
                }
                None => {
                    changes.remove(column);
                    cleared.insert(column);
                }
            }
        }
        if changes.is_empty() && cleared.is_empty() {
            return Ok(0);
        }

        let mut before = Row::new();
        for field in schema.tracked_fields() {
            if let Some(value) = self.store.get_field_value(table, pk, field)? {
                before.insert(field.to_string(), value);
            }
        }
        let mut after = before.clone();
        after.extend(changes.clone());
        for field in &cleared {
            after.remove(*field);
        }

        let delimiter = self.config.multi_value_delimiter;
        let old_entries = index_entries(schema, &before, delimiter);
        let new_entries = index_entries(schema, &after, delimiter);
        let upserts: BTreeMap<&String, f64> = new_entries
            .iter()
            .filter(|(key, score)| old_entries.get(*key) != Some(*score))
            .map(|(key, score)| (key, *score))
            .collect();

        for (field, value) in &changes {
            self.store.add_data_field(table, pk, field, value)?;
        }
        for field in &cleared {
            self.store.remove_data_field(table, pk, field)?;
        }
        let mut removed = 0;
        for stale in old_entries.keys().filter(|k| !new_entries.contains_key(*k)) {
            self.store.remove_index_record(stale, pk)?;
            self.store.remove_primary_key_mapping(table, pk, stale)?;
            removed += 1;
        }
        for (index_key, score) in &upserts {
            self.store.add_index_record(index_key, pk, *score)?;
        }
        for index_key in upserts.keys() {
            self.store.add_primary_key_to_index_mapping(table, pk, index_key)?;
        }
        Ok(1 + removed + upserts.len())
    }

    /// Soft-deletes the rows matched by a DELETE. Returns the number of
    /// primary keys marked.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SchemaViolation`] if the WHERE clause references
    /// neither the primary key nor an indexed field.
    pub fn delete(&self, stmt: &DeleteStatement) -> CoreResult<usize> {
        let Some(schema) = self.registry.get(&stmt.table) else {
            return Ok(0);
        };
        let Some(targets) = self.resolve_targets(&schema, stmt.predicate.as_ref(), "DELETE")? else {
            return Ok(0);
        };

        let mut marked = 0;
        for pk in targets {
            if let Err(e) = self.mark_deleted(&schema.table_name, &pk) {
                tracing::warn!(table = %stmt.table, pk = %pk, error = %e, "soft delete failed");
                break;
            }
            marked += 1;
        }
        Ok(marked)
    }

    /// Marks a record and each of its index memberships for deletion.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] if the store fails.
    pub fn soft_delete(&self, table: &str, pk: &str) -> CoreResult<()> {
        Ok(self.mark_deleted(table, pk)?)
    }

    fn mark_deleted(&self, table: &str, pk: &str) -> StoreResult<()> {
        self.store.mark_for_deletion(table, pk)?;
        for index_key in self.store.get_primary_key_mappings(table, pk)? {
            self.store.mark_for_deletion(&index_key, pk)?;
        }
        Ok(())
    }

    /// Primary keys a WHERE clause targets. `Ok(None)` means the store could
    /// not be read.
    fn resolve_targets(
        &self,
        schema: &IndexSchema,
        predicate: Option<&Predicate>,
        verb: &str,
    ) -> CoreResult<Option<Vec<String>>> {
        let table = schema.table_name.as_str();
        let Some(predicate) = predicate else {
            return Err(CoreError::schema_violation(table, format!("{verb} without WHERE clause")));
        };
        if let Some(pk) = predicate
            .equality_on(&schema.primary_key)
            .and_then(|l| l.to_value())
        {
            return Ok(Some(vec![pk]));
        }

        let equalities = lookup::extract_equalities(predicate, |c| schema.is_indexed_field(c));
        if equalities.is_empty() {
            return Err(CoreError::schema_violation(
                table,
                format!(
                    "{verb} WHERE clause must reference primary key {} or an indexed field",
                    schema.primary_key
                ),
            ));
        }

        let lookups = lookup::build_lookups(schema, &equalities, true, true);
        if lookups.is_empty() {
            tracing::debug!(table, "{verb} constrains only part of a composite index");
            return Ok(Some(Vec::new()));
        }
        let mut lists = Vec::new();
        for bucket in lookups {
            match lookup::fetch_bucket(self.store.as_ref(), &bucket.index_key) {
                Ok(members) if members.is_empty() && bucket.fields.len() == 1 => {
                    return Ok(Some(Vec::new()));
                }
                // Composite buckets are absent for rows indexed before the
                // index was declared; they only narrow when present.
                Ok(members) if members.is_empty() => {}
                Ok(members) => lists.push(members),
                Err(e) => {
                    tracing::warn!(table, error = %e, "could not resolve {verb} targets");
                    return Ok(None);
                }
            }
        }
        let mut lists = lists.into_iter();
        let Some(base) = lists.next() else {
            return Ok(Some(Vec::new()));
        };
        let others: Vec<Vec<String>> = lists.collect();
        Ok(Some(lookup::intersect(base, &others)))
    }
}

/// Matches INSERT values to columns. Returns the column list used and the
/// non-null literal values.
fn extract_row(
    schema: &IndexSchema,
    stmt: &InsertStatement,
    key_generated: bool,
) -> Option<(Vec<String>, Row)> {
    let columns: Vec<String> = match &stmt.columns {
        Some(columns) => columns.iter().map(|c| column_name(c).to_string()).collect(),
        None => {
            let inferred = schema.inferred_columns();
            let skip = if stmt.values.len() == inferred.len() {
                0
            } else if key_generated && stmt.values.len() + 1 == inferred.len() {
                1
            } else {
                return None;
            };
            inferred[skip..].iter().map(|c| c.to_string()).collect()
        }
    };
    if columns.len() != stmt.values.len() {
        return None;
    }

    let row = columns
        .iter()
        .zip(&stmt.values)
        .filter_map(|(column, expr)| expr.literal_value().map(|v| (column.clone(), v)))
        .collect();
    Some((columns, row))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::IndexDefinition;
    use crate::statement::{Expr, Literal};
    use kvdex_storage::{CommandStore, InMemoryStore, LoopbackClient};

    fn schema() -> IndexSchema {
        IndexSchema::new("orders", "id")
            .with_index(IndexDefinition::new("status_idx", ["status"]).with_sort_field("amount"))
            .with_index(IndexDefinition::new("tags_idx", ["tags"]))
            .with_index(IndexDefinition::new("region_status_idx", ["region", "status"]))
    }

    fn setup() -> (Arc<InMemoryStore>, Indexer) {
        let store = Arc::new(InMemoryStore::new());
        let registry = Arc::new(SchemaRegistry::with_schemas(vec![schema()]).unwrap());
        (Arc::clone(&store), Indexer::new(store, registry))
    }

    fn insert(id: &str, status: &str) -> InsertStatement {
        InsertStatement::new(
            "orders",
            ["id", "jpa_version", "status", "amount", "region"],
            vec![
                Expr::lit(id),
                Expr::lit(1),
                Expr::lit(status),
                Expr::lit(10),
                Expr::lit("EU"),
            ],
        )
    }

    fn members(store: &InMemoryStore, key: &str) -> Vec<String> {
        store.query_primary_keys_by_index(key, 0, -1).unwrap()
    }

    #[test]
    fn insert_writes_hash_entries_and_mappings() {
        let (store, indexer) = setup();
        // data hash + status + composite + version
        assert_eq!(indexer.insert(&insert("1", "OPEN")), 4);
        assert_eq!(members(&store, "orders:status:OPEN"), vec!["1"]);
        assert_eq!(members(&store, "orders:region:EU:status:OPEN"), vec!["1"]);
        assert_eq!(members(&store, "orders:jpa_version:1"), vec!["1"]);
        assert_eq!(store.get_primary_key_mappings("orders", "1").unwrap().len(), 3);
        assert_eq!(store.get_field_value("orders", "1", "amount").unwrap().as_deref(), Some("10"));
    }

    #[test]
    fn insert_without_version_is_ineligible() {
        let (store, indexer) = setup();
        let stmt = InsertStatement::new("orders", ["id", "status"], vec![Expr::lit("1"), Expr::lit("OPEN")]);
        assert_eq!(indexer.insert(&stmt), 0);
        assert_eq!(store.key_count(), 0);
    }

    #[test]
    fn insert_with_inferred_columns() {
        let (store, indexer) = setup();
        // id, jpa_version, status, tags, region
        let stmt = InsertStatement::positional(
            "orders",
            vec![Expr::lit("7"), Expr::lit(1), Expr::lit("NEW"), Expr::lit("a,b"), Expr::lit("US")],
        );
        assert!(indexer.insert(&stmt) > 0);
        assert_eq!(members(&store, "orders:tags:a"), vec!["7"]);
        assert_eq!(members(&store, "orders:tags:b"), vec!["7"]);

        let short = InsertStatement::positional("orders", vec![Expr::lit("8")]);
        assert_eq!(indexer.insert(&short), 0);
    }

    #[test]
    fn generated_key_is_deferred() {
        let (store, indexer) = setup();
        let stmt = InsertStatement::new(
            "orders",
            ["jpa_version", "status"],
            vec![Expr::lit(1), Expr::lit("OPEN")],
        );
        assert_eq!(indexer.insert(&stmt), 0);
        assert_eq!(store.key_count(), 0);

        assert!(indexer.insert_with_generated_key(&stmt, "99") > 0);
        assert_eq!(members(&store, "orders:status:OPEN"), vec!["99"]);

        let positional = InsertStatement::positional(
            "orders",
            vec![Expr::lit(1), Expr::lit("HELD"), Expr::lit("x"), Expr::lit("EU")],
        );
        assert!(indexer.insert_with_generated_key(&positional, "100") > 0);
        assert_eq!(members(&store, "orders:status:HELD"), vec!["100"]);
    }

    #[test]
    fn update_moves_entries() {
        let (store, indexer) = setup();
        indexer.insert(&insert("1", "OPEN"));

        let stmt = UpdateStatement::new("orders")
            .set("status", Expr::lit("CLOSED"))
            .filter(Predicate::eq("id", "1"));
        assert!(indexer.update(&stmt).unwrap() > 0);

        assert!(members(&store, "orders:status:OPEN").is_empty());
        assert!(members(&store, "orders:region:EU:status:OPEN").is_empty());
        assert_eq!(members(&store, "orders:status:CLOSED"), vec!["1"]);
        assert_eq!(members(&store, "orders:region:EU:status:CLOSED"), vec!["1"]);
        let mappings = store.get_primary_key_mappings("orders", "1").unwrap();
        assert!(mappings.contains("orders:status:CLOSED"));
        assert!(!mappings.contains("orders:status:OPEN"));
    }

    #[test]
    fn update_of_unindexed_field_only_rewrites_hash() {
        let (store, indexer) = setup();
        indexer.insert(&insert("1", "OPEN"));
        let stmt = UpdateStatement::new("orders")
            .set("note", Expr::lit("hello"))
            .filter(Predicate::eq("id", "1"));
        assert_eq!(indexer.update(&stmt).unwrap(), 1);
        assert_eq!(store.get_field_value("orders", "1", "note").unwrap().as_deref(), Some("hello"));
    }

    #[test]
    fn update_rescores_on_sort_field_change() {
        let (store, indexer) = setup();
        indexer.insert(&insert("1", "OPEN"));
        indexer.insert(&insert("2", "OPEN"));
        let stmt = UpdateStatement::new("orders")
            .set("amount", Expr::lit(1))
            .filter(Predicate::eq("id", "2"));
        indexer.update(&stmt).unwrap();
        assert_eq!(members(&store, "orders:status:OPEN"), vec!["2", "1"]);
    }

    #[test]
    fn update_by_index_field() {
        let (store, indexer) = setup();
        indexer.insert(&insert("1", "OPEN"));
        indexer.insert(&insert("2", "OPEN"));
        indexer.insert(&insert("3", "HELD"));

        let stmt = UpdateStatement::new("orders")
            .set("status", Expr::lit("CLOSED"))
            .filter(Predicate::eq("status", "OPEN"));
        indexer.update(&stmt).unwrap();
        assert_eq!(members(&store, "orders:status:CLOSED"), vec!["1", "2"]);
        assert_eq!(members(&store, "orders:status:HELD"), vec!["3"]);
    }

    #[test]
    fn update_to_null_leaves_old_bucket() {
        let (store, indexer) = setup();
        indexer.insert(&insert("1", "OPEN"));

        let stmt = UpdateStatement::new("orders")
            .set("status", Expr::lit(Literal::Null))
            .filter(Predicate::eq("id", "1"));
        assert!(indexer.update(&stmt).unwrap() > 0);

        assert!(members(&store, "orders:status:OPEN").is_empty());
        assert!(members(&store, "orders:region:EU:status:OPEN").is_empty());
        assert_eq!(store.get_field_value("orders", "1", "status").unwrap(), None);
        let mappings = store.get_primary_key_mappings("orders", "1").unwrap();
        assert!(!mappings.contains("orders:status:OPEN"));
        assert!(mappings.contains("orders:jpa_version:1"));
    }

    #[test]
    fn update_with_opaque_value_drops_old_entries() {
        let (store, indexer) = setup();
        indexer.insert(&insert("1", "OPEN"));

        let stmt = UpdateStatement::new("orders")
            .set("status", Expr::Other("UPPER(status)".into()))
            .filter(Predicate::eq("id", "1"));
        assert!(indexer.update(&stmt).unwrap() > 0);

        assert!(members(&store, "orders:status:OPEN").is_empty());
        assert_eq!(store.get_field_value("orders", "1", "status").unwrap(), None);
        assert_eq!(members(&store, "orders:jpa_version:1"), vec!["1"]);
    }

    fn composite_only() -> (Arc<InMemoryStore>, Indexer) {
        let schema = IndexSchema::new("events", "id")
            .with_index(IndexDefinition::new("region_status_idx", ["region", "status"]));
        let store = Arc::new(InMemoryStore::new());
        let registry = Arc::new(SchemaRegistry::with_schemas(vec![schema]).unwrap());
        let indexer = Indexer::new(Arc::clone(&store) as Arc<dyn KeyValueStore>, registry);
        let stmt = InsertStatement::new(
            "events",
            ["id", "jpa_version", "region", "status"],
            vec![Expr::lit("1"), Expr::lit(1), Expr::lit("EU"), Expr::lit("OPEN")],
        );
        assert!(indexer.insert(&stmt) > 0);
        (store, indexer)
    }

    fn by_region_and_status() -> Predicate {
        Predicate::eq("region", "EU").and(Predicate::eq("status", "OPEN"))
    }

    #[test]
    fn update_by_composite_only_fields() {
        let (store, indexer) = composite_only();
        let stmt = UpdateStatement::new("events")
            .set("status", Expr::lit("CLOSED"))
            .filter(by_region_and_status());
        assert!(indexer.update(&stmt).unwrap() > 0);
        assert!(members(&store, "events:region:EU:status:OPEN").is_empty());
        assert_eq!(members(&store, "events:region:EU:status:CLOSED"), vec!["1"]);

        let partial = UpdateStatement::new("events")
            .set("status", Expr::lit("OPEN"))
            .filter(Predicate::eq("region", "EU"));
        assert_eq!(indexer.update(&partial).unwrap(), 0);
    }

    #[test]
    fn delete_by_composite_only_fields() {
        let (store, indexer) = composite_only();
        let stmt = DeleteStatement::new("events", by_region_and_status());
        assert_eq!(indexer.delete(&stmt).unwrap(), 1);

        let markers = store.get_all_keys("*_deleted").unwrap();
        assert!(markers.contains("events_1_deleted"));
        assert!(markers.contains("events:region:EU:status:OPEN_1_deleted"));

        store.cleanup_marked_records().unwrap();
        assert!(members(&store, "events:region:EU:status:OPEN").is_empty());
    }

    #[test]
    fn update_requires_indexed_where() {
        let (_, indexer) = setup();
        let stmt = UpdateStatement::new("orders")
            .set("status", Expr::lit("X"))
            .filter(Predicate::eq("note", "n"));
        assert!(indexer.update(&stmt).unwrap_err().is_schema_violation());

        let stmt = UpdateStatement::new("orders").set("status", Expr::lit("X"));
        assert!(indexer.update(&stmt).unwrap_err().is_schema_violation());
    }

    #[test]
    fn version_increment_and_conflict() {
        let (store, indexer) = setup();
        indexer.insert(&insert("1", "OPEN"));

        let bump = UpdateStatement::new("orders")
            .set("jpa_version", Expr::col("jpa_version").plus(Expr::lit(1)))
            .set("status", Expr::lit("PAID"))
            .filter(Predicate::eq("id", "1"));
        assert!(indexer.update(&bump).unwrap() > 0);
        assert_eq!(store.get_field_value("orders", "1", "jpa_version").unwrap().as_deref(), Some("2"));
        assert!(members(&store, "orders:jpa_version:1").is_empty());
        assert_eq!(members(&store, "orders:jpa_version:2"), vec!["1"]);

        let stale = UpdateStatement::new("orders")
            .set("jpa_version", Expr::lit(2))
            .set("status", Expr::lit("LOST"))
            .filter(Predicate::eq("id", "1").and(Predicate::eq("jpa_version", 1)));
        assert_eq!(indexer.update(&stale).unwrap(), 0);
        assert_eq!(members(&store, "orders:status:PAID"), vec!["1"]);
        assert!(members(&store, "orders:status:LOST").is_empty());
    }

    #[test]
    fn delete_marks_record_and_entries() {
        let (store, indexer) = setup();
        indexer.insert(&insert("1", "OPEN"));

        let stmt = DeleteStatement::new("orders", Predicate::eq("id", "1"));
        assert_eq!(indexer.delete(&stmt).unwrap(), 1);

        let markers = store.get_all_keys("*_deleted").unwrap();
        assert!(markers.contains("orders_1_deleted"));
        assert!(markers.contains("orders:status:OPEN_1_deleted"));
        assert_eq!(markers.len(), 4);
        assert_eq!(members(&store, "orders:status:OPEN"), vec!["1"]);

        store.cleanup_marked_records().unwrap();
        assert!(members(&store, "orders:status:OPEN").is_empty());
        assert_eq!(store.key_count(), 0);
    }

    #[test]
    fn delete_requires_resolvable_key() {
        let (_, indexer) = setup();
        let stmt = DeleteStatement::new("orders", Predicate::Other("amount > 3".into()));
        assert!(indexer.delete(&stmt).unwrap_err().is_schema_violation());

        let stmt = DeleteStatement::new("orders", Predicate::eq("status", "NONE"));
        assert_eq!(indexer.delete(&stmt).unwrap(), 0);

        let stmt = DeleteStatement::new("unknown", Predicate::eq("x", Literal::Null));
        assert_eq!(indexer.delete(&stmt).unwrap(), 0);
    }

    #[test]
    fn reindex_drops_stale_entries() {
        let (store, indexer) = setup();
        indexer.insert(&insert("1", "OPEN"));
        let row: Row = [("id", "1"), ("status", "HELD"), ("jpa_version", "1")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        indexer.reindex_row("orders", &row).unwrap();
        assert!(members(&store, "orders:status:OPEN").is_empty());
        assert!(members(&store, "orders:region:EU:status:OPEN").is_empty());
        assert_eq!(members(&store, "orders:status:HELD"), vec!["1"]);
    }

    #[test]
    fn store_outage_is_zero_not_error() {
        let client = Arc::new(LoopbackClient::new());
        let store = Arc::new(CommandStore::new(Arc::clone(&client)));
        let registry = Arc::new(SchemaRegistry::with_schemas(vec![schema()]).unwrap());
        let indexer = Indexer::new(store, registry);
        client.set_connected(false);

        assert_eq!(indexer.insert(&insert("1", "OPEN")), 0);
        let update = UpdateStatement::new("orders")
            .set("status", Expr::lit("X"))
            .filter(Predicate::eq("id", "1"));
        assert_eq!(indexer.update(&update).unwrap(), 0);
        let delete = DeleteStatement::new("orders", Predicate::eq("status", "OPEN"));
        assert_eq!(indexer.delete(&delete).unwrap(), 0);
        assert!(indexer.reindex_row("orders", &Row::new()).unwrap() == 0);
    }
}
