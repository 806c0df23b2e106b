//! Index schemas and the schema registry.
//!
//! An [`IndexSchema`] describes which fields of a table are indexed. The
//! [`SchemaRegistry`] publishes schemas as immutable snapshots: a refresh
//! builds a complete new snapshot and swaps it in, so readers observe either
//! the old or the new set of schemas, never a mix.

use crate::error::{CoreError, CoreResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

fn default_version_field() -> Option<String> {
    Some("jpa_version".to_string())
}

/// One index over a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDefinition {
    /// Index name.
    pub name: String,
    /// Indexed fields in declaration order. More than one makes a composite index.
    pub fields: Vec<String>,
    /// Field whose numeric value scores members of the index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_field: Option<String>,
    /// Whether the indexed fields identify at most one row.
    #[serde(default)]
    pub unique: bool,
}

impl IndexDefinition {
    /// Creates a non-unique index without a sort field.
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            sort_field: None,
            unique: false,
        }
    }

    /// Sets the sort field.
    #[must_use]
    pub fn with_sort_field(mut self, field: impl Into<String>) -> Self {
        self.sort_field = Some(field.into());
        self
    }

    /// Marks the index unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Returns true if the index spans more than one field.
    #[must_use]
    pub fn is_composite(&self) -> bool {
        self.fields.len() > 1
    }
}

/// Indexable shape of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSchema {
    /// Table name.
    pub table_name: String,
    /// Primary key column.
    #[serde(alias = "primaryKeyField")]
    pub primary_key: String,
    /// Optimistic-locking version column. `None` disables version checks.
    #[serde(default = "default_version_field")]
    pub version_field: Option<String>,
    /// Declared indexes.
    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
}

impl IndexSchema {
    /// Creates a schema with the default version field and no indexes.
    pub fn new(table_name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            primary_key: primary_key.into(),
            version_field: default_version_field(),
            indexes: Vec::new(),
        }
    }

    /// Sets or clears the version field.
    #[must_use]
    pub fn with_version_field(mut self, field: Option<&str>) -> Self {
        self.version_field = field.map(str::to_string);
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn with_index(mut self, index: IndexDefinition) -> Self {
        self.indexes.push(index);
        self
    }

    /// The version field, if version checks are enabled.
    #[must_use]
    pub fn version_field(&self) -> Option<&str> {
        self.version_field.as_deref().filter(|f| !f.is_empty())
    }

    /// Returns true if `field` belongs to any index.
    #[must_use]
    pub fn is_indexed_field(&self, field: &str) -> bool {
        self.indexes
            .iter()
            .any(|index| index.fields.iter().any(|f| f == field))
    }

    /// Returns true if `field` belongs to a non-unique index.
    #[must_use]
    pub fn is_plannable_field(&self, field: &str) -> bool {
        self.indexes
            .iter()
            .filter(|index| !index.unique)
            .any(|index| index.fields.iter().any(|f| f == field))
    }

    /// Returns true if `field` has buckets of its own: it is the field of a
    /// single-field index, or the version field.
    #[must_use]
    pub fn has_own_bucket(&self, field: &str) -> bool {
        self.version_field() == Some(field)
            || self
                .indexes
                .iter()
                .filter(|index| !index.is_composite())
                .any(|index| index.fields.iter().any(|f| f == field))
    }

    /// Every indexed field, deduplicated, in declaration order.
    #[must_use]
    pub fn indexed_fields(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.indexes
            .iter()
            .flat_map(|index| index.fields.iter())
            .map(String::as_str)
            .filter(|f| seen.insert(*f))
            .collect()
    }

    /// Fields whose values the indexer reads: indexed, sort and version fields.
    #[must_use]
    pub fn tracked_fields(&self) -> BTreeSet<&str> {
        let mut fields: BTreeSet<&str> = self.indexed_fields().into_iter().collect();
        fields.extend(self.indexes.iter().filter_map(|i| i.sort_field.as_deref()));
        fields.extend(self.version_field());
        fields
    }

    /// Column order assumed for an INSERT without an explicit column list:
    /// primary key, version field, then every indexed field.
    #[must_use]
    pub fn inferred_columns(&self) -> Vec<&str> {
        let mut columns = vec![self.primary_key.as_str()];
        if let Some(version) = self.version_field() {
            columns.push(version);
        }
        for field in self.indexed_fields() {
            if !columns.contains(&field) {
                columns.push(field);
            }
        }
        columns
    }

    /// Checks the schema for structural mistakes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSchema`] if a name is empty, an index has no
    /// fields, or two indexes share a name.
    pub fn validate(&self) -> CoreResult<()> {
        let fail = |message: String| Err(CoreError::invalid_schema(&self.table_name, message));
        if self.table_name.is_empty() {
            return fail("table name is empty".into());
        }
        if self.primary_key.is_empty() {
            return fail("primary key is empty".into());
        }
        let mut names = BTreeSet::new();
        for index in &self.indexes {
            if index.fields.is_empty() {
                return fail(format!("index {} has no fields", index.name));
            }
            if index.fields.iter().any(String::is_empty) {
                return fail(format!("index {} has an empty field name", index.name));
            }
            if !names.insert(index.name.as_str()) {
                return fail(format!("duplicate index name {}", index.name));
            }
        }
        Ok(())
    }

    /// Parses a JSON array of schemas.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SchemaParse`] if the document is not valid.
    pub fn list_from_json(json: &str) -> CoreResult<Vec<IndexSchema>> {
        Ok(serde_json::from_str(json)?)
    }
}

/// An immutable set of schemas keyed by table name.
#[derive(Debug, Default)]
pub struct SchemaSnapshot {
    tables: HashMap<String, Arc<IndexSchema>>,
    generation: u64,
}

impl SchemaSnapshot {
    /// Schema for `table`.
    #[must_use]
    pub fn get(&self, table: &str) -> Option<&Arc<IndexSchema>> {
        self.tables.get(table)
    }

    /// Table names, sorted.
    #[must_use]
    pub fn tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self.tables.keys().cloned().collect();
        tables.sort();
        tables
    }

    /// Number of schemas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if no schema is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// How many times the registry has been refreshed when this snapshot was
    /// published.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Process-wide schema lookup with wholesale refresh.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    current: RwLock<Arc<SchemaSnapshot>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry loaded with `schemas`.
    ///
    /// # Errors
    ///
    /// Returns an error if any schema is invalid.
    pub fn with_schemas(schemas: Vec<IndexSchema>) -> CoreResult<Self> {
        let registry = Self::new();
        registry.refresh(schemas)?;
        Ok(registry)
    }

    /// Replaces every schema with `schemas` and returns the new generation.
    ///
    /// The new snapshot is built and validated before it is published. On
    /// error the current snapshot stays in place. A table listed twice keeps
    /// its last definition.
    ///
    /// # Errors
    ///
    /// Returns an error if any schema is invalid.
    pub fn refresh(&self, schemas: Vec<IndexSchema>) -> CoreResult<u64> {
        for schema in &schemas {
            schema.validate()?;
        }
        let tables: HashMap<String, Arc<IndexSchema>> = schemas
            .into_iter()
            .map(|schema| (schema.table_name.clone(), Arc::new(schema)))
            .collect();

        let mut current = self.current.write();
        let generation = current.generation + 1;
        tracing::info!(tables = tables.len(), generation, "published index schemas");
        *current = Arc::new(SchemaSnapshot { tables, generation });
        Ok(generation)
    }

    /// The currently published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<SchemaSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Schema for `table` in the current snapshot.
    #[must_use]
    pub fn get(&self, table: &str) -> Option<Arc<IndexSchema>> {
        self.current.read().get(table).cloned()
    }
}
