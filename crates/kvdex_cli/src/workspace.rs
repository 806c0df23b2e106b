//! Loading schema and row files into an in-memory index.

use kvdex_core::{CoreError, Indexer, IndexSchema, QueryPlanner, Row, SchemaRegistry};
use kvdex_storage::InMemoryStore;
use kvdex_sync_engine::SyncError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// A file could not be read.
    #[error("cannot read {path:?}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A rows file is not valid JSON of the expected shape.
    #[error("invalid rows file {path:?}: {message}")]
    Rows {
        /// File path.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// Schema or index error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Sync run error.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// A command-line argument could not be used.
    #[error("invalid argument: {0}")]
    Argument(String),
}

/// Rows per table, as read from a rows file.
pub type TableRows = BTreeMap<String, Vec<Row>>;

fn read(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a JSON array of index schemas.
pub fn load_schemas(path: &Path) -> Result<Vec<IndexSchema>, CliError> {
    Ok(IndexSchema::list_from_json(&read(path)?)?)
}

/// Reads a rows file: a JSON object mapping table names to arrays of row
/// objects. Scalars are stored as strings; `null` columns are dropped.
pub fn load_rows(path: &Path) -> Result<TableRows, CliError> {
    let invalid = |message: String| CliError::Rows {
        path: path.to_path_buf(),
        message,
    };
    let document: Value =
        serde_json::from_str(&read(path)?).map_err(|e| invalid(e.to_string()))?;
    let Value::Object(tables) = document else {
        return Err(invalid("top level must be an object of tables".into()));
    };

    let mut out = TableRows::new();
    for (table, rows) in tables {
        let Value::Array(rows) = rows else {
            return Err(invalid(format!("{table} must map to an array of rows")));
        };
        let mut parsed = Vec::with_capacity(rows.len());
        for (i, row) in rows.into_iter().enumerate() {
            let Value::Object(columns) = row else {
                return Err(invalid(format!("{table}[{i}] is not an object")));
            };
            let mut fields = Row::new();
            for (column, value) in columns {
                match value {
                    Value::Null => {}
                    Value::String(s) => {
                        fields.insert(column, s);
                    }
                    Value::Number(_) | Value::Bool(_) => {
                        fields.insert(column, value.to_string());
                    }
                    Value::Array(_) | Value::Object(_) => {
                        return Err(invalid(format!("{table}[{i}].{column} is not a scalar")));
                    }
                }
            }
            parsed.push(fields);
        }
        out.insert(table, parsed);
    }
    Ok(out)
}

/// An in-memory store indexed from files.
pub struct Workspace {
    /// Backing store.
    pub store: Arc<InMemoryStore>,
    /// Loaded schemas.
    pub registry: Arc<SchemaRegistry>,
    /// Write path.
    pub indexer: Indexer,
    /// Read path.
    pub planner: QueryPlanner,
}

impl Workspace {
    /// Builds a workspace from a schema file and an optional rows file.
    pub fn load(schema: &Path, rows: Option<&Path>) -> Result<Self, CliError> {
        let registry = Arc::new(SchemaRegistry::with_schemas(load_schemas(schema)?)?);
        let store = Arc::new(InMemoryStore::new());
        let workspace = Self {
            indexer: Indexer::new(store.clone(), registry.clone()),
            planner: QueryPlanner::new(store.clone(), registry.clone()),
            store,
            registry,
        };

        if let Some(path) = rows {
            let mut indexed = 0;
            for (table, rows) in load_rows(path)? {
                if workspace.registry.get(&table).is_none() {
                    tracing::warn!(table = %table, "no schema for table, rows skipped");
                    continue;
                }
                for row in &rows {
                    if workspace.indexer.index_row(&table, row) > 0 {
                        indexed += 1;
                    }
                }
            }
            tracing::info!(rows = indexed, path = %path.display(), "rows indexed");
        }
        Ok(workspace)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use kvdex_storage::KeyValueStore;
    use std::io::Write;
    use tempfile::NamedTempFile;

    pub(crate) const SCHEMA: &str = r#"[
        {
            "tableName": "tm_case_main",
            "primaryKey": "case_no",
            "indexes": [
                { "name": "name_idx", "fields": ["name"], "sortField": "create_time" },
                { "name": "owner_idx", "fields": ["owner"] },
                { "name": "code_idx", "fields": ["case_code"], "unique": true }
            ]
        }
    ]"#;

    pub(crate) const ROWS: &str = r#"{
        "tm_case_main": [
            { "case_no": "CASE001", "name": "Test Case", "owner": "amy", "create_time": 300, "case_code": "TC1" },
            { "case_no": "CASE002", "name": "Test Case", "owner": "bob", "create_time": 100, "case_code": "TC2" },
            { "case_no": "CASE003", "name": "Other", "owner": "amy", "create_time": 200, "note": null }
        ],
        "unknown_table": [ { "id": 1 } ]
    }"#;

    pub(crate) fn temp_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_schema_and_rows() {
        let schema = temp_file(SCHEMA);
        let rows = temp_file(ROWS);
        let ws = Workspace::load(schema.path(), Some(rows.path())).unwrap();

        assert_eq!(ws.registry.snapshot().len(), 1);
        assert_eq!(
            ws.store
                .query_primary_keys_by_index("tm_case_main:name:Test Case", 0, -1)
                .unwrap(),
            vec!["CASE002", "CASE001"]
        );
        assert_eq!(
            ws.store.get_field_value("tm_case_main", "CASE003", "note").unwrap(),
            None
        );
    }

    #[test]
    fn rows_must_be_objects() {
        let rows = temp_file(r#"{ "t": [1, 2] }"#);
        let err = load_rows(rows.path()).unwrap_err();
        assert!(matches!(err, CliError::Rows { .. }));
        assert!(err.to_string().contains("t[0] is not an object"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_schemas(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, CliError::Io { .. }));
    }

    #[test]
    fn bad_schema_is_core_error() {
        let schema = temp_file("{ not json");
        assert!(matches!(
            Workspace::load(schema.path(), None),
            Err(CliError::Core(CoreError::SchemaParse(_)))
        ));
    }
}
