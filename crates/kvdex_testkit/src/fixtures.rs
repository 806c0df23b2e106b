//! Test fixtures and index helpers.
//!
//! Provides the `tm_case_main` schema used across the workspace's tests
//! and a bundle of store, registry, indexer and planner wired together.

use kvdex_core::{
    Expr, IndexDefinition, IndexSchema, Indexer, InsertStatement, Predicate, QueryPlanner, Row,
    SchemaRegistry, SelectQuery,
};
use kvdex_storage::InMemoryStore;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Table used by the shared fixtures.
pub const CASE_TABLE: &str = "tm_case_main";

/// Primary-key column of [`CASE_TABLE`].
pub const CASE_KEY: &str = "case_no";

/// Columns written by [`case_insert`], in order.
pub const CASE_COLUMNS: [&str; 8] = [
    "case_no",
    "jpa_version",
    "name",
    "owner",
    "status",
    "create_time",
    "case_code",
    "update_time",
];

/// Schema of the case table.
///
/// - `name_idx` on `name`, sorted by `create_time`
/// - `status_time_idx` composite on `status` and `create_time`
/// - `code_idx` unique on `case_code`
/// - `owner_idx` on `owner`
pub fn case_schema() -> IndexSchema {
    IndexSchema::new(CASE_TABLE, CASE_KEY)
        .with_index(IndexDefinition::new("name_idx", ["name"]).with_sort_field("create_time"))
        .with_index(
            IndexDefinition::new("status_time_idx", ["status", "create_time"])
                .with_sort_field("create_time"),
        )
        .with_index(IndexDefinition::new("code_idx", ["case_code"]).unique())
        .with_index(IndexDefinition::new("owner_idx", ["owner"]))
}

/// Registry holding only [`case_schema`].
pub fn case_registry() -> Arc<SchemaRegistry> {
    Arc::new(
        SchemaRegistry::with_schemas(vec![case_schema()])
            .expect("case schema should be valid"),
    )
}

/// A case row as the source table would return it.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseRow {
    /// Primary key.
    pub case_no: String,
    /// Display name.
    pub name: String,
    /// Owner; may hold several comma-separated owners.
    pub owner: String,
    /// Workflow status.
    pub status: String,
    /// Creation time, epoch seconds.
    pub create_time: i64,
    /// Optimistic-lock version.
    pub version: i64,
    /// Last modification, `%Y-%m-%d %H:%M:%S`.
    pub update_time: String,
}

impl CaseRow {
    /// Creates an open case owned by `owner`.
    pub fn new(case_no: &str, name: &str, owner: &str, create_time: i64) -> Self {
        Self {
            case_no: case_no.to_string(),
            name: name.to_string(),
            owner: owner.to_string(),
            status: "OPEN".to_string(),
            create_time,
            version: 1,
            update_time: "2024-01-01 00:00:00".to_string(),
        }
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    /// Sets the last-modified timestamp.
    #[must_use]
    pub fn with_update_time(mut self, update_time: &str) -> Self {
        self.update_time = update_time.to_string();
        self
    }

    /// Unique code derived from the primary key.
    pub fn case_code(&self) -> String {
        format!("TC{}", self.case_no)
    }

    /// Column map of this row.
    pub fn to_row(&self) -> Row {
        let code = self.case_code();
        [
            ("case_no", self.case_no.as_str()),
            ("name", self.name.as_str()),
            ("owner", self.owner.as_str()),
            ("status", self.status.as_str()),
            ("case_code", code.as_str()),
            ("update_time", self.update_time.as_str()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .chain([
            ("create_time".to_string(), self.create_time.to_string()),
            ("jpa_version".to_string(), self.version.to_string()),
        ])
        .collect()
    }
}

/// INSERT statement for `row`, columns in [`CASE_COLUMNS`] order.
pub fn case_insert(row: &CaseRow) -> InsertStatement {
    InsertStatement::new(
        CASE_TABLE,
        CASE_COLUMNS,
        vec![
            Expr::lit(row.case_no.as_str()),
            Expr::lit(row.version),
            Expr::lit(row.name.as_str()),
            Expr::lit(row.owner.as_str()),
            Expr::lit(row.status.as_str()),
            Expr::lit(row.create_time),
            Expr::lit(row.case_code()),
            Expr::lit(row.update_time.as_str()),
        ],
    )
}

/// Store, registry, indexer and planner over the case schema.
pub struct TestIndex {
    /// The backing store.
    pub store: Arc<InMemoryStore>,
    /// Schema registry.
    pub registry: Arc<SchemaRegistry>,
    /// Write path.
    pub indexer: Indexer,
    /// Read path.
    pub planner: QueryPlanner,
}

impl TestIndex {
    /// Creates an empty index over [`case_schema`].
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let registry = case_registry();
        Self {
            indexer: Indexer::new(store.clone(), registry.clone()),
            planner: QueryPlanner::new(store.clone(), registry.clone()),
            store,
            registry,
        }
    }

    /// Indexes `row` through the INSERT path.
    pub fn insert(&self, row: &CaseRow) -> usize {
        self.indexer.insert(&case_insert(row))
    }

    /// Planner result for `predicate` as a set, `None` when not indexable.
    pub fn query(&self, predicate: Predicate) -> Option<BTreeSet<String>> {
        self.planner
            .primary_keys(&SelectQuery::new(CASE_TABLE).filter(predicate))
            .map(|keys| keys.into_iter().collect())
    }
}

impl Default for TestIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a test with a fresh [`TestIndex`].
///
/// # Example
///
/// ```rust
/// use kvdex_testkit::{with_test_index, CaseRow};
/// use kvdex_core::Predicate;
///
/// with_test_index(|index| {
///     index.insert(&CaseRow::new("CASE001", "Test Case", "amy", 100));
///     let keys = index.query(Predicate::eq("name", "Test Case")).unwrap();
///     assert!(keys.contains("CASE001"));
/// });
/// ```
pub fn with_test_index<F, R>(f: F) -> R
where
    F: FnOnce(&TestIndex) -> R,
{
    let index = TestIndex::new();
    f(&index)
}

/// Pre-populated scenarios.
pub mod scenarios {
    use super::*;

    /// `count` open cases named "Test Case", alternating between owners
    /// `amy` and `bob`, with `create_time` 100, 200, ...
    pub fn populated_index(count: usize) -> TestIndex {
        let index = TestIndex::new();
        for row in case_rows(count) {
            index.insert(&row);
        }
        index
    }

    /// The rows [`populated_index`] inserts.
    pub fn case_rows(count: usize) -> Vec<CaseRow> {
        (1..=count)
            .map(|i| {
                let owner = if i % 2 == 1 { "amy" } else { "bob" };
                CaseRow::new(&format!("CASE{i:03}"), "Test Case", owner, i as i64 * 100)
            })
            .collect()
    }
}
