//! End-to-end planner and indexer scenarios over the in-memory store.

use kvdex_core::{
    DeleteStatement, Direction, Expr, IndexDefinition, IndexSchema, Indexer, InsertStatement,
    PlanDecision, Predicate, QueryPlanner, SchemaRegistry, SelectQuery, UpdateStatement,
};
use kvdex_storage::{InMemoryStore, KeyValueStore};
use std::collections::BTreeSet;
use std::sync::Arc;

fn case_schema() -> IndexSchema {
    IndexSchema::new("tm_case_main", "case_no")
        .with_index(IndexDefinition::new("name_idx", ["name"]).with_sort_field("create_time"))
        .with_index(
            IndexDefinition::new("status_time_idx", ["status", "create_time"])
                .with_sort_field("create_time"),
        )
        .with_index(IndexDefinition::new("code_idx", ["case_code"]).unique())
        .with_index(IndexDefinition::new("owner_idx", ["owner"]))
}

struct Harness {
    store: Arc<InMemoryStore>,
    indexer: Indexer,
    planner: QueryPlanner,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let registry = Arc::new(SchemaRegistry::with_schemas(vec![case_schema()]).unwrap());
        Self {
            indexer: Indexer::new(store.clone(), registry.clone()),
            planner: QueryPlanner::new(store.clone(), registry),
            store,
        }
    }

    fn insert(&self, case_no: &str, name: &str, owner: &str, create_time: i64) {
        let stmt = InsertStatement::new(
            "tm_case_main",
            ["case_no", "jpa_version", "name", "owner", "status", "create_time", "case_code"],
            vec![
                Expr::lit(case_no),
                Expr::lit(1),
                Expr::lit(name),
                Expr::lit(owner),
                Expr::lit("OPEN"),
                Expr::lit(create_time),
                Expr::lit(format!("TC{case_no}")),
            ],
        );
        assert!(self.indexer.insert(&stmt) > 0);
    }

    fn query(&self, predicate: Predicate) -> Option<BTreeSet<String>> {
        self.planner
            .primary_keys(&SelectQuery::new("tm_case_main").filter(predicate))
            .map(|keys| keys.into_iter().collect())
    }
}

fn set(keys: &[&str]) -> BTreeSet<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

#[test]
fn rename_moves_case_between_buckets() {
    let h = Harness::new();
    h.insert("CASE001", "Test Case", "amy", 100);
    h.insert("CASE002", "Test Case", "bob", 200);
    h.insert("CASE003", "Test Case", "amy", 300);

    assert_eq!(
        h.query(Predicate::eq("name", "Test Case")),
        Some(set(&["CASE001", "CASE002", "CASE003"]))
    );

    let rename = UpdateStatement::new("tm_case_main")
        .set("name", Expr::lit("Other"))
        .filter(Predicate::eq("case_no", "CASE001"));
    assert!(h.indexer.update(&rename).unwrap() > 0);

    assert_eq!(
        h.query(Predicate::eq("name", "Test Case")),
        Some(set(&["CASE002", "CASE003"]))
    );
    assert_eq!(h.query(Predicate::eq("name", "Other")), Some(set(&["CASE001"])));
}

#[test]
fn unique_code_bypasses_index() {
    let h = Harness::new();
    h.insert("CASE001", "Test Case", "amy", 100);
    let query = SelectQuery::new("tm_case_main").filter(Predicate::eq("case_code", "TC001"));
    assert_eq!(h.planner.classify(&query), PlanDecision::DirectLookup);
    assert_eq!(h.planner.primary_keys(&query), None);

    let empty = Harness::new();
    assert_eq!(empty.planner.classify(&query), PlanDecision::DirectLookup);
}

#[test]
fn intersection_is_strict_subset() {
    let h = Harness::new();
    h.insert("CASE001", "Alpha", "amy", 1);
    h.insert("CASE002", "Alpha", "bob", 2);
    h.insert("CASE003", "Beta", "amy", 3);
    h.insert("CASE004", "Alpha", "amy", 4);

    let by_name = h.query(Predicate::eq("name", "Alpha")).unwrap();
    let by_owner = h.query(Predicate::eq("owner", "amy")).unwrap();
    let both = h
        .query(Predicate::eq("name", "Alpha").and(Predicate::eq("owner", "amy")))
        .unwrap();

    let expected: BTreeSet<String> = by_name.intersection(&by_owner).cloned().collect();
    assert_eq!(both, expected);
    assert_eq!(both, set(&["CASE001", "CASE004"]));
    assert!(both.len() < by_name.len());
    assert!(both.len() < by_owner.len());
}

#[test]
fn order_by_numeric_field() {
    let h = Harness::new();
    h.insert("CASE001", "Test Case", "amy", 300);
    h.insert("CASE002", "Test Case", "amy", 20);
    h.insert("CASE003", "Test Case", "amy", 1000);

    let asc = SelectQuery::new("tm_case_main")
        .filter(Predicate::eq("owner", "amy"))
        .order_by("create_time", Direction::Asc);
    assert_eq!(
        h.planner.primary_keys(&asc).unwrap(),
        vec!["CASE002", "CASE001", "CASE003"]
    );

    let desc = SelectQuery::new("tm_case_main")
        .filter(Predicate::eq("owner", "amy"))
        .order_by("create_time", Direction::Desc);
    assert_eq!(
        h.planner.primary_keys(&desc).unwrap(),
        vec!["CASE003", "CASE001", "CASE002"]
    );

    // The name bucket is scored by create_time already.
    let bucket = h
        .store
        .query_primary_keys_by_index("tm_case_main:name:Test Case", 0, -1)
        .unwrap();
    assert_eq!(bucket, vec!["CASE002", "CASE001", "CASE003"]);
}

#[test]
fn soft_delete_lifecycle() {
    let h = Harness::new();
    h.insert("CASE001", "Test Case", "amy", 100);
    h.insert("CASE002", "Test Case", "amy", 200);

    let delete = DeleteStatement::new("tm_case_main", Predicate::eq("case_no", "CASE001"));
    assert_eq!(h.indexer.delete(&delete).unwrap(), 1);

    // Still visible until the sweep runs.
    assert_eq!(
        h.query(Predicate::eq("name", "Test Case")),
        Some(set(&["CASE001", "CASE002"]))
    );

    assert!(h.store.cleanup_marked_records().unwrap() > 0);
    assert_eq!(h.query(Predicate::eq("name", "Test Case")), Some(set(&["CASE002"])));
    assert!(h
        .store
        .get_primary_key_mappings("tm_case_main", "CASE001")
        .unwrap()
        .is_empty());
    assert_eq!(
        h.store.get_field_value("tm_case_main", "CASE001", "name").unwrap(),
        None
    );
    assert!(h.store.get_all_keys("*_deleted").unwrap().is_empty());
}

#[test]
fn delete_by_owner_marks_every_match() {
    let h = Harness::new();
    h.insert("CASE001", "A", "amy", 1);
    h.insert("CASE002", "B", "amy", 2);
    h.insert("CASE003", "C", "bob", 3);

    let delete = DeleteStatement::new("tm_case_main", Predicate::eq("owner", "amy"));
    assert_eq!(h.indexer.delete(&delete).unwrap(), 2);
    h.store.cleanup_marked_records().unwrap();
    assert_eq!(h.query(Predicate::eq("owner", "amy")), None);
    assert_eq!(h.query(Predicate::eq("owner", "bob")), Some(set(&["CASE003"])));
}

#[test]
fn restriction_renders_rewrite() {
    let h = Harness::new();
    h.insert("CASE001", "Test Case", "amy", 2);
    h.insert("CASE002", "Test Case", "amy", 1);
    let query = SelectQuery::new("tm_case_main")
        .filter(Predicate::eq("name", "Test Case"))
        .order_by("create_time", Direction::Asc);
    let restriction = h.planner.restriction(&query).unwrap();
    assert_eq!(restriction.in_clause(), "case_no IN ('CASE002', 'CASE001')");
    assert_eq!(
        restriction.order_case(),
        "CASE case_no WHEN 'CASE002' THEN 0 WHEN 'CASE001' THEN 1 ELSE 2 END"
    );
}
