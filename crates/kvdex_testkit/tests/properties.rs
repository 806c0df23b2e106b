//! Property tests for the index write and read paths.

use kvdex_core::{DeleteStatement, Direction, Expr, Predicate, SelectQuery, UpdateStatement};
use kvdex_storage::KeyValueStore;
use kvdex_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeSet;

fn apply(index: &TestIndex, op: &WriteOp) {
    match op {
        WriteOp::Insert(row) => {
            index.insert(row);
        }
        WriteOp::Rename { case_no, name } => {
            let stmt = UpdateStatement::new(CASE_TABLE)
                .set("name", Expr::lit(name.as_str()))
                .filter(Predicate::eq(CASE_KEY, case_no.as_str()));
            index.indexer.update(&stmt).unwrap();
        }
        WriteOp::Reassign { case_no, owner } => {
            let stmt = UpdateStatement::new(CASE_TABLE)
                .set("owner", Expr::lit(owner.as_str()))
                .filter(Predicate::eq(CASE_KEY, case_no.as_str()));
            index.indexer.update(&stmt).unwrap();
        }
        WriteOp::Delete { case_no } => {
            let stmt = DeleteStatement::new(CASE_TABLE, Predicate::eq(CASE_KEY, case_no.as_str()));
            index.indexer.delete(&stmt).unwrap();
        }
        WriteOp::Cleanup => {
            index.store.cleanup_marked_records().unwrap();
        }
    }
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn inserted_rows_are_found(rows in case_rows_strategy(16)) {
        let index = TestIndex::new();
        for row in &rows {
            prop_assert!(index.insert(row) > 0);
        }

        for row in &rows {
            let by_name = index.query(Predicate::eq("name", row.name.as_str())).unwrap_or_default();
            prop_assert!(by_name.contains(&row.case_no));

            let by_owner = index.query(Predicate::eq("owner", row.owner.as_str())).unwrap_or_default();
            prop_assert!(by_owner.contains(&row.case_no));

            let by_status_time = index
                .query(
                    Predicate::eq("status", row.status.as_str())
                        .and(Predicate::eq("create_time", row.create_time)),
                )
                .unwrap_or_default();
            prop_assert!(by_status_time.contains(&row.case_no));
        }
    }

    #[test]
    fn reverse_mapping_holds_after_writes(ops in write_sequence_strategy(1, 40)) {
        let index = TestIndex::new();
        for op in &ops {
            apply(&index, op);
            let checked = check_reverse_mapping(&*index.store, CASE_TABLE);
            prop_assert!(checked.is_ok(), "after {:?}: {:?}", op, checked);
        }
    }

    #[test]
    fn insert_is_idempotent(rows in case_rows_strategy(12)) {
        let index = TestIndex::new();
        for row in &rows {
            index.insert(row);
        }
        let once = dump_index(&*index.store, CASE_TABLE).unwrap();

        for row in &rows {
            index.insert(row);
        }
        let twice = dump_index(&*index.store, CASE_TABLE).unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn order_by_matches_numeric_order(rows in distinct_time_rows_strategy(12), descending in any::<bool>()) {
        let index = TestIndex::new();
        for row in &rows {
            index.insert(&CaseRow { name: "Test Case".to_string(), ..row.clone() });
        }

        let direction = if descending { Direction::Desc } else { Direction::Asc };
        let query = SelectQuery::new(CASE_TABLE)
            .filter(Predicate::eq("name", "Test Case"))
            .order_by("create_time", direction);
        let keys = index.planner.primary_keys(&query).unwrap();

        let mut expected: Vec<&CaseRow> = rows.iter().collect();
        expected.sort_by_key(|r| r.create_time);
        if descending {
            expected.reverse();
        }
        let expected: Vec<String> = expected.into_iter().map(|r| r.case_no.clone()).collect();
        prop_assert_eq!(keys, expected);
    }

    #[test]
    fn conjunction_is_intersection(
        rows in case_rows_strategy(16),
        owner in owner_strategy(),
        name in case_name_strategy(),
    ) {
        let index = TestIndex::new();
        for row in &rows {
            index.insert(row);
        }

        let by_owner = index.query(Predicate::eq("owner", owner.as_str()));
        let by_name = index.query(Predicate::eq("name", name.as_str()));
        prop_assume!(by_owner.is_some() && by_name.is_some());

        let expected: BTreeSet<String> = by_owner
            .unwrap_or_default()
            .intersection(&by_name.unwrap_or_default())
            .cloned()
            .collect();
        let both = index
            .query(Predicate::eq("owner", owner.as_str()).and(Predicate::eq("name", name.as_str())))
            .unwrap_or_default();
        prop_assert_eq!(both, expected);
    }

    #[test]
    fn rename_moves_between_buckets(row in case_row_strategy(), new_name in case_name_strategy()) {
        prop_assume!(row.name != new_name);
        let index = TestIndex::new();
        index.insert(&row);

        let stmt = UpdateStatement::new(CASE_TABLE)
            .set("name", Expr::lit(new_name.as_str()))
            .filter(Predicate::eq(CASE_KEY, row.case_no.as_str()));
        prop_assert!(index.indexer.update(&stmt).unwrap() > 0);

        let old = index.query(Predicate::eq("name", row.name.as_str())).unwrap_or_default();
        let new = index.query(Predicate::eq("name", new_name.as_str())).unwrap_or_default();
        prop_assert!(!old.contains(&row.case_no));
        prop_assert!(new.contains(&row.case_no));
    }
}
