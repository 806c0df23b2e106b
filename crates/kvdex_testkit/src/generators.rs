//! Property-based test generators using proptest.
//!
//! Generated values never contain the key-format separators (`:` and
//! `_`) or the multi-value delimiter, so every generated row maps to
//! well-formed index keys.

use crate::fixtures::CaseRow;
use proptest::prelude::*;

/// Strategy for primary keys of the case table.
pub fn case_no_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("CASE[0-9]{3}").expect("Invalid regex")
}

/// Strategy for plain field values.
pub fn token_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z0-9]{0,7}").expect("Invalid regex")
}

/// Strategy for case names drawn from a small pool, so that rows share
/// buckets.
pub fn case_name_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["Test Case", "Other", "Audit", "Claim"]).prop_map(String::from)
}

/// Strategy for owners drawn from a small pool.
pub fn owner_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["amy", "bob", "cyd", "dee"]).prop_map(String::from)
}

/// Strategy for statuses drawn from a small pool.
pub fn status_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["OPEN", "CLOSED", "HOLD"]).prop_map(String::from)
}

/// Strategy for a single case row.
pub fn case_row_strategy() -> impl Strategy<Value = CaseRow> {
    (
        case_no_strategy(),
        case_name_strategy(),
        owner_strategy(),
        status_strategy(),
        0i64..100_000,
    )
        .prop_map(|(case_no, name, owner, status, create_time)| {
            CaseRow::new(&case_no, &name, &owner, create_time).with_status(&status)
        })
}

/// Strategy for rows with distinct primary keys.
pub fn case_rows_strategy(max_rows: usize) -> impl Strategy<Value = Vec<CaseRow>> {
    prop::collection::btree_map(case_no_strategy(), case_row_strategy(), 1..max_rows.max(2))
        .prop_map(|rows| {
            rows.into_iter()
                .map(|(case_no, mut row)| {
                    row.case_no = case_no;
                    row
                })
                .collect()
        })
}

/// Strategy for rows with distinct primary keys and distinct
/// `create_time` values.
pub fn distinct_time_rows_strategy(max_rows: usize) -> impl Strategy<Value = Vec<CaseRow>> {
    case_rows_strategy(max_rows).prop_flat_map(|rows| {
        let len = rows.len();
        (
            Just(rows),
            prop::collection::btree_set(0i64..100_000, len..=len),
        )
            .prop_map(|(mut rows, times)| {
                for (row, time) in rows.iter_mut().zip(times.into_iter().rev()) {
                    row.create_time = time;
                }
                rows
            })
    })
}

/// A write against the case table.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Index a row through INSERT.
    Insert(CaseRow),
    /// Change the name of a case.
    Rename {
        /// Primary key.
        case_no: String,
        /// New name.
        name: String,
    },
    /// Change the owner of a case.
    Reassign {
        /// Primary key.
        case_no: String,
        /// New owner.
        owner: String,
    },
    /// Soft-delete a case.
    Delete {
        /// Primary key.
        case_no: String,
    },
    /// Apply pending deletion markers.
    Cleanup,
}

/// Strategy for a single write.
pub fn write_op_strategy() -> impl Strategy<Value = WriteOp> {
    prop_oneof![
        4 => case_row_strategy().prop_map(WriteOp::Insert),
        2 => (case_no_strategy(), case_name_strategy())
            .prop_map(|(case_no, name)| WriteOp::Rename { case_no, name }),
        1 => (case_no_strategy(), owner_strategy())
            .prop_map(|(case_no, owner)| WriteOp::Reassign { case_no, owner }),
        1 => case_no_strategy().prop_map(|case_no| WriteOp::Delete { case_no }),
        1 => Just(WriteOp::Cleanup),
    ]
}

/// Strategy for a sequence of writes.
pub fn write_sequence_strategy(min_ops: usize, max_ops: usize) -> impl Strategy<Value = Vec<WriteOp>> {
    prop::collection::vec(write_op_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
