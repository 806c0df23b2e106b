//! Access to the authoritative source tables.

use crate::error::{SourceError, SourceResult};
use kvdex_core::{compare_values, Row};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Comparison operator for [`SourceTable::select_where`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `=`
    Eq,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
}

impl Comparison {
    /// SQL operator text.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
        }
    }

    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Comparison::Eq => ordering == Ordering::Equal,
            Comparison::Gt => ordering == Ordering::Greater,
            Comparison::Ge => ordering != Ordering::Less,
            Comparison::Lt => ordering == Ordering::Less,
            Comparison::Le => ordering != Ordering::Greater,
        }
    }
}

/// Read access to the relational tables the index mirrors.
///
/// Implementations wrap the application's database connection. All
/// values are rendered as strings, NULL columns are absent from rows.
pub trait SourceTable: Send + Sync {
    /// Number of rows in `table`.
    fn count(&self, table: &str) -> SourceResult<u64>;

    /// Every value of `column` in `table`.
    fn select_column(&self, table: &str, column: &str) -> SourceResult<Vec<String>>;

    /// Rows whose `key_column` is one of `keys`.
    fn select_rows(&self, table: &str, key_column: &str, keys: &[String])
        -> SourceResult<Vec<Row>>;

    /// Values of `column` for rows where `field <op> value`, ordered by
    /// `order_by` ascending.
    fn select_where(
        &self,
        table: &str,
        column: &str,
        field: &str,
        op: Comparison,
        value: &str,
        order_by: &str,
    ) -> SourceResult<Vec<String>>;

    /// Whether `table` has a column named `column`.
    fn has_column(&self, table: &str, column: &str) -> SourceResult<bool>;
}

#[derive(Debug, Default)]
struct MemoryTable {
    columns: BTreeSet<String>,
    rows: Vec<Row>,
}

/// In-memory [`SourceTable`] for tests and demos.
///
/// Supports failure injection: [`MemorySource::set_available`] makes every
/// call fail with [`SourceError::Unavailable`], and
/// [`MemorySource::fail_table`] breaks a single table.
#[derive(Debug, Default)]
pub struct MemorySource {
    tables: RwLock<HashMap<String, MemoryTable>>,
    failing: RwLock<HashSet<String>>,
    unavailable: RwLock<bool>,
}

impl MemorySource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a table and its columns.
    pub fn create_table<I, S>(&self, table: &str, columns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tables = self.tables.write();
        let entry = tables.entry(table.to_string()).or_default();
        entry.columns.extend(columns.into_iter().map(Into::into));
    }

    /// Inserts `row`, replacing any row with the same `key_column` value.
    /// Unknown tables are created with the row's columns.
    pub fn upsert(&self, table: &str, key_column: &str, row: Row) {
        let mut tables = self.tables.write();
        let entry = tables.entry(table.to_string()).or_default();
        entry.columns.extend(row.keys().cloned());
        let key = row.get(key_column).cloned();
        match entry
            .rows
            .iter_mut()
            .find(|existing| key.is_some() && existing.get(key_column) == key.as_ref())
        {
            Some(existing) => *existing = row,
            None => entry.rows.push(row),
        }
    }

    /// Removes the row whose `key_column` equals `key`.
    pub fn remove(&self, table: &str, key_column: &str, key: &str) -> bool {
        let mut tables = self.tables.write();
        let Some(entry) = tables.get_mut(table) else {
            return false;
        };
        let before = entry.rows.len();
        entry
            .rows
            .retain(|row| row.get(key_column).map(String::as_str) != Some(key));
        entry.rows.len() != before
    }

    /// Makes the whole source reachable or unreachable.
    pub fn set_available(&self, available: bool) {
        *self.unavailable.write() = !available;
    }

    /// Makes every query against `table` fail.
    pub fn fail_table(&self, table: &str) {
        self.failing.write().insert(table.to_string());
    }

    /// Undoes [`MemorySource::fail_table`].
    pub fn heal_table(&self, table: &str) {
        self.failing.write().remove(table);
    }

    fn with_table<T>(&self, table: &str, f: impl FnOnce(&MemoryTable) -> T) -> SourceResult<T> {
        if *self.unavailable.read() {
            return Err(SourceError::Unavailable("source offline".into()));
        }
        if self.failing.read().contains(table) {
            return Err(SourceError::Query(format!("query against {table} failed")));
        }
        let tables = self.tables.read();
        let entry = tables
            .get(table)
            .ok_or_else(|| SourceError::UnknownTable(table.to_string()))?;
        Ok(f(entry))
    }
}

impl SourceTable for MemorySource {
    fn count(&self, table: &str) -> SourceResult<u64> {
        self.with_table(table, |t| t.rows.len() as u64)
    }

    fn select_column(&self, table: &str, column: &str) -> SourceResult<Vec<String>> {
        self.with_table(table, |t| {
            t.rows.iter().filter_map(|row| row.get(column).cloned()).collect()
        })
    }

    fn select_rows(
        &self,
        table: &str,
        key_column: &str,
        keys: &[String],
    ) -> SourceResult<Vec<Row>> {
        let wanted: HashSet<&str> = keys.iter().map(String::as_str).collect();
        self.with_table(table, |t| {
            t.rows
                .iter()
                .filter(|row| {
                    row.get(key_column)
                        .is_some_and(|key| wanted.contains(key.as_str()))
                })
                .cloned()
                .collect()
        })
    }

    fn select_where(
        &self,
        table: &str,
        column: &str,
        field: &str,
        op: Comparison,
        value: &str,
        order_by: &str,
    ) -> SourceResult<Vec<String>> {
        self.with_table(table, |t| {
            let mut matched: Vec<&Row> = t
                .rows
                .iter()
                .filter(|row| {
                    row.get(field)
                        .is_some_and(|v| op.accepts(compare_values(v, value)))
                })
                .collect();
            matched.sort_by(|a, b| match (a.get(order_by), b.get(order_by)) {
                (Some(x), Some(y)) => x.cmp(y),
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (None, None) => Ordering::Equal,
            });
            matched
                .into_iter()
                .filter_map(|row| row.get(column).cloned())
                .collect()
        })
    }

    fn has_column(&self, table: &str, column: &str) -> SourceResult<bool> {
        self.with_table(table, |t| t.columns.contains(column))
    }
}
