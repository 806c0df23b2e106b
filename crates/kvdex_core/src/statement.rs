//! Predicate trees and statement shapes handed over by the SQL layer.
//!
//! Parsing is not done here; the caller builds these values from its own
//! parser output. Anything the planner cannot reason about is carried as an
//! `Other` node holding the original text.

use std::collections::BTreeMap;
use std::fmt;

/// Field values of one row, keyed by column name.
pub type Row = BTreeMap<String, String>;

/// A literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// String literal, unquoted.
    String(String),
    /// Integer literal.
    Integer(i64),
    /// Floating-point literal.
    Float(f64),
    /// SQL NULL.
    Null,
}

impl Literal {
    /// The value as stored in index keys and data hashes. `NULL` has none.
    #[must_use]
    pub fn to_value(&self) -> Option<String> {
        match self {
            Literal::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Numeric reading of the literal, if it has one.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Integer(n) => Some(*n as f64),
            Literal::Float(f) => Some(*f),
            Literal::String(s) => s.trim().parse().ok(),
            Literal::Null => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => f.write_str(s),
            Literal::Integer(n) => write!(f, "{n}"),
            Literal::Float(x) => write!(f, "{x}"),
            Literal::Null => f.write_str("NULL"),
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::String(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::String(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Integer(value)
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Literal::Integer(i64::from(value))
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Float(value)
    }
}

/// Strips a table qualifier and identifier quoting from a column reference.
#[must_use]
pub fn column_name(column: &str) -> &str {
    let unqualified = column.rsplit('.').next().unwrap_or(column);
    unqualified.trim_matches(|c| c == '`' || c == '"' || c == '[' || c == ']')
}

/// A WHERE clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column = literal`
    Equals {
        /// Column reference.
        column: String,
        /// Compared value.
        value: Literal,
    },
    /// `left AND right`
    And(Box<Predicate>, Box<Predicate>),
    /// Any other condition.
    Other(String),
}

impl Predicate {
    /// Builds `column = value`.
    pub fn eq(column: impl Into<String>, value: impl Into<Literal>) -> Self {
        Predicate::Equals {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Builds `self AND other`.
    #[must_use]
    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    /// Equalities reachable through AND nodes, left to right.
    ///
    /// Column names are unqualified. `Other` subtrees contribute nothing.
    #[must_use]
    pub fn equalities(&self) -> Vec<(&str, &Literal)> {
        let mut out = Vec::new();
        self.collect_equalities(&mut out);
        out
    }

    fn collect_equalities<'a>(&'a self, out: &mut Vec<(&'a str, &'a Literal)>) {
        match self {
            Predicate::Equals { column, value } => out.push((column_name(column), value)),
            Predicate::And(left, right) => {
                left.collect_equalities(out);
                right.collect_equalities(out);
            }
            Predicate::Other(_) => {}
        }
    }

    /// The literal compared with `column`, if any equality names it.
    #[must_use]
    pub fn equality_on(&self, column: &str) -> Option<&Literal> {
        self.equalities()
            .into_iter()
            .rev()
            .find(|(c, _)| *c == column)
            .map(|(_, v)| v)
    }
}

/// A value expression in a VALUES list or SET clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value.
    Literal(Literal),
    /// Column reference.
    Column(String),
    /// `left + right`
    Add(Box<Expr>, Box<Expr>),
    /// Anything else (function calls, placeholders, ...).
    Other(String),
}

impl Expr {
    /// Literal expression.
    pub fn lit(value: impl Into<Literal>) -> Self {
        Expr::Literal(value.into())
    }

    /// Column reference expression.
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    /// `self + other`
    #[must_use]
    pub fn plus(self, other: Expr) -> Self {
        Expr::Add(Box::new(self), Box::new(other))
    }

    /// The literal value if the expression is a non-null literal.
    #[must_use]
    pub fn literal_value(&self) -> Option<String> {
        match self {
            Expr::Literal(lit) => lit.to_value(),
            _ => None,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

/// One ORDER BY item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Field name.
    pub field: String,
    /// Direction.
    pub direction: Direction,
}

/// A SELECT reduced to what the planner needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    /// Target table.
    pub table: String,
    /// WHERE clause.
    pub predicate: Option<Predicate>,
    /// ORDER BY items.
    pub order_by: Vec<OrderBy>,
    /// GROUP BY fields.
    pub group_by: Vec<String>,
}

impl SelectQuery {
    /// Creates an unfiltered query on `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            predicate: None,
            order_by: Vec::new(),
            group_by: Vec::new(),
        }
    }

    /// Sets the WHERE clause.
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Appends an ORDER BY item.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    /// Appends a GROUP BY field.
    #[must_use]
    pub fn group_by(mut self, field: impl Into<String>) -> Self {
        self.group_by.push(field.into());
        self
    }
}

/// An INSERT of one row.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    /// Target table.
    pub table: String,
    /// Explicit column list, if given.
    pub columns: Option<Vec<String>>,
    /// Values, positionally matched to the columns.
    pub values: Vec<Expr>,
}

impl InsertStatement {
    /// INSERT with an explicit column list.
    pub fn new<I, S>(table: impl Into<String>, columns: I, values: Vec<Expr>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: table.into(),
            columns: Some(columns.into_iter().map(Into::into).collect()),
            values,
        }
    }

    /// INSERT without a column list.
    pub fn positional(table: impl Into<String>, values: Vec<Expr>) -> Self {
        Self {
            table: table.into(),
            columns: None,
            values,
        }
    }

    /// INSERT of a row map with an explicit column list.
    pub fn from_row(table: impl Into<String>, row: &Row) -> Self {
        Self {
            table: table.into(),
            columns: Some(row.keys().cloned().collect()),
            values: row.values().map(|v| Expr::lit(v.as_str())).collect(),
        }
    }
}

/// One `column = expr` item of a SET clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Assigned column.
    pub column: String,
    /// New value.
    pub value: Expr,
}

/// An UPDATE.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    /// Target table.
    pub table: String,
    /// SET clause.
    pub assignments: Vec<Assignment>,
    /// WHERE clause.
    pub predicate: Option<Predicate>,
}

impl UpdateStatement {
    /// Creates an UPDATE without assignments.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            assignments: Vec::new(),
            predicate: None,
        }
    }

    /// Appends `column = value` to the SET clause.
    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: Expr) -> Self {
        self.assignments.push(Assignment {
            column: column.into(),
            value,
        });
        self
    }

    /// Sets the WHERE clause.
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }
}

/// A DELETE.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    /// Target table.
    pub table: String,
    /// WHERE clause.
    pub predicate: Option<Predicate>,
}

impl DeleteStatement {
    /// Creates a DELETE filtered by `predicate`.
    pub fn new(table: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            table: table.into(),
            predicate: Some(predicate),
        }
    }
}
