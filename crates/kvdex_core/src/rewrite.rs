//! Query rewrite output.
//!
//! The planner's ordered key list is handed to the SQL layer as an `IN`
//! restriction plus a positional `CASE` expression, so the source returns
//! exactly those rows in exactly that order.

/// Primary keys a query should be restricted to, in result order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRestriction {
    /// Primary key column.
    pub column: String,
    /// Keys in the order rows must be returned.
    pub keys: Vec<String>,
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl KeyRestriction {
    /// Creates a restriction on `column`.
    pub fn new(column: impl Into<String>, keys: Vec<String>) -> Self {
        Self {
            column: column.into(),
            keys,
        }
    }

    /// `column IN ('k1', 'k2', ...)`
    #[must_use]
    pub fn in_clause(&self) -> String {
        let list: Vec<String> = self.keys.iter().map(|k| quote(k)).collect();
        format!("{} IN ({})", self.column, list.join(", "))
    }

    /// `CASE column WHEN 'k1' THEN 0 ... ELSE n END`, for use in ORDER BY.
    #[must_use]
    pub fn order_case(&self) -> String {
        let mut out = format!("CASE {}", self.column);
        for (position, key) in self.keys.iter().enumerate() {
            out.push_str(&format!(" WHEN {} THEN {position}", quote(key)));
        }
        out.push_str(&format!(" ELSE {} END", self.keys.len()));
        out
    }

    /// Appends the restriction to an existing WHERE clause.
    #[must_use]
    pub fn and_where(&self, existing: Option<&str>) -> String {
        match existing {
            Some(clause) if !clause.trim().is_empty() => {
                format!("({clause}) AND {}", self.in_clause())
            }
            _ => self.in_clause(),
        }
    }
}
