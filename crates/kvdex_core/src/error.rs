//! Error types for kvdex core.

use kvdex_storage::StoreError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in kvdex core operations.
///
/// The planner and the statement entry points of the indexer recover store
/// failures locally; the only error they surface to callers is
/// [`CoreError::SchemaViolation`].
#[derive(Debug, Error)]
pub enum CoreError {
    /// A statement does not fit the declared schema, e.g. an UPDATE whose
    /// WHERE clause names neither the primary key nor an indexed field.
    #[error("schema violation on table {table}: {message}")]
    SchemaViolation {
        /// Table the statement targets.
        table: String,
        /// Description of the violation.
        message: String,
    },

    /// A schema definition is malformed.
    #[error("invalid schema for table {table:?}: {message}")]
    InvalidSchema {
        /// Table the schema describes.
        table: String,
        /// Description of the problem.
        message: String,
    },

    /// Schema document could not be parsed.
    #[error("schema parse error: {0}")]
    SchemaParse(#[from] serde_json::Error),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl CoreError {
    /// Creates a schema violation error.
    pub fn schema_violation(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaViolation {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Returns true if the error is a caller contract violation.
    pub fn is_schema_violation(&self) -> bool {
        matches!(self, CoreError::SchemaViolation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CoreError::schema_violation("orders", "WHERE must reference the primary key");
        assert_eq!(
            err.to_string(),
            "schema violation on table orders: WHERE must reference the primary key"
        );
        assert!(err.is_schema_violation());
    }

    #[test]
    fn store_errors_convert() {
        let err: CoreError = StoreError::unavailable("down").into();
        assert!(matches!(err, CoreError::Store(_)));
        assert!(!err.is_schema_violation());
    }
}
