//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
///
/// A missing key is never an error: absence is reported through empty
/// collections or `None`. Only failures of the backing service surface here.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing service could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backing service rejected or failed a command.
    #[error("backend error: {0}")]
    Backend(String),

    /// The backing service answered with an unexpected reply shape.
    #[error("unexpected reply to {command}: {detail}")]
    UnexpectedReply {
        /// Name of the command that was sent.
        command: &'static str,
        /// Description of the reply that was received.
        detail: String,
    },

    /// A key pattern could not be compiled.
    #[error("invalid key pattern {pattern:?}: {message}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        message: String,
    },
}

impl StoreError {
    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Returns true if the error is a connectivity failure.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_is_classified() {
        assert!(StoreError::unavailable("connection refused").is_unavailable());
        assert!(!StoreError::backend("WRONGTYPE").is_unavailable());
    }

    #[test]
    fn error_display() {
        let err = StoreError::UnexpectedReply {
            command: "ZRANGE",
            detail: "integer".into(),
        };
        assert_eq!(err.to_string(), "unexpected reply to ZRANGE: integer");
    }
}
