//! Error types for the diff crate.

/// Errors that can occur while diffing or validating a schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiffError {
    /// A value did not have the shape its schema declares.
    #[error("unexpected shape at {path}: expected {expected}, got {actual}")]
    UnexpectedShape {
        path: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// The schema itself is inconsistent.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
