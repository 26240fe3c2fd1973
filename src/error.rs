//! Error types for the cobble block-transformation engine.
//!
//! All operations fail synchronously and never expose partial results; there
//! are no internal retries.

use thiserror::Error;

/// The primary error type for cobble operations.
#[derive(Error, Debug)]
pub enum CobbleError {
    /// Irreconcilable column types across input schemas. Fatal to the merge
    /// call; carries the column name and every type observed for it.
    #[error("schema conflict in column '{column}': incompatible types [{}]", .types.join(", "))]
    SchemaConflict { column: String, types: Vec<String> },

    /// A schema or type error encountered while concatenating blocks. Wraps
    /// the underlying failure and carries the input schemas for diagnosis.
    #[error("failed to concatenate blocks: {message}")]
    Concatenation {
        message: String,
        #[source]
        source: Box<CobbleError>,
    },

    /// A non-extension column type mismatch that survived schema unification.
    /// Unreachable when unification succeeded; treated as an invariant
    /// violation.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Malformed caller input: bad partition count, out-of-bounds selection
    /// indices, duplicate field names, unknown columns.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Error surfaced by the underlying columnar runtime.
    #[error("arrow error: {message}")]
    Arrow { message: String },
}

impl CobbleError {
    /// Create a schema conflict error for a column and its observed types.
    pub fn schema_conflict(column: impl Into<String>, types: Vec<String>) -> Self {
        Self::SchemaConflict {
            column: column.into(),
            types,
        }
    }

    /// Wrap a lower-level error encountered during concatenation.
    pub fn concatenation(message: impl Into<String>, source: CobbleError) -> Self {
        Self::Concatenation {
            message: message.into(),
            source: Box::new(source),
        }
    }

    /// Create a type mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

impl From<arrow::error::ArrowError> for CobbleError {
    fn from(err: arrow::error::ArrowError) -> Self {
        Self::Arrow {
            message: err.to_string(),
        }
    }
}

/// Result type alias for cobble operations.
pub type Result<T> = std::result::Result<T, CobbleError>;
