//! Error types for dataset operations.

use dhub_element::ElementError;
use thiserror::Error;

/// Errors that can occur during dataset operations.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The dataset name or request is invalid.
    #[error("invalid dataset request: {0}")]
    Validation(String),

    /// The slug (or id) is already taken.
    #[error("conflict: {0}")]
    Conflict(String),

    /// No dataset with this id or slug.
    #[error("dataset not found: {0}")]
    NotFound(String),

    /// The caller may not perform this operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Failure in the element layer.
    #[error("element error: {0}")]
    Element(#[from] ElementError),

    /// Archive encoding or decoding failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The dataset backend is unusable (e.g. a poisoned lock).
    #[error("dataset backend error: {0}")]
    Backend(String),
}

/// Convenience type alias for dataset operations.
pub type DatasetResult<T> = std::result::Result<T, DatasetError>;
