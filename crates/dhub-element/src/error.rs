//! Error types for element operations.

use dhub_store::StoreError;
use dhub_types::{DatasetId, ElementId};
use thiserror::Error;

/// Errors that can occur during element operations.
#[derive(Debug, Error)]
pub enum ElementError {
    /// The request is malformed (e.g. no content source supplied).
    #[error("invalid element request: {0}")]
    Validation(String),

    /// The element does not exist or is not visible through the dataset.
    #[error("element not found: {0}")]
    NotFound(ElementId),

    /// Several requested elements are missing.
    #[error("elements not found: {}", join_ids(.0))]
    NotFoundMany(Vec<ElementId>),

    /// An element with this id is already stored.
    #[error("element already exists: {0}")]
    AlreadyExists(ElementId),

    /// The caller may not perform this operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A batch or page is larger than the configured page size.
    #[error("range exceeded: requested {requested}, limit {limit}")]
    RangeExceeded { requested: usize, limit: usize },

    /// Copy-on-write fan-out stopped partway. The listed datasets were
    /// unlinked from the element but did not receive their clone.
    #[error("partial copy-on-write fan-out for {element}: no clone for {}", join_ids(.missing))]
    PartialFanOut {
        element: ElementId,
        missing: Vec<DatasetId>,
    },

    /// Blob store failure, including size limit violations.
    #[error("blob store error: {0}")]
    Store(#[from] StoreError),

    /// The element backend is unusable (e.g. a poisoned lock).
    #[error("element backend error: {0}")]
    Backend(String),
}

fn join_ids<T: std::fmt::Display>(ids: &[T]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience type alias for element operations.
pub type ElementResult<T> = std::result::Result<T, ElementError>;
