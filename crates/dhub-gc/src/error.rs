//! Error types for garbage collection.

use dhub_element::ElementError;
use dhub_store::StoreError;
use thiserror::Error;

/// Errors that abort a collection cycle.
///
/// Individual delete failures do not abort a cycle; they are counted in the
/// report instead.
#[derive(Debug, Error)]
pub enum GcError {
    /// The blob store failed while enumerating.
    #[error("blob store error: {0}")]
    Store(#[from] StoreError),

    /// The element store failed a reference lookup.
    #[error("element store error: {0}")]
    Element(#[from] ElementError),

    /// The collector has been stopped.
    #[error("garbage collector is stopped")]
    Stopped,

    /// The worker thread could not be started.
    #[error("failed to spawn gc worker: {0}")]
    Spawn(#[from] std::io::Error),

    /// Internal state is unusable (poisoned lock, panicked worker).
    #[error("gc backend error: {0}")]
    Backend(String),
}

/// Convenience type alias for collection operations.
pub type GcResult<T> = std::result::Result<T, GcError>;
