use dhub_types::{BlobId, ContentHash};

/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested blob was not found.
    #[error("blob not found: {0}")]
    NotFound(BlobId),

    /// The blob is larger than the configured limit.
    #[error("blob of {size} bytes exceeds the size limit of {limit} bytes")]
    SizeExceeded { size: u64, limit: u64 },

    /// Content hash mismatch on read (data corruption).
    #[error("hash mismatch for {id}: expected {expected}, computed {computed}")]
    HashMismatch {
        id: BlobId,
        expected: ContentHash,
        computed: ContentHash,
    },

    /// The persisted blob cannot be decoded.
    #[error("corrupt blob {id}: {reason}")]
    CorruptBlob { id: BlobId, reason: String },

    /// A batch request is malformed (e.g. forced ids do not line up).
    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend is unusable (e.g. a poisoned lock).
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
