use dhub_types::{BlobId, ContentHash};
use serde::{Deserialize, Serialize};

use crate::hasher::ContentHasher;

/// A stored blob: identity, dedup key, cached size and the bytes themselves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    pub id: BlobId,
    pub content_hash: ContentHash,
    pub size: u64,
    pub data: Vec<u8>,
}

impl Blob {
    /// Build a blob whose id is derived from its content.
    pub fn new(data: Vec<u8>) -> Self {
        let content_hash = ContentHasher::BLOB.hash(&data);
        Self::with_hash(BlobId::derive(&content_hash), content_hash, data)
    }

    /// Build a blob at an explicit id (restore path).
    pub fn with_id(id: BlobId, data: Vec<u8>) -> Self {
        let content_hash = ContentHasher::BLOB.hash(&data);
        Self::with_hash(id, content_hash, data)
    }

    pub(crate) fn with_hash(id: BlobId, content_hash: ContentHash, data: Vec<u8>) -> Self {
        Self {
            id,
            content_hash,
            size: data.len() as u64,
            data,
        }
    }

    /// Metadata without the bytes.
    pub fn info(&self) -> BlobInfo {
        BlobInfo {
            id: self.id,
            content_hash: self.content_hash,
            size: self.size,
        }
    }
}

/// Blob metadata as persisted alongside the bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobInfo {
    pub id: BlobId,
    pub content_hash: ContentHash,
    pub size: u64,
}
