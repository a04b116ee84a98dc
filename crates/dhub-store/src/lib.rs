//! Content-addressed blob storage for DataHub.
//!
//! Element content lives here as immutable blobs keyed by the BLAKE3 hash of
//! their bytes. Writing the same bytes twice yields the same [`BlobId`], so
//! datasets that fork and share elements never duplicate content.
//!
//! # Storage Backends
//!
//! All backends implement the [`BlobStore`] trait:
//!
//! - [`InMemoryBlobStore`] — `HashMap`-based store for tests and embedding
//! - [`DirectoryBlobStore`] — one file per blob under a sharded directory
//!
//! # Design Rules
//!
//! 1. Blobs are never mutated once written.
//! 2. The store never checks references: deletion is unconditional and the
//!    garbage collector is responsible for only deleting unreferenced blobs.
//! 3. Dedup check and insert happen under one write lock, so concurrent puts
//!    of identical content converge on a single id.
//! 4. Forced ids exist only for the restore path.
//!
//! [`BlobId`]: dhub_types::BlobId

pub mod blob;
pub mod directory;
pub mod error;
pub mod hasher;
pub mod memory;
pub mod traits;

pub use blob::{Blob, BlobInfo};
pub use directory::DirectoryBlobStore;
pub use error::{StoreError, StoreResult};
pub use hasher::ContentHasher;
pub use memory::InMemoryBlobStore;
pub use traits::{BlobIds, BlobStore};

/// Default upper bound on the size of a single blob (16 MiB).
pub const DEFAULT_MAX_BLOB_SIZE: u64 = 16 * 1024 * 1024;
