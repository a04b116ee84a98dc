//! Foundation types for DataHub.
//!
//! Every other DataHub crate depends on `dhub-types`. It defines the
//! identifiers that appear in persisted rows and on the wire, plus the
//! [`Access`] level supplied by the authorization layer.
//!
//! # Key Types
//!
//! - [`BlobId`] — identifier of a stored blob (derived from its content hash)
//! - [`ContentHash`] — BLAKE3 digest of blob bytes, the dedup key
//! - [`ElementId`] — UUID v7 identifier of a dataset element
//! - [`DatasetId`] — UUID v7 identifier of a dataset
//! - [`Access`] — ordinary member vs. administrative bypass

pub mod access;
pub mod blob;
pub mod error;
pub mod record;

pub use access::Access;
pub use blob::{BlobId, ContentHash};
pub use error::TypeError;
pub use record::{DatasetId, ElementId};
