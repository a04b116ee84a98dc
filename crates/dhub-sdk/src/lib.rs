//! High-level SDK for DataHub.
//!
//! [`DataHub`] builds every component from a [`HubConfig`] and exposes the
//! registries, the blob store and the garbage collector behind one handle.
//! This is the main entry point for applications embedding the storage core.

pub mod config;
pub mod error;
pub mod hub;

pub use config::{GcSettings, HubConfig, LimitsConfig, StorageBackend, StorageConfig};
pub use error::{ErrorKind, HubError, HubResult};
pub use hub::{DataHub, DatasetBundle};

// Re-export key types
pub use dhub_dataset::{Dataset, DatasetArchive, DatasetMetadata, DatasetPatch, MetadataPatch};
pub use dhub_element::{ContentSource, Element, ElementMetadata, ElementPatch, NewElement};
pub use dhub_gc::{GcReport, GcWorker};
pub use dhub_types::{Access, BlobId, DatasetId, ElementId};
