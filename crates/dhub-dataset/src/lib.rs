//! Dataset lifecycle for DataHub.
//!
//! A dataset is a named collection of elements. Membership is implicit: an
//! element belongs to every dataset listed among its owners. Forking a
//! dataset links all of its elements into the new dataset without copying
//! anything; later edits are isolated by the element copy-on-write protocol.
//!
//! # Modules
//!
//! - [`error`] — Error types for dataset operations
//! - [`dataset`] — [`Dataset`] rows, metadata and patches
//! - [`names`] — Dataset name validation and slug construction
//! - [`locks`] — Per-slug advisory locks
//! - [`traits`] — The [`DatasetStore`] persistence seam
//! - [`memory`] — [`InMemoryDatasetStore`] with a unique slug index
//! - [`archive`] — [`DatasetArchive`] for backup and restore
//! - [`registry`] — [`DatasetRegistry`], the dataset front end

pub mod archive;
pub mod dataset;
pub mod error;
pub mod locks;
pub mod memory;
pub mod names;
pub mod registry;
pub mod traits;

pub use archive::DatasetArchive;
pub use dataset::{Dataset, DatasetMetadata, DatasetPatch, DatasetSummary, MetadataPatch};
pub use error::{DatasetError, DatasetResult};
pub use locks::{SlugGuard, SlugLocks};
pub use memory::InMemoryDatasetStore;
pub use names::{slug_for, validate_name, ILLEGAL_CHARS};
pub use registry::DatasetRegistry;
pub use traits::DatasetStore;
