//! Dataset archives for the backup collaborator.
//!
//! An archive carries the dataset header and its element rows. Blob bytes
//! are not included: the backup side copies them separately through the
//! blob store and restores them at their original ids.

use std::collections::BTreeSet;

use dhub_element::Element;
use dhub_types::BlobId;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::{DatasetError, DatasetResult};

/// Full serialization of one dataset, excluding blob bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetArchive {
    pub header: Dataset,
    pub elements: Vec<Element>,
}

impl DatasetArchive {
    /// Distinct blobs referenced by the archived elements, sorted.
    pub fn blob_ids(&self) -> Vec<BlobId> {
        self.elements
            .iter()
            .filter_map(|e| e.blob_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn to_json(&self) -> DatasetResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| DatasetError::Serialization(e.to_string()))
    }

    pub fn from_json(bytes: &[u8]) -> DatasetResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| DatasetError::Serialization(e.to_string()))
    }
}
