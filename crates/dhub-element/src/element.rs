use chrono::{DateTime, Utc};
use dhub_types::{BlobId, DatasetId, ElementId};
use serde::{Deserialize, Serialize};

/// Descriptive fields of an element.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

impl ElementMetadata {
    /// Metadata with only a title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// A dataset element.
///
/// `owners[0]` is the primary owner. An element always has at least one
/// owner; dropping the last one destroys it. Content lives either in the
/// blob store (`blob_id`) or behind an external reference, and the blob
/// itself is never touched by element operations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    pub owners: Vec<DatasetId>,
    pub blob_id: Option<BlobId>,
    pub external_ref: Option<String>,
    /// The element this one was cloned from, if any.
    pub previous_id: Option<ElementId>,
    pub metadata: ElementMetadata,
    pub added_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Element {
    /// A fresh element owned solely by `owner`.
    pub fn new(
        owner: DatasetId,
        blob_id: Option<BlobId>,
        external_ref: Option<String>,
        metadata: ElementMetadata,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ElementId::new(),
            owners: vec![owner],
            blob_id,
            external_ref,
            previous_id: None,
            metadata,
            added_at: now,
            modified_at: now,
        }
    }

    /// The primary owner.
    pub fn primary(&self) -> Option<DatasetId> {
        self.owners.first().copied()
    }

    pub fn is_owned_by(&self, dataset: &DatasetId) -> bool {
        self.owners.contains(dataset)
    }

    pub fn is_shared(&self) -> bool {
        self.owners.len() > 1
    }

    /// Append `dataset` to the owner list. Returns `false` if already present.
    pub fn link(&mut self, dataset: DatasetId) -> bool {
        if self.is_owned_by(&dataset) {
            return false;
        }
        self.owners.push(dataset);
        true
    }

    /// Remove `dataset` from the owner list. Returns `false` if absent.
    pub fn unlink(&mut self, dataset: &DatasetId) -> bool {
        let before = self.owners.len();
        self.owners.retain(|d| d != dataset);
        self.owners.len() != before
    }

    /// A copy of this element under a new id, owned solely by `dataset`.
    ///
    /// Content, metadata and timestamps are carried over unchanged and
    /// `previous_id` points back at this element.
    pub fn clone_for(&self, dataset: DatasetId) -> Self {
        Self {
            id: ElementId::new(),
            owners: vec![dataset],
            blob_id: self.blob_id,
            external_ref: self.external_ref.clone(),
            previous_id: Some(self.id),
            metadata: self.metadata.clone(),
            added_at: self.added_at,
            modified_at: self.modified_at,
        }
    }
}
