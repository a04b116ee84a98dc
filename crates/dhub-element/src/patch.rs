use chrono::Utc;
use dhub_types::{Access, BlobId};
use serde::{Deserialize, Serialize};

use crate::element::{Element, ElementMetadata};
use crate::error::{ElementError, ElementResult};

/// Where a new element's content comes from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
    /// Raw bytes, written to the blob store.
    Content(Vec<u8>),
    /// A reference to content hosted elsewhere.
    ExternalRef(String),
    /// A blob that is already stored. Administrative only.
    ExistingBlob(BlobId),
}

impl ContentSource {
    /// Build a source from optional transport fields.
    ///
    /// Exactly one of the three must be present.
    pub fn from_parts(
        content: Option<Vec<u8>>,
        external_ref: Option<String>,
        blob_id: Option<BlobId>,
    ) -> ElementResult<Self> {
        match (content, external_ref, blob_id) {
            (Some(bytes), None, None) => Ok(Self::Content(bytes)),
            (None, Some(url), None) => Ok(Self::ExternalRef(url)),
            (None, None, Some(id)) => Ok(Self::ExistingBlob(id)),
            (None, None, None) => Err(ElementError::Validation(
                "content, an external reference or a blob id is required".into(),
            )),
            _ => Err(ElementError::Validation(
                "only one of content, external reference or blob id may be given".into(),
            )),
        }
    }

    pub(crate) fn check_access(&self, access: Access) -> ElementResult<()> {
        if matches!(self, Self::ExistingBlob(_)) && !access.is_admin() {
            return Err(ElementError::Forbidden(
                "only administrators may create elements from an existing blob".into(),
            ));
        }
        Ok(())
    }
}

/// Input for creating an element.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewElement {
    pub metadata: ElementMetadata,
    pub source: ContentSource,
}

impl NewElement {
    pub fn new(metadata: ElementMetadata, source: ContentSource) -> Self {
        Self { metadata, source }
    }

    /// Element with a title and raw content.
    pub fn with_content(title: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self::new(
            ElementMetadata::titled(title),
            ContentSource::Content(content.into()),
        )
    }
}

/// Partial update of an element. `None` fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub external_ref: Option<String>,
    /// New content, written to the blob store before any branching.
    pub content: Option<Vec<u8>>,
    /// Point the element at an existing blob. Administrative only.
    pub blob_id: Option<BlobId>,
}

impl ElementPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn content(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub(crate) fn check_access(&self, access: Access) -> ElementResult<()> {
        if self.content.is_some() && self.blob_id.is_some() {
            return Err(ElementError::Validation(
                "a patch may carry content or a blob id, not both".into(),
            ));
        }
        if self.blob_id.is_some() && !access.is_admin() {
            return Err(ElementError::Forbidden(
                "only administrators may set the blob id".into(),
            ));
        }
        Ok(())
    }

    /// Merge the set fields into `element`.
    ///
    /// `stored_blob` is the id the patch content was written under, if the
    /// patch carried content.
    pub(crate) fn apply(&self, element: &mut Element, stored_blob: Option<BlobId>) {
        if let Some(title) = &self.title {
            element.metadata.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            element.metadata.description.clone_from(description);
        }
        if let Some(tags) = &self.tags {
            element.metadata.tags.clone_from(tags);
        }
        if let Some(url) = &self.external_ref {
            element.external_ref = Some(url.clone());
        }
        if let Some(blob) = stored_blob.or(self.blob_id) {
            element.blob_id = Some(blob);
        }
        element.modified_at = Utc::now();
    }
}
