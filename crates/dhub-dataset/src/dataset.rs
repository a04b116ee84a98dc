use chrono::{DateTime, Utc};
use dhub_types::DatasetId;
use serde::{Deserialize, Serialize};

/// Descriptive fields of a dataset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub title: String,
    pub description: String,
    pub reference: String,
    pub tags: Vec<String>,
}

impl DatasetMetadata {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// A dataset row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    /// Globally unique `owner/name` path.
    pub slug: String,
    pub fork_count: u64,
    pub forked_from_id: Option<DatasetId>,
    pub metadata: DatasetMetadata,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Dataset {
    pub fn new(slug: String, metadata: DatasetMetadata) -> Self {
        let now = Utc::now();
        Self {
            id: DatasetId::new(),
            slug,
            fork_count: 0,
            forked_from_id: None,
            metadata,
            created_at: now,
            modified_at: now,
        }
    }

    /// The part of the slug before the first `/`.
    pub fn owner_prefix(&self) -> &str {
        self.slug.split('/').next().unwrap_or_default()
    }
}

/// Optional overrides for dataset metadata. `None` fields are left as is.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl MetadataPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn apply(&self, metadata: &mut DatasetMetadata) {
        if let Some(title) = &self.title {
            metadata.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            metadata.description.clone_from(description);
        }
        if let Some(reference) = &self.reference {
            metadata.reference.clone_from(reference);
        }
        if let Some(tags) = &self.tags {
            metadata.tags.clone_from(tags);
        }
    }
}

/// Partial update of a dataset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetPatch {
    /// New name; re-validated and turned into a slug like on creation.
    pub name: Option<String>,
    #[serde(flatten)]
    pub metadata: MetadataPatch,
}

/// A dataset together with derived facts about it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub dataset: Dataset,
    pub elements_count: usize,
    /// Slug of the dataset this one was forked from, if it still exists.
    pub fork_father: Option<String>,
}
