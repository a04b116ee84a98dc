//! The [`DatasetStore`] trait defining dataset persistence.

use dhub_types::DatasetId;

use crate::dataset::Dataset;
use crate::error::DatasetResult;

/// Storage backend for dataset rows.
///
/// Implementations enforce slug uniqueness themselves: `insert` and
/// `update` fail with `Conflict` when another row already holds the slug.
pub trait DatasetStore: Send + Sync {
    /// Read a dataset by id. Returns `Ok(None)` if it does not exist.
    fn get(&self, id: &DatasetId) -> DatasetResult<Option<Dataset>>;

    /// Read a dataset by slug. Returns `Ok(None)` if it does not exist.
    fn get_by_slug(&self, slug: &str) -> DatasetResult<Option<Dataset>>;

    /// Insert a new dataset.
    fn insert(&self, dataset: Dataset) -> DatasetResult<()>;

    /// Replace an existing dataset, re-checking slug uniqueness.
    fn update(&self, dataset: Dataset) -> DatasetResult<()>;

    /// Remove a dataset, returning it if it existed.
    fn remove(&self, id: &DatasetId) -> DatasetResult<Option<Dataset>>;

    /// All datasets ordered by `(created_at, id)`.
    fn list(&self) -> DatasetResult<Vec<Dataset>>;

    fn len(&self) -> DatasetResult<usize> {
        Ok(self.list()?.len())
    }

    fn is_empty(&self) -> DatasetResult<bool> {
        Ok(self.len()? == 0)
    }
}
