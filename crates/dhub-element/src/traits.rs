//! The [`ElementStore`] trait defining element persistence.

use dhub_types::{BlobId, DatasetId, ElementId};

use crate::element::Element;
use crate::error::ElementResult;

/// Storage backend for element rows.
///
/// Implementations must be thread-safe and keep three lookups cheap: by
/// owner, by referenced blob (for garbage collection) and by `previous_id`
/// (for stale id discovery). Single-row operations are atomic; nothing
/// spans rows.
pub trait ElementStore: Send + Sync {
    /// Read an element. Returns `Ok(None)` if it does not exist.
    fn get(&self, id: &ElementId) -> ElementResult<Option<Element>>;

    /// Read many elements, one slot per requested id, in input order.
    fn get_many(&self, ids: &[ElementId]) -> ElementResult<Vec<Option<Element>>> {
        ids.iter().map(|id| self.get(id)).collect()
    }

    /// Insert a new element. Fails with `AlreadyExists` if the id is taken.
    fn insert(&self, element: Element) -> ElementResult<()>;

    /// Replace an existing element. Fails with `NotFound` if it is missing.
    fn update(&self, element: Element) -> ElementResult<()>;

    /// Remove an element, returning it if it existed.
    fn remove(&self, id: &ElementId) -> ElementResult<Option<Element>>;

    /// Every element owned by `dataset`, ordered by `(added_at, id)`.
    fn owned_by(&self, dataset: &DatasetId) -> ElementResult<Vec<Element>>;

    /// Number of elements owned by `dataset`.
    fn count_owned_by(&self, dataset: &DatasetId) -> ElementResult<usize> {
        Ok(self.owned_by(dataset)?.len())
    }

    /// Elements whose `previous_id` is one of `ids`.
    fn successors_of(&self, ids: &[ElementId]) -> ElementResult<Vec<Element>>;

    /// Whether any element references `blob`.
    fn references_blob(&self, blob: &BlobId) -> ElementResult<bool>;

    /// Total number of elements.
    fn len(&self) -> ElementResult<usize>;

    fn is_empty(&self) -> ElementResult<bool> {
        Ok(self.len()? == 0)
    }
}
