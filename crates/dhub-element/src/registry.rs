//! The [`ElementRegistry`]: scoped reads and copy-on-write writes over an
//! [`ElementStore`] and a [`BlobStore`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dhub_store::{BlobStore, StoreError};
use dhub_types::{Access, BlobId, DatasetId, ElementId};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::element::{Element, ElementMetadata};
use crate::error::{ElementError, ElementResult};
use crate::patch::{ContentSource, ElementPatch, NewElement};
use crate::traits::ElementStore;

/// Default cap on batch operations and pages.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// How many clone generations [`ElementRegistry::discover_real_id`] follows.
pub const MAX_LINEAGE_DEPTH: usize = 64;

/// What happened to the elements touched by a delete or a dataset release.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseReport {
    /// Elements the dataset was unlinked from; they live on for other owners.
    pub unlinked: usize,
    /// Elements destroyed.
    pub destroyed: usize,
    /// Clones created so that other owners keep their view.
    pub cloned: usize,
}

impl ReleaseReport {
    fn absorb(&mut self, other: ReleaseReport) {
        self.unlinked += other.unlinked;
        self.destroyed += other.destroyed;
        self.cloned += other.cloned;
    }
}

/// Element operations scoped to the dataset a caller acts through.
///
/// Reads only see elements the dataset owns unless the caller is an
/// administrator. Writes follow the copy-on-write protocol described in the
/// crate documentation. Nothing here locks across elements: two owners
/// mutating one shared element at the same time may race.
pub struct ElementRegistry {
    elements: Arc<dyn ElementStore>,
    blobs: Arc<dyn BlobStore>,
    page_size: usize,
}

/// Content resolution for one element of a batch create.
enum Draft {
    Stored(usize),
    External(String),
    Existing(BlobId),
}

impl ElementRegistry {
    pub fn new(elements: Arc<dyn ElementStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self::with_page_size(elements, blobs, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(
        elements: Arc<dyn ElementStore>,
        blobs: Arc<dyn BlobStore>,
        page_size: usize,
    ) -> Self {
        Self {
            elements,
            blobs,
            page_size,
        }
    }

    pub fn element_store(&self) -> &Arc<dyn ElementStore> {
        &self.elements
    }

    pub fn blob_store(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Create an element owned solely by `dataset`.
    pub fn create(
        &self,
        dataset: DatasetId,
        access: Access,
        new: NewElement,
    ) -> ElementResult<Element> {
        new.source.check_access(access)?;
        let (blob_id, external_ref) = match new.source {
            ContentSource::Content(bytes) => (Some(self.blobs.put(&bytes)?), None),
            ContentSource::ExternalRef(url) => (None, Some(url)),
            ContentSource::ExistingBlob(id) => {
                self.require_blob(&id)?;
                (Some(id), None)
            }
        };

        let element = Element::new(dataset, blob_id, external_ref, new.metadata);
        self.elements.insert(element.clone())?;
        info!(element = %element.id, dataset = %dataset, "element created");
        Ok(element)
    }

    /// Create many elements, writing all raw contents with one batched put.
    pub fn create_batch(
        &self,
        dataset: DatasetId,
        access: Access,
        news: Vec<NewElement>,
    ) -> ElementResult<Vec<Element>> {
        self.check_range(news.len())?;
        for new in &news {
            new.source.check_access(access)?;
        }

        let mut contents = Vec::new();
        let mut drafts: Vec<(ElementMetadata, Draft)> = Vec::with_capacity(news.len());
        for new in news {
            let draft = match new.source {
                ContentSource::Content(bytes) => {
                    contents.push(bytes);
                    Draft::Stored(contents.len() - 1)
                }
                ContentSource::ExternalRef(url) => Draft::External(url),
                ContentSource::ExistingBlob(id) => {
                    self.require_blob(&id)?;
                    Draft::Existing(id)
                }
            };
            drafts.push((new.metadata, draft));
        }

        let stored = self.blobs.put_batch(&contents, None)?;
        let mut created = Vec::with_capacity(drafts.len());
        for (metadata, draft) in drafts {
            let (blob_id, external_ref) = match draft {
                Draft::Stored(i) => (Some(stored[i]), None),
                Draft::External(url) => (None, Some(url)),
                Draft::Existing(id) => (Some(id), None),
            };
            let element = Element::new(dataset, blob_id, external_ref, metadata);
            self.elements.insert(element.clone())?;
            created.push(element);
        }

        info!(dataset = %dataset, count = created.len(), "elements created");
        Ok(created)
    }

    /// Insert a copy of `element` owned solely by `dataset`.
    ///
    /// The copy gets a new id and points back at `element` through
    /// `previous_id`; the referenced blob is unchanged.
    pub fn clone_into(&self, element: &Element, dataset: DatasetId) -> ElementResult<Element> {
        let clone = element.clone_for(dataset);
        self.elements.insert(clone.clone())?;
        debug!(from = %element.id, to = %clone.id, dataset = %dataset, "element cloned");
        Ok(clone)
    }

    // -----------------------------------------------------------------------
    // Copy-on-write writes
    // -----------------------------------------------------------------------

    /// Edit an element as seen through `dataset`.
    ///
    /// Patch content is stored before any ownership branching, so a size
    /// violation leaves every element untouched. Returns the element that
    /// now carries the edit, which is a new clone when `dataset` is not the
    /// primary owner of a shared element.
    pub fn edit(
        &self,
        id: &ElementId,
        dataset: DatasetId,
        access: Access,
        patch: ElementPatch,
    ) -> ElementResult<Element> {
        patch.check_access(access)?;
        let (element, acting) = self.load_for_mutation(id, dataset, access)?;
        if let Some(blob) = &patch.blob_id {
            self.require_blob(blob)?;
        }
        let stored = patch
            .content
            .as_deref()
            .map(|bytes| self.blobs.put(bytes))
            .transpose()?;

        let edited = self.apply_edit(element, acting, &patch, stored)?;
        info!(element = %id, result = %edited.id, dataset = %dataset, "element edited");
        Ok(edited)
    }

    /// Edit many elements. All contents are stored with one batched put
    /// before any element changes. Results follow input order.
    pub fn edit_batch(
        &self,
        dataset: DatasetId,
        access: Access,
        edits: Vec<(ElementId, ElementPatch)>,
    ) -> ElementResult<Vec<Element>> {
        self.check_range(edits.len())?;
        let ids: Vec<ElementId> = edits.iter().map(|(id, _)| *id).collect();
        reject_duplicates(&ids)?;

        let mut targets = Vec::with_capacity(edits.len());
        let mut missing = Vec::new();
        for ((id, patch), found) in edits.iter().zip(self.elements.get_many(&ids)?) {
            patch.check_access(access)?;
            match found {
                Some(element) => {
                    let acting = acting_owner(&element, dataset, access)?;
                    targets.push((element, acting));
                }
                None => missing.push(*id),
            }
        }
        if !missing.is_empty() {
            return Err(ElementError::NotFoundMany(missing));
        }
        for (_, patch) in &edits {
            if let Some(blob) = &patch.blob_id {
                self.require_blob(blob)?;
            }
        }

        let contents: Vec<Vec<u8>> = edits
            .iter()
            .filter_map(|(_, patch)| patch.content.clone())
            .collect();
        let mut stored = self.blobs.put_batch(&contents, None)?.into_iter();

        let mut results = Vec::with_capacity(edits.len());
        for ((element, acting), (_, patch)) in targets.into_iter().zip(&edits) {
            let blob = if patch.content.is_some() {
                stored.next()
            } else {
                None
            };
            results.push(self.apply_edit(element, acting, patch, blob)?);
        }

        info!(dataset = %dataset, count = results.len(), "elements edited");
        Ok(results)
    }

    /// Discard `dataset`'s view of an element. Blobs are never deleted here.
    pub fn delete(&self, id: &ElementId, dataset: DatasetId, access: Access) -> ElementResult<()> {
        let (element, acting) = self.load_for_mutation(id, dataset, access)?;
        let report = self.apply_delete(element, acting)?;
        info!(
            element = %id,
            dataset = %dataset,
            destroyed = report.destroyed,
            cloned = report.cloned,
            "element deleted"
        );
        Ok(())
    }

    /// Delete many elements. If any id is not visible through `dataset`,
    /// nothing is deleted. Returns how many elements were deleted.
    pub fn delete_batch(
        &self,
        dataset: DatasetId,
        access: Access,
        ids: &[ElementId],
    ) -> ElementResult<usize> {
        reject_duplicates(ids)?;
        let targets = self.get_batch(ids, dataset, access)?;
        let mut report = ReleaseReport::default();
        for element in targets {
            let acting = acting_owner(&element, dataset, access)?;
            report.absorb(self.apply_delete(element, acting)?);
        }
        info!(
            dataset = %dataset,
            count = ids.len(),
            destroyed = report.destroyed,
            cloned = report.cloned,
            "elements deleted"
        );
        Ok(ids.len())
    }

    // -----------------------------------------------------------------------
    // Scoped reads
    // -----------------------------------------------------------------------

    pub fn get_info(
        &self,
        id: &ElementId,
        dataset: DatasetId,
        access: Access,
    ) -> ElementResult<Element> {
        match self.elements.get(id)? {
            Some(element) if is_visible(&element, dataset, access) => Ok(element),
            _ => Err(ElementError::NotFound(*id)),
        }
    }

    /// Visible elements in input order. Fails listing every missing id.
    pub fn get_batch(
        &self,
        ids: &[ElementId],
        dataset: DatasetId,
        access: Access,
    ) -> ElementResult<Vec<Element>> {
        self.check_range(ids.len())?;
        let mut found = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for (id, slot) in ids.iter().zip(self.elements.get_many(ids)?) {
            match slot {
                Some(element) if is_visible(&element, dataset, access) => found.push(element),
                _ => missing.push(*id),
            }
        }
        if !missing.is_empty() {
            return Err(ElementError::NotFoundMany(missing));
        }
        Ok(found)
    }

    /// One page of the dataset's elements, ordered by addition time.
    pub fn get_page(
        &self,
        dataset: DatasetId,
        page: usize,
        page_size: usize,
    ) -> ElementResult<Vec<Element>> {
        if page_size == 0 || page_size > self.page_size {
            return Err(ElementError::RangeExceeded {
                requested: page_size,
                limit: self.page_size,
            });
        }
        Ok(self
            .elements
            .owned_by(&dataset)?
            .into_iter()
            .skip(page.saturating_mul(page_size))
            .take(page_size)
            .collect())
    }

    pub fn get_content(
        &self,
        id: &ElementId,
        dataset: DatasetId,
        access: Access,
    ) -> ElementResult<Vec<u8>> {
        let element = self.get_info(id, dataset, access)?;
        let blob = element.blob_id.ok_or(ElementError::NotFound(*id))?;
        Ok(self.blobs.get(&blob)?.data)
    }

    /// Contents of visible elements in input order.
    pub fn get_contents(
        &self,
        ids: &[ElementId],
        dataset: DatasetId,
        access: Access,
    ) -> ElementResult<Vec<Vec<u8>>> {
        let elements = self.get_batch(ids, dataset, access)?;
        let mut blob_ids = Vec::with_capacity(elements.len());
        let mut without_blob = Vec::new();
        for element in &elements {
            match element.blob_id {
                Some(blob) => blob_ids.push(blob),
                None => without_blob.push(element.id),
            }
        }
        if !without_blob.is_empty() {
            return Err(ElementError::NotFoundMany(without_blob));
        }
        Ok(self
            .blobs
            .get_batch(&blob_ids)?
            .into_iter()
            .map(|b| b.data)
            .collect())
    }

    /// Translate stale ids into the ids `dataset` now sees for them.
    ///
    /// Each id is followed forward through `previous_id` links, breadth
    /// first, and mapped to the nearest successor owned by `dataset`. Ids
    /// the dataset still owns, and ids with no such successor, are left out.
    pub fn discover_real_id(
        &self,
        dataset: DatasetId,
        old_ids: &[ElementId],
    ) -> ElementResult<HashMap<ElementId, ElementId>> {
        self.check_range(old_ids.len())?;
        let mut resolved = HashMap::new();
        for old in old_ids {
            if let Some(current) = self.elements.get(old)? {
                if current.is_owned_by(&dataset) {
                    continue;
                }
            }
            if let Some(found) = self.follow_lineage(*old, dataset)? {
                resolved.insert(*old, found);
            }
        }
        Ok(resolved)
    }

    pub fn count(&self, dataset: DatasetId) -> ElementResult<usize> {
        self.elements.count_owned_by(&dataset)
    }

    // -----------------------------------------------------------------------
    // Sharing
    // -----------------------------------------------------------------------

    /// Link selected elements of `source` into `target` without copying.
    pub fn share(
        &self,
        ids: &[ElementId],
        source: DatasetId,
        target: DatasetId,
        access: Access,
    ) -> ElementResult<Vec<Element>> {
        let mut elements = self.get_batch(ids, source, access)?;
        for element in &mut elements {
            if element.link(target) {
                self.elements.update(element.clone())?;
            }
        }
        info!(source = %source, target = %target, count = elements.len(), "elements shared");
        Ok(elements)
    }

    /// Link every element of `source` into `target`. Returns how many
    /// elements gained the new owner.
    pub fn link_dataset(&self, source: DatasetId, target: DatasetId) -> ElementResult<usize> {
        let mut linked = 0;
        for mut element in self.elements.owned_by(&source)? {
            if element.link(target) {
                self.elements.update(element)?;
                linked += 1;
            }
        }
        debug!(source = %source, target = %target, linked, "dataset elements linked");
        Ok(linked)
    }

    /// Run the delete branch for every element `dataset` owns.
    pub fn release_dataset(&self, dataset: DatasetId) -> ElementResult<ReleaseReport> {
        let mut report = ReleaseReport::default();
        for element in self.elements.owned_by(&dataset)? {
            report.absorb(self.apply_delete(element, dataset)?);
        }
        info!(
            dataset = %dataset,
            unlinked = report.unlinked,
            destroyed = report.destroyed,
            cloned = report.cloned,
            "dataset elements released"
        );
        Ok(report)
    }

    /// Insert archived elements as owned solely by `dataset`.
    ///
    /// Archived ids are kept unless an element with that id is still live,
    /// in which case the restored row gets a fresh id whose `previous_id`
    /// is the archived one.
    pub fn restore(&self, dataset: DatasetId, archived: Vec<Element>) -> ElementResult<Vec<Element>> {
        let mut restored = Vec::with_capacity(archived.len());
        let mut renamed = 0usize;
        for mut element in archived {
            element.owners = vec![dataset];
            if self.elements.get(&element.id)?.is_some() {
                element.previous_id = Some(element.id);
                element.id = ElementId::new();
                renamed += 1;
            }
            self.elements.insert(element.clone())?;
            restored.push(element);
        }
        info!(dataset = %dataset, count = restored.len(), renamed, "elements restored");
        Ok(restored)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn check_range(&self, requested: usize) -> ElementResult<()> {
        if requested > self.page_size {
            return Err(ElementError::RangeExceeded {
                requested,
                limit: self.page_size,
            });
        }
        Ok(())
    }

    fn require_blob(&self, id: &BlobId) -> ElementResult<()> {
        if !self.blobs.contains(id)? {
            return Err(StoreError::NotFound(*id).into());
        }
        Ok(())
    }

    fn load_for_mutation(
        &self,
        id: &ElementId,
        dataset: DatasetId,
        access: Access,
    ) -> ElementResult<(Element, DatasetId)> {
        let element = self.elements.get(id)?.ok_or(ElementError::NotFound(*id))?;
        let acting = acting_owner(&element, dataset, access)?;
        Ok((element, acting))
    }

    fn apply_edit(
        &self,
        mut element: Element,
        acting: DatasetId,
        patch: &ElementPatch,
        stored: Option<BlobId>,
    ) -> ElementResult<Element> {
        if !element.is_shared() || element.primary() == Some(acting) {
            self.split_off_forks(&mut element)?;
            patch.apply(&mut element, stored);
            self.elements.update(element.clone())?;
            return Ok(element);
        }

        element.unlink(&acting);
        self.elements.update(element.clone())?;
        let mut clone = element.clone_for(acting);
        patch.apply(&mut clone, stored);
        if let Err(e) = self.elements.insert(clone.clone()) {
            error!(element = %element.id, dataset = %acting, error = %e, "clone for editing fork failed");
            return Err(ElementError::PartialFanOut {
                element: element.id,
                missing: vec![acting],
            });
        }
        Ok(clone)
    }

    fn apply_delete(&self, mut element: Element, acting: DatasetId) -> ElementResult<ReleaseReport> {
        if element.is_shared() && element.primary() != Some(acting) {
            element.unlink(&acting);
            self.elements.update(element)?;
            return Ok(ReleaseReport {
                unlinked: 1,
                ..ReleaseReport::default()
            });
        }

        let cloned = self.split_off_forks(&mut element)?;
        self.elements.remove(&element.id)?;
        Ok(ReleaseReport {
            destroyed: 1,
            cloned,
            ..ReleaseReport::default()
        })
    }

    /// Unlink every non-primary owner and give each a clone of the current
    /// state. On return `element` is owned only by its primary.
    fn split_off_forks(&self, element: &mut Element) -> ElementResult<usize> {
        if !element.is_shared() {
            return Ok(0);
        }
        let forks: Vec<DatasetId> = element.owners.drain(1..).collect();
        self.elements.update(element.clone())?;

        let mut missing = Vec::new();
        for fork in &forks {
            let clone = element.clone_for(*fork);
            if let Err(e) = self.elements.insert(clone) {
                warn!(element = %element.id, dataset = %fork, error = %e, "fork clone failed");
                missing.push(*fork);
            }
        }
        if !missing.is_empty() {
            error!(
                element = %element.id,
                missing = missing.len(),
                forks = forks.len(),
                "copy-on-write fan-out incomplete"
            );
            return Err(ElementError::PartialFanOut {
                element: element.id,
                missing,
            });
        }

        debug!(element = %element.id, forks = forks.len(), "forks split off");
        Ok(forks.len())
    }

    fn follow_lineage(&self, old: ElementId, dataset: DatasetId) -> ElementResult<Option<ElementId>> {
        let mut seen = HashSet::from([old]);
        let mut frontier = vec![old];
        for _ in 0..MAX_LINEAGE_DEPTH {
            let next = self.elements.successors_of(&frontier)?;
            if let Some(hit) = next.iter().find(|e| e.is_owned_by(&dataset)) {
                return Ok(Some(hit.id));
            }
            frontier = next
                .into_iter()
                .map(|e| e.id)
                .filter(|id| seen.insert(*id))
                .collect();
            if frontier.is_empty() {
                break;
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for ElementRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementRegistry")
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

fn reject_duplicates(ids: &[ElementId]) -> ElementResult<()> {
    let mut seen = HashSet::with_capacity(ids.len());
    match ids.iter().find(|id| !seen.insert(**id)) {
        Some(dup) => Err(ElementError::Validation(format!(
            "element {dup} appears twice in one batch"
        ))),
        None => Ok(()),
    }
}

fn is_visible(element: &Element, dataset: DatasetId, access: Access) -> bool {
    access.is_admin() || element.is_owned_by(&dataset)
}

/// The owner whose view a mutation through `dataset` changes. Administrators
/// acting through a non-owner act as the primary owner.
fn acting_owner(element: &Element, dataset: DatasetId, access: Access) -> ElementResult<DatasetId> {
    if element.is_owned_by(&dataset) {
        return Ok(dataset);
    }
    if access.is_admin() {
        return element
            .primary()
            .ok_or_else(|| ElementError::Backend(format!("element {} has no owners", element.id)));
    }
    Err(ElementError::Forbidden(format!(
        "element {} is not owned by dataset {dataset}",
        element.id
    )))
}
