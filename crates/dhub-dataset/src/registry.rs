//! The [`DatasetRegistry`]: dataset lifecycle over a [`DatasetStore`] and an
//! [`ElementRegistry`].

use std::sync::Arc;

use chrono::Utc;
use dhub_element::{ElementRegistry, ReleaseReport};
use dhub_types::{Access, DatasetId};
use tracing::{debug, info, warn};

use crate::archive::DatasetArchive;
use crate::dataset::{Dataset, DatasetMetadata, DatasetPatch, DatasetSummary, MetadataPatch};
use crate::error::{DatasetError, DatasetResult};
use crate::locks::SlugLocks;
use crate::names::slug_for;
use crate::traits::DatasetStore;

/// Dataset lifecycle: create, fork, edit, delete, export and import.
pub struct DatasetRegistry {
    datasets: Arc<dyn DatasetStore>,
    elements: Arc<ElementRegistry>,
    slug_locks: SlugLocks,
}

impl DatasetRegistry {
    pub fn new(datasets: Arc<dyn DatasetStore>, elements: Arc<ElementRegistry>) -> Self {
        Self {
            datasets,
            elements,
            slug_locks: SlugLocks::new(),
        }
    }

    pub fn dataset_store(&self) -> &Arc<dyn DatasetStore> {
        &self.datasets
    }

    pub fn elements(&self) -> &Arc<ElementRegistry> {
        &self.elements
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Create an empty dataset named `name` under `owner_prefix`.
    ///
    /// Fails with `Conflict` if the resulting slug is taken.
    pub fn create(
        &self,
        owner_prefix: &str,
        name: &str,
        metadata: DatasetMetadata,
        access: Access,
    ) -> DatasetResult<Dataset> {
        let slug = slug_for(owner_prefix, name, access)?;
        let dataset = self.insert_new(Dataset::new(slug, metadata))?;
        info!(dataset = %dataset.id, slug = %dataset.slug, "dataset created");
        Ok(dataset)
    }

    /// Fork `source` into a new dataset that shares every element.
    ///
    /// Metadata is copied from the source and then overridden by the set
    /// fields of `overrides`. No element or blob is copied.
    pub fn fork(
        &self,
        source_id: &DatasetId,
        owner_prefix: &str,
        name: &str,
        overrides: MetadataPatch,
        access: Access,
    ) -> DatasetResult<Dataset> {
        let source = self.get(source_id)?;
        let slug = slug_for(owner_prefix, name, access)?;

        let mut metadata = source.metadata.clone();
        overrides.apply(&mut metadata);
        let mut fork = Dataset::new(slug, metadata);
        fork.forked_from_id = Some(source.id);
        let fork = self.insert_new(fork)?;

        let mut source = source;
        source.fork_count += 1;
        self.datasets.update(source.clone())?;

        let linked = self.elements.link_dataset(source.id, fork.id)?;
        info!(
            source = %source.slug,
            fork = %fork.slug,
            elements = linked,
            "dataset forked"
        );
        Ok(fork)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn get(&self, id: &DatasetId) -> DatasetResult<Dataset> {
        self.datasets
            .get(id)?
            .ok_or_else(|| DatasetError::NotFound(id.to_string()))
    }

    pub fn get_by_slug(&self, slug: &str) -> DatasetResult<Dataset> {
        self.datasets
            .get_by_slug(slug)?
            .ok_or_else(|| DatasetError::NotFound(slug.to_string()))
    }

    pub fn list(&self) -> DatasetResult<Vec<Dataset>> {
        self.datasets.list()
    }

    /// The dataset with its element count and the slug it was forked from.
    pub fn describe(&self, id: &DatasetId) -> DatasetResult<DatasetSummary> {
        let dataset = self.get(id)?;
        let elements_count = self.elements.count(dataset.id)?;
        let fork_father = match dataset.forked_from_id {
            Some(father) => self.datasets.get(&father)?.map(|d| d.slug),
            None => None,
        };
        Ok(DatasetSummary {
            dataset,
            elements_count,
            fork_father,
        })
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Apply `patch` to a dataset. A new name is validated and turned into
    /// a slug under the dataset's current owner prefix.
    pub fn edit(
        &self,
        id: &DatasetId,
        patch: DatasetPatch,
        access: Access,
    ) -> DatasetResult<Dataset> {
        let mut dataset = self.get(id)?;
        patch.metadata.apply(&mut dataset.metadata);
        dataset.modified_at = Utc::now();

        match &patch.name {
            Some(name) => {
                let slug = slug_for(dataset.owner_prefix(), name, access)?;
                let _guard = self.slug_locks.acquire(&slug)?;
                if slug != dataset.slug && self.datasets.get_by_slug(&slug)?.is_some() {
                    return Err(DatasetError::Conflict(format!("slug {slug} is already taken")));
                }
                debug!(dataset = %dataset.id, from = %dataset.slug, to = %slug, "dataset renamed");
                dataset.slug = slug;
                self.datasets.update(dataset.clone())?;
            }
            None => self.datasets.update(dataset.clone())?,
        }

        info!(dataset = %dataset.id, slug = %dataset.slug, "dataset edited");
        Ok(dataset)
    }

    /// Release every element of the dataset, then remove its row.
    ///
    /// Elements shared with forks survive for them; elements the dataset is
    /// primary for leave clones behind for each fork.
    pub fn delete(&self, id: &DatasetId) -> DatasetResult<ReleaseReport> {
        let dataset = self.get(id)?;
        let report = self.elements.release_dataset(dataset.id)?;
        self.datasets.remove(&dataset.id)?;
        info!(
            dataset = %dataset.id,
            slug = %dataset.slug,
            unlinked = report.unlinked,
            destroyed = report.destroyed,
            cloned = report.cloned,
            "dataset deleted"
        );
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Backup
    // -----------------------------------------------------------------------

    /// Serialize the dataset header and its elements.
    pub fn export(&self, id: &DatasetId) -> DatasetResult<DatasetArchive> {
        let header = self.get(id)?;
        let elements = self.elements.element_store().owned_by(&header.id)?;
        debug!(dataset = %header.id, elements = elements.len(), "dataset exported");
        Ok(DatasetArchive { header, elements })
    }

    /// Restore an archive. Administrative only.
    ///
    /// Any dataset holding the archived slug or id is deleted first. The
    /// dataset comes back under its archived id; elements keep theirs
    /// unless the id is still live elsewhere.
    pub fn import(&self, archive: DatasetArchive, access: Access) -> DatasetResult<Dataset> {
        if !access.is_admin() {
            return Err(DatasetError::Forbidden(
                "only administrators may import datasets".into(),
            ));
        }
        let DatasetArchive { header, elements } = archive;
        let _guard = self.slug_locks.acquire(&header.slug)?;

        if let Some(existing) = self.datasets.get_by_slug(&header.slug)? {
            warn!(slug = %existing.slug, "replacing existing dataset on import");
            self.delete(&existing.id)?;
        }
        if let Some(existing) = self.datasets.get(&header.id)? {
            warn!(dataset = %existing.id, slug = %existing.slug, "replacing dataset with archived id");
            self.delete(&existing.id)?;
        }

        self.datasets.insert(header.clone())?;
        let restored = self.elements.restore(header.id, elements)?;
        info!(
            dataset = %header.id,
            slug = %header.slug,
            elements = restored.len(),
            "dataset imported"
        );
        Ok(header)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn insert_new(&self, dataset: Dataset) -> DatasetResult<Dataset> {
        let _guard = self.slug_locks.acquire(&dataset.slug)?;
        if self.datasets.get_by_slug(&dataset.slug)?.is_some() {
            return Err(DatasetError::Conflict(format!(
                "slug {} is already taken",
                dataset.slug
            )));
        }
        self.datasets.insert(dataset.clone())?;
        Ok(dataset)
    }
}

impl std::fmt::Debug for DatasetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryDatasetStore;
    use dhub_element::{ElementPatch, InMemoryElementStore, NewElement};
    use dhub_store::InMemoryBlobStore;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn registry() -> DatasetRegistry {
        let elements = ElementRegistry::new(
            Arc::new(InMemoryElementStore::new()),
            Arc::new(InMemoryBlobStore::new()),
        );
        DatasetRegistry::new(Arc::new(InMemoryDatasetStore::new()), Arc::new(elements))
    }

    fn dataset(reg: &DatasetRegistry, name: &str) -> Dataset {
        reg.create("alice", name, DatasetMetadata::titled(name), Access::Member)
            .unwrap()
    }

    fn add(reg: &DatasetRegistry, d: &Dataset, title: &str, content: &[u8]) -> dhub_element::Element {
        reg.elements()
            .create(d.id, Access::Member, NewElement::with_content(title, content))
            .unwrap()
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    #[test]
    fn create_prefixes_slug() {
        let reg = registry();
        let d = dataset(&reg, "cats");
        assert_eq!(d.slug, "alice/cats");
        assert_eq!(reg.get_by_slug("alice/cats").unwrap().id, d.id);
    }

    #[test]
    fn duplicate_slug_conflicts() {
        let reg = registry();
        dataset(&reg, "cats");
        assert!(matches!(
            reg.create("alice", "cats", DatasetMetadata::default(), Access::Member),
            Err(DatasetError::Conflict(_))
        ));
        // Same name under another owner is fine.
        reg.create("bob", "cats", DatasetMetadata::default(), Access::Member)
            .unwrap();
    }

    #[test]
    fn illegal_names_rejected() {
        let reg = registry();
        for name in ["", "ca.ts", "bob/cats", "cats?"] {
            assert!(matches!(
                reg.create("alice", name, DatasetMetadata::default(), Access::Member),
                Err(DatasetError::Validation(_))
            ));
        }
        let d = reg
            .create("alice", "bob/cats", DatasetMetadata::default(), Access::Admin)
            .unwrap();
        assert_eq!(d.slug, "bob/cats");
    }

    #[test]
    fn concurrent_creates_of_one_slug_yield_one_winner() {
        use std::thread;

        let reg = Arc::new(registry());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                thread::spawn(move || {
                    reg.create("alice", "cats", DatasetMetadata::default(), Access::Member)
                        .is_ok()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().expect("thread should not panic"))
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(reg.list().unwrap().len(), 1);
    }

    // -----------------------------------------------------------------------
    // Fork
    // -----------------------------------------------------------------------

    #[test]
    fn fork_shares_elements_without_copying() {
        let reg = registry();
        let a = dataset(&reg, "a");
        let e1 = add(&reg, &a, "one", b"1");
        add(&reg, &a, "two", b"2");

        let b = reg
            .fork(&a.id, "bob", "b", MetadataPatch::title("B"), Access::Member)
            .unwrap();
        assert_eq!(b.slug, "bob/b");
        assert_eq!(b.forked_from_id, Some(a.id));
        assert_eq!(b.metadata.title, "B");
        assert_eq!(b.metadata.description, a.metadata.description);
        assert_eq!(reg.get(&a.id).unwrap().fork_count, 1);

        let elements = reg.elements();
        assert_eq!(elements.count(b.id).unwrap(), 2);
        assert_eq!(elements.element_store().len().unwrap(), 2);
        assert_eq!(elements.blob_store().len().unwrap(), 2);
        assert_eq!(
            elements.get_info(&e1.id, b.id, Access::Member).unwrap().owners,
            vec![a.id, b.id]
        );
    }

    #[test]
    fn fork_of_missing_dataset_fails() {
        let reg = registry();
        assert!(matches!(
            reg.fork(&DatasetId::new(), "bob", "b", MetadataPatch::default(), Access::Member),
            Err(DatasetError::NotFound(_))
        ));
    }

    #[test]
    fn fork_keeps_original_after_primary_edit() {
        let reg = registry();
        let a = dataset(&reg, "a");
        let e1 = add(&reg, &a, "original", b"hello");
        let b = reg
            .fork(&a.id, "alice", "b", MetadataPatch::default(), Access::Member)
            .unwrap();

        let edited = reg
            .elements()
            .edit(&e1.id, a.id, Access::Member, ElementPatch::title("changed"))
            .unwrap();
        assert_eq!(edited.metadata.title, "changed");

        let b_view = reg.elements().get_page(b.id, 0, 10).unwrap();
        assert_eq!(b_view.len(), 1);
        assert_eq!(b_view[0].metadata.title, "original");
        assert_eq!(
            reg.elements().get_content(&b_view[0].id, b.id, Access::Member).unwrap(),
            b"hello"
        );
    }

    #[test]
    fn describe_reports_counts_and_father() {
        let reg = registry();
        let a = dataset(&reg, "a");
        add(&reg, &a, "one", b"1");
        let b = reg
            .fork(&a.id, "alice", "b", MetadataPatch::default(), Access::Member)
            .unwrap();

        let summary = reg.describe(&b.id).unwrap();
        assert_eq!(summary.elements_count, 1);
        assert_eq!(summary.fork_father.as_deref(), Some("alice/a"));

        reg.delete(&a.id).unwrap();
        assert!(reg.describe(&b.id).unwrap().fork_father.is_none());
    }

    // -----------------------------------------------------------------------
    // Edit / delete
    // -----------------------------------------------------------------------

    #[test]
    fn edit_renames_under_same_owner() {
        let reg = registry();
        let d = dataset(&reg, "cats");
        dataset(&reg, "dogs");

        let patch = DatasetPatch {
            name: Some("felines".into()),
            metadata: MetadataPatch::title("Felines"),
        };
        let edited = reg.edit(&d.id, patch, Access::Member).unwrap();
        assert_eq!(edited.slug, "alice/felines");
        assert_eq!(edited.metadata.title, "Felines");
        assert!(edited.modified_at >= d.modified_at);
        assert!(matches!(
            reg.get_by_slug("alice/cats"),
            Err(DatasetError::NotFound(_))
        ));

        let clash = DatasetPatch {
            name: Some("dogs".into()),
            ..DatasetPatch::default()
        };
        assert!(matches!(
            reg.edit(&d.id, clash, Access::Member),
            Err(DatasetError::Conflict(_))
        ));
    }

    #[test]
    fn delete_primary_keeps_fork_contents() {
        let reg = registry();
        let a = dataset(&reg, "a");
        let e1 = add(&reg, &a, "one", b"1");
        add(&reg, &a, "two", b"2");
        let b = reg
            .fork(&a.id, "alice", "b", MetadataPatch::default(), Access::Member)
            .unwrap();

        let report = reg.delete(&a.id).unwrap();
        assert_eq!(report.destroyed, 2);
        assert_eq!(report.cloned, 2);
        assert!(matches!(reg.get(&a.id), Err(DatasetError::NotFound(_))));

        let discovered = reg.elements().discover_real_id(b.id, &[e1.id]).unwrap();
        let new_id = discovered[&e1.id];
        assert_eq!(
            reg.elements().get_content(&new_id, b.id, Access::Member).unwrap(),
            b"1"
        );
        assert_eq!(reg.elements().count(b.id).unwrap(), 2);
    }

    #[test]
    fn delete_fork_only_unlinks() {
        let reg = registry();
        let a = dataset(&reg, "a");
        let e1 = add(&reg, &a, "one", b"1");
        let b = reg
            .fork(&a.id, "alice", "b", MetadataPatch::default(), Access::Member)
            .unwrap();

        let report = reg.delete(&b.id).unwrap();
        assert_eq!(report.unlinked, 1);
        assert_eq!(report.destroyed, 0);
        assert_eq!(
            reg.elements().get_info(&e1.id, a.id, Access::Member).unwrap().owners,
            vec![a.id]
        );
    }

    // -----------------------------------------------------------------------
    // Export / import
    // -----------------------------------------------------------------------

    #[test]
    fn export_lists_elements_and_blobs() {
        let reg = registry();
        let a = dataset(&reg, "a");
        add(&reg, &a, "one", b"1");
        add(&reg, &a, "same", b"1");
        let archive = reg.export(&a.id).unwrap();
        assert_eq!(archive.header.id, a.id);
        assert_eq!(archive.elements.len(), 2);
        assert_eq!(archive.blob_ids().len(), 1);
    }

    #[test]
    fn import_is_admin_only() {
        let reg = registry();
        let a = dataset(&reg, "a");
        let archive = reg.export(&a.id).unwrap();
        assert!(matches!(
            reg.import(archive, Access::Member),
            Err(DatasetError::Forbidden(_))
        ));
    }

    #[test]
    fn import_restores_deleted_dataset() {
        let reg = registry();
        let a = dataset(&reg, "a");
        let e1 = add(&reg, &a, "one", b"1");
        let archive = reg.export(&a.id).unwrap();
        reg.delete(&a.id).unwrap();

        let restored = reg.import(archive, Access::Admin).unwrap();
        assert_eq!(restored.id, a.id);
        assert_eq!(reg.get_by_slug("alice/a").unwrap().id, a.id);
        let info = reg.elements().get_info(&e1.id, a.id, Access::Member).unwrap();
        assert_eq!(info.metadata.title, "one");
    }

    #[test]
    fn import_replaces_current_state() {
        let reg = registry();
        let a = dataset(&reg, "a");
        let e1 = add(&reg, &a, "one", b"1");
        let archive = reg.export(&a.id).unwrap();

        add(&reg, &a, "later", b"2");
        reg.elements()
            .edit(&e1.id, a.id, Access::Member, ElementPatch::title("edited"))
            .unwrap();

        reg.import(archive, Access::Admin).unwrap();
        let page = reg.elements().get_page(a.id, 0, 10).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, e1.id);
        assert_eq!(page[0].metadata.title, "one");
    }

    #[test]
    fn import_renames_ids_still_live_in_forks() {
        let reg = registry();
        let a = dataset(&reg, "a");
        let b = dataset(&reg, "b");
        let e1 = add(&reg, &b, "one", b"1");
        // Share into `a` so that `a` is not the element's primary owner.
        reg.elements().share(&[e1.id], b.id, a.id, Access::Member).unwrap();
        let archive = reg.export(&a.id).unwrap();

        let restored = reg.import(archive, Access::Admin).unwrap();
        let page = reg.elements().get_page(restored.id, 0, 10).unwrap();
        assert_eq!(page.len(), 1);
        assert_ne!(page[0].id, e1.id);
        assert_eq!(page[0].previous_id, Some(e1.id));
        assert_eq!(
            reg.elements().get_info(&e1.id, b.id, Access::Member).unwrap().owners,
            vec![b.id]
        );
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    #[derive(Clone, Debug)]
    enum Op {
        Fork(usize),
        Edit(usize, usize),
        DeleteElement(usize, usize),
        DeleteDataset(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..8usize).prop_map(Op::Fork),
            (0..8usize, 0..5usize).prop_map(|(d, i)| Op::Edit(d, i)),
            (0..8usize, 0..5usize).prop_map(|(d, i)| Op::DeleteElement(d, i)),
            (0..8usize).prop_map(Op::DeleteDataset),
        ]
    }

    proptest! {
        #[test]
        fn forks_never_leave_orphaned_or_ownerless_elements(
            ops in proptest::collection::vec(op(), 1..30)
        ) {
            let reg = registry();
            let root = dataset(&reg, "root");
            for i in 0..5u8 {
                add(&reg, &root, "e", &[i]);
            }
            let mut live = vec![root];

            for (step, op) in ops.into_iter().enumerate() {
                if live.is_empty() {
                    break;
                }
                match op {
                    Op::Fork(d) => {
                        let source = live[d % live.len()].id;
                        let fork = reg
                            .fork(&source, "bob", &format!("f{step}"), MetadataPatch::default(), Access::Member)
                            .unwrap();
                        live.push(fork);
                    }
                    Op::Edit(d, i) => {
                        let d = live[d % live.len()].id;
                        let page = reg.elements().get_page(d, 0, 100).unwrap();
                        if let Some(e) = page.get(i) {
                            let edited = reg
                                .elements()
                                .edit(&e.id, d, Access::Member, ElementPatch::title(format!("t{step}")))
                                .unwrap();
                            prop_assert_eq!(edited.metadata.title, format!("t{step}"));
                        }
                    }
                    Op::DeleteElement(d, i) => {
                        let d = live[d % live.len()].id;
                        let page = reg.elements().get_page(d, 0, 100).unwrap();
                        if let Some(e) = page.get(i) {
                            reg.elements().delete(&e.id, d, Access::Member).unwrap();
                        }
                    }
                    Op::DeleteDataset(d) => {
                        let gone = live.remove(d % live.len());
                        reg.delete(&gone.id).unwrap();
                    }
                }

                let live_ids: HashSet<DatasetId> = live.iter().map(|d| d.id).collect();
                let mut rows = HashSet::new();
                for d in &live {
                    for e in reg.elements().get_page(d.id, 0, 100).unwrap() {
                        prop_assert!(!e.owners.is_empty());
                        prop_assert!(e.owners.iter().all(|o| live_ids.contains(o)));
                        let distinct: HashSet<_> = e.owners.iter().collect();
                        prop_assert_eq!(distinct.len(), e.owners.len());
                        rows.insert(e.id);
                    }
                }
                // Every stored row is reachable through some live dataset.
                prop_assert_eq!(reg.elements().element_store().len().unwrap(), rows.len());
            }
        }
    }
}
