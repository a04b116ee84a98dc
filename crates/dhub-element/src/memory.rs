//! In-memory element store for tests and embedding.
//!
//! [`InMemoryElementStore`] keeps rows in a `HashMap` with three secondary
//! indexes (owner, blob reference count, lineage) behind a single `RwLock`,
//! so every row write updates its indexes atomically.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use dhub_types::{BlobId, DatasetId, ElementId};

use crate::element::Element;
use crate::error::{ElementError, ElementResult};
use crate::traits::ElementStore;

/// An in-memory implementation of [`ElementStore`].
pub struct InMemoryElementStore {
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    rows: HashMap<ElementId, Element>,
    by_owner: HashMap<DatasetId, BTreeSet<(DateTime<Utc>, ElementId)>>,
    blob_refs: HashMap<BlobId, usize>,
    successors: HashMap<ElementId, HashSet<ElementId>>,
}

impl State {
    fn index(&mut self, element: &Element) {
        for owner in &element.owners {
            self.by_owner
                .entry(*owner)
                .or_default()
                .insert((element.added_at, element.id));
        }
        if let Some(blob) = element.blob_id {
            *self.blob_refs.entry(blob).or_default() += 1;
        }
        if let Some(prev) = element.previous_id {
            self.successors.entry(prev).or_default().insert(element.id);
        }
    }

    fn deindex(&mut self, element: &Element) {
        for owner in &element.owners {
            if let Some(set) = self.by_owner.get_mut(owner) {
                set.remove(&(element.added_at, element.id));
                if set.is_empty() {
                    self.by_owner.remove(owner);
                }
            }
        }
        if let Some(blob) = element.blob_id {
            if let Some(count) = self.blob_refs.get_mut(&blob) {
                *count -= 1;
                if *count == 0 {
                    self.blob_refs.remove(&blob);
                }
            }
        }
        if let Some(prev) = element.previous_id {
            if let Some(set) = self.successors.get_mut(&prev) {
                set.remove(&element.id);
                if set.is_empty() {
                    self.successors.remove(&prev);
                }
            }
        }
    }
}

impl InMemoryElementStore {
    /// Create a new empty element store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    fn read(&self) -> ElementResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|e| ElementError::Backend(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> ElementResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|e| ElementError::Backend(format!("lock poisoned: {e}")))
    }
}

impl Default for InMemoryElementStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementStore for InMemoryElementStore {
    fn get(&self, id: &ElementId) -> ElementResult<Option<Element>> {
        Ok(self.read()?.rows.get(id).cloned())
    }

    fn get_many(&self, ids: &[ElementId]) -> ElementResult<Vec<Option<Element>>> {
        let state = self.read()?;
        Ok(ids.iter().map(|id| state.rows.get(id).cloned()).collect())
    }

    fn insert(&self, element: Element) -> ElementResult<()> {
        let mut state = self.write()?;
        if state.rows.contains_key(&element.id) {
            return Err(ElementError::AlreadyExists(element.id));
        }
        state.index(&element);
        state.rows.insert(element.id, element);
        Ok(())
    }

    fn update(&self, element: Element) -> ElementResult<()> {
        let mut state = self.write()?;
        let Some(old) = state.rows.remove(&element.id) else {
            return Err(ElementError::NotFound(element.id));
        };
        state.deindex(&old);
        state.index(&element);
        state.rows.insert(element.id, element);
        Ok(())
    }

    fn remove(&self, id: &ElementId) -> ElementResult<Option<Element>> {
        let mut state = self.write()?;
        let removed = state.rows.remove(id);
        if let Some(element) = &removed {
            state.deindex(element);
        }
        Ok(removed)
    }

    fn owned_by(&self, dataset: &DatasetId) -> ElementResult<Vec<Element>> {
        let state = self.read()?;
        let Some(keys) = state.by_owner.get(dataset) else {
            return Ok(Vec::new());
        };
        Ok(keys
            .iter()
            .filter_map(|(_, id)| state.rows.get(id).cloned())
            .collect())
    }

    fn count_owned_by(&self, dataset: &DatasetId) -> ElementResult<usize> {
        Ok(self.read()?.by_owner.get(dataset).map_or(0, BTreeSet::len))
    }

    fn successors_of(&self, ids: &[ElementId]) -> ElementResult<Vec<Element>> {
        let state = self.read()?;
        let mut found: Vec<Element> = ids
            .iter()
            .filter_map(|id| state.successors.get(id))
            .flatten()
            .filter_map(|id| state.rows.get(id).cloned())
            .collect();
        found.sort_by_key(|e| (e.added_at, e.id));
        found.dedup_by_key(|e| e.id);
        Ok(found)
    }

    fn references_blob(&self, blob: &BlobId) -> ElementResult<bool> {
        Ok(self.read()?.blob_refs.contains_key(blob))
    }

    fn len(&self) -> ElementResult<usize> {
        Ok(self.read()?.rows.len())
    }
}

impl std::fmt::Debug for InMemoryElementStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len().unwrap_or_default();
        f.debug_struct("InMemoryElementStore")
            .field("element_count", &count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementMetadata;

    fn element(owner: DatasetId, blob: Option<BlobId>) -> Element {
        Element::new(owner, blob, None, ElementMetadata::titled("e"))
    }

    // -----------------------------------------------------------------------
    // Rows
    // -----------------------------------------------------------------------

    #[test]
    fn insert_get_remove() {
        let store = InMemoryElementStore::new();
        let e = element(DatasetId::new(), None);
        store.insert(e.clone()).unwrap();
        assert_eq!(store.get(&e.id).unwrap(), Some(e.clone()));
        assert_eq!(store.remove(&e.id).unwrap(), Some(e.clone()));
        assert!(store.get(&e.id).unwrap().is_none());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn insert_rejects_existing_id() {
        let store = InMemoryElementStore::new();
        let e = element(DatasetId::new(), None);
        store.insert(e.clone()).unwrap();
        assert!(matches!(
            store.insert(e),
            Err(ElementError::AlreadyExists(_))
        ));
    }

    #[test]
    fn update_requires_existing_row() {
        let store = InMemoryElementStore::new();
        let e = element(DatasetId::new(), None);
        assert!(matches!(
            store.update(e),
            Err(ElementError::NotFound(_))
        ));
    }

    #[test]
    fn get_many_keeps_slots() {
        let store = InMemoryElementStore::new();
        let e = element(DatasetId::new(), None);
        store.insert(e.clone()).unwrap();
        let missing = ElementId::new();
        let got = store.get_many(&[missing, e.id]).unwrap();
        assert!(got[0].is_none());
        assert_eq!(got[1].as_ref().map(|x| x.id), Some(e.id));
    }

    // -----------------------------------------------------------------------
    // Indexes
    // -----------------------------------------------------------------------

    #[test]
    fn owner_index_follows_updates() {
        let store = InMemoryElementStore::new();
        let (a, b) = (DatasetId::new(), DatasetId::new());
        let mut e = element(a, None);
        store.insert(e.clone()).unwrap();
        assert_eq!(store.count_owned_by(&b).unwrap(), 0);

        e.link(b);
        store.update(e.clone()).unwrap();
        assert_eq!(store.count_owned_by(&a).unwrap(), 1);
        assert_eq!(store.owned_by(&b).unwrap()[0].id, e.id);

        e.unlink(&a);
        store.update(e).unwrap();
        assert_eq!(store.count_owned_by(&a).unwrap(), 0);
        assert!(store.owned_by(&a).unwrap().is_empty());
    }

    #[test]
    fn owned_by_is_ordered_by_addition() {
        let store = InMemoryElementStore::new();
        let d = DatasetId::new();
        let ids: Vec<ElementId> = (0..5)
            .map(|_| {
                let e = element(d, None);
                let id = e.id;
                store.insert(e).unwrap();
                id
            })
            .collect();
        let listed: Vec<ElementId> = store.owned_by(&d).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(listed, ids);
    }

    #[test]
    fn blob_reference_counting() {
        let store = InMemoryElementStore::new();
        let blob = BlobId::from_hash([1; 32]);
        let a = element(DatasetId::new(), Some(blob));
        let b = a.clone_for(DatasetId::new());
        store.insert(a.clone()).unwrap();
        store.insert(b.clone()).unwrap();
        assert!(store.references_blob(&blob).unwrap());

        store.remove(&a.id).unwrap();
        assert!(store.references_blob(&blob).unwrap());

        let mut b = b;
        b.blob_id = Some(BlobId::from_hash([2; 32]));
        store.update(b).unwrap();
        assert!(!store.references_blob(&blob).unwrap());
    }

    #[test]
    fn successor_index() {
        let store = InMemoryElementStore::new();
        let original = element(DatasetId::new(), None);
        let clone = original.clone_for(DatasetId::new());
        store.insert(original.clone()).unwrap();
        store.insert(clone.clone()).unwrap();

        let found = store.successors_of(&[original.id]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, clone.id);

        store.remove(&clone.id).unwrap();
        assert!(store.successors_of(&[original.id]).unwrap().is_empty());
    }
}
