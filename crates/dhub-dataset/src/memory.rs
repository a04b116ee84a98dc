//! In-memory dataset store.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use dhub_types::DatasetId;

use crate::dataset::Dataset;
use crate::error::{DatasetError, DatasetResult};
use crate::traits::DatasetStore;

/// An in-memory implementation of [`DatasetStore`] with a unique slug index.
pub struct InMemoryDatasetStore {
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    rows: HashMap<DatasetId, Dataset>,
    slugs: HashMap<String, DatasetId>,
}

impl State {
    fn check_slug(&self, dataset: &Dataset) -> DatasetResult<()> {
        match self.slugs.get(&dataset.slug) {
            Some(holder) if *holder != dataset.id => Err(DatasetError::Conflict(format!(
                "slug {} is already taken",
                dataset.slug
            ))),
            _ => Ok(()),
        }
    }
}

impl InMemoryDatasetStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    fn read(&self) -> DatasetResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|e| DatasetError::Backend(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> DatasetResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|e| DatasetError::Backend(format!("lock poisoned: {e}")))
    }
}

impl Default for InMemoryDatasetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetStore for InMemoryDatasetStore {
    fn get(&self, id: &DatasetId) -> DatasetResult<Option<Dataset>> {
        Ok(self.read()?.rows.get(id).cloned())
    }

    fn get_by_slug(&self, slug: &str) -> DatasetResult<Option<Dataset>> {
        let state = self.read()?;
        Ok(state
            .slugs
            .get(slug)
            .and_then(|id| state.rows.get(id))
            .cloned())
    }

    fn insert(&self, dataset: Dataset) -> DatasetResult<()> {
        let mut state = self.write()?;
        if state.rows.contains_key(&dataset.id) {
            return Err(DatasetError::Conflict(format!(
                "dataset id {} already exists",
                dataset.id
            )));
        }
        state.check_slug(&dataset)?;
        state.slugs.insert(dataset.slug.clone(), dataset.id);
        state.rows.insert(dataset.id, dataset);
        Ok(())
    }

    fn update(&self, dataset: Dataset) -> DatasetResult<()> {
        let mut state = self.write()?;
        let Some(old_slug) = state.rows.get(&dataset.id).map(|d| d.slug.clone()) else {
            return Err(DatasetError::NotFound(dataset.id.to_string()));
        };
        state.check_slug(&dataset)?;
        state.slugs.remove(&old_slug);
        state.slugs.insert(dataset.slug.clone(), dataset.id);
        state.rows.insert(dataset.id, dataset);
        Ok(())
    }

    fn remove(&self, id: &DatasetId) -> DatasetResult<Option<Dataset>> {
        let mut state = self.write()?;
        let removed = state.rows.remove(id);
        if let Some(dataset) = &removed {
            state.slugs.remove(&dataset.slug);
        }
        Ok(removed)
    }

    fn list(&self) -> DatasetResult<Vec<Dataset>> {
        let mut all: Vec<Dataset> = self.read()?.rows.values().cloned().collect();
        all.sort_by_key(|d| (d.created_at, d.id));
        Ok(all)
    }

    fn len(&self) -> DatasetResult<usize> {
        Ok(self.read()?.rows.len())
    }
}

impl std::fmt::Debug for InMemoryDatasetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len().unwrap_or_default();
        f.debug_struct("InMemoryDatasetStore")
            .field("dataset_count", &count)
            .finish()
    }
}
