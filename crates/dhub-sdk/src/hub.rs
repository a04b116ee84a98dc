use std::collections::HashMap;
use std::sync::Arc;

use dhub_dataset::{Dataset, DatasetArchive, DatasetRegistry, InMemoryDatasetStore};
use dhub_element::{ElementRegistry, ElementStore, InMemoryElementStore};
use dhub_gc::{GarbageCollector, GcWorker};
use dhub_store::{BlobStore, DirectoryBlobStore, InMemoryBlobStore};
use dhub_types::{Access, BlobId, DatasetId};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{HubConfig, StorageBackend};
use crate::error::{HubError, HubResult};

/// A dataset archive together with the bytes of every blob it references,
/// aligned with [`DatasetArchive::blob_ids`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetBundle {
    pub archive: DatasetArchive,
    pub contents: Vec<Vec<u8>>,
}

/// Handle on a fully wired storage core.
pub struct DataHub {
    config: HubConfig,
    blobs: Arc<dyn BlobStore>,
    elements: Arc<ElementRegistry>,
    datasets: DatasetRegistry,
    collector: Arc<GarbageCollector>,
}

impl DataHub {
    /// Build every component described by `config`. The garbage collector
    /// is created but not started; see [`start_gc`](Self::start_gc).
    pub fn open(config: HubConfig) -> HubResult<Self> {
        config.validate()?;

        let max_blob_size = config.storage.max_blob_size;
        let blobs: Arc<dyn BlobStore> = match (&config.storage.backend, &config.storage.root) {
            (StorageBackend::Memory, _) => Arc::new(InMemoryBlobStore::with_limit(max_blob_size)),
            (StorageBackend::Directory, Some(root)) => {
                Arc::new(DirectoryBlobStore::open(root, max_blob_size)?)
            }
            (StorageBackend::Directory, None) => {
                return Err(HubError::Config("storage.root is required".into()))
            }
        };

        let element_store: Arc<dyn ElementStore> = Arc::new(InMemoryElementStore::new());
        let elements = Arc::new(ElementRegistry::with_page_size(
            Arc::clone(&element_store),
            Arc::clone(&blobs),
            config.limits.page_size,
        ));
        let datasets = DatasetRegistry::new(
            Arc::new(InMemoryDatasetStore::new()),
            Arc::clone(&elements),
        );
        let collector = Arc::new(GarbageCollector::new(
            Arc::clone(&blobs),
            element_store,
            config.gc.to_gc_config(),
        ));

        info!(
            backend = ?config.storage.backend,
            page_size = config.limits.page_size,
            max_blob_size,
            "datahub opened"
        );
        Ok(Self {
            config,
            blobs,
            elements,
            datasets,
            collector,
        })
    }

    /// An in-memory hub with default settings.
    pub fn in_memory() -> HubResult<Self> {
        Self::open(HubConfig::default())
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    pub fn elements(&self) -> &ElementRegistry {
        &self.elements
    }

    pub fn datasets(&self) -> &DatasetRegistry {
        &self.datasets
    }

    pub fn collector(&self) -> &Arc<GarbageCollector> {
        &self.collector
    }

    // ---- Garbage collection ----

    /// Start the background collector, unless disabled in the config.
    pub fn start_gc(&self) -> HubResult<Option<GcWorker>> {
        if !self.config.gc.enabled {
            info!("gc disabled by configuration");
            return Ok(None);
        }
        Ok(Some(GcWorker::spawn(Arc::clone(&self.collector))?))
    }

    /// Stop the collector. Running workers exit after their current batch.
    pub fn shutdown(&self) {
        self.collector.stop();
        info!("datahub shut down");
    }

    // ---- Backup ----

    /// Write blobs back at the ids they had when backed up. Administrators only.
    pub fn restore_blobs(
        &self,
        contents: &[Vec<u8>],
        force_ids: &[BlobId],
        access: Access,
    ) -> HubResult<Vec<BlobId>> {
        if !access.is_admin() {
            return Err(HubError::Forbidden(
                "only administrators may restore blobs".into(),
            ));
        }
        let ids = self.blobs.put_batch(contents, Some(force_ids))?;
        info!(count = ids.len(), "blobs restored");
        Ok(ids)
    }

    /// Export a dataset and the content of every blob it references.
    pub fn export_bundle(&self, id: &DatasetId) -> HubResult<DatasetBundle> {
        let archive = self.datasets.export(id)?;
        let contents = self
            .blobs
            .get_batch(&archive.blob_ids())?
            .into_iter()
            .map(|blob| blob.data)
            .collect();
        Ok(DatasetBundle { archive, contents })
    }

    /// Restore a bundle produced by [`export_bundle`](Self::export_bundle).
    /// Administrators only.
    pub fn import_bundle(&self, bundle: DatasetBundle, access: Access) -> HubResult<Dataset> {
        let DatasetBundle {
            mut archive,
            contents,
        } = bundle;
        let archived_ids = archive.blob_ids();
        let stored_ids = self.restore_blobs(&contents, &archived_ids, access)?;

        // Content already present elsewhere dedups to its existing id.
        let moved: HashMap<BlobId, BlobId> = archived_ids
            .into_iter()
            .zip(stored_ids)
            .filter(|(archived, stored)| archived != stored)
            .collect();
        if !moved.is_empty() {
            warn!(count = moved.len(), "restored blobs deduplicated to existing ids");
            for element in &mut archive.elements {
                if let Some(stored) = element.blob_id.and_then(|id| moved.get(&id)) {
                    element.blob_id = Some(*stored);
                }
            }
        }

        Ok(self.datasets.import(archive, access)?)
    }
}

impl std::fmt::Debug for DataHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataHub")
            .field("backend", &self.config.storage.backend)
            .field("gc", &self.collector.state())
            .finish_non_exhaustive()
    }
}
