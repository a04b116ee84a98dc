use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use dhub_types::{BlobId, ContentHash};

use crate::blob::Blob;
use crate::error::{StoreError, StoreResult};
use crate::hasher::ContentHasher;
use crate::traits::{check_batch, check_size, hash_all, put_into, BlobIds, BlobStore, BlobTable};
use crate::DEFAULT_MAX_BLOB_SIZE;

/// In-memory, HashMap-based blob store.
///
/// Intended for tests and embedding. Blobs and the hash index live behind a
/// single `RwLock`, so the dedup lookup and the insert are one atomic step.
pub struct InMemoryBlobStore {
    max_blob_size: u64,
    table: RwLock<MemoryTable>,
}

#[derive(Default)]
struct MemoryTable {
    blobs: HashMap<BlobId, Blob>,
    by_hash: HashMap<ContentHash, BlobId>,
}

impl BlobTable for MemoryTable {
    fn id_for_hash(&self, hash: &ContentHash) -> Option<BlobId> {
        self.by_hash.get(hash).copied()
    }

    fn holds(&self, id: &BlobId) -> bool {
        self.blobs.contains_key(id)
    }

    fn evict(&mut self, id: &BlobId) -> StoreResult<()> {
        self.remove(id);
        Ok(())
    }

    fn store(&mut self, blob: Blob) -> StoreResult<()> {
        self.by_hash.insert(blob.content_hash, blob.id);
        self.blobs.insert(blob.id, blob);
        Ok(())
    }
}

impl MemoryTable {
    fn remove(&mut self, id: &BlobId) -> Option<Blob> {
        let blob = self.blobs.remove(id)?;
        if self.by_hash.get(&blob.content_hash) == Some(id) {
            self.by_hash.remove(&blob.content_hash);
        }
        Some(blob)
    }
}

impl InMemoryBlobStore {
    /// Create an empty store with the default 16 MiB blob limit.
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_BLOB_SIZE)
    }

    /// Create an empty store with a custom blob size limit.
    pub fn with_limit(max_blob_size: u64) -> Self {
        Self {
            max_blob_size,
            table: RwLock::new(MemoryTable::default()),
        }
    }

    /// Remove all blobs.
    pub fn clear(&self) -> StoreResult<()> {
        let mut table = self.write()?;
        table.blobs.clear();
        table.by_hash.clear();
        Ok(())
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, MemoryTable>> {
        self.table
            .read()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, MemoryTable>> {
        self.table
            .write()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStore for InMemoryBlobStore {
    fn max_blob_size(&self) -> u64 {
        self.max_blob_size
    }

    fn put(&self, data: &[u8]) -> StoreResult<BlobId> {
        check_size(data.len(), self.max_blob_size)?;
        let hash = ContentHasher::BLOB.hash(data);
        let mut table = self.write()?;
        put_into(&mut *table, data, hash, None)
    }

    fn put_batch(
        &self,
        contents: &[Vec<u8>],
        force_ids: Option<&[BlobId]>,
    ) -> StoreResult<Vec<BlobId>> {
        check_batch(contents, force_ids, self.max_blob_size)?;
        let hashes = hash_all(contents);
        let mut table = self.write()?;
        contents
            .iter()
            .zip(hashes)
            .enumerate()
            .map(|(i, (data, hash))| {
                let forced = force_ids.map(|ids| ids[i]);
                put_into(&mut *table, data, hash, forced)
            })
            .collect()
    }

    fn get(&self, id: &BlobId) -> StoreResult<Blob> {
        self.read()?
            .blobs
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound(*id))
    }

    fn get_batch(&self, ids: &[BlobId]) -> StoreResult<Vec<Blob>> {
        let table = self.read()?;
        ids.iter()
            .map(|id| table.blobs.get(id).cloned().ok_or(StoreError::NotFound(*id)))
            .collect()
    }

    fn contains(&self, id: &BlobId) -> StoreResult<bool> {
        Ok(self.read()?.blobs.contains_key(id))
    }

    fn delete(&self, id: &BlobId) -> StoreResult<bool> {
        Ok(self.write()?.remove(id).is_some())
    }

    fn delete_batch(&self, ids: &[BlobId]) -> StoreResult<usize> {
        let mut table = self.write()?;
        Ok(ids.iter().filter(|id| table.remove(id).is_some()).count())
    }

    fn size(&self) -> StoreResult<u64> {
        Ok(self.read()?.blobs.values().map(|b| b.size).sum())
    }

    fn size_of(&self, ids: &[BlobId]) -> StoreResult<u64> {
        let table = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| table.blobs.get(id))
            .map(|b| b.size)
            .sum())
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.read()?.blobs.len())
    }

    fn enumerate(&self) -> StoreResult<BlobIds> {
        let ids: Vec<BlobId> = self.read()?.blobs.keys().copied().collect();
        Ok(Box::new(ids.into_iter()))
    }
}

impl std::fmt::Debug for InMemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len().unwrap_or_default();
        f.debug_struct("InMemoryBlobStore")
            .field("blob_count", &count)
            .field("max_blob_size", &self.max_blob_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // -----------------------------------------------------------------------
    // Dedup
    // -----------------------------------------------------------------------

    #[test]
    fn identical_content_yields_same_id() {
        let store = InMemoryBlobStore::new();
        let a = store.put(b"identical").unwrap();
        let b = store.put(b"identical").unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn different_content_yields_different_ids() {
        let store = InMemoryBlobStore::new();
        let a = store.put(b"aaa").unwrap();
        let b = store.put(b"bbb").unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn put_rejects_oversized_content() {
        let store = InMemoryBlobStore::with_limit(4);
        assert!(store.put(b"1234").is_ok());
        assert!(matches!(
            store.put(b"12345"),
            Err(StoreError::SizeExceeded { size: 5, limit: 4 })
        ));
        assert_eq!(store.len().unwrap(), 1);
    }

    // -----------------------------------------------------------------------
    // Batches
    // -----------------------------------------------------------------------

    #[test]
    fn put_batch_preserves_order_and_dedups() {
        let store = InMemoryBlobStore::new();
        let existing = store.put(b"two").unwrap();
        let contents = vec![b"one".to_vec(), b"two".to_vec(), b"one".to_vec()];
        let ids = store.put_batch(&contents, None).unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[1], existing);
        assert_eq!(ids[0], ids[2]);
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn put_batch_with_oversized_item_writes_nothing() {
        let store = InMemoryBlobStore::with_limit(3);
        let contents = vec![b"ok".to_vec(), b"too long".to_vec()];
        assert!(store.put_batch(&contents, None).is_err());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn forced_ids_equal_to_existing_ids_create_no_duplicates() {
        let store = InMemoryBlobStore::new();
        let contents = vec![b"alpha".to_vec(), b"beta".to_vec()];
        let ids = store.put_batch(&contents, None).unwrap();

        let again = store.put_batch(&contents, Some(&ids)).unwrap();
        assert_eq!(again, ids);
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn forced_id_evicts_previous_occupant() {
        let store = InMemoryBlobStore::new();
        let occupied = store.put(b"old content").unwrap();

        let ids = store
            .put_batch(&[b"restored".to_vec()], Some(&[occupied]))
            .unwrap();
        assert_eq!(ids, vec![occupied]);
        assert_eq!(store.get(&occupied).unwrap().data, b"restored");
        assert_eq!(store.len().unwrap(), 1);

        // The evicted content is no longer indexed, so it is stored afresh.
        let old = store.put(b"old content").unwrap();
        assert_eq!(store.get(&old).unwrap().data, b"old content");
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn forced_id_for_new_content_is_honoured() {
        let store = InMemoryBlobStore::new();
        let forced = BlobId::from_hash([42u8; 32]);
        let ids = store.put_batch(&[b"x".to_vec()], Some(&[forced])).unwrap();
        assert_eq!(ids, vec![forced]);
        // Later plain puts of the same bytes resolve to the forced id.
        assert_eq!(store.put(b"x").unwrap(), forced);
    }

    #[test]
    fn get_batch_preserves_order() {
        let store = InMemoryBlobStore::new();
        let a = store.put(b"a").unwrap();
        let b = store.put(b"b").unwrap();
        let c = store.put(b"c").unwrap();
        let blobs = store.get_batch(&[c, a, b]).unwrap();
        let data: Vec<&[u8]> = blobs.iter().map(|b| b.data.as_slice()).collect();
        assert_eq!(data, vec![b"c".as_ref(), b"a".as_ref(), b"b".as_ref()]);
    }

    #[test]
    fn get_batch_fails_on_missing_id() {
        let store = InMemoryBlobStore::new();
        let a = store.put(b"a").unwrap();
        let missing = BlobId::from_hash([3u8; 32]);
        assert!(matches!(
            store.get_batch(&[a, missing]),
            Err(StoreError::NotFound(id)) if id == missing
        ));
    }

    // -----------------------------------------------------------------------
    // Delete / accounting / enumerate
    // -----------------------------------------------------------------------

    #[test]
    fn delete_is_unconditional_and_idempotent() {
        let store = InMemoryBlobStore::new();
        let id = store.put(b"gone").unwrap();
        assert!(store.delete(&id).unwrap());
        assert!(!store.contains(&id).unwrap());
        assert!(!store.delete(&id).unwrap());
        assert!(matches!(store.get(&id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn delete_batch_counts_existing() {
        let store = InMemoryBlobStore::new();
        let a = store.put(b"a").unwrap();
        let b = store.put(b"b").unwrap();
        let missing = BlobId::from_hash([8u8; 32]);
        assert_eq!(store.delete_batch(&[a, missing, b]).unwrap(), 2);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn size_accounting() {
        let store = InMemoryBlobStore::new();
        let a = store.put(b"12345").unwrap();
        store.put(b"123456789").unwrap();
        assert_eq!(store.size().unwrap(), 14);
        assert_eq!(store.size_of(&[a]).unwrap(), 5);
        assert_eq!(store.size_of(&[BlobId::from_hash([0; 32])]).unwrap(), 0);
    }

    #[test]
    fn enumerate_is_restartable() {
        let store = InMemoryBlobStore::new();
        store.put(b"a").unwrap();
        store.put(b"b").unwrap();
        assert_eq!(store.enumerate().unwrap().count(), 2);
        assert_eq!(store.enumerate().unwrap().count(), 2);
    }

    #[test]
    fn concurrent_identical_puts_converge() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemoryBlobStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.put(b"shared").unwrap())
            })
            .collect();
        let ids: Vec<BlobId> = handles
            .into_iter()
            .map(|h| h.join().expect("thread should not panic"))
            .collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn debug_format() {
        let store = InMemoryBlobStore::new();
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryBlobStore"));
        assert!(debug.contains("blob_count"));
    }

    proptest! {
        #[test]
        fn put_is_idempotent(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let store = InMemoryBlobStore::new();
            let first = store.put(&data).unwrap();
            let second = store.put(&data).unwrap();
            prop_assert_eq!(first, second);
            prop_assert_eq!(store.get(&first).unwrap().data, data);
        }
    }
}
