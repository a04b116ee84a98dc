use dhub_types::{BlobId, ContentHash};
use tracing::debug;

use crate::blob::Blob;
use crate::error::{StoreError, StoreResult};
use crate::hasher::ContentHasher;

/// Lazy, finite sequence of blob ids returned by [`BlobStore::enumerate`].
pub type BlobIds = Box<dyn Iterator<Item = BlobId> + Send>;

/// Content-addressed blob store with hash deduplication.
///
/// All implementations must satisfy these invariants:
/// - Writing bytes whose hash is already stored returns the existing id and
///   stores nothing.
/// - Blobs are never mutated. A forced id may evict the blob previously
///   stored at that id, nothing else replaces content.
/// - Deletion is unconditional; callers are responsible for reference safety.
/// - Batch reads preserve input order.
pub trait BlobStore: Send + Sync {
    /// Largest blob size accepted by `put` and `put_batch`.
    fn max_blob_size(&self) -> u64;

    /// Store bytes and return the id of the blob holding them.
    ///
    /// Fails with [`StoreError::SizeExceeded`] if the bytes exceed
    /// [`max_blob_size`](Self::max_blob_size).
    fn put(&self, data: &[u8]) -> StoreResult<BlobId>;

    /// Store many contents, returning ids in input order.
    ///
    /// Every item is size-checked before anything is written. When
    /// `force_ids` is given (restore path only) it must line up with
    /// `contents`; content not yet stored lands at its forced id, evicting
    /// whatever blob occupied that id.
    fn put_batch(&self, contents: &[Vec<u8>], force_ids: Option<&[BlobId]>)
        -> StoreResult<Vec<BlobId>>;

    /// Read a blob by id.
    fn get(&self, id: &BlobId) -> StoreResult<Blob>;

    /// Read many blobs in input order. Fails if any id is missing.
    fn get_batch(&self, ids: &[BlobId]) -> StoreResult<Vec<Blob>> {
        ids.iter().map(|id| self.get(id)).collect()
    }

    /// Check whether a blob exists.
    fn contains(&self, id: &BlobId) -> StoreResult<bool>;

    /// Delete a blob. Returns `true` if it existed.
    fn delete(&self, id: &BlobId) -> StoreResult<bool>;

    /// Delete many blobs. Returns how many existed.
    fn delete_batch(&self, ids: &[BlobId]) -> StoreResult<usize> {
        let mut removed = 0;
        for id in ids {
            if self.delete(id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Total bytes across all blobs.
    fn size(&self) -> StoreResult<u64>;

    /// Total bytes across the given blobs. Unknown ids count as zero.
    fn size_of(&self, ids: &[BlobId]) -> StoreResult<u64>;

    /// Number of stored blobs.
    fn len(&self) -> StoreResult<usize>;

    /// Returns `true` if no blobs are stored.
    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Unordered sequence of every stored id.
    ///
    /// Each call starts a fresh sequence over the ids present at call time.
    fn enumerate(&self) -> StoreResult<BlobIds>;
}

/// Backend-side view of the id/hash tables that the shared put logic drives.
/// Callers hold the backend's write lock for the whole put.
pub(crate) trait BlobTable {
    fn id_for_hash(&self, hash: &ContentHash) -> Option<BlobId>;

    fn holds(&self, id: &BlobId) -> bool;

    fn evict(&mut self, id: &BlobId) -> StoreResult<()>;

    fn store(&mut self, blob: Blob) -> StoreResult<()>;
}

pub(crate) fn check_size(size: usize, limit: u64) -> StoreResult<()> {
    let size = size as u64;
    if size > limit {
        return Err(StoreError::SizeExceeded { size, limit });
    }
    Ok(())
}

pub(crate) fn check_batch(
    contents: &[Vec<u8>],
    force_ids: Option<&[BlobId]>,
    limit: u64,
) -> StoreResult<()> {
    if let Some(forced) = force_ids {
        if forced.len() != contents.len() {
            return Err(StoreError::InvalidBatch(format!(
                "{} forced ids for {} contents",
                forced.len(),
                contents.len()
            )));
        }
    }
    contents.iter().try_for_each(|c| check_size(c.len(), limit))
}

/// Dedup-or-insert a single content. The hash is computed by the caller so
/// it can happen outside the write lock.
pub(crate) fn put_into<T: BlobTable>(
    table: &mut T,
    data: &[u8],
    hash: ContentHash,
    force_id: Option<BlobId>,
) -> StoreResult<BlobId> {
    if let Some(existing) = table.id_for_hash(&hash) {
        debug!(id = %existing.short_hex(), "blob dedup hit");
        return Ok(existing);
    }

    let id = match force_id {
        Some(forced) => {
            if table.holds(&forced) {
                debug!(id = %forced.short_hex(), "evicting blob at forced id");
                table.evict(&forced)?;
            }
            forced
        }
        None => BlobId::derive(&hash),
    };

    table.store(Blob::with_hash(id, hash, data.to_vec()))?;
    debug!(id = %id.short_hex(), size = data.len(), "blob stored");
    Ok(id)
}

pub(crate) fn hash_all(contents: &[Vec<u8>]) -> Vec<ContentHash> {
    contents.iter().map(|c| ContentHasher::BLOB.hash(c)).collect()
}
