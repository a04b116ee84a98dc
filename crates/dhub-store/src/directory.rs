use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use dhub_types::{BlobId, ContentHash};
use tracing::{debug, info, warn};

use crate::blob::{Blob, BlobInfo};
use crate::error::{StoreError, StoreResult};
use crate::hasher::ContentHasher;
use crate::traits::{check_batch, check_size, hash_all, put_into, BlobIds, BlobStore, BlobTable};

/// Frame header size: 4 bytes length + 4 bytes CRC.
const FRAME_HEADER_SIZE: usize = 8;

/// Upper bound on an encoded [`BlobInfo`]; anything larger is corruption.
const MAX_INFO_LEN: u32 = 4096;

/// Filesystem-backed blob store: one file per blob.
///
/// Layout under the root directory:
/// ```text
/// blobs/<first two hex chars>/<full hex id>
/// tmp/                           (staging area for atomic writes)
/// ```
///
/// Each blob file starts with a framed header followed by the raw bytes:
/// ```text
/// [4 bytes: header length (little-endian u32)]
/// [4 bytes: CRC32 of header (little-endian u32)]
/// [N bytes: bincode-serialized BlobInfo]
/// [size bytes: blob content]
/// ```
///
/// Files are staged in `tmp/` and renamed into place, so a crash never leaves
/// a half-written blob under `blobs/`. The id/hash index is rebuilt from the
/// headers on [`open`](Self::open); content hashes are verified on every read.
pub struct DirectoryBlobStore {
    root: PathBuf,
    max_blob_size: u64,
    index: RwLock<DirIndex>,
}

#[derive(Default)]
struct DirIndex {
    entries: HashMap<BlobId, BlobInfo>,
    by_hash: HashMap<ContentHash, BlobId>,
}

impl DirIndex {
    fn insert(&mut self, info: BlobInfo) {
        self.by_hash.insert(info.content_hash, info.id);
        self.entries.insert(info.id, info);
    }

    fn remove(&mut self, id: &BlobId) -> Option<BlobInfo> {
        let info = self.entries.remove(id)?;
        if self.by_hash.get(&info.content_hash) == Some(id) {
            self.by_hash.remove(&info.content_hash);
        }
        Some(info)
    }
}

/// Write-locked view handed to the shared put logic.
struct DirTable<'a> {
    root: &'a Path,
    index: &'a mut DirIndex,
}

impl BlobTable for DirTable<'_> {
    fn id_for_hash(&self, hash: &ContentHash) -> Option<BlobId> {
        self.index.by_hash.get(hash).copied()
    }

    fn holds(&self, id: &BlobId) -> bool {
        self.index.entries.contains_key(id)
    }

    fn evict(&mut self, id: &BlobId) -> StoreResult<()> {
        remove_file_if_present(&blob_path(self.root, id))?;
        self.index.remove(id);
        Ok(())
    }

    fn store(&mut self, blob: Blob) -> StoreResult<()> {
        let info = blob.info();
        write_blob_file(self.root, &info, &blob.data)?;
        self.index.insert(info);
        Ok(())
    }
}

impl DirectoryBlobStore {
    /// Open (or create) a blob directory and rebuild its index.
    ///
    /// Files whose header cannot be decoded are logged and left out of the
    /// index. Leftover staging files from an interrupted write are removed.
    pub fn open(root: impl AsRef<Path>, max_blob_size: u64) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("blobs"))?;
        fs::create_dir_all(root.join("tmp"))?;

        clear_staging(&root)?;
        let index = rebuild_index(&root)?;
        info!(
            root = %root.display(),
            blobs = index.entries.len(),
            "opened directory blob store"
        );

        Ok(Self {
            root,
            max_blob_size,
            index: RwLock::new(index),
        })
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, DirIndex>> {
        self.index
            .read()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, DirIndex>> {
        self.index
            .write()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }

    fn load(&self, id: &BlobId) -> StoreResult<Blob> {
        if !self.read()?.entries.contains_key(id) {
            return Err(StoreError::NotFound(*id));
        }
        let bytes = match fs::read(blob_path(&self.root, id)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(*id))
            }
            Err(e) => return Err(e.into()),
        };

        let mut cursor = bytes.as_slice();
        let info = read_info(&mut cursor, id)?;
        if cursor.len() as u64 != info.size {
            return Err(StoreError::CorruptBlob {
                id: *id,
                reason: format!("expected {} content bytes, found {}", info.size, cursor.len()),
            });
        }

        let computed = ContentHasher::BLOB.hash(cursor);
        if computed != info.content_hash {
            return Err(StoreError::HashMismatch {
                id: *id,
                expected: info.content_hash,
                computed,
            });
        }

        Ok(Blob::with_hash(info.id, info.content_hash, cursor.to_vec()))
    }
}

impl BlobStore for DirectoryBlobStore {
    fn max_blob_size(&self) -> u64 {
        self.max_blob_size
    }

    fn put(&self, data: &[u8]) -> StoreResult<BlobId> {
        check_size(data.len(), self.max_blob_size)?;
        let hash = ContentHasher::BLOB.hash(data);
        let mut index = self.write()?;
        let mut table = DirTable {
            root: &self.root,
            index: &mut index,
        };
        put_into(&mut table, data, hash, None)
    }

    fn put_batch(
        &self,
        contents: &[Vec<u8>],
        force_ids: Option<&[BlobId]>,
    ) -> StoreResult<Vec<BlobId>> {
        check_batch(contents, force_ids, self.max_blob_size)?;
        let hashes = hash_all(contents);
        let mut index = self.write()?;
        let mut table = DirTable {
            root: &self.root,
            index: &mut index,
        };
        let mut ids = Vec::with_capacity(contents.len());
        for (i, (data, hash)) in contents.iter().zip(hashes).enumerate() {
            let forced = force_ids.map(|f| f[i]);
            ids.push(put_into(&mut table, data, hash, forced)?);
        }
        Ok(ids)
    }

    fn get(&self, id: &BlobId) -> StoreResult<Blob> {
        self.load(id)
    }

    fn contains(&self, id: &BlobId) -> StoreResult<bool> {
        Ok(self.read()?.entries.contains_key(id))
    }

    fn delete(&self, id: &BlobId) -> StoreResult<bool> {
        let mut index = self.write()?;
        if !index.entries.contains_key(id) {
            return Ok(false);
        }
        remove_file_if_present(&blob_path(&self.root, id))?;
        index.remove(id);
        debug!(id = %id.short_hex(), "blob file removed");
        Ok(true)
    }

    fn size(&self) -> StoreResult<u64> {
        Ok(self.read()?.entries.values().map(|i| i.size).sum())
    }

    fn size_of(&self, ids: &[BlobId]) -> StoreResult<u64> {
        let index = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| index.entries.get(id))
            .map(|i| i.size)
            .sum())
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.read()?.entries.len())
    }

    fn enumerate(&self) -> StoreResult<BlobIds> {
        let ids: Vec<BlobId> = self.read()?.entries.keys().copied().collect();
        Ok(Box::new(ids.into_iter()))
    }
}

impl std::fmt::Debug for DirectoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len().unwrap_or_default();
        f.debug_struct("DirectoryBlobStore")
            .field("root", &self.root)
            .field("blob_count", &count)
            .field("max_blob_size", &self.max_blob_size)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

fn blob_path(root: &Path, id: &BlobId) -> PathBuf {
    let hex = id.to_hex();
    root.join("blobs").join(&hex[..2]).join(hex)
}

fn write_blob_file(root: &Path, info: &BlobInfo, data: &[u8]) -> StoreResult<()> {
    let header =
        bincode::serialize(info).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let length = header.len() as u32;
    let crc = crc32fast::hash(&header);

    let mut staged = tempfile::NamedTempFile::new_in(root.join("tmp"))?;
    staged.write_all(&length.to_le_bytes())?;
    staged.write_all(&crc.to_le_bytes())?;
    staged.write_all(&header)?;
    staged.write_all(data)?;
    staged.as_file().sync_all()?;

    let path = blob_path(root, &info.id);
    if let Some(shard) = path.parent() {
        fs::create_dir_all(shard)?;
    }
    staged.persist(&path).map_err(|e| e.error)?;
    Ok(())
}

fn remove_file_if_present(path: &Path) -> StoreResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Read and validate the framed header, leaving the reader at the content.
fn read_info<R: Read>(reader: &mut R, id: &BlobId) -> StoreResult<BlobInfo> {
    let corrupt = |reason: String| StoreError::CorruptBlob { id: *id, reason };

    let mut frame = [0u8; FRAME_HEADER_SIZE];
    reader
        .read_exact(&mut frame)
        .map_err(|e| corrupt(format!("short frame header: {e}")))?;
    let length = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
    let expected_crc = u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);

    if length == 0 || length > MAX_INFO_LEN {
        return Err(corrupt(format!("invalid header length {length}")));
    }

    let mut header = vec![0u8; length as usize];
    reader
        .read_exact(&mut header)
        .map_err(|e| corrupt(format!("truncated header: {e}")))?;

    let actual_crc = crc32fast::hash(&header);
    if actual_crc != expected_crc {
        return Err(corrupt(format!(
            "header CRC mismatch: expected {expected_crc:#010x}, actual {actual_crc:#010x}"
        )));
    }

    let info: BlobInfo =
        bincode::deserialize(&header).map_err(|e| corrupt(format!("undecodable header: {e}")))?;
    if info.id != *id {
        return Err(corrupt(format!("header names blob {}", info.id)));
    }
    Ok(info)
}

fn clear_staging(root: &Path) -> StoreResult<()> {
    for entry in fs::read_dir(root.join("tmp"))? {
        let path = entry?.path();
        if path.is_file() {
            warn!(path = %path.display(), "removing stale staging file");
            remove_file_if_present(&path)?;
        }
    }
    Ok(())
}

fn rebuild_index(root: &Path) -> StoreResult<DirIndex> {
    let mut index = DirIndex::default();

    for shard in fs::read_dir(root.join("blobs"))? {
        let shard = shard?.path();
        if !shard.is_dir() {
            continue;
        }
        for entry in fs::read_dir(&shard)? {
            let path = entry?.path();
            let Some(id) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse::<BlobId>().ok())
            else {
                warn!(path = %path.display(), "ignoring unrecognised file in blob directory");
                continue;
            };

            match index_entry(&path, &id) {
                Ok(info) => index.insert(info),
                Err(e) => {
                    warn!(id = %id.short_hex(), error = %e, "skipping unreadable blob file");
                }
            }
        }
    }

    debug!(blobs = index.entries.len(), "blob index rebuilt");
    Ok(index)
}

fn index_entry(path: &Path, id: &BlobId) -> StoreResult<BlobInfo> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let info = read_info(&mut reader, id)?;

    let header_len = bincode::serialized_size(&info)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let expected = FRAME_HEADER_SIZE as u64 + header_len + info.size;
    if file_len != expected {
        return Err(StoreError::CorruptBlob {
            id: *id,
            reason: format!("file is {file_len} bytes, expected {expected}"),
        });
    }
    Ok(info)
}
