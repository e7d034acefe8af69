//! Needle store: one append-only data-log and one index-log per volume
//!
//! Layout:
//! - `<dir>/volume_<hex id>.dat`: needle records, appended only
//! - `<dir>/volume_<hex id>.idx`: 28-byte index entries, in write order
//!
//! A write appends to the data-log first and to the index-log second. These
//! are two independent appends: a crash between them leaves an orphan needle
//! in the data-log that the index does not know about. Orphans are invisible
//! to `read` until the index-log is rebuilt offline (see `ops::rebuild`).

use crate::common::{format_bytes, Error, ObjectId, Result, SyncPolicy, VolumeId};
use crate::volume::index::{encode_entry, Index, NeedleLocation};
use crate::volume::needle::{self, needle_len};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

const VOLUME_FILE_PREFIX: &str = "volume_";
const DATA_FILE_EXT: &str = "dat";
const INDEX_FILE_EXT: &str = "idx";

pub fn data_file_path(dir: &Path, volume_id: &VolumeId) -> PathBuf {
    dir.join(format!("{}{}.{}", VOLUME_FILE_PREFIX, volume_id, DATA_FILE_EXT))
}

pub fn index_file_path(dir: &Path, volume_id: &VolumeId) -> PathBuf {
    dir.join(format!("{}{}.{}", VOLUME_FILE_PREFIX, volume_id, INDEX_FILE_EXT))
}

/// Store statistics
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub volume_id: VolumeId,
    pub needles: usize,
    pub data_bytes: u64,
}

struct Inner {
    data: File,
    idx: File,
    index: Index,
}

/// Needle store for a single volume.
///
/// Writes take the lock exclusively: the offset of a new needle is the
/// data-log length observed under the lock. Reads share the lock and use
/// positional reads, so they run concurrently with each other.
pub struct Store {
    volume_id: VolumeId,
    data_path: PathBuf,
    index_path: PathBuf,
    sync_policy: SyncPolicy,
    inner: RwLock<Inner>,
}

fn poisoned<T>(_: PoisonError<T>) -> Error {
    Error::Internal("volume lock poisoned".into())
}

/// An append-only file that can be cut back to a previous length
trait AppendLog: Write {
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl AppendLog for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Append `bytes` to a log currently `len` bytes long. A failed append is
/// cut back so that no partial record stays in the middle of the log.
fn append_or_rollback<L: AppendLog>(log: &mut L, len: u64, bytes: &[u8]) -> io::Result<()> {
    if let Err(e) = log.write_all(bytes) {
        if let Err(cut) = log.truncate(len) {
            tracing::error!("Failed to cut log back to {} bytes: {}", len, cut);
        }
        return Err(e);
    }
    Ok(())
}

impl Store {
    /// Open or create the volume's files and replay its index-log
    pub fn open(dir: &Path, volume_id: VolumeId, sync_policy: SyncPolicy) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let data_path = data_file_path(dir, &volume_id);
        let index_path = index_file_path(dir, &volume_id);

        let data = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&data_path)?;
        let idx = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&index_path)?;

        tracing::info!("Replaying index-log {:?}", index_path);
        let idx_len = idx.metadata()?.len();
        let index = Index::replay(&idx, idx_len)?;

        let data_len = data.metadata()?.len();
        tracing::info!(
            "Volume {} opened: {} needles, data-log {}",
            volume_id,
            index.len(),
            format_bytes(data_len)
        );

        Ok(Self {
            volume_id,
            data_path,
            index_path,
            sync_policy,
            inner: RwLock::new(Inner { data, idx, index }),
        })
    }

    pub fn volume_id(&self) -> VolumeId {
        self.volume_id
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Append a new needle and return its freshly generated id
    pub fn write(&self, data: &[u8]) -> Result<ObjectId> {
        let size = u32::try_from(data.len()).map_err(|_| {
            Error::InvalidArgument(format!("object of {} bytes is too large", data.len()))
        })?;

        let mut inner = self.inner.write().map_err(poisoned)?;

        let id = loop {
            let candidate = ObjectId::generate();
            if !inner.index.contains(&candidate) {
                break candidate;
            }
        };

        let offset = inner.data.metadata()?.len();
        let idx_len = inner.idx.metadata()?.len();
        let location = NeedleLocation { offset, size };

        append_or_rollback(&mut inner.data, offset, &needle::encode(&id, data))?;
        if self.sync_policy == SyncPolicy::Always {
            inner.data.sync_data()?;
        }

        if let Err(e) = append_or_rollback(&mut inner.idx, idx_len, &encode_entry(&id, &location)) {
            // the needle was never acknowledged
            if let Err(cut) = inner.data.set_len(offset) {
                tracing::error!("Failed to drop unindexed needle {}: {}", id, cut);
            }
            return Err(e.into());
        }
        if self.sync_policy == SyncPolicy::Always {
            inner.idx.sync_data()?;
        }

        inner.index.insert(id, location);
        tracing::debug!(volume = %self.volume_id, object = %id, offset, size, "needle written");

        Ok(id)
    }

    /// Read and verify the needle for `id`
    pub fn read(&self, id: &ObjectId) -> Result<Vec<u8>> {
        let inner = self.inner.read().map_err(poisoned)?;

        let location = *inner
            .index
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("object {}", id)))?;

        let past_end = || {
            Error::InvalidFormat(format!(
                "needle {} at offset {} extends past the end of the data-log",
                id, location.offset
            ))
        };
        let end = location
            .offset
            .checked_add(needle_len(location.size))
            .ok_or_else(past_end)?;
        if end > inner.data.metadata()?.len() {
            return Err(past_end());
        }

        let mut buf = vec![0u8; needle_len(location.size) as usize];
        inner
            .data
            .read_exact_at(&mut buf, location.offset)
            .map_err(|e| match e.kind() {
                ErrorKind::UnexpectedEof => past_end(),
                _ => Error::Io(e),
            })?;
        drop(inner);

        let (stored_id, data) = needle::decode(&buf, location.size)?;
        if stored_id != *id {
            return Err(Error::InvalidFormat(format!(
                "needle at offset {} belongs to {}, not {}",
                location.offset, stored_id, id
            )));
        }

        Ok(data)
    }

    pub fn contains(&self, id: &ObjectId) -> Result<bool> {
        Ok(self.inner.read().map_err(poisoned)?.index.contains(id))
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(StoreStats {
            volume_id: self.volume_id,
            needles: inner.index.len(),
            data_bytes: inner.data.metadata()?.len(),
        })
    }

    /// Snapshot of every indexed location
    pub fn locations(&self) -> Result<Vec<(ObjectId, NeedleLocation)>> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.index.iter().map(|(id, loc)| (*id, *loc)).collect())
    }
}
