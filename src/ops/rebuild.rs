//! Offline index-log rebuild
//!
//! Rewrites the index-log from a scan of the data-log, making orphan needles
//! readable again. The new index is written beside the old one and renamed
//! over it once synced.

use crate::common::{Error, Result, VolumeId};
use crate::ops::verify::read_index;
use crate::volume::identity;
use crate::volume::index::encode_entry;
use crate::volume::needle::needle_len;
use crate::volume::scan::scan_data_log;
use crate::volume::store::{data_file_path, index_file_path};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct RebuildReport {
    pub volume_id: VolumeId,
    /// Entries written to the new index-log
    pub entries: usize,
    /// Needles left out because their checksum does not match
    pub skipped_corrupt: usize,
    /// Bytes cut from the end of the data-log
    pub truncated_bytes: u64,
}

/// Rebuild the index-log of the volume in `data_dir`.
///
/// With `truncate_tail`, unparseable bytes after the last complete record
/// are cut from the data-log. The cut is refused, before anything is
/// written, when the current index-log still points into those bytes.
/// Must not run while a storage server has the volume open.
pub fn rebuild_index(data_dir: &Path, truncate_tail: bool) -> Result<RebuildReport> {
    let volume_id = identity::load(data_dir)?;
    let data_path = data_file_path(data_dir, &volume_id);
    let index_path = index_file_path(data_dir, &volume_id);
    let tmp_path = index_path.with_extension("idx.tmp");

    tracing::info!("Rebuilding index-log of volume {} from {:?}", volume_id, data_path);
    let scan = scan_data_log(&data_path)?;

    if truncate_tail && scan.trailing_bytes > 0 {
        check_tail_unreferenced(&index_path, scan.valid_len)?;
    }

    let mut entries = 0;
    let mut skipped_corrupt = 0;
    {
        let mut out = BufWriter::new(File::create(&tmp_path)?);
        for needle in &scan.needles {
            if !needle.intact {
                tracing::warn!("Skipping corrupt needle {} at offset {}", needle.id, needle.location.offset);
                skipped_corrupt += 1;
                continue;
            }
            out.write_all(&encode_entry(&needle.id, &needle.location))?;
            entries += 1;
        }
        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, &index_path)?;

    let mut truncated_bytes = 0;
    if truncate_tail && scan.trailing_bytes > 0 {
        let data = OpenOptions::new().write(true).open(&data_path)?;
        data.set_len(scan.valid_len)?;
        data.sync_all()?;
        truncated_bytes = scan.trailing_bytes;
        tracing::warn!("Truncated {} trailing bytes from {:?}", truncated_bytes, data_path);
    }

    tracing::info!("Index-log of volume {} rebuilt with {} entries", volume_id, entries);
    Ok(RebuildReport {
        volume_id,
        entries,
        skipped_corrupt,
        truncated_bytes,
    })
}

/// Fail if any entry of the index-log at `index_path` reaches past `valid_len`
fn check_tail_unreferenced(index_path: &Path, valid_len: u64) -> Result<()> {
    let index = read_index(index_path).map_err(|e| {
        Error::InvalidArgument(format!(
            "cannot check the tail against an unreadable index-log ({}); rebuild without truncation first",
            e
        ))
    })?;

    if let Some((id, location)) = index
        .iter()
        .find(|(_, l)| l.offset.saturating_add(needle_len(l.size)) > valid_len)
    {
        return Err(Error::InvalidArgument(format!(
            "refusing to truncate the data-log to {} bytes: indexed object {} lives at offset {}",
            valid_len, id, location.offset
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ObjectId, SyncPolicy};
    use crate::ops::verify::verify_volume;
    use crate::volume::needle;
    use crate::volume::store::Store;
    use tempfile::TempDir;

    #[test]
    fn test_rebuild_recovers_orphans() {
        let dir = TempDir::new().unwrap();
        let volume_id = identity::load_or_create(dir.path()).unwrap();
        let store = Store::open(dir.path(), volume_id, SyncPolicy::Never).unwrap();
        let kept = store.write(b"kept").unwrap();
        drop(store);

        let orphan = ObjectId::generate();
        let mut data = OpenOptions::new()
            .append(true)
            .open(data_file_path(dir.path(), &volume_id))
            .unwrap();
        data.write_all(&needle::encode(&orphan, b"orphan")).unwrap();
        data.write_all(&[0xCA, 0xFE, 0x00]).unwrap();
        drop(data);

        let report = rebuild_index(dir.path(), true).unwrap();
        assert_eq!(report.entries, 2);
        assert_eq!(report.skipped_corrupt, 0);
        assert_eq!(report.truncated_bytes, 3);

        let store = Store::open(dir.path(), volume_id, SyncPolicy::Never).unwrap();
        assert_eq!(store.read(&kept).unwrap(), b"kept");
        assert_eq!(store.read(&orphan).unwrap(), b"orphan");
        drop(store);

        let verify = verify_volume(dir.path()).unwrap();
        assert!(verify.orphans.is_empty());
        assert_eq!(verify.trailing_bytes, 0);
        assert!(!index_file_path(dir.path(), &volume_id)
            .with_extension("idx.tmp")
            .exists());
    }

    #[test]
    fn test_truncate_refused_when_index_points_past_torn_record() {
        let dir = TempDir::new().unwrap();
        let volume_id = identity::load_or_create(dir.path()).unwrap();
        let data_path = data_file_path(dir.path(), &volume_id);
        let store = Store::open(dir.path(), volume_id, SyncPolicy::Never).unwrap();
        let before = store.write(b"before").unwrap();
        drop(store);

        // torn bytes in the middle of the log, then a later indexed needle
        let mut data = OpenOptions::new().append(true).open(&data_path).unwrap();
        data.write_all(&[0x00, 0x00, 0x00]).unwrap();
        drop(data);
        let store = Store::open(dir.path(), volume_id, SyncPolicy::Never).unwrap();
        let after = store.write(b"after").unwrap();
        drop(store);
        let len = fs::metadata(&data_path).unwrap().len();

        let err = rebuild_index(dir.path(), true).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(fs::metadata(&data_path).unwrap().len(), len);

        let store = Store::open(dir.path(), volume_id, SyncPolicy::Never).unwrap();
        assert_eq!(store.read(&before).unwrap(), b"before");
        assert_eq!(store.read(&after).unwrap(), b"after");
    }
}
