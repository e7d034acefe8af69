//! Offline consistency check of one volume

use crate::common::{ObjectId, Result, VolumeId};
use crate::volume::identity;
use crate::volume::index::Index;
use crate::volume::scan::scan_data_log;
use crate::volume::store::{data_file_path, index_file_path};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct VerifyReport {
    pub volume_id: VolumeId,
    /// Needle records found in the data-log
    pub records: usize,
    /// Ids present in the index-log
    pub indexed: usize,
    /// Intact needles the index does not point to
    pub orphans: Vec<ObjectId>,
    /// Needles whose checksum does not match their data
    pub corrupt: Vec<ObjectId>,
    /// Index entries that do not point at a matching needle
    pub dangling: Vec<ObjectId>,
    /// Unparseable bytes at the end of the data-log
    pub trailing_bytes: u64,
}

impl VerifyReport {
    /// Every indexed object can be read back
    pub fn is_healthy(&self) -> bool {
        self.corrupt.is_empty() && self.dangling.is_empty()
    }
}

/// Replay the index-log at `path`; a missing file is an empty index
pub(crate) fn read_index(path: &Path) -> Result<Index> {
    match File::open(path) {
        Ok(file) => {
            let len = file.metadata()?.len();
            Index::replay(file, len)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Index::new()),
        Err(e) => Err(e.into()),
    }
}

/// Walk the data-log of the volume in `data_dir` and compare it with its
/// index-log. Must not run while a storage server has the volume open.
pub fn verify_volume(data_dir: &Path) -> Result<VerifyReport> {
    let volume_id = identity::load(data_dir)?;
    tracing::info!("Verifying volume {} in {:?}", volume_id, data_dir);

    let index = read_index(&index_file_path(data_dir, &volume_id))?;
    let scan = scan_data_log(&data_file_path(data_dir, &volume_id))?;

    let by_offset: HashMap<u64, _> = scan
        .needles
        .iter()
        .map(|n| (n.location.offset, n))
        .collect();

    let mut orphans = Vec::new();
    let mut corrupt = Vec::new();
    for needle in &scan.needles {
        if !needle.intact {
            corrupt.push(needle.id);
        } else if index.get(&needle.id) != Some(&needle.location) {
            orphans.push(needle.id);
        }
    }

    let mut dangling: Vec<ObjectId> = index
        .iter()
        .filter(|(id, location)| {
            !matches!(
                by_offset.get(&location.offset),
                Some(n) if n.id == **id && n.location.size == location.size
            )
        })
        .map(|(id, _)| *id)
        .collect();
    dangling.sort();

    let report = VerifyReport {
        volume_id,
        records: scan.needles.len(),
        indexed: index.len(),
        orphans,
        corrupt,
        dangling,
        trailing_bytes: scan.trailing_bytes,
    };

    if report.is_healthy() {
        tracing::info!(
            "Volume {} healthy: {} records, {} orphans",
            volume_id,
            report.records,
            report.orphans.len()
        );
    } else {
        tracing::warn!(
            "Volume {} has {} corrupt needles and {} dangling index entries",
            volume_id,
            report.corrupt.len(),
            report.dangling.len()
        );
    }
    Ok(report)
}
