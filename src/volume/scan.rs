//! Sequential walk over a data-log, independent of the index

use crate::common::{Error, ObjectId, Result};
use crate::volume::index::NeedleLocation;
use crate::volume::needle::{self, NEEDLE_HEADER_SIZE};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

/// One needle found in the data-log
#[derive(Debug, Clone)]
pub struct ScannedNeedle {
    pub id: ObjectId,
    pub location: NeedleLocation,
    /// `false` when the record's checksum does not match its data
    pub intact: bool,
}

/// Result of walking a data-log from offset 0
#[derive(Debug, Default)]
pub struct DataLogScan {
    pub needles: Vec<ScannedNeedle>,
    /// Bytes consumed by well-formed records
    pub valid_len: u64,
    /// Bytes after `valid_len` that do not form a complete record
    pub trailing_bytes: u64,
}

/// Walk every needle record in `path`.
///
/// Stops at the first malformed header or truncated record; whatever
/// follows is reported as `trailing_bytes`. A declared length is checked
/// against the file size before any buffer is allocated for it.
pub fn scan_data_log(path: &Path) -> Result<DataLogScan> {
    let file = File::open(path)?;
    let total_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let mut scan = DataLogScan::default();

    loop {
        let mut header = [0u8; NEEDLE_HEADER_SIZE];
        match reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let (id, size) = match needle::decode_header(&header) {
            Ok(parsed) => parsed,
            Err(Error::InvalidFormat(reason)) => {
                tracing::warn!("Stopping scan at offset {}: {}", scan.valid_len, reason);
                break;
            }
            Err(e) => return Err(e),
        };

        let record_len = needle::needle_len(size);
        if record_len > total_len - scan.valid_len {
            tracing::warn!(
                "Stopping scan at offset {}: record of {} bytes runs past the end of the data-log",
                scan.valid_len,
                record_len
            );
            break;
        }

        let mut record = vec![0u8; record_len as usize];
        record[..NEEDLE_HEADER_SIZE].copy_from_slice(&header);
        match reader.read_exact(&mut record[NEEDLE_HEADER_SIZE..]) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let intact = needle::decode(&record, size).is_ok();
        scan.needles.push(ScannedNeedle {
            id,
            location: NeedleLocation {
                offset: scan.valid_len,
                size,
            },
            intact,
        });
        scan.valid_len += record.len() as u64;
    }

    scan.trailing_bytes = total_len - scan.valid_len;
    Ok(scan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_scan_stops_at_torn_record() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let a = ObjectId::generate();
        let b = ObjectId::generate();
        file.write_all(&needle::encode(&a, b"first")).unwrap();
        file.write_all(&needle::encode(&b, b"second")).unwrap();
        let torn = needle::encode(&ObjectId::generate(), b"third");
        file.write_all(&torn[..torn.len() - 2]).unwrap();

        let scan = scan_data_log(file.path()).unwrap();
        assert_eq!(scan.needles.len(), 2);
        assert_eq!(scan.needles[0].id, a);
        assert_eq!(scan.needles[1].location.offset, 31);
        assert!(scan.needles.iter().all(|n| n.intact));
        assert_eq!(scan.valid_len, 31 + 32);
        assert_eq!(scan.trailing_bytes, torn.len() as u64 - 2);
    }

    #[test]
    fn test_scan_flags_bad_checksum() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut record = needle::encode(&ObjectId::generate(), b"payload");
        let last = record.len() - 1;
        record[last] ^= 0xff;
        file.write_all(&record).unwrap();

        let scan = scan_data_log(file.path()).unwrap();
        assert_eq!(scan.needles.len(), 1);
        assert!(!scan.needles[0].intact);
        assert_eq!(scan.trailing_bytes, 0);
    }

    #[test]
    fn test_scan_rejects_oversized_length_without_allocating() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let kept = needle::encode(&ObjectId::generate(), b"kept");
        file.write_all(&kept).unwrap();

        let mut header = vec![0xCA, 0xFE];
        header.extend_from_slice(&[0x01; 16]);
        header.extend_from_slice(&0xFFFF_FFF0u32.to_be_bytes());
        file.write_all(&header).unwrap();

        let scan = scan_data_log(file.path()).unwrap();
        assert_eq!(scan.needles.len(), 1);
        assert_eq!(scan.valid_len, kept.len() as u64);
        assert_eq!(scan.trailing_bytes, header.len() as u64);
    }
}
