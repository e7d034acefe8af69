//! Persistent identity of a storage server (`<data-dir>/volume.id`)

use crate::common::{Error, Result, VolumeId, ID_SIZE};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

pub const IDENTITY_FILE: &str = "volume.id";

fn parse(path: &Path, bytes: &[u8]) -> Result<VolumeId> {
    if bytes.len() != ID_SIZE {
        return Err(Error::InvalidFormat(format!(
            "{:?} holds {} bytes, expected {}",
            path,
            bytes.len(),
            ID_SIZE
        )));
    }
    VolumeId::from_slice(bytes)
}

/// Read an existing identity. Never creates one.
pub fn load(data_dir: &Path) -> Result<VolumeId> {
    let path = data_dir.join(IDENTITY_FILE);
    match fs::read(&path) {
        Ok(bytes) => parse(&path, &bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(Error::NotFound(format!("no volume identity at {:?}", path)))
        }
        Err(e) => Err(e.into()),
    }
}

/// Read the 16 raw id bytes, creating the file with a fresh id on first run
pub fn load_or_create(data_dir: &Path) -> Result<VolumeId> {
    let path = data_dir.join(IDENTITY_FILE);

    match fs::read(&path) {
        Ok(bytes) => parse(&path, &bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            fs::create_dir_all(data_dir)?;
            let id = VolumeId::generate();
            fs::write(&path, id.as_bytes())?;
            tracing::info!("Created new volume identity {} at {:?}", id, path);
            Ok(id)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_identity_is_stable() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("nested");

        let first = load_or_create(&data_dir).unwrap();
        let second = load_or_create(&data_dir).unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::read(data_dir.join(IDENTITY_FILE)).unwrap(), first.as_bytes());
    }

    #[test]
    fn test_load_never_creates() {
        let dir = tempdir().unwrap();
        assert!(matches!(load(dir.path()), Err(Error::NotFound(_))));
        assert!(!dir.path().join(IDENTITY_FILE).exists());

        let id = load_or_create(dir.path()).unwrap();
        assert_eq!(load(dir.path()).unwrap(), id);
    }

    #[test]
    fn test_rejects_wrong_length() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(IDENTITY_FILE), b"short").unwrap();
        assert!(matches!(
            load_or_create(dir.path()),
            Err(Error::InvalidFormat(_))
        ));
    }
}
