//! In-memory needle index and its on-disk append log
//!
//! Each object id maps to a `NeedleLocation` describing where its needle
//! starts in the data-log. The index-log mirrors write order, one fixed-size
//! entry per write:
//! [OBJECT_ID:16][OFFSET:8 BE][SIZE:4 BE]
//!
//! Replaying the index-log at open is the only recovery mechanism.

use crate::common::{Error, ObjectId, Result, ID_SIZE};
use bytes::{Buf, BufMut};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{BufReader, Read};

pub const INDEX_ENTRY_SIZE: usize = ID_SIZE + 8 + 4;

/// Physical location of a needle in the data-log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NeedleLocation {
    /// Start of the needle record
    pub offset: u64,
    /// Length of DATA (not of the whole record)
    pub size: u32,
}

pub fn encode_entry(id: &ObjectId, location: &NeedleLocation) -> [u8; INDEX_ENTRY_SIZE] {
    let mut buf = [0u8; INDEX_ENTRY_SIZE];
    let mut cursor = &mut buf[..];
    cursor.put_slice(id.as_bytes());
    cursor.put_u64(location.offset);
    cursor.put_u32(location.size);
    buf
}

pub fn decode_entry(buf: &[u8]) -> Result<(ObjectId, NeedleLocation)> {
    if buf.len() != INDEX_ENTRY_SIZE {
        return Err(Error::CorruptIndex(format!(
            "index entry is {} bytes, expected {}",
            buf.len(),
            INDEX_ENTRY_SIZE
        )));
    }
    let id = ObjectId::from_slice(&buf[..ID_SIZE])
        .map_err(|e| Error::CorruptIndex(e.to_string()))?;
    let mut cursor = &buf[ID_SIZE..];
    let offset = cursor.get_u64();
    let size = cursor.get_u32();
    Ok((id, NeedleLocation { offset, size }))
}

/// HashMap-based index for fast needle lookups
#[derive(Debug, Default)]
pub struct Index {
    map: HashMap<ObjectId, NeedleLocation>,
}

impl Index {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Rebuild from an index-log of `len` bytes, read sequentially.
    /// Later entries for the same id win.
    pub fn replay<R: Read>(reader: R, len: u64) -> Result<Self> {
        if len % INDEX_ENTRY_SIZE as u64 != 0 {
            return Err(Error::CorruptIndex(format!(
                "index-log length {} is not a multiple of {}",
                len, INDEX_ENTRY_SIZE
            )));
        }

        let mut reader = BufReader::new(reader);
        let mut index = Self::new();
        let mut entry = [0u8; INDEX_ENTRY_SIZE];

        for n in 0..len / INDEX_ENTRY_SIZE as u64 {
            reader.read_exact(&mut entry).map_err(|e| {
                Error::CorruptIndex(format!("failed to read index entry {}: {}", n, e))
            })?;
            let (id, location) = decode_entry(&entry)?;
            index.insert(id, location);
        }

        Ok(index)
    }

    /// Insert or update an entry
    pub fn insert(&mut self, id: ObjectId, location: NeedleLocation) {
        self.map.insert(id, location);
    }

    /// Get location for id
    pub fn get(&self, id: &ObjectId) -> Option<&NeedleLocation> {
        self.map.get(id)
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.map.contains_key(id)
    }

    /// Number of ids
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate over all entries
    pub fn iter(&self) -> impl Iterator<Item = (&ObjectId, &NeedleLocation)> {
        self.map.iter()
    }
}
