//! Needle codec
//!
//! Needle record format (big-endian):
//! [MAGIC:2 = 0xCAFE][OBJECT_ID:16][DATA_LEN:4][DATA:n][CRC32:4]
//!
//! The checksum covers DATA only.

use crate::common::{crc32, Error, ObjectId, Result, ID_SIZE};
use bytes::{Buf, BufMut};

pub const NEEDLE_MAGIC: u16 = 0xCAFE;

/// Bytes preceding DATA
pub const NEEDLE_HEADER_SIZE: usize = 2 + ID_SIZE + 4;

/// Total fixed overhead per needle (header + checksum)
pub const NEEDLE_OVERHEAD: usize = NEEDLE_HEADER_SIZE + 4;

/// On-disk length of a needle carrying `size` data bytes
pub fn needle_len(size: u32) -> u64 {
    NEEDLE_OVERHEAD as u64 + size as u64
}

/// Build a needle record
pub fn encode(id: &ObjectId, data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(NEEDLE_OVERHEAD + data.len());
    buf.put_u16(NEEDLE_MAGIC);
    buf.put_slice(id.as_bytes());
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
    buf.put_u32(crc32(data));
    buf
}

/// Parse a needle record that is expected to carry `declared_size` data bytes
pub fn decode(buf: &[u8], declared_size: u32) -> Result<(ObjectId, Vec<u8>)> {
    let size = declared_size as usize;
    if buf.len() as u64 != needle_len(declared_size) {
        return Err(Error::InvalidFormat(format!(
            "needle is {} bytes, expected {}",
            buf.len(),
            needle_len(declared_size)
        )));
    }

    let mut cursor = buf;
    let magic = cursor.get_u16();
    if magic != NEEDLE_MAGIC {
        return Err(Error::InvalidFormat(format!("bad needle magic {:#06x}", magic)));
    }

    let id = ObjectId::from_slice(&cursor[..ID_SIZE])?;
    cursor.advance(ID_SIZE);

    let data_len = cursor.get_u32();
    if data_len != declared_size {
        return Err(Error::InvalidFormat(format!(
            "needle length field {} disagrees with index size {}",
            data_len, declared_size
        )));
    }

    let data = &cursor[..size];
    cursor.advance(size);
    let stored = cursor.get_u32();
    let computed = crc32(data);
    if stored != computed {
        return Err(Error::Corrupt {
            expected: format!("{:08x}", stored),
            actual: format!("{:08x}", computed),
        });
    }

    Ok((id, data.to_vec()))
}

/// Parse just the header: (object id, data length).
/// Used when walking a data-log without an index.
pub fn decode_header(buf: &[u8; NEEDLE_HEADER_SIZE]) -> Result<(ObjectId, u32)> {
    let mut cursor = &buf[..];
    let magic = cursor.get_u16();
    if magic != NEEDLE_MAGIC {
        return Err(Error::InvalidFormat(format!("bad needle magic {:#06x}", magic)));
    }
    let id = ObjectId::from_slice(&cursor[..ID_SIZE])?;
    cursor.advance(ID_SIZE);
    Ok((id, cursor.get_u32()))
}
