//! 16-byte identifiers for volumes and needles, plus the client-facing fat id

use crate::common::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const ID_SIZE: usize = 16;

/// Fixed-size identifier with structural equality.
///
/// Rendered as 32 lowercase hex characters, which is also the form used in
/// volume file names. Parsing additionally accepts the hyphenated UUID form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Id([u8; ID_SIZE]);

pub type VolumeId = Id;
pub type ObjectId = Id;

impl Id {
    /// Fresh random id (UUID v4 bytes)
    pub fn generate() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }

    pub const fn from_bytes(bytes: [u8; ID_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; ID_SIZE] = bytes.try_into().map_err(|_| {
            Error::InvalidArgument(format!("id must be {} bytes, got {}", ID_SIZE, bytes.len()))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.to_hex())
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        // 32 hex digits or the hyphenated 8-4-4-4-12 form, nothing else
        if s.len() != 32 && s.len() != 36 {
            return Err(Error::InvalidArgument(format!("malformed id: {:?}", s)));
        }
        uuid::Uuid::parse_str(s)
            .map(|u| Self(*u.as_bytes()))
            .map_err(|_| Error::InvalidArgument(format!("malformed id: {:?}", s)))
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Client-visible object identifier: `<volume-id>:<object-id>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FatId {
    pub volume: VolumeId,
    pub object: ObjectId,
}

impl FatId {
    pub fn new(volume: VolumeId, object: ObjectId) -> Self {
        Self { volume, object }
    }
}

impl fmt::Display for FatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.volume, self.object)
    }
}

impl FromStr for FatId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (volume, object) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidArgument(format!("malformed object id: {:?}", s)))?;
        Ok(Self {
            volume: volume.parse()?,
            object: object.parse()?,
        })
    }
}
