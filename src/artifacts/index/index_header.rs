use crate::artifacts::index::{HEADER_SIZE, SIGNATURE, VERSION};
use crate::artifacts::objects::object::{Packable, Unpackable};
use crate::errors::{Error, Result};
use byteorder::{ByteOrder, NetworkEndian, WriteBytesExt};
use bytes::Bytes;
use derive_new::new;

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct IndexHeader {
    pub(crate) marker: String,
    pub(crate) version: u32,
    pub(crate) entries_count: u32,
}

impl IndexHeader {
    pub(crate) fn empty() -> Self {
        IndexHeader {
            marker: String::from(SIGNATURE),
            version: VERSION,
            entries_count: 0,
        }
    }
}

impl Packable for IndexHeader {
    fn serialize(&self) -> Bytes {
        // "a4N2": marker, version, entry count
        let mut bytes = Vec::with_capacity(HEADER_SIZE);
        bytes.extend_from_slice(self.marker.as_bytes());
        bytes.write_u32::<NetworkEndian>(self.version).ok();
        bytes.write_u32::<NetworkEndian>(self.entries_count).ok();

        Bytes::from(bytes)
    }
}

impl Unpackable for IndexHeader {
    fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::corrupt("index: header too short"));
        }

        let marker = String::from_utf8(bytes[0..4].to_vec())
            .map_err(|_| Error::corrupt("index: invalid signature"))?;
        if marker != SIGNATURE {
            return Err(Error::corrupt(format!("index: signature '{marker}'")));
        }

        let version = NetworkEndian::read_u32(&bytes[4..8]);
        if version != VERSION {
            return Err(Error::corrupt(format!("index: unsupported version {version}")));
        }

        let entries_count = NetworkEndian::read_u32(&bytes[8..12]);

        Ok(IndexHeader {
            marker,
            version,
            entries_count,
        })
    }
}
