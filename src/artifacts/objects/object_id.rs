//! Git object identifier (SHA-1 hash)
//!
//! Object IDs are 20-byte SHA-1 digests, rendered as 40-character lowercase
//! hexadecimal strings at every external boundary (reference files, config
//! values, error messages).
//!
//! ## Storage
//!
//! Loose objects are stored in `.git/objects/<first-2-chars>/<remaining-38-chars>`

use crate::artifacts::objects::{OBJECT_ID_LENGTH, OBJECT_ID_RAW_LENGTH};
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::{Error, Result};
use sha1::{Digest, Sha1};
use std::io;
use std::path::PathBuf;
use std::str::FromStr;

/// Git object identifier (SHA-1 hash)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ObjectId([u8; OBJECT_ID_RAW_LENGTH]);

impl ObjectId {
    /// Parse and validate an object ID from its 40-character hex form
    pub fn try_parse(id: impl AsRef<str>) -> Result<Self> {
        let id = id.as_ref();
        if id.len() != OBJECT_ID_LENGTH {
            return Err(Error::invalid(format!(
                "object id '{id}' has length {}, expected {OBJECT_ID_LENGTH}",
                id.len()
            )));
        }

        let mut raw = [0u8; OBJECT_ID_RAW_LENGTH];
        hex::decode_to_slice(id, &mut raw)
            .map_err(|_| Error::invalid(format!("object id '{id}' is not hexadecimal")))?;

        Ok(Self(raw))
    }

    pub fn from_raw(raw: [u8; OBJECT_ID_RAW_LENGTH]) -> Self {
        Self(raw)
    }

    pub fn from_slice(raw: &[u8]) -> Result<Self> {
        let raw: [u8; OBJECT_ID_RAW_LENGTH] = raw.try_into().map_err(|_| {
            Error::invalid(format!(
                "raw object id has {} bytes, expected {OBJECT_ID_RAW_LENGTH}",
                raw.len()
            ))
        })?;

        Ok(Self(raw))
    }

    /// Digest of the framed object `"<type> <len>\0<body>"`
    pub fn hash_object(object_type: ObjectType, body: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(format!("{} {}\0", object_type.as_str(), body.len()).as_bytes());
        hasher.update(body);

        Self(hasher.finalize().into())
    }

    /// Digest of bytes that already carry the object header
    pub fn hash_framed(framed: &[u8]) -> Self {
        Self(Sha1::digest(framed).into())
    }

    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_RAW_LENGTH] {
        &self.0
    }

    /// Write the object ID in binary format (20 bytes)
    ///
    /// Used when serializing tree entries and index entries.
    pub fn write_raw_to<W: io::Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.0)
    }

    /// Read an object ID from binary format (20 bytes)
    pub fn read_raw_from<R: io::Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let mut raw = [0u8; OBJECT_ID_RAW_LENGTH];
        reader.read_exact(&mut raw)?;

        Ok(Self(raw))
    }

    /// Convert to file system path for loose object storage
    ///
    /// Splits the hash as `XX/YYYYYY...` where XX is the first 2 chars.
    pub fn to_path(&self) -> PathBuf {
        let hex = self.to_string();
        let (dir, file) = hex.split_at(2);
        PathBuf::from(dir).join(file)
    }

    /// First 7 characters of the hash (standard Git abbreviation)
    pub fn to_short_oid(&self) -> String {
        let mut hex = self.to_string();
        hex.truncate(7);
        hex
    }

    pub fn starts_with_hex(&self, prefix: &str) -> bool {
        self.to_string().starts_with(&prefix.to_ascii_lowercase())
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::try_parse(s)
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectId({self})")
    }
}
