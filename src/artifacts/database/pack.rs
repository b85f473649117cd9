//! Git pack files (version 2)
//!
//! ## Format
//!
//! ```text
//! "PACK" | version (u32 BE) | object count (u32 BE)
//! entries:
//!   type+size varint header
//!   [OFS_DELTA: negative base offset | REF_DELTA: 20-byte base id]
//!   zlib-compressed payload
//! SHA-1 of everything above
//! ```
//!
//! The backend scans the whole pack when it is opened, resolves deltas and
//! keeps an id-keyed table of the resolved objects. Packs are immutable, so the
//! backend rejects writes. [`PackWriter`] produces packs of whole objects.

use crate::artifacts::database::backend::Backend;
use crate::artifacts::database::delta::apply_delta;
use crate::artifacts::objects::codec;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::OBJECT_ID_RAW_LENGTH;
use crate::errors::{Error, Result};
use byteorder::{ByteOrder, NetworkEndian, WriteBytesExt};
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
pub const PACK_VERSION: u32 = 2;
const PACK_HEADER_SIZE: usize = 12;
/// One type/size byte plus the shortest zlib stream
const MIN_ENTRY_SIZE: usize = 9;
const OFS_DELTA: u8 = 6;
const REF_DELTA: u8 = 7;

#[derive(Debug)]
enum EntryKind {
    Whole(ObjectType),
    OffsetDelta(usize),
    RefDelta(ObjectId),
}

#[derive(Debug)]
struct RawEntry {
    kind: EntryKind,
    data: Vec<u8>,
}

#[derive(Debug)]
pub struct PackBackend {
    path: Box<Path>,
    checksum: ObjectId,
    objects: HashMap<ObjectId, (ObjectType, Bytes)>,
}

impl PackBackend {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read(&path)?;
        let (checksum, objects) = Self::parse(&content)
            .map_err(|error| Error::corrupt(format!("pack {}: {error}", path.display())))?;

        tracing::debug!(pack = %path.display(), objects = objects.len(), "opened pack");

        Ok(PackBackend {
            path: path.into_boxed_path(),
            checksum,
            objects,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Trailing SHA-1 of the pack, also used in its file name
    pub fn checksum(&self) -> &ObjectId {
        &self.checksum
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn parse(content: &[u8]) -> std::result::Result<(ObjectId, HashMap<ObjectId, (ObjectType, Bytes)>), String> {
        if content.len() < PACK_HEADER_SIZE + OBJECT_ID_RAW_LENGTH {
            return Err("file too short".into());
        }
        if &content[..4] != PACK_SIGNATURE {
            return Err("missing PACK signature".into());
        }
        let version = NetworkEndian::read_u32(&content[4..8]);
        if version != 2 && version != 3 {
            return Err(format!("unsupported version {version}"));
        }
        let count = NetworkEndian::read_u32(&content[8..12]) as usize;

        let (body, trailer) = content.split_at(content.len() - OBJECT_ID_RAW_LENGTH);
        if Sha1::digest(body).as_slice() != trailer {
            return Err("checksum does not match".into());
        }
        let checksum = ObjectId::from_slice(trailer).map_err(|e| e.to_string())?;

        if count > (body.len() - PACK_HEADER_SIZE) / MIN_ENTRY_SIZE {
            return Err(format!("{count} entries cannot fit in {} bytes", body.len()));
        }

        let mut entries = Vec::with_capacity(count);
        let mut offsets = HashMap::with_capacity(count);
        let mut position = PACK_HEADER_SIZE;
        for _ in 0..count {
            offsets.insert(position, entries.len());
            let (entry, next) = Self::read_entry(body, position)?;
            entries.push(entry);
            position = next;
        }
        if position != body.len() {
            return Err("trailing bytes after last entry".into());
        }

        let objects = Self::resolve(entries, &offsets)?;
        Ok((checksum, objects))
    }

    fn read_entry(body: &[u8], offset: usize) -> std::result::Result<(RawEntry, usize), String> {
        let truncated = || format!("entry at {offset} is truncated");
        let mut position = offset;

        let mut byte = *body.get(position).ok_or_else(truncated)?;
        position += 1;
        let type_code = (byte >> 4) & 0x07;
        let mut size = (byte & 0x0f) as usize;
        let mut shift = 4;
        while byte & 0x80 != 0 {
            if shift > 57 {
                return Err(format!("entry at {offset} has an oversized length"));
            }
            byte = *body.get(position).ok_or_else(truncated)?;
            position += 1;
            size |= ((byte & 0x7f) as usize) << shift;
            shift += 7;
        }

        let kind = match type_code {
            OFS_DELTA => {
                let mut byte = *body.get(position).ok_or_else(truncated)?;
                position += 1;
                let mut distance = (byte & 0x7f) as usize;
                while byte & 0x80 != 0 {
                    byte = *body.get(position).ok_or_else(truncated)?;
                    position += 1;
                    distance = distance
                        .checked_add(1)
                        .filter(|next| next.leading_zeros() >= 7)
                        .map(|next| (next << 7) | (byte & 0x7f) as usize)
                        .ok_or_else(|| format!("entry at {offset} has an oversized base distance"))?;
                }
                let base = offset
                    .checked_sub(distance)
                    .filter(|_| distance > 0)
                    .ok_or_else(|| format!("entry at {offset} has invalid base distance"))?;
                EntryKind::OffsetDelta(base)
            }
            REF_DELTA => {
                let raw = body
                    .get(position..position + OBJECT_ID_RAW_LENGTH)
                    .ok_or_else(truncated)?;
                position += OBJECT_ID_RAW_LENGTH;
                EntryKind::RefDelta(ObjectId::from_slice(raw).map_err(|e| e.to_string())?)
            }
            code => EntryKind::Whole(
                ObjectType::from_pack_code(code)
                    .ok_or_else(|| format!("entry at {offset} has unknown type {code}"))?,
            ),
        };

        let remaining = &body[position..];
        let mut decoder = flate2::bufread::ZlibDecoder::new(remaining);
        let mut data = Vec::with_capacity(size.min(remaining.len()));
        // inflate at most one byte past the declared size
        (&mut decoder)
            .take(size as u64 + 1)
            .read_to_end(&mut data)
            .map_err(|_| format!("entry at {offset} fails to inflate"))?;
        if data.len() != size {
            return Err(format!(
                "entry at {offset} inflates to {} bytes, header says {size}",
                data.len()
            ));
        }
        position += decoder.total_in() as usize;

        Ok((RawEntry { kind, data }, position))
    }

    /// Resolve delta chains until every entry is a whole object
    fn resolve(
        entries: Vec<RawEntry>,
        offsets: &HashMap<usize, usize>,
    ) -> std::result::Result<HashMap<ObjectId, (ObjectType, Bytes)>, String> {
        let mut resolved: Vec<Option<(ObjectType, Bytes)>> = vec![None; entries.len()];
        let mut by_id: HashMap<ObjectId, usize> = HashMap::new();

        // deltas may point forward, so repeat passes until nothing changes
        let mut pending = entries.len();
        while pending > 0 {
            let before = pending;
            for (index, entry) in entries.iter().enumerate() {
                if resolved[index].is_some() {
                    continue;
                }

                let base_index = match &entry.kind {
                    EntryKind::Whole(_) => None,
                    EntryKind::OffsetDelta(base_offset) => Some(
                        *offsets
                            .get(base_offset)
                            .ok_or_else(|| format!("no entry at base offset {base_offset}"))?,
                    ),
                    EntryKind::RefDelta(base_oid) => match by_id.get(base_oid) {
                        Some(base_index) => Some(*base_index),
                        None => continue,
                    },
                };

                let object = match (&entry.kind, base_index) {
                    (EntryKind::Whole(object_type), _) => {
                        (*object_type, Bytes::from(entry.data.clone()))
                    }
                    (_, Some(base_index)) => match &resolved[base_index] {
                        Some((base_type, base)) => {
                            let data = apply_delta(base, &entry.data).map_err(|e| e.to_string())?;
                            (*base_type, Bytes::from(data))
                        }
                        None => continue,
                    },
                    _ => continue,
                };

                by_id.insert(ObjectId::hash_object(object.0, &object.1), index);
                resolved[index] = Some(object);
                pending -= 1;
            }

            if pending == before {
                return Err(format!("{pending} delta entries have no resolvable base"));
            }
        }

        Ok(by_id
            .into_iter()
            .filter_map(|(oid, index)| resolved[index].take().map(|object| (oid, object)))
            .collect())
    }
}

impl Backend for PackBackend {
    fn name(&self) -> &'static str {
        "pack"
    }

    fn has(&self, oid: &ObjectId) -> Result<bool> {
        Ok(self.objects.contains_key(oid))
    }

    fn read_raw(&self, oid: &ObjectId) -> Result<Bytes> {
        self.objects
            .get(oid)
            .map(|(object_type, body)| codec::frame(*object_type, body))
            .ok_or_else(|| Error::not_found(format!("object {oid}")))
    }

    fn write_raw(&self, oid: &ObjectId, _framed: &Bytes) -> Result<()> {
        Err(Error::invalid(format!(
            "cannot write {oid}: pack {} is read-only",
            self.path.display()
        )))
    }

    fn object_ids(&self) -> Result<Vec<ObjectId>> {
        Ok(self.objects.keys().copied().collect())
    }

    fn is_writable(&self) -> bool {
        false
    }

    fn read_header(&self, oid: &ObjectId) -> Result<(ObjectType, usize)> {
        self.objects
            .get(oid)
            .map(|(object_type, body)| (*object_type, body.len()))
            .ok_or_else(|| Error::not_found(format!("object {oid}")))
    }
}

/// Builds a pack of whole (non-delta) objects
#[derive(Debug, Default)]
pub struct PackWriter {
    objects: Vec<(ObjectType, Bytes)>,
}

impl PackWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, object_type: ObjectType, body: Bytes) -> &mut Self {
        self.objects.push((object_type, body));
        self
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Encode the pack, returning its bytes and trailing checksum
    pub fn encode(&self) -> Result<(Vec<u8>, ObjectId)> {
        let mut pack = Vec::new();
        pack.write_all(PACK_SIGNATURE)?;
        pack.write_u32::<NetworkEndian>(PACK_VERSION)?;
        pack.write_u32::<NetworkEndian>(self.objects.len() as u32)?;

        for (object_type, body) in &self.objects {
            let mut size = body.len();
            let mut byte = (object_type.pack_code() << 4) | (size & 0x0f) as u8;
            size >>= 4;
            while size > 0 {
                pack.push(byte | 0x80);
                byte = (size & 0x7f) as u8;
                size >>= 7;
            }
            pack.push(byte);

            let mut encoder =
                flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(body)?;
            pack.extend_from_slice(&encoder.finish()?);
        }

        let checksum = ObjectId::from_raw(Sha1::digest(&pack).into());
        checksum.write_raw_to(&mut pack)?;

        Ok((pack, checksum))
    }

    /// Write `pack-<checksum>.pack` into `dir`
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let (pack, checksum) = self.encode()?;
        std::fs::create_dir_all(dir)?;

        let path = dir.join(format!("pack-{checksum}.pack"));
        let temp_path = dir.join(format!("tmp-pack-{checksum}"));
        std::fs::write(&temp_path, &pack)?;
        std::fs::rename(&temp_path, &path)?;

        tracing::debug!(pack = %path.display(), objects = self.objects.len(), "wrote pack");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::TempDir;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn pack_dir() -> TempDir {
        TempDir::new().expect("Failed to create temp dir")
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn finish(mut pack: Vec<u8>) -> Vec<u8> {
        let checksum = Sha1::digest(&pack);
        pack.extend_from_slice(&checksum);
        pack
    }

    #[rstest]
    fn reads_back_whole_objects(pack_dir: TempDir) {
        let large = Bytes::from(vec![b'x'; 300]);
        let mut writer = PackWriter::new();
        writer
            .add(ObjectType::Blob, Bytes::from_static(b"hello"))
            .add(ObjectType::Blob, large.clone());

        let path = writer.write_to(pack_dir.path()).unwrap();
        let backend = PackBackend::open(&path).unwrap();

        let hello = ObjectId::hash_object(ObjectType::Blob, b"hello");
        let large_oid = ObjectId::hash_object(ObjectType::Blob, &large);
        assert_eq!(backend.len(), 2);
        assert_eq!(&backend.read_raw(&hello).unwrap()[..], b"blob 5\0hello");
        assert_eq!(backend.read_header(&large_oid).unwrap(), (ObjectType::Blob, 300));
        assert!(path.ends_with(format!("pack-{}.pack", backend.checksum())));
    }

    #[rstest]
    fn resolves_offset_and_ref_deltas(pack_dir: TempDir) {
        let base = b"hello world";
        let mut delta = vec![11, 13, 0x80 | 0x10, 6, 6];
        delta.extend_from_slice(b"there!");
        delta.extend_from_slice(&[0x80 | 0x01 | 0x10, 10, 1]);
        let base_oid = ObjectId::hash_object(ObjectType::Blob, base);

        let mut pack = b"PACK".to_vec();
        pack.write_u32::<NetworkEndian>(2).unwrap();
        pack.write_u32::<NetworkEndian>(3).unwrap();

        // whole blob at offset 12, size 11
        pack.push((3 << 4) | 11);
        pack.extend(zlib(base));

        // ofs-delta pointing back to offset 12
        let ofs_offset = pack.len();
        pack.push((OFS_DELTA << 4) | (delta.len() & 0x0f) as u8);
        pack.push((ofs_offset - 12) as u8);
        pack.extend(zlib(&delta));

        // ref-delta naming the base by id, producing the same result
        pack.push((REF_DELTA << 4) | (delta.len() & 0x0f) as u8);
        pack.extend_from_slice(base_oid.as_bytes());
        pack.extend(zlib(&delta));

        let path = pack_dir.path().join("pack-test.pack");
        std::fs::write(&path, finish(pack)).unwrap();
        let backend = PackBackend::open(&path).unwrap();

        let target = ObjectId::hash_object(ObjectType::Blob, b"hello there!d");
        assert_eq!(backend.len(), 2);
        assert_eq!(&backend.read_raw(&target).unwrap()[..], b"blob 13\0hello there!d");
        assert!(backend.has(&base_oid).unwrap());
    }

    #[rstest]
    fn damaged_checksum_is_corrupt(pack_dir: TempDir) {
        let mut writer = PackWriter::new();
        writer.add(ObjectType::Blob, Bytes::from_static(b"hello"));
        let (mut pack, _) = writer.encode().unwrap();
        let last = pack.len() - 1;
        pack[last] ^= 0xff;

        let path = pack_dir.path().join("pack-bad.pack");
        std::fs::write(&path, pack).unwrap();

        assert!(matches!(PackBackend::open(&path), Err(Error::Corrupt(_))));
    }

    #[rstest]
    fn writes_are_rejected(pack_dir: TempDir) {
        let path = PackWriter::new().write_to(pack_dir.path()).unwrap();
        let backend = PackBackend::open(&path).unwrap();
        let framed = codec::frame(ObjectType::Blob, b"new");

        assert!(!backend.is_writable());
        assert!(matches!(
            backend.write_raw(&ObjectId::hash_framed(&framed), &framed),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[rstest]
    fn entry_count_larger_than_the_file_is_corrupt(pack_dir: TempDir) {
        let mut pack = b"PACK".to_vec();
        pack.write_u32::<NetworkEndian>(2).unwrap();
        pack.write_u32::<NetworkEndian>(u32::MAX).unwrap();
        pack.push((3 << 4) | 5);
        pack.extend(zlib(b"hello"));

        let path = pack_dir.path().join("pack-huge.pack");
        std::fs::write(&path, finish(pack)).unwrap();

        assert!(matches!(PackBackend::open(&path), Err(Error::Corrupt(_))));
    }

    #[rstest]
    #[case::inflates_past_declared_size(vec![(3 << 4) | 2])]
    #[case::declares_an_enormous_size(vec![0x80 | (3 << 4), 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f])]
    #[case::length_varint_never_ends(vec![0x80 | (3 << 4), 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01])]
    fn lying_entry_headers_are_corrupt(pack_dir: TempDir, #[case] header: Vec<u8>) {
        let mut pack = b"PACK".to_vec();
        pack.write_u32::<NetworkEndian>(2).unwrap();
        pack.write_u32::<NetworkEndian>(1).unwrap();
        pack.extend(header);
        pack.extend(zlib(b"hello"));

        let path = pack_dir.path().join("pack-lying.pack");
        std::fs::write(&path, finish(pack)).unwrap();

        assert!(matches!(PackBackend::open(&path), Err(Error::Corrupt(_))));
    }
}
