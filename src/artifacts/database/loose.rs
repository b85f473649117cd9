//! Loose object storage
//!
//! Each object lives in its own zlib-compressed file at
//! `objects/<first-2-hex>/<remaining-38-hex>`. Writes go to a temporary file
//! in the same directory and are renamed into place, so readers never see a
//! partially written object and racing writers of the same id both leave
//! identical bytes behind.

use crate::artifacts::database::backend::Backend;
use crate::artifacts::objects::codec;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::{Error, Result};
use bytes::Bytes;
use fake::rand;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct LooseBackend {
    path: Box<Path>,
    compression: flate2::Compression,
}

impl LooseBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LooseBackend {
            path: path.into().into_boxed_path(),
            compression: flate2::Compression::default(),
        }
    }

    pub fn with_compression(mut self, level: u32) -> Self {
        self.compression = flate2::Compression::new(level.min(9));
        self
    }

    pub fn objects_path(&self) -> &Path {
        &self.path
    }

    fn object_path(&self, oid: &ObjectId) -> PathBuf {
        self.path.join(oid.to_path())
    }

    fn read_object(&self, object_path: &Path, oid: &ObjectId) -> Result<Bytes> {
        let compressed = match std::fs::read(object_path) {
            Ok(content) => content,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Err(Error::not_found(format!("object {oid}")));
            }
            Err(error) => return Err(error.into()),
        };

        Self::decompress(&compressed)
            .map_err(|_| Error::corrupt(format!("object {oid}: unable to inflate loose object")))
    }

    fn write_object(&self, object_path: &Path, framed: &Bytes) -> Result<()> {
        let object_dir = object_path
            .parent()
            .ok_or_else(|| Error::invalid(format!("object path {}", object_path.display())))?;
        std::fs::create_dir_all(object_dir)?;

        let temp_object_path = object_dir.join(Self::generate_temp_name());
        let compressed = self.compress(framed)?;

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_object_path)?;
        file.write_all(&compressed)?;
        file.sync_all()?;
        drop(file);

        // rename the temp file to the object file to make it atomic
        if let Err(error) = std::fs::rename(&temp_object_path, object_path) {
            let _ = std::fs::remove_file(&temp_object_path);
            return Err(error.into());
        }

        Ok(())
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), self.compression);
        encoder.write_all(data)?;

        Ok(encoder.finish()?)
    }

    fn decompress(data: &[u8]) -> std::io::Result<Bytes> {
        let mut decoder = flate2::read::ZlibDecoder::new(data);
        let mut decompressed_content = Vec::new();
        decoder.read_to_end(&mut decompressed_content)?;

        Ok(decompressed_content.into())
    }

    fn generate_temp_name() -> String {
        format!("tmp-obj-{}", rand::random::<u32>())
    }

    fn is_hex(name: &str, len: usize) -> bool {
        name.len() == len && name.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl Backend for LooseBackend {
    fn name(&self) -> &'static str {
        "loose"
    }

    fn has(&self, oid: &ObjectId) -> Result<bool> {
        Ok(self.object_path(oid).is_file())
    }

    fn read_raw(&self, oid: &ObjectId) -> Result<Bytes> {
        self.read_object(&self.object_path(oid), oid)
    }

    fn write_raw(&self, oid: &ObjectId, framed: &Bytes) -> Result<()> {
        let object_path = self.object_path(oid);

        // write the object to disk unless it already exists
        if object_path.exists() {
            return Ok(());
        }

        self.write_object(&object_path, framed)
    }

    fn object_ids(&self) -> Result<Vec<ObjectId>> {
        let mut ids = Vec::new();
        if !self.path.is_dir() {
            return Ok(ids);
        }

        for dir in std::fs::read_dir(&self.path)? {
            let dir = dir?;
            let dir_name = dir.file_name().to_string_lossy().to_string();
            if !Self::is_hex(&dir_name, 2) || !dir.path().is_dir() {
                continue;
            }

            for file in std::fs::read_dir(dir.path())? {
                let file_name = file?.file_name().to_string_lossy().to_string();
                // skip temporary files left behind by interrupted writes
                if Self::is_hex(&file_name, 38) {
                    ids.push(ObjectId::try_parse(format!("{dir_name}{file_name}"))?);
                }
            }
        }

        Ok(ids)
    }

    /// Inflate only as much of the object as the header needs
    fn read_header(&self, oid: &ObjectId) -> Result<(ObjectType, usize)> {
        let file = match std::fs::File::open(self.object_path(oid)) {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Err(Error::not_found(format!("object {oid}")));
            }
            Err(error) => return Err(error.into()),
        };

        let mut decoder = flate2::read::ZlibDecoder::new(file);
        let mut header = Vec::new();
        let mut byte = [0u8; 1];
        while header.last() != Some(&b'\0') {
            if header.len() > 32 || decoder.read(&mut byte)? == 0 {
                return Err(Error::corrupt(format!("object {oid}: truncated header")));
            }
            header.push(byte[0]);
        }

        let (object_type, size, _) = codec::parse_header(&header)?;
        Ok((object_type, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::codec::frame;
    use assert_fs::TempDir;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn objects_dir() -> TempDir {
        TempDir::new().expect("Failed to create temp dir")
    }

    #[rstest]
    fn stores_compressed_objects_under_fanout_dirs(objects_dir: TempDir) {
        let backend = LooseBackend::new(objects_dir.path());
        let framed = frame(ObjectType::Blob, b"hello");
        let oid = ObjectId::hash_framed(&framed);

        backend.write_raw(&oid, &framed).unwrap();

        let on_disk = objects_dir.path().join("b6").join("fc4c620b67d95f953a5c1c1230aaab5db5a1b0");
        assert!(on_disk.is_file());
        assert_ne!(std::fs::read(&on_disk).unwrap(), framed.to_vec());
        assert_eq!(backend.read_raw(&oid).unwrap(), framed);
        assert_eq!(backend.read_header(&oid).unwrap(), (ObjectType::Blob, 5));
    }

    #[rstest]
    fn missing_objects_are_not_found(objects_dir: TempDir) {
        let backend = LooseBackend::new(objects_dir.path());
        let oid = ObjectId::hash_object(ObjectType::Blob, b"absent");

        assert!(!backend.has(&oid).unwrap());
        assert!(matches!(backend.read_raw(&oid), Err(Error::NotFound(_))));
        assert!(matches!(backend.read_header(&oid), Err(Error::NotFound(_))));
    }

    #[rstest]
    fn garbage_files_are_corrupt(objects_dir: TempDir) {
        let backend = LooseBackend::new(objects_dir.path());
        let oid = ObjectId::hash_object(ObjectType::Blob, b"garbage");
        let path = objects_dir.path().join(oid.to_path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"not zlib at all").unwrap();

        assert!(matches!(backend.read_raw(&oid), Err(Error::Corrupt(_))));
    }

    #[rstest]
    fn object_ids_ignore_temporary_files(objects_dir: TempDir) {
        let backend = LooseBackend::new(objects_dir.path());
        let framed = frame(ObjectType::Blob, b"listed");
        let oid = ObjectId::hash_framed(&framed);
        backend.write_raw(&oid, &framed).unwrap();
        std::fs::write(
            objects_dir.path().join(&oid.to_string()[..2]).join("tmp-obj-1"),
            b"partial",
        )
        .unwrap();

        assert_eq!(backend.object_ids().unwrap(), vec![oid]);
    }
}
