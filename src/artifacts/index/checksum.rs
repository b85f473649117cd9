use crate::artifacts::index::CHECKSUM_SIZE;
use crate::errors::{Error, Result};
use bytes::Bytes;
use file_guard::FileGuard;
use sha1::{Digest, Sha1};
use std::io::{Read, Write};
use std::ops::DerefMut;

/// Index file handle that hashes everything read or written through it
#[derive(Debug)]
pub struct Checksum<'f> {
    file: FileGuard<&'f mut std::fs::File>,
    digest: Sha1,
    consumed: u64,
}

impl<'f> Checksum<'f> {
    pub(crate) fn new(file: FileGuard<&'f mut std::fs::File>) -> Self {
        Checksum {
            file,
            digest: Sha1::new(),
            consumed: 0,
        }
    }

    /// Bytes read through the handle so far
    pub(crate) fn consumed(&self) -> u64 {
        self.consumed
    }

    pub(crate) fn read(&mut self, size: usize) -> Result<Bytes> {
        let mut buffer = vec![0; size];
        self.file
            .deref_mut()
            .read_exact(&mut buffer)
            .map_err(|_| Error::corrupt("index: unexpected end of file"))?;

        self.digest.update(&buffer);
        self.consumed += size as u64;
        Ok(Bytes::from(buffer))
    }

    pub(crate) fn write(&mut self, data: &[u8]) -> Result<()> {
        self.file.deref_mut().write_all(data)?;
        self.digest.update(data);
        Ok(())
    }

    pub(crate) fn write_checksum(&mut self) -> Result<()> {
        let checksum = self.digest.clone().finalize();
        self.file.deref_mut().write_all(checksum.as_slice())?;
        self.file.deref_mut().sync_all()?;

        Ok(())
    }

    /// Compare the trailing checksum with the digest of everything read so far
    pub(crate) fn verify(&mut self) -> Result<()> {
        let mut expected_checksum = [0u8; CHECKSUM_SIZE];
        self.file
            .deref_mut()
            .read_exact(&mut expected_checksum)
            .map_err(|_| Error::corrupt("index: missing checksum"))?;

        let actual_checksum = self.digest.clone().finalize();
        if expected_checksum != actual_checksum.as_slice() {
            return Err(Error::corrupt("index: checksum does not match content"));
        }

        let mut trailing = [0u8; 1];
        if self.file.deref_mut().read(&mut trailing)? != 0 {
            return Err(Error::corrupt("index: trailing bytes after checksum"));
        }

        Ok(())
    }
}
