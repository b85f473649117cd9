use crate::artifacts::database::backend::Backend;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{Error, Result};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Object storage held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: RwLock<HashMap<ObjectId, Bytes>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Overwrite stored bytes without any checks, for simulating damaged storage
    #[cfg(test)]
    pub(crate) fn insert_unchecked(&self, oid: ObjectId, framed: Bytes) {
        self.objects.write().insert(oid, framed);
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn has(&self, oid: &ObjectId) -> Result<bool> {
        Ok(self.objects.read().contains_key(oid))
    }

    fn read_raw(&self, oid: &ObjectId) -> Result<Bytes> {
        self.objects
            .read()
            .get(oid)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("object {oid}")))
    }

    fn write_raw(&self, oid: &ObjectId, framed: &Bytes) -> Result<()> {
        self.objects
            .write()
            .entry(*oid)
            .or_insert_with(|| framed.clone());

        Ok(())
    }

    fn object_ids(&self) -> Result<Vec<ObjectId>> {
        Ok(self.objects.read().keys().copied().collect())
    }
}
