//! Content-addressable object database
//!
//! The database owns an ordered chain of storage backends. Reads walk the
//! chain in priority order and the first backend that has the object wins;
//! writes go to the single designated write backend, unless some backend in
//! the chain already holds the id.

use crate::artifacts::database::backend::Backend;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::codec;
use crate::artifacts::objects::commit::{Commit, SlimCommit};
use crate::artifacts::objects::object::Object;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tag::Tag;
use crate::artifacts::objects::tree::Tree;
use crate::artifacts::objects::OBJECT_ID_LENGTH;
use crate::errors::{Error, Result};
use bytes::Bytes;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Shortest abbreviated id accepted by [`ObjectDatabase::find_by_prefix`]
pub const MIN_PREFIX_LENGTH: usize = 4;

#[derive(Debug)]
struct BackendSlot {
    backend: Arc<dyn Backend>,
    priority: i32,
    is_writer: bool,
}

#[derive(Debug)]
pub struct ObjectDatabase {
    slots: Vec<BackendSlot>,
}

impl ObjectDatabase {
    /// Create a database whose chain holds only `writer`, at priority 0
    pub fn new(writer: Arc<dyn Backend>) -> Self {
        ObjectDatabase {
            slots: vec![BackendSlot {
                backend: writer,
                priority: 0,
                is_writer: true,
            }],
        }
    }

    /// Register an additional read backend
    ///
    /// Lower priorities are probed first; equal priorities keep registration
    /// order.
    pub fn add_backend(&mut self, backend: Arc<dyn Backend>, priority: i32) {
        tracing::debug!(backend = backend.name(), priority, "registered object backend");

        let position = self
            .slots
            .iter()
            .position(|slot| slot.priority > priority)
            .unwrap_or(self.slots.len());
        self.slots.insert(
            position,
            BackendSlot {
                backend,
                priority,
                is_writer: false,
            },
        );
    }

    pub fn backend_names(&self) -> Vec<&'static str> {
        self.slots.iter().map(|slot| slot.backend.name()).collect()
    }

    fn writer(&self) -> Result<&Arc<dyn Backend>> {
        let slot = self
            .slots
            .iter()
            .find(|slot| slot.is_writer)
            .ok_or_else(|| Error::invalid("object database has no write backend"))?;

        if !slot.backend.is_writable() {
            return Err(Error::invalid(format!(
                "write backend '{}' is read-only",
                slot.backend.name()
            )));
        }
        Ok(&slot.backend)
    }

    /// Compute the id `body` would have as an object of `object_type`
    pub fn hash(object_type: ObjectType, body: &[u8]) -> ObjectId {
        ObjectId::hash_object(object_type, body)
    }

    pub fn write(&self, object: &Object) -> Result<ObjectId> {
        self.write_raw(object.object_type(), &codec::encode(object))
    }

    /// Store an already encoded body, without validating it
    pub fn write_raw(&self, object_type: ObjectType, body: &[u8]) -> Result<ObjectId> {
        let framed = codec::frame(object_type, body);
        let oid = ObjectId::hash_framed(&framed);

        if self.exists(&oid)? {
            tracing::trace!(%oid, "object already stored");
            return Ok(oid);
        }

        let writer = self.writer()?;
        writer.write_raw(&oid, &framed)?;
        tracing::debug!(%oid, %object_type, size = body.len(), backend = writer.name(), "wrote object");

        Ok(oid)
    }

    pub fn exists(&self, oid: &ObjectId) -> Result<bool> {
        for slot in &self.slots {
            if slot.backend.has(oid)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn read_framed(&self, oid: &ObjectId) -> Result<Bytes> {
        for slot in &self.slots {
            match slot.backend.read_raw(oid) {
                Ok(framed) => {
                    tracing::trace!(%oid, backend = slot.backend.name(), "object hit");
                    return Ok(framed);
                }
                Err(Error::NotFound(_)) => continue,
                Err(error) => return Err(error),
            }
        }

        Err(Error::not_found(format!("object {oid}")))
    }

    pub fn read(&self, oid: &ObjectId) -> Result<Object> {
        let framed = self.read_framed(oid)?;

        let actual = ObjectId::hash_framed(&framed);
        if actual != *oid {
            return Err(Error::corrupt(format!(
                "object {oid}: stored content hashes to {actual}"
            )));
        }

        let (object_type, body) = codec::unframe(&framed).map_err(|e| with_oid(e, oid))?;
        codec::decode(object_type, &body).map_err(|e| with_oid(e, oid))
    }

    pub fn read_header(&self, oid: &ObjectId) -> Result<(ObjectType, usize)> {
        for slot in &self.slots {
            match slot.backend.read_header(oid) {
                Err(Error::NotFound(_)) => continue,
                result => return result.map_err(|e| with_oid(e, oid)),
            }
        }

        Err(Error::not_found(format!("object {oid}")))
    }

    pub fn read_blob(&self, oid: &ObjectId) -> Result<Blob> {
        match self.read(oid)? {
            Object::Blob(blob) => Ok(blob),
            other => Err(mismatch(oid, ObjectType::Blob, &other)),
        }
    }

    pub fn read_tree(&self, oid: &ObjectId) -> Result<Tree> {
        match self.read(oid)? {
            Object::Tree(tree) => Ok(tree),
            other => Err(mismatch(oid, ObjectType::Tree, &other)),
        }
    }

    pub fn read_commit(&self, oid: &ObjectId) -> Result<Commit> {
        match self.read(oid)? {
            Object::Commit(commit) => Ok(commit),
            other => Err(mismatch(oid, ObjectType::Commit, &other)),
        }
    }

    pub fn read_tag(&self, oid: &ObjectId) -> Result<Tag> {
        match self.read(oid)? {
            Object::Tag(tag) => Ok(tag),
            other => Err(mismatch(oid, ObjectType::Tag, &other)),
        }
    }

    /// Parents and committer time of a commit, as used by graph traversals
    pub fn slim_commit(&self, oid: &ObjectId) -> Result<SlimCommit> {
        Ok(self.read_commit(oid)?.to_slim(*oid))
    }

    /// Every object id across all backends, sorted and deduplicated
    pub fn ids(&self) -> Result<Vec<ObjectId>> {
        let mut ids = BTreeSet::new();
        for slot in &self.slots {
            ids.extend(slot.backend.object_ids()?);
        }

        Ok(ids.into_iter().collect())
    }

    /// Resolve an abbreviated hexadecimal id to the single object it names
    pub fn find_by_prefix(&self, prefix: &str) -> Result<ObjectId> {
        if prefix.len() < MIN_PREFIX_LENGTH
            || prefix.len() > OBJECT_ID_LENGTH
            || !prefix.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(Error::invalid(format!("'{prefix}' is not an abbreviated object id")));
        }
        if prefix.len() == OBJECT_ID_LENGTH {
            let oid = ObjectId::try_parse(prefix)?;
            return match self.exists(&oid)? {
                true => Ok(oid),
                false => Err(Error::not_found(format!("object {oid}"))),
            };
        }

        let matches: Vec<_> = self
            .ids()?
            .into_iter()
            .filter(|oid| oid.starts_with_hex(prefix))
            .collect();

        match matches.as_slice() {
            [] => Err(Error::not_found(format!("object with prefix {prefix}"))),
            [oid] => Ok(*oid),
            candidates => Err(Error::invalid(format!(
                "prefix {prefix} is ambiguous: {} candidates",
                candidates.len()
            ))),
        }
    }
}

fn mismatch(oid: &ObjectId, expected: ObjectType, actual: &Object) -> Error {
    Error::TypeMismatch {
        oid: oid.to_string(),
        expected,
        actual: actual.object_type(),
    }
}

fn with_oid(error: Error, oid: &ObjectId) -> Error {
    match error {
        Error::Corrupt(message) => Error::corrupt(format!("object {oid}: {message}")),
        other => other,
    }
}
