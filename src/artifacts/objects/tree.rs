//! Git tree object
//!
//! Trees represent directory snapshots. They contain entries for files (blobs),
//! subdirectories (other trees), symlinks and submodules, along with their
//! names and modes.
//!
//! ## Format
//!
//! On disk: `tree <size>\0<entries>`
//! Each entry: `<mode> <name>\0<20-byte-sha1>`
//!
//! Entries are sorted by name byte-wise, where the name of a subtree compares
//! as if it ended in `/`. A tree whose entries are out of order is corrupt,
//! since re-encoding it would produce a different id.

use crate::artifacts::objects::entry_mode::EntryMode;
use crate::artifacts::objects::object::{Packable, Typed, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use derive_new::new;
use std::cmp::Ordering;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Hash, new)]
pub struct TreeEntry {
    pub name: String,
    pub mode: EntryMode,
    pub oid: ObjectId,
}

impl TreeEntry {
    pub fn is_tree(&self) -> bool {
        self.mode.is_tree()
    }

    /// Canonical ordering of tree entries
    pub fn canonical_cmp(&self, other: &TreeEntry) -> Ordering {
        compare_names(&self.name, self.is_tree(), &other.name, other.is_tree())
    }
}

fn compare_names(a: &str, a_is_tree: bool, b: &str, b_is_tree: bool) -> Ordering {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let common = a.len().min(b.len());

    match a[..common].cmp(&b[..common]) {
        Ordering::Equal => {
            let terminator = |name: &[u8], is_tree: bool| match name.get(common) {
                Some(&byte) => byte,
                None if is_tree => b'/',
                None => b'\0',
            };
            terminator(a, a_is_tree).cmp(&terminator(b, b_is_tree))
        }
        ordering => ordering,
    }
}

fn validate_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        Err(format!("invalid tree entry name '{name}'"))
    } else {
        Ok(())
    }
}

/// Git tree object representing a directory snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// Build a tree from entries in any order
    ///
    /// Fails with `InvalidArgument` on duplicate or malformed names.
    pub fn new(entries: impl IntoIterator<Item = TreeEntry>) -> Result<Self> {
        let mut entries = entries.into_iter().collect::<Vec<_>>();
        for entry in &entries {
            validate_name(&entry.name).map_err(Error::InvalidArgument)?;
        }

        let mut names = HashSet::new();
        if let Some(duplicate) = entries.iter().find(|entry| !names.insert(entry.name.as_str())) {
            return Err(Error::invalid(format!(
                "duplicate tree entry name '{}'",
                duplicate.name
            )));
        }
        entries.sort_by(TreeEntry::canonical_cmp);

        Ok(Tree { entries })
    }

    /// Insert an entry, replacing any entry with the same name
    pub fn insert(&mut self, entry: TreeEntry) -> Result<()> {
        validate_name(&entry.name).map_err(Error::InvalidArgument)?;
        self.entries.retain(|existing| existing.name != entry.name);

        let position = self
            .entries
            .binary_search_by(|existing| existing.canonical_cmp(&entry))
            .unwrap_or_else(|position| position);
        self.entries.insert(position, entry);

        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<TreeEntry> {
        let position = self.entries.iter().position(|entry| entry.name == name)?;
        Some(self.entries.remove(position))
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn entries(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> impl Iterator<Item = TreeEntry> {
        self.entries.into_iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Packable for Tree {
    fn serialize(&self) -> Bytes {
        let mut content = BytesMut::new();

        for entry in &self.entries {
            content.put_slice(entry.mode.as_str().as_bytes());
            content.put_u8(b' ');
            content.put_slice(entry.name.as_bytes());
            content.put_u8(b'\0');
            content.put_slice(entry.oid.as_bytes());
        }

        content.freeze()
    }
}

impl Unpackable for Tree {
    fn deserialize(body: &[u8]) -> Result<Self> {
        let mut entries: Vec<TreeEntry> = Vec::new();
        let mut names = HashSet::new();
        let mut rest = body;

        while !rest.is_empty() {
            let space = rest
                .iter()
                .position(|&b| b == b' ')
                .ok_or_else(|| Error::corrupt("tree entry: unexpected EOF in mode"))?;
            let mode = std::str::from_utf8(&rest[..space])
                .map_err(|_| Error::corrupt("tree entry: mode is not UTF-8"))?;
            let mode = EntryMode::from_octal_str(mode)?;
            rest = &rest[space + 1..];

            let nul = rest
                .iter()
                .position(|&b| b == b'\0')
                .ok_or_else(|| Error::corrupt("tree entry: unexpected EOF in name"))?;
            let name = std::str::from_utf8(&rest[..nul])
                .map_err(|_| Error::corrupt("tree entry: name is not UTF-8"))?
                .to_owned();
            validate_name(&name).map_err(Error::Corrupt)?;
            rest = &rest[nul + 1..];

            let oid = rest
                .get(..crate::artifacts::objects::OBJECT_ID_RAW_LENGTH)
                .ok_or_else(|| Error::corrupt("tree entry: unexpected EOF in object id"))
                .and_then(|raw| ObjectId::from_slice(raw).map_err(Error::corrupt))?;
            rest = &rest[crate::artifacts::objects::OBJECT_ID_RAW_LENGTH..];

            let entry = TreeEntry::new(name, mode, oid);
            if let Some(previous) = entries.last()
                && previous.canonical_cmp(&entry) != Ordering::Less
            {
                return Err(Error::corrupt(format!(
                    "tree entries out of order: '{}' then '{}'",
                    previous.name, entry.name
                )));
            }
            if !names.insert(entry.name.clone()) {
                return Err(Error::corrupt(format!("duplicate tree entry '{}'", entry.name)));
            }
            entries.push(entry);
        }

        Ok(Tree { entries })
    }
}

impl Typed for Tree {
    const TYPE: ObjectType = ObjectType::Tree;
}
