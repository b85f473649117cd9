//! Git index (staging area)
//!
//! The index records the paths staged for the next commit. Entries are keyed
//! by `(path, stage)`: stage 0 is a resolved path, stages 1 to 3 hold the
//! base, ours and theirs sides of an unresolved merge.
//!
//! ## Index File Format
//!
//! The index file contains:
//! - Header: Signature, version, and entry count
//! - Entries: sorted by path bytes, then stage
//! - Extensions: optional ones are skipped on load
//! - Checksum: SHA-1 hash of the entire index for integrity verification

use crate::areas::database::ObjectDatabase;
use crate::artifacts::index::checksum::Checksum;
use crate::artifacts::index::index_entry::{ENTRY_BLOCK, ENTRY_MIN_SIZE, IndexEntry};
use crate::artifacts::index::index_header::IndexHeader;
use crate::artifacts::index::{CHECKSUM_SIZE, EXTENSION_HEADER_SIZE, HEADER_SIZE, MAX_STAGE};
use crate::artifacts::objects::entry_mode::EntryMode;
use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::{Tree, TreeEntry};
use crate::errors::{Error, Result};
use byteorder::{ByteOrder, NetworkEndian};
use std::collections::BTreeMap;
use std::ops::DerefMut;
use std::path::{Path, PathBuf};

type EntryKey = (String, u8);

/// Git index (staging area)
#[derive(Debug, Clone)]
pub struct Index {
    /// Path to the index file (typically `.git/index`)
    path: PathBuf,
    entries: BTreeMap<EntryKey, IndexEntry>,
    /// Set when the entries differ from what was last loaded or saved
    changed: bool,
}

impl Index {
    /// An empty index backed by `path`; nothing is read until [`Index::load`]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Index {
            path: path.into(),
            entries: BTreeMap::new(),
            changed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn get(&self, path: &str, stage: u8) -> Option<&IndexEntry> {
        self.entries.get(&(path.to_string(), stage))
    }

    /// All entries, ordered by path bytes then stage
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    /// Entries at a nonzero merge stage
    pub fn conflicts(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values().filter(|entry| entry.stage() != 0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.changed = true;
        }
        self.entries.clear();
    }

    /// Insert or replace the entry at its `(path, stage)`
    ///
    /// A resolved (stage 0) entry replaces the path's conflict stages and
    /// evicts entries it collides with: a file at one of its parent
    /// directories, or anything below its own path. A conflict-stage entry
    /// replaces the path's stage 0 entry.
    pub fn add(&mut self, entry: IndexEntry) {
        if entry.stage() == 0 {
            self.discard_conflicts(&entry);
            for stage in 1..=MAX_STAGE {
                self.entries.remove(&(entry.path().to_string(), stage));
            }
        } else {
            self.entries.remove(&(entry.path().to_string(), 0));
        }

        self.entries
            .insert((entry.path().to_string(), entry.stage()), entry);
        self.changed = true;
    }

    /// Remove every stage of `path`, reporting whether anything was removed
    pub fn remove(&mut self, path: &str) -> bool {
        let removed = self.remove_all_stages(path);
        if removed {
            self.changed = true;
        }
        removed
    }

    fn remove_all_stages(&mut self, path: &str) -> bool {
        (0..=MAX_STAGE).fold(false, |removed, stage| {
            self.entries.remove(&(path.to_string(), stage)).is_some() || removed
        })
    }

    fn discard_conflicts(&mut self, entry: &IndexEntry) {
        for parent in entry.parent_dirs() {
            self.remove_all_stages(parent);
        }

        let prefix = format!("{}/", entry.path());
        let children = self
            .entries
            .range((prefix.clone(), 0)..)
            .map(|(key, _)| key)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .cloned()
            .collect::<Vec<_>>();
        for child in children {
            self.entries.remove(&child);
        }
    }

    /// Write the stage-0 entries as nested trees and return the root tree id
    pub fn write_tree(&self, database: &ObjectDatabase) -> Result<ObjectId> {
        if let Some(conflict) = self.conflicts().next() {
            return Err(Error::Conflict(format!(
                "index has unresolved merge stages at '{}'",
                conflict.path()
            )));
        }

        let mut root = TreeNode::default();
        for entry in self.entries.values() {
            root.insert(entry);
        }

        let oid = root.write(database)?;
        tracing::debug!(%oid, entries = self.entries.len(), "wrote tree from index");

        Ok(oid)
    }

    /// Replace the index contents with the blobs reachable from `tree_id`
    pub fn read_tree(&mut self, database: &ObjectDatabase, tree_id: &ObjectId) -> Result<()> {
        let mut entries = BTreeMap::new();
        collect_tree(database, tree_id, "", &mut entries)?;

        self.entries = entries;
        self.changed = true;

        Ok(())
    }

    /// Load the index from disk
    ///
    /// A missing or empty file yields an empty index. Acquires a shared lock
    /// on the index file during reading.
    pub fn load(&mut self) -> Result<()> {
        self.entries.clear();
        self.changed = false;

        let mut index_file = match std::fs::OpenOptions::new().read(true).open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let mut lock = file_guard::lock(&mut index_file, file_guard::Lock::Shared, 0, 1)?;

        let file_size = lock.deref_mut().metadata()?.len();
        if file_size == 0 {
            return Ok(());
        }

        let mut reader = Checksum::new(lock);
        let header = IndexHeader::deserialize(&reader.read(HEADER_SIZE)?)?;
        let entries = parse_entries(header.entries_count, &mut reader)?;
        skip_extensions(&mut reader, file_size)?;
        reader.verify()?;

        tracing::debug!(path = %self.path.display(), entries = entries.len(), "loaded index");
        self.entries = entries;

        Ok(())
    }

    /// Write the index to `index.lock` and rename it over the index file
    ///
    /// Extensions read from disk are not written back.
    pub fn save(&mut self) -> Result<()> {
        let lock_path = self.lock_path();
        let mut lock_file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::Conflict(format!(
                    "index is locked by {}",
                    lock_path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let written = self.write_entries(&mut lock_file);
        drop(lock_file);
        if let Err(e) = written {
            let _ = std::fs::remove_file(&lock_path);
            return Err(e);
        }
        std::fs::rename(&lock_path, &self.path)?;
        self.changed = false;

        tracing::debug!(path = %self.path.display(), entries = self.entries.len(), "saved index");

        Ok(())
    }

    fn lock_path(&self) -> PathBuf {
        let mut lock_path = self.path.as_os_str().to_owned();
        lock_path.push(".lock");
        PathBuf::from(lock_path)
    }

    fn write_entries(&self, file: &mut std::fs::File) -> Result<()> {
        let lock = file_guard::lock(file, file_guard::Lock::Exclusive, 0, 1)?;
        let mut writer = Checksum::new(lock);

        let header = IndexHeader {
            entries_count: self.entries.len() as u32,
            ..IndexHeader::empty()
        };
        writer.write(&header.serialize())?;

        for entry in self.entries.values() {
            writer.write(&entry.serialize())?;
        }

        writer.write_checksum()
    }
}

fn parse_entries(
    entries_count: u32,
    reader: &mut Checksum,
) -> Result<BTreeMap<EntryKey, IndexEntry>> {
    let mut entries = BTreeMap::new();
    let mut last_key: Option<EntryKey> = None;

    for _ in 0..entries_count {
        let mut entry_bytes = reader.read(ENTRY_MIN_SIZE)?.to_vec();

        while entry_bytes[entry_bytes.len() - 1] != 0 {
            entry_bytes.extend_from_slice(&reader.read(ENTRY_BLOCK)?);
        }

        let entry = IndexEntry::deserialize(&entry_bytes)?;
        let key = (entry.path().to_string(), entry.stage());

        if last_key.as_ref().is_some_and(|last| *last >= key) {
            return Err(Error::corrupt(format!(
                "index: entry '{}' is out of order",
                entry.path()
            )));
        }

        last_key = Some(key.clone());
        entries.insert(key, entry);
    }

    Ok(entries)
}

/// Skip the extensions between the last entry and the checksum
///
/// Each extension is a 4-byte signature and a big-endian length. Optional
/// ones (signature starting with `A`-`Z`, such as the cached tree `TREE`) are
/// ignored; any other signature is a required extension this index does not
/// understand.
fn skip_extensions(reader: &mut Checksum, file_size: u64) -> Result<()> {
    loop {
        let remaining = file_size
            .checked_sub(reader.consumed() + CHECKSUM_SIZE as u64)
            .ok_or_else(|| Error::corrupt("index: missing checksum"))?;
        if remaining == 0 {
            return Ok(());
        }
        if remaining < EXTENSION_HEADER_SIZE as u64 {
            return Err(Error::corrupt("index: truncated extension header"));
        }

        let header = reader.read(EXTENSION_HEADER_SIZE)?;
        let signature = String::from_utf8_lossy(&header[..4]).into_owned();
        let size = u64::from(NetworkEndian::read_u32(&header[4..]));

        if !header[0].is_ascii_uppercase() {
            return Err(Error::corrupt(format!(
                "index: unsupported required extension '{signature}'"
            )));
        }
        if size > remaining - EXTENSION_HEADER_SIZE as u64 {
            return Err(Error::corrupt(format!(
                "index: extension '{signature}' runs past the checksum"
            )));
        }

        reader.read(size as usize)?;
        tracing::trace!(%signature, size, "skipped index extension");
    }
}

fn collect_tree(
    database: &ObjectDatabase,
    tree_id: &ObjectId,
    prefix: &str,
    entries: &mut BTreeMap<EntryKey, IndexEntry>,
) -> Result<()> {
    let tree = database.read_tree(tree_id)?;

    for tree_entry in tree.entries() {
        let path = if prefix.is_empty() {
            tree_entry.name.clone()
        } else {
            format!("{prefix}/{}", tree_entry.name)
        };

        if tree_entry.is_tree() {
            collect_tree(database, &tree_entry.oid, &path, entries)?;
        } else {
            let entry = IndexEntry::new(path, tree_entry.mode, tree_entry.oid)?;
            entries.insert((entry.path().to_string(), 0), entry);
        }
    }

    Ok(())
}

/// Directory hierarchy built from index paths while writing trees
#[derive(Debug, Default)]
struct TreeNode {
    blobs: Vec<TreeEntry>,
    subtrees: BTreeMap<String, TreeNode>,
}

impl TreeNode {
    fn insert(&mut self, entry: &IndexEntry) {
        let mut node = self;
        for dir in entry.path().split('/').take(entry.parent_dirs().len()) {
            node = node.subtrees.entry(dir.to_string()).or_default();
        }

        node.blobs.push(TreeEntry::new(
            entry.basename().to_string(),
            entry.mode(),
            *entry.oid(),
        ));
    }

    fn write(self, database: &ObjectDatabase) -> Result<ObjectId> {
        let mut entries = self.blobs;
        for (name, subtree) in self.subtrees {
            let oid = subtree.write(database)?;
            entries.push(TreeEntry::new(name, EntryMode::Directory, oid));
        }

        database.write(&Object::Tree(Tree::new(entries)?))
    }
}
