//! Git references (branches, HEAD, tags)
//!
//! References are human-readable names pointing either at an object
//! (direct) or at another reference (symbolic, e.g. `HEAD -> refs/heads/main`).
//!
//! ## Storage
//!
//! - Loose: one file per reference under the git directory, holding the
//!   content described in [`crate::artifacts::refs::reference`]
//! - Packed: lines of the `packed-refs` file; a loose file shadows a packed
//!   entry of the same name
//!
//! ## Concurrency
//!
//! Writers of the same name are serialized by an in-process mutex per name.
//! Loose files are written to a `.lock` sibling and renamed into place, so a
//! reader sees either the old or the new target. The `packed-refs` file is
//! rewritten under an exclusive file lock.

use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::refs::packed_refs::PackedRefs;
use crate::artifacts::refs::ref_name::RefName;
use crate::artifacts::refs::reference::{RefTarget, Reference};
use crate::artifacts::refs::{HEAD_REF_NAME, MAX_SYMBOLIC_HOPS, REFS_PREFIX};
use crate::errors::{Error, Result};
use file_guard::Lock;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::io::{ErrorKind, Read, Seek, Write};
use std::ops::DerefMut;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

const PACKED_REFS_FILE: &str = "packed-refs";
const LOCK_SUFFIX: &str = ".lock";

/// Git references manager
#[derive(Debug)]
pub struct Refs {
    /// Path to the git directory (typically `.git`)
    path: Box<Path>,
    name_locks: Mutex<HashMap<RefName, Arc<Mutex<()>>>>,
}

impl Refs {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Refs {
            path: path.into().into_boxed_path(),
            name_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `action` while holding the in-process lock for `name`
    ///
    /// The lock is dropped from the table once no other caller holds it.
    fn with_name_lock<T>(&self, name: &RefName, action: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = self
            .name_locks
            .lock()
            .entry(name.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock();
            action()
        };

        let mut name_locks = self.name_locks.lock();
        if Arc::strong_count(&lock) == 2 {
            name_locks.remove(name);
        }

        result
    }

    fn loose_path(&self, name: &RefName) -> PathBuf {
        self.path.join(name.as_ref_path())
    }

    fn packed_refs_path(&self) -> PathBuf {
        self.path.join(PACKED_REFS_FILE)
    }

    /// Read a reference without following symbolic targets
    pub fn read(&self, name: &str) -> Result<Reference> {
        let name = RefName::try_parse(name)?;
        self.read_ref(&name)?
            .ok_or_else(|| Error::not_found(format!("reference {name}")))
    }

    fn read_ref(&self, name: &RefName) -> Result<Option<Reference>> {
        if let Some(target) = self.read_loose(name)? {
            return Ok(Some(Reference::new(name.clone(), target)));
        }

        Ok(self
            .read_packed()?
            .get(name)
            .map(|entry| Reference::new(name.clone(), RefTarget::Direct(entry.oid))))
    }

    fn read_loose(&self, name: &RefName) -> Result<Option<RefTarget>> {
        let path = self.loose_path(name);
        if path.is_dir() {
            return Ok(None);
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => RefTarget::parse(name, &content).map(Some),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) if error.kind() == ErrorKind::InvalidData => {
                Err(Error::corrupt(format!("reference {name}: not UTF-8")))
            }
            Err(error) => Err(error.into()),
        }
    }

    fn read_packed(&self) -> Result<PackedRefs> {
        let path = self.packed_refs_path();
        let mut file = match std::fs::File::open(&path) {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(PackedRefs::default()),
            Err(error) => return Err(error.into()),
        };
        if file.metadata()?.len() == 0 {
            return Ok(PackedRefs::default());
        }

        let mut lock = file_guard::lock(&mut file, Lock::Shared, 0, 1)?;
        let mut content = String::new();
        lock.deref_mut()
            .read_to_string(&mut content)
            .map_err(|_| Error::corrupt("packed-refs: not UTF-8"))?;

        PackedRefs::parse(&content)
    }

    /// Follow symbolic targets to the final direct reference
    pub fn resolve(&self, name: &str) -> Result<Reference> {
        let start = RefName::try_parse(name)?;
        let mut current = start.clone();

        for _ in 0..=MAX_SYMBOLIC_HOPS {
            let reference = self
                .read_ref(&current)?
                .ok_or_else(|| Error::not_found(format!("reference {current}")))?;

            match reference.target() {
                RefTarget::Direct(_) => return Ok(reference),
                RefTarget::Symbolic(target) => current = target.clone(),
            }
        }

        Err(Error::TooManyRedirects {
            name: start.to_string(),
            hops: MAX_SYMBOLIC_HOPS,
        })
    }

    /// Object id a reference finally points at
    pub fn lookup(&self, name: &str) -> Result<ObjectId> {
        let reference = self.resolve(name)?;
        reference
            .oid()
            .copied()
            .ok_or_else(|| Error::corrupt(format!("reference {} has no direct target", reference.name())))
    }

    /// Create or overwrite a reference
    pub fn set(&self, name: &str, target: impl Into<RefTarget>) -> Result<()> {
        let name = RefName::try_parse(name)?;
        let target = target.into();

        self.with_name_lock(&name, || self.write_loose(&name, &target))
    }

    /// Create a reference, failing with `Conflict` if it exists and `force` is off
    pub fn create(&self, name: &str, target: impl Into<RefTarget>, force: bool) -> Result<Reference> {
        let name = RefName::try_parse(name)?;
        let target = target.into();

        self.with_name_lock(&name, || {
            if !force && self.read_ref(&name)?.is_some() {
                return Err(Error::Conflict(format!("reference {name} already exists")));
            }
            self.write_loose(&name, &target)
        })?;

        Ok(Reference::new(name, target))
    }

    /// Point the reference `name` finally resolves to at `oid`
    ///
    /// A symbolic chain ending in a missing reference (an unborn branch)
    /// creates that reference. Returns the name that was written.
    pub fn update(&self, name: &str, oid: ObjectId) -> Result<RefName> {
        let start = RefName::try_parse(name)?;
        let mut current = start.clone();

        for _ in 0..=MAX_SYMBOLIC_HOPS {
            match self.read_ref(&current)?.map(|reference| reference.target().clone()) {
                Some(RefTarget::Symbolic(target)) => current = target,
                Some(RefTarget::Direct(_)) | None => {
                    self.with_name_lock(&current, || {
                        self.write_loose(&current, &RefTarget::Direct(oid))
                    })?;
                    return Ok(current);
                }
            }
        }

        Err(Error::TooManyRedirects {
            name: start.to_string(),
            hops: MAX_SYMBOLIC_HOPS,
        })
    }

    /// Delete a reference from loose storage and `packed-refs`
    pub fn delete(&self, name: &str) -> Result<()> {
        let name = RefName::try_parse(name)?;
        self.with_name_lock(&name, || self.delete_locked(&name))
    }

    fn delete_locked(&self, name: &RefName) -> Result<()> {
        let loose_path = self.loose_path(name);
        let removed_loose = match std::fs::remove_file(&loose_path) {
            Ok(()) => true,
            Err(error) if error.kind() == ErrorKind::NotFound => false,
            Err(error) => return Err(error.into()),
        };
        let removed_packed = self.remove_packed(name)?;

        if !removed_loose && !removed_packed {
            return Err(Error::not_found(format!("reference {name}")));
        }
        if removed_loose {
            self.prune_empty_parent_dirs(&loose_path)?;
        }

        tracing::debug!(reference = %name, "deleted reference");
        Ok(())
    }

    /// Rename a reference, carrying HEAD along when it points at the old name
    pub fn rename(&self, old_name: &str, new_name: &str, force: bool) -> Result<Reference> {
        let old = self.read(old_name)?;
        let new_name = RefName::try_parse(new_name)?;
        if *old.name() == new_name {
            return Ok(old);
        }

        let renamed = self.create(new_name.as_str(), old.target().clone(), force)?;
        self.delete(old.name().as_str())?;

        if let Some(head) = self.read_ref(&head_name()?)?
            && head.symbolic_target() == Some(old.name())
        {
            self.set(HEAD_REF_NAME, new_name.clone())?;
        }

        tracing::debug!(from = %old.name(), to = %new_name, "renamed reference");
        Ok(renamed)
    }

    /// Names of all references under `refs/` starting with `prefix`, sorted
    pub fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names = BTreeSet::new();

        let refs_path = self.path.join(REFS_PREFIX.trim_end_matches('/'));
        for entry in WalkDir::new(&refs_path).into_iter().filter_map(|entry| entry.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative_path) = entry.path().strip_prefix(&self.path) else {
                continue;
            };
            let name = relative_path
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            // skip lock files and anything else that is not a reference name
            if let Ok(name) = RefName::try_parse(name) {
                names.insert(name.to_string());
            }
        }

        names.extend(self.read_packed()?.names().map(|name| name.to_string()));

        Ok(names
            .into_iter()
            .filter(|name| name.starts_with(prefix))
            .collect())
    }

    pub fn head(&self) -> Result<Reference> {
        self.read(HEAD_REF_NAME)
    }

    /// Attach HEAD to a reference, typically a branch
    pub fn set_head(&self, target: &RefName) -> Result<()> {
        self.set(HEAD_REF_NAME, target.clone())
    }

    /// Point HEAD directly at an object
    pub fn set_head_detached(&self, oid: ObjectId) -> Result<()> {
        self.set(HEAD_REF_NAME, oid)
    }

    /// Branch HEAD is attached to, or `None` when detached
    pub fn current_branch(&self) -> Result<Option<RefName>> {
        Ok(self.head()?.symbolic_target().cloned())
    }

    fn write_loose(&self, name: &RefName, target: &RefTarget) -> Result<()> {
        let path = self.loose_path(name);
        self.check_directory_conflicts(name, &path)?;

        let parent = path
            .parent()
            .ok_or_else(|| Error::invalid(format!("reference path {}", path.display())))?;
        std::fs::create_dir_all(parent)?;

        let lock_path = append_suffix(&path, LOCK_SUFFIX);
        let mut lock_file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::Conflict(format!(
                    "reference {name} is locked by {}",
                    lock_path.display()
                )));
            }
            Err(error) => return Err(error.into()),
        };

        let written = lock_file
            .write_all(target.to_content().as_bytes())
            .and_then(|()| lock_file.sync_all())
            .and_then(|()| std::fs::rename(&lock_path, &path));
        if let Err(error) = written {
            let _ = std::fs::remove_file(&lock_path);
            return Err(error.into());
        }

        tracing::debug!(reference = %name, target = ?target, "updated reference");
        Ok(())
    }

    /// `refs/heads/a` and `refs/heads/a/b` cannot both exist
    fn check_directory_conflicts(&self, name: &RefName, path: &Path) -> Result<()> {
        if path.is_dir() {
            return Err(Error::Conflict(format!(
                "reference {name} would replace a directory of references"
            )));
        }

        let mut ancestor = path.parent();
        while let Some(dir) = ancestor {
            if dir == self.path.as_ref() {
                break;
            }
            if dir.is_file() {
                return Err(Error::Conflict(format!(
                    "reference {name} would nest under the reference at {}",
                    dir.display()
                )));
            }
            ancestor = dir.parent();
        }

        let packed = self.read_packed()?;
        let nested_prefix = format!("{name}/");
        for packed_name in packed.names() {
            if packed_name.as_str().starts_with(&nested_prefix)
                || name.as_str().starts_with(&format!("{packed_name}/"))
            {
                return Err(Error::Conflict(format!(
                    "reference {name} conflicts with packed reference {packed_name}"
                )));
            }
        }

        Ok(())
    }

    fn remove_packed(&self, name: &RefName) -> Result<bool> {
        let path = self.packed_refs_path();
        let mut file = match std::fs::OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(false),
            Err(error) => return Err(error.into()),
        };

        let mut lock = file_guard::lock(&mut file, Lock::Exclusive, 0, 1)?;
        let mut content = String::new();
        lock.deref_mut()
            .read_to_string(&mut content)
            .map_err(|_| Error::corrupt("packed-refs: not UTF-8"))?;

        let mut packed = PackedRefs::parse(&content)?;
        if packed.remove(name).is_none() {
            return Ok(false);
        }

        let file = lock.deref_mut();
        file.set_len(0)?;
        file.rewind()?;
        file.write_all(packed.serialize().as_bytes())?;
        file.sync_all()?;

        Ok(true)
    }

    fn prune_empty_parent_dirs(&self, path: &Path) -> Result<()> {
        let refs_path = self.path.join(REFS_PREFIX.trim_end_matches('/'));

        let mut parent = path.parent();
        while let Some(dir) = parent {
            if dir == refs_path || !dir.starts_with(&refs_path) {
                break;
            }
            // stop at the first directory that still has entries
            if std::fs::remove_dir(dir).is_err() {
                break;
            }
            parent = dir.parent();
        }

        Ok(())
    }
}

fn head_name() -> Result<RefName> {
    RefName::try_parse(HEAD_REF_NAME)
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut with_suffix = path.as_os_str().to_owned();
    with_suffix.push(suffix);
    PathBuf::from(with_suffix)
}
