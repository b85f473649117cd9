use crate::areas::config::{self, Config, ConfigLevel};
use crate::areas::database::ObjectDatabase;
use crate::areas::index::Index;
use crate::areas::refs::Refs;
use crate::artifacts::database::loose::LooseBackend;
use crate::artifacts::database::pack::{PackBackend, PackWriter};
use crate::artifacts::log::rev_walk::RevWalk;
use crate::artifacts::merge::bca_finder::BCAFinder;
use crate::artifacts::objects::commit::{Commit, SlimCommit};
use crate::artifacts::objects::object::{Object, Packable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::signature::Signature;
use crate::artifacts::objects::tag::Tag;
use crate::artifacts::refs::reference::Reference;
use crate::artifacts::refs::ref_name::RefName;
use crate::artifacts::refs::{HEAD_REF_NAME, SYMREF_PREFIX};
use crate::errors::{Error, Result};
use anyhow::Context;
use derive_new::new;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const GIT_DIR: &str = ".git";
const DEFAULT_BRANCH: &str = "master";
/// Priority of mounted pack files; the loose store is probed first
const PACK_PRIORITY: i32 = 1;

/// Where a repository looks for configuration and objects besides `.git`
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct RepositoryOptions {
    pub global_config: Option<PathBuf>,
    pub system_config: Option<PathBuf>,
    /// Mount `objects/pack/*.pack` files as read-only backends
    pub mount_packs: bool,
}

impl RepositoryOptions {
    /// Only the repository's own files: no global or system configuration
    pub fn isolated() -> Self {
        Self::new(None, None, true)
    }
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self::new(
            config::default_global_path(),
            Some(config::default_system_path()),
            true,
        )
    }
}

/// Handle owning every long-lived part of a repository
#[derive(Debug)]
pub struct Repository {
    path: Box<Path>,
    git_dir: Box<Path>,
    database: ObjectDatabase,
    refs: Refs,
    index: RwLock<Index>,
    config: Config,
}

impl Repository {
    /// Create `.git` under `path` (if needed) and open it
    ///
    /// Re-initializing an existing repository keeps its HEAD.
    pub fn init(path: impl AsRef<Path>, options: RepositoryOptions) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let git_dir = path.join(GIT_DIR);

        for dir in [
            git_dir.join("objects").join("pack"),
            git_dir.join("refs").join("heads"),
            git_dir.join("refs").join("tags"),
        ] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }

        let head = git_dir.join(HEAD_REF_NAME);
        if !head.exists() {
            std::fs::write(&head, format!("{SYMREF_PREFIX}refs/heads/{DEFAULT_BRANCH}\n"))
                .with_context(|| format!("failed to write {}", head.display()))?;
        }

        let config = git_dir.join("config");
        if !config.exists() {
            std::fs::write(&config, "")
                .with_context(|| format!("failed to write {}", config.display()))?;
        }

        tracing::debug!(path = %path.display(), "initialized repository");
        Self::open(path, options)
    }

    /// Open the repository whose `.git` directory lives under `path`
    pub fn open(path: impl AsRef<Path>, options: RepositoryOptions) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let git_dir = path.join(GIT_DIR);

        if !git_dir.is_dir() {
            return Err(Error::not_found(format!("repository at {}", path.display())).into());
        }

        let database = open_database(&git_dir, options.mount_packs)
            .with_context(|| format!("failed to open object database in {}", git_dir.display()))?;

        let mut index = Index::new(git_dir.join("index"));
        index
            .load()
            .with_context(|| format!("failed to load {}", index.path().display()))?;

        let config = Config::new();
        let levels = [
            (ConfigLevel::System, options.system_config),
            (ConfigLevel::Global, options.global_config),
            (ConfigLevel::Local, Some(git_dir.join("config"))),
        ];
        for (level, config_path) in levels {
            if let Some(config_path) = config_path {
                config
                    .add_file(level, &config_path)
                    .with_context(|| format!("failed to load {}", config_path.display()))?;
            }
        }

        Ok(Repository {
            path: path.into(),
            refs: Refs::new(&git_dir),
            git_dir: git_dir.into_boxed_path(),
            database,
            index: RwLock::new(index),
            config,
        })
    }

    /// Working directory the repository belongs to
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn database(&self) -> &ObjectDatabase {
        &self.database
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    pub fn index(&self) -> &RwLock<Index> {
        &self.index
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Write a commit and, when `update_ref` is given, move that reference
    /// (following symbolic references such as `HEAD`) to it
    pub fn create_commit(
        &self,
        update_ref: Option<&str>,
        author: Signature,
        committer: Signature,
        message: impl Into<String>,
        tree: ObjectId,
        parents: Vec<ObjectId>,
    ) -> Result<ObjectId> {
        self.expect_type(&tree, ObjectType::Tree)?;
        for parent in &parents {
            self.expect_type(parent, ObjectType::Commit)?;
        }

        let commit = Commit::new(tree, parents, author, committer, message);
        let oid = self.database.write(&Object::Commit(commit))?;

        if let Some(update_ref) = update_ref {
            let updated = self.refs.update(update_ref, oid)?;
            tracing::debug!(%oid, reference = %updated, "moved reference to new commit");
        }

        Ok(oid)
    }

    /// Write an annotated tag object and point `refs/tags/<name>` at it
    pub fn create_tag(
        &self,
        name: &str,
        target: ObjectId,
        tagger: Signature,
        message: impl Into<String>,
        force: bool,
    ) -> Result<ObjectId> {
        let ref_name = RefName::tag(name)?;
        if !force && self.reference_exists(&ref_name)? {
            return Err(Error::Conflict(format!("tag '{name}' already exists")));
        }

        let (target_type, _) = self.database.read_header(&target)?;
        let tag = Tag::new(target, target_type, name, tagger, message);
        let oid = self.database.write(&Object::Tag(tag))?;

        self.refs.create(ref_name.as_str(), oid, force)?;
        Ok(oid)
    }

    /// Point `refs/tags/<name>` directly at `target`
    pub fn create_lightweight_tag(
        &self,
        name: &str,
        target: ObjectId,
        force: bool,
    ) -> Result<Reference> {
        let ref_name = RefName::tag(name)?;
        if !self.database.exists(&target)? {
            return Err(Error::not_found(format!("object {target}")));
        }

        self.refs.create(ref_name.as_str(), target, force)
    }

    /// A revision walker reading commits from this repository
    pub fn walk(&self) -> RevWalk<impl Fn(&ObjectId) -> Result<SlimCommit> + '_> {
        RevWalk::new(move |oid: &ObjectId| self.database.slim_commit(oid))
    }

    /// Id of the commit HEAD resolves to
    pub fn head_oid(&self) -> Result<ObjectId> {
        self.refs.lookup(HEAD_REF_NAME)
    }

    pub fn head_commit(&self) -> Result<Commit> {
        self.database.read_commit(&self.head_oid()?)
    }

    pub fn merge_base(&self, one: &ObjectId, two: &ObjectId) -> Result<Option<ObjectId>> {
        self.bca_finder().find_best_common_ancestor(one, two)
    }

    pub fn merge_bases(&self, one: &ObjectId, two: &ObjectId) -> Result<Vec<ObjectId>> {
        self.bca_finder().find_best_common_ancestors(one, two)
    }

    pub fn is_descendant_of(&self, commit: &ObjectId, ancestor: &ObjectId) -> Result<bool> {
        self.bca_finder().is_descendant_of(commit, ancestor)
    }

    /// Write every stored object into a new pack under `objects/pack`
    ///
    /// Loose objects are left in place; the pack is mounted on the next open.
    pub fn pack_objects(&self) -> Result<PathBuf> {
        let mut writer = PackWriter::new();
        for oid in self.database.ids()? {
            let object = self.database.read(&oid)?;
            writer.add(object.object_type(), object.serialize());
        }

        let pack = writer.write_to(&self.git_dir.join("objects").join("pack"))?;
        tracing::debug!(path = %pack.display(), objects = writer.len(), "wrote pack");

        Ok(pack)
    }

    fn bca_finder(&self) -> BCAFinder<impl Fn(&ObjectId) -> Result<SlimCommit> + '_> {
        BCAFinder::new(move |oid: &ObjectId| self.database.slim_commit(oid))
    }

    fn expect_type(&self, oid: &ObjectId, expected: ObjectType) -> Result<()> {
        let (actual, _) = self.database.read_header(oid)?;
        if actual != expected {
            return Err(Error::TypeMismatch {
                oid: oid.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    fn reference_exists(&self, name: &RefName) -> Result<bool> {
        match self.refs.read(name.as_str()) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn open_database(git_dir: &Path, mount_packs: bool) -> Result<ObjectDatabase> {
    let objects = git_dir.join("objects");
    let mut database = ObjectDatabase::new(Arc::new(LooseBackend::new(&objects)));

    if !mount_packs {
        return Ok(database);
    }

    let mut packs = match std::fs::read_dir(objects.join("pack")) {
        Ok(entries) => entries
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<std::io::Result<Vec<_>>>()?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    packs.retain(|path| path.extension().is_some_and(|ext| ext == "pack"));
    packs.sort();

    for pack in packs {
        database.add_backend(Arc::new(PackBackend::open(&pack)?), PACK_PRIORITY);
    }

    Ok(database)
}
