#![allow(dead_code)]

use assert_fs::TempDir;
use bit_core::areas::database::ObjectDatabase;
use bit_core::artifacts::objects::blob::Blob;
use bit_core::artifacts::objects::entry_mode::EntryMode;
use bit_core::artifacts::objects::object::Object;
use bit_core::artifacts::objects::object_id::ObjectId;
use bit_core::artifacts::objects::signature::Signature;
use bit_core::artifacts::objects::tree::{Tree, TreeEntry};
use bit_core::{Repository, RepositoryOptions};
use fake::Fake;
use fake::faker::lorem::en::{Word, Words};
use rstest::fixture;
use std::ops::Deref;

/// 2024-01-01 10:00:00 UTC
pub const EPOCH: i64 = 1_704_103_200;
pub const HOUR: i64 = 3600;

/// A repository living in a temporary directory for the test's duration
pub struct TestRepository {
    pub dir: TempDir,
    pub repository: Repository,
}

impl Deref for TestRepository {
    type Target = Repository;

    fn deref(&self) -> &Self::Target {
        &self.repository
    }
}

impl TestRepository {
    pub fn reopen(&self) -> Repository {
        Repository::open(self.dir.path(), RepositoryOptions::isolated())
            .expect("failed to reopen repository")
    }
}

/// Route library logs through the test harness; filter with `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[fixture]
pub fn repository_dir() -> TempDir {
    init_tracing();
    TempDir::new().expect("Failed to create temp dir")
}

#[fixture]
pub fn repository(repository_dir: TempDir) -> TestRepository {
    let repository = Repository::init(repository_dir.path(), RepositoryOptions::isolated())
        .expect("Failed to init repository");

    TestRepository {
        dir: repository_dir,
        repository,
    }
}

pub fn signature(seconds: i64) -> Signature {
    Signature::from_unix("A U Thor", "author@example.com", seconds, 0).expect("valid signature")
}

pub fn random_content() -> String {
    Words(5..10).fake::<Vec<String>>().join(" ")
}

pub fn write_blob(database: &ObjectDatabase, content: &str) -> ObjectId {
    database
        .write(&Object::Blob(Blob::new(content.to_string())))
        .expect("failed to write blob")
}

/// A tree holding one randomly named file with random content
pub fn write_random_tree(database: &ObjectDatabase) -> ObjectId {
    let blob = write_blob(database, &random_content());
    let name = format!("{}.txt", Word().fake::<String>());
    let tree = Tree::new([TreeEntry::new(name, EntryMode::REGULAR, blob)]).expect("valid tree");

    database
        .write(&Object::Tree(tree))
        .expect("failed to write tree")
}

/// Commit a fresh random tree on top of `parents` at the given committer time
pub fn commit_at(
    repository: &Repository,
    message: &str,
    parents: &[ObjectId],
    seconds: i64,
) -> ObjectId {
    let tree = write_random_tree(repository.database());
    repository
        .create_commit(
            None,
            signature(seconds),
            signature(seconds),
            format!("{message}\n"),
            tree,
            parents.to_vec(),
        )
        .expect("failed to create commit")
}

pub fn collect(walk: impl Iterator<Item = bit_core::Result<ObjectId>>) -> Vec<ObjectId> {
    walk.collect::<bit_core::Result<Vec<_>>>()
        .expect("walk failed")
}
