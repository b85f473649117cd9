mod common;

use bit_core::Error;
use bit_core::artifacts::index::index_entry::{EntryStat, IndexEntry};
use bit_core::artifacts::objects::entry_mode::EntryMode;
use common::{EPOCH, TestRepository, random_content, repository, signature, write_blob};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn stage_file(repository: &TestRepository, path: &str) -> IndexEntry {
    let oid = write_blob(repository.database(), &random_content());
    let entry = IndexEntry::new(path, EntryMode::REGULAR, oid).unwrap();
    repository.index().write().add(entry.clone());
    entry
}

#[rstest]
fn staged_files_become_the_committed_tree(repository: TestRepository) {
    stage_file(&repository, "README.md");
    let main = stage_file(&repository, "src/main.rs");

    let tree = repository.index().read().write_tree(repository.database()).unwrap();
    let commit = repository
        .create_commit(Some("HEAD"), signature(EPOCH), signature(EPOCH), "initial\n", tree, vec![])
        .unwrap();

    let root = repository
        .database()
        .read_tree(repository.database().read_commit(&commit).unwrap().tree_oid())
        .unwrap();
    let src = repository.database().read_tree(&root.get("src").unwrap().oid).unwrap();
    assert_eq!(src.get("main.rs").unwrap().oid, *main.oid());
    assert!(root.get("README.md").is_some());
}

#[rstest]
fn index_is_persisted_across_opens(repository: TestRepository) {
    let script = stat_file(&repository);
    {
        let mut index = repository.index().write();
        index.add(script.clone());
        index.save().unwrap();
    }

    let reopened = repository.reopen();
    let index = reopened.index().read();
    assert_eq!(index.len(), 1);
    assert_eq!(index.get("bin/run.sh", 0), Some(&script));
}

fn stat_file(repository: &TestRepository) -> IndexEntry {
    let oid = write_blob(repository.database(), "#!/bin/sh\n");
    IndexEntry::new("bin/run.sh", EntryMode::EXECUTABLE, oid)
        .unwrap()
        .with_stat(EntryStat {
            mtime: EPOCH,
            mtime_nsec: 500,
            size: 10,
            ..Default::default()
        })
}

#[rstest]
fn unresolved_conflicts_block_tree_writes(repository: TestRepository) {
    let ours = stage_file(&repository, "file.txt");
    {
        let mut index = repository.index().write();
        index.add(ours.clone().with_stage(2).unwrap());
        index.add(ours.clone().with_stage(3).unwrap());
    }

    let index = repository.index().read();
    assert_eq!(index.conflicts().count(), 2);
    assert!(index.get("file.txt", 0).is_none());
    assert!(matches!(
        index.write_tree(repository.database()),
        Err(Error::Conflict(_))
    ));
}

#[rstest]
fn truncated_index_is_corrupt(repository: TestRepository) {
    stage_file(&repository, "a.txt");
    repository.index().write().save().unwrap();

    let path = repository.git_dir().join("index");
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();

    let error = bit_core::Repository::open(
        repository.dir.path(),
        bit_core::RepositoryOptions::isolated(),
    )
    .unwrap_err();
    assert!(matches!(error.downcast_ref::<Error>(), Some(Error::Corrupt(_))));
}

#[rstest]
fn repository_with_a_cached_tree_extension_opens(repository: TestRepository) {
    use sha1::Digest;

    stage_file(&repository, "a.txt");
    repository.index().write().save().unwrap();

    let path = repository.git_dir().join("index");
    let bytes = std::fs::read(&path).unwrap();
    let mut extended = bytes[..bytes.len() - 20].to_vec();
    extended.extend_from_slice(b"TREE");
    extended.extend_from_slice(&6u32.to_be_bytes());
    extended.extend_from_slice(b"\x001 0\n\n");
    let checksum = sha1::Sha1::digest(&extended);
    extended.extend_from_slice(&checksum);
    std::fs::write(&path, extended).unwrap();

    let reopened = repository.reopen();
    assert_eq!(reopened.index().read().len(), 1);
    assert!(reopened.index().read().get("a.txt", 0).is_some());
}
