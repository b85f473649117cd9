mod common;

use bit_core::artifacts::objects::object_type::ObjectType;
use bit_core::{Error, Repository, RepositoryOptions};
use common::{EPOCH, HOUR, TestRepository, collect, commit_at, repository, repository_dir, signature, write_blob};
use pretty_assertions::assert_eq;
use rstest::rstest;

#[rstest]
fn init_lays_out_the_git_directory(repository_dir: assert_fs::TempDir) {
    let repository =
        Repository::init(repository_dir.path(), RepositoryOptions::isolated()).unwrap();
    let git_dir = repository_dir.path().join(".git");

    for dir in ["objects", "objects/pack", "refs/heads", "refs/tags"] {
        assert!(git_dir.join(dir).is_dir(), "{dir} should exist");
    }
    assert_eq!(
        std::fs::read_to_string(git_dir.join("HEAD")).unwrap(),
        "ref: refs/heads/master\n"
    );
    assert_eq!(repository.git_dir(), git_dir.as_path());
}

#[rstest]
fn reinit_keeps_head(repository: TestRepository) {
    let tip = commit_at(&repository, "tip", &[], EPOCH);
    repository.refs().set("refs/heads/main", tip).unwrap();
    repository
        .refs()
        .set_head(&bit_core::artifacts::refs::ref_name::RefName::branch("main").unwrap())
        .unwrap();

    let reinitialized =
        Repository::init(repository.dir.path(), RepositoryOptions::isolated()).unwrap();
    assert_eq!(reinitialized.head_oid().unwrap(), tip);
}

#[rstest]
fn opening_a_plain_directory_is_not_found(repository_dir: assert_fs::TempDir) {
    let error = Repository::open(repository_dir.path(), RepositoryOptions::isolated()).unwrap_err();
    assert!(matches!(error.downcast_ref::<Error>(), Some(Error::NotFound(_))));
}

#[rstest]
fn commits_must_point_at_trees_and_commits(repository: TestRepository) {
    let blob = write_blob(repository.database(), "content");

    let result = repository.create_commit(
        None,
        signature(EPOCH),
        signature(EPOCH),
        "bad\n",
        blob,
        vec![],
    );
    assert!(matches!(
        result,
        Err(Error::TypeMismatch {
            expected: ObjectType::Tree,
            ..
        })
    ));
}

#[rstest]
fn history_of_head_is_walkable(repository: TestRepository) {
    let first = commit_at(&repository, "first", &[], EPOCH);
    let second = commit_at(&repository, "second", &[first], EPOCH + HOUR);
    repository.refs().update("HEAD", second).unwrap();

    let mut walker = repository.walk();
    walker.push(repository.head_oid().unwrap()).unwrap();

    assert_eq!(collect(walker.walk()), vec![second, first]);
    assert_eq!(repository.head_commit().unwrap().message(), "second\n");
}
