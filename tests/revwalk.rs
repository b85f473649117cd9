mod common;

use bit_core::Error;
use bit_core::artifacts::log::Sort;
use bit_core::artifacts::objects::object_id::ObjectId;
use common::{EPOCH, HOUR, TestRepository, collect, commit_at, repository, write_blob};
use pretty_assertions::assert_eq;
use rstest::rstest;

/// ```text
///       A
///      / \
///     B   C
///      \ /
///       D
/// ```
struct Diamond {
    a: ObjectId,
    b: ObjectId,
    c: ObjectId,
    d: ObjectId,
}

fn diamond(repository: &TestRepository) -> Diamond {
    let a = commit_at(repository, "A", &[], EPOCH);
    let b = commit_at(repository, "B", &[a], EPOCH + HOUR);
    let c = commit_at(repository, "C", &[a], EPOCH + 2 * HOUR);
    let d = commit_at(repository, "D", &[b, c], EPOCH + 3 * HOUR);

    Diamond { a, b, c, d }
}

#[rstest]
fn diamond_history_visits_each_commit_once(repository: TestRepository) {
    let Diamond { a, b, c, d } = diamond(&repository);

    let mut walker = repository.walk();
    walker.push(d).unwrap().sorting(Sort::TIME);

    assert_eq!(collect(walker.walk()), vec![d, c, b, a]);
}

#[rstest]
#[case(Sort::TOPOLOGICAL)]
#[case(Sort::TOPOLOGICAL | Sort::TIME)]
fn topological_walks_emit_children_first(repository: TestRepository, #[case] sorting: Sort) {
    let Diamond { a, d, .. } = diamond(&repository);

    let mut walker = repository.walk();
    walker.push(d).unwrap().sorting(sorting);
    let commits = collect(walker.walk());

    assert_eq!(commits.len(), 4);
    assert_eq!(commits.first(), Some(&d));
    assert_eq!(commits.last(), Some(&a));
}

#[rstest]
fn reverse_flips_the_order(repository: TestRepository) {
    let Diamond { a, b, c, d } = diamond(&repository);

    let mut walker = repository.walk();
    walker.push(d).unwrap().sorting(Sort::TIME | Sort::REVERSE);

    assert_eq!(collect(walker.walk()), vec![a, b, c, d]);
}

#[rstest]
fn hidden_history_is_excluded(repository: TestRepository) {
    let Diamond { a, b, c, d } = diamond(&repository);

    let mut walker = repository.walk();
    walker.push(d).unwrap().hide(b).unwrap().sorting(Sort::TIME);

    assert_eq!(collect(walker.walk()), vec![d, c]);
    assert!(!collect(walker.walk()).contains(&a));
}

#[rstest]
fn each_walk_starts_over(repository: TestRepository) {
    let Diamond { d, .. } = diamond(&repository);

    let mut walker = repository.walk();
    walker.push(d).unwrap();

    let first = collect(walker.walk());
    let second = collect(walker.walk());
    assert_eq!(first, second);
}

#[rstest]
fn pushing_a_non_commit_is_not_found(repository: TestRepository) {
    let blob = write_blob(repository.database(), "not a commit");
    let missing = ObjectId::try_parse("0123456789012345678901234567890123456789").unwrap();

    let mut walker = repository.walk();
    assert!(matches!(walker.push(blob), Err(Error::NotFound(_))));
    assert!(matches!(walker.push(missing), Err(Error::NotFound(_))));
}

#[rstest]
fn merge_bases_of_divergent_branches(repository: TestRepository) {
    let Diamond { a, b, c, d } = diamond(&repository);
    let e = commit_at(&repository, "E", &[c], EPOCH + 4 * HOUR);

    assert_eq!(repository.merge_base(&b, &e).unwrap(), Some(a));
    assert_eq!(repository.merge_base(&d, &e).unwrap(), Some(c));
    assert!(repository.is_descendant_of(&d, &a).unwrap());
    assert!(!repository.is_descendant_of(&b, &c).unwrap());
}

#[rstest]
fn unrelated_histories_have_no_merge_base(repository: TestRepository) {
    let one = commit_at(&repository, "one", &[], EPOCH);
    let two = commit_at(&repository, "two", &[], EPOCH + HOUR);

    assert_eq!(repository.merge_base(&one, &two).unwrap(), None);
    assert!(repository.merge_bases(&one, &two).unwrap().is_empty());
}
