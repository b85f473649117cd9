//! Best common ancestor search
//!
//! ## Algorithm
//!
//! Commits are painted from both sides in committer-time order (newest first):
//! every commit reachable from the source carries `VISITED_FROM_SOURCE`, every
//! commit reachable from a target carries `VISITED_FROM_TARGET`. A commit that
//! carries both is a common ancestor; its own ancestors are marked `STALE`, so
//! they are pruned from further painting and dropped from the result.
//!
//! The painting stops once every queued commit is stale. Clock skew can still
//! let an older common ancestor slip into the candidates, so candidates that
//! are ancestors of other candidates are removed in a second pass, leaving
//! only the best common ancestors:
//!
//! > A best common ancestor of X and Y is a common ancestor of X and Y that is
//! > not an ancestor of any other common ancestor.

use crate::artifacts::objects::commit::SlimCommit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::Result;
use bitflags::bitflags;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::fmt;

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
    struct VisitState: u8 {
        const NONE = 0b0000;
        const VISITED_FROM_SOURCE = 0b0001;
        const VISITED_FROM_TARGET = 0b0010;
        const VISITED_FROM_BOTH = Self::VISITED_FROM_SOURCE.bits() | Self::VISITED_FROM_TARGET.bits();
        const STALE = 0b0100;
        const RESULT = 0b1000;
    }
}

impl fmt::Debug for VisitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut flags = Vec::new();
        if self.contains(VisitState::VISITED_FROM_SOURCE) {
            flags.push("SOURCE");
        }
        if self.contains(VisitState::VISITED_FROM_TARGET) {
            flags.push("TARGET");
        }
        if self.contains(VisitState::STALE) {
            flags.push("STALE");
        }
        if self.contains(VisitState::RESULT) {
            flags.push("RESULT");
        }
        if flags.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", flags.join("|"))
        }
    }
}

/// Finds best common ancestors over any commit loader
///
/// The loader has the same contract as the revision walker's: it returns the
/// parents and committer time of a commit, or an error.
pub struct BCAFinder<CommitLoaderFn>
where
    CommitLoaderFn: Fn(&ObjectId) -> Result<SlimCommit>,
{
    commit_loader: CommitLoaderFn,
}

impl<CommitLoaderFn> BCAFinder<CommitLoaderFn>
where
    CommitLoaderFn: Fn(&ObjectId) -> Result<SlimCommit>,
{
    pub fn new(commit_loader: CommitLoaderFn) -> Self {
        Self { commit_loader }
    }

    /// One best common ancestor, or `None` for unrelated histories
    ///
    /// When several exist (criss-cross merges), the one with the newest
    /// committer time is returned.
    pub fn find_best_common_ancestor(
        &self,
        source_commit_id: &ObjectId,
        target_commit_id: &ObjectId,
    ) -> Result<Option<ObjectId>> {
        Ok(self
            .find_best_common_ancestors(source_commit_id, target_commit_id)?
            .into_iter()
            .next())
    }

    /// Every best common ancestor, newest committer time first
    pub fn find_best_common_ancestors(
        &self,
        source_commit_id: &ObjectId,
        target_commit_id: &ObjectId,
    ) -> Result<Vec<ObjectId>> {
        let candidates = self.find_common_ancestors(source_commit_id, &[*target_commit_id])?;
        tracing::trace!(
            source = %source_commit_id,
            target = %target_commit_id,
            candidates = candidates.len(),
            "found common ancestors"
        );
        if candidates.len() <= 1 {
            return Ok(candidates);
        }

        let mut redundant = HashSet::new();
        for (index, candidate) in candidates.iter().enumerate() {
            if redundant.contains(candidate) {
                continue;
            }
            for other in candidates.iter().skip(index + 1) {
                if redundant.contains(other) {
                    continue;
                }
                if self.is_descendant_of(candidate, other)? {
                    redundant.insert(*other);
                } else if self.is_descendant_of(other, candidate)? {
                    redundant.insert(*candidate);
                    break;
                }
            }
        }

        Ok(candidates
            .into_iter()
            .filter(|candidate| !redundant.contains(candidate))
            .collect())
    }

    /// Whether `ancestor` is reachable from `commit` through parent links
    ///
    /// A commit is not its own descendant.
    pub fn is_descendant_of(&self, commit_id: &ObjectId, ancestor_id: &ObjectId) -> Result<bool> {
        if commit_id == ancestor_id {
            return Ok(false);
        }

        let mut visited = HashSet::from([*commit_id]);
        let mut queue = VecDeque::from([*commit_id]);
        while let Some(current) = queue.pop_front() {
            for parent in (self.commit_loader)(&current)?.parents {
                if parent == *ancestor_id {
                    return Ok(true);
                }
                if visited.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }

        Ok(false)
    }

    /// Paint from the source and targets down to their common ancestors
    fn find_common_ancestors(
        &self,
        source_commit_id: &ObjectId,
        target_commit_ids: &[ObjectId],
    ) -> Result<Vec<ObjectId>> {
        if target_commit_ids.contains(source_commit_id) {
            return Ok(vec![*source_commit_id]);
        }

        let mut states = HashMap::<ObjectId, VisitState>::new();
        let mut timestamps = HashMap::<ObjectId, i64>::new();
        let mut queue = PaintQueue::default();

        let source = (self.commit_loader)(source_commit_id)?;
        states.insert(source.oid, VisitState::VISITED_FROM_SOURCE);
        timestamps.insert(source.oid, source.timestamp);
        queue.push(source.timestamp, source.oid, VisitState::VISITED_FROM_SOURCE);

        for target_commit_id in target_commit_ids {
            let target = (self.commit_loader)(target_commit_id)?;
            let state = states.entry(target.oid).or_default();
            *state |= VisitState::VISITED_FROM_TARGET;
            timestamps.insert(target.oid, target.timestamp);
            queue.push(target.timestamp, target.oid, *state);
        }

        let mut results = Vec::new();
        while queue.has_fresh() {
            let Some(commit_id) = queue.pop(&states) else {
                break;
            };
            let current_state = states.get(&commit_id).copied().unwrap_or_default();
            let mut flags = current_state
                & (VisitState::VISITED_FROM_BOTH | VisitState::STALE);

            if flags == VisitState::VISITED_FROM_BOTH {
                if !current_state.contains(VisitState::RESULT) {
                    states.insert(commit_id, current_state | VisitState::RESULT);
                    results.push(commit_id);
                }
                flags |= VisitState::STALE;
            }

            let commit = (self.commit_loader)(&commit_id)?;
            for parent_id in commit.parents {
                let parent_state = states.get(&parent_id).copied().unwrap_or_default();
                if parent_state.contains(flags) {
                    continue;
                }

                let timestamp = match timestamps.get(&parent_id) {
                    Some(timestamp) => *timestamp,
                    None => {
                        let parent = (self.commit_loader)(&parent_id)?;
                        timestamps.insert(parent_id, parent.timestamp);
                        parent.timestamp
                    }
                };

                let new_state = parent_state | flags;
                if !parent_state.contains(VisitState::STALE) && new_state.contains(VisitState::STALE) {
                    queue.mark_stale(&parent_id);
                }
                states.insert(parent_id, new_state);
                queue.push(timestamp, parent_id, new_state);
            }
        }

        let mut results: Vec<_> = results
            .into_iter()
            .filter(|oid| {
                !states
                    .get(oid)
                    .copied()
                    .unwrap_or_default()
                    .contains(VisitState::STALE)
            })
            .collect();
        results.sort_by_key(|oid| std::cmp::Reverse((timestamps.get(oid).copied().unwrap_or_default(), *oid)));

        tracing::trace!(
            states = ?states.iter().filter(|(_, state)| state.contains(VisitState::RESULT)).collect::<Vec<_>>(),
            "painted common ancestors"
        );
        Ok(results)
    }
}

/// Date-ordered queue that counts the entries whose commit is not yet stale
#[derive(Debug, Default)]
struct PaintQueue {
    heap: BinaryHeap<(i64, ObjectId)>,
    queued: HashMap<ObjectId, usize>,
    fresh: usize,
}

impl PaintQueue {
    fn push(&mut self, timestamp: i64, oid: ObjectId, state: VisitState) {
        self.heap.push((timestamp, oid));
        *self.queued.entry(oid).or_default() += 1;
        if !state.contains(VisitState::STALE) {
            self.fresh += 1;
        }
    }

    fn pop(&mut self, states: &HashMap<ObjectId, VisitState>) -> Option<ObjectId> {
        let (_, oid) = self.heap.pop()?;
        if let Some(count) = self.queued.get_mut(&oid) {
            *count -= 1;
        }
        if !states.get(&oid).copied().unwrap_or_default().contains(VisitState::STALE) {
            self.fresh -= 1;
        }
        Some(oid)
    }

    /// `oid` just became stale, so its queued entries no longer count
    fn mark_stale(&mut self, oid: &ObjectId) {
        self.fresh -= self.queued.get(oid).copied().unwrap_or_default();
    }

    fn has_fresh(&self) -> bool {
        self.fresh > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::test_support::{InMemoryCommitStore, create_oid, dag_strategy, format_oid, names};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::{fixture, rstest};
    use std::collections::BTreeSet;

    fn bca(store: &InMemoryCommitStore, source: &str, target: &str) -> Option<String> {
        BCAFinder::new(|oid: &ObjectId| store.load(oid))
            .find_best_common_ancestor(&create_oid(source), &create_oid(target))
            .unwrap()
            .as_ref()
            .map(format_oid)
    }

    fn bcas(store: &InMemoryCommitStore, source: &str, target: &str) -> Vec<String> {
        let mut found = names(
            &BCAFinder::new(|oid: &ObjectId| store.load(oid))
                .find_best_common_ancestors(&create_oid(source), &create_oid(target))
                .unwrap(),
        );
        found.sort();
        found
    }

    /// A <- B <- C <- D
    #[fixture]
    fn linear_history() -> InMemoryCommitStore {
        let mut store = InMemoryCommitStore::new();
        store.add_commit("A", &[]);
        store.add_commit("B", &["A"]);
        store.add_commit("C", &["B"]);
        store.add_commit("D", &["C"]);
        store
    }

    /// ```text
    ///     A
    ///    / \
    ///   B   C
    ///    \ /
    ///     D
    /// ```
    #[fixture]
    fn simple_merge() -> InMemoryCommitStore {
        let mut store = InMemoryCommitStore::new();
        store.add_commit("A", &[]);
        store.add_commit("B", &["A"]);
        store.add_commit("C", &["A"]);
        store.add_commit("D", &["B", "C"]);
        store
    }

    /// ```text
    ///     A
    ///    / \
    ///   B   C
    ///   |\ /|
    ///   | X |
    ///   |/ \|
    ///   D   E
    ///   |   |
    ///   F   G
    /// ```
    #[fixture]
    fn criss_cross_merge() -> InMemoryCommitStore {
        let mut store = InMemoryCommitStore::new();
        store.add_commit("A", &[]);
        store.add_commit("B", &["A"]);
        store.add_commit("C", &["A"]);
        store.add_commit("D", &["B", "C"]);
        store.add_commit("E", &["C", "B"]);
        store.add_commit("F", &["D"]);
        store.add_commit("G", &["E"]);
        store
    }

    #[rstest]
    #[case("B", "D", Some("B"))]
    #[case("D", "B", Some("B"))]
    #[case("C", "C", Some("C"))]
    fn linear_history_meets_at_the_older_commit(
        linear_history: InMemoryCommitStore,
        #[case] source: &str,
        #[case] target: &str,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(bca(&linear_history, source, target).as_deref(), expected);
    }

    #[rstest]
    fn branches_meet_at_the_fork(simple_merge: InMemoryCommitStore) {
        assert_eq!(bca(&simple_merge, "B", "C").as_deref(), Some("A"));
        assert_eq!(bca(&simple_merge, "D", "C").as_deref(), Some("C"));
    }

    #[rstest]
    fn criss_cross_has_two_best_ancestors(criss_cross_merge: InMemoryCommitStore) {
        assert_eq!(bcas(&criss_cross_merge, "F", "G"), vec!["B", "C"]);
    }

    #[rstest]
    fn unrelated_histories_have_none() {
        let mut store = InMemoryCommitStore::new();
        store.add_commit("A", &[]);
        store.add_commit("X", &[]);

        assert_eq!(bca(&store, "A", "X"), None);
    }

    #[rstest]
    fn skewed_clocks_do_not_leak_redundant_ancestors() {
        // B is older than its parent A according to the committer clock
        let mut store = InMemoryCommitStore::new();
        store.add_commit_at("A", &[], 500);
        store.add_commit_at("B", &["A"], 100);
        store.add_commit_at("C", &["B"], 600);
        store.add_commit_at("D", &["B"], 700);

        assert_eq!(bcas(&store, "C", "D"), vec!["B"]);
    }

    #[rstest]
    fn descendant_checks_follow_every_parent(simple_merge: InMemoryCommitStore) {
        let finder = BCAFinder::new(|oid: &ObjectId| simple_merge.load(oid));

        assert!(finder.is_descendant_of(&create_oid("D"), &create_oid("C")).unwrap());
        assert!(finder.is_descendant_of(&create_oid("D"), &create_oid("A")).unwrap());
        assert!(!finder.is_descendant_of(&create_oid("B"), &create_oid("C")).unwrap());
        assert!(!finder.is_descendant_of(&create_oid("D"), &create_oid("D")).unwrap());
    }

    #[rstest]
    fn missing_commits_propagate(simple_merge: InMemoryCommitStore) {
        let finder = BCAFinder::new(|oid: &ObjectId| simple_merge.load(oid));

        assert!(matches!(
            finder.find_best_common_ancestor(&create_oid("B"), &create_oid("Z")),
            Err(Error::NotFound(_))
        ));
    }

    /// Every commit reachable from `start`, itself included
    fn ancestors(dag: &[Vec<usize>], start: usize) -> BTreeSet<usize> {
        let mut seen = BTreeSet::from([start]);
        let mut pending = vec![start];
        while let Some(index) = pending.pop() {
            for &parent in &dag[index] {
                if seen.insert(parent) {
                    pending.push(parent);
                }
            }
        }
        seen
    }

    fn dag_with_pair() -> impl Strategy<Value = (Vec<Vec<usize>>, usize, usize)> {
        dag_strategy(14).prop_flat_map(|dag| {
            let count = dag.len();
            (Just(dag), 0..count, 0..count)
        })
    }

    proptest! {
        #[test]
        fn best_common_ancestors_match_brute_force((dag, one, two) in dag_with_pair()) {
            let mut store = InMemoryCommitStore::new();
            let label = |index: usize| format!("n{index}");
            for (index, parents) in dag.iter().enumerate() {
                let parents = parents.iter().map(|&parent| label(parent)).collect::<Vec<_>>();
                let parents = parents.iter().map(String::as_str).collect::<Vec<_>>();
                store.add_commit(&label(index), &parents);
            }

            let common = ancestors(&dag, one)
                .intersection(&ancestors(&dag, two))
                .copied()
                .collect::<BTreeSet<_>>();
            let expected = common
                .iter()
                .filter(|&&candidate| {
                    !common
                        .iter()
                        .any(|&other| other != candidate && ancestors(&dag, other).contains(&candidate))
                })
                .map(|&index| label(index))
                .collect::<BTreeSet<_>>();

            let found = bcas(&store, &label(one), &label(two))
                .into_iter()
                .collect::<BTreeSet<_>>();
            prop_assert_eq!(found, expected);
        }
    }
}
