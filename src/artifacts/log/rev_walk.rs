//! Revision graph walker
//!
//! A [`RevWalk`] collects start commits (`push`) and excluded commits
//! (`hide`), then yields every commit reachable from a start but not from a
//! hidden commit, each exactly once.
//!
//! ## Strategies
//!
//! - `NONE` and `TIME` walk lazily: commits are loaded only as the frontier
//!   reaches them. `NONE` is breadth-first discovery order, `TIME` keeps the
//!   frontier in a heap ordered by committer time.
//! - `TOPOLOGICAL` (with or without `TIME`) first limits the walk to the whole
//!   reachable set, then emits it with Kahn's algorithm so that every commit
//!   comes after all of its children.
//! - `REVERSE` buffers the sequence of the selected order and reverses it.
//!
//! Ties always fall back to the order in which commits entered the frontier.
//! Parent cycles are reported as corruption instead of looping.

use crate::artifacts::log::Sort;
use crate::artifacts::objects::commit::SlimCommit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{Error, Result};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

/// Walker configuration over a commit loader
///
/// The loader returns the parents and committer time of a commit. It reports a
/// missing commit as `Error::NotFound` and an object of another type as
/// `Error::TypeMismatch`.
pub struct RevWalk<CommitLoaderFn>
where
    CommitLoaderFn: Fn(&ObjectId) -> Result<SlimCommit>,
{
    commit_loader: CommitLoaderFn,
    pushed: Vec<ObjectId>,
    hidden: Vec<ObjectId>,
    sorting: Sort,
    first_parent_only: bool,
}

impl<CommitLoaderFn> RevWalk<CommitLoaderFn>
where
    CommitLoaderFn: Fn(&ObjectId) -> Result<SlimCommit>,
{
    pub fn new(commit_loader: CommitLoaderFn) -> Self {
        Self {
            commit_loader,
            pushed: Vec::new(),
            hidden: Vec::new(),
            sorting: Sort::NONE,
            first_parent_only: false,
        }
    }

    /// Add a start commit
    pub fn push(&mut self, oid: ObjectId) -> Result<&mut Self> {
        (self.commit_loader)(&oid).map_err(|e| tip_error(e, &oid))?;
        if !self.pushed.contains(&oid) {
            self.pushed.push(oid);
        }
        Ok(self)
    }

    /// Exclude a commit and all of its ancestors
    pub fn hide(&mut self, oid: ObjectId) -> Result<&mut Self> {
        (self.commit_loader)(&oid).map_err(|e| tip_error(e, &oid))?;
        if !self.hidden.contains(&oid) {
            self.hidden.push(oid);
        }
        Ok(self)
    }

    pub fn sorting(&mut self, sorting: Sort) -> &mut Self {
        self.sorting = sorting;
        self
    }

    /// Follow only the first parent of every commit
    pub fn simplify_first_parent(&mut self) -> &mut Self {
        self.first_parent_only = true;
        self
    }

    /// Forget pushed and hidden commits and restore the default options
    pub fn reset(&mut self) -> &mut Self {
        self.pushed.clear();
        self.hidden.clear();
        self.sorting = Sort::NONE;
        self.first_parent_only = false;
        self
    }

    /// Start a traversal over the current configuration
    ///
    /// Later changes to the walker do not affect a walk already started.
    pub fn walk(&self) -> Walk<'_, CommitLoaderFn> {
        tracing::debug!(
            starts = self.pushed.len(),
            hidden = self.hidden.len(),
            sorting = ?self.sorting,
            first_parent = self.first_parent_only,
            "starting revision walk"
        );

        Walk {
            commits: CommitCache::new(&self.commit_loader),
            starts: self.pushed.clone(),
            hidden_tips: self.hidden.clone(),
            sorting: self.sorting,
            first_parent_only: self.first_parent_only,
            state: WalkState::Pending,
        }
    }
}

/// A missing or non-commit tip is a lookup miss from the caller's view
fn tip_error(error: Error, oid: &ObjectId) -> Error {
    match error {
        Error::TypeMismatch { .. } => Error::not_found(format!("commit {oid}")),
        other => other,
    }
}

/// A parent that is not a commit means the history itself is damaged
fn parent_error(error: Error, oid: &ObjectId) -> Error {
    match error {
        Error::TypeMismatch { actual, .. } => {
            Error::corrupt(format!("parent {oid} is a {actual}, not a commit"))
        }
        other => other,
    }
}

struct CommitCache<'w, CommitLoaderFn> {
    commit_loader: &'w CommitLoaderFn,
    commits: HashMap<ObjectId, SlimCommit>,
}

impl<'w, CommitLoaderFn> CommitCache<'w, CommitLoaderFn>
where
    CommitLoaderFn: Fn(&ObjectId) -> Result<SlimCommit>,
{
    fn new(commit_loader: &'w CommitLoaderFn) -> Self {
        Self {
            commit_loader,
            commits: HashMap::new(),
        }
    }

    fn load(&mut self, oid: &ObjectId) -> Result<&SlimCommit> {
        if !self.commits.contains_key(oid) {
            let commit = (self.commit_loader)(oid)?;
            self.commits.insert(*oid, commit);
        }

        self.commits
            .get(oid)
            .ok_or_else(|| Error::not_found(format!("commit {oid}")))
    }

    /// Parents of a commit the walk follows, without repeats
    fn parents(&mut self, oid: &ObjectId, first_parent_only: bool) -> Result<Vec<ObjectId>> {
        let commit = self.load(oid)?;
        let limit = if first_parent_only { 1 } else { usize::MAX };

        let mut parents = Vec::with_capacity(commit.parents.len().min(limit));
        for parent in commit.parents.iter().take(limit) {
            if !parents.contains(parent) {
                parents.push(*parent);
            }
        }
        Ok(parents)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct DatedCommit {
    timestamp: i64,
    sequence: Reverse<u64>,
    oid: ObjectId,
}

/// Commits waiting to be emitted
enum ReadyQueue {
    Fifo(VecDeque<ObjectId>),
    ByDate {
        heap: BinaryHeap<DatedCommit>,
        sequence: u64,
    },
}

impl ReadyQueue {
    fn new(by_date: bool) -> Self {
        if by_date {
            ReadyQueue::ByDate {
                heap: BinaryHeap::new(),
                sequence: 0,
            }
        } else {
            ReadyQueue::Fifo(VecDeque::new())
        }
    }

    fn push(&mut self, commit: &SlimCommit) {
        match self {
            ReadyQueue::Fifo(queue) => queue.push_back(commit.oid),
            ReadyQueue::ByDate { heap, sequence } => {
                heap.push(DatedCommit {
                    timestamp: commit.timestamp,
                    sequence: Reverse(*sequence),
                    oid: commit.oid,
                });
                *sequence += 1;
            }
        }
    }

    fn pop(&mut self) -> Option<ObjectId> {
        match self {
            ReadyQueue::Fifo(queue) => queue.pop_front(),
            ReadyQueue::ByDate { heap, .. } => heap.pop().map(|entry| entry.oid),
        }
    }
}

struct Frontier {
    ready: ReadyQueue,
    seen: HashSet<ObjectId>,
    emitted: HashSet<ObjectId>,
    hidden: HashSet<ObjectId>,
}

enum WalkState {
    Pending,
    Lazy(Frontier),
    Buffered(std::vec::IntoIter<ObjectId>),
    Done,
}

/// One traversal, yielding commit ids in the configured order
pub struct Walk<'w, CommitLoaderFn> {
    commits: CommitCache<'w, CommitLoaderFn>,
    starts: Vec<ObjectId>,
    hidden_tips: Vec<ObjectId>,
    sorting: Sort,
    first_parent_only: bool,
    state: WalkState,
}

impl<CommitLoaderFn> Walk<'_, CommitLoaderFn>
where
    CommitLoaderFn: Fn(&ObjectId) -> Result<SlimCommit>,
{
    fn prepare(&mut self) -> Result<WalkState> {
        let hidden = self.hidden_ancestry()?;

        if self.sorting.contains(Sort::TOPOLOGICAL) {
            let mut sequence = self.topological(hidden)?;
            if self.sorting.contains(Sort::REVERSE) {
                sequence.reverse();
            }
            return Ok(WalkState::Buffered(sequence.into_iter()));
        }

        let mut frontier = Frontier {
            ready: ReadyQueue::new(self.sorting.contains(Sort::TIME)),
            seen: HashSet::new(),
            emitted: HashSet::new(),
            hidden,
        };
        for start in self.starts.clone() {
            if frontier.hidden.contains(&start) || !frontier.seen.insert(start) {
                continue;
            }
            let commit = self.commits.load(&start).map_err(|e| tip_error(e, &start))?;
            frontier.ready.push(commit);
        }

        if self.sorting.contains(Sort::REVERSE) {
            let mut sequence = Vec::new();
            while let Some(oid) = self.next_lazy(&mut frontier)? {
                sequence.push(oid);
            }
            sequence.reverse();
            return Ok(WalkState::Buffered(sequence.into_iter()));
        }

        Ok(WalkState::Lazy(frontier))
    }

    /// Every commit reachable from a hidden tip, across all parents
    fn hidden_ancestry(&mut self) -> Result<HashSet<ObjectId>> {
        let mut hidden = HashSet::new();
        let mut queue = VecDeque::new();

        for tip in &self.hidden_tips {
            self.commits.load(tip).map_err(|e| tip_error(e, tip))?;
            if hidden.insert(*tip) {
                queue.push_back(*tip);
            }
        }
        while let Some(oid) = queue.pop_front() {
            for parent in self.commits.parents(&oid, false)? {
                self.commits
                    .load(&parent)
                    .map_err(|e| parent_error(e, &parent))?;
                if hidden.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }

        Ok(hidden)
    }

    fn next_lazy(&mut self, frontier: &mut Frontier) -> Result<Option<ObjectId>> {
        let Some(oid) = frontier.ready.pop() else {
            return Ok(None);
        };
        frontier.emitted.insert(oid);

        for parent in self.commits.parents(&oid, self.first_parent_only)? {
            if frontier.hidden.contains(&parent) {
                continue;
            }
            if frontier.emitted.contains(&parent) && self.reaches(&parent, &oid, &frontier.seen)? {
                return Err(Error::corrupt(format!(
                    "commit graph has a cycle through {oid} and {parent}"
                )));
            }
            if frontier.seen.insert(parent) {
                let commit = self
                    .commits
                    .load(&parent)
                    .map_err(|e| parent_error(e, &parent))?;
                frontier.ready.push(commit);
            }
        }

        Ok(Some(oid))
    }

    /// Whether `target` is an ancestor of `from`, looking only at discovered commits
    fn reaches(&mut self, from: &ObjectId, target: &ObjectId, seen: &HashSet<ObjectId>) -> Result<bool> {
        let mut visited = HashSet::from([*from]);
        let mut stack = vec![*from];

        while let Some(oid) = stack.pop() {
            if oid == *target {
                return Ok(true);
            }
            for parent in self.commits.parents(&oid, self.first_parent_only)? {
                if seen.contains(&parent) && visited.insert(parent) {
                    stack.push(parent);
                }
            }
        }

        Ok(false)
    }

    /// Emit the whole reachable set children-first
    fn topological(&mut self, hidden: HashSet<ObjectId>) -> Result<Vec<ObjectId>> {
        // limit: collect everything reachable that is not hidden
        let mut members = Vec::new();
        let mut member_set = HashSet::new();
        let mut queue = VecDeque::new();
        for start in &self.starts {
            if !hidden.contains(start) && member_set.insert(*start) {
                self.commits.load(start).map_err(|e| tip_error(e, start))?;
                queue.push_back(*start);
            }
        }
        while let Some(oid) = queue.pop_front() {
            members.push(oid);
            for parent in self.commits.parents(&oid, self.first_parent_only)? {
                if !hidden.contains(&parent) && member_set.insert(parent) {
                    self.commits
                        .load(&parent)
                        .map_err(|e| parent_error(e, &parent))?;
                    queue.push_back(parent);
                }
            }
        }

        let mut child_counts: HashMap<ObjectId, usize> = HashMap::new();
        for oid in &members {
            for parent in self.commits.parents(oid, self.first_parent_only)? {
                if member_set.contains(&parent) {
                    *child_counts.entry(parent).or_default() += 1;
                }
            }
        }

        let mut ready = ReadyQueue::new(self.sorting.contains(Sort::TIME));
        for start in &self.starts {
            if member_set.contains(start) && !child_counts.contains_key(start) {
                ready.push(self.commits.load(start)?);
            }
        }

        let mut sequence = Vec::with_capacity(members.len());
        while let Some(oid) = ready.pop() {
            sequence.push(oid);
            for parent in self.commits.parents(&oid, self.first_parent_only)? {
                let Some(count) = child_counts.get_mut(&parent) else {
                    continue;
                };
                *count -= 1;
                if *count == 0 {
                    child_counts.remove(&parent);
                    ready.push(self.commits.load(&parent)?);
                }
            }
        }

        if sequence.len() < members.len() {
            return Err(Error::corrupt(format!(
                "commit graph has a cycle: {} commits never became ready",
                members.len() - sequence.len()
            )));
        }

        Ok(sequence)
    }

    fn advance(&mut self) -> Result<Option<ObjectId>> {
        loop {
            match std::mem::replace(&mut self.state, WalkState::Done) {
                WalkState::Pending => self.state = self.prepare()?,
                WalkState::Lazy(mut frontier) => {
                    let next = self.next_lazy(&mut frontier)?;
                    if next.is_some() {
                        self.state = WalkState::Lazy(frontier);
                    }
                    return Ok(next);
                }
                WalkState::Buffered(mut sequence) => {
                    let next = sequence.next();
                    if next.is_some() {
                        self.state = WalkState::Buffered(sequence);
                    }
                    return Ok(next);
                }
                WalkState::Done => return Ok(None),
            }
        }
    }
}

impl<CommitLoaderFn> Iterator for Walk<'_, CommitLoaderFn>
where
    CommitLoaderFn: Fn(&ObjectId) -> Result<SlimCommit>,
{
    type Item = Result<ObjectId>;

    fn next(&mut self) -> Option<Self::Item> {
        // an error ends the walk: the state stays `Done`
        self.advance().transpose()
    }
}
