//! Helpers shared by unit tests of the codecs and graph algorithms

use crate::artifacts::objects::commit::SlimCommit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::signature::Signature;
use crate::errors::{Error, Result};
use proptest::prelude::*;
use std::collections::HashMap;

/// Start of the synthetic timeline (2022-01-01T00:00:00Z)
const EPOCH: i64 = 1_640_995_200;

/// In-memory commit graph addressed by short readable names
#[derive(Debug, Clone, Default)]
pub(crate) struct InMemoryCommitStore {
    commits: HashMap<ObjectId, SlimCommit>,
}

impl InMemoryCommitStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a commit one hour after the previously added one
    pub(crate) fn add_commit(&mut self, name: &str, parents: &[&str]) -> ObjectId {
        let timestamp = EPOCH + self.commits.len() as i64 * 3600;
        self.add_commit_at(name, parents, timestamp)
    }

    pub(crate) fn add_commit_at(&mut self, name: &str, parents: &[&str], timestamp: i64) -> ObjectId {
        let oid = create_oid(name);
        self.commits.insert(
            oid,
            SlimCommit {
                oid,
                parents: parents.iter().map(|parent| create_oid(parent)).collect(),
                timestamp,
            },
        );
        oid
    }

    pub(crate) fn load(&self, oid: &ObjectId) -> Result<SlimCommit> {
        self.commits
            .get(oid)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("commit {oid}")))
    }
}

/// Deterministic id whose hex form spells out `name`
pub(crate) fn create_oid(name: &str) -> ObjectId {
    let mut raw = [0u8; 20];
    for (slot, byte) in raw.iter_mut().zip(name.bytes()) {
        *slot = byte;
    }
    ObjectId::from_raw(raw)
}

/// Recover the readable name encoded by [`create_oid`]
pub(crate) fn format_oid(oid: &ObjectId) -> String {
    oid.as_bytes()
        .iter()
        .take_while(|&&byte| byte != 0)
        .map(|&byte| byte as char)
        .collect()
}

pub(crate) fn names(oids: &[ObjectId]) -> Vec<String> {
    oids.iter().map(format_oid).collect()
}

/// Signatures spanning pre-epoch times and the full range of whole-minute offsets
pub(crate) fn signature_strategy() -> impl Strategy<Value = Signature> {
    (
        "[A-Za-z]{1,8}( [A-Za-z]{1,8}){0,2}",
        "[a-z0-9.+-]{1,12}@[a-z]{1,8}\\.[a-z]{2,4}",
        -10_000_000_000i64..10_000_000_000i64,
        -(23 * 60 + 59)..=(23 * 60 + 59i32),
    )
        .prop_map(|(name, email, seconds, offset_minutes)| {
            Signature::from_unix(name, email, seconds, offset_minutes)
                .expect("generated signature is valid")
        })
}

/// Random DAG as parent index lists; commit `i` only points at commits `< i`
pub(crate) fn dag_strategy(max_commits: usize) -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1..=max_commits).prop_flat_map(|count| {
        (0..count)
            .map(|index| {
                if index == 0 {
                    Just(Vec::new()).boxed()
                } else {
                    prop::collection::btree_set(0..index, 0..=3.min(index))
                        .prop_map(|parents| parents.into_iter().collect::<Vec<usize>>())
                        .boxed()
                }
            })
            .collect::<Vec<_>>()
    })
}
