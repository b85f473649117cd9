//! Git-style content-addressable object store and revision graph engine
//!
//! The crate is split the same way a repository is:
//!
//! - `areas`: the stateful parts a repository owns (object database,
//!   references, index, configuration) and the [`Repository`] handle
//! - `artifacts`: the values and algorithms those areas work with (objects and
//!   their codec, storage backends, index entries, reference names, config
//!   files, the revision walker and merge-base search)
//! - `errors`: the error kinds every operation reports

pub mod areas;
pub mod artifacts;
pub mod errors;

#[cfg(test)]
mod test_support;

pub use areas::repository::{Repository, RepositoryOptions};
pub use errors::{Error, Result};
