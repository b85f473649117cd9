//! Stateful parts of a repository
//!
//! - `database`: Object database over a chain of storage backends
//! - `index`: Staging area (index/cache) the next tree is built from
//! - `refs`: Reference management (branches, tags, HEAD, packed-refs)
//! - `config`: Layered configuration store (system, global, local)
//! - `repository`: The handle owning all of the above

pub mod config;
pub mod database;
pub mod index;
pub mod refs;
pub mod repository;
