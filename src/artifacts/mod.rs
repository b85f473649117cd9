//! Git data structures and algorithms
//!
//! This module contains the core Git types and algorithms:
//!
//! - `config`: git-config keys and file parsing
//! - `database`: Storage backends (loose, packed, in-memory) and delta decoding
//! - `index`: Index file entries and their on-disk encoding
//! - `log`: Revision graph walking
//! - `merge`: Best common ancestor search
//! - `objects`: Git object types (blob, tree, commit, tag) and their codec
//! - `refs`: Reference names, targets and the packed-refs file

pub mod config;
pub mod database;
pub mod index;
pub mod log;
pub mod merge;
pub mod objects;
pub mod refs;
