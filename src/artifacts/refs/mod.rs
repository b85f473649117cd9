//! Reference values and their on-disk formats
//!
//! - `ref_name`: validated reference names
//! - `reference`: direct and symbolic reference targets, loose file format
//! - `packed_refs`: the `packed-refs` file

pub mod packed_refs;
pub mod ref_name;
pub mod reference;

/// Names that git's check-ref-format rejects anywhere in a reference name
pub const INVALID_REF_NAME_REGEX: &str =
    r"^\.|\/\.|\.\.|^\/|\/$|\.lock$|@\{|[\x00-\x20\*:\?\[\\~\^\x7f]|^@$|\/\/";

/// Name of the HEAD reference
pub const HEAD_REF_NAME: &str = "HEAD";

/// Symbolic references followed before a lookup gives up
pub const MAX_SYMBOLIC_HOPS: usize = 5;

pub const SYMREF_PREFIX: &str = "ref: ";
pub const REFS_PREFIX: &str = "refs/";
pub const HEADS_PREFIX: &str = "refs/heads/";
pub const TAGS_PREFIX: &str = "refs/tags/";
