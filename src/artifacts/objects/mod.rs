//! Git object types and their canonical codec
//!
//! Git stores all content as objects identified by SHA-1 hashes. There are four types:
//!
//! - **Blob**: File content (raw bytes)
//! - **Tree**: Directory listing (names, modes, and object IDs)
//! - **Commit**: Snapshot with metadata (author, message, parent commits, tree)
//! - **Tag**: Annotated, signed-off pointer to another object
//!
//! Each type encodes a canonical body; the object id is the SHA-1 of
//! `<type> <size>\0<body>`.

pub mod blob;
pub mod codec;
pub mod commit;
pub mod entry_mode;
pub mod object;
pub mod object_id;
pub mod object_type;
pub mod signature;
pub mod tag;
pub mod tree;

/// Length of a SHA-1 hash in hexadecimal format
pub const OBJECT_ID_LENGTH: usize = 40;

/// Length of a SHA-1 hash in raw bytes
pub const OBJECT_ID_RAW_LENGTH: usize = 20;
