//! Git index file format
//!
//! The index (also called staging area or cache) records the content the next
//! commit's tree is built from.
//!
//! ## File Format (Version 2)
//!
//! ```text
//! Header (12 bytes):
//!   - Signature: "DIRC" (4 bytes)
//!   - Version: 2 (4 bytes)
//!   - Entry count (4 bytes)
//!
//! Entries (variable length):
//!   - Each entry padded with 1 to 8 NUL bytes to 8-byte alignment
//!   - Stat data, mode, object id, flags (stage and name length), path
//!
//! Extensions (optional):
//!   - 4-byte signature, u32 length, payload
//!
//! Checksum (20 bytes):
//!   - SHA-1 hash of all preceding bytes
//! ```

pub mod checksum;
pub mod index_entry;
pub mod index_header;

/// Size of SHA-1 checksum in bytes
pub const CHECKSUM_SIZE: usize = 20;

/// Size of index header in bytes
pub const HEADER_SIZE: usize = 12; // 4 bytes for marker, 4 for version, 4 for entries_count

/// Magic signature identifying index files
pub const SIGNATURE: &str = "DIRC";

/// Extension signature plus its u32 length
pub const EXTENSION_HEADER_SIZE: usize = 8;

/// Index file format version
pub const VERSION: u32 = 2;

/// Merge stages: 0 is resolved, 1 base, 2 ours, 3 theirs
pub const MAX_STAGE: u8 = 3;
