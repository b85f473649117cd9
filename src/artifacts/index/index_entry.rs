//! Index entry representation
//!
//! Each entry records a staged path with its mode, content id, merge stage
//! and the stat data git uses for fast change detection.
//!
//! ## Entry Format
//!
//! Ten 32-bit stat fields, the 20-byte object id, 16-bit flags (stage in bits
//! 12-13, path length in the low 12 bits), then the path. The entry is padded
//! with 1 to 8 NUL bytes to an 8-byte boundary.

use crate::artifacts::index::MAX_STAGE;
use crate::artifacts::objects::entry_mode::EntryMode;
use crate::artifacts::objects::object::{Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{Error, Result};
use byteorder::{ByteOrder, NetworkEndian, WriteBytesExt};
use bytes::Bytes;
use std::cmp::min;

/// Largest path length the flags field can carry
const MAX_PATH_SIZE: usize = 0xFFF;

/// Block size for entry alignment (8 bytes)
pub const ENTRY_BLOCK: usize = 8;

/// Minimum size of an index entry in bytes
pub const ENTRY_MIN_SIZE: usize = 64;

/// Offset of the path inside a serialized entry
const PATH_OFFSET: usize = 62;

/// Stat data stored alongside each entry
///
/// Values are truncated to 32 bits on disk, as git does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryStat {
    pub ctime: i64,
    pub ctime_nsec: i64,
    pub mtime: i64,
    pub mtime_nsec: i64,
    pub dev: u64,
    pub ino: u64,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
}

impl EntryStat {
    #[cfg(unix)]
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            ctime: metadata.ctime(),
            ctime_nsec: metadata.ctime_nsec(),
            mtime: metadata.mtime(),
            mtime_nsec: metadata.mtime_nsec(),
            dev: metadata.dev(),
            ino: metadata.ino(),
            uid: metadata.uid(),
            gid: metadata.gid(),
            size: metadata.size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    path: String,
    mode: EntryMode,
    oid: ObjectId,
    stage: u8,
    stat: EntryStat,
}

impl IndexEntry {
    /// A stage-0 entry with empty stat data
    ///
    /// Paths are `/`-separated, relative, and may not contain empty, `.` or
    /// `..` components. Directories cannot be staged.
    pub fn new(path: impl Into<String>, mode: EntryMode, oid: ObjectId) -> Result<Self> {
        let path = path.into();
        validate_path(&path)?;

        if mode.is_tree() {
            return Err(Error::invalid(format!(
                "index entry '{path}' cannot have directory mode"
            )));
        }

        Ok(Self {
            path,
            mode,
            oid,
            stage: 0,
            stat: EntryStat::default(),
        })
    }

    pub fn with_stage(mut self, stage: u8) -> Result<Self> {
        if stage > MAX_STAGE {
            return Err(Error::invalid(format!("merge stage {stage} is out of range")));
        }
        self.stage = stage;
        Ok(self)
    }

    pub fn with_stat(mut self, stat: EntryStat) -> Self {
        self.stat = stat;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mode(&self) -> EntryMode {
        self.mode
    }

    pub fn oid(&self) -> &ObjectId {
        &self.oid
    }

    pub fn stage(&self) -> u8 {
        self.stage
    }

    pub fn stat(&self) -> &EntryStat {
        &self.stat
    }

    pub fn basename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Every ancestor directory, outermost first
    pub fn parent_dirs(&self) -> Vec<&str> {
        self.path
            .match_indices('/')
            .map(|(position, _)| &self.path[..position])
            .collect()
    }

    fn flags(&self) -> u16 {
        (u16::from(self.stage) << 12) | min(self.path.len(), MAX_PATH_SIZE) as u16
    }
}

fn validate_path(path: &str) -> Result<()> {
    let malformed = path.is_empty()
        || path.contains('\0')
        || path
            .split('/')
            .any(|component| component.is_empty() || component == "." || component == "..");

    if malformed {
        return Err(Error::invalid(format!("invalid index path '{path}'")));
    }
    Ok(())
}

impl Packable for IndexEntry {
    fn serialize(&self) -> Bytes {
        let mut entry_bytes = Vec::with_capacity(ENTRY_MIN_SIZE + self.path.len());

        // Vec<u8> writes cannot fail
        for field in [
            self.stat.ctime as u32,
            self.stat.ctime_nsec as u32,
            self.stat.mtime as u32,
            self.stat.mtime_nsec as u32,
            self.stat.dev as u32,
            self.stat.ino as u32,
            self.mode.as_u32(),
            self.stat.uid,
            self.stat.gid,
            self.stat.size as u32,
        ] {
            entry_bytes.write_u32::<NetworkEndian>(field).ok();
        }
        entry_bytes.extend_from_slice(self.oid.as_bytes());
        entry_bytes.write_u16::<NetworkEndian>(self.flags()).ok();
        entry_bytes.extend_from_slice(self.path.as_bytes());

        // There must be at least one NUL at the end
        entry_bytes.push(0);
        while entry_bytes.len() % ENTRY_BLOCK != 0 {
            entry_bytes.push(0);
        }

        Bytes::from(entry_bytes)
    }
}

impl Unpackable for IndexEntry {
    fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ENTRY_MIN_SIZE {
            return Err(Error::corrupt("index: entry too short"));
        }

        let word = |index: usize| NetworkEndian::read_u32(&bytes[index * 4..index * 4 + 4]);
        let stat = EntryStat {
            ctime: i64::from(word(0)),
            ctime_nsec: i64::from(word(1)),
            mtime: i64::from(word(2)),
            mtime_nsec: i64::from(word(3)),
            dev: u64::from(word(4)),
            ino: u64::from(word(5)),
            uid: word(7),
            gid: word(8),
            size: u64::from(word(9)),
        };
        let mode = EntryMode::try_from(word(6))?;
        let oid = ObjectId::from_slice(&bytes[40..60])?;
        let flags = NetworkEndian::read_u16(&bytes[60..PATH_OFFSET]);

        let name_end = bytes[PATH_OFFSET..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::corrupt("index: missing NUL terminator in entry path"))?;
        let path = std::str::from_utf8(&bytes[PATH_OFFSET..PATH_OFFSET + name_end])
            .map_err(|_| Error::corrupt("index: entry path is not valid UTF-8"))?;

        let stage = ((flags >> 12) & 0x3) as u8;
        let entry = IndexEntry::new(path, mode, oid)
            .and_then(|entry| entry.with_stage(stage))
            .map_err(|e| Error::corrupt(format!("index: {e}")))?;

        Ok(entry.with_stat(stat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn oid() -> ObjectId {
        ObjectId::try_parse("b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0").unwrap()
    }

    #[rstest]
    fn parent_dirs_are_listed_outermost_first(oid: ObjectId) {
        let entry = IndexEntry::new("a/b/c", EntryMode::REGULAR, oid).unwrap();

        assert_eq!(entry.parent_dirs(), vec!["a", "a/b"]);
        assert_eq!(entry.basename(), "c");
    }

    #[rstest]
    fn top_level_entries_have_no_parents(oid: ObjectId) {
        let entry = IndexEntry::new("a", EntryMode::REGULAR, oid).unwrap();
        assert_eq!(entry.parent_dirs(), Vec::<&str>::new());
    }

    #[rstest]
    #[case("")]
    #[case("/abs")]
    #[case("trailing/")]
    #[case("a//b")]
    #[case("a/./b")]
    #[case("../escape")]
    fn malformed_paths_are_rejected(oid: ObjectId, #[case] path: &str) {
        assert!(matches!(
            IndexEntry::new(path, EntryMode::REGULAR, oid),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[rstest]
    fn stages_above_three_are_rejected(oid: ObjectId) {
        let entry = IndexEntry::new("file", EntryMode::REGULAR, oid).unwrap();
        assert!(entry.clone().with_stage(3).is_ok());
        assert!(matches!(entry.with_stage(4), Err(Error::InvalidArgument(_))));
    }

    #[rstest]
    #[case("a")]
    #[case("abcdef")]
    #[case("dir/seven")]
    fn entries_are_padded_to_eight_bytes(oid: ObjectId, #[case] path: &str) {
        let bytes = IndexEntry::new(path, EntryMode::REGULAR, oid).unwrap().serialize();

        assert_eq!(bytes.len() % ENTRY_BLOCK, 0);
        assert!(bytes.len() > PATH_OFFSET + path.len());
        assert_eq!(bytes[bytes.len() - 1], 0);
    }

    #[rstest]
    fn flags_carry_stage_and_path_length(oid: ObjectId) {
        let entry = IndexEntry::new("conflicted", EntryMode::EXECUTABLE, oid)
            .unwrap()
            .with_stage(2)
            .unwrap()
            .with_stat(EntryStat {
                mtime: 1_700_000_000,
                size: 12,
                ..Default::default()
            });
        let bytes = entry.serialize();

        assert_eq!(NetworkEndian::read_u16(&bytes[60..62]), 0x2000 | 10);
        assert_eq!(IndexEntry::deserialize(&bytes).unwrap(), entry);
    }
}
