//! The `packed-refs` file
//!
//! ## Format
//!
//! ```text
//! # pack-refs with: peeled fully-peeled sorted
//! <oid> <refname>
//! ^<peeled oid>
//! ```
//!
//! A `^` line records what the annotated tag on the preceding line peels to.

use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::refs::ref_name::RefName;
use crate::errors::{Error, Result};
use std::collections::BTreeMap;

pub const PACKED_REFS_HEADER: &str = "# pack-refs with: peeled fully-peeled sorted ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedRef {
    pub oid: ObjectId,
    pub peeled: Option<ObjectId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackedRefs {
    entries: BTreeMap<RefName, PackedRef>,
}

impl PackedRefs {
    pub fn parse(content: &str) -> Result<Self> {
        let mut entries: BTreeMap<RefName, PackedRef> = BTreeMap::new();
        let mut last: Option<RefName> = None;

        for (number, line) in content.lines().enumerate() {
            let corrupt = |what: &str| Error::corrupt(format!("packed-refs line {}: {what}", number + 1));

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(peeled) = line.strip_prefix('^') {
                let peeled = ObjectId::try_parse(peeled).map_err(|_| corrupt("invalid peeled id"))?;
                let entry = last
                    .as_ref()
                    .and_then(|name| entries.get_mut(name))
                    .ok_or_else(|| corrupt("peeled id without a reference"))?;
                entry.peeled = Some(peeled);
                continue;
            }

            let (oid, name) = line
                .split_once(' ')
                .ok_or_else(|| corrupt("expected '<oid> <name>'"))?;
            let oid = ObjectId::try_parse(oid).map_err(|_| corrupt("invalid object id"))?;
            let name = RefName::try_parse(name).map_err(|_| corrupt("invalid reference name"))?;

            entries.insert(name.clone(), PackedRef { oid, peeled: None });
            last = Some(name);
        }

        Ok(Self { entries })
    }

    pub fn serialize(&self) -> String {
        let mut content = format!("{PACKED_REFS_HEADER}\n");
        for (name, entry) in &self.entries {
            content.push_str(&format!("{} {name}\n", entry.oid));
            if let Some(peeled) = entry.peeled {
                content.push_str(&format!("^{peeled}\n"));
            }
        }

        content
    }

    pub fn get(&self, name: &RefName) -> Option<&PackedRef> {
        self.entries.get(name)
    }

    pub fn insert(&mut self, name: RefName, entry: PackedRef) {
        self.entries.insert(name, entry);
    }

    pub fn remove(&mut self, name: &RefName) -> Option<PackedRef> {
        self.entries.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &RefName> {
        self.entries.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
