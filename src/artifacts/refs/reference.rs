//! Reference values
//!
//! ## File Format
//!
//! Loose reference files hold a single line, either:
//! - a 40-character object id (direct reference)
//! - `ref: <name>` (symbolic reference)

use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::refs::SYMREF_PREFIX;
use crate::artifacts::refs::ref_name::RefName;
use crate::errors::{Error, Result};
use derive_new::new;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefTarget {
    Direct(ObjectId),
    Symbolic(RefName),
}

impl RefTarget {
    /// Parse the content of a loose reference file
    pub fn parse(name: &RefName, content: &str) -> Result<Self> {
        let content = content.trim_end_matches(['\n', '\r']);

        if let Some(target) = content.strip_prefix(SYMREF_PREFIX) {
            let target = RefName::try_parse(target.trim()).map_err(|_| {
                Error::corrupt(format!("reference {name}: invalid symbolic target '{target}'"))
            })?;
            return Ok(RefTarget::Symbolic(target));
        }

        ObjectId::try_parse(content)
            .map(RefTarget::Direct)
            .map_err(|_| Error::corrupt(format!("reference {name}: invalid target '{content}'")))
    }

    /// Loose reference file content, newline terminated
    pub fn to_content(&self) -> String {
        match self {
            RefTarget::Direct(oid) => format!("{oid}\n"),
            RefTarget::Symbolic(target) => format!("{SYMREF_PREFIX}{target}\n"),
        }
    }
}

impl From<ObjectId> for RefTarget {
    fn from(oid: ObjectId) -> Self {
        RefTarget::Direct(oid)
    }
}

impl From<RefName> for RefTarget {
    fn from(name: RefName) -> Self {
        RefTarget::Symbolic(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Reference {
    name: RefName,
    target: RefTarget,
}

impl Reference {
    pub fn name(&self) -> &RefName {
        &self.name
    }

    pub fn target(&self) -> &RefTarget {
        &self.target
    }

    /// Object id of a direct reference
    pub fn oid(&self) -> Option<&ObjectId> {
        match &self.target {
            RefTarget::Direct(oid) => Some(oid),
            RefTarget::Symbolic(_) => None,
        }
    }

    /// Target name of a symbolic reference
    pub fn symbolic_target(&self) -> Option<&RefName> {
        match &self.target {
            RefTarget::Symbolic(name) => Some(name),
            RefTarget::Direct(_) => None,
        }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self.target, RefTarget::Symbolic(_))
    }
}
