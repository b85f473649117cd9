//! Git commit object
//!
//! Commits represent snapshots of the repository at specific points in time.
//! They contain:
//! - A tree object ID (directory snapshot)
//! - Parent commit ID(s) (for history), first parent being the mainline
//! - Author and committer information
//! - Commit message
//!
//! ## Format
//!
//! On disk:
//! ```text
//! commit <size>\0
//! tree <tree-sha>
//! parent <parent-sha>
//! author <name> <email> <timestamp> <timezone>
//! committer <name> <email> <timestamp> <timezone>
//! [<extra-header> <value>]
//!
//! <commit message>
//! ```
//!
//! Extra headers (such as `encoding` or `gpgsig`) are kept verbatim so that
//! commits written by other tools survive a decode/encode cycle. Multi-line
//! header values continue on lines starting with a single space.

use crate::artifacts::objects::object::{Packable, Typed, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::signature::Signature;
use crate::errors::{Error, Result};
use bytes::Bytes;

/// Headers whose position is fixed by the canonical layout
const RESERVED_HEADERS: [&str; 4] = ["tree", "parent", "author", "committer"];

/// Slim representation of a commit
///
/// Contains only what graph traversal needs: identity, parent links and the
/// commit time used for date ordering.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SlimCommit {
    pub oid: ObjectId,
    pub parents: Vec<ObjectId>,
    /// Committer time, seconds since the Unix epoch
    pub timestamp: i64,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Commit {
    tree_oid: ObjectId,
    parents: Vec<ObjectId>,
    author: Signature,
    committer: Signature,
    extra_headers: Vec<(String, String)>,
    message: String,
}

impl Commit {
    pub fn new(
        tree_oid: ObjectId,
        parents: Vec<ObjectId>,
        author: Signature,
        committer: Signature,
        message: impl Into<String>,
    ) -> Self {
        Commit {
            tree_oid,
            parents,
            author,
            committer,
            extra_headers: Vec::new(),
            message: message.into(),
        }
    }

    /// Append a non-standard header, written after `committer`
    pub fn with_extra_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty()
            || key.contains([' ', '\n', '\0'])
            || RESERVED_HEADERS.contains(&key.as_str())
        {
            return Err(Error::invalid(format!("commit header name '{key}'")));
        }

        self.extra_headers.push((key, value.into()));
        Ok(self)
    }

    pub fn tree_oid(&self) -> &ObjectId {
        &self.tree_oid
    }

    pub fn parents(&self) -> &[ObjectId] {
        &self.parents
    }

    pub fn parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn author(&self) -> &Signature {
        &self.author
    }

    pub fn committer(&self) -> &Signature {
        &self.committer
    }

    pub fn extra_headers(&self) -> &[(String, String)] {
        &self.extra_headers
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// First line of the commit message
    pub fn short_message(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    /// Commit time used for date ordering
    pub fn timestamp(&self) -> i64 {
        self.committer.seconds()
    }

    pub fn to_slim(&self, oid: ObjectId) -> SlimCommit {
        SlimCommit {
            oid,
            parents: self.parents.clone(),
            timestamp: self.timestamp(),
        }
    }
}

/// Write `key value` with continuation lines for multi-line values
pub(crate) fn write_header(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push(' ');
    out.push_str(&value.replace('\n', "\n "));
    out.push('\n');
}

/// Split an encoded commit or tag into its header lines and message
///
/// Continuation lines are folded back into the preceding header value.
pub(crate) fn split_headers<'b>(body: &'b str, kind: &str) -> Result<(Vec<(&'b str, String)>, &'b str)> {
    let (header_block, message) = body
        .split_once("\n\n")
        .ok_or_else(|| Error::corrupt(format!("{kind}: missing blank line before message")))?;

    let mut headers: Vec<(&str, String)> = Vec::new();
    for line in header_block.split('\n') {
        if let Some(continuation) = line.strip_prefix(' ') {
            let (_, value) = headers
                .last_mut()
                .ok_or_else(|| Error::corrupt(format!("{kind}: continuation without header")))?;
            value.push('\n');
            value.push_str(continuation);
            continue;
        }

        let (key, value) = line
            .split_once(' ')
            .ok_or_else(|| Error::corrupt(format!("{kind}: malformed header line '{line}'")))?;
        if key.is_empty() {
            return Err(Error::corrupt(format!("{kind}: empty header name")));
        }
        headers.push((key, value.to_string()));
    }

    Ok((headers, message))
}

fn parse_oid(value: &str, field: &str) -> Result<ObjectId> {
    ObjectId::try_parse(value)
        .map_err(|_| Error::corrupt(format!("commit: invalid {field} id '{value}'")))
}

impl Packable for Commit {
    fn serialize(&self) -> Bytes {
        let mut content = String::new();

        write_header(&mut content, "tree", &self.tree_oid.to_string());
        for parent in &self.parents {
            write_header(&mut content, "parent", &parent.to_string());
        }
        write_header(&mut content, "author", &self.author.encode());
        write_header(&mut content, "committer", &self.committer.encode());
        for (key, value) in &self.extra_headers {
            write_header(&mut content, key, value);
        }
        content.push('\n');
        content.push_str(&self.message);

        Bytes::from(content)
    }
}

impl Unpackable for Commit {
    fn deserialize(body: &[u8]) -> Result<Self> {
        let body =
            std::str::from_utf8(body).map_err(|_| Error::corrupt("commit: not valid UTF-8"))?;
        let (headers, message) = split_headers(body, "commit")?;
        let mut headers = headers.into_iter().peekable();

        let tree_oid = match headers.next() {
            Some(("tree", value)) => parse_oid(&value, "tree")?,
            _ => return Err(Error::corrupt("commit: missing tree header")),
        };

        let mut parents = Vec::new();
        while let Some((_, value)) = headers.next_if(|(key, _)| *key == "parent") {
            parents.push(parse_oid(&value, "parent")?);
        }

        let author = match headers.next() {
            Some(("author", value)) => Signature::try_from(value.as_str())?,
            _ => return Err(Error::corrupt("commit: missing author header")),
        };
        let committer = match headers.next() {
            Some(("committer", value)) => Signature::try_from(value.as_str())?,
            _ => return Err(Error::corrupt("commit: missing committer header")),
        };

        let mut extra_headers = Vec::new();
        for (key, value) in headers {
            if RESERVED_HEADERS.contains(&key) {
                return Err(Error::corrupt(format!("commit: '{key}' header out of order")));
            }
            extra_headers.push((key.to_string(), value));
        }

        Ok(Commit {
            tree_oid,
            parents,
            author,
            committer,
            extra_headers,
            message: message.to_string(),
        })
    }
}

impl Typed for Commit {
    const TYPE: ObjectType = ObjectType::Commit;
}
