//! Error kinds shared by every core operation
//!
//! Each public operation of the object store, codec, walker, reference store,
//! index and configuration store returns [`Result`], so callers can tell a
//! missing object apart from a corrupt one without inspecting messages.

use crate::artifacts::objects::object_type::ObjectType;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Lookup miss: object, reference, config key or index entry is absent.
    #[error("{0} not found")]
    NotFound(String),

    /// Stored or encoded bytes fail to parse or violate an invariant.
    #[error("corrupt {0}")]
    Corrupt(String),

    #[error("object {oid} is a {actual}, expected a {expected}")]
    TypeMismatch {
        oid: String,
        expected: ObjectType,
        actual: ObjectType,
    },

    /// Unresolved merge stages, or an existing entry that must not be overwritten.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("reference {name} exceeds {hops} symbolic redirects")]
    TooManyRedirects { name: String, hops: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn not_found(what: impl std::fmt::Display) -> Self {
        Error::NotFound(what.to_string())
    }

    pub(crate) fn corrupt(what: impl std::fmt::Display) -> Self {
        Error::Corrupt(what.to_string())
    }

    pub(crate) fn invalid(what: impl std::fmt::Display) -> Self {
        Error::InvalidArgument(what.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
