//! Canonical object codec
//!
//! `encode`/`decode` work on object bodies. `frame`/`unframe` add and strip the
//! `"<type> <len>\0"` header that is hashed into the object id and written to
//! storage backends.

use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tag::Tag;
use crate::artifacts::objects::tree::Tree;
use crate::errors::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};

pub fn encode(object: &Object) -> Bytes {
    object.serialize()
}

pub fn decode(object_type: ObjectType, body: &[u8]) -> Result<Object> {
    Ok(match object_type {
        ObjectType::Blob => Object::Blob(Blob::deserialize(body)?),
        ObjectType::Tree => Object::Tree(Tree::deserialize(body)?),
        ObjectType::Commit => Object::Commit(Commit::deserialize(body)?),
        ObjectType::Tag => Object::Tag(Tag::deserialize(body)?),
    })
}

pub fn frame(object_type: ObjectType, body: &[u8]) -> Bytes {
    let header = format!("{} {}\0", object_type.as_str(), body.len());
    let mut framed = BytesMut::with_capacity(header.len() + body.len());
    framed.put_slice(header.as_bytes());
    framed.put_slice(body);

    framed.freeze()
}

/// Split a framed object into its type and body, checking the declared length
pub fn unframe(framed: &Bytes) -> Result<(ObjectType, Bytes)> {
    let (object_type, size, header_len) = parse_header(framed)?;
    let body = framed.slice(header_len..);

    if body.len() != size {
        return Err(Error::corrupt(format!(
            "object header declares {size} bytes but body has {}",
            body.len()
        )));
    }

    Ok((object_type, body))
}

/// Parse `"<type> <len>\0"` and return the header length alongside
pub fn parse_header(framed: &[u8]) -> Result<(ObjectType, usize, usize)> {
    let nul = framed
        .iter()
        .position(|&b| b == b'\0')
        .ok_or_else(|| Error::corrupt("object header: missing NUL terminator"))?;
    let header = std::str::from_utf8(&framed[..nul])
        .map_err(|_| Error::corrupt("object header: not UTF-8"))?;
    let (object_type, size) = header
        .split_once(' ')
        .ok_or_else(|| Error::corrupt(format!("object header '{header}'")))?;

    let object_type = ObjectType::try_from(object_type)
        .map_err(|_| Error::corrupt(format!("object header: unknown type '{object_type}'")))?;

    let leading_zero = size.len() > 1 && size.starts_with('0');
    if size.is_empty() || leading_zero || !size.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::corrupt(format!("object header: size '{size}'")));
    }
    let size = size
        .parse::<usize>()
        .map_err(|_| Error::corrupt(format!("object header: size '{size}'")))?;

    Ok((object_type, size, nul + 1))
}
