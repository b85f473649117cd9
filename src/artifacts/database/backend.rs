use crate::artifacts::objects::codec;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::Result;
use bytes::Bytes;

/// Physical storage for framed objects
///
/// `read_raw` reports a miss as `Error::NotFound`; any other error means the
/// backend has the object but could not produce it, and is never treated as
/// absence by the object database.
pub trait Backend: Send + Sync + std::fmt::Debug {
    /// Short label used in log events
    fn name(&self) -> &'static str;

    fn has(&self, oid: &ObjectId) -> Result<bool>;

    fn read_raw(&self, oid: &ObjectId) -> Result<Bytes>;

    fn write_raw(&self, oid: &ObjectId, framed: &Bytes) -> Result<()>;

    /// Every id this backend holds, in no particular order
    fn object_ids(&self) -> Result<Vec<ObjectId>>;

    fn is_writable(&self) -> bool {
        true
    }

    fn read_header(&self, oid: &ObjectId) -> Result<(ObjectType, usize)> {
        let framed = self.read_raw(oid)?;
        let (object_type, size, _) = codec::parse_header(&framed)?;

        Ok((object_type, size))
    }
}
