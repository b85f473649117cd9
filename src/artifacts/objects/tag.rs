//! Git annotated tag object
//!
//! ## Format
//!
//! ```text
//! tag <size>\0
//! object <target-sha>
//! type <target-type>
//! tag <name>
//! tagger <name> <email> <timestamp> <timezone>
//!
//! <tag message>
//! ```
//!
//! Lightweight tags are plain references and never produce a tag object.

use crate::artifacts::objects::commit::{split_headers, write_header};
use crate::artifacts::objects::object::{Packable, Typed, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::signature::Signature;
use crate::errors::{Error, Result};
use bytes::Bytes;
use derive_new::new;

#[derive(Debug, Clone, Eq, PartialEq, new)]
pub struct Tag {
    target: ObjectId,
    target_type: ObjectType,
    #[new(into)]
    name: String,
    tagger: Signature,
    #[new(into)]
    message: String,
}

impl Tag {
    pub fn target(&self) -> &ObjectId {
        &self.target
    }

    pub fn target_type(&self) -> ObjectType {
        self.target_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tagger(&self) -> &Signature {
        &self.tagger
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Packable for Tag {
    fn serialize(&self) -> Bytes {
        let mut content = String::new();

        write_header(&mut content, "object", &self.target.to_string());
        write_header(&mut content, "type", self.target_type.as_str());
        write_header(&mut content, "tag", &self.name);
        write_header(&mut content, "tagger", &self.tagger.encode());
        content.push('\n');
        content.push_str(&self.message);

        Bytes::from(content)
    }
}

impl Unpackable for Tag {
    fn deserialize(body: &[u8]) -> Result<Self> {
        let body = std::str::from_utf8(body).map_err(|_| Error::corrupt("tag: not valid UTF-8"))?;
        let (headers, message) = split_headers(body, "tag")?;
        let mut headers = headers.into_iter();

        let mut expect = |field: &str| match headers.next() {
            Some((key, value)) if key == field => Ok(value),
            _ => Err(Error::corrupt(format!("tag: missing {field} header"))),
        };

        let target = expect("object")?;
        let target = ObjectId::try_parse(&target)
            .map_err(|_| Error::corrupt(format!("tag: invalid object id '{target}'")))?;
        let target_type = expect("type")?;
        let target_type = ObjectType::try_from(target_type.as_str())
            .map_err(|_| Error::corrupt(format!("tag: invalid target type '{target_type}'")))?;
        let name = expect("tag")?;
        let tagger = Signature::try_from(expect("tagger")?.as_str())?;

        if let Some((key, _)) = headers.next() {
            return Err(Error::corrupt(format!("tag: unexpected header '{key}'")));
        }

        Ok(Tag {
            target,
            target_type,
            name,
            tagger,
            message: message.to_string(),
        })
    }
}

impl Typed for Tag {
    const TYPE: ObjectType = ObjectType::Tag;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::signature_strategy;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn tag() -> Tag {
        Tag::new(
            ObjectId::hash_object(ObjectType::Commit, b"release"),
            ObjectType::Commit,
            "v1.0.0",
            Signature::from_unix("Releaser", "release@example.com", 1700000000, 0).unwrap(),
            "First stable release\n",
        )
    }

    #[rstest]
    fn encodes_fields_in_order(tag: Tag) {
        let encoded = String::from_utf8(tag.serialize().to_vec()).unwrap();
        let keys = encoded
            .lines()
            .take(4)
            .map(|line| line.split(' ').next().unwrap())
            .collect::<Vec<_>>();

        assert_eq!(keys, vec!["object", "type", "tag", "tagger"]);
        assert!(encoded.ends_with("\n\nFirst stable release\n"));
    }

    #[rstest]
    fn decode_inverts_encode(tag: Tag) {
        assert_eq!(Tag::deserialize(&tag.serialize()).unwrap(), tag);
    }

    #[rstest]
    fn reordered_headers_are_corrupt(tag: Tag) {
        let encoded = String::from_utf8(tag.serialize().to_vec()).unwrap();
        let mut lines = encoded.lines().collect::<Vec<_>>();
        lines.swap(0, 1);
        let reordered = lines.join("\n");

        assert!(matches!(
            Tag::deserialize(reordered.as_bytes()),
            Err(Error::Corrupt(_))
        ));
    }

    #[test]
    fn unknown_target_type_is_corrupt() {
        let body = "object 4b825dc642cb6eb9a060e54bf8d69288fbee4904\ntype tome\ntag x\ntagger A <a@b> 1 +0000\n\n";
        assert!(matches!(
            Tag::deserialize(body.as_bytes()),
            Err(Error::Corrupt(_))
        ));
    }

    proptest! {
        #[test]
        fn decode_inverts_encode_for_any_tag(
            target in any::<[u8; 20]>(),
            target_type in prop_oneof![
                Just(ObjectType::Blob),
                Just(ObjectType::Tree),
                Just(ObjectType::Commit),
                Just(ObjectType::Tag),
            ],
            name in "[!-~]{1,24}",
            tagger in signature_strategy(),
            message in "(?s).{0,64}",
        ) {
            let tag = Tag::new(ObjectId::from_raw(target), target_type, name, tagger, message);

            let encoded = tag.serialize();
            let decoded = Tag::deserialize(&encoded).unwrap();

            prop_assert_eq!(&decoded.serialize(), &encoded);
            prop_assert_eq!(decoded.tagger().offset_minutes(), tag.tagger().offset_minutes());
            prop_assert_eq!(decoded, tag);
        }
    }
}
