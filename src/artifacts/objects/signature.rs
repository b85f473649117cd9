//! Author, committer and tagger identities
//!
//! Encoded inside commit and tag headers as `name <email> seconds ±hhmm`.

use crate::errors::{Error, Result};
use chrono::{DateTime, FixedOffset, TimeZone};

/// Name, email and timestamp with timezone information
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Signature {
    name: String,
    email: String,
    when: DateTime<FixedOffset>,
    /// Written as `-0000` rather than `+0000`
    negative_utc: bool,
}

impl Signature {
    /// Create a signature at a specific time
    ///
    /// Names and emails may not contain `<`, `>` or newlines, since those
    /// delimit the encoded form.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        when: DateTime<FixedOffset>,
    ) -> Result<Self> {
        let name = name.into();
        let email = email.into();

        for (field, value) in [("name", &name), ("email", &email)] {
            if value.contains(['<', '>', '\n', '\0']) {
                return Err(Error::invalid(format!(
                    "signature {field} '{value}' contains a reserved character"
                )));
            }
        }
        if name.trim() != name {
            return Err(Error::invalid(format!(
                "signature name '{name}' has surrounding whitespace"
            )));
        }

        Ok(Signature {
            name,
            email,
            when,
            negative_utc: false,
        })
    }

    /// Create a signature stamped with the current local time
    pub fn now(name: impl Into<String>, email: impl Into<String>) -> Result<Self> {
        Self::new(name, email, chrono::Local::now().fixed_offset())
    }

    /// Create a signature from unix seconds and an offset in minutes
    pub fn from_unix(
        name: impl Into<String>,
        email: impl Into<String>,
        seconds: i64,
        offset_minutes: i32,
    ) -> Result<Self> {
        let offset = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| Error::invalid(format!("timezone offset {offset_minutes} minutes")))?;
        let when = offset
            .timestamp_opt(seconds, 0)
            .single()
            .ok_or_else(|| Error::invalid(format!("timestamp {seconds}")))?;

        Self::new(name, email, when)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn when(&self) -> DateTime<FixedOffset> {
        self.when
    }

    pub fn seconds(&self) -> i64 {
        self.when.timestamp()
    }

    /// Offset from UTC in minutes
    pub fn offset_minutes(&self) -> i32 {
        self.when.offset().local_minus_utc() / 60
    }

    /// "Name <email@example.com>"
    pub fn display_name(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }

    /// Encoded form: "Name <email> timestamp timezone"
    pub fn encode(&self) -> String {
        let timezone = if self.negative_utc {
            "-0000".to_string()
        } else {
            self.when.format("%z").to_string()
        };
        format!(
            "{} <{}> {} {timezone}",
            self.name,
            self.email,
            self.when.timestamp(),
        )
    }
}

impl TryFrom<&str> for Signature {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        let invalid = || Error::corrupt(format!("signature '{value}'"));

        // split from the right to get timezone and timestamp first
        let mut parts = value.rsplitn(3, ' ');
        let timezone = parts.next().ok_or_else(invalid)?;
        let timestamp = parts.next().ok_or_else(invalid)?;
        let name_email = parts.next().ok_or_else(invalid)?;

        let digits = timestamp.strip_prefix('-').unwrap_or(timestamp);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let timestamp = timestamp.parse::<i64>().map_err(|_| invalid())?;
        let offset_minutes = parse_timezone(timezone).ok_or_else(invalid)?;

        let email_start = name_email.find('<').ok_or_else(invalid)?;
        let email = name_email
            .get(email_start + 1..)
            .and_then(|rest| rest.strip_suffix('>'))
            .ok_or_else(invalid)?;
        let name = match &name_email[..email_start] {
            "" => "",
            prefix => prefix.strip_suffix(' ').ok_or_else(invalid)?,
        };

        let mut signature =
            Self::from_unix(name, email, timestamp, offset_minutes).map_err(|_| invalid())?;
        signature.negative_utc = timezone == "-0000";
        Ok(signature)
    }
}

/// Parse `±hhmm` into minutes east of UTC
fn parse_timezone(timezone: &str) -> Option<i32> {
    let bytes = timezone.as_bytes();
    if bytes.len() != 5 || !bytes[1..].iter().all(u8::is_ascii_digit) {
        return None;
    }

    let sign = match bytes[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let hours: i32 = timezone[1..3].parse().ok()?;
    let minutes: i32 = timezone[3..5].parse().ok()?;
    if minutes >= 60 {
        return None;
    }

    Some(sign * (hours * 60 + minutes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn encodes_seconds_and_offset() {
        let signature = Signature::from_unix("Ada Lovelace", "ada@example.com", 1700000000, 90)
            .unwrap();

        assert_eq!(
            signature.encode(),
            "Ada Lovelace <ada@example.com> 1700000000 +0130"
        );
    }

    #[test]
    fn parses_negative_offsets() {
        let signature =
            Signature::try_from("Grace Hopper <grace@navy.mil> 1234567890 -0500").unwrap();

        assert_eq!(signature.name(), "Grace Hopper");
        assert_eq!(signature.email(), "grace@navy.mil");
        assert_eq!(signature.seconds(), 1234567890);
        assert_eq!(signature.offset_minutes(), -300);
    }

    #[test]
    fn empty_name_survives_encoding() {
        let signature = Signature::from_unix("", "anon@example.com", 0, 0).unwrap();
        let parsed = Signature::try_from(signature.encode().as_str()).unwrap();

        assert_eq!(parsed, signature);
    }

    #[rstest]
    #[case("Before Epoch <old@example.com> -1 +0000")]
    #[case("Before Epoch <old@example.com> -86400 -0130")]
    #[case("Unknown Zone <tz@example.com> 1700000000 -0000")]
    #[case("Far East <east@example.com> 1700000000 +1400")]
    fn unusual_timestamps_survive_encoding(#[case] input: &str) {
        let signature = Signature::try_from(input).unwrap();
        assert_eq!(signature.encode(), input);
        assert_eq!(Signature::try_from(signature.encode().as_str()).unwrap(), signature);
    }

    #[test]
    fn negative_seconds_encode_and_decode() {
        let signature = Signature::from_unix("A", "a@b", -1, 0).unwrap();

        assert_eq!(signature.encode(), "A <a@b> -1 +0000");
        assert_eq!(Signature::try_from("A <a@b> -1 +0000").unwrap(), signature);
    }

    #[rstest]
    #[case(i32::MAX)]
    #[case(i32::MIN)]
    #[case(24 * 60)]
    fn out_of_range_offsets_are_invalid(#[case] offset_minutes: i32) {
        assert!(matches!(
            Signature::from_unix("A", "a@b", 0, offset_minutes),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[rstest]
    #[case("Name <mail> 123")]
    #[case("Name <mail> - +0000")]
    #[case("Name <mail> 1-2 +0000")]
    #[case("Name mail> 123 +0000")]
    #[case("Name <mail 123 +0000")]
    #[case("Name<mail> 123 +0000")]
    #[case("Name <mail> 12a +0000")]
    #[case("Name <mail> 123 +00")]
    #[case("Name <mail> 123 *0000")]
    #[case("Name <mail> 123 +0075")]
    fn malformed_signatures_are_corrupt(#[case] input: &str) {
        assert!(matches!(Signature::try_from(input), Err(Error::Corrupt(_))));
    }

    #[rstest]
    #[case("Bad <Name", "ok@example.com")]
    #[case("Name", "bad>@example.com")]
    #[case(" Padded", "ok@example.com")]
    fn reserved_characters_are_rejected(#[case] name: &str, #[case] email: &str) {
        assert!(matches!(
            Signature::from_unix(name, email, 0, 0),
            Err(Error::InvalidArgument(_))
        ));
    }
}
