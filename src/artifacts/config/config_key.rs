use crate::artifacts::config::CONFIG_NAME_REGEX;
use crate::errors::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

static CONFIG_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(CONFIG_NAME_REGEX).expect("config name pattern is a valid regex")
});

/// A configuration key of the form `section[.subsection].name`
///
/// Section and variable names compare case-insensitively and are stored
/// lowercased; the subsection keeps its case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigKey {
    section: String,
    subsection: Option<String>,
    name: String,
}

impl ConfigKey {
    pub fn try_parse(key: &str) -> Result<Self> {
        let (section, rest) = key
            .split_once('.')
            .ok_or_else(|| Error::invalid(format!("config key '{key}' has no section")))?;
        let (subsection, name) = match rest.rsplit_once('.') {
            Some((subsection, name)) => (Some(subsection), name),
            None => (None, rest),
        };

        Self::new(section, subsection, name)
            .map_err(|_| Error::invalid(format!("invalid config key '{key}'")))
    }

    pub fn new(section: &str, subsection: Option<&str>, name: &str) -> Result<Self> {
        if !CONFIG_NAME.is_match(section) {
            return Err(Error::invalid(format!("invalid config section '{section}'")));
        }
        if !CONFIG_NAME.is_match(name) || !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return Err(Error::invalid(format!("invalid config variable '{name}'")));
        }
        if let Some(subsection) = subsection
            && subsection.contains(['\n', '\0'])
        {
            return Err(Error::invalid("config subsection cannot contain newlines"));
        }

        Ok(Self {
            section: section.to_ascii_lowercase(),
            subsection: subsection.map(str::to_string),
            name: name.to_ascii_lowercase(),
        })
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn subsection(&self) -> Option<&str> {
        self.subsection.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.subsection {
            Some(subsection) => write!(f, "{}.{subsection}.{}", self.section, self.name),
            None => write!(f, "{}.{}", self.section, self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("core.bare", "core", None, "bare")]
    #[case("Core.Bare", "core", None, "bare")]
    #[case("remote.origin.url", "remote", Some("origin"), "url")]
    #[case("branch.Feature.x.merge", "branch", Some("Feature.x"), "merge")]
    fn splits_keys_into_components(
        #[case] key: &str,
        #[case] section: &str,
        #[case] subsection: Option<&str>,
        #[case] name: &str,
    ) {
        let key = ConfigKey::try_parse(key).unwrap();

        assert_eq!(key.section(), section);
        assert_eq!(key.subsection(), subsection);
        assert_eq!(key.name(), name);
    }

    #[rstest]
    #[case("")]
    #[case("bare")]
    #[case(".bare")]
    #[case("core.")]
    #[case("core.1st")]
    #[case("co re.bare")]
    #[case("core.ba_re")]
    fn rejects_malformed_keys(#[case] key: &str) {
        assert!(matches!(ConfigKey::try_parse(key), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn display_uses_normalized_case() {
        let key = ConfigKey::try_parse("Remote.Origin.URL").unwrap();
        assert_eq!(key.to_string(), "remote.Origin.url");
    }
}
