use crate::artifacts::refs::{HEADS_PREFIX, INVALID_REF_NAME_REGEX, REFS_PREFIX, TAGS_PREFIX};
use crate::errors::{Error, Result};
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

static INVALID_REF_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(INVALID_REF_NAME_REGEX).expect("reference name pattern is a valid regex")
});

/// A validated, full reference name such as `HEAD` or `refs/heads/main`
///
/// Names either live under `refs/` or are top-level all-caps names like
/// `HEAD` and `ORIG_HEAD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefName(String);

impl RefName {
    pub fn try_parse(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::invalid("reference name cannot be empty"));
        }

        if INVALID_REF_NAME.is_match(&name) || name.split('/').any(|component| component.ends_with('.')) {
            return Err(Error::invalid(format!("invalid reference name '{name}'")));
        }

        let is_top_level = name.bytes().all(|b| b.is_ascii_uppercase() || b == b'_');
        if !name.starts_with(REFS_PREFIX) && !is_top_level {
            return Err(Error::invalid(format!(
                "reference name '{name}' must start with '{REFS_PREFIX}' or be all caps"
            )));
        }

        Ok(Self(name))
    }

    /// `refs/heads/<branch>`
    pub fn branch(branch: &str) -> Result<Self> {
        Self::try_parse(format!("{HEADS_PREFIX}{branch}"))
    }

    /// `refs/tags/<tag>`
    pub fn tag(tag: &str) -> Result<Self> {
        Self::try_parse(format!("{TAGS_PREFIX}{tag}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of the loose reference file, relative to the git directory
    pub fn as_ref_path(&self) -> PathBuf {
        self.0.split('/').collect()
    }

    pub fn is_branch(&self) -> bool {
        self.0.starts_with(HEADS_PREFIX)
    }

    pub fn is_tag(&self) -> bool {
        self.0.starts_with(TAGS_PREFIX)
    }

    /// Name without its `refs/heads/` or `refs/tags/` namespace
    pub fn shorthand(&self) -> &str {
        self.0
            .strip_prefix(HEADS_PREFIX)
            .or_else(|| self.0.strip_prefix(TAGS_PREFIX))
            .unwrap_or(&self.0)
    }
}

impl AsRef<str> for RefName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::proptest;
    use rstest::rstest;

    proptest! {
        #[test]
        fn branch_names_of_safe_characters_are_valid(branch in "[a-zA-Z0-9_-]+") {
            assert!(RefName::branch(&branch).is_ok());
        }

        #[test]
        fn hierarchical_branch_names_are_valid(
            prefix in "[a-zA-Z0-9_-]+",
            suffix in "[a-zA-Z0-9_-]+"
        ) {
            assert!(RefName::branch(&format!("{prefix}/{suffix}")).is_ok());
        }

        #[test]
        fn lock_suffix_is_invalid(prefix in "[a-zA-Z0-9_-]+") {
            assert!(RefName::branch(&format!("{prefix}.lock")).is_err());
        }

        #[test]
        fn consecutive_dots_are_invalid(
            prefix in "[a-zA-Z0-9_-]+",
            suffix in "[a-zA-Z0-9_-]+"
        ) {
            assert!(RefName::branch(&format!("{prefix}..{suffix}")).is_err());
        }

        #[test]
        fn components_starting_with_a_dot_are_invalid(
            prefix in "[a-zA-Z0-9_-]+",
            suffix in "[a-zA-Z0-9_-]+"
        ) {
            assert!(RefName::branch(&format!("{prefix}/.{suffix}")).is_err());
        }

        #[test]
        fn special_characters_are_invalid(
            prefix in "[a-zA-Z0-9_-]+",
            suffix in "[a-zA-Z0-9_-]+",
            special_char in r"[\*:\?\[\\^~ ]"
        ) {
            assert!(RefName::branch(&format!("{prefix}{special_char}{suffix}")).is_err());
        }
    }

    #[rstest]
    #[case("HEAD")]
    #[case("ORIG_HEAD")]
    #[case("refs/heads/main")]
    #[case("refs/tags/v1.0")]
    #[case("refs/remotes/origin/feature/x")]
    fn accepts_well_formed_names(#[case] name: &str) {
        assert_eq!(RefName::try_parse(name).unwrap().as_str(), name);
    }

    #[rstest]
    #[case("")]
    #[case("main")]
    #[case("refs/heads/")]
    #[case("/refs/heads/main")]
    #[case("refs//heads")]
    #[case("refs/heads/a@{1}")]
    #[case("refs/heads/trailing.")]
    #[case("refs/heads/ctrl\x07")]
    #[case("@")]
    fn rejects_malformed_names(#[case] name: &str) {
        assert!(matches!(RefName::try_parse(name), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn shorthand_strips_namespaces() {
        assert_eq!(RefName::branch("topic/x").unwrap().shorthand(), "topic/x");
        assert_eq!(RefName::tag("v2").unwrap().shorthand(), "v2");
        assert_eq!(RefName::try_parse("HEAD").unwrap().shorthand(), "HEAD");
    }

    #[test]
    fn ref_paths_follow_name_components() {
        let name = RefName::branch("topic/x").unwrap();
        assert_eq!(
            name.as_ref_path(),
            PathBuf::from("refs").join("heads").join("topic").join("x")
        );
    }
}
