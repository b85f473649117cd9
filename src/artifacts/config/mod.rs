//! git-config files
//!
//! Configuration is a set of dot-separated keys (`core.bare`,
//! `remote.origin.url`) read from INI-style files:
//!
//! ```text
//! # comment
//! [core]
//!     bare = false
//! [remote "origin"]
//!     url = "https://example.com/repo.git"
//! ```

pub mod config_file;
pub mod config_key;

/// Characters allowed in section and variable names
pub const CONFIG_NAME_REGEX: &str = r"^[A-Za-z0-9-]+$";
