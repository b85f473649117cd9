//! Layered configuration store
//!
//! Values are looked up in the local (repository) level first, then global
//! (user), then system. Writes go to exactly one level and are persisted to
//! that level's file when it has one.

use crate::artifacts::config::config_file::ConfigFile;
use crate::artifacts::config::config_key::ConfigKey;
use crate::errors::{Error, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Configuration levels, lowest precedence first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigLevel {
    System,
    Global,
    Local,
}

impl std::fmt::Display for ConfigLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self {
            ConfigLevel::System => "system",
            ConfigLevel::Global => "global",
            ConfigLevel::Local => "local",
        };
        write!(f, "{level}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub level: ConfigLevel,
}

#[derive(Debug, Default)]
struct LevelStore {
    path: Option<PathBuf>,
    file: ConfigFile,
}

impl LevelStore {
    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let lock_path = lock_path_for(path);
        let mut lock_file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::Conflict(format!(
                    "unable to create {}: file exists",
                    lock_path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let written = lock_file
            .write_all(self.file.serialize().as_bytes())
            .and_then(|_| lock_file.sync_all());
        if let Err(e) = written {
            let _ = std::fs::remove_file(&lock_path);
            return Err(e.into());
        }
        std::fs::rename(&lock_path, path)?;

        tracing::debug!(path = %path.display(), "saved config");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct Config {
    levels: RwLock<BTreeMap<ConfigLevel, LevelStore>>,
}

impl Config {
    /// A store with no levels; `set` creates in-memory levels on demand
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the file at `path` as `level`, replacing any previous store
    ///
    /// A missing file is an empty level; it is created on the first write.
    pub fn add_file(&self, level: ConfigLevel, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        let file = match std::fs::read_to_string(&path) {
            Ok(content) => ConfigFile::parse(&content)
                .map_err(|e| Error::corrupt(format!("{} ({e})", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ConfigFile::default(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(%level, path = %path.display(), "loaded config");
        self.levels.write().insert(
            level,
            LevelStore {
                path: Some(path),
                file,
            },
        );

        Ok(())
    }

    pub fn path(&self, level: ConfigLevel) -> Option<PathBuf> {
        self.levels
            .read()
            .get(&level)
            .and_then(|store| store.path.clone())
    }

    /// The value of `key` from the highest-precedence level that has it
    pub fn get(&self, key: &str) -> Result<String> {
        let key = ConfigKey::try_parse(key)?;
        self.levels
            .read()
            .values()
            .rev()
            .find_map(|store| store.file.get(&key).map(str::to_string))
            .ok_or_else(|| Error::not_found(format!("config key '{key}'")))
    }

    /// Interpret the value of `key` as a git boolean
    pub fn get_bool(&self, key: &str) -> Result<bool> {
        let value = self.get(key)?;
        parse_bool(&value)
            .ok_or_else(|| Error::invalid(format!("config key '{key}' is not a boolean: '{value}'")))
    }

    /// Interpret the value of `key` as an integer with an optional `k`, `m`
    /// or `g` multiplier
    pub fn get_i64(&self, key: &str) -> Result<i64> {
        let value = self.get(key)?;
        parse_i64(&value)
            .ok_or_else(|| Error::invalid(format!("config key '{key}' is not an integer: '{value}'")))
    }

    /// Every value of `key` across all levels, lowest precedence first
    pub fn get_all(&self, key: &str) -> Result<Vec<String>> {
        let key = ConfigKey::try_parse(key)?;
        Ok(self
            .levels
            .read()
            .values()
            .flat_map(|store| store.file.get_all(&key))
            .map(str::to_string)
            .collect())
    }

    pub fn set(&self, key: &str, value: impl Into<String>, level: ConfigLevel) -> Result<()> {
        let key = ConfigKey::try_parse(key)?;
        let mut levels = self.levels.write();
        let store = levels.entry(level).or_default();

        store.file.set(&key, value);
        store.persist()?;

        tracing::debug!(%key, %level, "set config value");
        Ok(())
    }

    /// Remove every value of `key` at `level`
    pub fn remove(&self, key: &str, level: ConfigLevel) -> Result<()> {
        let key = ConfigKey::try_parse(key)?;
        let mut levels = self.levels.write();
        let removed = match levels.get_mut(&level) {
            Some(store) => {
                if store.file.remove(&key) {
                    store.persist()?;
                    true
                } else {
                    false
                }
            }
            None => false,
        };

        if !removed {
            return Err(Error::not_found(format!("config key '{key}' at {level} level")));
        }
        Ok(())
    }

    /// Every entry across all levels, lowest precedence first
    pub fn entries(&self) -> Vec<ConfigEntry> {
        self.levels
            .read()
            .iter()
            .flat_map(|(level, store)| {
                store.file.entries().map(|(key, value)| ConfigEntry {
                    key: key.to_string(),
                    value: value.to_string(),
                    level: *level,
                })
            })
            .collect()
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut lock = path.as_os_str().to_owned();
    lock.push(".lock");
    PathBuf::from(lock)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" | "" => Some(false),
        _ => None,
    }
}

fn parse_i64(value: &str) -> Option<i64> {
    let value = value.trim();
    let (digits, factor) = match value.char_indices().last()? {
        (index, 'k' | 'K') => (&value[..index], 1 << 10),
        (index, 'm' | 'M') => (&value[..index], 1 << 20),
        (index, 'g' | 'G') => (&value[..index], 1 << 30),
        _ => (value, 1),
    };

    digits.parse::<i64>().ok()?.checked_mul(factor)
}

/// Default location of the user's global configuration
pub fn default_global_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".gitconfig"))
}

/// Default location of the system configuration
pub fn default_system_path() -> PathBuf {
    Path::new("/etc").join("gitconfig")
}
