//! Hosting environment and the startup configuration dump.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use super::{ConfigError, Configuration, KEY_DELIMITER};

/// Variable naming the hosting environment.
pub const ENVIRONMENT_VARIABLE: &str = "APP_ENVIRONMENT";

/// Environment name used when [`ENVIRONMENT_VARIABLE`] is unset.
pub const DEFAULT_ENVIRONMENT: &str = "Production";

/// Where and as what the process is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEnvironment {
    /// `Development`, `Staging`, `Production` or any custom name.
    pub name: String,
    /// Directory configuration files are loaded from.
    pub content_root: PathBuf,
}

impl HostEnvironment {
    pub fn new(name: impl Into<String>, content_root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            content_root: content_root.into(),
        }
    }

    /// Reads the environment name from [`ENVIRONMENT_VARIABLE`] and uses the
    /// current directory as content root.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the current directory is unavailable.
    pub fn from_process() -> Result<Self, ConfigError> {
        let content_root = std::env::current_dir().map_err(|source| ConfigError::Io {
            path: PathBuf::from("."),
            source,
        })?;
        let name = std::env::var(ENVIRONMENT_VARIABLE)
            .ok()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_owned());
        Ok(Self::new(name, content_root))
    }
}

const RULE_WIDTH: usize = 60;

/// Console banner listing the active configuration. Built by
/// [`Configuration::dump`].
///
/// Every key is listed as `|key|value|`, sorted case-insensitively. Parent
/// sections appear as their own rows with an empty value.
pub struct ConfigDump<'a> {
    pub(super) config: &'a Configuration,
    pub(super) environment: &'a HostEnvironment,
    pub(super) current_dir: &'a Path,
}

impl fmt::Display for ConfigDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(RULE_WIDTH);

        let mut rows: BTreeMap<String, (&str, &str)> = BTreeMap::new();
        for (key, value) in self.config.iter() {
            rows.insert(key.to_ascii_lowercase(), (key, value));
            let mut end = 0;
            while let Some(offset) = key[end..].find(KEY_DELIMITER) {
                let parent = &key[..end + offset];
                rows.entry(parent.to_ascii_lowercase()).or_insert((parent, ""));
                end += offset + KEY_DELIMITER.len();
            }
        }

        writeln!(f, "{rule}")?;
        writeln!(f, "Configuration:")?;
        for (key, value) in rows.values() {
            writeln!(f, "|{key}|{value}|")?;
        }
        writeln!(f, "{rule}")?;
        writeln!(f, "Current directory:{}", self.current_dir.display())?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Environment: {}", self.environment.name)?;
        writeln!(f, "{rule}")?;
        writeln!(f)?;
        writeln!(f)
    }
}
