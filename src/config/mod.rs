//! Layered key/value configuration.
//!
//! A [`Configuration`] is a flat map from `:`-separated keys to string values.
//! Keys compare case-insensitively and keep the spelling they were first
//! set with. Sources are applied in order, later ones overriding earlier
//! ones; [`load`] uses the standard order:
//!
//! 1. `appsettings.json` in the content root
//! 2. `appsettings.{Environment}.json`
//! 3. environment variables (`__` in names becomes `:`)
//! 4. command-line arguments
//!
//! Only the bootstrap reads configuration; the worker itself takes none.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

pub mod environment;
pub mod sources;

pub use environment::{ConfigDump, HostEnvironment};
pub use sources::KEY_DELIMITER;

/// Errors produced while loading or reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{}: top-level JSON value must be an object", path.display())]
    NotAnObject { path: PathBuf },

    #[error("invalid value {value:?} for `{key}`: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    key: String,
    value: String,
}

/// Flat, case-insensitive configuration map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    path: String,
    entries: BTreeMap<String, Entry>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        self.entries
            .entry(key.to_ascii_lowercase())
            .and_modify(|entry| entry.value.clone_from(&value))
            .or_insert(Entry { key, value });
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(|entry| entry.value.as_str())
    }

    /// Parses the value at `key`. Missing and blank values yield `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the value does not parse as `T`.
    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let Some(raw) = self.get(key).map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Ok(None);
        };
        raw.parse().map(Some).map_err(|e: T::Err| ConfigError::Invalid {
            key: self.full_key(key),
            value: raw.to_owned(),
            reason: e.to_string(),
        })
    }

    /// Like [`Configuration::get_parsed`], falling back to `default`.
    pub fn get_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        Ok(self.get_parsed(key)?.unwrap_or(default))
    }

    /// Returns the entries under `name`, with the `name:` prefix removed.
    pub fn section(&self, name: &str) -> Configuration {
        let prefix = format!("{}{KEY_DELIMITER}", name.to_ascii_lowercase());
        let entries = self
            .entries
            .iter()
            .filter_map(|(lower, entry)| {
                let rest = lower.strip_prefix(&prefix)?;
                let key = entry.key[entry.key.len() - rest.len()..].to_owned();
                Some((
                    rest.to_owned(),
                    Entry {
                        key,
                        value: entry.value.clone(),
                    },
                ))
            })
            .collect();

        Configuration {
            path: self.full_key(name),
            entries,
        }
    }

    /// Iterates `(key, value)` pairs ordered case-insensitively by key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|entry| (entry.key.as_str(), entry.value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders the startup banner: every key, the current directory and the
    /// environment name.
    pub fn dump<'a>(
        &'a self,
        environment: &'a HostEnvironment,
        current_dir: &'a Path,
    ) -> ConfigDump<'a> {
        ConfigDump {
            config: self,
            environment,
            current_dir,
        }
    }

    fn full_key(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_owned()
        } else {
            format!("{}{KEY_DELIMITER}{key}", self.path)
        }
    }
}

/// Builds a [`Configuration`] from ordered sources.
#[derive(Debug, Default)]
pub struct ConfigurationBuilder {
    config: Configuration,
}

impl ConfigurationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the JSON file at `path`. A missing optional file is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read (or is missing
    /// and not optional), and [`ConfigError::Json`] or
    /// [`ConfigError::NotAnObject`] if its contents are not a JSON object.
    pub fn add_json_file(self, path: impl AsRef<Path>, optional: bool) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => self.add_json_str(&text, path),
            Err(e) if optional && e.kind() == std::io::ErrorKind::NotFound => Ok(self),
            Err(source) => Err(ConfigError::Io {
                path: path.to_owned(),
                source,
            }),
        }
    }

    /// Adds JSON text. `origin` names the source in errors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] for malformed JSON and
    /// [`ConfigError::NotAnObject`] if the root is not an object.
    pub fn add_json_str(mut self, json: &str, origin: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let origin = origin.as_ref();
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|source| ConfigError::Json {
                path: origin.to_owned(),
                source,
            })?;
        if !value.is_object() {
            return Err(ConfigError::NotAnObject {
                path: origin.to_owned(),
            });
        }

        let mut pairs = Vec::new();
        sources::flatten_json(&value, "", &mut pairs);
        for (key, value) in pairs {
            self.config.set(key, value);
        }
        Ok(self)
    }

    /// Adds the given environment variables.
    pub fn add_env_vars<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            self.config.set(sources::env_key(&name), value);
        }
        self
    }

    /// Adds this process's environment. Variables whose name or value is
    /// not valid Unicode are skipped.
    pub fn add_process_env(self) -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)));
        self.add_env_vars(vars)
    }

    /// Adds command-line arguments (without the program name).
    pub fn add_command_line<I>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        for (key, value) in sources::parse_command_line(args) {
            self.config.set(key, value);
        }
        self
    }

    pub fn build(self) -> Configuration {
        self.config
    }
}

/// Loads configuration for `environment` from the standard sources.
///
/// # Errors
///
/// Propagates any error from reading the JSON files.
pub fn load<I>(environment: &HostEnvironment, args: I) -> Result<Configuration, ConfigError>
where
    I: IntoIterator<Item = String>,
{
    let root = &environment.content_root;
    let config = ConfigurationBuilder::new()
        .add_json_file(root.join("appsettings.json"), true)?
        .add_json_file(root.join(format!("appsettings.{}.json", environment.name)), true)?
        .add_process_env()
        .add_command_line(args)
        .build();
    Ok(config)
}
