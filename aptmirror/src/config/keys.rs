//! Typed access to individual configuration settings.
//!
//! Keys are written `section.key`, e.g. `sync.threads`, and back the
//! `config get/set/list` commands.

use std::path::PathBuf;
use std::str::FromStr;

use super::file::{parse_bool, parse_list, parse_value, ConfigError, ConfigFile};

/// A single configuration setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    MirrorUrl,
    MirrorScheme,
    MirrorRootPath,
    SyncDistributions,
    SyncComponents,
    SyncArchitectures,
    SyncThreads,
    SyncAttempts,
    SyncTimeout,
    SyncSources,
    SyncInstaller,
    SyncContents,
    SyncTranslations,
    SyncVerifyChecksums,
    LoggingDirectory,
    LoggingVerbose,
}

const ALL_KEYS: [ConfigKey; 16] = [
    ConfigKey::MirrorUrl,
    ConfigKey::MirrorScheme,
    ConfigKey::MirrorRootPath,
    ConfigKey::SyncDistributions,
    ConfigKey::SyncComponents,
    ConfigKey::SyncArchitectures,
    ConfigKey::SyncThreads,
    ConfigKey::SyncAttempts,
    ConfigKey::SyncTimeout,
    ConfigKey::SyncSources,
    ConfigKey::SyncInstaller,
    ConfigKey::SyncContents,
    ConfigKey::SyncTranslations,
    ConfigKey::SyncVerifyChecksums,
    ConfigKey::LoggingDirectory,
    ConfigKey::LoggingVerbose,
];

impl ConfigKey {
    /// Every key, in file order.
    pub fn all() -> &'static [ConfigKey] {
        &ALL_KEYS
    }

    /// Full name, `section.key`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MirrorUrl => "mirror.url",
            Self::MirrorScheme => "mirror.scheme",
            Self::MirrorRootPath => "mirror.root_path",
            Self::SyncDistributions => "sync.distributions",
            Self::SyncComponents => "sync.components",
            Self::SyncArchitectures => "sync.architectures",
            Self::SyncThreads => "sync.threads",
            Self::SyncAttempts => "sync.attempts",
            Self::SyncTimeout => "sync.timeout",
            Self::SyncSources => "sync.sources",
            Self::SyncInstaller => "sync.installer",
            Self::SyncContents => "sync.contents",
            Self::SyncTranslations => "sync.translations",
            Self::SyncVerifyChecksums => "sync.verify_checksums",
            Self::LoggingDirectory => "logging.directory",
            Self::LoggingVerbose => "logging.verbose",
        }
    }

    /// INI section name.
    pub fn section(&self) -> &'static str {
        self.name().split_once('.').map(|(s, _)| s).unwrap_or("")
    }

    /// Key name within the section.
    pub fn key_name(&self) -> &'static str {
        self.name().split_once('.').map(|(_, k)| k).unwrap_or("")
    }

    /// Current value as a string; empty if not set.
    pub fn get(&self, config: &ConfigFile) -> String {
        let path = |p: &Option<PathBuf>| {
            p.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        };

        match self {
            Self::MirrorUrl => config.mirror.url.clone().unwrap_or_default(),
            Self::MirrorScheme => config.mirror.scheme.to_string(),
            Self::MirrorRootPath => path(&config.mirror.root_path),
            Self::SyncDistributions => config.sync.distributions.join(" "),
            Self::SyncComponents => config.sync.components.join(" "),
            Self::SyncArchitectures => config.sync.architectures.join(" "),
            Self::SyncThreads => config.sync.threads.to_string(),
            Self::SyncAttempts => config.sync.attempts.to_string(),
            Self::SyncTimeout => config.sync.timeout_secs.to_string(),
            Self::SyncSources => config.sync.sources.to_string(),
            Self::SyncInstaller => config.sync.installer.to_string(),
            Self::SyncContents => config.sync.contents.to_string(),
            Self::SyncTranslations => config.sync.translations.to_string(),
            Self::SyncVerifyChecksums => config.sync.verify_checksums.to_string(),
            Self::LoggingDirectory => path(&config.logging.directory),
            Self::LoggingVerbose => config.logging.verbose.to_string(),
        }
    }

    /// Validate and store a value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` if the value cannot be parsed for this key.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let key = self.name();
        let optional = |v: &str| {
            let v = v.trim();
            (!v.is_empty()).then(|| v.to_string())
        };

        match self {
            Self::MirrorUrl => config.mirror.url = optional(value),
            Self::MirrorScheme => config.mirror.scheme = parse_value(key, value)?,
            Self::MirrorRootPath => config.mirror.root_path = optional(value).map(PathBuf::from),
            Self::SyncDistributions => config.sync.distributions = parse_list(value),
            Self::SyncComponents => config.sync.components = parse_list(value),
            Self::SyncArchitectures => config.sync.architectures = parse_list(value),
            Self::SyncThreads => {
                let threads: usize = parse_value(key, value)?;
                if threads == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: key.to_string(),
                        value: value.to_string(),
                        reason: "must be at least 1".to_string(),
                    });
                }
                config.sync.threads = threads;
            }
            Self::SyncAttempts => config.sync.attempts = parse_value(key, value)?,
            Self::SyncTimeout => config.sync.timeout_secs = parse_value(key, value)?,
            Self::SyncSources => config.sync.sources = parse_bool(key, value)?,
            Self::SyncInstaller => config.sync.installer = parse_bool(key, value)?,
            Self::SyncContents => config.sync.contents = parse_bool(key, value)?,
            Self::SyncTranslations => config.sync.translations = parse_bool(key, value)?,
            Self::SyncVerifyChecksums => config.sync.verify_checksums = parse_bool(key, value)?,
            Self::LoggingDirectory => {
                config.logging.directory = optional(value).map(PathBuf::from)
            }
            Self::LoggingVerbose => config.logging.verbose = parse_bool(key, value)?,
        }
        Ok(())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_KEYS
            .iter()
            .copied()
            .find(|k| k.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "key".to_string(),
                value: s.to_string(),
                reason: "unknown configuration key".to_string(),
            })
    }
}
