//! INI configuration file.
//!
//! Stored at `<config dir>/aptmirror/config.ini`:
//!
//! ```ini
//! [mirror]
//! url = deb.debian.org/debian
//! scheme = https
//! root_path = /srv/mirror
//!
//! [sync]
//! distributions = bookworm bookworm-updates
//! components = main contrib
//! architectures = amd64
//! threads = 5
//!
//! [logging]
//! directory = /var/log/aptmirror
//! verbose = false
//! ```
//!
//! A missing file yields the defaults.

use std::path::{Path, PathBuf};

use ini::{Ini, Properties};
use thiserror::Error;

use super::sync::DEFAULT_CONCURRENCY;
use crate::download::transport::DEFAULT_TIMEOUT_SECS;
use crate::download::DEFAULT_MAX_ATTEMPTS;
use crate::repo::Scheme;

/// Errors reading or writing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// `[mirror]` section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MirrorSection {
    pub url: Option<String>,
    pub scheme: Scheme,
    pub root_path: Option<PathBuf>,
}

/// `[sync]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSection {
    pub distributions: Vec<String>,
    pub components: Vec<String>,
    pub architectures: Vec<String>,
    pub threads: usize,
    pub attempts: u32,
    pub timeout_secs: u64,
    pub sources: bool,
    pub installer: bool,
    pub contents: bool,
    pub translations: bool,
    pub verify_checksums: bool,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            distributions: Vec::new(),
            components: Vec::new(),
            architectures: Vec::new(),
            threads: DEFAULT_CONCURRENCY,
            attempts: DEFAULT_MAX_ATTEMPTS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            sources: false,
            installer: true,
            contents: true,
            translations: true,
            verify_checksums: true,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoggingSection {
    pub directory: Option<PathBuf>,
    pub verbose: bool,
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub mirror: MirrorSection,
    pub sync: SyncSection,
    pub logging: LoggingSection,
}

/// Path of the configuration file.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("aptmirror")
        .join("config.ini")
}

/// Default directory for log files.
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("aptmirror")
        .join("logs")
}

impl ConfigFile {
    /// Load the configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load the configuration from `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut config = Self::default();
        let empty = Properties::default();
        let mirror = ini.section(Some("mirror")).unwrap_or(&empty);
        let sync = ini.section(Some("sync")).unwrap_or(&empty);
        let logging = ini.section(Some("logging")).unwrap_or(&empty);

        config.mirror.url = non_empty(mirror.get("url"));
        if let Some(scheme) = mirror.get("scheme") {
            config.mirror.scheme = parse_value("mirror.scheme", scheme)?;
        }
        config.mirror.root_path = non_empty(mirror.get("root_path")).map(PathBuf::from);

        if let Some(v) = sync.get("distributions") {
            config.sync.distributions = parse_list(v);
        }
        if let Some(v) = sync.get("components") {
            config.sync.components = parse_list(v);
        }
        if let Some(v) = sync.get("architectures") {
            config.sync.architectures = parse_list(v);
        }
        if let Some(v) = sync.get("threads") {
            config.sync.threads = parse_value("sync.threads", v)?;
        }
        if let Some(v) = sync.get("attempts") {
            config.sync.attempts = parse_value("sync.attempts", v)?;
        }
        if let Some(v) = sync.get("timeout") {
            config.sync.timeout_secs = parse_value("sync.timeout", v)?;
        }
        if let Some(v) = sync.get("sources") {
            config.sync.sources = parse_bool("sync.sources", v)?;
        }
        if let Some(v) = sync.get("installer") {
            config.sync.installer = parse_bool("sync.installer", v)?;
        }
        if let Some(v) = sync.get("contents") {
            config.sync.contents = parse_bool("sync.contents", v)?;
        }
        if let Some(v) = sync.get("translations") {
            config.sync.translations = parse_bool("sync.translations", v)?;
        }
        if let Some(v) = sync.get("verify_checksums") {
            config.sync.verify_checksums = parse_bool("sync.verify_checksums", v)?;
        }

        config.logging.directory = non_empty(logging.get("directory")).map(PathBuf::from);
        if let Some(v) = logging.get("verbose") {
            config.logging.verbose = parse_bool("logging.verbose", v)?;
        }

        Ok(config)
    }

    /// Save the configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save the configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_error = |source: std::io::Error| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }

        let mut ini = Ini::new();
        ini.with_section(Some("mirror"))
            .set("url", self.mirror.url.clone().unwrap_or_default())
            .set("scheme", self.mirror.scheme.as_str())
            .set("root_path", path_string(&self.mirror.root_path));
        ini.with_section(Some("sync"))
            .set("distributions", self.sync.distributions.join(" "))
            .set("components", self.sync.components.join(" "))
            .set("architectures", self.sync.architectures.join(" "))
            .set("threads", self.sync.threads.to_string())
            .set("attempts", self.sync.attempts.to_string())
            .set("timeout", self.sync.timeout_secs.to_string())
            .set("sources", self.sync.sources.to_string())
            .set("installer", self.sync.installer.to_string())
            .set("contents", self.sync.contents.to_string())
            .set("translations", self.sync.translations.to_string())
            .set("verify_checksums", self.sync.verify_checksums.to_string());
        ini.with_section(Some("logging"))
            .set("directory", path_string(&self.logging.directory))
            .set("verbose", self.logging.verbose.to_string());

        ini.write_to_file(path).map_err(write_error)
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn path_string(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

/// Split a whitespace or comma separated list.
pub(crate) fn parse_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}

pub(crate) fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&temp.path().join("none.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
        assert_eq!(config.sync.threads, DEFAULT_CONCURRENCY);
    }

    #[test]
    fn test_load_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        std::fs::write(
            &path,
            "[mirror]\nurl = deb.debian.org/debian\nscheme = http\nroot_path = /srv/mirror\n\
             [sync]\ndistributions = bookworm, bookworm-updates\narchitectures = amd64 arm64\n\
             threads = 8\nsources = yes\n\
             [logging]\nverbose = true\n",
        )
        .unwrap();

        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config.mirror.url.as_deref(), Some("deb.debian.org/debian"));
        assert_eq!(config.mirror.scheme, Scheme::Http);
        assert_eq!(config.mirror.root_path, Some(PathBuf::from("/srv/mirror")));
        assert_eq!(config.sync.distributions, vec!["bookworm", "bookworm-updates"]);
        assert_eq!(config.sync.architectures, vec!["amd64", "arm64"]);
        assert_eq!(config.sync.threads, 8);
        assert!(config.sync.sources);
        assert!(config.logging.verbose);
    }

    #[test]
    fn test_invalid_value() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        std::fs::write(&path, "[sync]\nthreads = many\n").unwrap();

        let err = ConfigFile::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("sync.threads"));
    }

    #[test]
    fn test_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/config.ini");

        let mut config = ConfigFile::default();
        config.mirror.url = Some("archive.ubuntu.com/ubuntu".to_string());
        config.sync.components = vec!["main".to_string(), "universe".to_string()];
        config.sync.attempts = 5;
        config.logging.directory = Some(PathBuf::from("/tmp/logs"));
        config.save_to(&path).unwrap();

        let reloaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(reloaded, config);
    }
}
