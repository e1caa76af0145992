//! The validated configuration handed to a sync run.

use std::path::PathBuf;
use std::time::Duration;

use crate::download::transport::DEFAULT_TIMEOUT_SECS;
use crate::download::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::error::{MirrorError, MirrorResult};
use crate::repo::RepoCoordinates;

/// Default number of concurrent transfers.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Everything a sync run needs to know.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Remote repository.
    pub repository: RepoCoordinates,

    /// Local root; the mirror lives at `<root_path>/<host>/<repo path>`.
    pub root_path: PathBuf,

    /// Distributions to mirror, e.g. `bookworm`, `bookworm-updates`.
    pub distributions: Vec<String>,

    /// Components, e.g. `main contrib`.
    pub components: Vec<String>,

    /// Binary architectures, e.g. `amd64 arm64`.
    pub architectures: Vec<String>,

    /// Mirror `source/Sources` and the source packages it lists.
    pub include_sources: bool,

    /// Mirror `debian-installer/binary-<arch>` and the udebs it lists.
    pub include_installer: bool,

    /// Mirror `Contents-<arch>` files.
    pub include_contents: bool,

    /// Mirror `i18n/` translations.
    pub include_translations: bool,

    /// Maximum concurrent transfers.
    pub concurrency: usize,

    /// Attempts per file before it is given up on.
    pub max_attempts: u32,

    /// HTTP request timeout.
    pub timeout: Duration,

    /// Hash local files whose size matches before skipping them.
    pub verify_local_checksums: bool,

    pub verbose: bool,
}

impl SyncConfig {
    /// Create a configuration with default settings and no distributions.
    pub fn new(repository: RepoCoordinates, root_path: impl Into<PathBuf>) -> Self {
        Self {
            repository,
            root_path: root_path.into(),
            distributions: Vec::new(),
            components: Vec::new(),
            architectures: Vec::new(),
            include_sources: false,
            include_installer: true,
            include_contents: true,
            include_translations: true,
            concurrency: DEFAULT_CONCURRENCY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            verify_local_checksums: true,
            verbose: false,
        }
    }

    /// Add a distribution.
    pub fn with_distribution(mut self, distribution: impl Into<String>) -> Self {
        self.distributions.push(distribution.into());
        self
    }

    /// Set the components.
    pub fn with_components<I, S>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.components = components.into_iter().map(Into::into).collect();
        self
    }

    /// Set the architectures.
    pub fn with_architectures<I, S>(mut self, architectures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.architectures = architectures.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sources(mut self, include: bool) -> Self {
        self.include_sources = include;
        self
    }

    pub fn with_installer(mut self, include: bool) -> Self {
        self.include_installer = include;
        self
    }

    pub fn with_contents(mut self, include: bool) -> Self {
        self.include_contents = include;
        self
    }

    pub fn with_translations(mut self, include: bool) -> Self {
        self.include_translations = include;
        self
    }

    /// Set the maximum concurrent transfers.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the attempts per file.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the HTTP timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_verify_local_checksums(mut self, verify: bool) -> Self {
        self.verify_local_checksums = verify;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Check that the configuration describes a runnable sync.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the first problem found.
    pub fn validate(&self) -> MirrorResult<()> {
        let invalid = |msg: &str| Err(MirrorError::InvalidConfig(msg.to_string()));

        if self.repository.host.is_empty() {
            return invalid("repository host is empty");
        }
        if self.root_path.as_os_str().is_empty() {
            return invalid("root path is empty");
        }
        if self.distributions.is_empty() {
            return invalid("no distributions given");
        }
        if self.components.is_empty() {
            return invalid("no components given");
        }
        if self.architectures.is_empty() {
            return invalid("no architectures given");
        }
        if self.concurrency == 0 {
            return invalid("concurrency must be at least 1");
        }
        if self.max_attempts == 0 {
            return invalid("attempts must be at least 1");
        }

        let names = self
            .distributions
            .iter()
            .chain(&self.components)
            .chain(&self.architectures);
        for name in names {
            if name.is_empty() || name.contains("..") || name.starts_with('/') {
                return Err(MirrorError::InvalidConfig(format!(
                    "invalid name '{}'",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Local directory of this repository's mirror.
    pub fn mirror_root(&self) -> PathBuf {
        self.repository.mirror_root(&self.root_path)
    }

    /// Retry policy derived from `max_attempts`.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.max_attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::Scheme;

    fn valid() -> SyncConfig {
        let repo = RepoCoordinates::from_base_url(Scheme::Http, "deb.debian.org/debian").unwrap();
        SyncConfig::new(repo, "/srv/mirror")
            .with_distribution("bookworm")
            .with_components(["main"])
            .with_architectures(["amd64"])
    }

    #[test]
    fn test_defaults() {
        let config = valid();
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.max_attempts, 3);
        assert!(!config.include_sources);
        assert!(config.include_translations);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = valid()
            .with_concurrency(8)
            .with_max_attempts(5)
            .with_timeout(Duration::from_secs(60))
            .with_sources(true)
            .with_verbose(true);

        assert_eq!(config.concurrency, 8);
        assert_eq!(config.retry_policy().max_attempts(), 5);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(config.include_sources);
        assert_eq!(
            config.mirror_root(),
            PathBuf::from("/srv/mirror/deb.debian.org/debian")
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(valid().with_concurrency(0).validate().is_err());
        assert!(valid().with_max_attempts(0).validate().is_err());
        assert!(valid().with_components(Vec::<String>::new()).validate().is_err());
        assert!(valid().with_distribution("../etc").validate().is_err());

        let mut no_dist = valid();
        no_dist.distributions.clear();
        let err = no_dist.validate().unwrap_err();
        assert!(err.to_string().contains("no distributions"));
    }
}
