//! Common arguments and helpers shared across CLI commands.

use std::path::PathBuf;
use std::time::Duration;

use aptmirror::config::{ConfigFile, SyncConfig};
use aptmirror::repo::{RepoCoordinates, Scheme};
use clap::{Args, ValueEnum};
use dialoguer::Confirm;

use crate::error::CliError;

/// Repository scheme selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum SchemeArg {
    Http,
    Https,
}

impl From<SchemeArg> for Scheme {
    fn from(scheme: SchemeArg) -> Self {
        match scheme {
            SchemeArg::Http => Scheme::Http,
            SchemeArg::Https => Scheme::Https,
        }
    }
}

/// Which repository to mirror and where. Unset values come from config.ini.
#[derive(Debug, Clone, Default, Args)]
pub struct MirrorArgs {
    /// Repository host and path, e.g. deb.debian.org/debian
    #[arg(short, long)]
    pub url: Option<String>,

    /// Transport scheme
    #[arg(long, value_enum)]
    pub scheme: Option<SchemeArg>,

    /// Local root directory; the mirror lives in <root>/<host>/<path>
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Distributions to mirror (repeatable or comma separated)
    #[arg(short, long = "dist", value_delimiter = ',')]
    pub distributions: Vec<String>,

    /// Components to mirror
    #[arg(short, long = "component", value_delimiter = ',')]
    pub components: Vec<String>,

    /// Architectures to mirror
    #[arg(short, long = "arch", value_delimiter = ',')]
    pub architectures: Vec<String>,

    /// Parallel downloads
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Attempts per file before giving up
    #[arg(long)]
    pub attempts: Option<u32>,

    /// Request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Also mirror source packages
    #[arg(long)]
    pub sources: bool,

    /// Skip debian-installer indexes
    #[arg(long)]
    pub no_installer: bool,

    /// Skip Contents files
    #[arg(long)]
    pub no_contents: bool,

    /// Skip translation files
    #[arg(long)]
    pub no_translations: bool,

    /// Treat local files with the expected size as current without hashing them
    #[arg(long)]
    pub size_only: bool,
}

/// Resolve the sync configuration: CLI > config file > defaults.
pub fn resolve_sync_config(args: &MirrorArgs, config: &ConfigFile) -> Result<SyncConfig, CliError> {
    let url = args.url.clone().or_else(|| config.mirror.url.clone()).ok_or_else(|| {
        CliError::Config(
            "No repository URL specified. Use --url or set url in config.ini [mirror] section."
                .to_string(),
        )
    })?;
    let root = args
        .root
        .clone()
        .or_else(|| config.mirror.root_path.clone())
        .ok_or_else(|| {
            CliError::Config(
                "No mirror root specified. Use --root or set root_path in config.ini [mirror] section."
                    .to_string(),
            )
        })?;
    let scheme = args.scheme.map(Scheme::from).unwrap_or(config.mirror.scheme);

    let or_config = |cli: &[String], file: &[String]| -> Vec<String> {
        if cli.is_empty() {
            file.to_vec()
        } else {
            cli.to_vec()
        }
    };

    let repository = RepoCoordinates::from_base_url(scheme, &url)?;
    let mut sync = SyncConfig::new(repository, root)
        .with_components(or_config(&args.components, &config.sync.components))
        .with_architectures(or_config(&args.architectures, &config.sync.architectures))
        .with_concurrency(args.threads.unwrap_or(config.sync.threads))
        .with_max_attempts(args.attempts.unwrap_or(config.sync.attempts))
        .with_timeout(Duration::from_secs(
            args.timeout.unwrap_or(config.sync.timeout_secs),
        ))
        .with_sources(args.sources || config.sync.sources)
        .with_installer(!args.no_installer && config.sync.installer)
        .with_contents(!args.no_contents && config.sync.contents)
        .with_translations(!args.no_translations && config.sync.translations)
        .with_verify_local_checksums(!args.size_only && config.sync.verify_checksums);
    for distribution in or_config(&args.distributions, &config.sync.distributions) {
        sync = sync.with_distribution(distribution);
    }

    Ok(sync)
}

/// Ask before a destructive step unless `assume_yes` is set.
pub fn confirm(prompt: &str, assume_yes: bool) -> Result<bool, CliError> {
    if assume_yes {
        return Ok(true);
    }
    Ok(Confirm::new().with_prompt(prompt).default(false).interact()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> MirrorArgs {
        MirrorArgs {
            url: Some("deb.debian.org/debian".to_string()),
            root: Some(PathBuf::from("/srv/mirror")),
            distributions: vec!["bookworm".to_string()],
            ..MirrorArgs::default()
        }
    }

    #[test]
    fn test_cli_overrides_config() {
        let mut config = ConfigFile::default();
        config.mirror.url = Some("archive.ubuntu.com/ubuntu".to_string());
        config.sync.components = vec!["main".to_string(), "universe".to_string()];
        config.sync.architectures = vec!["amd64".to_string()];
        config.sync.threads = 8;

        let mut cli = args();
        cli.components = vec!["contrib".to_string()];
        cli.threads = Some(2);
        cli.scheme = Some(SchemeArg::Http);

        let sync = resolve_sync_config(&cli, &config).unwrap();
        assert_eq!(sync.repository.host, "deb.debian.org");
        assert_eq!(sync.repository.scheme, Scheme::Http);
        assert_eq!(sync.components, vec!["contrib"]);
        assert_eq!(sync.architectures, vec!["amd64"]);
        assert_eq!(sync.concurrency, 2);
        assert!(sync.validate().is_ok());
    }

    #[test]
    fn test_missing_url_is_an_error() {
        let mut cli = args();
        cli.url = None;
        let err = resolve_sync_config(&cli, &ConfigFile::default()).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn test_size_only_disables_local_hashing() {
        let mut cli = args();
        cli.size_only = true;
        let sync = resolve_sync_config(&cli, &ConfigFile::default()).unwrap();
        assert!(!sync.verify_local_checksums);
    }
}
