//! Repository coordinates.
//!
//! Maps repository-relative paths to remote URLs and to the on-disk layout
//! `<root>/<host>/<repo path>/...`, which mirrors the remote tree verbatim.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

use crate::error::{MirrorError, MirrorResult};

/// Transport scheme for the remote repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    #[default]
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            other => Err(MirrorError::InvalidConfig(format!(
                "unsupported scheme '{}' (expected http or https)",
                other
            ))),
        }
    }
}

/// Location of a remote repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCoordinates {
    pub scheme: Scheme,
    pub host: String,
    /// Path below the host without leading or trailing slashes; may be empty.
    pub repo_path: String,
}

impl RepoCoordinates {
    /// Parse `host/path` or a full `scheme://host/path` URL.
    ///
    /// A scheme embedded in the URL overrides `scheme`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the host is empty or the embedded scheme is
    /// not supported.
    pub fn from_base_url(scheme: Scheme, url: &str) -> MirrorResult<Self> {
        let (scheme, rest) = match url.split_once("://") {
            Some((s, rest)) => (s.parse::<Scheme>()?, rest),
            None => (scheme, url),
        };

        let rest = rest.trim_end_matches('/');
        let (host, path) = rest.split_once('/').unwrap_or((rest, ""));

        if host.is_empty() {
            return Err(MirrorError::InvalidConfig(format!(
                "repository URL '{}' has no host",
                url
            )));
        }

        Ok(Self {
            scheme,
            host: host.to_string(),
            repo_path: path.trim_matches('/').to_string(),
        })
    }

    /// Local directory holding this repository's mirror under `root`.
    pub fn mirror_root(&self, root: &Path) -> PathBuf {
        let mut dir = root.join(&self.host);
        for part in self.repo_path.split('/').filter(|p| !p.is_empty()) {
            dir.push(part);
        }
        dir
    }

    /// Remote URL for a repository-relative path.
    pub fn url_for(&self, relative: &str) -> String {
        let relative = relative.trim_start_matches('/');
        if self.repo_path.is_empty() {
            format!("{}://{}/{}", self.scheme, self.host, relative)
        } else {
            format!(
                "{}://{}/{}/{}",
                self.scheme, self.host, self.repo_path, relative
            )
        }
    }

    /// Repository-relative path of a file below `dists/<distribution>/`.
    pub fn dists_path(distribution: &str, relative: &str) -> String {
        format!("dists/{}/{}", distribution, relative)
    }
}

impl fmt::Display for RepoCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url_for(""))
    }
}
