//! MirrorCommitter: publishes verified files into the mirror.
//!
//! Downloads land in a staging area below the mirror root's private
//! directory, so they are on the same filesystem as their final location.
//! Publishing is a single rename: a reader of the mirror sees either the
//! previous file or the complete new one, never a partial write.
//!
//! ```text
//! <mirror root>/
//! ├── .aptmirror/
//! │   ├── lock
//! │   └── staging/pool/main/a/a_1.deb.part
//! ├── dists/...
//! └── pool/...
//! ```

mod lock;

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{MirrorError, MirrorResult};

pub use lock::MirrorLock;

/// Directory below the mirror root reserved for this tool.
pub const PRIVATE_DIR: &str = ".aptmirror";

const STAGING_DIR: &str = "staging";
const PART_SUFFIX: &str = ".part";

/// Returns true if `relative` names a file strictly inside the mirror root.
///
/// The path must be non-empty, consist only of plain names (no `..`, `.`,
/// or leading `/`), and must not start in the tool's private directory.
pub fn is_mirror_path(relative: &str) -> bool {
    let path = Path::new(relative);
    !relative.is_empty()
        && path.components().all(|c| matches!(c, Component::Normal(_)))
        && path
            .components()
            .next()
            .is_some_and(|c| c.as_os_str() != PRIVATE_DIR)
}

/// Temporary location for in-progress downloads.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    /// Open the staging area of `mirror_root`, discarding leftovers from an
    /// interrupted run.
    pub fn open(mirror_root: &Path) -> MirrorResult<Self> {
        let root = mirror_root.join(PRIVATE_DIR).join(STAGING_DIR);

        if root.exists() {
            debug!(path = %root.display(), "Clearing stale staging area");
            fs::remove_dir_all(&root).map_err(|e| MirrorError::WriteFailed {
                path: root.clone(),
                source: e,
            })?;
        }
        fs::create_dir_all(&root).map_err(|e| MirrorError::CreateDirFailed {
            path: root.clone(),
            source: e,
        })?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Staging path for a mirror-relative file path.
    pub fn temp_path(&self, relative: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in relative.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        let mut name = path.into_os_string();
        name.push(PART_SUFFIX);
        PathBuf::from(name)
    }
}

/// Owns all writes into the published mirror tree.
#[derive(Debug)]
pub struct MirrorCommitter {
    mirror_root: PathBuf,
    staging: StagingArea,
}

impl MirrorCommitter {
    /// Open a committer for `mirror_root`, preparing its staging area.
    pub fn open(mirror_root: impl Into<PathBuf>) -> MirrorResult<Self> {
        let mirror_root = mirror_root.into();
        let staging = StagingArea::open(&mirror_root)?;
        Ok(Self {
            mirror_root,
            staging,
        })
    }

    pub fn mirror_root(&self) -> &Path {
        &self.mirror_root
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Published location of a mirror-relative path.
    pub fn final_path(&self, relative: &str) -> PathBuf {
        let mut path = self.mirror_root.clone();
        for part in relative.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path
    }

    /// Move a verified staging file to its published location.
    ///
    /// # Arguments
    ///
    /// * `temp` - Verified file in the staging area
    /// * `relative` - Mirror-relative destination path
    ///
    /// # Errors
    ///
    /// Returns `CommitFailure` if `relative` is not a path inside the
    /// mirror, the destination directory cannot be created, or the rename
    /// fails. The staging file is removed and whatever was published at the
    /// destination before is left untouched.
    pub fn commit(&self, temp: &Path, relative: &str) -> MirrorResult<PathBuf> {
        let destination = self.final_path(relative);

        let result = if is_mirror_path(relative) {
            Self::publish(temp, &destination)
        } else {
            Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "destination is outside the mirror root",
            ))
        };
        if let Err(e) = result {
            warn!(path = %relative, error = %e, "Commit failed");
            self.discard(temp);
            return Err(MirrorError::CommitFailure {
                path: destination,
                source: e,
            });
        }

        debug!(path = %relative, "Committed");
        Ok(destination)
    }

    fn publish(temp: &Path, destination: &Path) -> io::Result<()> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::File::open(temp)?.sync_all()?;
        fs::rename(temp, destination)
    }

    /// Remove a staging file that will not be committed.
    pub fn discard(&self, temp: &Path) {
        if let Err(e) = fs::remove_file(temp) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %temp.display(), error = %e, "Failed to remove staging file");
            }
        }
    }
}
