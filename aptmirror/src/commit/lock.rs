//! Advisory lock on a mirror root.
//!
//! Only one process may sync, prune or remove on a given mirror at a time.
//! The lock is held on `<mirror root>/.aptmirror/lock` for as long as the
//! [`MirrorLock`] value lives.

use std::fs::File;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use super::PRIVATE_DIR;
use crate::error::{MirrorError, MirrorResult};

const LOCK_FILE: &str = "lock";

/// Exclusive advisory lock, released on drop.
#[derive(Debug)]
pub struct MirrorLock {
    file: File,
    path: PathBuf,
}

impl MirrorLock {
    /// Take the lock for `mirror_root` without waiting.
    ///
    /// # Errors
    ///
    /// Returns `MirrorLocked` if another process holds it, or an I/O error
    /// if the lock file cannot be created.
    pub fn acquire(mirror_root: &Path) -> MirrorResult<Self> {
        let dir = mirror_root.join(PRIVATE_DIR);
        std::fs::create_dir_all(&dir).map_err(|e| MirrorError::CreateDirFailed {
            path: dir.clone(),
            source: e,
        })?;

        let path = dir.join(LOCK_FILE);
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| MirrorError::WriteFailed {
                path: path.clone(),
                source: e,
            })?;

        if file.try_lock_exclusive().is_err() {
            return Err(MirrorError::MirrorLocked {
                path: mirror_root.to_path_buf(),
            });
        }

        debug!(path = %path.display(), "Mirror lock acquired");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MirrorLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_is_exclusive() {
        let temp = TempDir::new().unwrap();

        let lock = MirrorLock::acquire(temp.path()).unwrap();
        assert!(lock.path().exists());

        let err = MirrorLock::acquire(temp.path()).unwrap_err();
        assert!(matches!(err, MirrorError::MirrorLocked { .. }));

        drop(lock);
        assert!(MirrorLock::acquire(temp.path()).is_ok());
    }
}
