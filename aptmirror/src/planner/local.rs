//! Observed state of the local mirror.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use crate::commit::PRIVATE_DIR;
use crate::error::{MirrorError, MirrorResult};
use crate::metadata::{calculate_file_checksum, Checksum, ChecksumKind, ChecksumSet};

/// A file already present in the mirror.
///
/// The checksum is only computed when first asked for and then cached.
#[derive(Debug)]
pub struct LocalFileRecord {
    /// Path relative to the mirror root.
    pub path: String,
    pub size: u64,
    full_path: PathBuf,
    checksums: Mutex<ChecksumSet>,
}

impl LocalFileRecord {
    pub fn new(path: impl Into<String>, full_path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
            full_path: full_path.into(),
            checksums: Mutex::new(ChecksumSet::new()),
        }
    }

    pub fn full_path(&self) -> &Path {
        &self.full_path
    }

    /// Digest of the file, computed on first use.
    ///
    /// # Errors
    ///
    /// Returns `ReadFailed` if the file cannot be read.
    pub fn checksum(&self, kind: ChecksumKind) -> MirrorResult<Checksum> {
        if let Some(hex) = self.checksums.lock().get(kind) {
            return Ok(Checksum::new(kind, hex));
        }

        let checksum = calculate_file_checksum(&self.full_path, kind)?;
        self.checksums.lock().insert(checksum.clone());
        Ok(checksum)
    }

    /// Returns true if a digest of `kind` has been computed.
    #[cfg(test)]
    pub(crate) fn has_cached(&self, kind: ChecksumKind) -> bool {
        self.checksums.lock().get(kind).is_some()
    }
}

/// Every regular file below a mirror root, keyed by relative path.
#[derive(Debug, Default)]
pub struct LocalState {
    files: BTreeMap<String, LocalFileRecord>,
}

impl LocalState {
    /// Scan `mirror_root`. A missing root is an empty mirror.
    ///
    /// The tool's private directory is not part of the mirror and is skipped.
    ///
    /// # Errors
    ///
    /// Returns `ReadFailed` if a directory cannot be listed.
    pub fn scan(mirror_root: &Path) -> MirrorResult<Self> {
        let mut state = Self::default();
        if !mirror_root.exists() {
            debug!(root = %mirror_root.display(), "Mirror root does not exist yet");
            return Ok(state);
        }

        let mut pending = vec![(mirror_root.to_path_buf(), String::new())];
        while let Some((dir, prefix)) = pending.pop() {
            let entries = fs::read_dir(&dir).map_err(|e| MirrorError::ReadFailed {
                path: dir.clone(),
                source: e,
            })?;

            for entry in entries {
                let entry = entry.map_err(|e| MirrorError::ReadFailed {
                    path: dir.clone(),
                    source: e,
                })?;
                let name = entry.file_name().to_string_lossy().into_owned();
                let relative = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", prefix, name)
                };
                if relative == PRIVATE_DIR {
                    continue;
                }

                let path = entry.path();
                let file_type = entry.file_type().map_err(|e| MirrorError::ReadFailed {
                    path: path.clone(),
                    source: e,
                })?;

                if file_type.is_dir() {
                    pending.push((path, relative));
                } else if file_type.is_file() {
                    let size = entry
                        .metadata()
                        .map_err(|e| MirrorError::ReadFailed {
                            path: path.clone(),
                            source: e,
                        })?
                        .len();
                    state
                        .files
                        .insert(relative.clone(), LocalFileRecord::new(relative, path, size));
                }
            }
        }

        debug!(
            root = %mirror_root.display(),
            files = state.files.len(),
            "Scanned local mirror"
        );
        Ok(state)
    }

    /// Add a record, replacing any previous one at the same path.
    pub fn insert(&mut self, record: LocalFileRecord) {
        self.files.insert(record.path.clone(), record);
    }

    pub fn get(&self, path: &str) -> Option<&LocalFileRecord> {
        self.files.get(path)
    }

    /// Records sorted by path.
    pub fn files(&self) -> impl Iterator<Item = &LocalFileRecord> {
        self.files.values()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
