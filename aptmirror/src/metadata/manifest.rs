//! The sync manifest: every file a consistent mirror must contain.

use std::collections::{BTreeMap, BTreeSet};

use bytes::Bytes;
use serde::Serialize;

use super::checksum::ChecksumSet;
use crate::error::{MirrorError, MirrorResult};

/// The component/architecture pair an index document belongs to.
///
/// Source indexes use the architecture `source`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct IndexScope {
    pub distribution: String,
    pub component: String,
    pub architecture: String,
}

impl std::fmt::Display for IndexScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.distribution, self.component, self.architecture
        )
    }
}

/// One package file described by an index document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Path relative to the mirror root.
    pub path: String,
    pub size: u64,
    pub checksums: ChecksumSet,
    /// Scope of the first index that listed this file.
    pub scope: IndexScope,
    /// Mirror-relative paths of every index document listing this file.
    pub indexes: BTreeSet<String>,
}

/// Role of a metadata file in commit ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKind {
    /// `Release`, `InRelease`, `Release.gpg`: committed after every other
    /// metadata file of the distribution.
    Release,
    /// Packages/Sources documents: committed after the files they list.
    PackageIndex,
    /// Contents, translations and other files without references.
    Auxiliary,
}

/// A metadata file below `dists/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFile {
    /// Path relative to the mirror root.
    pub path: String,
    pub size: u64,
    pub checksums: ChecksumSet,
    pub kind: MetadataKind,
    pub distribution: String,
    /// Bytes already fetched while building the manifest.
    pub content: Option<Bytes>,
}

/// A component/architecture combination left out of the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedCombination {
    pub scope: IndexScope,
    pub reason: String,
}

/// All files expected in the mirror after a successful run.
///
/// Paths are unique across package entries and metadata files.
#[derive(Debug, Clone, Default)]
pub struct SyncManifest {
    entries: BTreeMap<String, IndexEntry>,
    index_files: BTreeMap<String, IndexFile>,
    skipped: Vec<SkippedCombination>,
    /// Distributions whose metadata must keep its previous state, with the
    /// reason.
    held: BTreeMap<String, String>,
}

impl SyncManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package entry, merging it with an identical existing one.
    ///
    /// # Errors
    ///
    /// Returns `MetadataMalformed` if the path is already known with a
    /// different size or checksum, or is also a metadata file.
    pub fn add_entry(&mut self, entry: IndexEntry) -> MirrorResult<()> {
        if self.index_files.contains_key(&entry.path) {
            return Err(MirrorError::malformed(
                &entry.path,
                "package path collides with a metadata file",
            ));
        }

        match self.entries.get_mut(&entry.path) {
            Some(existing) => {
                if existing.size != entry.size || existing.checksums.conflicts_with(&entry.checksums)
                {
                    return Err(MirrorError::malformed(
                        &entry.path,
                        format!(
                            "listed with conflicting size or checksum by {} and {}",
                            first_index(&existing.indexes),
                            first_index(&entry.indexes)
                        ),
                    ));
                }
                existing.checksums.merge(&entry.checksums);
                existing.indexes.extend(entry.indexes);
            }
            None => {
                self.entries.insert(entry.path.clone(), entry);
            }
        }
        Ok(())
    }

    /// Add a metadata file.
    ///
    /// # Errors
    ///
    /// Returns `MetadataMalformed` if the path is already present.
    pub fn add_index_file(&mut self, file: IndexFile) -> MirrorResult<()> {
        if self.entries.contains_key(&file.path) || self.index_files.contains_key(&file.path) {
            return Err(MirrorError::malformed(&file.path, "duplicate metadata path"));
        }
        self.index_files.insert(file.path.clone(), file);
        Ok(())
    }

    pub fn record_skipped(&mut self, scope: IndexScope, reason: impl Into<String>) {
        self.skipped.push(SkippedCombination {
            scope,
            reason: reason.into(),
        });
    }

    /// Keep the published metadata of `distribution` as it is.
    ///
    /// Used when an index the Release lists could not be retrieved: the new
    /// Release would advertise a document the mirror does not have. The
    /// first reason recorded is kept.
    pub fn hold_distribution(&mut self, distribution: &str, reason: impl Into<String>) {
        self.held
            .entry(distribution.to_string())
            .or_insert_with(|| reason.into());
    }

    /// Why the metadata of `distribution` is held, if it is.
    pub fn held_reason(&self, distribution: &str) -> Option<&str> {
        self.held.get(distribution).map(String::as_str)
    }

    /// Package entries, sorted by path.
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    /// Metadata files, sorted by path.
    pub fn index_files(&self) -> impl Iterator<Item = &IndexFile> {
        self.index_files.values()
    }

    pub fn entry(&self, path: &str) -> Option<&IndexEntry> {
        self.entries.get(path)
    }

    pub fn index_file(&self, path: &str) -> Option<&IndexFile> {
        self.index_files.get(path)
    }

    /// Returns true if `path` is a package entry or a metadata file.
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path) || self.index_files.contains_key(path)
    }

    pub fn skipped_combinations(&self) -> &[SkippedCombination] {
        &self.skipped
    }

    /// Total number of files (package entries plus metadata files).
    pub fn len(&self) -> usize {
        self.entries.len() + self.index_files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.index_files.is_empty()
    }

    /// Total size of every file in the manifest.
    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|e| e.size).sum::<u64>()
            + self.index_files.values().map(|f| f.size).sum::<u64>()
    }
}

fn first_index(indexes: &BTreeSet<String>) -> &str {
    indexes.iter().next().map(String::as_str).unwrap_or("<unknown>")
}
