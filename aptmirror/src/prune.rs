//! Opt-in deletion: orphan pruning and distribution removal.
//!
//! Nothing in a sync run deletes files. These operations are only reached
//! from explicit commands, take the mirror lock, and refuse any path that
//! would leave the mirror root.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::commit::{is_mirror_path, MirrorLock};
use crate::config::SyncConfig;
use crate::error::{MirrorError, MirrorResult};
use crate::metadata::compression::{base_name, decompress};
use crate::metadata::{parse_index, Compression, IndexKind, ReleaseDocument, ReleaseEntry};
use crate::planner::LocalState;

/// What a prune or removal deleted, or would delete on a dry run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneReport {
    /// Removed files, relative to the mirror root.
    pub removed: Vec<String>,
    pub freed_bytes: u64,
    pub dirs_removed: usize,
    pub dry_run: bool,
}

impl PruneReport {
    fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
    }
}

/// Delete orphaned files from a mirror.
///
/// Directories left empty are removed as well. Paths that no longer exist
/// are skipped.
///
/// # Arguments
///
/// * `mirror_root` - Mirror directory the orphan paths are relative to
/// * `orphans` - Paths as reported by the planner
/// * `dry_run` - Only report what would be removed
///
/// # Errors
///
/// - `InvalidConfig` if any path is absolute, climbs out of the root, or
///   points into the tool's private directory. Nothing is deleted then.
/// - `MirrorLocked` if a sync holds the mirror.
/// - `WriteFailed` if a file cannot be removed.
pub fn prune_orphans(mirror_root: &Path, orphans: &[String], dry_run: bool) -> MirrorResult<PruneReport> {
    for orphan in orphans {
        check_relative(orphan)?;
    }

    let _lock = MirrorLock::acquire(mirror_root)?;
    let mut report = PruneReport::new(dry_run);

    for orphan in orphans {
        remove_file(mirror_root, orphan, &mut report)?;
    }
    if !dry_run {
        for orphan in orphans {
            report.dirs_removed += remove_empty_parents(mirror_root, orphan);
        }
    }

    info!(
        files = report.removed.len(),
        bytes = report.freed_bytes,
        dirs = report.dirs_removed,
        dry_run,
        "Pruned orphans"
    );
    Ok(report)
}

/// Delete a mirrored distribution.
///
/// Package files listed by the distribution's local indexes are removed
/// unless another locally mirrored distribution lists them too, then the
/// whole `dists/<distribution>` tree goes.
///
/// # Errors
///
/// - `InvalidConfig` if the distribution name is unsafe or not mirrored.
/// - `MetadataMalformed` if a local Release or index cannot be parsed.
/// - `MirrorLocked` if a sync holds the mirror.
/// - `WriteFailed` if a file cannot be removed.
pub fn remove_distribution(
    config: &SyncConfig,
    distribution: &str,
    dry_run: bool,
) -> MirrorResult<PruneReport> {
    check_relative(distribution)?;

    let mirror_root = config.mirror_root();
    let dists_root = mirror_root.join("dists");
    let dist_dir = dists_root.join(distribution);
    if !dist_dir.is_dir() {
        return Err(MirrorError::InvalidConfig(format!(
            "distribution '{}' is not mirrored under {}",
            distribution,
            mirror_root.display()
        )));
    }

    let _lock = MirrorLock::acquire(&mirror_root)?;

    let referenced = local_references(&dist_dir, distribution)?;
    let mut kept = BTreeSet::new();
    for other in other_distributions(&dists_root, distribution)? {
        kept.extend(local_references(&dists_root.join(&other), &other)?);
    }

    let mut report = PruneReport::new(dry_run);
    let packages: Vec<&String> = referenced.difference(&kept).collect();
    debug!(
        distribution,
        referenced = referenced.len(),
        shared = referenced.len() - packages.len(),
        "Resolved package files"
    );

    for path in &packages {
        remove_file(&mirror_root, path, &mut report)?;
    }

    let metadata = LocalState::scan(&dist_dir)?;
    for file in metadata.files() {
        report.removed.push(format!("dists/{}/{}", distribution, file.path));
        report.freed_bytes += file.size;
    }

    if !dry_run {
        fs::remove_dir_all(&dist_dir).map_err(|e| MirrorError::WriteFailed {
            path: dist_dir.clone(),
            source: e,
        })?;
        let dist_path = format!("dists/{}", distribution);
        report.dirs_removed += 1 + remove_empty_parents(&mirror_root, &dist_path);
        for path in &packages {
            report.dirs_removed += remove_empty_parents(&mirror_root, path);
        }
    }

    info!(
        distribution,
        files = report.removed.len(),
        bytes = report.freed_bytes,
        dry_run,
        "Removed distribution"
    );
    Ok(report)
}

/// Reject paths that are absolute, contain `..`, or touch the private dir.
fn check_relative(path: &str) -> MirrorResult<()> {
    if is_mirror_path(path) {
        Ok(())
    } else {
        Err(MirrorError::InvalidConfig(format!(
            "refusing to remove '{}': not a path inside the mirror",
            path
        )))
    }
}

fn remove_file(mirror_root: &Path, relative: &str, report: &mut PruneReport) -> MirrorResult<()> {
    check_relative(relative)?;
    let path = mirror_root.join(relative);
    let Ok(metadata) = fs::symlink_metadata(&path) else {
        debug!(path = %relative, "Already gone");
        return Ok(());
    };
    if metadata.is_dir() {
        warn!(path = %relative, "Is a directory, not removing");
        return Ok(());
    }

    if !report.dry_run {
        fs::remove_file(&path).map_err(|e| MirrorError::WriteFailed {
            path: path.clone(),
            source: e,
        })?;
    }
    debug!(path = %relative, dry_run = report.dry_run, "Removed");
    report.removed.push(relative.to_string());
    report.freed_bytes += metadata.len();
    Ok(())
}

/// Remove empty directories above `relative`, stopping at the mirror root.
fn remove_empty_parents(mirror_root: &Path, relative: &str) -> usize {
    let mut removed = 0;
    let mut current = Path::new(relative).parent();
    while let Some(dir) = current {
        if dir.as_os_str().is_empty() {
            break;
        }
        // Fails on non-empty directories, which ends the walk.
        if fs::remove_dir(mirror_root.join(dir)).is_err() {
            break;
        }
        removed += 1;
        current = dir.parent();
    }
    removed
}

/// Names of the other directories below `dists/`.
fn other_distributions(dists_root: &Path, distribution: &str) -> MirrorResult<Vec<String>> {
    let entries = fs::read_dir(dists_root).map_err(|e| MirrorError::ReadFailed {
        path: dists_root.to_path_buf(),
        source: e,
    })?;

    let mut names = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name != distribution && entry.path().is_dir() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Package file paths listed by the locally mirrored indexes of a
/// distribution.
///
/// A distribution without a local Release lists nothing.
fn local_references(dist_dir: &Path, distribution: &str) -> MirrorResult<BTreeSet<String>> {
    let Some(release) = read_local_release(dist_dir)? else {
        warn!(distribution, "No local Release, treating as empty");
        return Ok(BTreeSet::new());
    };

    let mut documents: BTreeMap<&str, Vec<&ReleaseEntry>> = BTreeMap::new();
    for entry in release.entries() {
        if IndexKind::from_path(&entry.path).is_some() {
            documents.entry(base_name(&entry.path)).or_default().push(entry);
        }
    }

    let mut paths = BTreeSet::new();
    for (document, variants) in documents {
        let Some(kind) = IndexKind::from_path(document) else {
            continue;
        };
        let present = variants
            .iter()
            .filter(|v| dist_dir.join(&v.path).is_file())
            .filter_map(|v| Compression::from_path(&v.path).rank().map(|rank| (rank, *v)))
            .min_by_key(|(rank, _)| *rank);
        let Some((_, variant)) = present else {
            continue;
        };

        let full_path = dist_dir.join(&variant.path);
        let source = format!("dists/{}/{}", distribution, variant.path);
        let data = fs::read(&full_path).map_err(|e| MirrorError::ReadFailed {
            path: full_path.clone(),
            source: e,
        })?;
        let text = decompress(&data, Compression::from_path(&variant.path), &source)?;
        let parsed =
            parse_index(kind, &text).map_err(|e| MirrorError::malformed(&source, e.to_string()))?;
        paths.extend(parsed.into_files().into_iter().map(|f| f.path));
    }
    Ok(paths)
}

fn read_local_release(dist_dir: &Path) -> MirrorResult<Option<ReleaseDocument>> {
    for name in ["Release", "InRelease"] {
        let path = dist_dir.join(name);
        if !path.is_file() {
            continue;
        }
        let content = fs::read_to_string(&path).map_err(|e| MirrorError::ReadFailed {
            path: path.clone(),
            source: e,
        })?;
        return ReleaseDocument::parse(&content, &path.display().to_string()).map(Some);
    }
    Ok(None)
}
