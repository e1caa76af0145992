//! DiffPlanner: turns the manifest and the local mirror into download actions.
//!
//! Decision rule for every manifest file:
//!
//! | Local file                         | Action  |
//! |------------------------------------|---------|
//! | missing                            | add     |
//! | size differs                       | replace |
//! | size matches, checksum differs     | replace |
//! | size and checksum match            | skip    |
//!
//! Checksums of local files are only computed when the sizes match and
//! local verification is enabled. Local files the manifest does not mention
//! are reported as orphans and left alone.
//!
//! Metadata of a distribution the manifest holds is not planned: changed
//! files are reported in `SyncPlan::held` and keep their previous content.

mod local;

use tracing::{debug, info, warn};

use crate::commit::is_mirror_path;
use crate::download::{ActionRole, ChangeKind, DownloadAction, FailureReason, FailureRecord};
use crate::error::{MirrorError, MirrorResult};
use crate::metadata::{ChecksumSet, MetadataKind, SkippedCombination, SyncManifest};
use crate::repo::RepoCoordinates;

pub use local::{LocalFileRecord, LocalState};

/// Output of the planner.
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    /// Metadata actions sorted by path, then package actions sorted by path.
    pub actions: Vec<DownloadAction>,
    /// Local files not in the manifest, sorted.
    pub orphans: Vec<String>,
    /// Manifest files already up to date.
    pub skipped: usize,
    pub skipped_combinations: Vec<SkippedCombination>,
    /// Out of date metadata kept at its previous state, sorted.
    pub held: Vec<FailureRecord>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Expected bytes to download.
    pub fn total_bytes(&self) -> u64 {
        self.actions.iter().map(|a| a.expected_size).sum()
    }

    pub fn count(&self, kind: ChangeKind) -> usize {
        self.actions.iter().filter(|a| a.kind == kind).count()
    }
}

/// Compares a manifest against local state.
#[derive(Debug, Clone)]
pub struct DiffPlanner {
    repository: RepoCoordinates,
    verify_local_checksums: bool,
}

impl DiffPlanner {
    pub fn new(repository: RepoCoordinates) -> Self {
        Self {
            repository,
            verify_local_checksums: true,
        }
    }

    /// Hash local files whose size matches (default) or trust the size.
    pub fn with_verify_local_checksums(mut self, verify: bool) -> Self {
        self.verify_local_checksums = verify;
        self
    }

    /// Plan the downloads that bring `local` up to `manifest`.
    ///
    /// # Errors
    ///
    /// Returns `MetadataMalformed` if a manifest file carries no checksum or
    /// its path leaves the mirror root.
    pub fn plan(&self, manifest: &SyncManifest, local: &LocalState) -> MirrorResult<SyncPlan> {
        let mut plan = SyncPlan {
            skipped_combinations: manifest.skipped_combinations().to_vec(),
            ..SyncPlan::default()
        };

        for file in manifest.index_files() {
            let Some(kind) = self.decide(&file.path, file.size, &file.checksums, local) else {
                plan.skipped += 1;
                continue;
            };
            if let Some(reason) = manifest.held_reason(&file.distribution) {
                debug!(path = %file.path, reason, "Keeping previous metadata");
                plan.held.push(FailureRecord {
                    path: file.path.clone(),
                    reason: FailureReason::DependencyFailed,
                    detail: reason.to_string(),
                    attempts: 0,
                });
                continue;
            }
            let role = match file.kind {
                MetadataKind::Release => ActionRole::Release {
                    distribution: file.distribution.clone(),
                },
                MetadataKind::PackageIndex | MetadataKind::Auxiliary => ActionRole::Index {
                    distribution: file.distribution.clone(),
                },
            };
            let mut action = self.action(&file.path, file.size, &file.checksums)?
                .with_kind(kind)
                .with_role(role)
                .with_optional(file.kind != MetadataKind::Release && file.content.is_none());
            action.content = file.content.clone();
            plan.actions.push(action);
        }

        for entry in manifest.entries() {
            let Some(kind) = self.decide(&entry.path, entry.size, &entry.checksums, local) else {
                plan.skipped += 1;
                continue;
            };
            let action = self.action(&entry.path, entry.size, &entry.checksums)?
                .with_kind(kind)
                .with_role(ActionRole::Package {
                    referenced_by: entry.indexes.iter().cloned().collect(),
                });
            plan.actions.push(action);
        }

        plan.orphans = local
            .files()
            .filter(|f| !manifest.contains(&f.path))
            .map(|f| f.path.clone())
            .collect();

        info!(
            add = plan.count(ChangeKind::Add),
            replace = plan.count(ChangeKind::Replace),
            skip = plan.skipped,
            held = plan.held.len(),
            orphans = plan.orphans.len(),
            bytes = plan.total_bytes(),
            "Plan ready"
        );
        Ok(plan)
    }

    fn action(
        &self,
        path: &str,
        size: u64,
        checksums: &ChecksumSet,
    ) -> MirrorResult<DownloadAction> {
        if !is_mirror_path(path) {
            return Err(MirrorError::malformed(path, "path leaves the mirror root"));
        }
        let checksum = checksums
            .strongest()
            .ok_or_else(|| MirrorError::malformed(path, "no checksum for file"))?;
        Ok(DownloadAction::new(
            path,
            self.repository.url_for(path),
            size,
            checksum,
        ))
    }

    /// Decide what to do with one manifest file; `None` means skip.
    fn decide(
        &self,
        path: &str,
        size: u64,
        checksums: &ChecksumSet,
        local: &LocalState,
    ) -> Option<ChangeKind> {
        let Some(record) = local.get(path) else {
            debug!(path = %path, "Missing locally");
            return Some(ChangeKind::Add);
        };

        if record.size != size {
            debug!(path = %path, local = record.size, expected = size, "Size differs");
            return Some(ChangeKind::Replace);
        }

        if !self.verify_local_checksums {
            return None;
        }
        let expected = checksums.strongest()?;

        match record.checksum(expected.kind) {
            Ok(actual) if actual.hex == expected.hex => None,
            Ok(actual) => {
                debug!(path = %path, expected = %expected, actual = %actual, "Checksum differs");
                Some(ChangeKind::Replace)
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Cannot read local file, replacing it");
                Some(ChangeKind::Replace)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{checksum_bytes, ChecksumKind, IndexEntry, IndexFile, IndexScope};
    use crate::repo::Scheme;
    use proptest::prelude::*;
    use std::collections::{BTreeMap, BTreeSet};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn planner() -> DiffPlanner {
        let repo = RepoCoordinates::from_base_url(Scheme::Http, "mirror.test/debian").unwrap();
        DiffPlanner::new(repo)
    }

    fn scope() -> IndexScope {
        IndexScope {
            distribution: "stable".to_string(),
            component: "main".to_string(),
            architecture: "amd64".to_string(),
        }
    }

    fn entry(path: &str, data: &[u8]) -> IndexEntry {
        IndexEntry {
            path: path.to_string(),
            size: data.len() as u64,
            checksums: ChecksumSet::single(checksum_bytes(data, ChecksumKind::Sha256)),
            scope: scope(),
            indexes: BTreeSet::from(["dists/stable/main/binary-amd64/Packages".to_string()]),
        }
    }

    fn manifest_with<D: AsRef<[u8]>>(entries: &[(&str, D)]) -> SyncManifest {
        let mut manifest = SyncManifest::new();
        for (path, data) in entries {
            manifest.add_entry(entry(path, data.as_ref())).unwrap();
        }
        manifest
    }

    fn write(root: &Path, relative: &str, data: &[u8]) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }

    #[test]
    fn test_missing_file_is_added() {
        let temp = TempDir::new().unwrap();
        let data = vec![1u8; 100];
        let manifest = manifest_with(&[("pool/a.deb", &data)]);

        let plan = planner()
            .plan(&manifest, &LocalState::scan(temp.path()).unwrap())
            .unwrap();

        assert_eq!(plan.actions.len(), 1);
        let action = &plan.actions[0];
        assert_eq!(action.path, "pool/a.deb");
        assert_eq!(action.kind, ChangeKind::Add);
        assert_eq!(action.url, "http://mirror.test/debian/pool/a.deb");
        assert_eq!(action.expected_size, 100);
    }

    #[test]
    fn test_identical_file_is_skipped() {
        let temp = TempDir::new().unwrap();
        let data = vec![1u8; 100];
        write(temp.path(), "pool/a.deb", &data);
        let manifest = manifest_with(&[("pool/a.deb", &data)]);

        let plan = planner()
            .plan(&manifest, &LocalState::scan(temp.path()).unwrap())
            .unwrap();

        assert!(plan.is_empty());
        assert_eq!(plan.skipped, 1);
    }

    #[test]
    fn test_size_mismatch_is_replaced() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "pool/a.deb", &[1u8; 90]);
        let manifest = manifest_with(&[("pool/a.deb", &[1u8; 100])]);

        let local = LocalState::scan(temp.path()).unwrap();
        let plan = planner().plan(&manifest, &local).unwrap();

        assert_eq!(plan.actions[0].kind, ChangeKind::Replace);
        // Sizes differ, so no hashing was needed.
        assert!(!local.get("pool/a.deb").unwrap().has_cached(ChecksumKind::Sha256));
    }

    #[test]
    fn test_checksum_mismatch_is_replaced_unless_size_only() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "pool/a.deb", b"xxxx");
        let manifest = manifest_with(&[("pool/a.deb", b"yyyy")]);
        let local = LocalState::scan(temp.path()).unwrap();

        let plan = planner().plan(&manifest, &local).unwrap();
        assert_eq!(plan.actions[0].kind, ChangeKind::Replace);

        let plan = planner()
            .with_verify_local_checksums(false)
            .plan(&manifest, &local)
            .unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_metadata_first_and_roles() {
        let temp = TempDir::new().unwrap();
        let mut manifest = manifest_with(&[("pool/b.deb", b"b"), ("pool/a.deb", b"a")]);
        for (path, kind) in [
            ("dists/stable/Release", MetadataKind::Release),
            ("dists/stable/main/binary-amd64/Packages", MetadataKind::PackageIndex),
        ] {
            manifest
                .add_index_file(IndexFile {
                    path: path.to_string(),
                    size: 1,
                    checksums: ChecksumSet::single(checksum_bytes(b"x", ChecksumKind::Sha256)),
                    kind,
                    distribution: "stable".to_string(),
                    content: None,
                })
                .unwrap();
        }

        let plan = planner()
            .plan(&manifest, &LocalState::scan(temp.path()).unwrap())
            .unwrap();
        let paths: Vec<&str> = plan.actions.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "dists/stable/Release",
                "dists/stable/main/binary-amd64/Packages",
                "pool/a.deb",
                "pool/b.deb"
            ]
        );
        assert!(matches!(plan.actions[0].role, ActionRole::Release { .. }));
        assert!(matches!(plan.actions[1].role, ActionRole::Index { .. }));
        assert!(matches!(
            &plan.actions[2].role,
            ActionRole::Package { referenced_by } if referenced_by.len() == 1
        ));
    }

    fn add_metadata(manifest: &mut SyncManifest, path: &str, kind: MetadataKind, fetched: bool) {
        manifest
            .add_index_file(IndexFile {
                path: path.to_string(),
                size: 1,
                checksums: ChecksumSet::single(checksum_bytes(b"x", ChecksumKind::Sha256)),
                kind,
                distribution: "stable".to_string(),
                content: fetched.then(|| bytes::Bytes::from_static(b"x")),
            })
            .unwrap();
    }

    #[test]
    fn test_only_unfetched_variants_are_optional() {
        let temp = TempDir::new().unwrap();
        let mut manifest = SyncManifest::new();
        for (path, kind, fetched) in [
            ("dists/stable/Release", MetadataKind::Release, true),
            ("dists/stable/main/binary-amd64/Packages", MetadataKind::PackageIndex, false),
            ("dists/stable/main/binary-amd64/Packages.gz", MetadataKind::PackageIndex, true),
            ("dists/stable/main/i18n/Translation-en", MetadataKind::Auxiliary, false),
        ] {
            add_metadata(&mut manifest, path, kind, fetched);
        }

        let plan = planner()
            .plan(&manifest, &LocalState::scan(temp.path()).unwrap())
            .unwrap();
        let optional: Vec<(&str, bool)> = plan
            .actions
            .iter()
            .map(|a| (a.path.as_str(), a.optional))
            .collect();
        assert_eq!(
            optional,
            vec![
                ("dists/stable/Release", false),
                ("dists/stable/main/binary-amd64/Packages", true),
                ("dists/stable/main/binary-amd64/Packages.gz", false),
                ("dists/stable/main/i18n/Translation-en", true),
            ]
        );
    }

    #[test]
    fn test_held_distribution_keeps_metadata() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "dists/stable/Release", b"old release");
        let mut manifest = manifest_with(&[("pool/a.deb", b"a")]);
        add_metadata(&mut manifest, "dists/stable/Release", MetadataKind::Release, true);
        add_metadata(
            &mut manifest,
            "dists/stable/main/binary-arm64/Packages.gz",
            MetadataKind::PackageIndex,
            true,
        );
        manifest.hold_distribution("stable", "main/binary-amd64/Packages.gz not found");

        let plan = planner()
            .plan(&manifest, &LocalState::scan(temp.path()).unwrap())
            .unwrap();

        let paths: Vec<&str> = plan.actions.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, vec!["pool/a.deb"]);
        let held: Vec<&str> = plan.held.iter().map(|h| h.path.as_str()).collect();
        assert_eq!(
            held,
            vec!["dists/stable/Release", "dists/stable/main/binary-arm64/Packages.gz"]
        );
        assert_eq!(plan.held[0].reason, FailureReason::DependencyFailed);
        assert!(plan.held[0].detail.contains("not found"));
        assert!(plan.orphans.is_empty());
    }

    #[test]
    fn test_path_outside_root_rejected() {
        let temp = TempDir::new().unwrap();
        let manifest = manifest_with(&[("pool/../../x.deb", b"x")]);

        let err = planner()
            .plan(&manifest, &LocalState::scan(temp.path()).unwrap())
            .unwrap_err();
        assert!(matches!(err, MirrorError::MetadataMalformed { .. }));
    }

    #[test]
    fn test_orphans_reported_not_planned() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "pool/old.deb", b"old");
        write(temp.path(), ".aptmirror/lock", b"");
        let manifest = manifest_with(&[("pool/new.deb", b"new")]);

        let plan = planner()
            .plan(&manifest, &LocalState::scan(temp.path()).unwrap())
            .unwrap();

        assert_eq!(plan.orphans, vec!["pool/old.deb"]);
        assert_eq!(plan.actions.len(), 1);
        assert!(temp.path().join("pool/old.deb").exists());
    }

    fn file_name() -> impl Strategy<Value = String> {
        "[a-z]{1,6}".prop_map(|s| format!("pool/{}.deb", s))
    }

    fn contents() -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
        prop::collection::btree_map(file_name(), prop::collection::vec(any::<u8>(), 0..32), 0..12)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn replanning_a_synced_mirror_is_empty(remote in contents(), local in contents()) {
            let temp = TempDir::new().unwrap();
            for (path, data) in &local {
                write(temp.path(), path, data);
            }

            let mut manifest = SyncManifest::new();
            for (path, data) in &remote {
                manifest.add_entry(entry(path, data)).unwrap();
            }

            let plan = planner()
                .plan(&manifest, &LocalState::scan(temp.path()).unwrap())
                .unwrap();
            let paths: BTreeSet<&str> = plan.actions.iter().map(|a| a.path.as_str()).collect();
            prop_assert_eq!(paths.len(), plan.actions.len());

            // Apply the plan as a successful sync would.
            for action in &plan.actions {
                write(temp.path(), &action.path, &remote[&action.path]);
            }

            let replan = planner()
                .plan(&manifest, &LocalState::scan(temp.path()).unwrap())
                .unwrap();
            prop_assert!(replan.actions.is_empty());
            prop_assert_eq!(replan.skipped, remote.len());
        }
    }
}
