//! MetadataFetcher: builds the sync manifest from remote metadata.
//!
//! For every distribution the fetcher retrieves the Release family
//! (`Release`, `InRelease`, `Release.gpg`), selects the index files the
//! configuration asks for, downloads one variant of each Packages/Sources
//! document into memory and parses it. Nothing is written to disk; the
//! fetched bytes travel with the manifest so they are not downloaded twice.
//!
//! # Failure scopes
//!
//! - A component/architecture combination missing from the Release file, or
//!   whose index cannot be retrieved, is skipped and recorded. In the second
//!   case the distribution's metadata is also held at its previous state,
//!   since the new Release lists an index the mirror would not have.
//! - A distribution with neither `Release` nor `InRelease` is skipped.
//! - Anything that cannot be parsed, or that does not match the checksums
//!   the Release file advertises, aborts the whole run.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::checksum::{checksum_bytes, ChecksumKind, ChecksumSet};
use super::compression::{base_name, decompress, Compression};
use super::index::{parse_index, IndexKind};
use super::manifest::{IndexEntry, IndexFile, IndexScope, MetadataKind, SyncManifest};
use super::release::{strip_clearsign, ReleaseDocument, ReleaseEntry};
use crate::config::SyncConfig;
use crate::download::transport::{Transport, TransportError};
use crate::download::RetryPolicy;
use crate::error::{MirrorError, MirrorResult};
use crate::repo::RepoCoordinates;

const RELEASE: &str = "Release";
const IN_RELEASE: &str = "InRelease";
const RELEASE_GPG: &str = "Release.gpg";

/// Which parts of each distribution to mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSelection {
    pub components: Vec<String>,
    pub architectures: Vec<String>,
    pub include_sources: bool,
    pub include_installer: bool,
    pub include_contents: bool,
    pub include_translations: bool,
}

impl IndexSelection {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            components: config.components.clone(),
            architectures: config.architectures.clone(),
            include_sources: config.include_sources,
            include_installer: config.include_installer,
            include_contents: config.include_contents,
            include_translations: config.include_translations,
        }
    }

    fn has_arch(&self, arch: &str) -> bool {
        self.architectures.iter().any(|a| a == arch)
    }

    /// Classify a path relative to `dists/<distribution>/`.
    fn classify(&self, path: &str) -> Option<Group> {
        if !path.contains('/') {
            return self.is_wanted_contents(path).then_some(Group::Auxiliary);
        }

        // Longest match first so `updates/main` wins over `updates`.
        let mut components: Vec<&String> = self.components.iter().collect();
        components.sort_by_key(|c| std::cmp::Reverse(c.len()));

        for component in components {
            let Some(rest) = path
                .strip_prefix(component.as_str())
                .and_then(|r| r.strip_prefix('/'))
            else {
                continue;
            };
            let parts: Vec<&str> = rest.split('/').collect();

            return match parts.as_slice() {
                [dir, _, ..] if dir.starts_with("binary-") => {
                    let arch = dir.trim_start_matches("binary-");
                    self.has_arch(arch).then(|| Group::Binary {
                        component: component.clone(),
                        architecture: arch.to_string(),
                    })
                }
                ["debian-installer", dir, _, ..] if dir.starts_with("binary-") => {
                    let arch = dir.trim_start_matches("binary-");
                    (self.include_installer && self.has_arch(arch)).then(|| Group::Installer {
                        component: component.clone(),
                        architecture: arch.to_string(),
                    })
                }
                ["source", _, ..] => self.include_sources.then(|| Group::Source {
                    component: component.clone(),
                }),
                ["i18n", _, ..] => self.include_translations.then_some(Group::Auxiliary),
                [file] => self.is_wanted_contents(file).then_some(Group::Auxiliary),
                _ => None,
            };
        }
        None
    }

    fn is_wanted_contents(&self, file: &str) -> bool {
        if !self.include_contents {
            return false;
        }
        let Some(target) = base_name(file).strip_prefix("Contents-") else {
            return false;
        };
        match target.strip_prefix("udeb-") {
            Some(arch) => self.include_installer && self.has_arch(arch),
            None if target == "source" => self.include_sources,
            None => self.has_arch(target),
        }
    }
}

/// Release entries that share commit-ordering and skip semantics.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Group {
    Binary {
        component: String,
        architecture: String,
    },
    Installer {
        component: String,
        architecture: String,
    },
    Source {
        component: String,
    },
    Auxiliary,
}

impl Group {
    fn scope(&self, distribution: &str) -> Option<IndexScope> {
        let (component, architecture) = match self {
            Self::Binary {
                component,
                architecture,
            } => (component.clone(), architecture.clone()),
            Self::Installer {
                component,
                architecture,
            } => (format!("{}/debian-installer", component), architecture.clone()),
            Self::Source { component } => (component.clone(), "source".to_string()),
            Self::Auxiliary => return None,
        };
        Some(IndexScope {
            distribution: distribution.to_string(),
            component,
            architecture,
        })
    }

    fn index_kind(&self) -> Option<IndexKind> {
        match self {
            Self::Binary { .. } | Self::Installer { .. } => Some(IndexKind::Packages),
            Self::Source { .. } => Some(IndexKind::Sources),
            Self::Auxiliary => None,
        }
    }
}

/// Retrieves and parses repository metadata.
pub struct MetadataFetcher {
    transport: Arc<dyn Transport>,
    repository: RepoCoordinates,
    selection: IndexSelection,
    policy: RetryPolicy,
}

impl MetadataFetcher {
    /// Create a fetcher for the repository and selection in `config`.
    pub fn new(transport: Arc<dyn Transport>, config: &SyncConfig) -> Self {
        Self {
            transport,
            repository: config.repository.clone(),
            selection: IndexSelection::from_config(config),
            policy: config.retry_policy(),
        }
    }

    /// Use a different retry policy for metadata requests.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build the manifest for `distributions`.
    ///
    /// # Errors
    ///
    /// - `MetadataMalformed` if any document cannot be parsed or does not
    ///   match its advertised checksum.
    /// - `MetadataUnavailable` if no distribution could be fetched at all.
    pub async fn fetch(&self, distributions: &[String]) -> MirrorResult<SyncManifest> {
        let mut manifest = SyncManifest::new();

        for distribution in distributions {
            self.fetch_distribution(distribution, &mut manifest).await?;
        }

        if manifest.is_empty() {
            return Err(MirrorError::unavailable(
                self.repository.to_string(),
                "no distribution could be fetched",
            ));
        }

        info!(
            files = manifest.len(),
            bytes = manifest.total_size(),
            skipped = manifest.skipped_combinations().len(),
            "Manifest built"
        );
        Ok(manifest)
    }

    async fn fetch_distribution(
        &self,
        distribution: &str,
        manifest: &mut SyncManifest,
    ) -> MirrorResult<()> {
        let release_bytes = self.fetch_release_part(distribution, RELEASE).await;
        let inrelease_bytes = self.fetch_release_part(distribution, IN_RELEASE).await;
        let gpg_bytes = self.fetch_release_part(distribution, RELEASE_GPG).await;

        let release = match (&release_bytes, &inrelease_bytes) {
            (None, None) => {
                warn!(distribution = %distribution, "No Release or InRelease, skipping distribution");
                for scope in self.requested_scopes(distribution) {
                    manifest.record_skipped(scope, "distribution has no Release file");
                }
                return Ok(());
            }
            (Some(bytes), inrelease) => {
                if let Some(signed) = inrelease {
                    let path = RepoCoordinates::dists_path(distribution, IN_RELEASE);
                    strip_clearsign(&utf8(signed, &path)?)
                        .map_err(|reason| MirrorError::malformed(path, reason))?;
                }
                let path = RepoCoordinates::dists_path(distribution, RELEASE);
                ReleaseDocument::parse(&utf8(bytes, &path)?, &path)?
            }
            (None, Some(signed)) => {
                let path = RepoCoordinates::dists_path(distribution, IN_RELEASE);
                let body = strip_clearsign(&utf8(signed, &path)?)
                    .map_err(|reason| MirrorError::malformed(&path, reason))?;
                ReleaseDocument::parse(&body, &path)?
            }
        };

        info!(
            distribution = %distribution,
            codename = release.codename.as_deref().unwrap_or("-"),
            listed = release.len(),
            by_hash = release.acquire_by_hash,
            "Release parsed"
        );

        // Group the listed files.
        let mut groups: BTreeMap<Group, Vec<&ReleaseEntry>> = BTreeMap::new();
        for entry in release.entries() {
            if let Some(group) = self.selection.classify(&entry.path) {
                groups.entry(group).or_default().push(entry);
            }
        }

        for scope in self.requested_scopes(distribution) {
            let group = if scope.architecture == "source" {
                Group::Source {
                    component: scope.component.clone(),
                }
            } else {
                Group::Binary {
                    component: scope.component.clone(),
                    architecture: scope.architecture.clone(),
                }
            };
            let has_index = groups.get(&group).is_some_and(|entries| {
                entries
                    .iter()
                    .any(|e| IndexKind::from_path(&e.path) == group.index_kind())
            });
            if !has_index {
                warn!(scope = %scope, "Combination not listed in Release, skipping");
                manifest.record_skipped(scope, "index not listed in Release");
                groups.remove(&group);
            }
        }

        for (group, entries) in &groups {
            self.add_group(distribution, group, entries, manifest).await?;
        }

        for (name, bytes) in [
            (RELEASE, release_bytes),
            (IN_RELEASE, inrelease_bytes),
            (RELEASE_GPG, gpg_bytes),
        ] {
            if let Some(bytes) = bytes {
                manifest.add_index_file(IndexFile {
                    path: RepoCoordinates::dists_path(distribution, name),
                    size: bytes.len() as u64,
                    checksums: ChecksumSet::single(checksum_bytes(&bytes, ChecksumKind::Sha256)),
                    kind: MetadataKind::Release,
                    distribution: distribution.to_string(),
                    content: Some(bytes),
                })?;
            }
        }

        Ok(())
    }

    /// Add one group's files to the manifest, parsing its index documents.
    async fn add_group(
        &self,
        distribution: &str,
        group: &Group,
        entries: &[&ReleaseEntry],
        manifest: &mut SyncManifest,
    ) -> MirrorResult<()> {
        let mirror_path = |rel: &str| RepoCoordinates::dists_path(distribution, rel);

        let Some(kind) = group.index_kind() else {
            for entry in entries {
                manifest.add_index_file(index_file(distribution, entry, MetadataKind::Auxiliary))?;
            }
            return Ok(());
        };
        let scope = group
            .scope(distribution)
            .ok_or_else(|| MirrorError::malformed(distribution, "index group without scope"))?;

        // Variants of the same document, keyed by name without compression.
        let mut documents: BTreeMap<&str, Vec<&ReleaseEntry>> = BTreeMap::new();
        let mut others = Vec::new();
        for entry in entries {
            if IndexKind::from_path(&entry.path) == Some(kind) {
                documents.entry(base_name(&entry.path)).or_default().push(*entry);
            } else {
                others.push(*entry);
            }
        }

        let mut parsed_entries = Vec::new();
        let mut contents: BTreeMap<String, Bytes> = BTreeMap::new();

        for (document, variants) in &documents {
            let Some(chosen) = variants
                .iter()
                .filter(|v| Compression::from_path(&v.path).rank().is_some())
                .min_by_key(|v| Compression::from_path(&v.path).rank())
            else {
                warn!(scope = %scope, document = %document, "No supported compression, skipping");
                manifest.record_skipped(scope, format!("{} has no supported compression", document));
                return Ok(());
            };

            let path = mirror_path(&chosen.path);
            let url = self.repository.url_for(&path);
            let bytes = match self.fetch_document(&url).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    warn!(scope = %scope, url = %url, "Index not found, skipping");
                    let reason = format!("{} not found", path);
                    manifest.hold_distribution(distribution, reason.clone());
                    manifest.record_skipped(scope, reason);
                    return Ok(());
                }
                Err(e) => {
                    warn!(scope = %scope, error = %e, "Index unavailable, skipping");
                    let reason = format!("{}: {}", path, e);
                    manifest.hold_distribution(distribution, reason.clone());
                    manifest.record_skipped(scope, reason);
                    return Ok(());
                }
            };

            verify_against_release(&bytes, chosen, &path)?;

            let text = decompress(&bytes, Compression::from_path(&chosen.path), &path)?;
            let parsed =
                parse_index(kind, &text).map_err(|e| MirrorError::malformed(&path, e.to_string()))?;

            let referencing: BTreeSet<String> =
                variants.iter().map(|v| mirror_path(&v.path)).collect();
            debug!(
                index = %path,
                files = parsed.files().len(),
                "Index parsed"
            );

            for file in parsed.into_files() {
                parsed_entries.push(IndexEntry {
                    path: file.path,
                    size: file.size,
                    checksums: file.checksums,
                    scope: scope.clone(),
                    indexes: referencing.clone(),
                });
            }
            contents.insert(path, bytes);
        }

        // Only publish the group once every document in it parsed.
        for entry in parsed_entries {
            manifest.add_entry(entry)?;
        }
        for variants in documents.values() {
            for entry in variants {
                let mut file = index_file(distribution, entry, MetadataKind::PackageIndex);
                file.content = contents.remove(&file.path);
                manifest.add_index_file(file)?;
            }
        }
        for entry in others {
            manifest.add_index_file(index_file(distribution, entry, MetadataKind::Auxiliary))?;
        }

        Ok(())
    }

    /// Fetch one member of the Release family. Failures mean "absent".
    async fn fetch_release_part(&self, distribution: &str, name: &str) -> Option<Bytes> {
        let url = self
            .repository
            .url_for(&RepoCoordinates::dists_path(distribution, name));
        match self.fetch_document(&url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to fetch release document");
                None
            }
        }
    }

    /// Fetch a document into memory, retrying transient failures.
    ///
    /// Returns `Ok(None)` if the server does not have it.
    async fn fetch_document(&self, url: &str) -> Result<Option<Bytes>, TransportError> {
        let mut attempt = 1;
        loop {
            match self.transport.fetch_bytes(url).await {
                Ok(bytes) => return Ok(Some(bytes)),
                Err(TransportError::NotFound { .. }) => return Ok(None),
                Err(e) if e.is_retryable() => match self.policy.delay_for_attempt(attempt) {
                    Some(delay) => {
                        debug!(url = %url, attempt, error = %e, "Retrying metadata request");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// Every requested component/architecture scope, sources included.
    fn requested_scopes(&self, distribution: &str) -> Vec<IndexScope> {
        let mut scopes = Vec::new();
        for component in &self.selection.components {
            for architecture in &self.selection.architectures {
                scopes.push(IndexScope {
                    distribution: distribution.to_string(),
                    component: component.clone(),
                    architecture: architecture.clone(),
                });
            }
            if self.selection.include_sources {
                scopes.push(IndexScope {
                    distribution: distribution.to_string(),
                    component: component.clone(),
                    architecture: "source".to_string(),
                });
            }
        }
        scopes
    }
}

fn index_file(distribution: &str, entry: &ReleaseEntry, kind: MetadataKind) -> IndexFile {
    IndexFile {
        path: RepoCoordinates::dists_path(distribution, &entry.path),
        size: entry.size,
        checksums: entry.checksums.clone(),
        kind,
        distribution: distribution.to_string(),
        content: None,
    }
}

fn utf8(bytes: &Bytes, path: &str) -> MirrorResult<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| MirrorError::malformed(path, format!("invalid UTF-8: {}", e)))
}

/// Check fetched index bytes against the Release file list.
fn verify_against_release(bytes: &[u8], entry: &ReleaseEntry, path: &str) -> MirrorResult<()> {
    if bytes.len() as u64 != entry.size {
        return Err(MirrorError::malformed(
            path,
            format!(
                "size {} does not match Release ({} bytes)",
                bytes.len(),
                entry.size
            ),
        ));
    }

    let expected = entry
        .checksums
        .strongest()
        .ok_or_else(|| MirrorError::malformed(path, "no checksum in Release"))?;
    let actual = checksum_bytes(bytes, expected.kind);
    if actual.hex != expected.hex {
        return Err(MirrorError::malformed(
            path,
            format!("checksum {} does not match Release ({})", actual, expected),
        ));
    }
    Ok(())
}
