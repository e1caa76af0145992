//! Release document parsing.
//!
//! A Release (or clear-signed InRelease) document identifies one
//! distribution snapshot and lists every index file with its size and
//! digests, one section per digest algorithm:
//!
//! ```text
//! Codename: bookworm
//! Components: main contrib
//! Architectures: amd64 arm64
//! SHA256:
//!  0ab1...  1234 main/binary-amd64/Packages.xz
//! ```

use std::collections::BTreeMap;

use super::checksum::{Checksum, ChecksumKind, ChecksumSet};
use super::deb822::parse_paragraphs;
use crate::commit::is_mirror_path;
use crate::error::{MirrorError, MirrorResult};

const SIGNED_HEADER: &str = "-----BEGIN PGP SIGNED MESSAGE-----";
const SIGNATURE_BEGIN: &str = "-----BEGIN PGP SIGNATURE-----";
const SIGNATURE_END: &str = "-----END PGP SIGNATURE-----";

/// One index file listed by a Release document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseEntry {
    /// Path relative to `dists/<distribution>/`.
    pub path: String,
    pub size: u64,
    pub checksums: ChecksumSet,
}

/// A parsed Release document.
#[derive(Debug, Clone, Default)]
pub struct ReleaseDocument {
    pub suite: Option<String>,
    pub codename: Option<String>,
    pub components: Vec<String>,
    pub architectures: Vec<String>,
    pub acquire_by_hash: bool,
    entries: BTreeMap<String, ReleaseEntry>,
}

impl ReleaseDocument {
    /// Parse a Release or InRelease document.
    ///
    /// `source` names the document in error messages.
    ///
    /// # Errors
    ///
    /// Returns `MetadataMalformed` if the document (or its signature armor)
    /// cannot be parsed, or if it has no supported checksum section.
    pub fn parse(content: &str, source: &str) -> MirrorResult<Self> {
        let body = strip_clearsign(content).map_err(|reason| MirrorError::malformed(source, reason))?;

        let paragraphs =
            parse_paragraphs(&body).map_err(|e| MirrorError::malformed(source, e.to_string()))?;
        let Some(paragraph) = paragraphs.first() else {
            return Err(MirrorError::malformed(source, "empty release document"));
        };

        let words = |name: &str| -> Vec<String> {
            paragraph
                .get(name)
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default()
        };

        let mut entries: BTreeMap<String, ReleaseEntry> = BTreeMap::new();
        let mut found_section = false;

        for kind in ChecksumKind::strongest_first() {
            if paragraph.get(kind.release_field()).is_none() {
                continue;
            }
            found_section = true;

            for line in paragraph.lines(kind.release_field()) {
                let parts: Vec<&str> = line.split_whitespace().collect();
                let [digest, size, path] = parts.as_slice() else {
                    return Err(MirrorError::malformed(
                        source,
                        format!("invalid file list line '{}'", line),
                    ));
                };
                let checksum = Checksum::parse(kind, digest).ok_or_else(|| {
                    MirrorError::malformed(
                        source,
                        format!("unsupported {} digest '{}' for {}", kind, digest, path),
                    )
                })?;
                let size = size.parse::<u64>().map_err(|_| {
                    MirrorError::malformed(source, format!("invalid size '{}' for {}", size, path))
                })?;
                if !is_mirror_path(path) {
                    return Err(MirrorError::malformed(
                        source,
                        format!("path '{}' leaves the distribution", path),
                    ));
                }

                match entries.get_mut(*path) {
                    Some(existing) if existing.size != size => {
                        return Err(MirrorError::malformed(
                            source,
                            format!(
                                "conflicting sizes for {}: {} and {}",
                                path, existing.size, size
                            ),
                        ));
                    }
                    Some(existing) => existing.checksums.insert(checksum),
                    None => {
                        entries.insert(
                            path.to_string(),
                            ReleaseEntry {
                                path: path.to_string(),
                                size,
                                checksums: ChecksumSet::single(checksum),
                            },
                        );
                    }
                }
            }
        }

        if !found_section {
            return Err(MirrorError::malformed(
                source,
                "no supported checksum section (MD5Sum, SHA1, SHA256, SHA512)",
            ));
        }

        Ok(Self {
            suite: paragraph.get("Suite").map(str::to_string),
            codename: paragraph.get("Codename").map(str::to_string),
            components: words("Components"),
            architectures: words("Architectures"),
            acquire_by_hash: paragraph
                .get("Acquire-By-Hash")
                .is_some_and(|v| v.eq_ignore_ascii_case("yes")),
            entries,
        })
    }

    /// Look up an index file by its path relative to the distribution.
    pub fn entry(&self, path: &str) -> Option<&ReleaseEntry> {
        self.entries.get(path)
    }

    /// All listed index files, sorted by path.
    pub fn entries(&self) -> impl Iterator<Item = &ReleaseEntry> {
        self.entries.values()
    }

    /// Number of listed index files.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no index files are listed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Extract the signed body of a clear-signed message.
///
/// Unsigned content is returned unchanged. The armor must be well formed;
/// the signature itself is not checked.
pub fn strip_clearsign(content: &str) -> Result<String, String> {
    let mut lines = content.lines().map(|l| l.trim_end_matches('\r'));

    match lines.by_ref().find(|l| !l.trim().is_empty()) {
        Some(first) if first == SIGNED_HEADER => {}
        _ => return Ok(content.to_string()),
    }

    // Armor headers ("Hash: SHA512") end at the first blank line.
    for line in lines.by_ref() {
        if line.is_empty() {
            break;
        }
        if !line.contains(':') {
            return Err(format!("invalid armor header '{}'", line));
        }
    }

    let mut body = String::new();
    let mut saw_signature = false;
    for line in lines.by_ref() {
        if line == SIGNATURE_BEGIN {
            saw_signature = true;
            break;
        }
        body.push_str(line.strip_prefix("- ").unwrap_or(line));
        body.push('\n');
    }

    if !saw_signature {
        return Err("signed message has no signature block".to_string());
    }
    if !lines.any(|l| l == SIGNATURE_END) {
        return Err("unterminated signature block".to_string());
    }

    Ok(body)
}
