//! Checksum types and file hashing.
//!
//! APT metadata advertises up to four digests per file. Verification always
//! uses the strongest digest available on both sides.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use sha2::Digest;

use crate::error::{MirrorError, MirrorResult};

/// Buffer size for reading files during checksum calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Digest algorithms found in APT metadata, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ChecksumKind {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl ChecksumKind {
    /// All supported algorithms, strongest first.
    pub fn strongest_first() -> [ChecksumKind; 4] {
        [Self::Sha512, Self::Sha256, Self::Sha1, Self::Md5]
    }

    /// Field name of the file list in a Release document.
    pub fn release_field(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5Sum",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
            Self::Sha512 => "SHA512",
        }
    }

    /// Field name in a Packages paragraph.
    pub fn packages_field(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5sum",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
            Self::Sha512 => "SHA512",
        }
    }

    /// Field name of the file list in a Sources paragraph.
    pub fn sources_field(&self) -> &'static str {
        match self {
            Self::Md5 => "Files",
            Self::Sha1 => "Checksums-Sha1",
            Self::Sha256 => "Checksums-Sha256",
            Self::Sha512 => "Checksums-Sha512",
        }
    }

    /// Length of the hex encoding of this digest.
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha1 => 40,
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }

    fn hasher(&self) -> StreamHasher {
        match self {
            Self::Md5 => StreamHasher::Md5(md5::Md5::new()),
            Self::Sha1 => StreamHasher::Sha1(sha1::Sha1::new()),
            Self::Sha256 => StreamHasher::Sha256(sha2::Sha256::new()),
            Self::Sha512 => StreamHasher::Sha512(sha2::Sha512::new()),
        }
    }
}

impl fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.release_field())
    }
}

/// A single digest value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Checksum {
    pub kind: ChecksumKind,
    /// Lowercase hex digest.
    pub hex: String,
}

impl Checksum {
    /// Create a checksum, normalizing the digest to lowercase.
    pub fn new(kind: ChecksumKind, hex: impl AsRef<str>) -> Self {
        Self {
            kind,
            hex: hex.as_ref().to_ascii_lowercase(),
        }
    }

    /// Parse a digest, rejecting values that are not hex of the right length.
    pub fn parse(kind: ChecksumKind, value: &str) -> Option<Self> {
        let valid = value.len() == kind.hex_len() && value.bytes().all(|b| b.is_ascii_hexdigit());
        valid.then(|| Self::new(kind, value))
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.hex)
    }
}

/// The digests advertised for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChecksumSet {
    digests: BTreeMap<ChecksumKind, String>,
}

impl ChecksumSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set holding a single checksum.
    pub fn single(checksum: Checksum) -> Self {
        let mut set = Self::new();
        set.insert(checksum);
        set
    }

    /// Add or replace a digest.
    pub fn insert(&mut self, checksum: Checksum) {
        self.digests.insert(checksum.kind, checksum.hex);
    }

    /// Get the digest for one algorithm.
    pub fn get(&self, kind: ChecksumKind) -> Option<&str> {
        self.digests.get(&kind).map(String::as_str)
    }

    /// The strongest digest in the set.
    pub fn strongest(&self) -> Option<Checksum> {
        self.digests
            .iter()
            .next_back()
            .map(|(kind, hex)| Checksum::new(*kind, hex))
    }

    /// The strongest algorithm present in both sets.
    pub fn strongest_common(&self, other: &ChecksumSet) -> Option<ChecksumKind> {
        ChecksumKind::strongest_first()
            .into_iter()
            .find(|kind| self.get(*kind).is_some() && other.get(*kind).is_some())
    }

    /// Returns true if any algorithm present in both sets disagrees.
    pub fn conflicts_with(&self, other: &ChecksumSet) -> bool {
        self.digests
            .iter()
            .any(|(kind, hex)| other.get(*kind).is_some_and(|o| o != hex))
    }

    /// Add every digest of `other` not already present.
    pub fn merge(&mut self, other: &ChecksumSet) {
        for (kind, hex) in &other.digests {
            self.digests.entry(*kind).or_insert_with(|| hex.clone());
        }
    }

    /// Iterate over all digests, weakest first.
    pub fn iter(&self) -> impl Iterator<Item = Checksum> + '_ {
        self.digests.iter().map(|(kind, hex)| Checksum::new(*kind, hex))
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    /// Number of digests in the set.
    pub fn len(&self) -> usize {
        self.digests.len()
    }
}

enum StreamHasher {
    Md5(md5::Md5),
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
    Sha512(sha2::Sha512),
}

impl StreamHasher {
    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(h) => h.update(data),
            Self::Sha1(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Md5(h) => hex::encode(h.finalize()),
            Self::Sha1(h) => hex::encode(h.finalize()),
            Self::Sha256(h) => hex::encode(h.finalize()),
            Self::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

/// Calculate a digest of in-memory data.
pub fn checksum_bytes(data: &[u8], kind: ChecksumKind) -> Checksum {
    let mut hasher = kind.hasher();
    hasher.update(data);
    Checksum::new(kind, hasher.finalize_hex())
}

/// Calculate a digest of a file.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn calculate_file_checksum(path: &Path, kind: ChecksumKind) -> MirrorResult<Checksum> {
    let mut file = File::open(path).map_err(|e| MirrorError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut hasher = kind.hasher();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| MirrorError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(Checksum::new(kind, hasher.finalize_hex()))
}

/// Verify a file's size and digest.
///
/// `display_path` is the mirror-relative path used in the error.
///
/// # Errors
///
/// Returns `IntegrityMismatch` if the size or digest differ, or `ReadFailed`
/// if the file cannot be read.
pub fn verify_file(
    path: &Path,
    display_path: &str,
    expected_size: u64,
    expected: &Checksum,
) -> MirrorResult<()> {
    let actual_size = path
        .metadata()
        .map_err(|e| MirrorError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?
        .len();

    if actual_size != expected_size {
        return Err(MirrorError::IntegrityMismatch {
            path: display_path.to_string(),
            expected: format!("{} bytes", expected_size),
            actual: format!("{} bytes", actual_size),
        });
    }

    let actual = calculate_file_checksum(path, expected.kind)?;
    if actual.hex != expected.hex {
        return Err(MirrorError::IntegrityMismatch {
            path: display_path.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}
