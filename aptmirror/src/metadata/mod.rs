//! Repository metadata: Release files, package indexes and the manifest
//! built from them.
//!
//! This module covers everything between the remote repository and the
//! [`SyncManifest`] consumed by the planner:
//! - deb822 paragraph parsing (`deb822`)
//! - Release and InRelease documents (`release`)
//! - Packages and Sources indexes (`index`)
//! - gzip and xz decompression (`compression`)
//! - checksum calculation and verification (`checksum`)
//! - the fetcher that ties them together (`fetcher`)
//!
//! # Architecture
//!
//! ```text
//! MetadataFetcher
//!         │
//!         ├── Transport (fetch_bytes)
//!         │
//!         ├── ReleaseDocument ── which indexes exist, their checksums
//!         │
//!         ├── decompress + parse_index ── package files
//!         │
//!         └── SyncManifest ── desired state of the mirror
//! ```

pub mod checksum;
pub mod compression;
pub mod deb822;
mod fetcher;
pub mod index;
mod manifest;
pub mod release;

pub use checksum::{
    calculate_file_checksum, checksum_bytes, verify_file, Checksum, ChecksumKind, ChecksumSet,
};
pub use compression::Compression;
pub use fetcher::{IndexSelection, MetadataFetcher};
pub use index::{parse_index, IndexKind, IndexParseError, PackageFile, ParsedIndex};
pub use manifest::{
    IndexEntry, IndexFile, IndexScope, MetadataKind, SkippedCombination, SyncManifest,
};
pub use release::{ReleaseDocument, ReleaseEntry};

#[cfg(test)]
pub(crate) use fetcher::tests as fixtures;
