//! Packages and Sources index parsing.
//!
//! Both document kinds parse into the same [`ParsedIndex`] value so the rest
//! of the pipeline never needs to know which one it is looking at.

use thiserror::Error;

use super::checksum::{Checksum, ChecksumKind, ChecksumSet};
use super::deb822::{parse_paragraphs, Paragraph, SyntaxError};
use crate::commit::is_mirror_path;

/// Kind of index document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// `binary-<arch>/Packages`, including debian-installer indexes.
    Packages,
    /// `source/Sources`.
    Sources,
}

impl IndexKind {
    /// Classify an index path (with or without a compression extension).
    pub fn from_path(path: &str) -> Option<Self> {
        let name = super::compression::base_name(path);
        let file = name.rsplit('/').next().unwrap_or(name);
        match file {
            "Packages" => Some(Self::Packages),
            "Sources" => Some(Self::Sources),
            _ => None,
        }
    }
}

/// A file referenced by an index document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFile {
    /// Path relative to the repository root, e.g. `pool/main/h/hello/hello_1.0.deb`.
    pub path: String,
    pub size: u64,
    pub checksums: ChecksumSet,
}

/// Result of parsing one index document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedIndex {
    Packages(Vec<PackageFile>),
    Sources(Vec<PackageFile>),
}

impl ParsedIndex {
    /// Every file the index references.
    pub fn files(&self) -> &[PackageFile] {
        match self {
            Self::Packages(files) | Self::Sources(files) => files,
        }
    }

    /// Consume the index, returning the referenced files.
    pub fn into_files(self) -> Vec<PackageFile> {
        match self {
            Self::Packages(files) | Self::Sources(files) => files,
        }
    }
}

/// Why an index document could not be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexParseError {
    #[error("{0}")]
    Syntax(#[from] SyntaxError),

    #[error("paragraph {paragraph}: missing {field}")]
    MissingField {
        paragraph: usize,
        field: &'static str,
    },

    #[error("paragraph {paragraph}: invalid {field} '{value}'")]
    InvalidField {
        paragraph: usize,
        field: &'static str,
        value: String,
    },

    #[error("paragraph {paragraph}: no supported checksum for {path}")]
    NoChecksum { paragraph: usize, path: String },

    #[error("paragraph {paragraph}: conflicting sizes for {path}")]
    ConflictingSize { paragraph: usize, path: String },

    #[error("paragraph {paragraph}: path '{path}' leaves the repository")]
    UnsafePath { paragraph: usize, path: String },
}

/// Parse an index document of the given kind.
pub fn parse_index(kind: IndexKind, content: &str) -> Result<ParsedIndex, IndexParseError> {
    let paragraphs = parse_paragraphs(content)?;

    match kind {
        IndexKind::Packages => {
            let files = paragraphs
                .iter()
                .enumerate()
                .map(|(i, p)| parse_binary_paragraph(i + 1, p))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ParsedIndex::Packages(files))
        }
        IndexKind::Sources => {
            let mut files = Vec::new();
            for (i, p) in paragraphs.iter().enumerate() {
                files.extend(parse_source_paragraph(i + 1, p)?);
            }
            Ok(ParsedIndex::Sources(files))
        }
    }
}

fn parse_binary_paragraph(
    paragraph: usize,
    p: &Paragraph,
) -> Result<PackageFile, IndexParseError> {
    let path = p
        .get("Filename")
        .filter(|v| !v.is_empty())
        .ok_or(IndexParseError::MissingField {
            paragraph,
            field: "Filename",
        })?;
    let size_field = p.get("Size").ok_or(IndexParseError::MissingField {
        paragraph,
        field: "Size",
    })?;
    let size = parse_size(paragraph, size_field)?;

    let mut checksums = ChecksumSet::new();
    for kind in ChecksumKind::strongest_first() {
        if let Some(value) = p.get(kind.packages_field()) {
            let checksum =
                Checksum::parse(kind, value).ok_or_else(|| IndexParseError::InvalidField {
                    paragraph,
                    field: kind.packages_field(),
                    value: value.to_string(),
                })?;
            checksums.insert(checksum);
        }
    }

    if checksums.is_empty() {
        return Err(IndexParseError::NoChecksum {
            paragraph,
            path: path.to_string(),
        });
    }
    check_path(paragraph, path)?;

    Ok(PackageFile {
        path: path.to_string(),
        size,
        checksums,
    })
}

/// A Sources paragraph lists several files under one `Directory`, once per
/// checksum field. Lines are `<digest> <size> <name>`.
fn parse_source_paragraph(
    paragraph: usize,
    p: &Paragraph,
) -> Result<Vec<PackageFile>, IndexParseError> {
    let directory = p
        .get("Directory")
        .filter(|v| !v.is_empty())
        .ok_or(IndexParseError::MissingField {
            paragraph,
            field: "Directory",
        })?
        .trim_end_matches('/');

    let mut files: Vec<PackageFile> = Vec::new();

    for kind in ChecksumKind::strongest_first() {
        let field = kind.sources_field();
        for line in p.lines(field) {
            let parts: Vec<&str> = line.split_whitespace().collect();
            let [digest, size, name] = parts.as_slice() else {
                return Err(IndexParseError::InvalidField {
                    paragraph,
                    field,
                    value: line.to_string(),
                });
            };
            let checksum =
                Checksum::parse(kind, digest).ok_or_else(|| IndexParseError::InvalidField {
                    paragraph,
                    field,
                    value: digest.to_string(),
                })?;
            let size = parse_size(paragraph, size)?;
            let path = format!("{}/{}", directory, name);
            check_path(paragraph, &path)?;

            match files.iter_mut().find(|f| f.path == path) {
                Some(existing) if existing.size != size => {
                    return Err(IndexParseError::ConflictingSize { paragraph, path });
                }
                Some(existing) => existing.checksums.insert(checksum),
                None => files.push(PackageFile {
                    path,
                    size,
                    checksums: ChecksumSet::single(checksum),
                }),
            }
        }
    }

    if files.is_empty() {
        return Err(IndexParseError::MissingField {
            paragraph,
            field: "Files",
        });
    }

    Ok(files)
}

fn check_path(paragraph: usize, path: &str) -> Result<(), IndexParseError> {
    if is_mirror_path(path) {
        Ok(())
    } else {
        Err(IndexParseError::UnsafePath {
            paragraph,
            path: path.to_string(),
        })
    }
}

fn parse_size(paragraph: usize, value: &str) -> Result<u64, IndexParseError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| IndexParseError::InvalidField {
            paragraph,
            field: "Size",
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
    const MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";
    const SHA1: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";

    #[test]
    fn test_parse_packages() {
        let text = format!(
            "Package: hello\nVersion: 1.0\nFilename: pool/main/h/hello/hello_1.0_amd64.deb\n\
             Size: 11\nMD5sum: {}\nSHA256: {}\n\n\
             Package: world\nFilename: pool/main/w/world/world_2.0_all.deb\nSize: 11\nSHA256: {}\n",
            MD5, SHA256, SHA256
        );

        let parsed = parse_index(IndexKind::Packages, &text).unwrap();
        assert!(matches!(parsed, ParsedIndex::Packages(_)));

        let files = parsed.files();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "pool/main/h/hello/hello_1.0_amd64.deb");
        assert_eq!(files[0].size, 11);
        assert_eq!(files[0].checksums.len(), 2);
        assert_eq!(
            files[0].checksums.strongest().unwrap().kind,
            ChecksumKind::Sha256
        );
    }

    #[test]
    fn test_packages_missing_filename() {
        let text = format!("Package: hello\nSize: 11\nSHA256: {}\n", SHA256);
        let err = parse_index(IndexKind::Packages, &text).unwrap_err();
        assert_eq!(
            err,
            IndexParseError::MissingField {
                paragraph: 1,
                field: "Filename"
            }
        );
    }

    #[test]
    fn test_packages_bad_size() {
        let text = format!("Filename: pool/a.deb\nSize: big\nSHA256: {}\n", SHA256);
        let err = parse_index(IndexKind::Packages, &text).unwrap_err();
        assert!(matches!(err, IndexParseError::InvalidField { field: "Size", .. }));
    }

    #[test]
    fn test_packages_no_checksum() {
        let err = parse_index(IndexKind::Packages, "Filename: pool/a.deb\nSize: 1\n").unwrap_err();
        assert!(matches!(err, IndexParseError::NoChecksum { .. }));
    }

    #[test]
    fn test_parse_sources() {
        let text = format!(
            "Package: hello\nDirectory: pool/main/h/hello\n\
             Files:\n {md5} 11 hello_1.0.dsc\n {md5} 11 hello_1.0.tar.xz\n\
             Checksums-Sha1:\n {sha1} 11 hello_1.0.dsc\n\
             Checksums-Sha256:\n {sha256} 11 hello_1.0.dsc\n {sha256} 11 hello_1.0.tar.xz\n",
            md5 = MD5,
            sha1 = SHA1,
            sha256 = SHA256
        );

        let parsed = parse_index(IndexKind::Sources, &text).unwrap();
        let files = parsed.into_files();
        assert_eq!(files.len(), 2);

        let dsc = files
            .iter()
            .find(|f| f.path == "pool/main/h/hello/hello_1.0.dsc")
            .unwrap();
        assert_eq!(dsc.checksums.len(), 3);
        assert_eq!(dsc.checksums.get(ChecksumKind::Sha1), Some(SHA1));
    }

    #[test]
    fn test_sources_conflicting_size() {
        let text = format!(
            "Directory: pool/x\nFiles:\n {} 10 x.dsc\nChecksums-Sha256:\n {} 11 x.dsc\n",
            MD5, SHA256
        );
        let err = parse_index(IndexKind::Sources, &text).unwrap_err();
        assert!(matches!(err, IndexParseError::ConflictingSize { .. }));
    }

    #[test]
    fn test_paths_leaving_repository_rejected() {
        for filename in ["pool/../../../x.deb", "/etc/passwd", ".aptmirror/lock"] {
            let text = format!("Filename: {}\nSize: 11\nSHA256: {}\n", filename, SHA256);
            let err = parse_index(IndexKind::Packages, &text).unwrap_err();
            assert!(matches!(err, IndexParseError::UnsafePath { paragraph: 1, .. }), "{}", filename);
        }

        let text = format!("Directory: pool/main\nChecksums-Sha256:\n {} 11 ../../x.dsc\n", SHA256);
        let err = parse_index(IndexKind::Sources, &text).unwrap_err();
        assert_eq!(
            err,
            IndexParseError::UnsafePath {
                paragraph: 1,
                path: "pool/main/../../x.dsc".to_string()
            }
        );
    }

    #[test]
    fn test_syntax_error_propagates() {
        let err = parse_index(IndexKind::Packages, " orphan\n").unwrap_err();
        assert!(matches!(err, IndexParseError::Syntax(_)));
    }

    #[test]
    fn test_index_kind_from_path() {
        assert_eq!(
            IndexKind::from_path("main/binary-amd64/Packages.xz"),
            Some(IndexKind::Packages)
        );
        assert_eq!(
            IndexKind::from_path("main/source/Sources"),
            Some(IndexKind::Sources)
        );
        assert_eq!(IndexKind::from_path("main/i18n/Translation-en.gz"), None);
    }
}
