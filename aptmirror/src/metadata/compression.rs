//! Decompression of index documents.
//!
//! Repositories publish the same Packages/Sources document in several
//! encodings. Only one of them is fetched and parsed; [`Compression::rank`]
//! decides which.

use std::io::Read;

use flate2::read::GzDecoder;
use xz2::read::XzDecoder;

use crate::error::{MirrorError, MirrorResult};

/// Encodings an index document may be published in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    Plain,
    Gzip,
    Xz,
    /// Mirrored verbatim but never parsed (`.bz2`, `.lzma`, `.zst`).
    Unsupported,
}

const UNSUPPORTED_EXTENSIONS: [&str; 3] = [".bz2", ".lzma", ".zst"];

impl Compression {
    /// Determine the encoding from a file name.
    pub fn from_path(path: &str) -> Self {
        if path.ends_with(".xz") {
            Self::Xz
        } else if path.ends_with(".gz") {
            Self::Gzip
        } else if UNSUPPORTED_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            Self::Unsupported
        } else {
            Self::Plain
        }
    }

    /// Preference when choosing which variant to fetch. Lower is better,
    /// `None` means the variant cannot be parsed.
    pub fn rank(&self) -> Option<u8> {
        match self {
            Self::Xz => Some(0),
            Self::Gzip => Some(1),
            Self::Plain => Some(2),
            Self::Unsupported => None,
        }
    }
}

/// Strip a compression extension, e.g. `main/binary-amd64/Packages.xz`
/// becomes `main/binary-amd64/Packages`.
pub fn base_name(path: &str) -> &str {
    [".xz", ".gz"]
        .iter()
        .chain(UNSUPPORTED_EXTENSIONS.iter())
        .find_map(|ext| path.strip_suffix(ext))
        .unwrap_or(path)
}

/// Decode an index document to text.
///
/// # Errors
///
/// Returns `MetadataMalformed` if the data cannot be decoded or is not UTF-8.
pub fn decompress(data: &[u8], compression: Compression, source: &str) -> MirrorResult<String> {
    let mut text = String::new();
    let result = match compression {
        Compression::Plain => {
            return String::from_utf8(data.to_vec())
                .map_err(|e| MirrorError::malformed(source, format!("invalid UTF-8: {}", e)));
        }
        Compression::Gzip => GzDecoder::new(data).read_to_string(&mut text),
        Compression::Xz => XzDecoder::new(data).read_to_string(&mut text),
        Compression::Unsupported => {
            return Err(MirrorError::malformed(source, "unsupported compression"));
        }
    };

    result.map_err(|e| MirrorError::malformed(source, format!("failed to decompress: {}", e)))?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use xz2::write::XzEncoder;

    const TEXT: &str = "Package: hello\nFilename: pool/main/h/hello.deb\n";

    #[test]
    fn test_from_path() {
        assert_eq!(Compression::from_path("Packages.xz"), Compression::Xz);
        assert_eq!(Compression::from_path("Packages.gz"), Compression::Gzip);
        assert_eq!(Compression::from_path("Packages"), Compression::Plain);
        assert_eq!(Compression::from_path("Packages.bz2"), Compression::Unsupported);
    }

    #[test]
    fn test_rank_prefers_xz() {
        let mut variants = [Compression::Plain, Compression::Xz, Compression::Gzip];
        variants.sort_by_key(|c| c.rank());
        assert_eq!(variants[0], Compression::Xz);
        assert_eq!(Compression::Unsupported.rank(), None);
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("main/source/Sources.gz"), "main/source/Sources");
        assert_eq!(base_name("main/binary-amd64/Packages"), "main/binary-amd64/Packages");
        assert_eq!(base_name("Contents-amd64.zst"), "Contents-amd64");
    }

    #[test]
    fn test_decompress_gzip() {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(TEXT.as_bytes()).unwrap();
        let data = encoder.finish().unwrap();

        assert_eq!(decompress(&data, Compression::Gzip, "Packages.gz").unwrap(), TEXT);
    }

    #[test]
    fn test_decompress_xz() {
        let mut encoder = XzEncoder::new(Vec::new(), 6);
        encoder.write_all(TEXT.as_bytes()).unwrap();
        let data = encoder.finish().unwrap();

        assert_eq!(decompress(&data, Compression::Xz, "Packages.xz").unwrap(), TEXT);
    }

    #[test]
    fn test_decompress_garbage() {
        let err = decompress(b"not gzip", Compression::Gzip, "Packages.gz").unwrap_err();
        assert!(matches!(err, MirrorError::MetadataMalformed { .. }));
    }
}
