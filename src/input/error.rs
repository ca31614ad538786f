//! Error types for the input module.

use std::path::PathBuf;

use thiserror::Error;

/// Errors reading the input directory or its files.
#[derive(Debug, Error)]
pub enum InputError {
    /// The input path does not exist.
    #[error("input path not found: {path}")]
    NotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// The input path exists but is not a directory.
    #[error("input path is not a directory: {path}")]
    NotADirectory {
        /// The offending path.
        path: PathBuf,
    },

    /// File system error while scanning or reading.
    #[error("IO error reading {path}: {source}")]
    Io {
        /// The file or directory where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl InputError {
    /// Creates a not-found error.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Creates a not-a-directory error.
    pub fn not_a_directory(path: impl Into<PathBuf>) -> Self {
        Self::NotADirectory { path: path.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Returned by [`FileRegistry::allocate_block`](super::FileRegistry::allocate_block)
/// once every file has been retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No live files remain.
    #[error("no more files")]
    Exhausted,
}

/// Errors from an [`ArchiveExtractor`](super::ArchiveExtractor).
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The archive format is not handled by this extractor.
    #[error("unsupported archive format: {path}")]
    UnsupportedFormat {
        /// The archive path.
        path: PathBuf,
    },

    /// A zip entry would be written outside the work directory.
    #[error("entry {entry} of {path} is outside of the target directory")]
    UnsafeEntry {
        /// The archive path.
        path: PathBuf,
        /// The entry name as stored in the archive.
        entry: String,
    },

    /// The zip container is malformed.
    #[error("invalid zip archive {path}: {source}")]
    Zip {
        /// The archive path.
        path: PathBuf,
        /// The underlying zip error.
        #[source]
        source: zip::result::ZipError,
    },

    /// File system or decompression error.
    #[error("error extracting {path}: {source}")]
    Io {
        /// The archive or output path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl ExtractionError {
    /// Creates an unsupported-format error.
    pub fn unsupported(path: impl Into<PathBuf>) -> Self {
        Self::UnsupportedFormat { path: path.into() }
    }

    /// Creates an unsafe-entry error.
    pub fn unsafe_entry(path: impl Into<PathBuf>, entry: impl Into<String>) -> Self {
        Self::UnsafeEntry {
            path: path.into(),
            entry: entry.into(),
        }
    }

    /// Creates a zip container error.
    pub fn zip(path: impl Into<PathBuf>, source: zip::result::ZipError) -> Self {
        Self::Zip {
            path: path.into(),
            source,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// No `From<std::io::Error>` impls: every variant needs the path for context.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_error_display_includes_path() {
        let error = InputError::not_found("/tmp/missing");
        assert!(error.to_string().contains("/tmp/missing"));

        let error = InputError::not_a_directory("/tmp/file.txt");
        assert!(error.to_string().contains("not a directory"));
    }

    #[test]
    fn test_input_error_io_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let msg = InputError::io("/data/urls.txt", io_error).to_string();
        assert!(msg.contains("/data/urls.txt"), "Expected path in: {msg}");
        assert!(msg.contains("access denied"), "Expected cause in: {msg}");
    }

    #[test]
    fn test_registry_error_display() {
        assert_eq!(RegistryError::Exhausted.to_string(), "no more files");
    }

    #[test]
    fn test_extraction_error_display() {
        let msg = ExtractionError::unsupported("inputData.tar").to_string();
        assert!(msg.contains("unsupported archive format"));
        assert!(msg.contains("inputData.tar"));

        let msg = ExtractionError::unsafe_entry("inputData.zip", "../evil").to_string();
        assert!(msg.contains("../evil"));
        assert!(msg.contains("outside of the target directory"));
    }
}
