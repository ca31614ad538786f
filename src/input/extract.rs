//! Archive extraction ahead of the pipeline.
//!
//! The pipeline only reads plain files from a directory. When the input is a
//! single archive, an [`ArchiveExtractor`] turns it into such a directory
//! before anything else starts; a failure here aborts the run.

use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, info, instrument};
use zip::ZipArchive;

use super::error::ExtractionError;

/// Turns an archive into a directory of plain input files.
pub trait ArchiveExtractor: Send + Sync {
    /// Extracts `archive` and returns the directory holding the result.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError`] if the archive is unsupported or cannot be
    /// decompressed.
    fn extract(&self, archive: &Path) -> Result<PathBuf, ExtractionError>;
}

/// Decompresses a single `.gz` file into a work directory.
#[derive(Debug, Clone)]
pub struct GzipExtractor {
    work_dir: PathBuf,
}

impl GzipExtractor {
    /// Creates an extractor writing into `work_dir` (created if needed).
    #[must_use]
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }
}

impl ArchiveExtractor for GzipExtractor {
    #[instrument(skip(self), fields(archive = %archive.display(), work_dir = %self.work_dir.display()))]
    fn extract(&self, archive: &Path) -> Result<PathBuf, ExtractionError> {
        if !has_extension(archive, "gz") {
            return Err(ExtractionError::unsupported(archive));
        }
        create_work_dir(&self.work_dir)?;
        gunzip_into(archive, &self.work_dir)?;
        Ok(self.work_dir.clone())
    }
}

/// Unpacks a `.zip` of gzip parts into a work directory.
///
/// Entries keep their archive layout under the work directory. Every `.gz`
/// entry is then decompressed into the work directory itself and the
/// compressed copy removed, so the parts end up side by side as plain files.
/// An entry whose name resolves outside the work directory aborts the run.
#[derive(Debug, Clone)]
pub struct ZipExtractor {
    work_dir: PathBuf,
}

impl ZipExtractor {
    /// Creates an extractor writing into `work_dir` (created if needed).
    #[must_use]
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    fn unzip(&self, archive: &Path) -> Result<Vec<PathBuf>, ExtractionError> {
        let file = File::open(archive).map_err(|e| ExtractionError::io(archive, e))?;
        let mut zip =
            ZipArchive::new(BufReader::new(file)).map_err(|e| ExtractionError::zip(archive, e))?;

        let mut written = Vec::new();
        for index in 0..zip.len() {
            let mut entry = zip
                .by_index(index)
                .map_err(|e| ExtractionError::zip(archive, e))?;
            let Some(relative) = entry.enclosed_name() else {
                return Err(ExtractionError::unsafe_entry(archive, entry.name()));
            };
            let target = self.work_dir.join(relative);

            if entry.is_dir() {
                std::fs::create_dir_all(&target).map_err(|e| ExtractionError::io(&target, e))?;
                continue;
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ExtractionError::io(parent, e))?;
            }
            copy_to_file(&mut entry, archive, &target)?;
            debug!(entry = %target.display(), "zip entry written");
            written.push(target);
        }
        Ok(written)
    }
}

impl ArchiveExtractor for ZipExtractor {
    #[instrument(skip(self), fields(archive = %archive.display(), work_dir = %self.work_dir.display()))]
    fn extract(&self, archive: &Path) -> Result<PathBuf, ExtractionError> {
        if !has_extension(archive, "zip") {
            return Err(ExtractionError::unsupported(archive));
        }
        create_work_dir(&self.work_dir)?;

        let written = self.unzip(archive)?;
        let mut parts = 0_usize;
        for part in written.iter().filter(|path| has_extension(path, "gz")) {
            gunzip_into(part, &self.work_dir)?;
            std::fs::remove_file(part).map_err(|e| ExtractionError::io(part, e))?;
            parts += 1;
        }

        info!(entries = written.len(), parts, "zip archive extracted");
        Ok(self.work_dir.clone())
    }
}

/// Picks [`ZipExtractor`] or [`GzipExtractor`] from the archive's extension.
#[derive(Debug, Clone)]
pub struct InputExtractor {
    gzip: GzipExtractor,
    zip: ZipExtractor,
}

impl InputExtractor {
    /// Creates an extractor writing into `work_dir` (created if needed).
    #[must_use]
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        let work_dir = work_dir.into();
        Self {
            gzip: GzipExtractor::new(work_dir.clone()),
            zip: ZipExtractor::new(work_dir),
        }
    }
}

impl ArchiveExtractor for InputExtractor {
    fn extract(&self, archive: &Path) -> Result<PathBuf, ExtractionError> {
        if has_extension(archive, "zip") {
            self.zip.extract(archive)
        } else if has_extension(archive, "gz") {
            self.gzip.extract(archive)
        } else {
            Err(ExtractionError::unsupported(archive))
        }
    }
}

fn has_extension(path: &Path, expected: &str) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| ext.eq_ignore_ascii_case(expected))
}

fn create_work_dir(work_dir: &Path) -> Result<(), ExtractionError> {
    std::fs::create_dir_all(work_dir).map_err(|e| ExtractionError::io(work_dir, e))
}

/// Decompresses `archive` into `dir`, named after the archive minus `.gz`.
fn gunzip_into(archive: &Path, dir: &Path) -> Result<PathBuf, ExtractionError> {
    let Some(stem) = archive.file_stem() else {
        return Err(ExtractionError::unsupported(archive));
    };
    let input = File::open(archive).map_err(|e| ExtractionError::io(archive, e))?;
    let output_path = dir.join(stem);

    let mut decoder = GzDecoder::new(BufReader::new(input));
    let bytes = copy_to_file(&mut decoder, archive, &output_path)?;
    info!(output = %output_path.display(), bytes, "archive extracted");
    Ok(output_path)
}

/// Streams `reader` into a new file at `target`. Read errors are reported
/// against `source`.
fn copy_to_file(
    reader: &mut impl Read,
    source: &Path,
    target: &Path,
) -> Result<u64, ExtractionError> {
    let output = File::create(target).map_err(|e| ExtractionError::io(target, e))?;
    let mut writer = BufWriter::new(output);
    let bytes = std::io::copy(reader, &mut writer).map_err(|e| ExtractionError::io(source, e))?;
    writer.flush().map_err(|e| ExtractionError::io(target, e))?;
    Ok(bytes)
}
