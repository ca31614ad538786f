//! Block allocation across the input files.
//!
//! [`FileRegistry`] hands out `(file, block index)` pairs to reader tasks. All
//! operations share one mutex, so no two callers ever receive the same index
//! for the same file. The registry does not track which indices were actually
//! read; a file simply stops being eligible once a reader retires it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info, instrument};

use super::error::{InputError, RegistryError};

/// One block to read: a file and a zero-based block index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockRef {
    /// The input file.
    pub path: PathBuf,
    /// Zero-based block index within the file.
    pub index: u64,
}

/// Live input files and their next unassigned block index.
#[derive(Debug, Default)]
pub struct FileRegistry {
    files: Mutex<BTreeMap<PathBuf, u64>>,
}

impl FileRegistry {
    /// Creates a registry over the given files, each starting at block 0.
    #[must_use]
    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let files = paths.into_iter().map(|path| (path, 0)).collect();
        Self {
            files: Mutex::new(files),
        }
    }

    /// Registers every regular file directly inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`InputError`] if `dir` is missing, is not a directory, or
    /// cannot be listed.
    #[instrument(fields(dir = %dir.display()))]
    pub fn scan(dir: &Path) -> Result<Self, InputError> {
        if !dir.exists() {
            return Err(InputError::not_found(dir));
        }
        if !dir.is_dir() {
            return Err(InputError::not_a_directory(dir));
        }

        let entries = std::fs::read_dir(dir).map_err(|e| InputError::io(dir, e))?;
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| InputError::io(dir, e))?;
            let file_type = entry.file_type().map_err(|e| InputError::io(entry.path(), e))?;
            if file_type.is_file() {
                paths.push(entry.path());
            }
        }

        info!(files = paths.len(), "registered input files");
        Ok(Self::from_paths(paths))
    }

    /// Returns whether any file is still eligible for allocation.
    #[must_use]
    pub fn has_remaining(&self) -> bool {
        !self.lock().is_empty()
    }

    /// Number of live files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` when no live files remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.has_remaining()
    }

    /// Allocates the next block of a live file.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Exhausted`] when every file has been retired.
    pub fn allocate_block(&self) -> Result<BlockRef, RegistryError> {
        let mut files = self.lock();
        let (path, next) = files.iter_mut().next().ok_or(RegistryError::Exhausted)?;
        let index = *next;
        *next += 1;
        Ok(BlockRef {
            path: path.clone(),
            index,
        })
    }

    /// Retires a file. Safe to call more than once and while other reads of
    /// the same file are still in flight.
    pub fn complete(&self, path: &Path) {
        if let Some(issued) = self.lock().remove(path) {
            debug!(path = %path.display(), blocks_issued = issued, "input file retired");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<PathBuf, u64>> {
        self.files
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
