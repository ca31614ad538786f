//! Turning the positional input argument into a directory of URL files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use bulkfetch_core::ArchiveExtractor;
use tracing::info;

/// Returns `input` if it is a directory; extracts it first if it is a file.
pub(crate) async fn resolve_input_dir(
    input: &Path,
    extractor: Arc<dyn ArchiveExtractor>,
) -> Result<PathBuf> {
    if input.is_dir() {
        return Ok(input.to_path_buf());
    }
    if !input.is_file() {
        bail!(
            "Input not found: {}\n  Pass a directory of URL files or an input archive (.zip or .gz).",
            input.display()
        );
    }

    info!(archive = %input.display(), "extracting input archive");
    let archive = input.to_path_buf();
    let dir = tokio::task::spawn_blocking(move || extractor.extract(&archive))
        .await
        .context("extraction task did not finish")??;
    Ok(dir)
}
