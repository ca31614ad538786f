//! Fixed-size block reads with exact line-boundary reconstruction.
//!
//! Files are cut into windows of `block_size` bytes that are read
//! independently and in any order. Each line is emitted by exactly one block:
//!
//! - A block whose preceding byte is not `\n` starts mid-line, so its first
//!   token is dropped; the previous block owns that line.
//! - A block whose last byte is not `\n` ends mid-line, so it reads up to
//!   `lookahead` bytes from the start of the next block and completes the
//!   line with everything before the first `\n` found there.
//!
//! This holds as long as no line is longer than the lookahead window.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, instrument, trace};

use super::error::InputError;
use super::registry::{BlockRef, FileRegistry};
use crate::config::{DEFAULT_BLOCK_SIZE, DEFAULT_LOOKAHEAD};

/// Reads blocks and turns them into batches of complete lines.
#[derive(Debug)]
pub struct BlockReader {
    registry: Arc<FileRegistry>,
    block_size: u64,
    lookahead: usize,
    lookahead_reads: AtomicU64,
}

impl BlockReader {
    /// Creates a reader with the default block size and lookahead.
    #[must_use]
    pub fn new(registry: Arc<FileRegistry>) -> Self {
        Self::with_block_size(registry, DEFAULT_BLOCK_SIZE, DEFAULT_LOOKAHEAD)
    }

    /// Creates a reader with an explicit block size and lookahead.
    #[must_use]
    pub fn with_block_size(registry: Arc<FileRegistry>, block_size: u64, lookahead: usize) -> Self {
        Self {
            registry,
            block_size,
            lookahead,
            lookahead_reads: AtomicU64::new(0),
        }
    }

    /// Number of lookahead reads performed so far.
    #[must_use]
    pub fn lookahead_reads(&self) -> u64 {
        self.lookahead_reads.load(Ordering::Relaxed)
    }

    /// Reads one block and returns its complete lines.
    ///
    /// Returns `Ok(None)` when the block starts at or past end of file. A
    /// short or empty read retires the file in the registry.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::Io`] if the file cannot be opened or read.
    #[instrument(level = "trace", skip(self), fields(path = %block.path.display(), index = block.index))]
    pub fn read_block(&self, block: &BlockRef) -> Result<Option<Vec<String>>, InputError> {
        let path = block.path.as_path();
        let mut file = File::open(path).map_err(|e| InputError::io(path, e))?;

        let start = block.index * self.block_size;
        let mut window = vec![0u8; usize::try_from(self.block_size).unwrap_or(usize::MAX)];
        let read = read_at(&mut file, path, start, &mut window)?;
        window.truncate(read);

        if (read as u64) < self.block_size {
            self.registry.complete(path);
        }
        if read == 0 {
            trace!("block past end of file");
            return Ok(None);
        }

        let mut tokens: Vec<Vec<u8>> = window.split(|b| *b == b'\n').map(<[u8]>::to_vec).collect();

        if block.index > 0 && !preceded_by_newline(&mut file, path, start)? {
            tokens.remove(0);
        }

        if window.last() == Some(&b'\n') {
            // `split` yields an empty token after a trailing newline.
            tokens.pop();
        } else if let Some(last) = tokens.last_mut() {
            let tail = self.read_lookahead(&mut file, path, start + self.block_size)?;
            last.extend_from_slice(&tail);
        }

        let lines: Vec<String> = tokens
            .iter()
            .map(|token| String::from_utf8_lossy(token).trim_end_matches('\r').to_string())
            .filter(|line| !line.is_empty())
            .collect();

        debug!(lines = lines.len(), bytes = read, "block read");
        Ok(Some(lines))
    }

    /// Reads the start of the next block up to (excluding) its first newline.
    fn read_lookahead(&self, file: &mut File, path: &Path, offset: u64) -> Result<Vec<u8>, InputError> {
        self.lookahead_reads.fetch_add(1, Ordering::Relaxed);
        let mut buf = vec![0u8; self.lookahead];
        let read = read_at(file, path, offset, &mut buf)?;
        buf.truncate(read);
        if let Some(newline) = buf.iter().position(|b| *b == b'\n') {
            buf.truncate(newline);
        }
        Ok(buf)
    }
}

fn preceded_by_newline(file: &mut File, path: &Path, start: u64) -> Result<bool, InputError> {
    let mut byte = [0u8; 1];
    let read = read_at(file, path, start - 1, &mut byte)?;
    Ok(read == 1 && byte[0] == b'\n')
}

/// Reads into `buf` from `offset` until the buffer is full or EOF.
fn read_at(file: &mut File, path: &Path, offset: u64, buf: &mut [u8]) -> Result<usize, InputError> {
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| InputError::io(path, e))?;
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(InputError::io(path, e)),
        }
    }
    Ok(filled)
}
