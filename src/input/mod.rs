//! Input side of the pipeline: which blocks to read and how to read them.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use bulkfetch_core::input::{BlockReader, FileRegistry};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(FileRegistry::scan(Path::new("./work_area"))?);
//! let reader = BlockReader::new(Arc::clone(&registry));
//! while let Ok(block) = registry.allocate_block() {
//!     if let Some(lines) = reader.read_block(&block)? {
//!         println!("{} lines from {}", lines.len(), block.path.display());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod block_reader;
mod error;
mod extract;
mod registry;

pub use block_reader::BlockReader;
pub use error::{ExtractionError, InputError, RegistryError};
pub use extract::{ArchiveExtractor, GzipExtractor, InputExtractor, ZipExtractor};
pub use registry::{BlockRef, FileRegistry};
