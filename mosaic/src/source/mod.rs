//! Content source abstraction.
//!
//! A [`Source`] is an external, (mostly) read-only provider of named byte
//! blobs plus metadata: a mod directory, an archive, or synthesized
//! in-memory content. The engine only ever consumes sources through this
//! trait; mounting order decides shadowing in the merged namespace.
//!
//! Two implementations ship in-crate:
//!
//! - [`DirectorySource`]: a recursive directory tree on disk.
//! - [`MemorySource`]: a runtime-writable overlay for content synthesized
//!   before the namespace is finalized, behind its own lock.

mod directory;
mod memory;

use std::io::Read;

use thiserror::Error;

pub use directory::DirectorySource;
pub use memory::MemorySource;

/// Errors a source can produce while delivering bytes.
#[derive(Debug, Error, Clone)]
pub enum SourceError {
    /// The source has no entry with this local name.
    #[error("'{0}' not present in source")]
    NotFound(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::Io(err.to_string())
    }
}

/// Identifying metadata of a mounted source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMetadata {
    /// Stable unique id (e.g. the canonical directory path).
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// Optional declared version.
    pub version: Option<String>,
}

impl SourceMetadata {
    /// Creates metadata without a version.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: None,
        }
    }

    /// Sets the declared version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// An enumerable provider of named byte blobs.
///
/// Local names keep the source's original spelling (case, separators); the
/// overlay index normalizes them into namespace keys and keeps the original
/// on the descriptor for `open`/`read`/`size` calls.
pub trait Source: Send + Sync {
    /// Identifying metadata of this source.
    fn metadata(&self) -> SourceMetadata;

    /// Every local name this source provides, in arbitrary order.
    fn asset_paths(&self) -> Vec<String>;

    /// Opens a streaming reader over one entry.
    fn open(&self, name: &str) -> Result<Box<dyn Read + Send>, SourceError>;

    /// Reads one entry fully into memory.
    fn read(&self, name: &str) -> Result<Vec<u8>, SourceError> {
        let mut reader = self.open(name)?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Size in bytes of one entry, used by the namespace digest.
    fn size(&self, name: &str) -> Result<u64, SourceError>;
}
