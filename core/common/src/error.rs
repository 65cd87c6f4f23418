//! Common error types for resvault.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Top-level error type for vault engine operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An entry with the same logical name is already indexed.
    #[error("Duplicate name: '{0}' is already present in the index")]
    DuplicateName(String),

    /// A named entry was required but does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The index file could not be parsed.
    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    /// A data container referenced by the index has no backing file.
    #[error("Container {data_id} missing at {}", path.display())]
    ContainerMissing { data_id: u32, path: PathBuf },

    /// A read range reaches past the physical end of a container.
    #[error(
        "Out of bounds: container {data_id} holds {size} bytes, \
         requested {length} bytes at offset {offset}"
    )]
    OutOfBounds {
        data_id: u32,
        offset: u64,
        length: u64,
        size: u64,
    },

    /// File system operation failed.
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation is not allowed in the current engine state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Wrap an I/O error with a description of what was being done.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Short machine-friendly name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateName(_) => "duplicate-name",
            Self::NotFound(_) => "not-found",
            Self::CorruptIndex(_) => "corrupt-index",
            Self::ContainerMissing { .. } => "container-missing",
            Self::OutOfBounds { .. } => "out-of-bounds",
            Self::Io { .. } => "io",
            Self::InvalidInput(_) => "invalid-input",
            Self::InvalidState(_) => "invalid-state",
            Self::Serialization(_) => "serialization",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::io("performing file operation", source)
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Attach an operation and path to a raw `std::io::Result`.
pub trait IoResultExt<T> {
    /// Convert the error into [`Error::Io`] naming `op` and `path`.
    fn with_path(self, op: &str, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, op: &str, path: &Path) -> Result<T> {
        self.map_err(|e| Error::io(format!("{} {}", op, path.display()), e))
    }
}
