//! Error types for dirsource
//!
//! Library code returns [`SourceError`]. Almost every variant here is
//! recovered locally by the queue (logged and folded into the aggregate
//! status); only construction-time problems such as a bad pattern or an
//! invalid configuration reach the caller as a hard error.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, SourceError>;

#[derive(Error, Debug)]
pub enum SourceError {
    /// A filter pattern failed to compile
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A directory could not be opened or iterated
    #[error("Failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A directory entry could not be stat'ed
    #[error("Failed to stat {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A symlink could not be resolved to a canonical path
    #[error("Failed to resolve symlink {path}: {source}")]
    ResolveLink {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A directory was reached a second time while following symlinks
    #[error("Attempted to visit directory twice: {path}")]
    DirectoryCycle { path: PathBuf },

    /// The file backing a block could not be opened
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file backing a block could not be positioned at the block offset
    #[error("Failed to seek {path} to offset {offset}: {source}")]
    Seek {
        path: PathBuf,
        offset: u64,
        #[source]
        source: io::Error,
    },

    /// Reading block data failed
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A file list line was malformed
    #[error("Invalid file list line {line}: {reason}")]
    FileList { line: usize, reason: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors not tied to a specific entry
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SourceError {
    /// Whether this error came from reading block data (open, seek or read).
    ///
    /// These are the errors a worker may retry by returning the block to the
    /// queue.
    pub fn is_block_error(&self) -> bool {
        matches!(
            self,
            SourceError::Open { .. } | SourceError::Seek { .. } | SourceError::Read { .. }
        )
    }
}
