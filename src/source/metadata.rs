//! Data model shared by discovery, planning and scheduling.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// =============================================================================
// ByteRange
// =============================================================================

/// Half-open interval `[start, end)` over a file's bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Range covering `len` bytes starting at `start`
    pub fn new(start: u64, len: u64) -> Self {
        Self {
            start,
            end: start + len,
        }
    }

    /// Whole-file range `[0, size)`
    pub fn whole(size: u64) -> Self {
        Self::new(0, size)
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Resumption state
// =============================================================================

/// How a discovered file relates to a previous, interrupted transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumptionStatus {
    /// No prior record; transfer the whole file
    New,
    /// Prior record with nothing left to send; the file is skipped
    Complete,
    /// Prior record was for a larger file; retransfer in full
    SizeMismatchLarger,
    /// Prior record was for a smaller file; retransfer in full
    SizeMismatchSmaller,
    /// Same size; only the recorded remaining ranges are sent
    Partial,
}

/// State left behind by a previous incomplete transfer of one file.
///
/// Supplied by an external resumption store before discovery starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorTransferRecord {
    /// Path relative to the transfer root
    pub rel_path: String,
    /// Sequence id the file was sent under
    pub seq_id: u64,
    /// File size at the time of the prior transfer
    pub file_size: u64,
    /// Ranges not yet confirmed as received
    pub remaining: Vec<ByteRange>,
}

// =============================================================================
// FileMetadata
// =============================================================================

/// Metadata for one discovered file, shared by every block cut from it.
///
/// Immutable after creation; blocks hold it through an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// Path used to open the file (symlinks already resolved when followed)
    pub full_path: PathBuf,
    /// Path relative to the transfer root, `/` separated
    pub rel_path: String,
    /// Sequence id assigned by the planner
    pub seq_id: u64,
    /// Current size of the file
    pub size: u64,
    pub status: ResumptionStatus,
    /// Sequence id of the superseded partial transfer, for size mismatches
    pub prev_seq_id: Option<u64>,
}

// =============================================================================
// Explicit file list
// =============================================================================

/// An entry of an explicit file list; bypasses directory exploration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Path relative to the transfer root
    pub rel_path: String,
    /// Known size, or `None` to stat the file during discovery
    pub size: Option<u64>,
}

impl FileInfo {
    pub fn new(rel_path: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            rel_path: rel_path.into(),
            size,
        }
    }
}
