//! Queue configuration
//!
//! Options are plain data with serde defaults so they can be loaded from a
//! TOML file, built in code, or overridden field by field from the CLI.

use crate::error::{Result, SourceError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default block size (16MB)
pub const DEFAULT_BLOCK_SIZE: u64 = 16 * 1024 * 1024;

/// Default per-worker read buffer size (256KB)
pub const DEFAULT_BUFFER_SIZE: usize = 256 * 1024;

/// Default number of parallel workers used to size wake-up fan-out
pub const DEFAULT_NUM_WORKERS: usize = 8;

/// Default number of failed attempts before a block is abandoned
pub const DEFAULT_MAX_TRANSFER_RETRIES: u32 = 5;

/// Options controlling discovery and block scheduling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueOptions {
    /// Block size in bytes. Zero disables splitting: each file is one block.
    pub block_size: u64,

    /// Size of the read buffer each worker owns
    pub buffer_size: usize,

    /// Number of parallel consumers; used to decide between wake-all and wake-N
    pub num_workers: usize,

    /// Failed attempts after which a block is moved to the failed list
    pub max_transfer_retries: u32,

    /// Whether to resolve symlinked files and directories
    pub follow_symlinks: bool,

    /// Only files whose relative path fully matches this regex are kept
    pub include_pattern: Option<String>,

    /// Files whose relative path fully matches this regex are dropped
    pub exclude_pattern: Option<String>,

    /// Directories (relative path with trailing `/`) matching this regex are skipped
    pub prune_dir_pattern: Option<String>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            num_workers: DEFAULT_NUM_WORKERS,
            max_transfer_retries: DEFAULT_MAX_TRANSFER_RETRIES,
            follow_symlinks: false,
            include_pattern: None,
            exclude_pattern: None,
            prune_dir_pattern: None,
        }
    }
}

impl QueueOptions {
    /// Parse options from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let options: Self =
            toml::from_str(text).map_err(|e| SourceError::Config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            SourceError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(SourceError::Config(
                "buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.num_workers == 0 {
            return Err(SourceError::Config(
                "num_workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Block size to split files with, or `None` when splitting is disabled
    pub fn effective_block_size(&self) -> Option<u64> {
        (self.block_size > 0).then_some(self.block_size)
    }
}
