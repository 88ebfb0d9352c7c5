//! Per-block transfer statistics and aggregate failure reporting.

use serde::Serialize;

/// Outcome classification for a block or for the queue as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    #[default]
    Ok,
    /// Aggregate failure: a block or directory failed somewhere
    Error,
    /// The file backing a block could not be opened, positioned or read
    ByteSourceReadError,
}

impl ErrorCode {
    pub fn is_ok(&self) -> bool {
        *self == ErrorCode::Ok
    }
}

/// Statistics carried by a single block.
///
/// Owned by whichever side currently holds the block: the queue or one
/// worker, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferStats {
    id: String,
    error_code: ErrorCode,
    failed_attempts: u32,
}

impl TransferStats {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            error_code: ErrorCode::Ok,
            failed_attempts: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn error_code(&self) -> ErrorCode {
        self.error_code
    }

    pub fn set_error_code(&mut self, code: ErrorCode) {
        self.error_code = code;
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn add_failed_attempt(&mut self) {
        self.failed_attempts += 1;
    }
}

/// Snapshot of everything that went wrong during discovery and scheduling
#[derive(Debug, Clone, Default, Serialize)]
pub struct FailureReport {
    /// Blocks that failed to open, exhausted their retries, or were never attempted
    pub failed_sources: Vec<TransferStats>,
    /// Directories that could not be opened or fully read
    pub failed_directories: Vec<String>,
    pub status: ErrorCode,
}

impl FailureReport {
    pub fn new(failed_sources: Vec<TransferStats>, failed_directories: Vec<String>) -> Self {
        let status = aggregate_status(&failed_sources, &failed_directories);
        Self {
            failed_sources,
            failed_directories,
            status,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.status.is_ok()
    }
}

/// ERROR as soon as any block or directory failure has been recorded
pub(crate) fn aggregate_status(
    failed_sources: &[TransferStats],
    failed_dirs: &[String],
) -> ErrorCode {
    if failed_sources.is_empty() && failed_dirs.is_empty() {
        ErrorCode::Ok
    } else {
        ErrorCode::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_attempts_accumulate() {
        let mut stats = TransferStats::new("a.txt");
        assert_eq!(stats.failed_attempts(), 0);
        stats.add_failed_attempt();
        stats.add_failed_attempt();
        assert_eq!(stats.failed_attempts(), 2);
        assert_eq!(stats.id(), "a.txt");
    }

    #[test]
    fn test_aggregate_status() {
        assert_eq!(aggregate_status(&[], &[]), ErrorCode::Ok);
        assert_eq!(
            aggregate_status(&[], &["/root/locked/".to_string()]),
            ErrorCode::Error
        );

        let report = FailureReport::new(vec![TransferStats::new("b.txt")], vec![]);
        assert_eq!(report.status, ErrorCode::Error);
        assert!(!report.is_clean());
    }
}
