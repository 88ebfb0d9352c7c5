//! Block reader.
//!
//! A [`FileByteSource`] is one schedulable block: a `[offset, offset + size)`
//! slice of a file plus its transfer statistics. Reading goes through a
//! [`ReadBuffer`] owned by the worker, since a worker reads at most one block
//! at a time and buffers must never be shared between workers.

use crate::error::{Result, SourceError};
use crate::source::metadata::FileMetadata;
use crate::source::stats::{ErrorCode, TransferStats};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;
use tracing::{error, trace};

/// Scratch buffer owned by a single worker thread
#[derive(Debug)]
pub struct ReadBuffer {
    data: Vec<u8>,
}

impl ReadBuffer {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size.max(1)],
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }
}

/// One block of one file, ready to be opened and read
#[derive(Debug)]
pub struct FileByteSource {
    metadata: Arc<FileMetadata>,
    offset: u64,
    size: u64,
    bytes_read: u64,
    file: Option<File>,
    stats: TransferStats,
}

impl FileByteSource {
    pub fn new(metadata: Arc<FileMetadata>, size: u64, offset: u64) -> Self {
        let stats = TransferStats::new(metadata.rel_path.clone());
        Self {
            metadata,
            offset,
            size,
            bytes_read: 0,
            file: None,
            stats,
        }
    }

    /// Relative path of the file this block belongs to
    pub fn identifier(&self) -> &str {
        &self.metadata.rel_path
    }

    pub fn metadata(&self) -> &Arc<FileMetadata> {
        &self.metadata
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn finished(&self) -> bool {
        self.bytes_read >= self.size
    }

    pub fn has_error(&self) -> bool {
        !self.stats.error_code().is_ok()
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn transfer_stats(&self) -> &TransferStats {
        &self.stats
    }

    /// Count a failed transfer attempt before handing the block back
    pub fn record_failed_attempt(&mut self) {
        self.stats.add_failed_attempt();
    }

    pub fn into_transfer_stats(self) -> TransferStats {
        self.stats
    }

    /// Open the backing file and position it at the block offset.
    ///
    /// Resets read progress, so a block returned to the queue can be opened
    /// again by another worker.
    pub fn open(&mut self) -> Result<()> {
        self.bytes_read = 0;
        self.close();

        match self.open_at_offset() {
            Ok(file) => {
                trace!(
                    "Opened {} at offset {} for {} bytes",
                    self.metadata.full_path.display(),
                    self.offset,
                    self.size
                );
                self.file = Some(file);
                self.stats.set_error_code(ErrorCode::Ok);
                Ok(())
            }
            Err(e) => {
                error!("{}", e);
                self.stats.set_error_code(ErrorCode::ByteSourceReadError);
                Err(e)
            }
        }
    }

    fn open_at_offset(&self) -> Result<File> {
        let path = &self.metadata.full_path;
        let mut file = File::open(path).map_err(|source| SourceError::Open {
            path: path.clone(),
            source,
        })?;
        if self.offset > 0 {
            file.seek(SeekFrom::Start(self.offset))
                .map_err(|source| SourceError::Seek {
                    path: path.clone(),
                    offset: self.offset,
                    source,
                })?;
        }
        Ok(file)
    }

    /// Read the next piece of the block into `buf`.
    ///
    /// Returns `Ok(None)` once the block is exhausted or the file ends early;
    /// a short file is normal completion, not an error. On a read failure the
    /// file is closed and the block's error state is set.
    pub fn read<'a>(&mut self, buf: &'a mut ReadBuffer) -> Result<Option<&'a [u8]>> {
        if self.has_error() || self.finished() {
            self.close();
            return Ok(None);
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(None);
        };

        let remaining = self.size - self.bytes_read;
        let to_read = remaining.min(buf.data.len() as u64) as usize;
        let num_read = loop {
            match file.read(&mut buf.data[..to_read]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    let err = SourceError::Read {
                        path: self.metadata.full_path.clone(),
                        source,
                    };
                    error!("Failure while reading block: {}", err);
                    self.close();
                    self.stats.set_error_code(ErrorCode::ByteSourceReadError);
                    return Err(err);
                }
            }
        };

        if num_read == 0 {
            self.close();
            return Ok(None);
        }
        self.bytes_read += num_read as u64;
        Ok(Some(&buf.data[..num_read]))
    }

    /// Drop the open file, if any. Safe to call any number of times.
    pub fn close(&mut self) {
        self.file = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::metadata::ResumptionStatus;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn metadata_for(path: &Path, size: u64) -> Arc<FileMetadata> {
        Arc::new(FileMetadata {
            full_path: path.to_path_buf(),
            rel_path: path.file_name().unwrap().to_string_lossy().to_string(),
            seq_id: 0,
            size,
            status: ResumptionStatus::New,
            prev_seq_id: None,
        })
    }

    fn read_all(source: &mut FileByteSource, buf: &mut ReadBuffer) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = source.read(buf).unwrap() {
            out.extend_from_slice(chunk);
        }
        out
    }

    #[test]
    fn test_reads_block_at_offset() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data.bin");
        let content: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        fs::write(&path, &content).unwrap();

        let mut source = FileByteSource::new(metadata_for(&path, 1000), 300, 200);
        let mut buf = ReadBuffer::new(64);
        source.open().unwrap();

        let data = read_all(&mut source, &mut buf);

        assert_eq!(data, &content[200..500]);
        assert!(source.finished());
        assert!(!source.is_open());
        assert_eq!(source.bytes_read(), 300);
    }

    #[test]
    fn test_reads_are_bounded_by_buffer() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data.bin");
        fs::write(&path, vec![7u8; 100]).unwrap();

        let mut source = FileByteSource::new(metadata_for(&path, 100), 100, 0);
        let mut buf = ReadBuffer::new(30);
        source.open().unwrap();

        let mut sizes = Vec::new();
        while let Some(chunk) = source.read(&mut buf).unwrap() {
            sizes.push(chunk.len());
        }
        assert_eq!(sizes, vec![30, 30, 30, 10]);
    }

    #[test]
    fn test_truncated_file_ends_block_early() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("short.bin");
        fs::write(&path, vec![1u8; 50]).unwrap();

        // block claims more bytes than the file now holds
        let mut source = FileByteSource::new(metadata_for(&path, 100), 100, 0);
        let mut buf = ReadBuffer::new(64);
        source.open().unwrap();

        let data = read_all(&mut source, &mut buf);
        assert_eq!(data.len(), 50);
        assert!(!source.has_error());
    }

    #[test]
    fn test_open_missing_file_sets_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("gone.bin");

        let mut source = FileByteSource::new(metadata_for(&path, 10), 10, 0);
        let err = source.open().unwrap_err();

        assert!(err.is_block_error());
        assert!(source.has_error());
        assert_eq!(
            source.transfer_stats().error_code(),
            ErrorCode::ByteSourceReadError
        );
        let mut buf = ReadBuffer::new(8);
        assert!(source.read(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_reopen_resets_progress() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("again.bin");
        fs::write(&path, b"abcdefghij").unwrap();

        let mut source = FileByteSource::new(metadata_for(&path, 10), 5, 5);
        let mut buf = ReadBuffer::new(4);

        source.open().unwrap();
        assert_eq!(read_all(&mut source, &mut buf), b"fghij");

        source.open().unwrap();
        assert_eq!(source.bytes_read(), 0);
        assert_eq!(read_all(&mut source, &mut buf), b"fghij");
    }

    #[test]
    fn test_close_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("x.bin");
        fs::write(&path, b"x").unwrap();

        let mut source = FileByteSource::new(metadata_for(&path, 1), 1, 0);
        source.close();
        source.open().unwrap();
        source.close();
        source.close();
        assert!(!source.is_open());
    }

    #[test]
    fn test_zero_size_block_reads_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.bin");
        fs::write(&path, b"").unwrap();

        let mut source = FileByteSource::new(metadata_for(&path, 0), 0, 0);
        let mut buf = ReadBuffer::new(16);
        source.open().unwrap();
        assert!(source.read(&mut buf).unwrap().is_none());
        assert!(source.finished());
    }
}
