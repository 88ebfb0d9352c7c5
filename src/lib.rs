//! dirsource - file discovery and block scheduling for parallel file transfer.
//!
//! Finds the files to send under a root, skips or trims work finished by an
//! earlier interrupted transfer, cuts the rest into blocks and hands them to
//! any number of sender threads, largest blocks first.
//!
//! ```no_run
//! use std::sync::Arc;
//! use dirsource::{DirectorySourceQueue, QueueOptions, ReadBuffer};
//!
//! let options = QueueOptions::default();
//! let queue = Arc::new(DirectorySourceQueue::new("/data", options.clone()).unwrap());
//! let discovery = queue.build_queue_asynchronously().unwrap();
//!
//! let mut buf = ReadBuffer::new(options.buffer_size);
//! while let (Some(mut block), _status) = queue.get_next_source() {
//!     while let Ok(Some(bytes)) = block.read(&mut buf) {
//!         // hand `bytes` to the transport
//!         let _ = bytes;
//!     }
//! }
//! discovery.join().unwrap();
//! ```

pub mod config;
pub mod error;
pub mod source;

pub use config::QueueOptions;
pub use error::{Result, SourceError};
pub use source::{
    ByteRange, DirectorySourceQueue, ErrorCode, FailureReport, FileByteSource, FileInfo,
    FileMetadata, PriorTransferRecord, ReadBuffer, ResumptionStatus, TransferStats,
};
