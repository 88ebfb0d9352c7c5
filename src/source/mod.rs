//! File discovery and block scheduling.
//!
//! Discovery walks a root directory (or takes an explicit file list), plans
//! each file against any previous interrupted transfer, splits what is left
//! into fixed-size blocks and pushes them into a shared queue that transfer
//! workers drain concurrently.
//!
//! # Architecture
//!
//! ```text
//! +--------------+     +--------------+     +--------------+     +--------------+
//! | PathExplorer | --> |   Planner    | --> | ChunkFactory | --> |    Queue     | --> workers
//! | (BFS walk)   |     | (resumption) |     | (blocks)     |     | (max-heap)   |
//! +--------------+     +--------------+     +--------------+     +--------------+
//! ```
//!
//! Workers own a [`ReadBuffer`] each and read the [`FileByteSource`] they
//! were handed outside the queue lock.

pub mod byte_source;
pub mod chunker;
pub mod explorer;
pub mod file_list;
pub mod metadata;
pub mod planner;
pub mod queue;
pub mod stats;

pub use byte_source::{FileByteSource, ReadBuffer};
pub use chunker::ChunkFactory;
pub use explorer::{DiscoveredFile, Discovery, ExploreSummary, PathExplorer, PathFilter};
pub use file_list::parse_file_list;
pub use metadata::{ByteRange, FileInfo, FileMetadata, PriorTransferRecord, ResumptionStatus};
pub use planner::{Plan, ResumptionPlanner};
pub use queue::DirectorySourceQueue;
pub use stats::{ErrorCode, FailureReport, TransferStats};
