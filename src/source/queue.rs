//! Shared block queue between discovery and transfer workers.
//!
//! One producer (discovery) plans and splits files into blocks; any number of
//! consumers pull blocks, read them and either finish them or hand them back.
//! All state lives behind a single mutex with one condition variable keyed on
//! "queue non-empty or discovery finished". File I/O (open/seek/read) always
//! happens with the lock released.
//!
//! ```text
//!  explore / file list
//!         |
//!         v
//!  ResumptionPlanner -> ChunkFactory -> [ max-heap by block size ] -> worker 0..N
//!                                              ^                        |
//!                                              +---- return_to_queue ---+
//! ```

use crate::config::QueueOptions;
use crate::error::Result;
use crate::source::byte_source::FileByteSource;
use crate::source::chunker::ChunkFactory;
use crate::source::explorer::{Discovery, PathExplorer, PathFilter};
use crate::source::metadata::{FileInfo, FileMetadata, PriorTransferRecord};
use crate::source::planner::ResumptionPlanner;
use crate::source::stats::{aggregate_status, ErrorCode, FailureReport, TransferStats};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Lifecycle of file discovery. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DiscoveryState {
    #[default]
    NotStarted,
    Running,
    Finished,
}

/// Heap entry ordering blocks by size, largest first.
/// Order among equal-sized blocks is unspecified.
#[derive(Debug)]
struct QueuedBlock(FileByteSource);

impl PartialEq for QueuedBlock {
    fn eq(&self, other: &Self) -> bool {
        self.0.size() == other.0.size()
    }
}

impl Eq for QueuedBlock {}

impl PartialOrd for QueuedBlock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedBlock {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.size().cmp(&other.0.size())
    }
}

#[derive(Debug, Default)]
struct QueueState {
    blocks: BinaryHeap<QueuedBlock>,
    planner: ResumptionPlanner,
    /// Metadata of every scheduled file; blocks hold clones of these handles
    files: Vec<Arc<FileMetadata>>,
    num_entries: u64,
    total_size: u64,
    num_blocks: u64,
    /// Blocks handed out and not returned
    num_blocks_dequeued: u64,
    failed_source_stats: Vec<TransferStats>,
    failed_directories: Vec<String>,
    discovery: DiscoveryState,
    directory_time: Option<Duration>,
}

impl QueueState {
    fn status(&self) -> ErrorCode {
        aggregate_status(&self.failed_source_stats, &self.failed_directories)
    }

    fn drain_unattempted(&mut self) {
        let remaining = std::mem::take(&mut self.blocks);
        self.failed_source_stats
            .extend(remaining.into_iter().map(|block| block.0.into_transfer_stats()));
    }
}

/// Discovers files under a root and serves their blocks to transfer workers
pub struct DirectorySourceQueue {
    root: PathBuf,
    options: QueueOptions,
    filter: PathFilter,
    chunker: ChunkFactory,
    file_info: Vec<FileInfo>,
    state: Mutex<QueueState>,
    not_empty: Condvar,
}

impl DirectorySourceQueue {
    /// Create a queue for `root`. Fails if the options or patterns are invalid.
    pub fn new(root: impl Into<PathBuf>, options: QueueOptions) -> Result<Self> {
        options.validate()?;
        let filter = PathFilter::from_options(&options)?;
        let chunker = ChunkFactory::new(options.effective_block_size());
        Ok(Self {
            root: root.into(),
            options,
            filter,
            chunker,
            file_info: Vec::new(),
            state: Mutex::new(QueueState::default()),
            not_empty: Condvar::new(),
        })
    }

    /// Use an explicit file list instead of exploring the root.
    /// An empty list keeps exploration enabled.
    pub fn with_file_info(mut self, file_info: Vec<FileInfo>) -> Self {
        self.file_info = file_info;
        self
    }

    pub fn file_info(&self) -> &[FileInfo] {
        &self.file_info
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &QueueOptions {
        &self.options
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Resumption
    // =========================================================================

    /// Install the chunk state of a previous interrupted transfer.
    ///
    /// Resets all counters and replans whatever was already discovered.
    ///
    /// # Panics
    ///
    /// Panics if any block has already been handed to a worker.
    pub fn set_previously_transferred(&self, records: Vec<PriorTransferRecord>) {
        let added = {
            let mut state = self.lock_state();
            assert_eq!(
                state.num_blocks_dequeued, 0,
                "prior transfer state must be set before any block is dequeued"
            );
            let num_records = records.len();
            state.planner = ResumptionPlanner::with_prior_records(records);
            debug!(
                "Installed {} prior transfer records, next seq id {}",
                num_records,
                state.planner.next_seq_id()
            );
            state.num_entries = 0;
            state.total_size = 0;
            state.num_blocks = 0;
            state.blocks.clear();

            let discovered = std::mem::take(&mut state.files);
            let mut added = 0;
            for file in discovered {
                let full_path = file.full_path.clone();
                added += self.plan_into_queue(&mut state, full_path, &file.rel_path, file.size);
            }
            added
        };
        self.smart_notify(added);
    }

    // =========================================================================
    // Discovery (producer side)
    // =========================================================================

    /// Run discovery on a dedicated thread
    pub fn build_queue_asynchronously(self: &Arc<Self>) -> Result<JoinHandle<bool>> {
        let queue = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("source-discovery".to_string())
            .spawn(move || queue.build_queue_synchronously())?;
        Ok(handle)
    }

    /// Discover all files and fill the queue, then mark discovery finished.
    ///
    /// Returns false if discovery was already started, or if any directory
    /// or entry failed along the way.
    pub fn build_queue_synchronously(&self) -> bool {
        let start = Instant::now();
        debug!("build_queue_synchronously() called");
        if !self.start_discovery() {
            error!("File discovery already started for {}", self.root.display());
            return false;
        }

        let res = if self.file_info.is_empty() {
            self.explore()
        } else {
            info!("Using list of file info. Number of files {}", self.file_info.len());
            self.enqueue_files()
        };

        let elapsed = start.elapsed();
        self.lock_state().directory_time = Some(elapsed);
        self.finish_discovery();
        debug!("Finished discovery of {} in {:?}", self.root.display(), elapsed);
        res
    }

    /// Move discovery from not-started to running. Returns false if it had
    /// already been started.
    pub fn start_discovery(&self) -> bool {
        let mut state = self.lock_state();
        if state.discovery != DiscoveryState::NotStarted {
            return false;
        }
        state.discovery = DiscoveryState::Running;
        true
    }

    /// Mark discovery finished. Consumers waiting on an empty queue wake up
    /// and observe that it is closed.
    pub fn finish_discovery(&self) {
        let mut state = self.lock_state();
        state.discovery = DiscoveryState::Finished;
        if state.blocks.is_empty() {
            self.not_empty.notify_all();
        }
    }

    fn explore(&self) -> bool {
        let explorer = PathExplorer::new(
            self.root.clone(),
            self.filter.clone(),
            self.options.follow_symlinks,
        );
        explorer.explore(|event| match event {
            Discovery::File(file) => {
                self.enqueue_file(file.full_path, &file.rel_path, file.size);
            }
            Discovery::FailedDirectory(dir) => {
                self.lock_state().failed_directories.push(dir);
            }
        })
    }

    fn enqueue_files(&self) -> bool {
        let mut ok = true;
        for info in &self.file_info {
            if Path::new(&info.rel_path).is_absolute() {
                error!("File list entry {} is not relative to the root", info.rel_path);
                ok = false;
                continue;
            }
            let full_path = self.root.join(&info.rel_path);
            let size = match info.size {
                Some(size) => size,
                None => match fs::metadata(&full_path) {
                    Ok(metadata) => metadata.len(),
                    Err(e) => {
                        error!("stat failed on path {}: {}", full_path.display(), e);
                        ok = false;
                        continue;
                    }
                },
            };
            self.enqueue_file(full_path, &info.rel_path, size);
        }
        ok
    }

    /// Plan one file against the prior-transfer state and queue its blocks.
    /// Returns the number of blocks added; zero when the file was already
    /// completely transferred.
    pub fn enqueue_file(&self, full_path: PathBuf, rel_path: &str, size: u64) -> usize {
        let added = {
            let mut state = self.lock_state();
            self.plan_into_queue(&mut state, full_path, rel_path, size)
        };
        self.smart_notify(added);
        added
    }

    /// Queue a single prepared block. Counts toward the block total only.
    pub fn enqueue(&self, source: FileByteSource) {
        {
            let mut state = self.lock_state();
            state.num_blocks += 1;
            state.blocks.push(QueuedBlock(source));
        }
        self.smart_notify(1);
    }

    fn plan_into_queue(
        &self,
        state: &mut QueueState,
        full_path: PathBuf,
        rel_path: &str,
        size: u64,
    ) -> usize {
        let plan = state.planner.plan(rel_path, size);
        if plan.is_complete() {
            return 0;
        }

        let metadata = Arc::new(FileMetadata {
            full_path,
            rel_path: rel_path.to_string(),
            seq_id: plan.seq_id,
            size,
            status: plan.status,
            prev_seq_id: plan.prev_seq_id,
        });
        let blocks = self.chunker.blocks(&metadata, &plan.remaining);
        let block_count = blocks.len();
        trace!(
            "Queued {} blocks for {} (seq {}, {:?})",
            block_count,
            rel_path,
            plan.seq_id,
            plan.status
        );

        state.blocks.extend(blocks.into_iter().map(QueuedBlock));
        state.files.push(metadata);
        state.num_entries += 1;
        state.total_size += plan.remaining_bytes();
        state.num_blocks += block_count as u64;
        block_count
    }

    /// Wake everyone when there is a block for every worker, otherwise wake
    /// one waiter per new block.
    fn smart_notify(&self, added: usize) {
        if added >= self.options.num_workers {
            self.not_empty.notify_all();
            return;
        }
        for _ in 0..added {
            self.not_empty.notify_one();
        }
    }

    // =========================================================================
    // Consumption (worker side)
    // =========================================================================

    /// Block until a source is available or the queue is closed.
    ///
    /// The returned source is already open. Sources that fail to open are
    /// recorded as failed and skipped. `None` means discovery finished and
    /// nothing is left. The status is the aggregate error status at the time
    /// the block was taken.
    pub fn get_next_source(&self) -> (Option<FileByteSource>, ErrorCode) {
        loop {
            let mut state = self
                .not_empty
                .wait_while(self.lock_state(), |s| {
                    s.blocks.is_empty() && s.discovery != DiscoveryState::Finished
                })
                .unwrap_or_else(PoisonError::into_inner);

            let status = state.status();
            let Some(QueuedBlock(mut source)) = state.blocks.pop() else {
                return (None, status);
            };
            if state.blocks.is_empty() && state.discovery == DiscoveryState::Finished {
                self.not_empty.notify_all();
            }
            drop(state);

            debug!(
                "got next source {} offset {} size {}",
                source.identifier(),
                source.offset(),
                source.size()
            );
            match source.open() {
                Ok(()) => {
                    self.lock_state().num_blocks_dequeued += 1;
                    return (Some(source), status);
                }
                Err(e) => {
                    source.close();
                    warn!(
                        "Dropping block {} at offset {}: {}",
                        source.identifier(),
                        source.offset(),
                        e
                    );
                    self.lock_state()
                        .failed_source_stats
                        .push(source.into_transfer_stats());
                }
            }
        }
    }

    /// Hand back a block after a failed attempt
    pub fn return_to_queue(&self, source: FileByteSource) {
        self.return_to_queue_batch(vec![source]);
    }

    /// Hand back several blocks at once.
    ///
    /// Blocks whose failed-attempt count reached `max_transfer_retries` are
    /// moved to the failed list for good; the rest are rescheduled.
    ///
    /// # Panics
    ///
    /// Panics if more blocks are returned than were dequeued.
    pub fn return_to_queue_batch(&self, sources: Vec<FileByteSource>) {
        let mut returned = 0;
        {
            let mut state = self.lock_state();
            for mut source in sources {
                assert!(
                    state.num_blocks_dequeued > 0,
                    "returned a block that was never dequeued"
                );
                state.num_blocks_dequeued -= 1;
                source.close();

                let retries = source.transfer_stats().failed_attempts();
                if retries >= self.options.max_transfer_retries {
                    error!("{} failed after {} number of tries.", source.identifier(), retries);
                    state.failed_source_stats.push(source.into_transfer_stats());
                } else {
                    state.blocks.push(QueuedBlock(source));
                    returned += 1;
                }
            }
        }
        self.smart_notify(returned);
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Discovery is done and every block has been handed out
    pub fn is_finished(&self) -> bool {
        let state = self.lock_state();
        state.discovery == DiscoveryState::Finished && state.blocks.is_empty()
    }

    pub fn file_discovery_finished(&self) -> bool {
        self.lock_state().discovery == DiscoveryState::Finished
    }

    /// Number of files scheduled so far (completed files are not counted)
    pub fn discovered_count(&self) -> u64 {
        self.lock_state().num_entries
    }

    /// Bytes scheduled so far, i.e. the remaining bytes of every scheduled file
    pub fn total_discovered_bytes(&self) -> u64 {
        self.lock_state().total_size
    }

    pub fn block_count_and_status(&self) -> (u64, ErrorCode) {
        let state = self.lock_state();
        (state.num_blocks, state.status())
    }

    /// Blocks handed to workers and not returned. Transferred blocks are
    /// simply dropped by the worker and stay counted here.
    pub fn blocks_dequeued(&self) -> u64 {
        self.lock_state().num_blocks_dequeued
    }

    /// Metadata of every scheduled file, in discovery order
    pub fn discovered_files(&self) -> Vec<Arc<FileMetadata>> {
        self.lock_state().files.clone()
    }

    /// Stats of every failed block. Blocks still queued are counted as
    /// failed and drained from the queue.
    pub fn failed_source_stats(&self) -> Vec<TransferStats> {
        let mut state = self.lock_state();
        state.drain_unattempted();
        state.failed_source_stats.clone()
    }

    pub fn failed_directories(&self) -> Vec<String> {
        self.lock_state().failed_directories.clone()
    }

    /// Failed blocks (draining unattempted ones), failed directories and status
    pub fn failure_report(&self) -> FailureReport {
        let mut state = self.lock_state();
        state.drain_unattempted();
        FailureReport::new(
            state.failed_source_stats.clone(),
            state.failed_directories.clone(),
        )
    }

    /// How long discovery took, once it has finished
    pub fn directory_time(&self) -> Option<Duration> {
        self.lock_state().directory_time
    }
}
