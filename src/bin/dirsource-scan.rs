//! dirsource-scan - discover a tree and drain its blocks with parallel readers.
//!
//! Exercises the whole pipeline without a network: discovery runs on its own
//! thread while N reader threads pull blocks and read them to the end.
//!
//! Usage:
//!   dirsource-scan /data -w 8 --block-size 16777216
//!   find . -type f | dirsource-scan --files /data

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use dirsource::source::parse_file_list;
use dirsource::{DirectorySourceQueue, ErrorCode, FileByteSource, QueueOptions, ReadBuffer};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "dirsource-scan",
    version,
    about = "Discover files under a directory and read every block with parallel workers"
)]
struct Args {
    /// Root directory
    #[arg(default_value = ".")]
    directory: PathBuf,

    /// Read relative paths (optionally TAB size) from stdin instead of exploring
    #[arg(long)]
    files: bool,

    /// TOML file with queue options
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Only keep files whose relative path matches this regex
    #[arg(long, value_name = "REGEX")]
    include: Option<String>,

    /// Drop files whose relative path matches this regex
    #[arg(long, value_name = "REGEX")]
    exclude: Option<String>,

    /// Skip directories (relative path with trailing /) matching this regex
    #[arg(long, value_name = "REGEX")]
    prune_dir: Option<String>,

    /// Follow symlinked files and directories
    #[arg(short = 'L', long)]
    follow_symlinks: bool,

    /// Block size in bytes (0 sends each file as one block)
    #[arg(long, value_name = "BYTES")]
    block_size: Option<u64>,

    /// Number of reader threads (default: number of CPUs)
    #[arg(short = 'w', long, value_name = "NUM")]
    workers: Option<usize>,

    /// Attempts before a block is given up on
    #[arg(long, value_name = "NUM")]
    max_retries: Option<u32>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Hide the progress spinner
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Serialize)]
struct Summary {
    files: u64,
    bytes_discovered: u64,
    blocks: u64,
    blocks_read: u64,
    bytes_read: u64,
    failed_blocks: usize,
    failed_directories: Vec<String>,
    status: ErrorCode,
    discovery_secs: f64,
    elapsed_secs: f64,
}

#[derive(Default)]
struct Counters {
    blocks: AtomicU64,
    bytes: AtomicU64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let options = build_options(&args)?;

    let mut queue = DirectorySourceQueue::new(&args.directory, options.clone())
        .context("Invalid queue options")?;
    if args.files {
        let list = parse_file_list(io::stdin().lock()).context("Failed to read file list")?;
        queue = queue.with_file_info(list);
    }
    let queue = Arc::new(queue);

    let start = Instant::now();
    let discovery = queue.build_queue_asynchronously()?;
    let progress = spinner(args.quiet);
    let counters = Arc::new(Counters::default());

    info!(
        "Reading {} with {} workers",
        args.directory.display(),
        options.num_workers
    );
    let mut readers = Vec::with_capacity(options.num_workers);
    for i in 0..options.num_workers {
        let queue = Arc::clone(&queue);
        let counters = Arc::clone(&counters);
        let progress = progress.clone();
        let buffer_size = options.buffer_size;
        let handle = thread::Builder::new()
            .name(format!("reader-{}", i))
            .spawn(move || read_worker(&queue, buffer_size, &counters, &progress))?;
        readers.push(handle);
    }

    for handle in readers {
        handle
            .join()
            .map_err(|_| anyhow!("reader thread panicked"))?;
    }
    let discovery_ok = discovery
        .join()
        .map_err(|_| anyhow!("discovery thread panicked"))?;
    progress.finish_and_clear();

    let report = queue.failure_report();
    let (blocks, _) = queue.block_count_and_status();
    let summary = Summary {
        files: queue.discovered_count(),
        bytes_discovered: queue.total_discovered_bytes(),
        blocks,
        blocks_read: counters.blocks.load(Ordering::Relaxed),
        bytes_read: counters.bytes.load(Ordering::Relaxed),
        failed_blocks: report.failed_sources.len(),
        failed_directories: report.failed_directories.clone(),
        status: report.status,
        discovery_secs: queue
            .directory_time()
            .unwrap_or_default()
            .as_secs_f64(),
        elapsed_secs: start.elapsed().as_secs_f64(),
    };
    print_summary(&summary, args.json)?;

    if !report.is_clean() || !discovery_ok {
        std::process::exit(1);
    }
    Ok(())
}

fn build_options(args: &Args) -> Result<QueueOptions> {
    let mut options = match &args.config {
        Some(path) => QueueOptions::load(path)?,
        None => QueueOptions {
            num_workers: num_cpus::get(),
            ..QueueOptions::default()
        },
    };

    if let Some(pattern) = &args.include {
        options.include_pattern = Some(pattern.clone());
    }
    if let Some(pattern) = &args.exclude {
        options.exclude_pattern = Some(pattern.clone());
    }
    if let Some(pattern) = &args.prune_dir {
        options.prune_dir_pattern = Some(pattern.clone());
    }
    if args.follow_symlinks {
        options.follow_symlinks = true;
    }
    if let Some(block_size) = args.block_size {
        options.block_size = block_size;
    }
    if let Some(workers) = args.workers {
        options.num_workers = workers;
    }
    if let Some(retries) = args.max_retries {
        options.max_transfer_retries = retries;
    }
    options.validate()?;
    Ok(options)
}

fn spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let progress = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}") {
        progress.set_style(style);
    }
    progress.enable_steady_tick(Duration::from_millis(120));
    progress
}

/// Pull blocks until the queue closes. Failed reads go back for a retry.
fn read_worker(
    queue: &DirectorySourceQueue,
    buffer_size: usize,
    counters: &Counters,
    progress: &ProgressBar,
) {
    let mut buf = ReadBuffer::new(buffer_size);
    loop {
        let (source, _status) = queue.get_next_source();
        let Some(mut source) = source else {
            break;
        };

        match read_block(&mut source, &mut buf, counters) {
            Ok(()) => {
                let blocks = counters.blocks.fetch_add(1, Ordering::Relaxed) + 1;
                let bytes = counters.bytes.load(Ordering::Relaxed);
                progress.set_message(format!("{} blocks, {} bytes read", blocks, bytes));
            }
            Err(e) => {
                warn!("Retrying {} at offset {}: {}", source.identifier(), source.offset(), e);
                source.record_failed_attempt();
                queue.return_to_queue(source);
            }
        }
    }
}

fn read_block(
    source: &mut FileByteSource,
    buf: &mut ReadBuffer,
    counters: &Counters,
) -> dirsource::Result<()> {
    while let Some(data) = source.read(buf)? {
        counters.bytes.fetch_add(data.len() as u64, Ordering::Relaxed);
    }
    Ok(())
}

fn print_summary(summary: &Summary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("Files discovered:   {}", summary.files);
    println!("Bytes discovered:   {}", summary.bytes_discovered);
    println!("Blocks:             {}", summary.blocks);
    println!("Blocks read:        {}", summary.blocks_read);
    println!("Bytes read:         {}", summary.bytes_read);
    println!("Failed blocks:      {}", summary.failed_blocks);
    for dir in &summary.failed_directories {
        println!("Failed directory:   {}", dir);
    }
    println!("Status:             {:?}", summary.status);
    println!(
        "Discovery:          {:.3}s of {:.3}s",
        summary.discovery_secs, summary.elapsed_secs
    );
    Ok(())
}
