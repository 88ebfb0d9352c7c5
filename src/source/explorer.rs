//! Breadth-first directory exploration.
//!
//! Walks the tree under a root with an explicit work list of pending
//! relative directories, so deep trees never grow the stack and pruning a
//! subtree is just not pushing it. Every accepted file is reported as soon as
//! it is found; directory failures are reported and skipped, never fatal.
//!
//! Relative paths are `/` separated and directories carry a trailing `/`,
//! which is what the include/exclude/prune patterns are matched against.
//! Directories are walked by their raw names; a file whose relative path is
//! not valid UTF-8 is skipped as an entry error.

use crate::config::QueueOptions;
use crate::error::{Result, SourceError};
use regex::Regex;
use std::collections::{HashSet, VecDeque};
use std::fs::{self, FileType};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace, warn};

// =============================================================================
// Filters
// =============================================================================

/// Include/exclude/prune patterns, each matched against the whole relative path
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
    prune_dir: Option<Regex>,
}

impl PathFilter {
    /// Compile the given patterns. Empty patterns are treated as unset.
    pub fn new(
        include: Option<&str>,
        exclude: Option<&str>,
        prune_dir: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
            prune_dir: compile(prune_dir)?,
        })
    }

    pub fn from_options(options: &QueueOptions) -> Result<Self> {
        Self::new(
            options.include_pattern.as_deref(),
            options.exclude_pattern.as_deref(),
            options.prune_dir_pattern.as_deref(),
        )
    }

    /// Exclusion wins; when an include pattern is set the file must match it
    pub fn keep_file(&self, rel_path: &str) -> bool {
        if self.exclude.as_ref().is_some_and(|re| re.is_match(rel_path)) {
            return false;
        }
        self.include.as_ref().map_or(true, |re| re.is_match(rel_path))
    }

    /// Whether a directory (relative path ending in `/`) and its subtree are skipped
    pub fn prune_dir(&self, rel_dir: &str) -> bool {
        self.prune_dir.as_ref().is_some_and(|re| re.is_match(rel_dir))
    }
}

fn compile(pattern: Option<&str>) -> Result<Option<Regex>> {
    match pattern {
        None | Some("") => Ok(None),
        Some(p) => Regex::new(&format!("^(?:{})$", p))
            .map(Some)
            .map_err(|source| SourceError::InvalidPattern {
                pattern: p.to_string(),
                source,
            }),
    }
}

// =============================================================================
// Discovery events
// =============================================================================

/// A regular file accepted by the filters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Path to open; the canonical target when reached through a symlink
    pub full_path: PathBuf,
    /// Path relative to the root
    pub rel_path: String,
    pub size: u64,
}

/// Emitted by [`PathExplorer::explore`] as the walk progresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    File(DiscoveredFile),
    /// Full path of a directory that could not be opened or fully read
    FailedDirectory(String),
}

/// Collected result of a whole walk
#[derive(Debug, Clone, Default)]
pub struct ExploreSummary {
    pub files: Vec<DiscoveredFile>,
    pub failed_directories: Vec<String>,
    /// False if any error was met, including per-entry ones
    pub success: bool,
}

enum EntryKind {
    File { full_path: PathBuf, size: u64 },
    Dir,
    Skip,
}

// =============================================================================
// Explorer
// =============================================================================

pub struct PathExplorer {
    root: PathBuf,
    filter: PathFilter,
    follow_symlinks: bool,
}

impl PathExplorer {
    pub fn new(root: impl Into<PathBuf>, filter: PathFilter, follow_symlinks: bool) -> Self {
        Self {
            root: root.into(),
            filter,
            follow_symlinks,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the tree, reporting each accepted file and failed directory.
    /// Returns true when no error of any kind was encountered.
    pub fn explore<F>(&self, mut on_event: F) -> bool
    where
        F: FnMut(Discovery),
    {
        info!(
            "Exploring root dir {} include_pattern: {:?} exclude_pattern: {:?} prune_dir_pattern: {:?}",
            self.root.display(),
            self.filter.include.as_ref().map(Regex::as_str),
            self.filter.exclude.as_ref().map(Regex::as_str),
            self.filter.prune_dir.as_ref().map(Regex::as_str),
        );

        let mut has_error = false;
        let mut num_files = 0u64;
        let mut visited: HashSet<PathBuf> = HashSet::new();
        if self.follow_symlinks {
            if let Ok(root) = fs::canonicalize(&self.root) {
                visited.insert(root);
            }
        }

        let mut todo: VecDeque<PathBuf> = VecDeque::from([PathBuf::new()]);
        while let Some(rel_dir) = todo.pop_front() {
            let full_dir = self.root.join(&rel_dir);
            debug!("Processing directory {}", full_dir.display());

            let entries = match fs::read_dir(&full_dir) {
                Ok(entries) => entries,
                Err(source) => {
                    let err = SourceError::ReadDir {
                        path: full_dir.clone(),
                        source,
                    };
                    error!("Error opening dir: {}", err);
                    on_event(Discovery::FailedDirectory(dir_label(&full_dir)));
                    has_error = true;
                    continue;
                }
            };

            // read_dir never yields `.` or `..`
            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(source) => {
                        let err = SourceError::ReadDir {
                            path: full_dir.clone(),
                            source,
                        };
                        error!("Error reading dir: {}", err);
                        on_event(Discovery::FailedDirectory(dir_label(&full_dir)));
                        has_error = true;
                        break;
                    }
                };

                let rel_path = rel_dir.join(entry.file_name());
                let entry_path = entry.path();

                // file_type() comes from the directory entry when the
                // filesystem provides it and falls back to lstat otherwise
                let kind = entry
                    .file_type()
                    .map_err(|source| SourceError::Stat {
                        path: entry_path.clone(),
                        source,
                    })
                    .and_then(|file_type| self.classify(&entry_path, file_type, &mut visited));

                match kind {
                    Ok(EntryKind::File { full_path, size }) => {
                        trace!("Found file {} of size {}", full_path.display(), size);
                        let Some(rel_path) = rel_string(&rel_path) else {
                            warn!(
                                "Skipping entry {}: relative path is not valid UTF-8",
                                entry_path.display()
                            );
                            has_error = true;
                            continue;
                        };
                        if !self.filter.keep_file(&rel_path) {
                            continue;
                        }
                        num_files += 1;
                        on_event(Discovery::File(DiscoveredFile {
                            full_path,
                            rel_path,
                            size,
                        }));
                    }
                    Ok(EntryKind::Dir) => {
                        let label = prune_label(&rel_path);
                        if self.filter.prune_dir(&label) {
                            debug!("Pruning {}", label);
                            continue;
                        }
                        trace!("Adding {}", label);
                        todo.push_back(rel_path);
                    }
                    Ok(EntryKind::Skip) => {}
                    Err(e) => {
                        warn!("Skipping entry: {}", e);
                        has_error = true;
                    }
                }
            }
        }

        info!(
            "Number of files explored: {}, errors: {}",
            num_files, has_error
        );
        !has_error
    }

    /// Walk the whole tree and collect the results
    pub fn explore_all(&self) -> ExploreSummary {
        let mut files = Vec::new();
        let mut failed_directories = Vec::new();
        let success = self.explore(|event| match event {
            Discovery::File(file) => files.push(file),
            Discovery::FailedDirectory(dir) => failed_directories.push(dir),
        });
        ExploreSummary {
            files,
            failed_directories,
            success,
        }
    }

    fn classify(
        &self,
        path: &Path,
        file_type: FileType,
        visited: &mut HashSet<PathBuf>,
    ) -> Result<EntryKind> {
        if file_type.is_dir() {
            if self.follow_symlinks {
                let canonical = resolve(path)?;
                mark_visited(visited, canonical)?;
            }
            return Ok(EntryKind::Dir);
        }

        if file_type.is_file() {
            let size = stat(path)?.len();
            return Ok(EntryKind::File {
                full_path: path.to_path_buf(),
                size,
            });
        }

        if file_type.is_symlink() && self.follow_symlinks {
            let target = resolve(path)?;
            let metadata = stat(&target)?;
            trace!("Resolved symlink {} to {}", path.display(), target.display());
            if metadata.is_file() {
                return Ok(EntryKind::File {
                    full_path: target,
                    size: metadata.len(),
                });
            }
            if metadata.is_dir() {
                mark_visited(visited, target)?;
                return Ok(EntryKind::Dir);
            }
        }

        trace!("Ignoring entry {} of type {:?}", path.display(), file_type);
        Ok(EntryKind::Skip)
    }
}

fn resolve(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).map_err(|source| SourceError::ResolveLink {
        path: path.to_path_buf(),
        source,
    })
}

fn stat(path: &Path) -> Result<fs::Metadata> {
    fs::metadata(path).map_err(|source| SourceError::Stat {
        path: path.to_path_buf(),
        source,
    })
}

/// First visit wins; a second arrival at the same canonical directory is an error
fn mark_visited(visited: &mut HashSet<PathBuf>, canonical: PathBuf) -> Result<()> {
    if visited.contains(&canonical) {
        return Err(SourceError::DirectoryCycle { path: canonical });
    }
    visited.insert(canonical);
    Ok(())
}

/// `/` separated relative path, or `None` if any component is not UTF-8
fn rel_string(rel_path: &Path) -> Option<String> {
    let parts = rel_path
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

/// Relative directory with a trailing `/`, lossy; only ever matched, never opened
fn prune_label(rel_dir: &Path) -> String {
    let mut label = rel_dir
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    label.push('/');
    label
}

/// Directory paths are reported with a trailing separator
fn dir_label(path: &Path) -> String {
    let mut label = path.to_string_lossy().into_owned();
    if !label.ends_with('/') {
        label.push('/');
    }
    label
}
