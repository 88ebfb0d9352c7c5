//! Explicit file lists.
//!
//! One file per line: a path relative to the transfer root, optionally
//! followed by a tab and the file size in bytes. Empty fields are ignored,
//! so trailing tabs are harmless. Absolute paths are rejected.

use crate::error::{Result, SourceError};
use crate::source::metadata::FileInfo;
use std::io::BufRead;
use std::path::Path;

/// Parse a whole file list
pub fn parse_file_list<R: BufRead>(reader: R) -> Result<Vec<FileInfo>> {
    let mut files = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        files.push(parse_line(&line, index + 1)?);
    }
    Ok(files)
}

fn parse_line(line: &str, line_no: usize) -> Result<FileInfo> {
    let fields: Vec<&str> = line.split('\t').filter(|f| !f.is_empty()).collect();
    if let Some(path) = fields.first() {
        if Path::new(path).is_absolute() {
            return Err(SourceError::FileList {
                line: line_no,
                reason: format!("path '{}' must be relative to the root", path),
            });
        }
    }
    match fields.as_slice() {
        [path] => Ok(FileInfo::new(*path, None)),
        [path, size] => {
            let size = size.trim().parse::<u64>().map_err(|e| SourceError::FileList {
                line: line_no,
                reason: format!("bad size '{}': {}", size, e),
            })?;
            Ok(FileInfo::new(*path, Some(size)))
        }
        _ => Err(SourceError::FileList {
            line: line_no,
            reason: format!("expected 1 or 2 tab separated fields, got {}", fields.len()),
        }),
    }
}
