// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line-oriented NDJSON file handling.
//!
//! Reading is framed on newlines with no per-line cap: individual resources
//! are known to approach 100 MiB, and `read_line` grows the line buffer as
//! needed while the block buffer below only amortizes syscalls.
//!
//! Writing goes through a `.part` temp file owned by an RAII guard: commit
//! renames it over the final name, any other exit path deletes it. A reader
//! therefore never observes a partially written output.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Block buffer for NDJSON readers.
pub const READ_BUFFER_CAPACITY: usize = 8 * 1024 * 1024;

/// Suffix of in-flight output files.
pub const PART_SUFFIX: &str = ".part";

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProcessError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> ProcessError + '_ {
        move |source| ProcessError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Iterator over the non-blank lines of an NDJSON file, with 1-based line
/// numbers.
pub struct NdjsonLines {
    path: PathBuf,
    reader: BufReader<File>,
    line_number: u64,
}

impl NdjsonLines {
    pub fn open(path: &Path) -> Result<Self, ProcessError> {
        let file = File::open(path).map_err(ProcessError::io(path))?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::with_capacity(READ_BUFFER_CAPACITY, file),
            line_number: 0,
        })
    }
}

impl Iterator for NdjsonLines {
    type Item = Result<(u64, String), ProcessError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut line = String::new();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line_number += 1;
                    let trimmed = line.trim_end_matches(['\n', '\r']);
                    if trimmed.trim().is_empty() {
                        continue;
                    }
                    return Some(Ok((self.line_number, trimmed.to_string())));
                }
                Err(source) => {
                    return Some(Err(ProcessError::Io {
                        path: self.path.clone(),
                        source,
                    }))
                }
            }
        }
    }
}

/// Write guard for an atomically produced output file.
///
/// Writes go to `<final>.part`; [`commit`](Self::commit) renames onto the
/// final name. Dropping without committing removes the partial file.
pub struct AtomicNdjsonWriter {
    part_path: PathBuf,
    final_path: PathBuf,
    writer: Option<BufWriter<File>>,
    lines: u64,
    bytes: u64,
}

impl AtomicNdjsonWriter {
    pub fn create(final_path: &Path) -> Result<Self, ProcessError> {
        let part_path = part_path_of(final_path);
        let file = File::create(&part_path).map_err(ProcessError::io(&part_path))?;
        Ok(Self {
            part_path,
            final_path: final_path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
            lines: 0,
            bytes: 0,
        })
    }

    /// Append one record line (newline added here).
    pub fn write_line(&mut self, line: &str) -> Result<(), ProcessError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(ProcessError::Io {
                path: self.part_path.clone(),
                source: std::io::Error::other("writer already finished"),
            });
        };
        writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.write_all(b"\n"))
            .map_err(ProcessError::io(&self.part_path))?;
        self.lines += 1;
        self.bytes += line.len() as u64 + 1;
        Ok(())
    }

    /// Flush, fsync, and rename onto the final name. Returns (lines, bytes).
    pub fn commit(mut self) -> Result<(u64, u64), ProcessError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(ProcessError::io(&self.part_path))?;
            let file = writer
                .into_inner()
                .map_err(|e| ProcessError::Io {
                    path: self.part_path.clone(),
                    source: e.into_error(),
                })?;
            file.sync_all().map_err(ProcessError::io(&self.part_path))?;
        }
        std::fs::rename(&self.part_path, &self.final_path)
            .map_err(ProcessError::io(&self.final_path))?;
        debug!(file = %self.final_path.display(), lines = self.lines, "output committed");
        Ok((self.lines, self.bytes))
    }
}

impl Drop for AtomicNdjsonWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            drop(writer);
            if let Err(e) = std::fs::remove_file(&self.part_path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.part_path.display(), error = %e, "failed to remove partial output");
                }
            }
        }
    }
}

fn part_path_of(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_os_string();
    name.push(PART_SUFFIX);
    PathBuf::from(name)
}

/// Delete leftover `*.part` files from a crashed run. Returns how many were
/// removed.
pub fn remove_stale_parts(dir: &Path) -> Result<usize, ProcessError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(source) => {
            return Err(ProcessError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_part = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(PART_SUFFIX));
        if path.is_file() && is_part {
            std::fs::remove_file(&path).map_err(ProcessError::io(&path))?;
            warn!(path = %path.display(), "removed stale partial output");
            removed += 1;
        }
    }
    Ok(removed)
}

/// Count non-blank lines of a file.
pub fn count_non_blank_lines(path: &Path) -> Result<u64, ProcessError> {
    let mut count = 0;
    for line in NdjsonLines::open(path)? {
        line?;
        count += 1;
    }
    Ok(count)
}

/// `*.ndjson` files directly inside `dir`, sorted by name.
pub fn ndjson_files(dir: &Path) -> Result<Vec<PathBuf>, ProcessError> {
    let entries = std::fs::read_dir(dir).map_err(ProcessError::io(dir))?;
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && has_ndjson_suffix(p))
        .collect();
    files.sort();
    Ok(files)
}

/// `*.ndjson` files anywhere under `dir`, sorted by path.
pub fn ndjson_files_recursive(dir: &Path) -> Result<Vec<PathBuf>, ProcessError> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let entries = std::fs::read_dir(&current).map_err(ProcessError::io(&current))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.is_file() && has_ndjson_suffix(&path) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn has_ndjson_suffix(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("ndjson")
}

#[cfg(test)]
#[path = "ndjson_tests.rs"]
mod tests;
