// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic job state persistence.
//!
//! `state.json` is written via temp-file + fsync + rename, so a concurrent
//! reader (or a reader after a crash) sees either the prior complete record
//! or the new complete record, never a truncated one.

use crate::paths::{JobPaths, STATE_FILE};
use dup_core::{Job, JobId, ValidationError};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("job not found: {0}")]
    JobNotFound(JobId),
    #[error("job state for {id} is invalid: {source}")]
    Invalid {
        id: JobId,
        #[source]
        source: ValidationError,
    },
    #[error("failed to parse {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
        move |source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Store for job records under a single `jobs_dir`.
#[derive(Debug, Clone)]
pub struct JobStore {
    jobs_dir: PathBuf,
}

impl JobStore {
    pub fn new(jobs_dir: impl Into<PathBuf>) -> Self {
        Self {
            jobs_dir: jobs_dir.into(),
        }
    }

    pub fn jobs_dir(&self) -> &Path {
        &self.jobs_dir
    }

    pub fn paths(&self, id: &JobId) -> JobPaths {
        JobPaths::new(&self.jobs_dir, id)
    }

    /// Validate and atomically persist a job record.
    pub fn save(&self, job: &Job) -> Result<(), StorageError> {
        job.validate().map_err(|source| StorageError::Invalid {
            id: job.id.clone(),
            source,
        })?;

        let paths = self.paths(&job.id);
        paths
            .ensure_dirs()
            .map_err(StorageError::io(paths.root()))?;

        let state_path = paths.state_file();
        let tmp_path = paths
            .root()
            .join(format!("state.tmp.{}", uuid::Uuid::new_v4().simple()));

        let json = serde_json::to_vec_pretty(job).map_err(|source| StorageError::Corrupt {
            path: state_path.clone(),
            source,
        })?;

        let mut tmp = File::create(&tmp_path).map_err(StorageError::io(&tmp_path))?;
        tmp.write_all(&json).map_err(StorageError::io(&tmp_path))?;
        tmp.sync_all().map_err(StorageError::io(&tmp_path))?;
        drop(tmp);

        std::fs::rename(&tmp_path, &state_path).map_err(StorageError::io(&state_path))?;

        // Make the rename durable before the caller acts on it.
        if let Ok(dir) = File::open(paths.root()) {
            let _ = dir.sync_all();
        }

        debug!(job_id = %job.id, status = %job.status, step = %job.current_step, "saved job state");
        Ok(())
    }

    /// Load and validate a job record.
    pub fn load(&self, id: &JobId) -> Result<Job, StorageError> {
        let state_path = self.paths(id).state_file();
        let bytes = match std::fs::read(&state_path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::JobNotFound(id.clone()))
            }
            Err(source) => {
                return Err(StorageError::Io {
                    path: state_path,
                    source,
                })
            }
        };
        let job: Job =
            serde_json::from_slice(&bytes).map_err(|source| StorageError::Corrupt {
                path: state_path,
                source,
            })?;
        job.validate().map_err(|source| StorageError::Invalid {
            id: id.clone(),
            source,
        })?;
        Ok(job)
    }

    /// Enumerate all jobs, newest first.
    ///
    /// Directories without a `state.json` are skipped; unparsable records are
    /// logged and skipped rather than failing the whole listing.
    pub fn list_all(&self) -> Result<Vec<Job>, StorageError> {
        let entries = match std::fs::read_dir(&self.jobs_dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.jobs_dir.clone(),
                    source,
                })
            }
        };

        let mut jobs = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() || !path.join(STATE_FILE).is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match self.load(&JobId::new(name)) {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    tracing::warn!(job_dir = %path.display(), error = %e, "skipping unreadable job");
                }
            }
        }
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    /// Delete a job's entire directory tree.
    pub fn delete(&self, id: &JobId) -> Result<(), StorageError> {
        let root = self.paths(id).root().to_path_buf();
        if !root.join(STATE_FILE).is_file() {
            return Err(StorageError::JobNotFound(id.clone()));
        }
        std::fs::remove_dir_all(&root).map_err(StorageError::io(&root))?;
        debug!(job_id = %id, "deleted job");
        Ok(())
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
