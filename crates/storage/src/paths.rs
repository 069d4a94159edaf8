// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk layout of a job directory.
//!
//! ```text
//! <jobs_dir>/<job_id>/
//!   state.json       canonical job record
//!   .lock            advisory lock file
//!   import/          imported *.ndjson
//!   pseudonymized/   dimped_*.ndjson
//!   csv/             reserved
//!   parquet/         reserved
//! ```

use dup_core::JobId;
use std::path::{Path, PathBuf};

pub const STATE_FILE: &str = "state.json";
pub const LOCK_FILE: &str = ".lock";

/// Subdirectories created for every job.
pub const STEP_DIRS: [&str; 4] = ["import", "pseudonymized", "csv", "parquet"];

/// Path helpers for one job's directory tree.
#[derive(Debug, Clone)]
pub struct JobPaths {
    root: PathBuf,
}

impl JobPaths {
    pub fn new(jobs_dir: &Path, id: &JobId) -> Self {
        Self {
            root: jobs_dir.join(id.as_str()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    pub fn import_dir(&self) -> PathBuf {
        self.root.join("import")
    }

    pub fn pseudonymized_dir(&self) -> PathBuf {
        self.root.join("pseudonymized")
    }

    /// Output directory for a step (`import/`, `pseudonymized/`, ...).
    pub fn step_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Create the job directory and all step subdirectories (0755).
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        create_dir_0755(&self.root)?;
        for dir in STEP_DIRS {
            create_dir_0755(&self.root.join(dir))?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn create_dir_0755(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    match std::fs::DirBuilder::new().mode(0o755).recursive(true).create(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn create_dir_0755(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
