// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-job advisory lock.
//!
//! Presence of `.lock` alone is not a lock; only the OS advisory lock on the
//! open handle is. A killed process therefore never leaves a job wedged: the
//! kernel drops the lock with the handle.

use chrono::Utc;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("job is busy: another process holds its lock")]
    Busy,
    #[error("lock I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Exclusive advisory lock on one job directory. Released on drop.
#[derive(Debug)]
pub struct JobLock {
    file: File,
}

impl JobLock {
    /// Acquire the lock non-blockingly. `Busy` if another process holds it.
    pub fn acquire(job_dir: &Path) -> Result<Self, LockError> {
        let path = job_dir.join(crate::paths::LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                return Err(LockError::Busy)
            }
            Err(e) => return Err(LockError::Io(e)),
        }

        let mut lock = Self { file };
        lock.stamp()?;
        Ok(lock)
    }

    /// Probe whether a job is currently locked, without keeping the lock.
    pub fn is_locked(job_dir: &Path) -> bool {
        matches!(Self::acquire(job_dir), Err(LockError::Busy))
    }

    fn stamp(&mut self) -> Result<(), LockError> {
        self.file.set_len(0)?;
        let stamp = format!(
            "pid={}\ntime={}\n",
            std::process::id(),
            Utc::now().to_rfc3339()
        );
        self.file.write_all(stamp.as_bytes())?;
        self.file.flush()?;
        Ok(())
    }
}

impl Drop for JobLock {
    fn drop(&mut self) {
        // Handle close releases the lock anyway; unlock explicitly so the
        // release is not deferred by a lingering duplicate descriptor.
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
