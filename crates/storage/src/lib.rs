// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dup-storage: durable job state and per-job advisory locking.

pub mod lock;
pub mod paths;
pub mod state;

pub use lock::{JobLock, LockError};
pub use paths::JobPaths;
pub use state::{JobStore, StorageError};
