// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error type for the engine.

use crate::bundle::BundleError;
use crate::ndjson::ProcessError;
use dup_adapters::{ServiceError, TorchError};
use dup_core::{ConfigError, ErrorKind, InputError, StepKind, ValidationError};
use dup_storage::{LockError, StorageError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("job is busy: another process holds its lock")]
    JobBusy,
    #[error(transparent)]
    Lock(std::io::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("input kind {input} requires the {expected} step, but the pipeline starts with {configured}")]
    InputStepMismatch {
        input: dup_core::InputKind,
        expected: StepKind,
        configured: StepKind,
    },
    #[error("step {step} needs services.{service} configured")]
    MissingServiceConfig { step: StepKind, service: &'static str },
    #[error("step {0} is not enabled for this job")]
    StepNotEnabled(StepKind),
    #[error("prerequisite not met: step {step} requires a completed {requires} step")]
    PrerequisiteNotMet { step: StepKind, requires: &'static str },
    #[error("{dir} contains no *.ndjson files")]
    NoInputFiles { dir: PathBuf },
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Torch(#[from] TorchError),
    #[error(transparent)]
    Bundle(#[from] BundleError),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("line {line} of {file} is not valid JSON: {detail}")]
    MalformedRecord {
        file: String,
        line: u64,
        detail: String,
    },
}

impl EngineError {
    /// Retry classification for recording into a step's `last_error`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Service(e) => e.kind,
            EngineError::Torch(e) => e.kind(),
            // Everything else is a local/config/validation condition that a
            // retry cannot fix.
            _ => ErrorKind::NonTransient,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            EngineError::Service(e) => e.http_status,
            EngineError::Torch(e) => e.http_status(),
            _ => None,
        }
    }
}

impl From<LockError> for EngineError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Busy => EngineError::JobBusy,
            LockError::Io(io) => EngineError::Lock(io),
        }
    }
}
