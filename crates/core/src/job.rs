// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job identifier and state machine.
//!
//! A [`Job`] is a value: steps consume an immutable view and the engine
//! persists a new value on every transition. Mutation happens only between
//! load and save, while the job lock is held.

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::input::InputDescriptor;
use crate::retry::ErrorKind;
use crate::step::StepKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::path::PathBuf;

/// Unique identifier for a job (UUID v4, rendered as a string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// Create a JobId from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a string slice truncated to at most `n` characters.
    pub fn short(&self, n: usize) -> &str {
        if self.0.len() <= n {
            &self.0
        } else {
            &self.0[..n]
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Borrow<str> for JobId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Overall job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::InProgress => write!(f, "in_progress"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::InProgress => write!(f, "in_progress"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Error detail recorded on a failed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    pub timestamp: DateTime<Utc>,
}

/// Record of one imported artifact, for counters and status display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFile {
    pub file_name: String,
    /// Path relative to the job directory.
    pub file_path: PathBuf,
    /// First token of the filename (e.g. `Patient` for `Patient_1.ndjson`).
    pub resource_type: String,
    pub file_size: u64,
    pub line_count: u64,
    /// Step that produced this file.
    pub step: StepKind,
}

impl DataFile {
    /// Infer the FHIR resource type from a filename: the leading run of
    /// characters up to the first `_`, `-`, or `.`.
    pub fn resource_type_of(file_name: &str) -> String {
        file_name
            .split(['_', '-', '.'])
            .next()
            .unwrap_or("")
            .to_string()
    }
}

/// One stage of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: StepKind,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub files_processed: u64,
    #[serde(default)]
    pub bytes_processed: u64,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<StepError>,
}

impl Step {
    pub fn new(name: StepKind) -> Self {
        Self {
            name,
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            files_processed: 0,
            bytes_processed: 0,
            retry_count: 0,
            last_error: None,
        }
    }
}

/// Invariant violations detected by [`Job::validate`] and the transition
/// helpers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("job has no steps")]
    NoSteps,
    #[error("first step is {got}, input kind requires {expected}")]
    FirstStepMismatch { expected: StepKind, got: StepKind },
    #[error("current_step {0} does not name a configured step")]
    UnknownCurrentStep(String),
    #[error("current_step is empty but job status is {0}, not completed")]
    EmptyCurrentStepNotCompleted(JobStatus),
    #[error("job is completed but current_step is still {0}")]
    CompletedWithCurrentStep(String),
    #[error("step {0} is {1} but has no started_at")]
    StepMissingStartedAt(StepKind, StepStatus),
    #[error("step {0} is completed but has no completed_at")]
    StepMissingCompletedAt(StepKind),
    #[error("invalid job status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
    #[error("invalid step status transition for {step}: {from} -> {to}")]
    InvalidStepTransition {
        step: StepKind,
        from: StepStatus,
        to: StepStatus,
    },
    #[error("step {0} is not part of this job")]
    NoSuchStep(StepKind),
}

/// The root aggregate: one end-to-end run of the pipeline on one input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub input: InputDescriptor,
    /// Poll URL returned by the extraction server; retained so a crashed
    /// poll resumes without re-submitting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_url: Option<String>,
    /// Configuration snapshot taken at creation; immutable for the life of
    /// the job.
    pub config: AppConfig,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub data_files: Vec<DataFile>,
    #[serde(default)]
    pub total_files: u64,
    #[serde(default)]
    pub total_bytes: u64,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Name of the step currently due to run; empty once completed.
    pub current_step: String,
}

impl Job {
    /// Create a new pending job. Steps come from the config snapshot's
    /// `enabled_steps`; the caller has already verified the first step
    /// matches the input kind.
    pub fn new(id: JobId, input: InputDescriptor, config: AppConfig, clock: &dyn Clock) -> Self {
        let now = clock.now();
        let steps: Vec<Step> = config
            .pipeline
            .enabled_steps
            .iter()
            .map(|kind| Step::new(*kind))
            .collect();
        let current_step = steps
            .first()
            .map(|s| s.name.to_string())
            .unwrap_or_default();
        Self {
            id,
            created_at: now,
            updated_at: now,
            input,
            extraction_url: None,
            config,
            steps,
            data_files: Vec::new(),
            total_files: 0,
            total_bytes: 0,
            status: JobStatus::Pending,
            error: None,
            current_step,
        }
    }

    /// The kind of the step named by `current_step`, if any.
    pub fn current_step_kind(&self) -> Option<StepKind> {
        self.current_step.parse().ok()
    }

    pub fn step(&self, kind: StepKind) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == kind)
    }

    pub fn step_mut(&mut self, kind: StepKind) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.name == kind)
    }

    /// Kinds of all completed steps, in pipeline order.
    pub fn completed_steps(&self) -> Vec<StepKind> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| s.name)
            .collect()
    }

    /// The enabled step after `kind`, if any.
    pub fn next_step_after(&self, kind: StepKind) -> Option<StepKind> {
        let idx = self.steps.iter().position(|s| s.name == kind)?;
        self.steps.get(idx + 1).map(|s| s.name)
    }

    /// Transition the job to in-progress (from pending or failed).
    pub fn start(&mut self, clock: &dyn Clock) -> Result<(), ValidationError> {
        match self.status {
            JobStatus::Pending | JobStatus::Failed => {
                self.status = JobStatus::InProgress;
                self.error = None;
                self.updated_at = clock.now();
                Ok(())
            }
            from => Err(ValidationError::InvalidTransition {
                from,
                to: JobStatus::InProgress,
            }),
        }
    }

    /// Mark the job completed and clear the current step.
    pub fn complete(&mut self, clock: &dyn Clock) -> Result<(), ValidationError> {
        match self.status {
            JobStatus::InProgress => {
                self.status = JobStatus::Completed;
                self.current_step = String::new();
                self.error = None;
                self.updated_at = clock.now();
                Ok(())
            }
            from => Err(ValidationError::InvalidTransition {
                from,
                to: JobStatus::Completed,
            }),
        }
    }

    /// Transition a step to in-progress and point `current_step` at it.
    pub fn start_step(&mut self, kind: StepKind, clock: &dyn Clock) -> Result<(), ValidationError> {
        let now = clock.now();
        let step = self
            .step_mut(kind)
            .ok_or(ValidationError::NoSuchStep(kind))?;
        match step.status {
            StepStatus::Pending | StepStatus::Failed => {
                if step.status == StepStatus::Failed {
                    step.retry_count += 1;
                }
                step.status = StepStatus::InProgress;
                step.started_at = Some(now);
                step.last_error = None;
                self.current_step = kind.to_string();
                self.updated_at = now;
                Ok(())
            }
            from => Err(ValidationError::InvalidStepTransition {
                step: kind,
                from,
                to: StepStatus::InProgress,
            }),
        }
    }

    /// Mark a step completed with its final counters.
    pub fn complete_step(
        &mut self,
        kind: StepKind,
        files: u64,
        bytes: u64,
        clock: &dyn Clock,
    ) -> Result<(), ValidationError> {
        let now = clock.now();
        let step = self
            .step_mut(kind)
            .ok_or(ValidationError::NoSuchStep(kind))?;
        match step.status {
            StepStatus::InProgress => {
                step.status = StepStatus::Completed;
                step.completed_at = Some(now);
                step.files_processed = files;
                step.bytes_processed = bytes;
                self.updated_at = now;
                Ok(())
            }
            from => Err(ValidationError::InvalidStepTransition {
                step: kind,
                from,
                to: StepStatus::Completed,
            }),
        }
    }

    /// Record a step failure and mark the whole job failed.
    pub fn fail_step(
        &mut self,
        kind: StepKind,
        error: StepError,
        clock: &dyn Clock,
    ) -> Result<(), ValidationError> {
        let now = clock.now();
        let message = error.message.clone();
        let step = self
            .step_mut(kind)
            .ok_or(ValidationError::NoSuchStep(kind))?;
        step.status = StepStatus::Failed;
        step.last_error = Some(error);
        self.status = JobStatus::Failed;
        self.error = Some(message);
        self.updated_at = now;
        Ok(())
    }

    /// Record one imported artifact and bump the job totals.
    pub fn record_data_file(&mut self, file: DataFile) {
        self.total_files += 1;
        self.total_bytes += file.file_size;
        self.data_files.push(file);
    }

    /// Check the §3 invariants. Called by the state store on every save and
    /// load.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let first = self.steps.first().ok_or(ValidationError::NoSteps)?;
        let expected = self.input.kind.import_step();
        if first.name != expected {
            return Err(ValidationError::FirstStepMismatch {
                expected,
                got: first.name,
            });
        }

        if self.current_step.is_empty() {
            if self.status != JobStatus::Completed {
                return Err(ValidationError::EmptyCurrentStepNotCompleted(self.status));
            }
        } else {
            if self.status == JobStatus::Completed {
                return Err(ValidationError::CompletedWithCurrentStep(
                    self.current_step.clone(),
                ));
            }
            let known = self
                .steps
                .iter()
                .any(|s| s.name.to_string() == self.current_step);
            if !known {
                return Err(ValidationError::UnknownCurrentStep(
                    self.current_step.clone(),
                ));
            }
        }

        for step in &self.steps {
            match step.status {
                StepStatus::InProgress | StepStatus::Completed if step.started_at.is_none() => {
                    return Err(ValidationError::StepMissingStartedAt(
                        step.name,
                        step.status,
                    ));
                }
                _ => {}
            }
            if step.status == StepStatus::Completed && step.completed_at.is_none() {
                return Err(ValidationError::StepMissingCompletedAt(step.name));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
