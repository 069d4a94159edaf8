// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job engine: create, run, resume, single-step execution, delete.
//!
//! Every state-mutating operation holds the job's advisory lock for its full
//! duration and persists through the state store on each transition. A job
//! is a value here: load, mutate, save — never shared mutable state.

use crate::dispatch::{execute_step, StepContext, StepRun};
use crate::error::EngineError;
use dup_adapters::{ExtractionService, Pseudonymizer};
use dup_core::{
    classify_input, AppConfig, Clock, Job, JobId, StepError, StepKind, StepStatus, SystemClock,
    TorchConfig,
};
use dup_storage::{JobLock, JobStore};
use std::sync::Arc;
use tracing::{info, warn};

pub struct JobEngine {
    store: JobStore,
    config: AppConfig,
    clock: Arc<dyn Clock>,
    pseudonymizer: Option<Arc<dyn Pseudonymizer>>,
    extraction: Option<Arc<dyn ExtractionService>>,
}

impl JobEngine {
    pub fn new(config: AppConfig) -> Self {
        Self {
            store: JobStore::new(config.jobs_dir.clone()),
            config,
            clock: Arc::new(SystemClock),
            pseudonymizer: None,
            extraction: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Substitute the pseudonymization service (tests).
    pub fn with_pseudonymizer(mut self, service: Arc<dyn Pseudonymizer>) -> Self {
        self.pseudonymizer = Some(service);
        self
    }

    /// Substitute the extraction service (tests).
    pub fn with_extraction(mut self, service: Arc<dyn ExtractionService>) -> Self {
        self.extraction = Some(service);
        self
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Classify the input, snapshot the configuration, and persist a new
    /// pending job.
    pub fn create(&self, input_source: &str) -> Result<Job, EngineError> {
        self.config.validate()?;

        let patterns = self
            .config
            .services
            .torch
            .as_ref()
            .map(|t| t.result_url_patterns.clone())
            .unwrap_or_else(TorchConfig::default_result_url_patterns);
        let input = classify_input(input_source, &patterns)?;

        let expected = input.kind.import_step();
        let configured = self.config.pipeline.enabled_steps[0];
        if configured != expected {
            return Err(EngineError::InputStepMismatch {
                input: input.kind,
                expected,
                configured,
            });
        }
        if expected == StepKind::TorchImport && self.config.services.torch.is_none() {
            return Err(EngineError::MissingServiceConfig {
                step: StepKind::TorchImport,
                service: "torch",
            });
        }

        let job = Job::new(
            JobId::generate(),
            input,
            self.config.clone(),
            self.clock.as_ref(),
        );
        self.store.save(&job)?;
        info!(job_id = %job.id, input = %job.input.source, kind = %job.input.kind, "job created");
        Ok(job)
    }

    /// Run a job until it completes or a step fails. Also the resume path:
    /// completed work is skipped via the steps' own idempotence.
    pub async fn run(&self, id: &JobId) -> Result<Job, EngineError> {
        let paths = self.store.paths(id);
        let _lock = JobLock::acquire(paths.root())?;
        let mut job = self.store.load(id)?;

        if job.status == dup_core::JobStatus::Completed {
            info!(job_id = %id, "job already completed");
            return Ok(job);
        }
        if job.status != dup_core::JobStatus::InProgress {
            job.start(self.clock.as_ref())?;
            self.store.save(&job)?;
        }

        loop {
            let Some(kind) = job.current_step_kind() else {
                break;
            };
            let status = job
                .step(kind)
                .map(|s| s.status)
                .unwrap_or(StepStatus::Pending);

            match status {
                StepStatus::Completed => self.advance(&mut job, kind)?,
                StepStatus::Pending | StepStatus::Failed => {
                    job.start_step(kind, self.clock.as_ref())?;
                    self.store.save(&job)?;
                }
                StepStatus::InProgress => {
                    self.execute_current(&mut job, kind).await?;
                }
            }
        }

        info!(job_id = %id, files = job.total_files, bytes = job.total_bytes, "job completed");
        Ok(job)
    }

    /// Run one step of a job, enforcing enablement and prerequisites.
    ///
    /// Re-running a step that is already completed is a no-op.
    pub async fn run_step(&self, id: &JobId, kind: StepKind) -> Result<Job, EngineError> {
        let paths = self.store.paths(id);
        let _lock = JobLock::acquire(paths.root())?;
        let mut job = self.store.load(id)?;

        let Some(step) = job.step(kind) else {
            return Err(EngineError::StepNotEnabled(kind));
        };
        if step.status == StepStatus::Completed {
            info!(job_id = %id, step = %kind, "step already completed, nothing to do");
            return Ok(job);
        }
        if !kind.prerequisite_met(&job.completed_steps(), &job.config.pipeline.enabled_steps) {
            return Err(EngineError::PrerequisiteNotMet {
                step: kind,
                requires: requires_text(kind),
            });
        }

        if job.status != dup_core::JobStatus::InProgress {
            job.start(self.clock.as_ref())?;
        }
        if job.step(kind).map(|s| s.status) != Some(StepStatus::InProgress) {
            job.start_step(kind, self.clock.as_ref())?;
        } else {
            job.current_step = kind.to_string();
        }
        self.store.save(&job)?;

        self.execute_current(&mut job, kind).await?;
        Ok(job)
    }

    /// Read a job without taking the lock.
    pub fn status(&self, id: &JobId) -> Result<Job, EngineError> {
        Ok(self.store.load(id)?)
    }

    /// All jobs, newest first. Read-only.
    pub fn list(&self) -> Result<Vec<Job>, EngineError> {
        Ok(self.store.list_all()?)
    }

    /// Whether another process currently holds the job's lock.
    pub fn is_running(&self, id: &JobId) -> bool {
        JobLock::is_locked(self.store.paths(id).root())
    }

    /// Delete a job and its entire directory tree.
    pub fn delete(&self, id: &JobId) -> Result<(), EngineError> {
        let paths = self.store.paths(id);
        let _lock = JobLock::acquire(paths.root())?;
        self.store.delete(id)?;
        Ok(())
    }

    /// Execute the in-progress step `kind`, then advance on success or
    /// record the failure and surface it.
    async fn execute_current(&self, job: &mut Job, kind: StepKind) -> Result<(), EngineError> {
        let paths = self.store.paths(&job.id);
        let ctx = StepContext {
            store: &self.store,
            paths: &paths,
            pseudonymizer: self.pseudonymizer.as_deref(),
            extraction: self.extraction.as_deref(),
        };

        match execute_step(&ctx, job, kind).await {
            Ok(StepRun {
                files_processed,
                bytes_processed,
            }) => {
                job.complete_step(kind, files_processed, bytes_processed, self.clock.as_ref())?;
                self.advance(job, kind)?;
                Ok(())
            }
            Err(e) => {
                warn!(job_id = %job.id, step = %kind, error = %e, "step failed");
                let detail = StepError {
                    kind: e.kind(),
                    message: e.to_string(),
                    http_status: e.http_status(),
                    timestamp: self.clock.now(),
                };
                job.fail_step(kind, detail, self.clock.as_ref())?;
                self.store.save(job)?;
                Err(e)
            }
        }
    }

    /// Move past a completed step: mark the job done when it was the last
    /// one, otherwise check prerequisites and start the next.
    fn advance(&self, job: &mut Job, finished: StepKind) -> Result<(), EngineError> {
        match job.next_step_after(finished) {
            None => job.complete(self.clock.as_ref())?,
            Some(next) => {
                if !next.prerequisite_met(&job.completed_steps(), &job.config.pipeline.enabled_steps)
                {
                    return Err(EngineError::PrerequisiteNotMet {
                        step: next,
                        requires: requires_text(next),
                    });
                }
                job.start_step(next, self.clock.as_ref())?;
            }
        }
        self.store.save(job)?;
        Ok(())
    }
}

fn requires_text(kind: StepKind) -> &'static str {
    match kind {
        StepKind::Dimp => "import",
        StepKind::Validation | StepKind::CsvConversion | StepKind::ParquetConversion => {
            "dimp (or import)"
        }
        StepKind::TorchImport | StepKind::LocalImport | StepKind::HttpImport => "nothing",
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
