// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step dispatch: one exhaustive match from step kind to implementation,
//! shared by the end-to-end run and the single-step command.

use crate::error::EngineError;
use crate::{import, pseudonymize};
use dup_adapters::{DimpClient, ExtractionService, HttpClient, Pseudonymizer, TorchClient};
use dup_core::{Job, StepKind};
use dup_storage::{JobPaths, JobStore};
use std::path::Path;
use tracing::warn;

/// Counters produced by one step execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepRun {
    pub files_processed: u64,
    pub bytes_processed: u64,
}

/// Service overrides injected by the engine (tests substitute fakes here;
/// production leaves them unset and clients are built from the job's config
/// snapshot).
pub(crate) struct StepContext<'a> {
    pub store: &'a JobStore,
    pub paths: &'a JobPaths,
    pub pseudonymizer: Option<&'a dyn Pseudonymizer>,
    pub extraction: Option<&'a dyn ExtractionService>,
}

pub(crate) async fn execute_step(
    ctx: &StepContext<'_>,
    job: &mut Job,
    kind: StepKind,
) -> Result<StepRun, EngineError> {
    match kind {
        StepKind::LocalImport => {
            let source = job.input.source.clone();
            import::run_local_import(job, ctx.paths, Path::new(&source))
        }
        StepKind::HttpImport => {
            let source = job.input.source.clone();
            let http = HttpClient::new(job.config.retry.clone())?;
            import::run_http_import(job, ctx.paths, &http, &source).await
        }
        StepKind::TorchImport => {
            let torch_config =
                job.config
                    .services
                    .torch
                    .clone()
                    .ok_or(EngineError::MissingServiceConfig {
                        step: kind,
                        service: "torch",
                    })?;
            match ctx.extraction {
                Some(service) => {
                    import::run_torch_import(job, ctx.store, ctx.paths, service, &torch_config.base_url)
                        .await
                }
                None => {
                    let client = TorchClient::new(&torch_config, &job.config.retry)?;
                    import::run_torch_import(job, ctx.store, ctx.paths, &client, &torch_config.base_url)
                        .await
                }
            }
        }
        StepKind::Dimp => {
            let dimp_config =
                job.config
                    .services
                    .dimp
                    .clone()
                    .ok_or(EngineError::MissingServiceConfig {
                        step: kind,
                        service: "dimp",
                    })?;
            let threshold = dimp_config.split_threshold_bytes();
            match ctx.pseudonymizer {
                Some(service) => pseudonymize::run(ctx.paths, service, threshold).await,
                None => {
                    let client = DimpClient::new(&dimp_config, &job.config.retry)?;
                    pseudonymize::run(ctx.paths, &client, threshold).await
                }
            }
        }
        StepKind::Validation | StepKind::CsvConversion | StepKind::ParquetConversion => {
            warn!(step = %kind, "step is not implemented yet; completing with no work");
            Ok(StepRun::default())
        }
    }
}
