// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The three import step shapes: local directory copy, HTTP download, and
//! the extraction-server (torch) flow.
//!
//! The torch flow persists the poll URL into the job the moment it is known
//! so that a crash mid-poll resumes without re-submitting the cohort query.

use crate::dispatch::StepRun;
use crate::error::EngineError;
use crate::ndjson::{count_non_blank_lines, ndjson_files_recursive, remove_stale_parts};
use dup_adapters::{normalize_url, ExtractionService, HttpClient, ServiceError};
use dup_core::{DataFile, InputKind, Job, StepKind};
use dup_storage::{JobPaths, JobStore};
use url::Url;
use std::path::Path;
use tracing::info;

/// Copy every `*.ndjson` under `source` (recursively) into `import/`.
pub fn run_local_import(
    job: &mut Job,
    paths: &JobPaths,
    source: &Path,
) -> Result<StepRun, EngineError> {
    let files = ndjson_files_recursive(source)?;
    if files.is_empty() {
        return Err(EngineError::NoInputFiles {
            dir: source.to_path_buf(),
        });
    }

    let import_dir = paths.import_dir();
    let mut run = StepRun::default();

    for file in files {
        let Some(file_name) = file.file_name().and_then(|n| n.to_str()).map(str::to_string)
        else {
            continue;
        };
        let dest = import_dir.join(&file_name);
        let file_size = std::fs::copy(&file, &dest).map_err(|e| {
            EngineError::Process(crate::ndjson::ProcessError::Io {
                path: dest.clone(),
                source: e,
            })
        })?;
        let line_count = count_non_blank_lines(&dest)?;

        record_import(job, StepKind::LocalImport, &file_name, file_size, line_count);
        run.files_processed += 1;
        run.bytes_processed += file_size;
        info!(file = %file_name, bytes = file_size, lines = line_count, "imported");
    }
    Ok(run)
}

/// Download a single NDJSON artifact from a plain HTTP URL.
pub async fn run_http_import(
    job: &mut Job,
    paths: &JobPaths,
    http: &HttpClient,
    source: &str,
) -> Result<StepRun, EngineError> {
    let operation = "import http source";
    let url = Url::parse(source)
        .map_err(|e| ServiceError::protocol(operation, format!("{source}: {e}")))?;

    let file_name = download_file_name(&url);
    let import_dir = paths.import_dir();
    let final_path = import_dir.join(&file_name);
    let part_path = import_dir.join(format!("{file_name}.part"));

    let mut file = std::fs::File::create(&part_path)
        .map_err(|e| ServiceError::io(operation, &e))
        .map_err(EngineError::from)?;
    let download = http
        .download(operation, url, None, None, &mut file)
        .await;
    drop(file);

    let file_size = match download {
        Ok(bytes) => bytes,
        Err(e) => {
            let _ = std::fs::remove_file(&part_path);
            return Err(e.into());
        }
    };
    std::fs::rename(&part_path, &final_path).map_err(|e| {
        EngineError::Process(crate::ndjson::ProcessError::Io {
            path: final_path.clone(),
            source: e,
        })
    })?;

    let line_count = count_non_blank_lines(&final_path)?;
    record_import(job, StepKind::HttpImport, &file_name, file_size, line_count);
    info!(file = %file_name, bytes = file_size, lines = line_count, "downloaded");

    Ok(StepRun {
        files_processed: 1,
        bytes_processed: file_size,
    })
}

/// Run the extraction flow: submit (for cohort inputs), poll, download.
///
/// `base_url` is the configured extraction server base used to normalize a
/// result-URL input; the submit path normalizes via the client itself.
pub async fn run_torch_import(
    job: &mut Job,
    store: &JobStore,
    paths: &JobPaths,
    torch: &dyn ExtractionService,
    base_url: &str,
) -> Result<StepRun, EngineError> {
    remove_stale_parts(&paths.import_dir())?;

    if job.extraction_url.is_none() {
        let poll_url = match job.input.kind {
            InputKind::CohortQueryFile => {
                torch.submit(Path::new(&job.input.source)).await?
            }
            InputKind::ExtractionResultUrl => {
                let base = Url::parse(base_url).map_err(|e| {
                    ServiceError::protocol("import extraction result", e.to_string())
                })?;
                normalize_url(&base, &job.input.source)?.to_string()
            }
            other => {
                return Err(EngineError::InputStepMismatch {
                    input: other,
                    expected: other.import_step(),
                    configured: StepKind::TorchImport,
                })
            }
        };
        job.extraction_url = Some(poll_url);
        // Persist the handle before polling: a crash from here on resumes
        // without re-submitting.
        store.save(job)?;
    }

    let poll_url = job
        .extraction_url
        .clone()
        .unwrap_or_default();
    let urls = torch.poll_until_complete(&poll_url).await?;

    let mut run = StepRun::default();
    for (index, url) in urls.iter().enumerate() {
        let downloaded = torch.download(url, &paths.import_dir(), index).await?;
        record_import(
            job,
            StepKind::TorchImport,
            &downloaded.file_name,
            downloaded.file_size,
            downloaded.line_count,
        );
        run.files_processed += 1;
        run.bytes_processed += downloaded.file_size;
    }
    Ok(run)
}

fn record_import(job: &mut Job, step: StepKind, file_name: &str, file_size: u64, line_count: u64) {
    // Re-imports overwrite the same artifact; keep one record per name so
    // totals stay monotonic without double-counting a resumed import.
    if job.data_files.iter().any(|f| f.file_name == file_name) {
        return;
    }
    job.record_data_file(DataFile {
        file_name: file_name.to_string(),
        file_path: Path::new("import").join(file_name),
        resource_type: DataFile::resource_type_of(file_name),
        file_size,
        line_count,
        step,
    });
}

/// Filename for an HTTP import: last path segment, `download.ndjson` when
/// absent, `.ndjson` enforced.
fn download_file_name(url: &Url) -> String {
    let last = url
        .path_segments()
        .and_then(|mut s| s.next_back())
        .unwrap_or("")
        .trim()
        .to_string();
    let name = if last.is_empty() {
        "download.ndjson".to_string()
    } else {
        last
    };
    if name.ends_with(".ndjson") {
        name
    } else {
        format!("{name}.ndjson")
    }
}

#[cfg(test)]
#[path = "import_tests.rs"]
mod tests;
