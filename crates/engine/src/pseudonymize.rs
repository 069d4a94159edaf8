// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The pseudonymization (dimp) step.
//!
//! Every `import/*.ndjson` file maps to `pseudonymized/dimped_<name>`.
//! An output that already exists is taken as done — that existence check is
//! the whole resume mechanism. A record-level failure aborts the step; the
//! half-written `.part` is discarded so the next resume retries the file
//! from its start, keeping output line order identical to input line order.

use crate::bundle::{reassemble, split_bundle, BundleError};
use crate::dispatch::StepRun;
use crate::error::EngineError;
use crate::ndjson::{
    count_non_blank_lines, ndjson_files, remove_stale_parts, AtomicNdjsonWriter, NdjsonLines,
};
use dup_adapters::Pseudonymizer;
use dup_storage::JobPaths;
use serde_json::Value;
use tracing::{error, info};

/// Prefix of produced output files.
pub const OUTPUT_PREFIX: &str = "dimped_";

/// Run the dimp step over every import file.
pub async fn run(
    paths: &JobPaths,
    dimp: &dyn Pseudonymizer,
    split_threshold: usize,
) -> Result<StepRun, EngineError> {
    let import_dir = paths.import_dir();
    let output_dir = paths.pseudonymized_dir();

    remove_stale_parts(&output_dir)?;

    let inputs = ndjson_files(&import_dir)?;
    if inputs.is_empty() {
        return Err(EngineError::NoInputFiles { dir: import_dir });
    }

    let mut run = StepRun::default();
    let mut records_total: u64 = 0;

    for input in &inputs {
        let file_name = input
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let output = output_dir.join(format!("{OUTPUT_PREFIX}{file_name}"));

        if output.is_file() {
            // Produced by an earlier run; skip but keep the counters honest.
            let lines = count_non_blank_lines(&output)?;
            records_total += lines;
            run.files_processed += 1;
            run.bytes_processed += std::fs::metadata(&output)
                .map(|m| m.len())
                .unwrap_or_default();
            info!(file = file_name, lines, "output exists, skipping");
            continue;
        }

        let (lines, bytes) = process_file(input, &output, dimp, split_threshold).await?;
        records_total += lines;
        run.files_processed += 1;
        run.bytes_processed += bytes;
    }

    info!(
        files = run.files_processed,
        records = records_total,
        "pseudonymization step finished"
    );
    Ok(run)
}

async fn process_file(
    input: &std::path::Path,
    output: &std::path::Path,
    dimp: &dyn Pseudonymizer,
    split_threshold: usize,
) -> Result<(u64, u64), EngineError> {
    let file = input.display().to_string();
    let mut writer = AtomicNdjsonWriter::create(output)?;

    for item in NdjsonLines::open(input)? {
        let (line_number, line) = item?;
        let record: Value =
            serde_json::from_str(&line).map_err(|e| EngineError::MalformedRecord {
                file: file.clone(),
                line: line_number,
                detail: e.to_string(),
            })?;

        let transformed = transform_record(&record, dimp, split_threshold)
            .await
            .map_err(|e| {
                error!(
                    file = %file,
                    line_number,
                    resource_type = record
                        .get("resourceType")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown"),
                    resource_id = record.get("id").and_then(|v| v.as_str()).unwrap_or("unknown"),
                    error = %e,
                    "record failed, aborting file"
                );
                e
            })?;

        let serialized = serde_json::to_string(&transformed).map_err(|e| {
            EngineError::MalformedRecord {
                file: file.clone(),
                line: line_number,
                detail: e.to_string(),
            }
        })?;
        writer.write_line(&serialized)?;
    }

    // Commit only after every record made it through; otherwise the guard
    // drops the .part and the file is retried whole on resume.
    Ok(writer.commit()?)
}

async fn transform_record(
    record: &Value,
    dimp: &dyn Pseudonymizer,
    split_threshold: usize,
) -> Result<Value, EngineError> {
    if record.get("resourceType").and_then(Value::as_str) == Some("Bundle") {
        return transform_bundle(record, dimp, split_threshold).await;
    }

    let size = crate::bundle::encoded_size(record);
    if size > split_threshold {
        return Err(BundleError::OversizedResource {
            resource_type: record
                .get("resourceType")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            resource_id: record.get("id").and_then(Value::as_str).unwrap_or("unknown").to_string(),
            size,
            threshold: split_threshold,
        }
        .into());
    }
    Ok(dimp.pseudonymize(record).await?)
}

async fn transform_bundle(
    bundle: &Value,
    dimp: &dyn Pseudonymizer,
    split_threshold: usize,
) -> Result<Value, EngineError> {
    let chunks = split_bundle(bundle, split_threshold)?;
    let metadata = chunks
        .first()
        .map(|c| c.metadata.clone())
        .ok_or(BundleError::CannotPartitionEmpty)?;

    let mut responses = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        responses.push(dimp.pseudonymize(&chunk.bundle).await?);
    }

    let out = reassemble(&metadata, responses)?;
    Ok(out.bundle)
}

#[cfg(test)]
#[path = "pseudonymize_tests.rs"]
mod tests;
