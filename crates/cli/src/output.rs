// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plain-text rendering of jobs for the terminal.

use dup_core::{Job, StepStatus};

/// Print one job's full state.
pub fn print_job(job: &Job, running_elsewhere: bool) {
    println!("job      {}", job.id);
    println!("status   {}", job.status);
    if running_elsewhere {
        println!("         (currently locked by another process)");
    }
    println!("input    {} ({})", job.input.source, job.input.kind);
    if let Some(url) = &job.extraction_url {
        println!("extract  {url}");
    }
    println!("created  {}", job.created_at.to_rfc3339());
    println!("updated  {}", job.updated_at.to_rfc3339());
    println!("files    {} ({} bytes)", job.total_files, job.total_bytes);
    if let Some(error) = &job.error {
        println!("error    {error}");
    }

    println!();
    println!(
        "{:<20} {:<12} {:>8} {:>12} {:>7}",
        "STEP", "STATUS", "FILES", "BYTES", "RETRIES"
    );
    for step in &job.steps {
        let marker = if step.name.to_string() == job.current_step {
            "*"
        } else {
            " "
        };
        println!(
            "{marker}{:<19} {:<12} {:>8} {:>12} {:>7}",
            step.name.to_string(),
            step.status.to_string(),
            step.files_processed,
            step.bytes_processed,
            step.retry_count,
        );
        if step.status == StepStatus::Failed {
            if let Some(error) = &step.last_error {
                println!("    {} error: {}", error.kind, error.message);
            }
        }
    }
}

/// Print the job listing, newest first.
pub fn print_job_list(jobs: &[Job]) {
    if jobs.is_empty() {
        println!("no jobs");
        return;
    }
    println!(
        "{:<38} {:<12} {:<20} {:<22} INPUT",
        "JOB", "STATUS", "STEP", "CREATED"
    );
    for job in jobs {
        let step = if job.current_step.is_empty() {
            "-"
        } else {
            &job.current_step
        };
        println!(
            "{:<38} {:<12} {:<20} {:<22} {}",
            job.id.to_string(),
            job.status.to_string(),
            step,
            job.created_at.format("%Y-%m-%d %H:%M:%S"),
            job.input.source,
        );
    }
}
