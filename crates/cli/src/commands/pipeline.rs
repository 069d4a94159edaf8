// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dup pipeline` - run and inspect pipeline jobs

use crate::commands::engine_for;
use crate::output;
use anyhow::Result;
use clap::{Args, Subcommand};
use dup_core::JobId;
use std::path::Path;

#[derive(Args)]
pub struct PipelineArgs {
    #[command(subcommand)]
    pub command: PipelineCommand,
}

#[derive(Subcommand)]
pub enum PipelineCommand {
    /// Create a job for the given input and run it to completion
    Start {
        /// Cohort query file, extraction URL, HTTP URL, or local directory
        input: String,
    },
    /// Show a job's state (read-only, works while the job is running)
    Status {
        /// Job ID
        job_id: String,
    },
    /// Resume a suspended or failed job
    Continue {
        /// Job ID
        job_id: String,
    },
}

pub async fn run(args: PipelineArgs, config_path: &Path) -> Result<()> {
    match args.command {
        PipelineCommand::Start { input } => {
            let engine = engine_for(config_path)?;
            let job = engine.create(&input)?;
            println!("created job {}", job.id);
            let done = engine.run(&job.id).await?;
            output::print_job(&done, false);
            Ok(())
        }
        PipelineCommand::Status { job_id } => {
            let engine = engine_for(config_path)?;
            let id = JobId::new(job_id);
            let job = engine.status(&id)?;
            output::print_job(&job, engine.is_running(&id));
            Ok(())
        }
        PipelineCommand::Continue { job_id } => {
            let engine = engine_for(config_path)?;
            let id = JobId::new(job_id);
            let job = engine.run(&id).await?;
            output::print_job(&job, false);
            Ok(())
        }
    }
}
