// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dup job` - job management commands

use crate::commands::engine_for;
use crate::output;
use anyhow::Result;
use clap::{Args, Subcommand};
use dup_core::{JobId, StepKind};
use std::path::Path;

#[derive(Args)]
pub struct JobArgs {
    #[command(subcommand)]
    pub command: JobCommand,
}

#[derive(Subcommand)]
pub enum JobCommand {
    /// List all jobs, newest first
    List,
    /// Run a single step of a job
    Run {
        /// Job ID
        job_id: String,

        /// Step to run (e.g. "local_import", "dimp")
        #[arg(long)]
        step: String,
    },
    /// Delete a job and its entire directory
    Delete {
        /// Job ID
        job_id: String,
    },
}

pub async fn run(args: JobArgs, config_path: &Path) -> Result<()> {
    match args.command {
        JobCommand::List => {
            let engine = engine_for(config_path)?;
            output::print_job_list(&engine.list()?);
            Ok(())
        }
        JobCommand::Run { job_id, step } => {
            let engine = engine_for(config_path)?;
            let kind: StepKind = step.parse()?;
            let job = engine.run_step(&JobId::new(job_id), kind).await?;
            output::print_job(&job, false);
            Ok(())
        }
        JobCommand::Delete { job_id } => {
            let engine = engine_for(config_path)?;
            let id = JobId::new(job_id);
            engine.delete(&id)?;
            println!("deleted job {id}");
            Ok(())
        }
    }
}
