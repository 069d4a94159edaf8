// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! dup - Data Use Process pipeline CLI

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{job, pipeline};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "dup",
    version,
    about = "Data Use Process pipeline for healthcare FHIR data"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(
        short = 'c',
        long = "config",
        global = true,
        value_name = "FILE",
        default_value = dup_config::DEFAULT_CONFIG_FILE
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start, inspect, and resume pipeline runs
    Pipeline(pipeline::PipelineArgs),
    /// Job management
    Job(job::JobArgs),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    if let Err(error) = run(cli).await {
        report(&error);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Pipeline(args) => pipeline::run(args, &cli.config).await,
        Commands::Job(args) => job::run(args, &cli.config).await,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("DUP_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Print the error chain and its retry classification to stderr.
fn report(error: &anyhow::Error) {
    eprintln!("error: {error}");
    for cause in error.chain().skip(1) {
        eprintln!("  caused by: {cause}");
    }
    if let Some(engine_error) = error.downcast_ref::<dup_engine::EngineError>() {
        eprintln!("classification: {}", engine_error.kind());
    }
}
