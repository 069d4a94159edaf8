// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod job;
pub mod pipeline;

use anyhow::Result;
use dup_core::AppConfig;
use dup_engine::JobEngine;
use std::path::Path;

/// Load the config file (or defaults) and build an engine from it.
pub fn engine_for(config_path: &Path) -> Result<JobEngine> {
    let config: AppConfig = dup_config::load_config_or_default(config_path)?;
    Ok(JobEngine::new(config))
}
