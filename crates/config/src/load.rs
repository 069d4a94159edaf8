// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Config file loading: read, expand `${VAR}`, parse YAML, validate.

use crate::env::{expand_env, EnvError};
use dup_core::{AppConfig, ConfigError};
use std::path::Path;
use thiserror::Error;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "dup.yaml";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read config file {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Env(#[from] EnvError),
    #[error("config file {path} is not valid YAML: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<AppConfig, LoadError> {
    let display = path.display().to_string();
    let raw = std::fs::read_to_string(path).map_err(|source| LoadError::Unreadable {
        path: display.clone(),
        source,
    })?;
    let expanded = expand_env(&raw)?;
    let config: AppConfig =
        serde_yaml::from_str(&expanded).map_err(|source| LoadError::Yaml {
            path: display,
            source,
        })?;
    config.validate()?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to defaults.
///
/// The default config is not validated here: it has no dimp service, which
/// only matters once a job tries to run the dimp step.
pub fn load_config_or_default(path: &Path) -> Result<AppConfig, LoadError> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(AppConfig::default())
    }
}

#[cfg(test)]
#[path = "load_tests.rs"]
mod tests;
