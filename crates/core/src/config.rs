// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration model.
//!
//! The engine receives an [`AppConfig`] value at construction; the snapshot
//! embedded in a job's `state.json` is the source of truth for the life of
//! that job. Loading (YAML, env expansion) lives in `dup-config`.

pub use crate::retry::RetryPolicy;
use crate::step::StepKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Default root for on-disk job state.
pub const DEFAULT_JOBS_DIR: &str = "./jobs";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub services: ServicesConfig,
    pub pipeline: PipelineConfig,
    pub retry: RetryPolicy,
    /// Root directory for job state (auto-created).
    pub jobs_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            services: ServicesConfig::default(),
            pipeline: PipelineConfig::default(),
            retry: RetryPolicy::default(),
            jobs_dir: PathBuf::from(DEFAULT_JOBS_DIR),
        }
    }
}

/// External service endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torch: Option<TorchConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimp: Option<DimpConfig>,
}

/// Extraction server (TORCH) settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorchConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Overall poll deadline, measured from submission.
    #[serde(default = "TorchConfig::default_extraction_timeout_minutes")]
    pub extraction_timeout_minutes: u64,
    /// Initial poll interval.
    #[serde(default = "TorchConfig::default_polling_interval_seconds")]
    pub polling_interval_seconds: u64,
    /// Poll interval cap (doubling stops here).
    #[serde(default = "TorchConfig::default_max_polling_interval_seconds")]
    pub max_polling_interval_seconds: u64,
    /// Path substrings identifying an extraction-result URL.
    #[serde(default = "TorchConfig::default_result_url_patterns")]
    pub result_url_patterns: Vec<String>,
}

impl TorchConfig {
    pub const fn default_extraction_timeout_minutes() -> u64 {
        30
    }

    pub const fn default_polling_interval_seconds() -> u64 {
        5
    }

    pub const fn default_max_polling_interval_seconds() -> u64 {
        30
    }

    pub fn default_result_url_patterns() -> Vec<String> {
        vec!["/fhir/extraction/".to_string()]
    }
}

/// De-identification service (DIMP) settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimpConfig {
    pub url: String,
    /// Bundle split threshold in MiB (1-100).
    #[serde(default = "DimpConfig::default_bundle_split_threshold_mb")]
    pub bundle_split_threshold_mb: u64,
}

impl DimpConfig {
    pub const fn default_bundle_split_threshold_mb() -> u64 {
        10
    }

    /// Split threshold in bytes.
    pub fn split_threshold_bytes(&self) -> usize {
        (self.bundle_split_threshold_mb as usize) * 1024 * 1024
    }
}

/// Pipeline step ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub enabled_steps: Vec<StepKind>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled_steps: vec![StepKind::LocalImport, StepKind::Dimp],
        }
    }
}

/// Configuration validation failures. All are non-transient.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("pipeline.enabled_steps must not be empty")]
    NoSteps,
    #[error("pipeline.enabled_steps must start with an import step, got {0}")]
    FirstStepNotImport(StepKind),
    #[error("pipeline.enabled_steps lists more than one import step")]
    MultipleImports,
    #[error("pipeline.enabled_steps lists {0} twice")]
    DuplicateStep(StepKind),
    #[error("retry.max_attempts must be 1-10, got {0}")]
    MaxAttemptsOutOfRange(u32),
    #[error("retry.initial_backoff_ms must be > 0")]
    ZeroInitialBackoff,
    #[error("retry.max_backoff_ms ({max}) must be >= retry.initial_backoff_ms ({initial})")]
    BackoffCapBelowInitial { initial: u64, max: u64 },
    #[error("retry.request_timeout_seconds must be > 0")]
    ZeroRequestTimeout,
    #[error("services.torch.extraction_timeout_minutes must be > 0")]
    ZeroExtractionTimeout,
    #[error("services.torch.polling_interval_seconds must be 1-60, got {0}")]
    PollingIntervalOutOfRange(u64),
    #[error(
        "services.torch.max_polling_interval_seconds ({max}) must be >= \
         polling_interval_seconds ({initial})"
    )]
    MaxPollingBelowInitial { initial: u64, max: u64 },
    #[error("services.torch.base_url is not a valid URL: {0}")]
    InvalidTorchUrl(String),
    #[error("services.dimp.url is not a valid URL: {0}")]
    InvalidDimpUrl(String),
    #[error("services.dimp.bundle_split_threshold_mb must be 1-100, got {0}")]
    SplitThresholdOutOfRange(u64),
    #[error("step {0} is enabled but services.{1} is not configured")]
    MissingService(StepKind, &'static str),
}

impl AppConfig {
    /// Check the §6 range and ordering rules.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let steps = &self.pipeline.enabled_steps;
        let first = steps.first().ok_or(ConfigError::NoSteps)?;
        if !first.is_import() {
            return Err(ConfigError::FirstStepNotImport(*first));
        }
        if steps.iter().filter(|k| k.is_import()).count() > 1 {
            return Err(ConfigError::MultipleImports);
        }
        for (i, kind) in steps.iter().enumerate() {
            if steps[..i].contains(kind) {
                return Err(ConfigError::DuplicateStep(*kind));
            }
        }

        let retry = &self.retry;
        if !(1..=10).contains(&retry.max_attempts) {
            return Err(ConfigError::MaxAttemptsOutOfRange(retry.max_attempts));
        }
        if retry.initial_backoff_ms == 0 {
            return Err(ConfigError::ZeroInitialBackoff);
        }
        if retry.max_backoff_ms < retry.initial_backoff_ms {
            return Err(ConfigError::BackoffCapBelowInitial {
                initial: retry.initial_backoff_ms,
                max: retry.max_backoff_ms,
            });
        }
        if retry.request_timeout_seconds == 0 {
            return Err(ConfigError::ZeroRequestTimeout);
        }

        if let Some(torch) = &self.services.torch {
            if torch.extraction_timeout_minutes == 0 {
                return Err(ConfigError::ZeroExtractionTimeout);
            }
            if !(1..=60).contains(&torch.polling_interval_seconds) {
                return Err(ConfigError::PollingIntervalOutOfRange(
                    torch.polling_interval_seconds,
                ));
            }
            if torch.max_polling_interval_seconds < torch.polling_interval_seconds {
                return Err(ConfigError::MaxPollingBelowInitial {
                    initial: torch.polling_interval_seconds,
                    max: torch.max_polling_interval_seconds,
                });
            }
            if url::Url::parse(&torch.base_url).is_err() {
                return Err(ConfigError::InvalidTorchUrl(torch.base_url.clone()));
            }
        }

        if let Some(dimp) = &self.services.dimp {
            if url::Url::parse(&dimp.url).is_err() {
                return Err(ConfigError::InvalidDimpUrl(dimp.url.clone()));
            }
            if !(1..=100).contains(&dimp.bundle_split_threshold_mb) {
                return Err(ConfigError::SplitThresholdOutOfRange(
                    dimp.bundle_split_threshold_mb,
                ));
            }
        }

        // Service presence for the steps that need them. Torch is only
        // required when the job actually uses a torch import, checked at job
        // creation; dimp is a static requirement of the dimp step.
        if self.pipeline.enabled_steps.contains(&StepKind::Dimp) && self.services.dimp.is_none() {
            return Err(ConfigError::MissingService(StepKind::Dimp, "dimp"));
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
