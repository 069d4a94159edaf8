// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Input source classification.
//!
//! Rules, in order: URLs are split into extraction-result vs plain HTTP by
//! configured path patterns; an existing `.crtdl`/`.json` file with both
//! cohort keys is a cohort query; an existing directory is a local source.
//! Deep schema validation of cohort files is the extraction server's job.

use crate::step::InputKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// A job's input: the raw source string plus its classified kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDescriptor {
    pub source: String,
    pub kind: InputKind,
}

/// Classification and cohort-file validation failures. All are
/// non-transient.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("input not recognized: {0} (not a URL, cohort file, or directory)")]
    Unrecognized(String),
    #[error("failed to read cohort file {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cohort file {path} is not valid UTF-8 JSON: {detail}")]
    NotJson { path: String, detail: String },
    #[error("cohort file {path} is missing required key {key}")]
    MissingKey { path: String, key: &'static str },
    #[error("cohort file {path}: key {key} must be an object")]
    KeyNotObject { path: String, key: &'static str },
}

/// Classify a source string into an [`InputDescriptor`].
///
/// `result_url_patterns` are the configured path substrings identifying an
/// extraction-result URL (spec'd per extraction server).
pub fn classify_input(
    source: &str,
    result_url_patterns: &[String],
) -> Result<InputDescriptor, InputError> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let is_extraction = url::Url::parse(source)
            .map(|u| {
                let path = u.path();
                result_url_patterns.iter().any(|p| path.contains(p.as_str()))
            })
            .unwrap_or(false);
        let kind = if is_extraction {
            InputKind::ExtractionResultUrl
        } else {
            InputKind::HttpUrl
        };
        return Ok(InputDescriptor {
            source: source.to_string(),
            kind,
        });
    }

    let path = Path::new(source);
    if path.is_file() && has_cohort_suffix(path) && validate_cohort_file(path).is_ok() {
        return Ok(InputDescriptor {
            source: source.to_string(),
            kind: InputKind::CohortQueryFile,
        });
    }
    if path.is_dir() {
        return Ok(InputDescriptor {
            source: source.to_string(),
            kind: InputKind::LocalDirectory,
        });
    }

    Err(InputError::Unrecognized(source.to_string()))
}

fn has_cohort_suffix(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("crtdl") | Some("json")
    )
}

/// Check that a cohort query file is UTF-8 JSON with `cohortDefinition` and
/// `dataExtraction` objects.
pub fn validate_cohort_file(path: &Path) -> Result<(), InputError> {
    let display = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|source| InputError::Unreadable {
        path: display.clone(),
        source,
    })?;
    let text = std::str::from_utf8(&bytes).map_err(|e| InputError::NotJson {
        path: display.clone(),
        detail: e.to_string(),
    })?;
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| InputError::NotJson {
            path: display.clone(),
            detail: e.to_string(),
        })?;

    for key in ["cohortDefinition", "dataExtraction"] {
        match value.get(key) {
            None => return Err(InputError::MissingKey { path: display, key }),
            Some(v) if !v.is_object() => {
                return Err(InputError::KeyNotObject { path: display, key })
            }
            Some(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "input_tests.rs"]
mod tests;
