// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step and input kinds.
//!
//! Both are closed sets. Dispatch over them is exhaustive matching; there is
//! no generic "import" kind — the three import variants carry which source
//! shape produced the job.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Import via the remote extraction server (cohort query or result URL)
    TorchImport,
    /// Import by copying a local directory
    LocalImport,
    /// Import by downloading a plain HTTP URL
    HttpImport,
    /// Pseudonymization through the de-identification service
    Dimp,
    /// Placeholder validation stage
    Validation,
    /// Placeholder CSV conversion stage
    CsvConversion,
    /// Placeholder Parquet conversion stage
    ParquetConversion,
}

impl StepKind {
    /// All step kinds, in canonical pipeline order.
    pub const ALL: [StepKind; 7] = [
        StepKind::TorchImport,
        StepKind::LocalImport,
        StepKind::HttpImport,
        StepKind::Dimp,
        StepKind::Validation,
        StepKind::CsvConversion,
        StepKind::ParquetConversion,
    ];

    /// Whether this is one of the three import kinds.
    pub fn is_import(self) -> bool {
        matches!(
            self,
            StepKind::TorchImport | StepKind::LocalImport | StepKind::HttpImport
        )
    }

    /// Directory (relative to the job dir) this step writes its outputs to.
    pub fn output_dir(self) -> &'static str {
        match self {
            StepKind::TorchImport | StepKind::LocalImport | StepKind::HttpImport => "import",
            StepKind::Dimp => "pseudonymized",
            StepKind::Validation => "import",
            StepKind::CsvConversion => "csv",
            StepKind::ParquetConversion => "parquet",
        }
    }

    /// Whether `self` may start given the set of completed steps.
    ///
    /// Import kinds have no prerequisite. `Dimp` requires a completed import.
    /// The downstream stages require `Dimp` when it is part of the pipeline,
    /// otherwise a completed import.
    pub fn prerequisite_met(self, completed: &[StepKind], enabled: &[StepKind]) -> bool {
        let import_done = completed.iter().any(|k| k.is_import());
        match self {
            StepKind::TorchImport | StepKind::LocalImport | StepKind::HttpImport => true,
            StepKind::Dimp => import_done,
            StepKind::Validation | StepKind::CsvConversion | StepKind::ParquetConversion => {
                if enabled.contains(&StepKind::Dimp) {
                    completed.contains(&StepKind::Dimp)
                } else {
                    import_done
                }
            }
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepKind::TorchImport => "torch_import",
            StepKind::LocalImport => "local_import",
            StepKind::HttpImport => "http_import",
            StepKind::Dimp => "dimp",
            StepKind::Validation => "validation",
            StepKind::CsvConversion => "csv_conversion",
            StepKind::ParquetConversion => "parquet_conversion",
        };
        write!(f, "{s}")
    }
}

impl FromStr for StepKind {
    type Err = UnknownStepKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "torch_import" => Ok(StepKind::TorchImport),
            "local_import" => Ok(StepKind::LocalImport),
            "http_import" => Ok(StepKind::HttpImport),
            "dimp" => Ok(StepKind::Dimp),
            "validation" => Ok(StepKind::Validation),
            "csv_conversion" => Ok(StepKind::CsvConversion),
            "parquet_conversion" => Ok(StepKind::ParquetConversion),
            other => Err(UnknownStepKind(other.to_string())),
        }
    }
}

/// Error for an unrecognized step name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown step kind: {0}")]
pub struct UnknownStepKind(pub String);

/// Classified kind of a job's input source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// Existing directory of NDJSON files
    LocalDirectory,
    /// Plain HTTP(S) URL to a single NDJSON artifact
    HttpUrl,
    /// Cohort-definition query file for the extraction server
    CohortQueryFile,
    /// URL of an already-running extraction job
    ExtractionResultUrl,
}

impl InputKind {
    /// The import step kind that handles this input.
    pub fn import_step(self) -> StepKind {
        match self {
            InputKind::LocalDirectory => StepKind::LocalImport,
            InputKind::HttpUrl => StepKind::HttpImport,
            InputKind::CohortQueryFile | InputKind::ExtractionResultUrl => StepKind::TorchImport,
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InputKind::LocalDirectory => "local_directory",
            InputKind::HttpUrl => "http_url",
            InputKind::CohortQueryFile => "cohort_query_file",
            InputKind::ExtractionResultUrl => "extraction_result_url",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;
