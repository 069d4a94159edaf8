// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Extraction server (TORCH) client: submit, poll, download.
//!
//! The server answers submissions with `202 Accepted` plus a
//! `Content-Location` poll URL. Poll URLs and result URLs may be relative or
//! may name container-internal hosts; both are normalized against the
//! configured base so a handle persisted on one network keeps working.

use crate::error::ServiceError;
use crate::http::{BasicAuth, HttpClient};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use dup_core::{RetryPolicy, TorchConfig};
use reqwest::Url;
use serde_json::{json, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Hosts that only resolve inside the deployment's container network.
pub const INTERNAL_HOSTS: [&str; 4] = ["torch", "torch-proxy", "localhost", "127.0.0.1"];

const SUBMIT_PATH: &str = "fhir/$extract-data";
const NDJSON_ACCEPT: &str = "application/fhir+ndjson";

/// Guidance shown when a cohort produced no rows.
const NO_MATCHING_DATA_GUIDANCE: &str = "the extraction produced no matching data; likely causes: \
     (1) the cohort criteria are too narrow, \
     (2) the source system holds no data for the cohort, \
     (3) the data extraction filters exclude every matching resource";

#[derive(Debug, Error)]
pub enum TorchError {
    #[error("extraction did not complete within {minutes} minutes")]
    ExtractionTimeout { minutes: u64 },
    #[error("no matching data: {}", NO_MATCHING_DATA_GUIDANCE)]
    NoMatchingData,
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl TorchError {
    pub fn kind(&self) -> dup_core::ErrorKind {
        match self {
            // The user must re-issue the extraction; retrying the poll is
            // pointless once the deadline passed.
            TorchError::ExtractionTimeout { .. } => dup_core::ErrorKind::NonTransient,
            TorchError::NoMatchingData => dup_core::ErrorKind::NonTransient,
            TorchError::Service(e) => e.kind,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            TorchError::Service(e) => e.http_status,
            _ => None,
        }
    }
}

/// One downloaded result artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub file_name: String,
    pub path: PathBuf,
    pub file_size: u64,
    pub line_count: u64,
}

/// Extraction operations the import step depends on.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    /// Submit a cohort query; returns the normalized poll URL.
    async fn submit(&self, cohort_file: &Path) -> Result<String, TorchError>;

    /// Poll until the extraction finishes; returns the normalized result
    /// artifact URLs.
    async fn poll_until_complete(&self, poll_url: &str) -> Result<Vec<String>, TorchError>;

    /// Download one result artifact into `dest_dir`. `index` seeds the
    /// fallback filename for URLs without a usable last segment.
    async fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        index: usize,
    ) -> Result<DownloadedFile, TorchError>;
}

/// Rewrite `raw` so it is reachable from outside the deployment:
/// relative URLs are joined to `base`; absolute URLs on container-internal
/// hosts keep their path and query but take the base's scheme, host, and
/// port.
pub fn normalize_url(base: &Url, raw: &str) -> Result<Url, ServiceError> {
    match Url::parse(raw) {
        Ok(url) => {
            let internal = url
                .host_str()
                .is_some_and(|h| INTERNAL_HOSTS.contains(&h));
            if !internal {
                return Ok(url);
            }
            let mut rebuilt = base.clone();
            rebuilt.set_path(url.path());
            rebuilt.set_query(url.query());
            Ok(rebuilt)
        }
        Err(url::ParseError::RelativeUrlWithoutBase) => base
            .join(raw)
            .map_err(|e| ServiceError::protocol("normalize url", e.to_string())),
        Err(e) => Err(ServiceError::protocol(
            "normalize url",
            format!("{raw}: {e}"),
        )),
    }
}

/// HTTP client for the extraction server.
pub struct TorchClient {
    http: HttpClient,
    base: Url,
    auth: BasicAuth,
    poll_initial: Duration,
    poll_max: Duration,
    extraction_timeout: Duration,
    timeout_minutes: u64,
}

impl TorchClient {
    pub fn new(config: &TorchConfig, policy: &RetryPolicy) -> Result<Self, ServiceError> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| ServiceError::protocol("configure torch", e.to_string()))?;
        Ok(Self {
            http: HttpClient::new(policy.clone())?,
            base,
            auth: BasicAuth {
                username: config.username.clone(),
                password: config.password.clone(),
            },
            poll_initial: Duration::from_secs(config.polling_interval_seconds),
            poll_max: Duration::from_secs(config.max_polling_interval_seconds),
            extraction_timeout: Duration::from_secs(config.extraction_timeout_minutes * 60),
            timeout_minutes: config.extraction_timeout_minutes,
        })
    }

    /// Override the poll timing (tests drive sub-second intervals).
    pub fn with_timing(mut self, initial: Duration, max: Duration, deadline: Duration) -> Self {
        self.poll_initial = initial;
        self.poll_max = max;
        self.extraction_timeout = deadline;
        self
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn submit_url(&self) -> Result<Url, ServiceError> {
        self.base
            .join(SUBMIT_PATH)
            .map_err(|e| ServiceError::protocol("submit extraction", e.to_string()))
    }

    /// Parse either accepted result encoding into artifact URLs.
    fn parse_result(&self, body: &Value) -> Result<Vec<String>, TorchError> {
        // Simplified form: { "output": [ { "type": ..., "url": ... }, ... ] }
        if let Some(output) = body.get("output") {
            let entries = output.as_array().ok_or_else(|| {
                ServiceError::protocol("poll extraction", "output is not an array")
            })?;
            if entries.is_empty() {
                return Err(TorchError::NoMatchingData);
            }
            let mut urls = Vec::with_capacity(entries.len());
            for entry in entries {
                let url = entry.get("url").and_then(Value::as_str).ok_or_else(|| {
                    ServiceError::protocol("poll extraction", "output entry without url")
                })?;
                urls.push(normalize_url(&self.base, url)?.to_string());
            }
            return Ok(urls);
        }

        // FHIR Parameters form: parameter[name=output].part[name=url].valueUrl
        if body.get("resourceType").and_then(Value::as_str) == Some("Parameters") {
            let mut urls = Vec::new();
            let parameters = body
                .get("parameter")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for parameter in parameters {
                if parameter.get("name").and_then(Value::as_str) != Some("output") {
                    continue;
                }
                let parts = parameter
                    .get("part")
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                for part in parts {
                    if part.get("name").and_then(Value::as_str) != Some("url") {
                        continue;
                    }
                    if let Some(url) = part.get("valueUrl").and_then(Value::as_str) {
                        urls.push(normalize_url(&self.base, url)?.to_string());
                    }
                }
            }
            if urls.is_empty() {
                return Err(TorchError::NoMatchingData);
            }
            return Ok(urls);
        }

        Err(ServiceError::protocol(
            "poll extraction",
            "result is neither a Parameters resource nor a simplified output object",
        )
        .into())
    }
}

#[async_trait]
impl ExtractionService for TorchClient {
    async fn submit(&self, cohort_file: &Path) -> Result<String, TorchError> {
        let operation = "submit extraction";
        let bytes = std::fs::read(cohort_file).map_err(|e| ServiceError::io(operation, &e))?;
        let body = json!({
            "resourceType": "Parameters",
            "parameter": [
                { "name": "crtdl", "valueBase64Binary": B64.encode(&bytes) }
            ]
        });

        let response = self
            .http
            .post_json(operation, self.submit_url()?, Some(&self.auth), &body)
            .await?;

        let status = response.status();
        if status.as_u16() != 202 {
            let text = response.text().await.unwrap_or_default();
            return Err(ServiceError::http(operation, status.as_u16(), &text).into());
        }

        let location = response
            .headers()
            .get("Content-Location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                ServiceError::protocol(operation, "202 without Content-Location header")
            })?;

        let poll_url = normalize_url(&self.base, &location)?.to_string();
        info!(poll_url = %poll_url, "extraction submitted");
        Ok(poll_url)
    }

    async fn poll_until_complete(&self, poll_url: &str) -> Result<Vec<String>, TorchError> {
        let operation = "poll extraction";
        let url = Url::parse(poll_url)
            .map_err(|e| ServiceError::protocol(operation, format!("{poll_url}: {e}")))?;

        let deadline = Instant::now() + self.extraction_timeout;
        let mut interval = self.poll_initial;

        loop {
            if Instant::now() >= deadline {
                return Err(TorchError::ExtractionTimeout {
                    minutes: self.timeout_minutes,
                });
            }

            let response = self
                .http
                .get(operation, url.clone(), Some(&self.auth), Some("application/json"))
                .await?;
            let status = response.status().as_u16();

            match status {
                202 => {
                    debug!(interval_ms = interval.as_millis() as u64, "extraction still running");
                    if Instant::now() + interval >= deadline {
                        // The next poll could never happen in time.
                        return Err(TorchError::ExtractionTimeout {
                            minutes: self.timeout_minutes,
                        });
                    }
                    tokio::time::sleep(interval).await;
                    interval = (interval * 2).min(self.poll_max);
                }
                200 => {
                    let body: Value = response
                        .json()
                        .await
                        .map_err(|e| ServiceError::network(operation, &e))?;
                    let urls = self.parse_result(&body)?;
                    info!(artifacts = urls.len(), "extraction complete");
                    return Ok(urls);
                }
                _ => {
                    let text = response.text().await.unwrap_or_default();
                    return Err(ServiceError::http(operation, status, &text).into());
                }
            }
        }
    }

    async fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        index: usize,
    ) -> Result<DownloadedFile, TorchError> {
        let operation = "download extraction result";
        let parsed = Url::parse(url)
            .map_err(|e| ServiceError::protocol(operation, format!("{url}: {e}")))?;

        let file_name = artifact_file_name(&parsed, index);
        let final_path = dest_dir.join(&file_name);
        let part_path = dest_dir.join(format!("{file_name}.part"));

        let result = async {
            let mut file = std::fs::File::create(&part_path)
                .map_err(|e| ServiceError::io(operation, &e))?;
            let mut reported = 0u64;
            let written = self
                .http
                .download_with_progress(
                    operation,
                    parsed.clone(),
                    Some(&self.auth),
                    Some(NDJSON_ACCEPT),
                    &mut file,
                    &mut |bytes| {
                        // Log every ~8 MiB of progress.
                        if bytes - reported >= 8 * 1024 * 1024 {
                            reported = bytes;
                            debug!(bytes, file = %file_name, "download progress");
                        }
                    },
                )
                .await?;
            file.flush().map_err(|e| ServiceError::io(operation, &e))?;
            Ok::<u64, ServiceError>(written)
        }
        .await;

        let written = match result {
            Ok(w) => w,
            Err(e) => {
                if let Err(rm) = std::fs::remove_file(&part_path) {
                    warn!(path = %part_path.display(), error = %rm, "failed to remove partial download");
                }
                return Err(e.into());
            }
        };

        std::fs::rename(&part_path, &final_path)
            .map_err(|e| ServiceError::io(operation, &e))?;

        let line_count = count_non_blank_lines(&final_path)
            .map_err(|e| ServiceError::io(operation, &e))?;
        info!(file = %file_name, bytes = written, lines = line_count, "downloaded artifact");

        Ok(DownloadedFile {
            file_name,
            path: final_path,
            file_size: written,
            line_count,
        })
    }
}

/// Filename for a result artifact: the URL's last path segment, or
/// `torch-batch-<i>.ndjson` when the URL has none; `.ndjson` is enforced.
fn artifact_file_name(url: &Url, index: usize) -> String {
    let last = url
        .path_segments()
        .and_then(|mut s| s.next_back())
        .unwrap_or("")
        .trim()
        .to_string();
    let name = if last.is_empty() {
        format!("torch-batch-{index}.ndjson")
    } else {
        last
    };
    if name.ends_with(".ndjson") {
        name
    } else {
        format!("{name}.ndjson")
    }
}

fn count_non_blank_lines(path: &Path) -> std::io::Result<u64> {
    use std::io::BufRead;
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut count = 0u64;
    for line in reader.lines() {
        if !line?.trim().is_empty() {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
#[path = "torch_tests.rs"]
mod tests;
