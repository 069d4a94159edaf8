// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retrying HTTP transport.
//!
//! Request bodies are snapshotted as [`Bytes`] so every retry attempt
//! replays identical bytes. A transient status (408/429/5xx) is retried with
//! exponential backoff up to the policy bound; a non-transient status is
//! returned to the caller, which can read the error payload. Network errors
//! are classified at origin and retried when transient.

use crate::error::ServiceError;
use bytes::Bytes;
use dup_core::{backoff_delay, should_retry, ErrorKind, RetryPolicy};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, Response, StatusCode, Url};
use std::io::Write;
use std::time::Instant;
use tracing::{debug, warn};

/// HTTP Basic credentials.
#[derive(Debug, Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

/// One request's non-default settings.
#[derive(Debug, Clone, Default)]
struct RequestSpec {
    auth: Option<BasicAuth>,
    accept: Option<&'static str>,
    body: Option<(&'static str, Bytes)>,
}

/// Transport shared by the service clients.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl HttpClient {
    pub fn new(policy: RetryPolicy) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(policy.request_timeout())
            .build()
            .map_err(|e| ServiceError::network("build http client", &e))?;
        Ok(Self { client, policy })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn get(
        &self,
        operation: &str,
        url: Url,
        auth: Option<&BasicAuth>,
        accept: Option<&'static str>,
    ) -> Result<Response, ServiceError> {
        self.execute(
            operation,
            Method::GET,
            url,
            RequestSpec {
                auth: auth.cloned(),
                accept,
                body: None,
            },
        )
        .await
    }

    pub async fn post(
        &self,
        operation: &str,
        url: Url,
        auth: Option<&BasicAuth>,
        content_type: &'static str,
        body: Bytes,
    ) -> Result<Response, ServiceError> {
        self.execute(
            operation,
            Method::POST,
            url,
            RequestSpec {
                auth: auth.cloned(),
                accept: None,
                body: Some((content_type, body)),
            },
        )
        .await
    }

    pub async fn post_json(
        &self,
        operation: &str,
        url: Url,
        auth: Option<&BasicAuth>,
        body: &serde_json::Value,
    ) -> Result<Response, ServiceError> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| ServiceError::protocol(operation, e.to_string()))?;
        self.post(operation, url, auth, "application/json", Bytes::from(bytes))
            .await
    }

    /// Stream a response body into `sink`. Returns bytes written.
    pub async fn download(
        &self,
        operation: &str,
        url: Url,
        auth: Option<&BasicAuth>,
        accept: Option<&'static str>,
        sink: &mut (dyn Write + Send),
    ) -> Result<u64, ServiceError> {
        self.download_with_progress(operation, url, auth, accept, sink, &mut |_| {})
            .await
    }

    /// Stream a response body into `sink`, reporting each non-empty chunk to
    /// `progress` with the running byte count.
    pub async fn download_with_progress(
        &self,
        operation: &str,
        url: Url,
        auth: Option<&BasicAuth>,
        accept: Option<&'static str>,
        sink: &mut (dyn Write + Send),
        progress: &mut (dyn FnMut(u64) + Send),
    ) -> Result<u64, ServiceError> {
        let mut response = self
            .get(operation, url, auth, accept.or(Some("application/fhir+ndjson")))
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::http(operation, status, &body));
        }

        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ServiceError::network(operation, &e))?
        {
            if chunk.is_empty() {
                continue;
            }
            sink.write_all(&chunk)
                .map_err(|e| ServiceError::io(operation, &e))?;
            written += chunk.len() as u64;
            progress(written);
        }
        sink.flush().map_err(|e| ServiceError::io(operation, &e))?;
        Ok(written)
    }

    async fn execute(
        &self,
        operation: &str,
        method: Method,
        url: Url,
        spec: RequestSpec,
    ) -> Result<Response, ServiceError> {
        let mut attempts: u32 = 0;
        loop {
            let started = Instant::now();
            let mut request = self.client.request(method.clone(), url.clone());
            if let Some(auth) = &spec.auth {
                request = request.basic_auth(&auth.username, Some(&auth.password));
            }
            if let Some(accept) = spec.accept {
                request = request.header(ACCEPT, accept);
            }
            if let Some((content_type, bytes)) = &spec.body {
                // Bytes clone is a refcount bump; each attempt sends the
                // exact same payload.
                request = request.header(CONTENT_TYPE, *content_type).body(bytes.clone());
            }

            let result = request.send().await;
            attempts += 1;

            match result {
                Ok(response) => {
                    let status = response.status();
                    debug!(
                        %method,
                        host = url.host_str().unwrap_or(""),
                        path = url.path(),
                        status = status.as_u16(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        attempt = attempts,
                        "{operation}"
                    );
                    if !is_transient_status(status) {
                        return Ok(response);
                    }
                    if !should_retry(ErrorKind::Transient, attempts, self.policy.max_attempts) {
                        return Ok(response);
                    }
                    let delay = backoff_delay(&self.policy, i64::from(attempts) - 1);
                    warn!(
                        status = status.as_u16(),
                        retry_in_ms = delay.as_millis() as u64,
                        attempt = attempts,
                        "{operation}: transient status, retrying"
                    );
                    drop(response);
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    let service_err = ServiceError::network(operation, &err);
                    if !should_retry(service_err.kind, attempts, self.policy.max_attempts) {
                        return Err(service_err);
                    }
                    let delay = backoff_delay(&self.policy, i64::from(attempts) - 1);
                    warn!(
                        error = %err,
                        retry_in_ms = delay.as_millis() as u64,
                        attempt = attempts,
                        "{operation}: network error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    dup_core::classify_status(status.as_u16()) == ErrorKind::Transient
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
