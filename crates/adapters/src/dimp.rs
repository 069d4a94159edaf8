// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! De-identification service (DIMP) client.
//!
//! One operation: POST a single JSON resource, get the de-identified
//! resource back. The response is passed through verbatim — the service may
//! replace ids, add `meta.security` tags, or apply other opaque transforms,
//! and the pipeline must not second-guess any of it.

use crate::error::ServiceError;
use crate::http::HttpClient;
use async_trait::async_trait;
use dup_core::{DimpConfig, RetryPolicy};
use reqwest::Url;
use serde_json::Value;

const DEIDENTIFY_PATH: &str = "$de-identify";

/// The pseudonymization capability the engine depends on.
#[async_trait]
pub trait Pseudonymizer: Send + Sync {
    async fn pseudonymize(&self, resource: &Value) -> Result<Value, ServiceError>;
}

/// HTTP client for the de-identification service.
pub struct DimpClient {
    http: HttpClient,
    endpoint: Url,
}

impl DimpClient {
    pub fn new(config: &DimpConfig, policy: &RetryPolicy) -> Result<Self, ServiceError> {
        let base = Url::parse(&config.url)
            .map_err(|e| ServiceError::protocol("configure dimp", e.to_string()))?;
        let endpoint = base
            .join(DEIDENTIFY_PATH)
            .map_err(|e| ServiceError::protocol("configure dimp", e.to_string()))?;
        Ok(Self {
            http: HttpClient::new(policy.clone())?,
            endpoint,
        })
    }
}

#[async_trait]
impl Pseudonymizer for DimpClient {
    async fn pseudonymize(&self, resource: &Value) -> Result<Value, ServiceError> {
        let operation = "pseudonymize resource";
        let response = self
            .http
            .post_json(operation, self.endpoint.clone(), None, resource)
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ServiceError::http(operation, status.as_u16(), &text));
        }

        response
            .json()
            .await
            .map_err(|e| ServiceError::network(operation, &e))
    }
}

/// Deterministic in-process stand-in for tests: prefixes every resource id
/// with `pseudo-` and stamps a fixed `meta.security` tag onto Bundles.
#[cfg(any(test, feature = "test-support"))]
pub struct FakePseudonymizer {
    pub fail_on_resource_id: Option<String>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakePseudonymizer {
    pub fn new() -> Self {
        Self {
            fail_on_resource_id: None,
        }
    }

    pub fn security_tag() -> Value {
        serde_json::json!([{ "system": "http://example.org/deid", "code": "PSEUDED" }])
    }

    fn rewrite(&self, resource: &mut Value) -> Result<(), ServiceError> {
        if let Some(id) = resource.get("id").and_then(Value::as_str) {
            if self.fail_on_resource_id.as_deref() == Some(id) {
                return Err(ServiceError::http("pseudonymize resource", 422, "rejected"));
            }
            let pseudo = format!("pseudo-{id}");
            resource["id"] = Value::String(pseudo);
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Default for FakePseudonymizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl Pseudonymizer for FakePseudonymizer {
    async fn pseudonymize(&self, resource: &Value) -> Result<Value, ServiceError> {
        let mut out = resource.clone();
        self.rewrite(&mut out)?;
        if out.get("resourceType").and_then(Value::as_str) == Some("Bundle") {
            out["meta"]["security"] = Self::security_tag();
            if let Some(entries) = out.get_mut("entry").and_then(Value::as_array_mut) {
                for entry in entries {
                    if let Some(inner) = entry.get_mut("resource") {
                        self.rewrite(inner)?;
                    }
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
#[path = "dimp_tests.rs"]
mod tests;
