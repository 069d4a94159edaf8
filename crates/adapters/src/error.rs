// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service error type shared by all HTTP-backed adapters.

use dup_core::{classify_message, classify_status, ErrorKind};
use thiserror::Error;

/// A failed service interaction, tagged with the operation, the HTTP status
/// when one was received, and a retry classification assigned at origin.
#[derive(Debug, Clone, Error)]
#[error("{operation}: {message}")]
pub struct ServiceError {
    pub operation: String,
    pub http_status: Option<u16>,
    pub message: String,
    pub kind: ErrorKind,
}

impl ServiceError {
    /// An HTTP error status, classified by the status code.
    pub fn http(operation: impl Into<String>, status: u16, body: &str) -> Self {
        let body = body.trim();
        let message = if body.is_empty() {
            format!("HTTP {status}")
        } else {
            // Cap the payload so logs stay readable.
            let snippet: String = body.chars().take(500).collect();
            format!("HTTP {status}: {snippet}")
        };
        Self {
            operation: operation.into(),
            http_status: Some(status),
            message,
            kind: classify_status(status),
        }
    }

    /// A network-level failure (no HTTP response).
    pub fn network(operation: impl Into<String>, err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() || err.is_connect() {
            ErrorKind::Transient
        } else {
            classify_message(&err.to_string())
        };
        Self {
            operation: operation.into(),
            http_status: None,
            message: err.to_string(),
            kind,
        }
    }

    /// A protocol violation (unexpected shape from the service). Never
    /// retried.
    pub fn protocol(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            http_status: None,
            message: message.into(),
            kind: ErrorKind::NonTransient,
        }
    }

    /// A local I/O failure while handling a response.
    pub fn io(operation: impl Into<String>, err: &std::io::Error) -> Self {
        Self {
            operation: operation.into(),
            http_status: None,
            message: err.to_string(),
            kind: ErrorKind::NonTransient,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
