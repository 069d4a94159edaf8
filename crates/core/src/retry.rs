// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry classification and backoff math.
//!
//! Errors carry an [`ErrorKind`] assigned at their point of origin (HTTP
//! status, socket error, timeout). The transport layer owns the actual retry
//! loop; this module is the pure kernel it drives.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Whether an error is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network-level failure or HTTP 408/429/5xx; eligible for retry.
    Transient,
    /// Everything else; surface immediately.
    NonTransient,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::NonTransient => write!(f, "non-transient"),
        }
    }
}

/// Classify an HTTP status code.
pub fn classify_status(status: u16) -> ErrorKind {
    match status {
        408 | 429 => ErrorKind::Transient,
        500..=599 => ErrorKind::Transient,
        _ => ErrorKind::NonTransient,
    }
}

/// Last-resort fallback: classify by well-known failure signatures in an
/// error message. Only the transport layer should need this, for errors
/// whose origin did not attach a kind.
pub fn classify_message(message: &str) -> ErrorKind {
    const TRANSIENT_SIGNATURES: [&str; 8] = [
        "connection refused",
        "connection reset",
        "dns",
        "timeout",
        "timed out",
        "unexpected eof",
        "temporary failure",
        "deadline exceeded",
    ];
    let lower = message.to_ascii_lowercase();
    if TRANSIENT_SIGNATURES.iter().any(|sig| lower.contains(sig)) {
        ErrorKind::Transient
    } else {
        ErrorKind::NonTransient
    }
}

/// Whether another attempt should be made.
pub fn should_retry(kind: ErrorKind, attempts_done: u32, max_attempts: u32) -> bool {
    kind == ErrorKind::Transient && attempts_done < max_attempts
}

/// Retry and deadline policy for HTTP requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum attempts per request (1-10).
    pub max_attempts: u32,
    /// First backoff delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Backoff cap in milliseconds.
    pub max_backoff_ms: u64,
    /// Per-request deadline in seconds.
    pub request_timeout_seconds: u64,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 500;
    pub const DEFAULT_MAX_BACKOFF_MS: u64 = 10_000;
    pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 300;

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: Self::DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: Self::DEFAULT_MAX_BACKOFF_MS,
            request_timeout_seconds: Self::DEFAULT_REQUEST_TIMEOUT_SECONDS,
        }
    }
}

/// Exponential backoff delay for the given zero-based attempt number.
///
/// `min(initial * 2^attempt, max)`; negative attempts clamp to zero.
pub fn backoff_delay(policy: &RetryPolicy, attempt: i64) -> Duration {
    let attempt = attempt.max(0).min(u32::MAX as i64) as u32;
    let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
    let ms = policy
        .initial_backoff_ms
        .checked_mul(factor)
        .unwrap_or(u64::MAX)
        .min(policy.max_backoff_ms);
    Duration::from_millis(ms)
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
