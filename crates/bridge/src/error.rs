// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The bridge's error taxonomy.
//!
//! Every variant here corresponds to one of the recovery paths the core takes:
//! some errors are silent drops (logged, metric bumped), some are retried by the
//! queue manager, and a small set are fatal to a subsystem's startup.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors surfaced by the bridge's public API and internal components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeError {
    /// Envelope failed schema validation. Dropped at the earliest point, never retried.
    InvalidEnvelope(String),
    /// Persistence failure. Logged at error level; hot-path callers (the router) drop
    /// and continue, other callers propagate.
    RepositoryError(String),
    /// A circuit breaker rejected the call because it is `OPEN`.
    CircuitOpen,
    /// An external call exceeded its `requestTimeout`.
    Timeout,
    /// Adapter-surfaced throttle signal; the queue reschedules after at least this delay.
    RateLimited { retry_after_ms: u64 },
    /// Retryable network failure; queue retries up to its configured attempt count.
    TransientNetwork(String),
    /// Unrecoverable condition (e.g. malformed adapter credentials). Not retried.
    Fatal(String),
}

impl BridgeError {
    /// HTTP status code for the admin surface's error mapping.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidEnvelope(_) => 400,
            Self::RepositoryError(_) => 500,
            Self::CircuitOpen => 503,
            Self::Timeout => 504,
            Self::RateLimited { .. } => 429,
            Self::TransientNetwork(_) => 502,
            Self::Fatal(_) => 500,
        }
    }

    /// Machine-readable error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidEnvelope(_) => "INVALID_ENVELOPE",
            Self::RepositoryError(_) => "REPOSITORY_ERROR",
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::Timeout => "TIMEOUT",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::TransientNetwork(_) => "TRANSIENT_NETWORK",
            Self::Fatal(_) => "FATAL",
        }
    }

    /// Whether the queue manager should retry a job that failed with this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::TransientNetwork(_) | Self::Timeout | Self::CircuitOpen
        )
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvelope(msg) => write!(f, "invalid envelope: {msg}"),
            Self::RepositoryError(msg) => write!(f, "repository error: {msg}"),
            Self::CircuitOpen => write!(f, "circuit open"),
            Self::Timeout => write!(f, "timeout"),
            Self::RateLimited { retry_after_ms } => {
                write!(f, "rate limited, retry after {retry_after_ms}ms")
            }
            Self::TransientNetwork(msg) => write!(f, "transient network error: {msg}"),
            Self::Fatal(msg) => write!(f, "fatal: {msg}"),
        }
    }
}

impl std::error::Error for BridgeError {}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Top-level error response envelope, for the admin HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}
