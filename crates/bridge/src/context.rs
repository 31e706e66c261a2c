// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Correlation-ID propagation across asynchronous boundaries.
//!
//! Every unit of work — ingress emission, router fan-out, queue processor
//! invocation, adapter egress — carries a [`CorrelationContext`] so log
//! records attribute back to the originating envelope. This crate threads the
//! context explicitly through call signatures (rather than relying on an
//! async-local primitive) and additionally records it on the current
//! `tracing` span for log attribution.

use crate::envelope::Endpoint;

/// Correlation frame for one unit of asynchronous work.
#[derive(Debug, Clone)]
pub struct CorrelationContext {
    pub correlation_id: String,
    pub source: Option<Endpoint>,
}

impl CorrelationContext {
    pub fn new(correlation_id: String, source: Option<Endpoint>) -> Self {
        Self { correlation_id, source }
    }

    /// A fresh context with a random correlation id, used when no upstream
    /// frame exists (e.g. an adapter emitting without an inherited context).
    pub fn fresh() -> Self {
        Self { correlation_id: uuid::Uuid::new_v4().to_string(), source: None }
    }

    /// Record this context's correlation id onto the current `tracing` span,
    /// so every log line emitted under this `.instrument()`ed future
    /// attributes back to the originating message.
    pub fn record_on_current_span(&self) {
        tracing::Span::current().record("correlation_id", tracing::field::display(&self.correlation_id));
    }
}
