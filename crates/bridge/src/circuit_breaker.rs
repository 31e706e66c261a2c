// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-external-service circuit breaker, wrapping egress calls.
//!
//! States: `Closed` (calls pass through), `Open` (calls rejected until
//! `next_attempt`), `Half-Open` (one probe call allowed). A breaker can only
//! reach `Half-Open` by transitioning out of `Open` — `Closed` never skips
//! straight to `Half-Open`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::BridgeError;

const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Tunables for a single breaker.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Point-in-time metrics for a breaker.
#[derive(Debug, Clone, Copy, Default)]
pub struct BreakerMetrics {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub rejected: u64,
}

struct Inner {
    state: BreakerState,
    failure_count: u32,
    next_attempt: Option<Instant>,
    metrics: BreakerMetrics,
}

/// A single service's breaker.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                next_attempt: None,
                metrics: BreakerMetrics::default(),
            }),
        }
    }

    pub async fn state(&self) -> BreakerState {
        self.inner.lock().await.state
    }

    pub async fn metrics(&self) -> BreakerMetrics {
        self.inner.lock().await.metrics
    }

    /// Run `call` under this breaker's timeout, updating state on success,
    /// failure, or rejection. If `call` errors and `fallback` is provided,
    /// `fallback` is invoked with the error instead of propagating it.
    pub async fn call<F, Fut, T>(&self, call: F) -> Result<T, BridgeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BridgeError>>,
    {
        {
            let mut inner = self.inner.lock().await;
            inner.metrics.total += 1;

            match inner.state {
                BreakerState::Open => {
                    let now = Instant::now();
                    let should_probe = inner.next_attempt.is_some_and(|at| now >= at);
                    if should_probe {
                        inner.state = BreakerState::HalfOpen;
                    } else {
                        inner.metrics.rejected += 1;
                        return Err(BridgeError::CircuitOpen);
                    }
                }
                BreakerState::Closed | BreakerState::HalfOpen => {}
            }
        }

        let outcome = tokio::time::timeout(self.config.request_timeout, call()).await;

        let result = match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(BridgeError::Timeout),
        };

        let mut inner = self.inner.lock().await;
        match &result {
            Ok(_) => {
                inner.metrics.success += 1;
                inner.failure_count = 0;
                inner.state = BreakerState::Closed;
                inner.next_attempt = None;
            }
            Err(_) => {
                inner.metrics.failed += 1;
                match inner.state {
                    BreakerState::HalfOpen => {
                        inner.state = BreakerState::Open;
                        inner.next_attempt = Some(Instant::now() + self.config.reset_timeout);
                    }
                    BreakerState::Closed => {
                        inner.failure_count += 1;
                        if inner.failure_count >= self.config.failure_threshold {
                            inner.state = BreakerState::Open;
                            inner.next_attempt = Some(Instant::now() + self.config.reset_timeout);
                        }
                    }
                    BreakerState::Open => {}
                }
            }
        }

        result
    }

    /// Like [`Self::call`], but invoke `fallback` with the error instead of
    /// propagating it.
    pub async fn call_or_fallback<F, Fut, T, G>(&self, call: F, fallback: G) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BridgeError>>,
        G: FnOnce(BridgeError) -> T,
    {
        match self.call(call).await {
            Ok(value) => value,
            Err(e) => fallback(e),
        }
    }
}

/// Registry of breakers keyed by logical service name (e.g. `"telegram_api"`).
pub struct CircuitBreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    default_config: BreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: BreakerConfig) -> Self {
        Self { breakers: Mutex::new(HashMap::new()), default_config }
    }

    /// Get or create the breaker for `service`, using the registry's default
    /// config for newly created breakers.
    pub async fn get(&self, service: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().await;
        breakers
            .entry(service.to_owned())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.default_config)))
            .clone()
    }

    /// Get or create a breaker for `service` with an explicit config
    /// (for adapter-overridable `request_timeout`).
    pub async fn get_with_config(&self, service: &str, config: BreakerConfig) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().await;
        breakers.entry(service.to_owned()).or_insert_with(|| Arc::new(CircuitBreaker::new(config))).clone()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

#[cfg(test)]
#[path = "circuit_breaker_tests.rs"]
mod tests;
