// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The adapter contract: the interface the core depends on, never the
//! protocol-specific decoding behind it.
//!
//! Each network adapter (Discord, Telegram, WhatsApp, Signal, Stoat, ...) is a
//! plugin implementing [`Adapter`]. The core gives every adapter a sandboxed,
//! immutable [`AdapterContext`] built once by the kernel's DI container at
//! init time — never a mutable shared bag an adapter could use to reach into
//! another plugin's state.

use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::MessageBus;
use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::envelope::Envelope;
use crate::error::BridgeError;
use crate::queue::QueueManager;
use crate::repository::TopologyRepository;

/// Health snapshot an adapter reports to the kernel / admin surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterHealth {
    pub healthy: bool,
    pub detail: Option<String>,
}

impl AdapterHealth {
    pub fn ok() -> Self {
        Self { healthy: true, detail: None }
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self { healthy: false, detail: Some(detail.into()) }
    }
}

/// The sandboxed dependency bag handed to every adapter at `init`.
///
/// Built once by the kernel and frozen: adapters receive `Arc` handles to
/// shared core services, never a mutable reference that would let one
/// plugin's misbehavior corrupt another's. This replaces the mutable
/// `ctx`/ `context` bag design note in spec.md §9 with an explicit,
/// immutable, per-plugin struct.
#[derive(Clone)]
pub struct AdapterContext {
    pub bus: Arc<MessageBus>,
    pub repository: Arc<dyn TopologyRepository>,
    pub queue: Arc<QueueManager>,
    pub circuit_breaker: Arc<CircuitBreakerRegistry>,
    pub plugin_name: String,
    pub plugin_type: AdapterKind,
}

/// Which family of adapter this is — the plugin-discovery registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    Discord,
    Telegram,
    WhatsApp,
    Signal,
    Stoat,
}

impl AdapterKind {
    /// Lowercase platform name, matching `head.source.platform` and the
    /// `queue_<platform>_out` naming scheme.
    pub fn platform_name(&self) -> &'static str {
        match self {
            Self::Discord => "discord",
            Self::Telegram => "telegram",
            Self::WhatsApp => "whatsapp",
            Self::Signal => "signal",
            Self::Stoat => "stoat",
        }
    }
}

/// The polymorphic capability set every network adapter implements.
///
/// Realizes spec.md §4.8/§9's `{init, start, stop, health, processEgress}`
/// interface as a Rust trait object instead of a dynamically-loaded plugin:
/// adapters are statically linked and register themselves into the kernel's
/// [`AdapterRegistry`] by platform name at startup.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Platform name this adapter serves, e.g. `"discord"`.
    fn platform(&self) -> &'static str;

    /// Wire up the adapter with its sandboxed context. Called once, before
    /// `start`.
    async fn init(&self, ctx: AdapterContext) -> Result<(), BridgeError>;

    /// Begin consuming/producing. Must return once the adapter's background
    /// tasks are spawned; it does not block for the adapter's lifetime.
    async fn start(&self) -> Result<(), BridgeError>;

    /// Signal the adapter to stop. The adapter should finish any in-flight
    /// work and release its external connection; no in-flight job is
    /// forcibly aborted by the core.
    async fn stop(&self) -> Result<(), BridgeError>;

    /// Current health, for the kernel's readiness state and the admin
    /// surface.
    async fn health(&self) -> AdapterHealth;

    /// Deliver one outbound envelope to the external network. Invoked by the
    /// core inside this adapter's circuit breaker, after the envelope has
    /// been validated and the correlation context entered.
    async fn process_egress(&self, envelope: Envelope) -> Result<(), BridgeError>;
}

/// Registry of adapters keyed by platform name, populated at plugin-discovery
/// time (spec.md §4.9: "plugin discovery ... registering themselves into an
/// interface registry at init, keyed by platform name").
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn Adapter>) {
        self.adapters.push(adapter);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Adapter>> {
        self.adapters.iter()
    }

    pub fn get(&self, platform: &str) -> Option<Arc<dyn Adapter>> {
        self.adapters.iter().find(|a| a.platform() == platform).cloned()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Register the core's egress processor for `adapter` on its
/// `queue_<platform>_out` queue: validates the envelope, enters its
/// correlation context, and invokes `process_egress` inside the adapter's
/// circuit breaker. Mirrors spec.md §4.8's "on init, the core registers a
/// processor ..." requirement.
pub async fn wire_egress(
    adapter: Arc<dyn Adapter>,
    queues: Arc<QueueManager>,
    breakers: Arc<CircuitBreakerRegistry>,
) {
    let platform = adapter.platform().to_owned();
    let queue = queues.get_or_create(&platform, crate::queue::QueueOptions::default()).await;
    let breaker_service = format!("{platform}_api");

    let processor: crate::queue::Processor = Arc::new(move |job, ctx| {
        let adapter = Arc::clone(&adapter);
        let breakers = Arc::clone(&breakers);
        let breaker_service = breaker_service.clone();
        Box::pin(async move {
            job.envelope.ensure_valid()?;
            ctx.record_on_current_span();
            let breaker = breakers.get(&breaker_service).await;
            let envelope = job.envelope.clone();
            breaker.call(|| async { adapter.process_egress(envelope).await }).await
        })
    });

    queue.process(processor).await;
}

#[cfg(test)]
#[path = "adapter_tests.rs"]
mod tests;
