// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kernel / lifecycle: ordered startup, the DI container the rest of the
//! crate is built from, and graceful shutdown.
//!
//! Startup order (spec.md §4.9): bus connect → repository connect → queue
//! manager → circuit-breaker registry → plugin (adapter) discovery → plugin
//! init → plugin start → emit `system.ready`. Shutdown reverses the order
//! with `join_all`-style tolerance: one adapter's failure to stop never
//! prevents the others from being given the chance to.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::adapter::{Adapter, AdapterContext, AdapterRegistry};
use crate::bus::{MessageBus, TOPIC_SYSTEM_READY, TOPIC_SYSTEM_SHUTDOWN};
use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::dedup::DedupFilter;
use crate::queue::QueueManager;
use crate::repository::TopologyRepository;
use crate::router::Router;

/// The kernel's dependency-injection container: every core singleton,
/// constructed once and handed out by `Arc` clone. Replaces the source's
/// module-level statics (spec.md §9) with explicit, kernel-owned state.
pub struct Kernel {
    pub bus: Arc<MessageBus>,
    pub repository: Arc<dyn TopologyRepository>,
    pub dedup: Arc<DedupFilter>,
    pub queues: Arc<QueueManager>,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub router: Arc<Router>,
    pub adapters: AdapterRegistry,
    pub shutdown: CancellationToken,
    shutdown_guard: std::sync::atomic::AtomicBool,
}

impl Kernel {
    /// Build the kernel's singleton graph. Does not start anything — see
    /// [`Self::start`].
    pub fn new(repository: Arc<dyn TopologyRepository>, bus: Arc<MessageBus>) -> Self {
        let dedup = Arc::new(DedupFilter::new());
        let queues = Arc::new(QueueManager::new());
        let breakers = Arc::new(CircuitBreakerRegistry::default());
        let router = Arc::new(Router::new(Arc::clone(&repository), Arc::clone(&dedup), Arc::clone(&queues)));

        Self {
            bus,
            repository,
            dedup,
            queues,
            breakers,
            router,
            adapters: AdapterRegistry::new(),
            shutdown: CancellationToken::new(),
            shutdown_guard: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Register an adapter for plugin discovery. Call before [`Self::start`].
    pub fn register_adapter(&mut self, adapter: Arc<dyn Adapter>) {
        self.adapters.register(adapter);
    }

    /// Ordered startup: dedup sweeper → router wired to ingress → adapter
    /// init → adapter start → emit `system.ready`.
    pub async fn start(self: &Arc<Self>) -> anyhow::Result<()> {
        Arc::clone(&self.dedup).spawn_sweeper(std::time::Duration::from_secs(60));
        self.spawn_ingress_consumer().await;

        for adapter in self.adapters.iter() {
            let ctx = AdapterContext {
                bus: Arc::clone(&self.bus),
                repository: Arc::clone(&self.repository),
                queue: Arc::clone(&self.queues),
                circuit_breaker: Arc::clone(&self.breakers),
                plugin_name: adapter.platform().to_owned(),
                plugin_type: platform_to_kind(adapter.platform()),
            };
            adapter.init(ctx).await?;
            crate::adapter::wire_egress(
                Arc::clone(adapter),
                Arc::clone(&self.queues),
                Arc::clone(&self.breakers),
            )
            .await;
        }
        for adapter in self.adapters.iter() {
            adapter.start().await?;
        }

        self.bus.emit(TOPIC_SYSTEM_READY, json!({}), None).await;
        tracing::info!(adapters = self.adapters.len(), "kernel started");
        Ok(())
    }

    /// Subscribe the router to `message.ingress` and dispatch each envelope
    /// that arrives on the bus.
    async fn spawn_ingress_consumer(self: &Arc<Self>) {
        let Some(mut rx) = self.bus.on(crate::bus::TOPIC_MESSAGE_INGRESS).await else {
            tracing::error!("kernel: could not subscribe router to message.ingress");
            return;
        };
        let router = Arc::clone(&self.router);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(message) => {
                        match serde_json::from_value(message.payload) {
                            Ok(envelope) => router.route(envelope).await,
                            Err(e) => tracing::warn!(err = %e, "kernel: malformed ingress payload"),
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "kernel: ingress consumer lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Run the shutdown sequence exactly once, regardless of how many
    /// callers (signal handler, unhandled-error hook, admin API) invoke it
    /// concurrently.
    pub async fn shutdown(&self) {
        if self.shutdown_guard.swap(true, std::sync::atomic::Ordering::SeqCst) {
            return;
        }

        self.bus.emit(TOPIC_SYSTEM_SHUTDOWN, json!({}), None).await;

        // Reverse of startup order; one adapter's failure to stop never
        // blocks the others from being asked to stop too.
        for adapter in self.adapters.iter() {
            if let Err(e) = adapter.stop().await {
                tracing::warn!(platform = adapter.platform(), err = %e, "adapter failed to stop cleanly");
            }
        }

        self.shutdown.cancel();
        tracing::info!("kernel shutdown complete");
    }

    /// Spawn the `SIGINT`/`SIGTERM` handler that triggers [`Self::shutdown`]
    /// exactly once.
    pub fn spawn_signal_handler(self: &Arc<Self>) {
        let kernel = Arc::clone(self);
        tokio::spawn(async move {
            let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!(err = %e, "failed to install SIGTERM handler");
                    None
                }
            };
            let mut sigint = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!(err = %e, "failed to install SIGINT handler");
                    None
                }
            };

            tokio::select! {
                _ = async {
                    if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
                } => tracing::info!("received SIGTERM"),
                _ = async {
                    if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
                } => tracing::info!("received SIGINT"),
            }

            kernel.shutdown().await;
        });
    }
}

fn platform_to_kind(platform: &str) -> crate::adapter::AdapterKind {
    use crate::adapter::AdapterKind;
    match platform {
        "discord" => AdapterKind::Discord,
        "telegram" => AdapterKind::Telegram,
        "whatsapp" => AdapterKind::WhatsApp,
        "signal" => AdapterKind::Signal,
        _ => AdapterKind::Stoat,
    }
}

#[cfg(test)]
#[path = "kernel_tests.rs"]
mod tests;
