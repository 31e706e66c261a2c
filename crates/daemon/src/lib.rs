// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! openchat-daemon: wires configuration, logging, the admin/health HTTP
//! surface, and the bridge kernel's lifecycle together.

pub mod config;
pub mod http;

use std::sync::Arc;

use tokio::net::TcpListener;

use openchat_bridge::{Kernel, MessageBus, SqliteTopologyRepository, TopologyRepository};

use crate::config::BridgeConfig;

/// Run the daemon until shutdown. Startup order follows spec.md §4.9:
/// repository connect → bus connect → queue manager / circuit-breaker
/// registry (constructed inside [`Kernel::new`]) → plugin discovery → plugin
/// init → plugin start → emit `system.ready` → serve the admin surface.
pub async fn run(config: BridgeConfig) -> anyhow::Result<()> {
    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let repository: Arc<dyn TopologyRepository> =
        Arc::new(SqliteTopologyRepository::open(&config.db_path)?);

    let bus = Arc::new(resolve_bus(&config).await?);

    let kernel = Arc::new(Kernel::new(repository, bus));
    // Adapter registration happens here in a deployment that compiles
    // concrete Discord/Telegram/WhatsApp/Signal/Stoat adapters in; none are
    // part of the core, so the registry starts and stays empty unless a
    // downstream build links adapters in via `Kernel::register_adapter`.

    kernel.start().await?;
    kernel.spawn_signal_handler();

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr, "admin/health surface listening");

    let router = crate::http::build_router(Arc::clone(&kernel));
    axum::serve(listener, router)
        .with_graceful_shutdown(kernel.shutdown.clone().cancelled_owned())
        .await?;

    Ok(())
}

/// Resolve the message bus: local in-process mode unless `REDIS_URL` is set
/// and the `distributed-bus` feature is compiled in, per spec.md §4.3/§6.
async fn resolve_bus(config: &BridgeConfig) -> anyhow::Result<MessageBus> {
    #[cfg(feature = "distributed-bus")]
    if let Some(url) = &config.redis_url {
        let local = Arc::new(openchat_bridge::bus::LocalBus::new());
        let distributed = openchat_bridge::bus::DistributedBus::connect(url, local).await?;
        return Ok(MessageBus::Distributed(Arc::new(distributed)));
    }

    #[cfg(not(feature = "distributed-bus"))]
    if config.redis_url.is_some() {
        tracing::warn!(
            "REDIS_URL set but this binary was built without the `distributed-bus` feature; \
             falling back to local in-process mode"
        );
    }

    Ok(MessageBus::local())
}

/// Install the `tracing` subscriber, reading `LOG_LEVEL` via `EnvFilter`.
pub fn init_logging(config: &BridgeConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();
}
