// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dual-mode pub/sub message bus.
//!
//! `Local` mode is an in-process dispatcher; `Distributed` mode (behind the
//! `distributed-bus` feature) publishes to an external NATS subject via one
//! connection and re-emits locally via a dedicated subscriber connection —
//! two physically separate connections, matching the spec's requirement that
//! the publisher and subscriber never share a socket.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// Default maximum listener count per event, to tolerate fan-in from many adapters.
pub const DEFAULT_MAX_LISTENERS: usize = 100;

/// Topic string for the bridge's ingress event.
pub const TOPIC_MESSAGE_INGRESS: &str = "message.ingress";
/// Topic string emitted once the kernel finishes startup.
pub const TOPIC_SYSTEM_READY: &str = "system.ready";
/// Topic string emitted when the shutdown sequence begins.
pub const TOPIC_SYSTEM_SHUTDOWN: &str = "system.shutdown";

/// Envelope wrapper carried on the bus, enriched with a correlation id if the
/// caller didn't supply one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusMessage {
    pub correlation_id: String,
    pub payload: serde_json::Value,
}

impl BusMessage {
    pub fn new(payload: serde_json::Value, correlation_id: Option<String>) -> Self {
        Self { correlation_id: correlation_id.unwrap_or_else(|| Uuid::new_v4().to_string()), payload }
    }
}

/// Per-event broadcast channel plus the listener-count cap.
struct Topic {
    tx: broadcast::Sender<BusMessage>,
    max_listeners: usize,
}

/// In-process pub/sub dispatcher.
///
/// Per-event ordering matches `emit` call order within this process; there is
/// no ordering guarantee across processes. Emits are deferred one scheduler
/// tick (via `tokio::spawn`) to avoid deep synchronous recursion and to
/// approximate network delivery semantics.
pub struct LocalBus {
    topics: RwLock<HashMap<String, Topic>>,
    max_listeners: usize,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::with_max_listeners(DEFAULT_MAX_LISTENERS)
    }

    pub fn with_max_listeners(max_listeners: usize) -> Self {
        Self { topics: RwLock::new(HashMap::new()), max_listeners }
    }

    async fn topic_sender(&self, event: &str) -> broadcast::Sender<BusMessage> {
        if let Some(topic) = self.topics.read().await.get(event) {
            return topic.tx.clone();
        }
        let mut topics = self.topics.write().await;
        if let Some(topic) = topics.get(event) {
            return topic.tx.clone();
        }
        let (tx, _rx) = broadcast::channel(256);
        topics.insert(
            event.to_owned(),
            Topic { tx: tx.clone(), max_listeners: self.max_listeners },
        );
        tx
    }

    /// Subscribe to `event`. Returns `None` if the topic is already at its
    /// listener cap.
    pub async fn on(&self, event: &str) -> Option<broadcast::Receiver<BusMessage>> {
        {
            let topics = self.topics.read().await;
            if let Some(topic) = topics.get(event) {
                if topic.tx.receiver_count() >= topic.max_listeners {
                    tracing::warn!(event, cap = topic.max_listeners, "bus listener cap reached");
                    return None;
                }
                return Some(topic.tx.subscribe());
            }
        }
        let tx = self.topic_sender(event).await;
        Some(tx.subscribe())
    }

    /// Emit `payload` on `event`, enriching it with a correlation id if one
    /// wasn't supplied. The actual send happens on the next scheduler tick.
    pub async fn emit(&self, event: &str, payload: serde_json::Value, correlation_id: Option<String>) {
        let tx = self.topic_sender(event).await;
        let message = BusMessage::new(payload, correlation_id);
        tokio::spawn(async move {
            // Deferred: simulates network delivery and keeps emit from recursing
            // synchronously into handlers registered on the same topic.
            let _ = tx.send(message);
        });
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Distributed bus backed by NATS: one publisher connection, one dedicated
/// subscriber connection that deserializes and re-emits onto a [`LocalBus`].
#[cfg(feature = "distributed-bus")]
pub struct DistributedBus {
    publisher: async_nats::Client,
    local: Arc<LocalBus>,
}

#[cfg(feature = "distributed-bus")]
impl DistributedBus {
    pub async fn connect(url: &str, local: Arc<LocalBus>) -> anyhow::Result<Self> {
        let publisher = async_nats::connect(url).await?;
        let subscriber = async_nats::connect(url).await?;
        let bus = Self { publisher, local: Arc::clone(&local) };
        bus.spawn_subscriber_reemit(subscriber).await?;
        Ok(bus)
    }

    async fn spawn_subscriber_reemit(&self, subscriber: async_nats::Client) -> anyhow::Result<()> {
        let mut sub = subscriber.subscribe("bridge.>").await?;
        let local = Arc::clone(&self.local);
        tokio::spawn(async move {
            use futures_util::StreamExt;
            while let Some(msg) = sub.next().await {
                let Ok(bus_message) = serde_json::from_slice::<BusMessage>(&msg.payload) else {
                    tracing::warn!("distributed bus: failed to deserialize message");
                    continue;
                };
                let event = msg.subject.as_str().strip_prefix("bridge.").unwrap_or(msg.subject.as_str());
                let tx = local.topic_sender(event).await;
                let _ = tx.send(bus_message);
            }
        });
        Ok(())
    }

    pub async fn emit(&self, event: &str, payload: serde_json::Value, correlation_id: Option<String>) {
        let message = BusMessage::new(payload, correlation_id);
        let subject = format!("bridge.{event}");
        if let Ok(bytes) = serde_json::to_vec(&message) {
            if let Err(e) = self.publisher.publish(subject, bytes.into()).await {
                tracing::error!(event, err = %e, "distributed bus publish failed");
            }
        }
    }
}

/// Dual-mode message bus handle.
pub enum MessageBus {
    Local(Arc<LocalBus>),
    #[cfg(feature = "distributed-bus")]
    Distributed(Arc<DistributedBus>),
}

impl MessageBus {
    pub fn local() -> Self {
        Self::Local(Arc::new(LocalBus::new()))
    }

    /// The in-process bus backing this handle, for subscription. In
    /// distributed mode, subscribers still attach to the local re-emit bus.
    pub fn local_bus(&self) -> Arc<LocalBus> {
        match self {
            Self::Local(bus) => Arc::clone(bus),
            #[cfg(feature = "distributed-bus")]
            Self::Distributed(bus) => Arc::clone(&bus.local),
        }
    }

    pub async fn emit(&self, event: &str, payload: serde_json::Value, correlation_id: Option<String>) {
        match self {
            Self::Local(bus) => bus.emit(event, payload, correlation_id).await,
            #[cfg(feature = "distributed-bus")]
            Self::Distributed(bus) => bus.emit(event, payload, correlation_id).await,
        }
    }

    pub async fn on(&self, event: &str) -> Option<broadcast::Receiver<BusMessage>> {
        self.local_bus().on(event).await
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
