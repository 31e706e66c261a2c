// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! openchat-bridge: the bridge routing and delivery core of a multi-platform
//! chat-bridge daemon.
//!
//! Ingests normalized [`envelope::Envelope`]s emitted by network adapters,
//! resolves bridge topology, applies split-horizon and trace-path loop
//! prevention, and fans each envelope out to per-destination work queues
//! behind a circuit breaker. See the module list below for the component this
//! crate is organized around; each one maps directly onto a component in the
//! bridge's design.

pub mod adapter;
pub mod bus;
pub mod circuit_breaker;
pub mod context;
pub mod dedup;
pub mod envelope;
pub mod error;
pub mod kernel;
pub mod queue;
pub mod repository;
pub mod router;

pub use adapter::{Adapter, AdapterContext, AdapterHealth, AdapterKind, AdapterRegistry};
pub use bus::MessageBus;
pub use circuit_breaker::{BreakerConfig, BreakerState, CircuitBreaker, CircuitBreakerRegistry};
pub use context::CorrelationContext;
pub use dedup::DedupFilter;
pub use envelope::{Endpoint, EndpointParams, Envelope, EnvelopeKind, NewEnvelope, RichBlock};
pub use error::BridgeError;
pub use kernel::Kernel;
pub use queue::{Queue, QueueManager, QueueOptions};
pub use repository::{
    Bridge, BridgeStatus, ChannelLink, InMemoryTopologyRepository, LinkChannel,
    SqliteTopologyRepository, TopologyRepository,
};
pub use router::Router;
