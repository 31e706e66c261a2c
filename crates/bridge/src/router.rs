// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Topology resolution, split-horizon and trace-path loop prevention, and
//! per-destination fan-out enqueue. This is the component where concurrent
//! network I/O meets ordering and loop-safety guarantees.

use std::sync::Arc;

use crate::dedup::DedupFilter;
use crate::envelope::Envelope;
use crate::queue::{QueueManager, QueueOptions};
use crate::repository::TopologyRepository;

/// Resolves topology and fans an ingress envelope out to every other channel
/// sharing its bridge, enforcing split-horizon and trace-path loop guards.
pub struct Router {
    repository: Arc<dyn TopologyRepository>,
    dedup: Arc<DedupFilter>,
    queues: Arc<QueueManager>,
}

/// Per-target queue options. Adapters register theirs before routing begins;
/// targets without a registered option set use [`QueueOptions::default`].
pub struct QueueOptionsFor<'a> {
    pub platform: &'a str,
    pub options: QueueOptions,
}

impl Router {
    pub fn new(
        repository: Arc<dyn TopologyRepository>,
        dedup: Arc<DedupFilter>,
        queues: Arc<QueueManager>,
    ) -> Self {
        Self { repository, dedup, queues }
    }

    /// Route one ingress envelope. Implements spec's seven-step algorithm:
    ///
    /// 1. Reject if dedup-flagged or schema-invalid.
    /// 2. Resolve the source channel's bridge link; drop silently if unbridged.
    /// 3. Drop (with a debug log) if the bridge isn't `on`.
    /// 4. Resolve the bridge's full topology.
    /// 5. Ensure `trace_path` is initialized.
    /// 6. Append the source token to `trace_path` if not already present.
    /// 7. For each target: split-horizon, trace-path loop guard, clone, enqueue.
    ///
    /// A target that fails to enqueue does not abort fan-out to its peers.
    pub async fn route(&self, mut envelope: Envelope) {
        if !envelope.validate() {
            tracing::warn!(id = %envelope.head.id, "router: invalid envelope, dropping");
            return;
        }

        let is_duplicate = self
            .dedup
            .check_and_record(
                &envelope.body.text,
                envelope.head.source.user_id.as_deref().unwrap_or(""),
                &envelope.head.source.channel_id,
            )
            .await;
        if is_duplicate {
            tracing::debug!(id = %envelope.head.id, "router: duplicate envelope, suppressing");
            return;
        }

        let source = envelope.head.source.clone();
        let link = match self
            .repository
            .get_channel_link(&source.platform, &source.channel_id)
            .await
        {
            Ok(link) => link,
            Err(e) => {
                tracing::error!(id = %envelope.head.id, err = %e, "router: topology lookup failed, dropping");
                return;
            }
        };

        let Some(link) = link else {
            tracing::debug!(id = %envelope.head.id, source = %source.trace_token(), "router: channel not bridged, dropping");
            return;
        };

        if !matches!(link.status, crate::repository::BridgeStatus::On) {
            tracing::debug!(id = %envelope.head.id, bridge_id = %link.bridge_id, status = ?link.status, "router: bridge not on, dropping");
            return;
        }

        let targets = self.repository.get_bridge_topology(&link.bridge_id).await;

        if envelope.head.trace_path.is_empty() {
            envelope.head.trace_path = vec![source.trace_token()];
        }
        let source_id = source.trace_token();
        if !envelope.head.trace_path.iter().any(|t| t == &source_id) {
            envelope.head.trace_path.push(source_id.clone());
        }

        for target in &targets {
            let target_id = format!("{}:{}", target.platform, target.native_id);

            if target_id == source_id {
                continue; // split horizon
            }
            if envelope.head.trace_path.iter().any(|t| t == &target_id) {
                continue; // trace-path loop guard
            }

            let mut out_clone = envelope.clone();
            out_clone.head.dest = Some(crate::envelope::Endpoint {
                platform: target.platform.clone(),
                channel_id: target.native_id.clone(),
                user_id: None,
                username: None,
                avatar: None,
            });
            out_clone.head.trace_path.push(target_id.clone());

            let job_id = format!("{}-{}-{}", envelope.head.id, target.platform, target.native_id);
            let queue = self.queues.get_or_create(&target.platform, QueueOptions::default()).await;
            queue.enqueue(job_id, out_clone).await;
        }
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
