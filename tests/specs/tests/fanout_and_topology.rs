//! End-to-end scenarios S1, S2, S3, S6 and the topology-level invariants from
//! spec.md §8, exercised against the public `openchat_bridge` API without
//! mocking the repository.

use std::sync::Arc;

use openchat_bridge::queue::QueueOptions;
use openchat_bridge::repository::{BridgeStatus, InMemoryTopologyRepository, LinkChannel};
use openchat_bridge::{DedupFilter, Envelope, EndpointParams, NewEnvelope, QueueManager, Router, TopologyRepository};

async fn seed_bridge(
    repo: &Arc<dyn TopologyRepository>,
    channels: &[(&str, &str)],
) -> String {
    let bridge_id = repo.create_bridge("test-bridge").await.expect("create bridge");
    for (platform, native_id) in channels {
        repo.link_channel_to_bridge(LinkChannel {
            bridge_id: bridge_id.clone(),
            platform: (*platform).to_owned(),
            native_id: (*native_id).to_owned(),
            config: serde_json::json!({}),
        })
        .await
        .expect("link channel");
    }
    bridge_id
}

fn ingress_envelope(platform: &str, channel_id: &str, text: &str) -> Envelope {
    Envelope::new(NewEnvelope {
        source: EndpointParams { platform: platform.to_owned(), channel_id: channel_id.to_owned(), ..Default::default() },
        text: text.to_owned(),
        ..Default::default()
    })
    .expect("valid envelope")
}

/// Register a no-op processor on `queue` so enqueued jobs drain into
/// `completed_count` instead of sitting unprocessed.
async fn drain(queue: &Arc<openchat_bridge::queue::Queue>) {
    queue
        .process(Arc::new(|_job, _ctx| Box::pin(async move { Ok(()) })))
        .await;
}

/// S1 — simple fan-out: discord:C1 -> {telegram:T1, whatsapp:W1}, never back
/// to discord.
#[tokio::test]
async fn s1_simple_fan_out() {
    let repo: Arc<dyn TopologyRepository> = Arc::new(InMemoryTopologyRepository::new());
    seed_bridge(&repo, &[("discord", "c1"), ("telegram", "t1"), ("whatsapp", "w1")]).await;

    let dedup = Arc::new(DedupFilter::new());
    let queues = Arc::new(QueueManager::new());
    let router = Router::new(Arc::clone(&repo), dedup, Arc::clone(&queues));

    let telegram = queues.get_or_create("telegram", QueueOptions::default()).await;
    let whatsapp = queues.get_or_create("whatsapp", QueueOptions::default()).await;
    drain(&telegram).await;
    drain(&whatsapp).await;

    router.route(ingress_envelope("discord", "c1", "hi")).await;

    for _ in 0..100 {
        if telegram.completed_count().await == 1 && whatsapp.completed_count().await == 1 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    assert_eq!(telegram.completed_count().await, 1, "expected telegram to receive the fanned-out envelope");
    assert_eq!(whatsapp.completed_count().await, 1, "expected whatsapp to receive the fanned-out envelope");
    assert!(queues.get("discord").await.is_none(), "split horizon: discord must never be enqueued to");
}

/// S2 — trace-path loop guard: an envelope that has already transited both
/// topology members produces zero enqueues.
#[tokio::test]
async fn s2_trace_path_loop_guard_blocks_all_targets() {
    let repo: Arc<dyn TopologyRepository> = Arc::new(InMemoryTopologyRepository::new());
    seed_bridge(&repo, &[("discord", "c1"), ("telegram", "t1")]).await;

    let dedup = Arc::new(DedupFilter::new());
    let queues = Arc::new(QueueManager::new());
    let router = Router::new(Arc::clone(&repo), dedup, Arc::clone(&queues));

    let mut envelope = ingress_envelope("telegram", "t1", "looped");
    envelope.head.trace_path = vec!["discord:c1".to_owned(), "telegram:t1".to_owned()];

    router.route(envelope).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert!(queues.get("discord").await.is_none());
    let telegram = queues.get("telegram").await;
    if let Some(telegram) = telegram {
        assert_eq!(telegram.completed_count().await, 0);
        assert_eq!(telegram.failed_count().await, 0);
    }
}

/// S3 — paused bridge: ingress from a member channel produces zero enqueues.
#[tokio::test]
async fn s3_paused_bridge_drops_silently() {
    let repo: Arc<dyn TopologyRepository> = Arc::new(InMemoryTopologyRepository::new());
    let bridge_id = seed_bridge(&repo, &[("discord", "c1"), ("telegram", "t1")]).await;
    repo.update_bridge_status(&bridge_id, BridgeStatus::Paused).await.expect("pause bridge");

    let dedup = Arc::new(DedupFilter::new());
    let queues = Arc::new(QueueManager::new());
    let router = Router::new(Arc::clone(&repo), dedup, Arc::clone(&queues));

    router.route(ingress_envelope("discord", "c1", "should not route")).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert!(queues.get("telegram").await.is_none(), "paused bridge must not enqueue anywhere");
}

/// S6 — upsert channel migration moves a channel between bridges.
#[tokio::test]
async fn s6_relinking_a_channel_migrates_it_between_bridges() {
    let repo: Arc<dyn TopologyRepository> = Arc::new(InMemoryTopologyRepository::new());
    let bridge_one = repo.create_bridge("b1").await.expect("create b1");
    let bridge_two = repo.create_bridge("b2").await.expect("create b2");

    repo.link_channel_to_bridge(LinkChannel {
        bridge_id: bridge_one.clone(),
        platform: "discord".to_owned(),
        native_id: "c1".to_owned(),
        config: serde_json::json!({}),
    })
    .await
    .expect("initial link");

    repo.link_channel_to_bridge(LinkChannel {
        bridge_id: bridge_two.clone(),
        platform: "discord".to_owned(),
        native_id: "c1".to_owned(),
        config: serde_json::json!({}),
    })
    .await
    .expect("re-link to b2");

    let link = repo.get_channel_link("discord", "c1").await.expect("lookup").expect("link exists");
    assert_eq!(link.bridge_id, bridge_two);

    let b1_topology = repo.get_bridge_topology(&bridge_one).await;
    assert!(b1_topology.is_empty(), "b1 must no longer contain the migrated channel");

    let b2_topology = repo.get_bridge_topology(&bridge_two).await;
    assert_eq!(b2_topology.len(), 1);
    assert_eq!(b2_topology[0].native_id, "c1");
}

/// Invariant: a `(platform, native_id)` pair belongs to at most one bridge.
#[tokio::test]
async fn invariant_channel_belongs_to_at_most_one_bridge() {
    let repo: Arc<dyn TopologyRepository> = Arc::new(InMemoryTopologyRepository::new());
    let bridge_one = repo.create_bridge("b1").await.expect("create b1");
    let bridge_two = repo.create_bridge("b2").await.expect("create b2");

    for bridge_id in [&bridge_one, &bridge_two] {
        repo.link_channel_to_bridge(LinkChannel {
            bridge_id: bridge_id.clone(),
            platform: "telegram".to_owned(),
            native_id: "shared".to_owned(),
            config: serde_json::json!({}),
        })
        .await
        .expect("link");
    }

    let b1_topology = repo.get_bridge_topology(&bridge_one).await;
    let b2_topology = repo.get_bridge_topology(&bridge_two).await;
    assert_eq!(b1_topology.len() + b2_topology.len(), 1, "exactly one bridge should own the channel");
}

/// Invariant: after pausing/turning off a bridge, subsequent ingress from a
/// member channel produces zero enqueues.
#[tokio::test]
async fn invariant_bridge_off_yields_zero_enqueues() {
    let repo: Arc<dyn TopologyRepository> = Arc::new(InMemoryTopologyRepository::new());
    let bridge_id = seed_bridge(&repo, &[("discord", "c1"), ("telegram", "t1")]).await;
    repo.update_bridge_status(&bridge_id, BridgeStatus::Off).await.expect("turn off");

    let dedup = Arc::new(DedupFilter::new());
    let queues = Arc::new(QueueManager::new());
    let router = Router::new(Arc::clone(&repo), dedup, Arc::clone(&queues));

    router.route(ingress_envelope("discord", "c1", "nope")).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert!(queues.get("telegram").await.is_none());
}

/// Invariant: `trace_path` never contains duplicates after routing.
#[tokio::test]
async fn invariant_trace_path_has_no_duplicates_after_routing() {
    let repo: Arc<dyn TopologyRepository> = Arc::new(InMemoryTopologyRepository::new());
    seed_bridge(&repo, &[("discord", "c1"), ("telegram", "t1"), ("whatsapp", "w1")]).await;

    let dedup = Arc::new(DedupFilter::new());
    let queues = Arc::new(QueueManager::new());
    let router = Router::new(Arc::clone(&repo), dedup, Arc::clone(&queues));

    let envelope = ingress_envelope("discord", "c1", "dup-check");
    let envelope_id = envelope.head.id.clone();
    router.route(envelope).await;

    let telegram = queues.get_or_create("telegram", QueueOptions::default()).await;
    let processed = Arc::new(tokio::sync::Mutex::new(Vec::<openchat_bridge::Envelope>::new()));
    let processed_clone = Arc::clone(&processed);
    telegram
        .process(Arc::new(move |job, _ctx| {
            let processed = Arc::clone(&processed_clone);
            Box::pin(async move {
                processed.lock().await.push(job.envelope);
                Ok(())
            })
        }))
        .await;

    for _ in 0..100 {
        if telegram.completed_count().await > 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let seen = processed.lock().await;
    let delivered = seen.iter().find(|e| e.head.id == envelope_id).expect("envelope delivered to telegram");
    let mut unique = delivered.head.trace_path.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), delivered.head.trace_path.len(), "trace_path must contain no duplicates");
    assert_eq!(delivered.head.dest.as_ref().map(|d| d.platform.as_str()), Some("telegram"));
}
