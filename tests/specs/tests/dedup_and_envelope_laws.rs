//! S5 and the envelope round-trip laws from spec.md §8.

use openchat_bridge::{DedupFilter, Envelope, EndpointParams, NewEnvelope, RichBlock};

/// S5 — two identical envelopes within the TTL window produce exactly one
/// routed message; after the window elapses, the second is routed.
///
/// Uses a shortened TTL rather than the spec's 300s window so the test
/// completes quickly; the mechanism under test — TTL-bounded fingerprint
/// suppression — is identical.
#[tokio::test]
async fn s5_dedup_suppresses_within_window_and_releases_after() {
    let dedup = DedupFilter::with_ttl(std::time::Duration::from_millis(80));

    let first = dedup.check_and_record("ping", "u1", "c1").await;
    assert!(!first, "first occurrence must not be flagged as duplicate");

    let second = dedup.check_and_record("ping", "u1", "c1").await;
    assert!(second, "second occurrence within the window must be suppressed");

    tokio::time::sleep(std::time::Duration::from_millis(120)).await;

    let third = dedup.check_and_record("ping", "u1", "c1").await;
    assert!(!third, "occurrence after the window elapses must route again");
}

#[tokio::test]
async fn dedup_keys_on_the_full_text_user_channel_tuple() {
    let dedup = DedupFilter::new();
    assert!(!dedup.check_and_record("ping", "u1", "c1").await);
    // Different user, same text/channel: not a duplicate.
    assert!(!dedup.check_and_record("ping", "u2", "c1").await);
    // Different channel, same text/user: not a duplicate.
    assert!(!dedup.check_and_record("ping", "u1", "c2").await);
}

fn new_envelope_params(platform: &str, channel_id: &str, text: &str) -> NewEnvelope {
    NewEnvelope {
        source: EndpointParams { platform: platform.to_owned(), channel_id: channel_id.to_owned(), ..Default::default() },
        text: text.to_owned(),
        ..Default::default()
    }
}

/// Round-trip law: `validate(create(p)) = true` for all `p` with non-empty
/// `source.platform` and `source.channel_id`.
#[test]
fn validate_holds_for_every_well_formed_construction() {
    for (platform, channel, text) in [("discord", "c1", "hi"), ("TELEGRAM", " T1 ", ""), ("whatsapp", "w1", "emoji 🎉")] {
        let envelope = Envelope::new(new_envelope_params(platform, channel, text)).expect("valid envelope");
        assert!(envelope.validate());
    }
}

#[test]
fn construction_rejects_empty_source_fields() {
    let missing_platform = Envelope::new(new_envelope_params("", "c1", "hi"));
    assert!(missing_platform.is_err());

    let missing_channel = Envelope::new(new_envelope_params("discord", "", "hi"));
    assert!(missing_channel.is_err());
}

#[test]
fn source_identifiers_are_lowercased_and_trimmed() {
    let envelope = Envelope::new(new_envelope_params("Discord", "  C1  ", "hi")).expect("valid envelope");
    assert_eq!(envelope.head.source.platform, "discord");
    assert_eq!(envelope.head.source.channel_id, "c1");
    assert_eq!(envelope.head.trace_path, vec!["discord:c1".to_owned()]);
}

/// Round-trip law: `degradeToText` is idempotent when re-applied to a
/// text-only envelope constructed from its own output.
#[test]
fn degrade_to_text_is_idempotent_for_text_only_envelopes() {
    let envelope = Envelope::new(new_envelope_params("discord", "c1", "hello world")).expect("valid envelope");
    let once = envelope.degrade_to_text();

    let rebuilt = Envelope::new(new_envelope_params("discord", "c1", &once)).expect("valid envelope");
    let twice = rebuilt.degrade_to_text();

    assert_eq!(once, twice);
}

#[test]
fn degrade_to_text_appends_rich_block_and_attachments_in_order() {
    let mut params = new_envelope_params("discord", "c1", "body text");
    params.rich = Some(RichBlock {
        title: Some("Big News".to_owned()),
        description: Some("Something happened.".to_owned()),
        url: Some("https://example.invalid/x".to_owned()),
    });
    params.attachments = vec![openchat_bridge::envelope::RawAttachment {
        name: Some("photo.png".to_owned()),
        url: Some("https://example.invalid/photo.png".to_owned()),
        ..Default::default()
    }];

    let envelope = Envelope::new(params).expect("valid envelope");
    let degraded = envelope.degrade_to_text();

    assert!(degraded.starts_with("body text"));
    assert!(degraded.contains("*Big News*\n"));
    assert!(degraded.contains("Something happened."));
    assert!(degraded.contains("Enlace: https://example.invalid/x"));
    assert!(degraded.contains("[Adjunto]: photo.png: https://example.invalid/photo.png"));
}

#[test]
fn sanitized_attachment_fills_stable_defaults() {
    let attachment = openchat_bridge::envelope::Attachment::sanitized(openchat_bridge::envelope::RawAttachment::default());
    assert!(!attachment.id.is_empty());
    assert_eq!(attachment.kind, "file");
    assert_eq!(attachment.mime_type, "application/octet-stream");
    assert_eq!(attachment.name, "attachment");
    assert_eq!(attachment.size, 0);
}
