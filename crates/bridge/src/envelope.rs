// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The canonical message envelope (UMF) carried on the bus.
//!
//! Immutable once emitted, except `head.trace_path`, which the router appends to
//! atomically per outbound clone.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BridgeError;

/// Message content-type discriminant. Closed set — adding a variant changes the
/// meaning of every exhaustive match over it, so this enum tracks spec exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    Text,
    Image,
    Video,
    Audio,
    File,
    Sticker,
    System,
}

/// A platform + native channel/user identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub platform: String,
    pub channel_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl Endpoint {
    /// The `"platform:channelId"` token used in `trace_path`.
    pub fn trace_token(&self) -> String {
        format!("{}:{}", self.platform, self.channel_id)
    }
}

/// Reference to the message this one replies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub parent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_text: Option<String>,
}

/// Structured rich-content block (link preview, card, etc).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichBlock {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A single attachment, with stable defaults so downstream code never
/// has to special-case a missing field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub mime_type: String,
    pub size: u64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
}

impl Attachment {
    /// Build an attachment from caller-supplied fields, filling defaults for
    /// anything left unset.
    pub fn sanitized(raw: RawAttachment) -> Self {
        Self {
            id: raw.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            url: raw.url.unwrap_or_default(),
            kind: raw.kind.unwrap_or_else(|| "file".to_owned()),
            mime_type: raw.mime_type.unwrap_or_else(|| "application/octet-stream".to_owned()),
            size: raw.size.unwrap_or(0),
            name: raw.name.unwrap_or_else(|| "attachment".to_owned()),
            local_path: raw.local_path,
        }
    }
}

/// Caller-supplied attachment fields, all optional; see [`Attachment::sanitized`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAttachment {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub local_path: Option<String>,
}

/// Envelope header: routing metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Head {
    pub id: String,
    pub correlation_id: String,
    pub timestamp_ms: u64,
    pub kind: EnvelopeKind,
    pub source: Endpoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest: Option<Endpoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyRef>,
    pub trace_path: Vec<String>,
}

/// Envelope body: the message payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    pub text: String,
    pub raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rich: Option<RichBlock>,
    pub attachments: Vec<Attachment>,
}

/// The canonical message envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub head: Head,
    pub body: Body,
}

/// Parameters for constructing a new envelope at ingress.
#[derive(Debug, Clone, Default)]
pub struct NewEnvelope {
    pub correlation_id: Option<String>,
    pub kind: Option<EnvelopeKind>,
    pub source: EndpointParams,
    pub reply_to: Option<ReplyRef>,
    pub text: String,
    pub rich: Option<RichBlock>,
    pub attachments: Vec<RawAttachment>,
}

/// Source endpoint fields supplied by an adapter; validated by [`Envelope::new`].
#[derive(Debug, Clone, Default)]
pub struct EndpointParams {
    pub platform: String,
    pub channel_id: String,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub avatar: Option<String>,
}

impl Envelope {
    /// Construct a new ingress envelope: validates required fields, assigns an
    /// id, initializes `trace_path` to `[source]`, and sanitizes attachments.
    ///
    /// Fails with [`BridgeError::InvalidEnvelope`] when `source.platform` or
    /// `source.channel_id` is empty.
    pub fn new(params: NewEnvelope) -> Result<Self, BridgeError> {
        let platform = params.source.platform.trim().to_lowercase();
        let channel_id = params.source.channel_id.trim().to_lowercase();
        if platform.is_empty() || channel_id.is_empty() {
            return Err(BridgeError::InvalidEnvelope(
                "source.platform and source.channel_id are required".to_owned(),
            ));
        }

        let source = Endpoint {
            platform,
            channel_id,
            user_id: params.source.user_id,
            username: params.source.username,
            avatar: params.source.avatar,
        };
        let id = Uuid::new_v4().to_string();
        let correlation_id = params.correlation_id.unwrap_or_else(|| id.clone());
        let trace_path = vec![source.trace_token()];

        let attachments =
            params.attachments.into_iter().map(Attachment::sanitized).collect::<Vec<_>>();

        Ok(Self {
            head: Head {
                id,
                correlation_id,
                timestamp_ms: epoch_ms(),
                kind: params.kind.unwrap_or(EnvelopeKind::Text),
                source,
                dest: None,
                reply_to: params.reply_to,
                trace_path,
            },
            body: Body {
                raw: params.text.clone(),
                text: params.text,
                rich: params.rich,
                attachments,
            },
        })
    }

    /// Schema validation: non-empty id, non-empty source, trace_path is an array.
    /// (`trace_path` is always a `Vec`, so the third clause is a tautology in Rust —
    /// kept as an explicit check so the method reads as the literal contract.)
    pub fn validate(&self) -> bool {
        !self.head.id.is_empty()
            && !self.head.source.platform.is_empty()
            && !self.head.source.channel_id.is_empty()
    }

    /// [`Self::validate`], returning a typed error instead of a bool.
    pub fn ensure_valid(&self) -> Result<(), BridgeError> {
        if self.validate() {
            Ok(())
        } else {
            Err(BridgeError::InvalidEnvelope(format!(
                "envelope {} failed schema validation",
                self.head.id
            )))
        }
    }

    /// Render this envelope's rich content and attachments into a flat text
    /// representation, for platforms that cannot render structured content.
    ///
    /// Append order: `*title*`, description, `Enlace: url`, then one
    /// `\n\n[Adjunto]: name: url` line per attachment.
    pub fn degrade_to_text(&self) -> String {
        let mut out = self.body.text.clone();

        if let Some(rich) = &self.body.rich {
            if let Some(title) = &rich.title {
                out.push_str(&format!("*{title}*\n"));
            }
            if let Some(description) = &rich.description {
                out.push_str(description);
            }
            if let Some(url) = &rich.url {
                out.push_str(&format!("Enlace: {url}"));
            }
        }

        for attachment in &self.body.attachments {
            out.push_str(&format!("\n\n[Adjunto]: {}: {}", attachment.name, attachment.url));
        }

        out
    }
}

/// Current epoch time in milliseconds.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
