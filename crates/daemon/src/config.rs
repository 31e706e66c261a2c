// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

/// Multi-platform chat-bridge daemon: normalizes and fans out messages
/// across configured bridges.
///
/// Covers every option in the configuration surface of spec.md §6.
#[derive(Debug, Clone, Parser)]
#[command(name = "openchat-daemon", version, about)]
pub struct BridgeConfig {
    /// Node identifier, used to disambiguate this process in a multi-node
    /// distributed-bus deployment.
    #[arg(long, env = "NODE_ID", default_value = "node-1")]
    pub node_id: String,

    /// Path to the embedded relational persistence file.
    #[arg(long, env = "DB_PATH", default_value = "data/openchat_core.db")]
    pub db_path: std::path::PathBuf,

    /// Distributed bus/queue broker URL. If unset, the bus runs in local
    /// in-process mode. Named `REDIS_URL` to match the upstream system's
    /// configuration surface; this crate's distributed backend is NATS
    /// (`distributed-bus` feature) rather than Redis — see DESIGN.md.
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Discord adapter bot token.
    #[arg(long, env = "DISCORD_TOKEN")]
    pub discord_token: Option<String>,

    /// Telegram adapter bot token.
    #[arg(long, env = "TELEGRAM_TOKEN")]
    pub telegram_token: Option<String>,

    /// Stoat adapter bot token.
    #[arg(long, env = "STOAT_TOKEN")]
    pub stoat_token: Option<String>,

    /// Signal adapter registered phone number.
    #[arg(long, env = "SIGNAL_PHONE")]
    pub signal_phone: Option<String>,

    /// API key for the media-processing service's transcription/captioning
    /// calls (delegated collaborator, out of core scope).
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    /// S3-compatible bucket name for the storage/media service.
    #[arg(long, env = "S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// S3-compatible region.
    #[arg(long, env = "S3_REGION")]
    pub s3_region: Option<String>,

    /// S3-compatible access key id.
    #[arg(long, env = "S3_ACCESS_KEY_ID")]
    pub s3_access_key_id: Option<String>,

    /// S3-compatible secret access key.
    #[arg(long, env = "S3_SECRET_ACCESS_KEY")]
    pub s3_secret_access_key: Option<String>,

    /// CDN base URL attachments are served from.
    #[arg(long, env = "CDN_URL")]
    pub cdn_url: Option<String>,

    /// Log level: error, warn, info, debug, trace.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Host to bind the admin/health HTTP surface on.
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port for the admin/health HTTP surface.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Comma-separated user ids granted admin ACL. Hashed at startup; never
    /// held or logged in plaintext past process boot.
    #[arg(long, env = "GLOBAL_SUDO")]
    pub global_sudo: Option<String>,
}

impl BridgeConfig {
    /// SHA-256 hex digests of each comma-separated `GLOBAL_SUDO` entry,
    /// computed once at startup so the admin ACL check never compares
    /// plaintext user ids.
    pub fn sudo_hashes(&self) -> Vec<String> {
        use sha2::{Digest, Sha256};
        let Some(raw) = &self.global_sudo else { return Vec::new() };
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|id| {
                let mut hasher = Sha256::new();
                hasher.update(id.as_bytes());
                format!("{:x}", hasher.finalize())
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
