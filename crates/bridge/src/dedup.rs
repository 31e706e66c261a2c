// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Short-window duplicate suppression keyed by `(text, user, channel)`.
//!
//! TTL is the only guarantee: entries older than the window are evicted lazily
//! on access and swept periodically. No persistence across restarts.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

/// Default dedup window: 300 seconds.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// In-memory duplicate suppressor.
pub struct DedupFilter {
    seen: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
}

impl DedupFilter {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self { seen: Mutex::new(HashMap::new()), ttl }
    }

    /// Fingerprint of `(text, user_id, channel_id)`.
    pub fn fingerprint(text: &str, user_id: &str, channel_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(b":");
        hasher.update(user_id.as_bytes());
        hasher.update(b":");
        hasher.update(channel_id.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Check whether `(text, user_id, channel_id)` was already seen within the
    /// TTL window; if not, record it as seen now. Returns `true` if this call
    /// observed a duplicate (the caller should suppress routing).
    pub async fn check_and_record(&self, text: &str, user_id: &str, channel_id: &str) -> bool {
        let fingerprint = Self::fingerprint(text, user_id, channel_id);
        let now = Instant::now();
        let mut seen = self.seen.lock().await;

        if let Some(&inserted_at) = seen.get(&fingerprint) {
            if now.duration_since(inserted_at) < self.ttl {
                return true;
            }
        }

        seen.insert(fingerprint, now);
        false
    }

    /// Remove every entry older than the TTL window. Intended to be called
    /// periodically from a background sweep task.
    pub async fn sweep(&self) {
        let ttl = self.ttl;
        let now = Instant::now();
        self.seen.lock().await.retain(|_, inserted_at| now.duration_since(*inserted_at) < ttl);
    }

    /// Spawn a periodic sweep task on the current tokio runtime.
    pub fn spawn_sweeper(self: std::sync::Arc<Self>, interval: Duration) {
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                timer.tick().await;
                self.sweep().await;
            }
        });
    }
}

impl Default for DedupFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "dedup_tests.rs"]
mod tests;
