// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent store of bridges, channel membership, per-bridge status, and the
//! generic KV table. Backed by a single embedded SQLite file with WAL journaling
//! and foreign-key enforcement.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::envelope::epoch_ms;
use crate::error::BridgeError;

const SCHEMA: &str = include_str!("schema.sql");

/// Bridge status gates all routing. Only `On` bridges produce outbound traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeStatus {
    On,
    Off,
    Paused,
}

impl BridgeStatus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
            Self::Paused => "paused",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "off" => Self::Off,
            "paused" => Self::Paused,
            _ => Self::On,
        }
    }
}

/// A named group of channels across platforms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bridge {
    pub id: String,
    pub name: String,
    pub status: BridgeStatus,
    pub created_at: u64,
}

/// A single native channel linked into a bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLink {
    pub bridge_id: String,
    pub platform: String,
    pub native_id: String,
    pub config: serde_json::Value,
    pub added_at: u64,
}

/// The result of a hot-path channel lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLinkStatus {
    pub bridge_id: String,
    pub status: BridgeStatus,
}

/// Parameters for linking a channel into a bridge.
#[derive(Debug, Clone)]
pub struct LinkChannel {
    pub bridge_id: String,
    pub platform: String,
    pub native_id: String,
    pub config: serde_json::Value,
}

/// The topology persistence contract the router and admin surface depend on.
///
/// Implementations must provide single-writer/many-reader safety; callers never
/// see engine-specific error types, only [`BridgeError::RepositoryError`].
#[async_trait::async_trait]
pub trait TopologyRepository: Send + Sync {
    /// Hot path. Resolve `(platform, nativeId)` to its bridge and that bridge's
    /// status. `O(1)` amortized over the unique `(platform, native_id)` index.
    async fn get_channel_link(
        &self,
        platform: &str,
        native_id: &str,
    ) -> Result<Option<ChannelLinkStatus>, BridgeError>;

    /// Hot path. All channels linked into a bridge. Returns an empty sequence
    /// (never an error) so callers can iterate unconditionally; the underlying
    /// failure, if any, is logged by the implementation.
    async fn get_bridge_topology(&self, bridge_id: &str) -> Vec<ChannelLink>;

    async fn create_bridge(&self, name: &str) -> Result<String, BridgeError>;

    /// Upsert on `(platform, native_id)`. Re-linking an already-linked channel
    /// moves it between bridges.
    async fn link_channel_to_bridge(&self, link: LinkChannel) -> Result<(), BridgeError>;

    async fn unlink_channel(&self, platform: &str, native_id: &str) -> Result<(), BridgeError>;

    async fn update_bridge_status(
        &self,
        bridge_id: &str,
        status: BridgeStatus,
    ) -> Result<(), BridgeError>;

    async fn list_bridges(&self) -> Result<Vec<Bridge>, BridgeError>;

    async fn get_kv(&self, key: &str) -> Result<Option<String>, BridgeError>;
    async fn set_kv(&self, key: &str, value: &str) -> Result<(), BridgeError>;
    async fn delete_kv(&self, key: &str) -> Result<(), BridgeError>;
}

/// SQLite-backed [`TopologyRepository`].
///
/// `rusqlite::Connection` is synchronous and `!Sync`; every call is dispatched
/// through `spawn_blocking` against a single shared connection guarded by a
/// tokio mutex, matching WAL's single-writer/many-reader discipline without
/// needing a connection pool for this workload's concurrency level.
pub struct SqliteTopologyRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTopologyRepository {
    /// Open (or create) the database file at `path`, enabling WAL journaling and
    /// foreign-key enforcement, and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let conn = Connection::open(path)
            .map_err(|e| BridgeError::RepositoryError(format!("open: {e}")))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| BridgeError::RepositoryError(format!("wal: {e}")))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| BridgeError::RepositoryError(format!("foreign_keys: {e}")))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| BridgeError::RepositoryError(format!("schema: {e}")))?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Open an in-memory database, for tests.
    pub fn open_in_memory() -> Result<Self, BridgeError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| BridgeError::RepositoryError(format!("open: {e}")))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| BridgeError::RepositoryError(format!("foreign_keys: {e}")))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| BridgeError::RepositoryError(format!("schema: {e}")))?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, BridgeError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let guard = conn.lock_owned().await;
        tokio::task::spawn_blocking(move || f(&guard))
            .await
            .map_err(|e| BridgeError::RepositoryError(format!("join: {e}")))?
            .map_err(|e| BridgeError::RepositoryError(e.to_string()))
    }
}

#[async_trait::async_trait]
impl TopologyRepository for SqliteTopologyRepository {
    async fn get_channel_link(
        &self,
        platform: &str,
        native_id: &str,
    ) -> Result<Option<ChannelLinkStatus>, BridgeError> {
        let platform = platform.to_owned();
        let native_id = native_id.to_owned();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT channels.bridge_id, bridges.status FROM channels \
                 JOIN bridges ON bridges.id = channels.bridge_id \
                 WHERE channels.platform = ?1 AND channels.native_id = ?2",
                rusqlite::params![platform, native_id],
                |row| {
                    let bridge_id: String = row.get(0)?;
                    let status: String = row.get(1)?;
                    Ok(ChannelLinkStatus { bridge_id, status: BridgeStatus::parse(&status) })
                },
            )
            .optional()
        })
        .await
    }

    async fn get_bridge_topology(&self, bridge_id: &str) -> Vec<ChannelLink> {
        let bridge_id_owned = bridge_id.to_owned();
        let result = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT bridge_id, platform, native_id, config, added_at FROM channels \
                     WHERE bridge_id = ?1 ORDER BY added_at ASC",
                )?;
                let rows = stmt.query_map(rusqlite::params![bridge_id_owned], |row| {
                    let config_text: String = row.get(3)?;
                    Ok(ChannelLink {
                        bridge_id: row.get(0)?,
                        platform: row.get(1)?,
                        native_id: row.get(2)?,
                        config: serde_json::from_str(&config_text)
                            .unwrap_or(serde_json::Value::Null),
                        added_at: row.get::<_, i64>(4)? as u64,
                    })
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await;

        match result {
            Ok(links) => links,
            Err(e) => {
                tracing::error!(bridge_id, err = %e, "get_bridge_topology failed, returning empty");
                Vec::new()
            }
        }
    }

    async fn create_bridge(&self, name: &str) -> Result<String, BridgeError> {
        let id = Uuid::new_v4().to_string();
        let id_owned = id.clone();
        let name = name.to_owned();
        let now = epoch_ms();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO bridges (id, name, status, created_at) VALUES (?1, ?2, 'on', ?3)",
                rusqlite::params![id_owned, name, now as i64],
            )?;
            Ok(())
        })
        .await?;
        Ok(id)
    }

    async fn link_channel_to_bridge(&self, link: LinkChannel) -> Result<(), BridgeError> {
        let config_text = serde_json::to_string(&link.config).unwrap_or_else(|_| "{}".to_owned());
        let now = epoch_ms();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO channels (id, bridge_id, platform, native_id, config, added_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT(platform, native_id) DO UPDATE SET \
                 bridge_id = excluded.bridge_id, config = excluded.config, added_at = excluded.added_at",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    link.bridge_id,
                    link.platform,
                    link.native_id,
                    config_text,
                    now as i64,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn unlink_channel(&self, platform: &str, native_id: &str) -> Result<(), BridgeError> {
        let platform = platform.to_owned();
        let native_id = native_id.to_owned();
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM channels WHERE platform = ?1 AND native_id = ?2",
                rusqlite::params![platform, native_id],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_bridge_status(
        &self,
        bridge_id: &str,
        status: BridgeStatus,
    ) -> Result<(), BridgeError> {
        let bridge_id = bridge_id.to_owned();
        let status_str = status.as_str();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE bridges SET status = ?1 WHERE id = ?2",
                rusqlite::params![status_str, bridge_id],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_bridges(&self) -> Result<Vec<Bridge>, BridgeError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, status, created_at FROM bridges ORDER BY created_at ASC")?;
            let rows = stmt.query_map([], |row| {
                let status: String = row.get(2)?;
                Ok(Bridge {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    status: BridgeStatus::parse(&status),
                    created_at: row.get::<_, i64>(3)? as u64,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
    }

    async fn get_kv(&self, key: &str) -> Result<Option<String>, BridgeError> {
        let key = key.to_owned();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get(0),
            )
            .optional()
        })
        .await
    }

    async fn set_kv(&self, key: &str, value: &str) -> Result<(), BridgeError> {
        let key = key.to_owned();
        let value = value.to_owned();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO kv_store (key, value) VALUES (?1, ?2) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                rusqlite::params![key, value],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_kv(&self, key: &str) -> Result<(), BridgeError> {
        let key = key.to_owned();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM kv_store WHERE key = ?1", rusqlite::params![key])?;
            Ok(())
        })
        .await
    }
}

/// In-memory [`TopologyRepository`] for fast unit tests that don't need to
/// exercise the SQLite schema itself.
#[derive(Default)]
pub struct InMemoryTopologyRepository {
    bridges: Mutex<HashMap<String, Bridge>>,
    channels: Mutex<HashMap<(String, String), ChannelLink>>,
    kv: Mutex<HashMap<String, String>>,
}

impl InMemoryTopologyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TopologyRepository for InMemoryTopologyRepository {
    async fn get_channel_link(
        &self,
        platform: &str,
        native_id: &str,
    ) -> Result<Option<ChannelLinkStatus>, BridgeError> {
        let channels = self.channels.lock().await;
        let Some(link) = channels.get(&(platform.to_owned(), native_id.to_owned())) else {
            return Ok(None);
        };
        let bridges = self.bridges.lock().await;
        let status = bridges.get(&link.bridge_id).map(|b| b.status).unwrap_or(BridgeStatus::Off);
        Ok(Some(ChannelLinkStatus { bridge_id: link.bridge_id.clone(), status }))
    }

    async fn get_bridge_topology(&self, bridge_id: &str) -> Vec<ChannelLink> {
        let channels = self.channels.lock().await;
        let mut links: Vec<ChannelLink> =
            channels.values().filter(|c| c.bridge_id == bridge_id).cloned().collect();
        links.sort_by_key(|c| c.added_at);
        links
    }

    async fn create_bridge(&self, name: &str) -> Result<String, BridgeError> {
        let id = Uuid::new_v4().to_string();
        self.bridges.lock().await.insert(
            id.clone(),
            Bridge { id: id.clone(), name: name.to_owned(), status: BridgeStatus::On, created_at: epoch_ms() },
        );
        Ok(id)
    }

    async fn link_channel_to_bridge(&self, link: LinkChannel) -> Result<(), BridgeError> {
        self.channels.lock().await.insert(
            (link.platform.clone(), link.native_id.clone()),
            ChannelLink {
                bridge_id: link.bridge_id,
                platform: link.platform,
                native_id: link.native_id,
                config: link.config,
                added_at: epoch_ms(),
            },
        );
        Ok(())
    }

    async fn unlink_channel(&self, platform: &str, native_id: &str) -> Result<(), BridgeError> {
        self.channels.lock().await.remove(&(platform.to_owned(), native_id.to_owned()));
        Ok(())
    }

    async fn update_bridge_status(
        &self,
        bridge_id: &str,
        status: BridgeStatus,
    ) -> Result<(), BridgeError> {
        if let Some(bridge) = self.bridges.lock().await.get_mut(bridge_id) {
            bridge.status = status;
        }
        Ok(())
    }

    async fn list_bridges(&self) -> Result<Vec<Bridge>, BridgeError> {
        let mut bridges: Vec<Bridge> = self.bridges.lock().await.values().cloned().collect();
        bridges.sort_by_key(|b| b.created_at);
        Ok(bridges)
    }

    async fn get_kv(&self, key: &str) -> Result<Option<String>, BridgeError> {
        Ok(self.kv.lock().await.get(key).cloned())
    }

    async fn set_kv(&self, key: &str, value: &str) -> Result<(), BridgeError> {
        self.kv.lock().await.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn delete_kv(&self, key: &str) -> Result<(), BridgeError> {
        self.kv.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[path = "repository_tests.rs"]
mod tests;
