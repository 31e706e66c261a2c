// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The minimal admin/health HTTP surface: explicitly out of core scope per
//! spec.md §1, but carried as an ambient outer surface (every deployment of
//! this shape needs a way to inspect and mutate topology without a direct
//! SQLite connection).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router as AxumRouter};
use serde::{Deserialize, Serialize};

use openchat_bridge::{BridgeError, BridgeStatus, Kernel, LinkChannel};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Map a [`BridgeError`] into the admin surface's HTTP error response,
/// mirroring the teacher's `MuxError::to_http_response` shape.
fn error_response(err: BridgeError) -> (StatusCode, Json<ErrorResponse>) {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ErrorResponse { error: ErrorBody { code: err.as_str().to_owned(), message: err.to_string() } };
    (status, Json(body))
}

pub fn build_router(kernel: Arc<Kernel>) -> AxumRouter {
    AxumRouter::new()
        .route("/health", get(health))
        .route("/api/v1/bridges", get(list_bridges).post(create_bridge))
        .route("/api/v1/bridges/{id}/channels", post(link_channel))
        .route(
            "/api/v1/bridges/{id}/channels/{platform}/{native_id}",
            delete(unlink_channel),
        )
        .route("/api/v1/bridges/{id}/status", patch(update_status))
        .route(
            "/api/v1/kv/{key}",
            get(get_kv).put(put_kv).delete(delete_kv),
        )
        .with_state(kernel)
}

// -- Request/response types ----------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub adapters: usize,
}

#[derive(Debug, Deserialize)]
pub struct CreateBridgeRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct CreateBridgeResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct LinkChannelRequest {
    pub platform: String,
    pub native_id: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct LinkedResponse {
    pub linked: bool,
}

#[derive(Debug, Serialize)]
pub struct UnlinkedResponse {
    pub unlinked: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: BridgeStatus,
}

#[derive(Debug, Serialize)]
pub struct UpdatedResponse {
    pub updated: bool,
}

#[derive(Debug, Deserialize)]
pub struct PutKvRequest {
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct KvResponse {
    pub key: String,
    pub value: Option<String>,
}

// -- Handlers -------------------------------------------------------------------

async fn health(State(kernel): State<Arc<Kernel>>) -> impl IntoResponse {
    Json(HealthResponse { status: "running".to_owned(), adapters: kernel.adapters.len() })
}

async fn list_bridges(State(kernel): State<Arc<Kernel>>) -> impl IntoResponse {
    match kernel.repository.list_bridges().await {
        Ok(bridges) => Ok(Json(bridges)),
        Err(e) => Err(error_response(e)),
    }
}

async fn create_bridge(
    State(kernel): State<Arc<Kernel>>,
    Json(req): Json<CreateBridgeRequest>,
) -> impl IntoResponse {
    if req.name.trim().is_empty() {
        return Err(error_response(BridgeError::InvalidEnvelope("name must not be empty".to_owned())));
    }
    match kernel.repository.create_bridge(&req.name).await {
        Ok(id) => Ok(Json(CreateBridgeResponse { id })),
        Err(e) => Err(error_response(e)),
    }
}

async fn link_channel(
    State(kernel): State<Arc<Kernel>>,
    Path(bridge_id): Path<String>,
    Json(req): Json<LinkChannelRequest>,
) -> impl IntoResponse {
    let link = LinkChannel {
        bridge_id,
        platform: req.platform.trim().to_lowercase(),
        native_id: req.native_id.trim().to_lowercase(),
        config: req.config,
    };
    match kernel.repository.link_channel_to_bridge(link).await {
        Ok(()) => Ok(Json(LinkedResponse { linked: true })),
        Err(e) => Err(error_response(e)),
    }
}

async fn unlink_channel(
    State(kernel): State<Arc<Kernel>>,
    Path((_bridge_id, platform, native_id)): Path<(String, String, String)>,
) -> impl IntoResponse {
    match kernel.repository.unlink_channel(&platform, &native_id).await {
        Ok(()) => Ok(Json(UnlinkedResponse { unlinked: true })),
        Err(e) => Err(error_response(e)),
    }
}

async fn update_status(
    State(kernel): State<Arc<Kernel>>,
    Path(bridge_id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> impl IntoResponse {
    match kernel.repository.update_bridge_status(&bridge_id, req.status).await {
        Ok(()) => Ok(Json(UpdatedResponse { updated: true })),
        Err(e) => Err(error_response(e)),
    }
}

async fn get_kv(State(kernel): State<Arc<Kernel>>, Path(key): Path<String>) -> impl IntoResponse {
    match kernel.repository.get_kv(&key).await {
        Ok(value) => Ok(Json(KvResponse { key, value })),
        Err(e) => Err(error_response(e)),
    }
}

async fn put_kv(
    State(kernel): State<Arc<Kernel>>,
    Path(key): Path<String>,
    Json(req): Json<PutKvRequest>,
) -> impl IntoResponse {
    match kernel.repository.set_kv(&key, &req.value).await {
        Ok(()) => Ok(Json(KvResponse { key, value: Some(req.value) })),
        Err(e) => Err(error_response(e)),
    }
}

async fn delete_kv(State(kernel): State<Arc<Kernel>>, Path(key): Path<String>) -> impl IntoResponse {
    match kernel.repository.delete_kv(&key).await {
        Ok(()) => Ok(Json(KvResponse { key, value: None })),
        Err(e) => Err(error_response(e)),
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
