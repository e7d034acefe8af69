//! HTTP API for the directory
//!
//! - `POST /volumes`: register a volume (with or without heartbeat handshake)
//! - `POST /assign`: pick a volume for a new write
//! - `GET /volumes/:id`: resolve a volume to its serving address
//! - `GET /status`: every known server record

use crate::common::tracing_middleware::request_id_middleware;
use crate::common::{Result, VolumeId};
use crate::coordinator::directory::{Directory, ServerRecord};
use crate::coordinator::liveness::LivenessMonitor;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct CoordState {
    pub directory: Arc<Directory>,
    pub liveness: Arc<LivenessMonitor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterVolumeRequest {
    pub volume_id: VolumeId,
    pub address: String,
    /// When present, the directory dials this address and monitors the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_addr: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignVolumeResponse {
    pub volume_id: VolumeId,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeLocationResponse {
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub placement: String,
    pub servers: Vec<ServerRecord>,
}

async fn register_volume(
    State(state): State<CoordState>,
    Json(req): Json<RegisterVolumeRequest>,
) -> Result<Json<serde_json::Value>> {
    match req.heartbeat_addr {
        Some(heartbeat_addr) => {
            state
                .liveness
                .register(req.volume_id, req.address, heartbeat_addr)
                .await?
        }
        None => {
            state.liveness.forget(&req.volume_id);
            state.directory.register_volume(req.volume_id, req.address)?
        }
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn assign_volume(State(state): State<CoordState>) -> Result<Json<AssignVolumeResponse>> {
    let (volume_id, address) = state.directory.assign_volume()?;
    tracing::debug!("Assigned volume {} at {}", volume_id, address);
    Ok(Json(AssignVolumeResponse { volume_id, address }))
}

async fn volume_location(
    State(state): State<CoordState>,
    Path(id): Path<String>,
) -> Result<Json<VolumeLocationResponse>> {
    let id: VolumeId = id.parse()?;
    let address = state.directory.get_volume_location(&id)?;
    Ok(Json(VolumeLocationResponse { address }))
}

async fn status(State(state): State<CoordState>) -> Result<Json<StatusResponse>> {
    Ok(Json(StatusResponse {
        placement: state.directory.placement_name().to_string(),
        servers: state.directory.servers()?,
    }))
}

pub fn create_router(state: CoordState) -> Router {
    Router::new()
        .route("/volumes", post(register_volume))
        .route("/volumes/:id", get(volume_location))
        .route("/assign", post(assign_volume))
        .route("/status", get(status))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
