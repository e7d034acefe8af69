//! HTTP API of a storage server
//!
//! - `POST /write`: store the request body as a new object, `201 {"id": ...}`
//! - `GET /read/:id`: raw bytes of an object
//! - `GET /status`: volume id, needle count, data-log size

use crate::common::tracing_middleware::request_id_middleware;
use crate::common::{format_bytes, Error, ObjectId, Result};
use crate::volume::store::{Store, StoreStats};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct VolumeState {
    pub store: Arc<Store>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteResponse {
    pub id: ObjectId,
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeStatus {
    #[serde(flatten)]
    pub stats: StoreStats,
    pub data_size: String,
}

/// Run a blocking store call off the async executor
async fn blocking<T, F>(state: &VolumeState, f: F) -> Result<T>
where
    F: FnOnce(&Store) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || f(&store)).await?
}

async fn write_object(State(state): State<VolumeState>, body: Bytes) -> Result<Response> {
    let size = body.len();
    let id = blocking(&state, move |store| store.write(&body)).await?;
    tracing::debug!("Stored object {} ({} bytes)", id, size);
    Ok((StatusCode::CREATED, Json(WriteResponse { id })).into_response())
}

async fn read_object(State(state): State<VolumeState>, Path(id): Path<String>) -> Result<Response> {
    let id: ObjectId = id.parse()?;
    let data = blocking(&state, move |store| store.read(&id)).await?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        data,
    )
        .into_response())
}

async fn status(State(state): State<VolumeState>) -> Result<Json<VolumeStatus>> {
    let stats = blocking(&state, |store| store.stats()).await?;
    Ok(Json(VolumeStatus {
        data_size: format_bytes(stats.data_bytes),
        stats,
    }))
}

async fn fallback() -> Error {
    Error::NotFound("no such route".into())
}

pub fn create_router(state: VolumeState, max_blob_size: usize) -> Router {
    Router::new()
        .route("/write", post(write_object))
        .route("/read/:id", get(read_object))
        .route("/status", get(status))
        .fallback(fallback)
        .layer(DefaultBodyLimit::max(max_blob_size))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
