//! Public HTTP API
//!
//! - `POST /write`: place the body on a volume chosen by the directory,
//!   `201 {"id": "<volume-id>:<object-id>"}`
//! - `GET /read/:fat_id`: fetch an object from the volume that holds it

use crate::common::tracing_middleware::{request_id_middleware, REQUEST_ID_HEADER};
use crate::common::{Error, FatId, Result};
use crate::coordinator::DirectoryClient;
use crate::volume::http::WriteResponse;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct GatewayState {
    pub directory: DirectoryClient,
    pub http: reqwest::Client,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayWriteResponse {
    pub id: String,
}

/// URL of `path` on the storage server at `address`
pub fn volume_url(address: &str, path: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        format!("{}{}", address.trim_end_matches('/'), path)
    } else {
        format!("http://{}{}", address, path)
    }
}

fn forwarded_request_id(headers: &HeaderMap) -> Option<HeaderValue> {
    headers.get(REQUEST_ID_HEADER).cloned()
}

async fn write_object(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let (volume_id, address) = state.directory.assign_volume().await?;

    let mut request = state.http.post(volume_url(&address, "/write")).body(body);
    if let Some(content_type) = headers.get(header::CONTENT_TYPE) {
        request = request.header(header::CONTENT_TYPE, content_type.clone());
    }
    if let Some(request_id) = forwarded_request_id(&headers) {
        request = request.header(REQUEST_ID_HEADER, request_id);
    }

    let response = request.send().await.map_err(|e| {
        tracing::warn!("Write to volume {} at {} failed: {}", volume_id, address, e);
        Error::Network(format!("could not write to volume server: {}", e))
    })?;
    if response.status() != reqwest::StatusCode::CREATED {
        tracing::warn!(
            "Volume {} at {} answered write with {}",
            volume_id,
            address,
            response.status()
        );
        return Err(Error::Http(format!(
            "volume server failed to store data ({})",
            response.status()
        )));
    }

    let written: WriteResponse = response
        .json()
        .await
        .map_err(|e| Error::Internal(format!("invalid response from volume server: {}", e)))?;

    let fat_id = FatId::new(volume_id, written.id);
    tracing::debug!("Stored {} on {}", fat_id, address);
    Ok((
        StatusCode::CREATED,
        Json(GatewayWriteResponse {
            id: fat_id.to_string(),
        }),
    )
        .into_response())
}

async fn read_object(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Path(fat_id): Path<String>,
) -> Result<Response> {
    let fat_id: FatId = fat_id.parse()?;

    let address = match state.directory.get_volume_location(&fat_id.volume).await {
        Ok(address) => address,
        Err(Error::NotFound(_)) => {
            return Err(Error::NotFound(format!("volume {}", fat_id.volume)))
        }
        Err(e) => {
            tracing::warn!("Directory lookup for {} failed: {}", fat_id.volume, e);
            return Err(Error::Unavailable("directory is unavailable".into()));
        }
    };

    let mut request = state
        .http
        .get(volume_url(&address, &format!("/read/{}", fat_id.object)));
    if let Some(request_id) = forwarded_request_id(&headers) {
        request = request.header(REQUEST_ID_HEADER, request_id);
    }
    let response = request.send().await.map_err(|e| {
        tracing::warn!("Read from volume {} at {} failed: {}", fat_id.volume, address, e);
        Error::Network(format!("could not read from volume server: {}", e))
    })?;

    match response.status() {
        reqwest::StatusCode::OK => {}
        reqwest::StatusCode::NOT_FOUND => {
            return Err(Error::NotFound(format!("object {}", fat_id)))
        }
        status => {
            return Err(Error::Http(format!(
                "volume server answered read with {}",
                status
            )))
        }
    }

    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    let data = response
        .bytes()
        .await
        .map_err(|e| Error::Network(format!("reading volume response: {}", e)))?;

    Ok(([(header::CONTENT_TYPE, content_type)], data).into_response())
}

pub fn create_router(state: GatewayState, max_blob_size: usize) -> Router {
    Router::new()
        .route("/write", post(write_object))
        .route("/read/:fat_id", get(read_object))
        .layer(DefaultBodyLimit::max(max_blob_size))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
