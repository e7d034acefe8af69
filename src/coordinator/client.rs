//! HTTP client for the directory
//!
//! Constructed explicitly and handed to whatever needs it (gateway, volume
//! server); there is no process-wide instance.

use crate::common::{Error, Result, VolumeId};
use crate::coordinator::http::{
    AssignVolumeResponse, RegisterVolumeRequest, StatusResponse, VolumeLocationResponse,
};
use reqwest::StatusCode;
use std::time::Duration;

#[derive(Clone)]
pub struct DirectoryClient {
    base_url: String,
    http: reqwest::Client,
}

impl DirectoryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, http))
    }

    pub fn with_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn register_volume(
        &self,
        volume_id: VolumeId,
        address: &str,
        heartbeat_addr: Option<&str>,
    ) -> Result<()> {
        let req = RegisterVolumeRequest {
            volume_id,
            address: address.to_string(),
            heartbeat_addr: heartbeat_addr.map(str::to_string),
        };
        let resp = self
            .http
            .post(format!("{}/volumes", self.base_url))
            .json(&req)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    pub async fn assign_volume(&self) -> Result<(VolumeId, String)> {
        let resp = self
            .http
            .post(format!("{}/assign", self.base_url))
            .send()
            .await?;
        let body: AssignVolumeResponse = check(resp).await?.json().await?;
        Ok((body.volume_id, body.address))
    }

    pub async fn get_volume_location(&self, volume_id: &VolumeId) -> Result<String> {
        let resp = self
            .http
            .get(format!("{}/volumes/{}", self.base_url, volume_id))
            .send()
            .await?;
        let body: VolumeLocationResponse = check(resp).await?.json().await?;
        Ok(body.address)
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        let resp = self
            .http
            .get(format!("{}/status", self.base_url))
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }
}

/// Map a non-success directory response back onto an error kind
async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let message = resp
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|v| v["error"].as_str().map(str::to_string))
        .unwrap_or_else(|| status.to_string());

    Err(match status {
        StatusCode::NOT_FOUND => Error::NotFound(message),
        StatusCode::SERVICE_UNAVAILABLE => Error::Unavailable(message),
        StatusCode::BAD_REQUEST => Error::InvalidArgument(message),
        StatusCode::BAD_GATEWAY => Error::Network(message),
        _ => Error::Http(format!("directory returned {}: {}", status, message)),
    })
}
