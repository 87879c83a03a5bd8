//! ==============================================================================
//! shadow.rs - device shadow client
//! ==============================================================================
//!
//! purpose:
//!     fetches the current reported state of one device from the cloud iotda
//!     "show device shadow" api. one request per call, no retries: a failed
//!     fetch is returned as a FetchError and the caller decides what to skip.
//!
//! relationships:
//!     - used by: poller.rs (write path), server.rs (live /api/data)
//!     - returns: domain::Snapshot
//!
//! auth:
//!     request signing is not done here. the client sends an already-issued
//!     iam token in X-Auth-Token (see config.rs for where it comes from).
//!
//! ==============================================================================

use crate::config::DeviceConfig;
use crate::domain::Snapshot;
use crate::error::FetchError;
use std::future::Future;
use std::time::Duration;

/// error bodies are cut to this many chars before they reach the logs
const MAX_ERROR_BODY: usize = 256;

/// anything that can hand back a device snapshot
pub trait ShadowSource: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<Snapshot, FetchError>> + Send;
}

#[derive(Clone)]
pub struct IotdaShadowClient {
    http: reqwest::Client,
    url: String,
    instance_id: Option<String>,
    token: Option<String>,
}

impl IotdaShadowClient {
    pub fn new(device: &DeviceConfig, timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: shadow_url(&device.endpoint, &device.project_id, &device.device_id),
            instance_id: device
                .instance_id
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            token: device.auth_token.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ShadowSource for IotdaShadowClient {
    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        let token = self.token.as_deref().ok_or(FetchError::MissingCredentials)?;

        let mut request = self.http.get(&self.url).header("X-Auth-Token", token);
        if let Some(instance_id) = &self.instance_id {
            request = request.header("Instance-Id", instance_id);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

fn shadow_url(endpoint: &str, project_id: &str, device_id: &str) -> String {
    format!(
        "{}/v5/iot/{}/devices/{}/shadow",
        endpoint.trim().trim_end_matches('/'),
        project_id.trim(),
        device_id.trim()
    )
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
