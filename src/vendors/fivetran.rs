//! Fivetran connector client
//!
//! Fivetran has no run id. A sync is detected as finished when the
//! connector's `succeeded_at` or `failed_at` timestamp moves past the values
//! captured just before triggering; that baseline rides in the RunHandle.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::client::JobClient;
use crate::client::http::send_json;
use crate::domain::{JobTrigger, RawStatus, RunHandle, RunStatus, SyncWatermark};
use crate::error::{JobError, Result};

/// Fivetran REST API base URL
pub const FIVETRAN_API_URL: &str = "https://api.fivetran.com/v1";

const ACCEPT_HEADER: &str = "application/json;version=2";

/// Configuration for the Fivetran client
#[derive(Debug, Clone)]
pub struct FivetranConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for FivetranConfig {
    fn default() -> Self {
        Self {
            base_url: FIVETRAN_API_URL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl FivetranConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

/// Settings that can be changed on a connector. Unset fields are left alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectorUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub historical_sync: Option<bool>,
    #[serde(flatten)]
    pub additional: Map<String, Value>,
}

impl ConnectorUpdate {
    pub fn paused(paused: bool) -> Self {
        Self {
            paused: Some(paused),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.schedule_type.is_none()
            && self.paused.is_none()
            && self.historical_sync.is_none()
            && self.additional.is_empty()
    }
}

/// Fivetran API client
pub struct FivetranClient {
    client: Client,
    api_key: String,
    api_secret: String,
    config: FivetranConfig,
}

impl FivetranClient {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>, config: FivetranConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| JobError::Config(format!("Failed to create HTTP client: {}", e)))?;

        debug!("FivetranClient initialized");
        Ok(Self {
            client,
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            config,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(endpoint))
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .header(reqwest::header::ACCEPT, ACCEPT_HEADER)
    }

    async fn connector_details(&self, connector_id: &str) -> Result<Value> {
        send_json(self.request(Method::GET, &format!("connectors/{}", connector_id))).await
    }

    /// Current success/failure timestamps of a connector.
    pub async fn watermark(&self, connector_id: &str) -> Result<SyncWatermark> {
        let body = self.connector_details(connector_id).await?;
        parse_watermark(connector_data(&body)?)
    }

    /// Change connector settings.
    pub async fn update_connector(&self, connector_id: &str, update: &ConnectorUpdate) -> Result<()> {
        if update.is_empty() {
            error!("No updates to connector were provided");
            return Err(JobError::BadRequest("No updates to connector were provided".to_string()));
        }

        let request = self
            .request(Method::PATCH, &format!("connectors/{}", connector_id))
            .json(update);
        send_json(request).await?;

        info!("Connector {} updated successfully", connector_id);
        Ok(())
    }
}

#[async_trait]
impl JobClient for FivetranClient {
    async fn trigger(&self, trigger: &JobTrigger) -> Result<RunHandle> {
        let connector_id = trigger.target_id.trim();
        if connector_id.is_empty() {
            return Err(JobError::NotFound("Fivetran connector id is empty".to_string()));
        }

        let baseline = if trigger.wait_for_completion {
            info!("Getting connection details for last successful and failed syncs...");
            let baseline = self.watermark(connector_id).await?;
            info!(
                "The last success was {} and the last failure was {}",
                describe(baseline.succeeded_at),
                describe(baseline.failed_at)
            );
            Some(baseline)
        } else {
            None
        };

        let request = self
            .request(Method::POST, &format!("connectors/{}/sync", connector_id))
            .json(&json!({ "force": trigger.force }));
        send_json(request).await?;

        info!("Sync triggered successfully for connector {}", connector_id);
        let handle = RunHandle::new(connector_id);
        Ok(match baseline {
            Some(baseline) => handle.with_watermark(baseline),
            None => handle,
        })
    }

    async fn poll_status(&self, handle: &RunHandle) -> Result<RunStatus> {
        let baseline = handle.watermark.as_ref().ok_or_else(|| {
            JobError::Config(format!("run handle {} has no sync baseline", handle.run_id))
        })?;

        let body = self.connector_details(&handle.run_id).await?;
        let status = normalize_connector(&body, baseline)?;

        debug!(
            "Fivetran connector {} sync_state {} (complete: {})",
            handle.run_id, status.raw_code, status.is_complete
        );
        Ok(status)
    }

    async fn check_connection(&self) -> Result<()> {
        send_json(self.request(Method::GET, "users")).await?;
        info!("Connection Validated");
        Ok(())
    }

    fn name(&self) -> &str {
        "fivetran"
    }
}

impl std::fmt::Debug for FivetranClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FivetranClient")
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

fn describe(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.to_rfc3339()).unwrap_or_else(|| "never".to_string())
}

fn connector_data(body: &Value) -> Result<&Value> {
    body.get("data")
        .filter(|d| d.is_object())
        .ok_or_else(|| JobError::MalformedResponse("connector response has no data object".to_string()))
}

fn parse_timestamp(data: &Value, field: &str) -> Result<Option<DateTime<Utc>>> {
    match data.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| JobError::MalformedResponse(format!("bad {} timestamp {:?}: {}", field, s, e))),
        Some(other) => Err(JobError::MalformedResponse(format!(
            "unexpected {} value: {}",
            field, other
        ))),
    }
}

fn parse_watermark(data: &Value) -> Result<SyncWatermark> {
    Ok(SyncWatermark::new(
        parse_timestamp(data, "succeeded_at")?,
        parse_timestamp(data, "failed_at")?,
    ))
}

/// Normalize a connector payload into a RunStatus relative to `baseline`.
pub fn normalize_connector(body: &Value, baseline: &SyncWatermark) -> Result<RunStatus> {
    let data = connector_data(body)?;
    let current = parse_watermark(data)?;

    let sync_state = data
        .pointer("/status/sync_state")
        .and_then(Value::as_str)
        .unwrap_or("unknown");

    if !current.advanced_since(baseline) {
        return Ok(RunStatus::running(sync_state));
    }

    if current.has_new_failure(baseline) {
        let mut message = format!("Sync failed at {}", describe(current.failed_at));
        if let Some(task) = data
            .pointer("/status/tasks/0/message")
            .and_then(Value::as_str)
        {
            message = format!("{}: {}", message, task);
        }
        return Ok(RunStatus::errored(sync_state, Vec::new()).with_message(message));
    }

    Ok(RunStatus::succeeded(RawStatus::from(sync_state)))
}
