//! dbt Cloud job client
//!
//! Implements JobClient for the dbt Cloud v2 API: trigger a job run, then
//! read the run (with its steps) until it finishes.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use serde_json::{Value, json};

use crate::client::JobClient;
use crate::client::http::{required_id, send_json};
use crate::domain::{DbtRunState, JobTrigger, RawStatus, RunHandle, RunStatus};
use crate::error::{JobError, Result};

/// dbt Cloud API base URL
pub const DBT_API_URL: &str = "https://cloud.getdbt.com/api/v2";

/// Configuration for the dbt Cloud client
#[derive(Debug, Clone)]
pub struct DbtConfig {
    pub base_url: String,
    pub account_id: String,
    pub timeout: Duration,
}

impl DbtConfig {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            base_url: DBT_API_URL.to_string(),
            account_id: account_id.into(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn account_url(&self) -> String {
        format!("{}/accounts/{}", self.base_url.trim_end_matches('/'), self.account_id)
    }
}

/// dbt Cloud API client
pub struct DbtClient {
    client: Client,
    token: String,
    config: DbtConfig,
}

impl DbtClient {
    /// Create a client with an API token
    pub fn new(token: impl Into<String>, config: DbtConfig) -> Result<Self> {
        if config.account_id.trim().is_empty() {
            return Err(JobError::Config("dbt account id is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| JobError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            token: token.into(),
            config,
        })
    }

    fn auth_header(&self) -> String {
        format!("Token {}", self.token)
    }

    fn run_url(&self, run_id: &str) -> String {
        format!("{}/runs/{}/", self.config.account_url(), run_id)
    }

    fn trigger_url(&self, job_id: &str) -> String {
        format!("{}/jobs/{}/run/", self.config.account_url(), job_id)
    }
}

#[async_trait]
impl JobClient for DbtClient {
    async fn trigger(&self, trigger: &JobTrigger) -> Result<RunHandle> {
        let job_id = trigger.target_id.trim();
        if job_id.is_empty() {
            return Err(JobError::NotFound("dbt job id is empty".to_string()));
        }

        info!("Triggering dbt job {} on account {}", job_id, self.config.account_id);

        let request = self
            .client
            .post(self.trigger_url(job_id))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .json(&json!({ "cause": trigger.cause }));

        let body = send_json(request).await?;
        let run_id = required_id(&body, "/data/id")?;

        info!("dbt run {} started successfully", run_id);
        Ok(RunHandle::new(run_id))
    }

    async fn poll_status(&self, handle: &RunHandle) -> Result<RunStatus> {
        let request = self
            .client
            .get(self.run_url(&handle.run_id))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .query(&[("include_related", "[\"run_steps\"]")]);

        let body = send_json(request).await?;
        let status = normalize_run(&body)?;

        let label = match status.raw_code {
            RawStatus::Code(code) => DbtRunState::from_code(code).map(|s| s.label()).unwrap_or("Unknown"),
            RawStatus::Text(_) => "Unknown",
        };
        info!("dbt job status: {} - {}", status.raw_code, label);
        debug!("dbt run {} complete: {}", handle.run_id, status.is_complete);
        Ok(status)
    }

    async fn check_connection(&self) -> Result<()> {
        let request = self
            .client
            .get(format!("{}/jobs/", self.config.account_url()))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .query(&[("limit", "1")]);

        send_json(request).await?;
        info!("Got dbt job list for account {}", self.config.account_id);
        Ok(())
    }

    fn name(&self) -> &str {
        "dbt"
    }
}

impl std::fmt::Debug for DbtClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbtClient")
            .field("base_url", &self.config.base_url)
            .field("account_id", &self.config.account_id)
            .finish()
    }
}

/// Normalize a dbt Cloud run payload into a RunStatus.
///
/// Prefers the `is_complete`/`is_error`/`is_cancelled` booleans and falls
/// back to the numeric status code when they are absent.
pub fn normalize_run(body: &Value) -> Result<RunStatus> {
    let data = body
        .get("data")
        .filter(|d| d.is_object())
        .ok_or_else(|| JobError::MalformedResponse("dbt run response has no data object".to_string()))?;

    let code = data.get("status").and_then(Value::as_i64);
    let state = code.and_then(DbtRunState::from_code);
    let flag = |name: &str| data.get(name).and_then(Value::as_bool);

    let (is_complete, mut is_error, mut is_cancelled) = match flag("is_complete") {
        Some(complete) => (
            complete,
            flag("is_error").unwrap_or(false),
            flag("is_cancelled").unwrap_or(false),
        ),
        None => match state {
            Some(state) => (
                state.is_terminal(),
                state == DbtRunState::Error,
                state == DbtRunState::Cancelled,
            ),
            None => {
                return Err(JobError::MalformedResponse(
                    "dbt run response has neither completion flags nor a status code".to_string(),
                ));
            }
        },
    };

    if !is_complete && (is_error || is_cancelled) {
        warn!(
            "dbt run still running but reports error={} cancelled={} (status {:?}); clearing both",
            is_error, is_cancelled, code
        );
        is_error = false;
        is_cancelled = false;
    }

    if is_complete && !is_error && !is_cancelled {
        if let Some(code) = code.filter(|c| *c != DbtRunState::Success.code()) {
            warn!(
                "dbt run reports complete without error or cancel, but status code is {}; treating as failure",
                code
            );
            is_error = true;
        }
    }

    let failed_steps = if is_complete && is_error {
        failed_step_names(data)
    } else {
        Vec::new()
    };

    Ok(RunStatus {
        raw_code: code.map(RawStatus::Code).unwrap_or_else(|| RawStatus::from("unknown")),
        is_complete,
        is_error,
        is_cancelled,
        status_message: data
            .get("status_message")
            .and_then(Value::as_str)
            .map(str::to_string),
        failed_steps,
    })
}

/// Names of steps whose status is anything other than Success.
fn failed_step_names(data: &Value) -> Vec<String> {
    let success = DbtRunState::Success.code();
    data.get("run_steps")
        .and_then(Value::as_array)
        .map(|steps| {
            steps
                .iter()
                .enumerate()
                .filter(|(_, step)| step.get("status").and_then(Value::as_i64) != Some(success))
                .map(|(i, step)| {
                    step.get("name")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("step {}", i + 1))
                })
                .collect()
        })
        .unwrap_or_default()
}
