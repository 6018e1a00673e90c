//! HTTP response classification shared by every vendor client
//!
//! Turns a status code and body into the JobError taxonomy. Kept free of any
//! vendor-specific URLs so each client only decides what to send.

use std::time::Duration;

use log::{debug, error};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::Value;

use crate::error::{JobError, Result};

/// Send a request and return the parsed JSON body of a 2xx response.
pub async fn send_json(request: RequestBuilder) -> Result<Value> {
    let response = request.send().await?;
    read_json(response).await
}

/// Read a response, mapping non-2xx statuses onto JobError.
pub async fn read_json(response: Response) -> Result<Value> {
    let status = response.status();
    let retry_after = parse_retry_after(&response);
    let body = response.text().await?;

    if !status.is_success() {
        error!("Error: {} - {}", status.as_u16(), body);
        return Err(classify_error(status, &body, retry_after));
    }

    debug!("Response {}: {} bytes", status.as_u16(), body.len());
    parse_body(&body)
}

/// Parse a 2xx body. Non-JSON is a malformed response, not an API error.
pub fn parse_body(body: &str) -> Result<Value> {
    serde_json::from_str(body)
        .map_err(|e| JobError::MalformedResponse(format!("invalid JSON body: {}", e)))
}

fn parse_retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Map a non-2xx status and body onto the error taxonomy.
pub fn classify_error(status: StatusCode, body: &str, retry_after: Option<Duration>) -> JobError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(api_message)
        .unwrap_or_else(|| body.trim().to_string());
    let vendor_code = parsed
        .as_ref()
        .and_then(|v| v.get("code"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    if vendor_code.starts_with("NotFound") {
        return JobError::NotFound(message);
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => JobError::Auth(message),
        StatusCode::NOT_FOUND => JobError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => JobError::RateLimited { retry_after },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            JobError::Timeout(format!("{}: {}", status, message))
        }
        s if s.is_client_error() => JobError::BadRequest(message),
        s => JobError::UnknownApi {
            status: s.as_u16(),
            body: body.to_string(),
        },
    }
}

/// Human-readable message from an error body. Fivetran uses `message`,
/// dbt Cloud nests it under `status.user_message`.
fn api_message(body: &Value) -> Option<String> {
    body.get("message")
        .and_then(Value::as_str)
        .or_else(|| body.pointer("/status/user_message").and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Required string-or-number field, as a string.
pub fn required_id(body: &Value, pointer: &str) -> Result<String> {
    match body.pointer(pointer) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(JobError::MalformedResponse(format!("missing {} in response", pointer))),
    }
}
