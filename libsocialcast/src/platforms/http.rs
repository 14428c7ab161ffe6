//! HTTP plumbing shared by the platform adapters
//!
//! Turns transport failures, non-success statuses and unexpected bodies into
//! [`PlatformError`] values so each adapter only deals with its own endpoints.

use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;

use crate::error::PlatformError;
use crate::types::PlatformId;

/// Longest slice of a response body kept in error messages
const MAX_BODY_IN_ERROR: usize = 500;

/// Build the HTTP client shared by all adapters
pub fn build_client(timeout: Duration) -> Result<Client, PlatformError> {
    Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(90))
        .user_agent(concat!("socialcast/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PlatformError::Network(format!("Failed to create HTTP client: {}", e)))
}

/// Map a reqwest error raised while sending or reading a request
pub fn transport_error(platform: PlatformId, context: &str, err: reqwest::Error) -> PlatformError {
    if err.is_timeout() {
        PlatformError::Network(format!(
            "{} {}: request timed out",
            platform.display_name(),
            context
        ))
    } else if err.is_decode() {
        PlatformError::MalformedResponse(format!(
            "{} {}: could not decode response: {}",
            platform.display_name(),
            context,
            err
        ))
    } else {
        PlatformError::Network(format!("{} {}: {}", platform.display_name(), context, err))
    }
}

/// Pull the human-readable message out of a platform error body
///
/// Understands the Graph API (`error.message`), Pinterest (`message`),
/// X (`detail`, `errors[0].message`) and Tumblr (`meta.msg`, `errors[0].detail`) shapes.
pub fn extract_error_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    [
        "/error/message",
        "/message",
        "/detail",
        "/errors/0/message",
        "/errors/0/detail",
        "/meta/msg",
        "/error_description",
        "/title",
    ]
    .iter()
    .find_map(|pointer| json.pointer(pointer).and_then(Value::as_str))
    .map(str::to_string)
}

/// `body` capped for inclusion in an error message
pub fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_BODY_IN_ERROR {
        body.to_string()
    } else {
        let head: String = body.chars().take(MAX_BODY_IN_ERROR).collect();
        format!("{}...", head)
    }
}

/// Map a non-success HTTP status to a platform error
pub fn status_error(
    platform: PlatformId,
    context: &str,
    status: StatusCode,
    body: &str,
) -> PlatformError {
    let name = platform.display_name();
    let detail = extract_error_message(body).unwrap_or_else(|| truncate_body(body));

    match status.as_u16() {
        401 => PlatformError::Authentication(format!(
            "{} {}: {} (HTTP 401). Suggestion: re-run the {} setup to refresh the access token.",
            name, context, detail, platform
        )),
        403 => PlatformError::Permission(format!(
            "{} {}: {} (HTTP 403). Suggestion: check the app's granted scopes.",
            name, context, detail
        )),
        429 => PlatformError::RateLimit(format!(
            "{} {}: {} (HTTP 429). Suggestion: wait before posting again.",
            name, context, detail
        )),
        400 | 422 => PlatformError::Validation(format!(
            "{} {}: {} (HTTP {})",
            name,
            context,
            detail,
            status.as_u16()
        )),
        code if status.is_server_error() => PlatformError::Network(format!(
            "{} {}: server error {}: {}",
            name, context, code, detail
        )),
        code => PlatformError::Posting(format!(
            "{} {}: unexpected HTTP {}: {}",
            name, context, code, detail
        )),
    }
}

/// Read a response as JSON, mapping failures
pub async fn read_json(
    platform: PlatformId,
    context: &str,
    response: Response,
) -> Result<Value, PlatformError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(platform, context, e))?;

    if !status.is_success() {
        return Err(status_error(platform, context, status, &body));
    }

    serde_json::from_str(&body).map_err(|e| {
        PlatformError::MalformedResponse(format!(
            "{} {}: invalid JSON ({}): {}",
            platform.display_name(),
            context,
            e,
            truncate_body(&body)
        ))
    })
}

/// Extract a string (or numeric id) at a JSON pointer, or report a malformed response
pub fn require_id(
    platform: PlatformId,
    context: &str,
    body: &Value,
    pointer: &str,
) -> Result<String, PlatformError> {
    match body.pointer(pointer) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(PlatformError::MalformedResponse(format!(
            "{} {}: response has no '{}': {}",
            platform.display_name(),
            context,
            pointer.trim_start_matches('/').replace('/', "."),
            truncate_body(&body.to_string())
        ))),
    }
}

/// First line of `text`, capped at `max_chars` characters
pub fn first_line(text: &str, max_chars: usize) -> String {
    truncate_chars(text.lines().next().unwrap_or("").trim(), max_chars)
}

/// `text` capped at `max_chars` characters (not bytes)
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
