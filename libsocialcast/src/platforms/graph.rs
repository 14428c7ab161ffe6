//! Facebook Graph API helpers shared by the Facebook and Instagram adapters

use reqwest::{Response, StatusCode};
use serde_json::Value;

use crate::error::PlatformError;
use crate::platforms::http::{self, transport_error, truncate_body};
use crate::types::PlatformId;

pub const GRAPH_API_BASE: &str = "https://graph.facebook.com/v19.0";

/// Map a Graph API error body to a platform error
///
/// The Graph API reports most failures with HTTP 400 and a numeric
/// `error.code`, so the code decides the category when it is known.
pub fn graph_error(
    platform: PlatformId,
    context: &str,
    status: StatusCode,
    body: &str,
) -> PlatformError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));

    let code = error.and_then(|e| e.get("code")).and_then(Value::as_i64);
    let message = error
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    let kind = error
        .and_then(|e| e.get("type"))
        .and_then(Value::as_str)
        .unwrap_or("");

    let name = platform.display_name();
    let detail = format!("{} {}: {} (code {})", name, context, message, code.unwrap_or(0));

    match code {
        Some(102) | Some(190) => PlatformError::Authentication(format!(
            "{}. Suggestion: the access token expired or was revoked; re-run the {} setup.",
            detail, platform
        )),
        Some(4) | Some(17) | Some(32) | Some(613) => PlatformError::RateLimit(detail),
        Some(10) | Some(200..=299) => PlatformError::Permission(format!(
            "{}. Suggestion: grant pages_manage_posts / instagram_content_publish to the app.",
            detail
        )),
        _ if kind == "OAuthException" && status.as_u16() == 400 => {
            PlatformError::Authentication(detail)
        }
        _ => http::status_error(platform, context, status, body),
    }
}

/// Read a Graph API response as JSON
pub async fn read_graph_json(
    platform: PlatformId,
    context: &str,
    response: Response,
) -> Result<Value, PlatformError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(platform, context, e))?;

    parse_graph_body(platform, context, status, &body)
}

/// Interpret a Graph API status and body already read off the wire
pub fn parse_graph_body(
    platform: PlatformId,
    context: &str,
    status: StatusCode,
    body: &str,
) -> Result<Value, PlatformError> {
    if !status.is_success() {
        return Err(graph_error(platform, context, status, body));
    }

    serde_json::from_str(body).map_err(|e| {
        PlatformError::MalformedResponse(format!(
            "{} {}: invalid JSON ({}): {}",
            platform.display_name(),
            context,
            e,
            truncate_body(body)
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(code: i64, kind: &str) -> String {
        format!(
            r#"{{"error": {{"message": "msg", "type": "{}", "code": {}}}}}"#,
            kind, code
        )
    }

    #[test]
    fn test_graph_codes() {
        let p = PlatformId::Facebook;
        let bad = StatusCode::BAD_REQUEST;
        assert!(matches!(
            graph_error(p, "post", bad, &body(190, "OAuthException")),
            PlatformError::Authentication(_)
        ));
        assert!(matches!(
            graph_error(p, "post", bad, &body(32, "OAuthException")),
            PlatformError::RateLimit(_)
        ));
        assert!(matches!(
            graph_error(p, "post", StatusCode::FORBIDDEN, &body(200, "OAuthException")),
            PlatformError::Permission(_)
        ));
        assert!(matches!(
            graph_error(p, "post", bad, &body(1, "OAuthException")),
            PlatformError::Authentication(_)
        ));
        assert!(matches!(
            graph_error(p, "post", bad, &body(100, "GraphMethodException")),
            PlatformError::Validation(_)
        ));
    }

    #[test]
    fn test_non_json_body_falls_back_to_status() {
        let err = graph_error(
            PlatformId::Instagram,
            "publish",
            StatusCode::SERVICE_UNAVAILABLE,
            "<html>",
        );
        assert!(matches!(err, PlatformError::Network(_)));
    }

    #[test]
    fn test_message_names_platform_and_step() {
        let err = graph_error(
            PlatformId::Instagram,
            "create media container",
            StatusCode::BAD_REQUEST,
            &body(17, "OAuthException"),
        );
        assert!(err.to_string().contains("Instagram create media container: msg (code 17)"));
    }

    #[test]
    fn test_invalid_json_keeps_raw_body() {
        let err = parse_graph_body(
            PlatformId::Facebook,
            "post to feed",
            StatusCode::OK,
            "<html>Temporarily unavailable</html>",
        )
        .unwrap_err();

        match err {
            PlatformError::MalformedResponse(msg) => {
                assert!(msg.starts_with("Facebook post to feed: invalid JSON"));
                assert!(msg.ends_with("<html>Temporarily unavailable</html>"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_success_body_parses() {
        let value =
            parse_graph_body(PlatformId::Instagram, "publish", StatusCode::OK, r#"{"id": "9"}"#)
                .unwrap();
        assert_eq!(value["id"], "9");
    }
}
