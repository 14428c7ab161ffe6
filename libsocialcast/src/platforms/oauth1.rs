//! OAuth 1.0a request signing (HMAC-SHA1)
//!
//! Tumblr signs every call this way and X still requires it for the v1.1
//! media upload endpoint. Only the query string and form-encoded body
//! parameters take part in the signature; multipart bodies do not.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha1::Sha1;

use crate::error::PlatformError;

type HmacSha1 = Hmac<Sha1>;

/// Consumer and user key material for one signed request
pub struct OAuth1Keys<'a> {
    pub consumer_key: &'a str,
    pub consumer_secret: &'a str,
    pub token: &'a str,
    pub token_secret: &'a str,
}

/// RFC 3986 percent-encoding (everything but unreserved characters)
fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Split a URL into its signature base URL and decoded query parameters
fn split_url(url: &str) -> Result<(String, Vec<(String, String)>), PlatformError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| PlatformError::Validation(format!("Invalid URL '{}': {}", url, e)))?;

    let query: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut base = parsed;
    base.set_query(None);
    base.set_fragment(None);
    Ok((base.to_string(), query))
}

/// Compute the `oauth_signature` value
pub fn sign(
    method: &str,
    url: &str,
    params: &[(String, String)],
    keys: &OAuth1Keys<'_>,
    nonce: &str,
    timestamp: u64,
) -> Result<String, PlatformError> {
    let (base_url, query) = split_url(url)?;

    let mut all: Vec<(String, String)> = oauth_params(keys, nonce, timestamp);
    all.extend(query);
    all.extend(params.iter().cloned());

    let mut encoded: Vec<(String, String)> = all
        .iter()
        .map(|(k, v)| (encode(k), encode(v)))
        .collect();
    encoded.sort();

    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let base_string = format!(
        "{}&{}&{}",
        method.to_uppercase(),
        encode(&base_url),
        encode(&param_string)
    );
    let signing_key = format!(
        "{}&{}",
        encode(keys.consumer_secret),
        encode(keys.token_secret)
    );

    let mut mac = HmacSha1::new_from_slice(signing_key.as_bytes())
        .map_err(|e| PlatformError::Authentication(format!("Invalid OAuth signing key: {}", e)))?;
    mac.update(base_string.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn oauth_params(keys: &OAuth1Keys<'_>, nonce: &str, timestamp: u64) -> Vec<(String, String)> {
    vec![
        ("oauth_consumer_key".to_string(), keys.consumer_key.to_string()),
        ("oauth_nonce".to_string(), nonce.to_string()),
        ("oauth_signature_method".to_string(), "HMAC-SHA1".to_string()),
        ("oauth_timestamp".to_string(), timestamp.to_string()),
        ("oauth_token".to_string(), keys.token.to_string()),
        ("oauth_version".to_string(), "1.0".to_string()),
    ]
}

/// Build an `Authorization` header value with an explicit nonce and timestamp
pub fn authorization_header_with(
    method: &str,
    url: &str,
    params: &[(String, String)],
    keys: &OAuth1Keys<'_>,
    nonce: &str,
    timestamp: u64,
) -> Result<String, PlatformError> {
    let signature = sign(method, url, params, keys, nonce, timestamp)?;

    let mut header_params = oauth_params(keys, nonce, timestamp);
    header_params.push(("oauth_signature".to_string(), signature));
    header_params.sort();

    let fields = header_params
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!("OAuth {}", fields))
}

/// Build an `Authorization` header value for a request made now
pub fn authorization_header(
    method: &str,
    url: &str,
    params: &[(String, String)],
    keys: &OAuth1Keys<'_>,
) -> Result<String, PlatformError> {
    let timestamp = chrono::Utc::now().timestamp().max(0) as u64;
    authorization_header_with(method, url, params, keys, &generate_nonce(), timestamp)
}
