//! X (Twitter) publishing
//!
//! Tweets are created through the v2 API with the OAuth 2.0 bearer token held
//! in the credential. Media still goes through the v1.1 upload endpoint,
//! which only accepts OAuth 1.0a user signatures, so each attachment is
//! uploaded separately first. An upload that fails is logged and left out;
//! the tweet is still posted with whatever media made it.
//!
//! A bearer token the API rejects is refreshed once with the stored refresh
//! token. The new token pair is saved through the [`CredentialResolver`] and
//! the tweet is retried with it.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::PlatformSettings;
use crate::credentials::{CredentialResolver, PlatformCredential, SecretToken};
use crate::error::PlatformError;
use crate::platforms::http::{read_json, require_id, transport_error};
use crate::platforms::oauth1::{authorization_header, OAuth1Keys};
use crate::platforms::{PlatformAdapter, PublishRequest, Published};
use crate::types::{MediaAttachment, PlatformId};

const PLATFORM: PlatformId = PlatformId::X;

pub const MEDIA_UPLOAD_URL: &str = "https://upload.twitter.com/1.1/media/upload.json";
pub const TWEETS_URL: &str = "https://api.x.com/2/tweets";
pub const TOKEN_URL: &str = "https://api.x.com/2/oauth2/token";

/// Most media items one tweet can reference
pub const MAX_MEDIA_PER_TWEET: usize = 4;

/// Tokens returned by the OAuth 2.0 refresh grant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedTokens {
    pub access_token: SecretToken,
    /// X rotates refresh tokens; `None` keeps the old one
    pub refresh_token: Option<SecretToken>,
}

/// Parse a token endpoint response
pub fn tokens_from_response(body: &Value) -> Result<RefreshedTokens, PlatformError> {
    let token = |key: &str| {
        body.get(key)
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(SecretToken::new)
    };

    let access_token = token("access_token").ok_or_else(|| {
        PlatformError::MalformedResponse(
            "X refresh access token: response has no 'access_token'".to_string(),
        )
    })?;
    Ok(RefreshedTokens {
        access_token,
        refresh_token: token("refresh_token"),
    })
}

/// The X endpoints a publish touches
#[async_trait]
pub trait XApi: Send + Sync {
    /// Upload one media item with an OAuth 1.0a signature; returns the media id
    async fn upload_media(
        &self,
        media: &MediaAttachment,
        keys: &OAuth1Keys<'_>,
    ) -> Result<String, PlatformError>;

    /// Create a tweet with the OAuth 2.0 bearer token; returns the tweet id
    async fn create_tweet(
        &self,
        bearer_token: &str,
        text: &str,
        media_ids: &[String],
    ) -> Result<String, PlatformError>;

    /// Exchange a refresh token for a new token pair
    async fn refresh_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<RefreshedTokens, PlatformError>;
}

/// JSON body for `POST /2/tweets`
pub fn tweet_body(text: &str, media_ids: &[String]) -> Value {
    let mut body = json!({ "text": text });
    if !media_ids.is_empty() {
        body["media"] = json!({ "media_ids": media_ids });
    }
    body
}

/// [`XApi`] over HTTP
pub struct HttpXApi {
    client: Client,
    upload_url: String,
    tweets_url: String,
    token_url: String,
}

impl HttpXApi {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            upload_url: MEDIA_UPLOAD_URL.to_string(),
            tweets_url: TWEETS_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
        }
    }
}

#[async_trait]
impl XApi for HttpXApi {
    async fn upload_media(
        &self,
        media: &MediaAttachment,
        keys: &OAuth1Keys<'_>,
    ) -> Result<String, PlatformError> {
        let context = "upload media";
        let auth = authorization_header("POST", &self.upload_url, &[], keys)?;
        let form = reqwest::multipart::Form::new().part("media", media.to_part()?);

        let response = self
            .client
            .post(&self.upload_url)
            .header(reqwest::header::AUTHORIZATION, auth)
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error(PLATFORM, context, e))?;
        let body = read_json(PLATFORM, context, response).await?;
        require_id(PLATFORM, context, &body, "/media_id_string")
            .or_else(|_| require_id(PLATFORM, context, &body, "/media_id"))
    }

    async fn create_tweet(
        &self,
        bearer_token: &str,
        text: &str,
        media_ids: &[String],
    ) -> Result<String, PlatformError> {
        let context = "create tweet";
        let response = self
            .client
            .post(&self.tweets_url)
            .bearer_auth(bearer_token)
            .json(&tweet_body(text, media_ids))
            .send()
            .await
            .map_err(|e| transport_error(PLATFORM, context, e))?;
        let body = read_json(PLATFORM, context, response).await?;
        require_id(PLATFORM, context, &body, "/data/id")
    }

    async fn refresh_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<RefreshedTokens, PlatformError> {
        let context = "refresh access token";
        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(client_id, Some(client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", client_id),
            ])
            .send()
            .await
            .map_err(|e| transport_error(PLATFORM, context, e))?;
        let body = read_json(PLATFORM, context, response).await?;
        tokens_from_response(&body)
    }
}

/// OAuth 1.0a key material for media uploads
#[derive(Clone, Default)]
struct UploadKeys {
    consumer_key: Option<String>,
    consumer_secret: Option<String>,
    token: Option<String>,
    token_secret: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

pub struct XAdapter {
    api: Box<dyn XApi>,
    keys: UploadKeys,
    client_id: Option<String>,
    client_secret: Option<String>,
    token_store: Option<Arc<CredentialResolver>>,
}

impl XAdapter {
    /// Adapter with explicit consumer keys and optional fallback user token
    pub fn new(
        api: Box<dyn XApi>,
        consumer_key: Option<String>,
        consumer_secret: Option<String>,
        token: Option<String>,
        token_secret: Option<String>,
    ) -> Self {
        Self {
            api,
            keys: UploadKeys {
                consumer_key: non_empty(&consumer_key),
                consumer_secret: non_empty(&consumer_secret),
                token: non_empty(&token),
                token_secret: non_empty(&token_secret),
            },
            client_id: None,
            client_secret: None,
            token_store: None,
        }
    }

    /// OAuth 2.0 app credentials used to refresh expired bearer tokens
    pub fn with_oauth2_client(
        mut self,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Self {
        self.client_id = non_empty(&client_id);
        self.client_secret = non_empty(&client_secret);
        self
    }

    /// Where refreshed tokens are saved
    pub fn with_token_store(mut self, store: Arc<CredentialResolver>) -> Self {
        self.token_store = Some(store);
        self
    }

    /// Consumer keys from `api_key`/`api_secret` (falling back to the OAuth 2.0
    /// client id and secret); `access_token`/`access_token_secret` are the
    /// fallback OAuth 1.0a user token
    pub fn from_settings(api: Box<dyn XApi>, settings: &PlatformSettings) -> Self {
        Self::new(
            api,
            non_empty(&settings.api_key).or_else(|| non_empty(&settings.client_id)),
            non_empty(&settings.api_secret).or_else(|| non_empty(&settings.client_secret)),
            settings.access_token.clone(),
            settings.access_token_secret.clone(),
        )
        .with_oauth2_client(settings.client_id.clone(), settings.client_secret.clone())
    }

    /// Refresh the bearer token once, saving the new pair
    ///
    /// `reason` is the rejection that triggered the refresh; it stays in the
    /// error when the refresh itself fails.
    async fn refresh_credential(
        &self,
        credential: &PlatformCredential,
        reason: String,
    ) -> Result<PlatformCredential, PlatformError> {
        let (Some(client_id), Some(client_secret), Some(refresh_token)) = (
            self.client_id.as_deref(),
            self.client_secret.as_deref(),
            credential.refresh_token.as_ref().filter(|t| !t.is_empty()),
        ) else {
            return Err(PlatformError::Authentication(reason));
        };

        tracing::info!("X rejected the access token, refreshing it");
        let tokens = self
            .api
            .refresh_token(client_id, client_secret, refresh_token.expose())
            .await
            .map_err(|e| {
                PlatformError::Authentication(format!("{}. Token refresh failed: {}", reason, e))
            })?;

        let mut refreshed = credential.clone();
        refreshed.access_token = tokens.access_token;
        if let Some(next) = tokens.refresh_token {
            refreshed.refresh_token = Some(next);
        }

        match &self.token_store {
            Some(store) => match store.save(&refreshed).await {
                Ok(location) => {
                    tracing::info!(location = %location, "Saved refreshed X credentials")
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Could not save refreshed X credentials")
                }
            },
            None => tracing::debug!("No credential store attached; refreshed token not saved"),
        }

        Ok(refreshed)
    }

    /// Signing keys for uploads; the credential's own OAuth 1.0a pair wins
    fn upload_keys<'a>(&'a self, credential: &'a PlatformCredential) -> Option<OAuth1Keys<'a>> {
        let consumer_key = self.keys.consumer_key.as_deref()?;
        let consumer_secret = self.keys.consumer_secret.as_deref()?;

        let (token, token_secret) = match &credential.oauth1 {
            Some(pair) if !pair.token.is_empty() && !pair.secret.is_empty() => {
                (pair.token.expose(), pair.secret.expose())
            }
            _ => (self.keys.token.as_deref()?, self.keys.token_secret.as_deref()?),
        };

        Some(OAuth1Keys {
            consumer_key,
            consumer_secret,
            token,
            token_secret,
        })
    }

    /// Upload every attachment, keeping the ids that succeeded
    async fn upload_all(
        &self,
        media: &[MediaAttachment],
        credential: &PlatformCredential,
    ) -> Vec<String> {
        if media.is_empty() {
            return Vec::new();
        }

        let Some(keys) = self.upload_keys(credential) else {
            tracing::warn!(
                count = media.len(),
                "Missing OAuth 1.0a credentials for X media upload; set X_API_KEY, X_API_SECRET, \
                 X_ACCESS_TOKEN and X_ACCESS_TOKEN_SECRET. Posting without media"
            );
            return Vec::new();
        };

        if media.len() > MAX_MEDIA_PER_TWEET {
            tracing::warn!(
                count = media.len(),
                max = MAX_MEDIA_PER_TWEET,
                "Too many media items for one tweet; extra items are dropped"
            );
        }

        let mut media_ids = Vec::new();
        for item in media.iter().take(MAX_MEDIA_PER_TWEET) {
            match self.api.upload_media(item, &keys).await {
                Ok(id) => {
                    tracing::debug!(file = %item.filename, media_id = %id, "Uploaded media to X");
                    media_ids.push(id);
                }
                Err(e) => {
                    tracing::warn!(
                        file = %item.filename,
                        error = %e,
                        "X media upload failed, skipping"
                    );
                }
            }
        }
        media_ids
    }
}

#[async_trait]
impl PlatformAdapter for XAdapter {
    fn platform(&self) -> PlatformId {
        PLATFORM
    }

    async fn try_publish(
        &self,
        request: &PublishRequest,
        credential: &PlatformCredential,
    ) -> Result<Published, PlatformError> {
        let media_ids = self.upload_all(&request.media, credential).await;

        let text = &request.content;
        let tweet_id = match self
            .api
            .create_tweet(credential.access_token.expose(), text, &media_ids)
            .await
        {
            Ok(id) => id,
            Err(PlatformError::Authentication(reason)) => {
                let refreshed = self.refresh_credential(credential, reason).await?;
                self.api
                    .create_tweet(refreshed.access_token.expose(), text, &media_ids)
                    .await?
            }
            Err(e) => return Err(e),
        };

        let mut published = Published::new(tweet_id.clone())
            .with_url(format!("https://x.com/i/web/status/{}", tweet_id));
        if request.has_media() {
            published = published.with_note(format!(
                "{} of {} media attached",
                media_ids.len(),
                request.media.len()
            ));
        }
        Ok(published)
    }
}
