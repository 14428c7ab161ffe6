//! Instagram publishing through the Graph API content publishing flow
//!
//! Instagram only accepts media that is reachable by URL, so a post runs in
//! three steps:
//! 1. host the file by uploading it unpublished to the linked Facebook page
//!    and reading back its CDN URL
//! 2. create a media container for that URL with the caption
//! 3. publish the container
//!
//! Text-only posts are rejected before any network call.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::credentials::PlatformCredential;
use crate::error::PlatformError;
use crate::platforms::graph::{read_graph_json, GRAPH_API_BASE};
use crate::platforms::http::{require_id, transport_error};
use crate::platforms::{PlatformAdapter, PublishRequest, Published};
use crate::types::{MediaAttachment, PlatformId};

const PLATFORM: PlatformId = PlatformId::Instagram;

/// The three publishing steps, named in error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstagramStep {
    HostMedia,
    CreateContainer,
    PublishContainer,
}

impl InstagramStep {
    pub fn describe(&self) -> &'static str {
        match self {
            InstagramStep::HostMedia => "Step 1 (host media)",
            InstagramStep::CreateContainer => "Step 2 (create media container)",
            InstagramStep::PublishContainer => "Step 3 (publish container)",
        }
    }

    fn fail(self, error: PlatformError) -> PlatformError {
        error.with_context(&format!("{} failed", self.describe()))
    }
}

/// Graph API calls used by [`InstagramAdapter`]
#[async_trait]
pub trait InstagramApi: Send + Sync {
    /// Upload `media` unpublished and return its public URL
    async fn host_media(
        &self,
        credential: &PlatformCredential,
        media: &MediaAttachment,
    ) -> Result<String, PlatformError>;

    /// Create a media container and return its id
    async fn create_container(
        &self,
        credential: &PlatformCredential,
        media_url: &str,
        is_video: bool,
        caption: &str,
    ) -> Result<String, PlatformError>;

    /// Publish a container and return the Instagram media id
    async fn publish_container(
        &self,
        credential: &PlatformCredential,
        container_id: &str,
    ) -> Result<String, PlatformError>;
}

pub struct InstagramAdapter {
    api: Box<dyn InstagramApi>,
}

impl InstagramAdapter {
    pub fn new(api: Box<dyn InstagramApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PlatformAdapter for InstagramAdapter {
    fn platform(&self) -> PlatformId {
        PLATFORM
    }

    fn requires_media(&self) -> bool {
        true
    }

    async fn try_publish(
        &self,
        request: &PublishRequest,
        credential: &PlatformCredential,
    ) -> Result<Published, PlatformError> {
        let media = request.single_media(PLATFORM).ok_or_else(|| {
            PlatformError::MediaRequired(
                "Instagram requires media (image or video) for all posts.".to_string(),
            )
        })?;

        if credential.account_id.trim().is_empty() {
            return Err(PlatformError::Authentication(
                "Instagram credential has no business account id. Run the instagram setup again."
                    .to_string(),
            ));
        }

        let media_url = self
            .api
            .host_media(credential, media)
            .await
            .map_err(|e| InstagramStep::HostMedia.fail(e))?;
        tracing::debug!("Instagram media hosted");

        let container_id = self
            .api
            .create_container(credential, &media_url, media.is_video(), &request.content)
            .await
            .map_err(|e| InstagramStep::CreateContainer.fail(e))?;
        tracing::debug!(container_id = %container_id, "Instagram container created");

        let media_id = self
            .api
            .publish_container(credential, &container_id)
            .await
            .map_err(|e| InstagramStep::PublishContainer.fail(e))?;

        Ok(Published::new(media_id))
    }
}

/// Pick the hosted image URL from a `?fields=images` response
pub fn hosted_image_url(body: &Value) -> Option<String> {
    body.pointer("/images/0/source")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// [`InstagramApi`] over HTTP
pub struct GraphInstagramApi {
    client: Client,
    base_url: String,
}

impl GraphInstagramApi {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, GRAPH_API_BASE)
    }

    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl InstagramApi for GraphInstagramApi {
    async fn host_media(
        &self,
        credential: &PlatformCredential,
        media: &MediaAttachment,
    ) -> Result<String, PlatformError> {
        let token = credential.access_token.expose();

        let context = "upload unpublished photo";
        let form = reqwest::multipart::Form::new()
            .text("published", "false")
            .text("access_token", token.to_string())
            .part("source", media.to_part()?);
        let response = self
            .client
            .post(format!("{}/me/photos", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error(PLATFORM, context, e))?;
        let body = read_graph_json(PLATFORM, context, response).await?;
        let photo_id = require_id(PLATFORM, context, &body, "/id")?;

        let context = "read hosted photo URL";
        let response = self
            .client
            .get(format!("{}/{}", self.base_url, photo_id))
            .query(&[("fields", "images"), ("access_token", token)])
            .send()
            .await
            .map_err(|e| transport_error(PLATFORM, context, e))?;
        let body = read_graph_json(PLATFORM, context, response).await?;

        hosted_image_url(&body).ok_or_else(|| {
            PlatformError::MalformedResponse(format!(
                "Instagram {}: response has no images[0].source: {}",
                context, body
            ))
        })
    }

    async fn create_container(
        &self,
        credential: &PlatformCredential,
        media_url: &str,
        is_video: bool,
        caption: &str,
    ) -> Result<String, PlatformError> {
        let context = "create media container";
        let mut params = vec![
            ("caption", caption),
            ("access_token", credential.access_token.expose()),
        ];
        if is_video {
            params.push(("media_type", "VIDEO"));
            params.push(("video_url", media_url));
        } else {
            params.push(("image_url", media_url));
        }

        let response = self
            .client
            .post(format!("{}/{}/media", self.base_url, credential.account_id))
            .form(&params)
            .send()
            .await
            .map_err(|e| transport_error(PLATFORM, context, e))?;
        let body = read_graph_json(PLATFORM, context, response).await?;
        require_id(PLATFORM, context, &body, "/id")
    }

    async fn publish_container(
        &self,
        credential: &PlatformCredential,
        container_id: &str,
    ) -> Result<String, PlatformError> {
        let context = "publish media container";
        let response = self
            .client
            .post(format!("{}/{}/media_publish", self.base_url, credential.account_id))
            .form(&[
                ("creation_id", container_id),
                ("access_token", credential.access_token.expose()),
            ])
            .send()
            .await
            .map_err(|e| transport_error(PLATFORM, context, e))?;
        let body = read_graph_json(PLATFORM, context, response).await?;
        require_id(PLATFORM, context, &body, "/id")
    }
}
