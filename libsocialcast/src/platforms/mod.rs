//! Platform abstraction and implementations
//!
//! Each platform gets one [`PlatformAdapter`] that turns a [`PublishRequest`]
//! into that platform's HTTP calls. Adapters report failures as
//! [`PlatformError`] from [`try_publish`](PlatformAdapter::try_publish); the
//! provided [`publish`](PlatformAdapter::publish) method turns every outcome
//! into a normalized [`PublishResult`] so callers never see an error escape.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use libsocialcast::credentials::{CredentialResolver, PlatformCredential};
//! use libsocialcast::platforms::{AdapterRegistry, PublishRequest};
//! use libsocialcast::{Config, PlatformId};
//!
//! # async fn example() -> libsocialcast::Result<()> {
//! let config = Config::default();
//! let credentials = Arc::new(CredentialResolver::from_config(&config, None));
//! let registry = AdapterRegistry::with_defaults(&config, credentials)?;
//! let credential = PlatformCredential::new(PlatformId::Facebook, "1234567890", "page-token");
//!
//! if let Some(adapter) = registry.get(PlatformId::Facebook) {
//!     let result = adapter
//!         .publish(&PublishRequest::new("Hello from Socialcast"), &credential)
//!         .await;
//!     println!("{}", result.message);
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::credentials::PlatformCredential;
use crate::error::PlatformError;
use crate::types::{MediaAttachment, PlatformId, PublishResult};

pub mod facebook;
pub mod graph;
pub mod http;
pub mod instagram;
pub mod oauth1;
pub mod pinterest;
pub mod registry;
pub mod tumblr;
pub mod x;

// Mock platform is available for all builds (not just tests) to support integration tests
pub mod mock;

pub use registry::AdapterRegistry;

/// Content and media for one publish attempt
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    pub content: String,
    pub media: Vec<MediaAttachment>,
}

impl PublishRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            media: Vec::new(),
        }
    }

    pub fn with_media(mut self, media: MediaAttachment) -> Self {
        self.media.push(media);
        self
    }

    pub fn has_media(&self) -> bool {
        !self.media.is_empty()
    }

    /// The attachment used by platforms that take a single media file
    ///
    /// Extra attachments are logged and ignored.
    pub fn single_media(&self, platform: PlatformId) -> Option<&MediaAttachment> {
        if self.media.len() > 1 {
            tracing::warn!(
                platform = %platform,
                count = self.media.len(),
                "Platform accepts one media file per post; using the first"
            );
        }
        self.media.first()
    }
}

/// What a successful publish produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub post_id: String,
    pub url: Option<String>,
    /// Extra detail appended to the success message
    pub note: Option<String>,
}

impl Published {
    pub fn new(post_id: impl Into<String>) -> Self {
        Self {
            post_id: post_id.into(),
            url: None,
            note: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Uniform publishing interface implemented once per platform
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Platform served by this adapter
    fn platform(&self) -> PlatformId;

    /// Whether a post without media must be rejected before any network call
    fn requires_media(&self) -> bool {
        false
    }

    /// Perform the platform-specific publish calls
    ///
    /// # Errors
    ///
    /// Returns the [`PlatformError`] category matching the failure: missing or
    /// rejected credentials are `Authentication`, HTTP 429 is `RateLimit`, a
    /// response without the expected id is `MalformedResponse`, and so on.
    async fn try_publish(
        &self,
        request: &PublishRequest,
        credential: &PlatformCredential,
    ) -> Result<Published, PlatformError>;

    /// Publish and normalize the outcome
    ///
    /// Media-required and credential mismatches are caught here, before any
    /// network call.
    async fn publish(
        &self,
        request: &PublishRequest,
        credential: &PlatformCredential,
    ) -> PublishResult {
        let platform = self.platform();
        let name = platform.display_name();

        let outcome = if self.requires_media() && !request.has_media() {
            Err(PlatformError::MediaRequired(format!(
                "{} requires media (image or video) for all posts. \
                 Text-only posts are not supported.",
                name
            )))
        } else if credential.platform != platform {
            Err(PlatformError::Authentication(format!(
                "{} credentials cannot be used to post to {}",
                credential.platform.display_name(),
                name
            )))
        } else if credential.access_token.is_empty() {
            Err(PlatformError::Authentication(format!(
                "{} access token is empty. Run the {} setup again.",
                name, platform
            )))
        } else {
            self.try_publish(request, credential).await
        };

        match outcome {
            Ok(published) => {
                let mut message = format!("Posted to {} (id {})", name, published.post_id);
                if let Some(url) = &published.url {
                    message.push_str(&format!(": {}", url));
                }
                if let Some(note) = &published.note {
                    message.push_str(&format!(". {}", note));
                }
                tracing::info!(platform = %platform, post_id = %published.post_id, "Published");
                PublishResult::published(message, Some(published.post_id))
            }
            Err(error) => {
                tracing::warn!(
                    platform = %platform,
                    kind = error.kind(),
                    transient = error.is_transient(),
                    error = %error,
                    "Publish failed"
                );
                PublishResult::failed(format!("{} post failed: {}", name, error), error)
            }
        }
    }
}
