//! Posting service for immediate and scheduled posts
//!
//! Immediate posts go straight to the adapters and are never stored.
//! Scheduled posts become one queue row per platform for the scheduler to
//! pick up later, which needs persistence to be enabled.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::credentials::{CredentialLookup, CredentialResolver};
use crate::db::PostStore;
use crate::error::{ConfigError, PlatformError};
use crate::platforms::{AdapterRegistry, PublishRequest};
use crate::types::{MediaAttachment, NewPost, PlatformId, PublishResult};
use crate::{Result, SocialcastError};

/// Result of an immediate post on one platform
#[derive(Debug, Clone)]
pub struct PlatformPublishResult {
    pub platform: PlatformId,
    pub result: PublishResult,
}

/// Posting service
///
/// Cheap to clone; every collaborator is shared.
#[derive(Clone)]
pub struct PostingService {
    registry: Arc<AdapterRegistry>,
    credentials: Arc<CredentialResolver>,
    store: Option<Arc<dyn PostStore>>,
    persistence_enabled: bool,
    media_dir: Option<PathBuf>,
}

impl PostingService {
    pub fn new(registry: Arc<AdapterRegistry>, credentials: Arc<CredentialResolver>) -> Self {
        Self {
            registry,
            credentials,
            store: None,
            persistence_enabled: false,
            media_dir: None,
        }
    }

    /// Attach the post queue; scheduling is only allowed when `persistence_enabled`
    pub fn with_store(mut self, store: Arc<dyn PostStore>, persistence_enabled: bool) -> Self {
        self.store = Some(store);
        self.persistence_enabled = persistence_enabled;
        self
    }

    /// Copy scheduled media into `dir` so the queue does not depend on the original file
    pub fn with_media_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.media_dir = Some(dir.into());
        self
    }

    /// Service wired the way `config` describes
    pub fn from_config(
        config: &Config,
        registry: Arc<AdapterRegistry>,
        credentials: Arc<CredentialResolver>,
        store: Option<Arc<dyn PostStore>>,
    ) -> Self {
        let mut service =
            Self::new(registry, credentials).with_media_dir(config.media.expanded_dir());
        if let Some(store) = store {
            service = service.with_store(store, config.persistence_enabled());
        }
        service
    }

    pub fn can_schedule(&self) -> bool {
        self.persistence_enabled && self.store.is_some()
    }

    /// Publish to every platform concurrently, without persisting anything
    ///
    /// Always returns one result per requested platform, in request order.
    pub async fn publish_now(
        &self,
        platforms: &[PlatformId],
        content: &str,
        media: Vec<MediaAttachment>,
    ) -> Vec<PlatformPublishResult> {
        let mut request = PublishRequest::new(content);
        request.media = media;
        let request = &request;

        let futures = platforms.iter().map(|&platform| async move {
            let result = self.publish_one(platform, request).await;
            PlatformPublishResult { platform, result }
        });

        join_all(futures).await
    }

    async fn publish_one(&self, platform: PlatformId, request: &PublishRequest) -> PublishResult {
        let Some(adapter) = self.registry.get(platform) else {
            let message = format!("No adapter registered for {}", platform.display_name());
            return PublishResult::failed(message.clone(), PlatformError::Posting(message));
        };

        match self.credentials.resolve(platform).await {
            CredentialLookup::Found { credential, source } => {
                debug!(platform = %platform, source = %source, "Publishing immediately");
                adapter.publish(request, &credential).await
            }
            missing => {
                let message = missing.describe_missing(platform);
                PublishResult::failed(message.clone(), PlatformError::Authentication(message))
            }
        }
    }

    /// Queue a post for each platform and return the new post ids
    ///
    /// # Errors
    ///
    /// Fails with a configuration error when persistence is disabled, and
    /// with `InvalidInput` for empty content, no platforms, a missing media
    /// file, or a media-only platform without media.
    pub async fn schedule_post(
        &self,
        platforms: &[PlatformId],
        content: &str,
        media_path: Option<&Path>,
        when: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let store = match (&self.store, self.persistence_enabled) {
            (Some(store), true) => store,
            _ => {
                return Err(ConfigError::PersistenceDisabled(
                    "scheduling requires the database; set USE_DATABASE=true".to_string(),
                )
                .into())
            }
        };

        validate_post(content, platforms)?;

        if media_path.is_none() {
            if let Some(platform) = platforms
                .iter()
                .find(|p| self.registry.get(**p).map(|a| a.requires_media()).unwrap_or(false))
            {
                return Err(SocialcastError::InvalidInput(format!(
                    "{} requires media (image or video)",
                    platform.display_name()
                )));
            }
        }

        let stored_media = match media_path {
            Some(path) => Some(self.store_media(path)?),
            None => None,
        };

        let mut ids = Vec::with_capacity(platforms.len());
        for &platform in platforms {
            let post = NewPost::scheduled(platform, content, stored_media.clone(), when);
            let id = store.insert(&post).await?;
            info!(post_id = %id, platform = %platform, scheduled_time = %when, "Post scheduled");
            ids.push(id);
        }
        Ok(ids)
    }

    /// Copy `path` into the media directory, returning the stored location
    fn store_media(&self, path: &Path) -> Result<PathBuf> {
        if !path.is_file() {
            return Err(SocialcastError::InvalidInput(format!(
                "Media file not found: {}",
                path.display()
            )));
        }

        let Some(dir) = &self.media_dir else {
            return Ok(std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()));
        };

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "media".to_string());
        let prefix = uuid::Uuid::new_v4().simple().to_string();
        let target = dir.join(format!("{}-{}", &prefix[..8], filename));

        std::fs::create_dir_all(dir).map_err(|e| {
            SocialcastError::InvalidInput(format!(
                "Cannot create media directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        std::fs::copy(path, &target).map_err(|e| {
            SocialcastError::InvalidInput(format!(
                "Cannot copy {} to {}: {}",
                path.display(),
                target.display(),
                e
            ))
        })?;

        debug!(from = %path.display(), to = %target.display(), "Stored media for scheduled post");
        Ok(target)
    }
}

/// Reject posts that no platform would accept
pub fn validate_post(content: &str, platforms: &[PlatformId]) -> Result<()> {
    if content.trim().is_empty() {
        return Err(SocialcastError::InvalidInput(
            "Content cannot be empty".to_string(),
        ));
    }
    if platforms.is_empty() {
        return Err(SocialcastError::InvalidInput(
            "Select at least one platform".to_string(),
        ));
    }
    Ok(())
}
