//! Mock platform implementation for testing
//!
//! A configurable adapter that can succeed, fail with any [`PlatformError`],
//! panic, or stall. Every call is recorded so tests can check what the
//! scheduler or posting service handed over, without credentials or network
//! access.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::credentials::PlatformCredential;
use crate::error::PlatformError;
use crate::platforms::{PlatformAdapter, PublishRequest, Published};
use crate::types::PlatformId;

/// What the mock does when asked to publish
#[derive(Debug, Clone)]
pub enum MockBehavior {
    Succeed { post_id: String },
    Fail(PlatformError),
    Panic(String),
}

/// One recorded publish call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub content: String,
    pub media_filenames: Vec<String>,
    pub account_id: String,
}

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub platform: PlatformId,
    pub behavior: MockBehavior,
    pub requires_media: bool,
    /// Delay before completing (simulates network latency)
    pub delay: Duration,
    pub calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockConfig {
    pub fn new(platform: PlatformId) -> Self {
        Self {
            platform,
            behavior: MockBehavior::Succeed {
                post_id: format!("mock-{}-1", platform),
            },
            requires_media: platform == PlatformId::Instagram,
            delay: Duration::from_millis(0),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock adapter; clones share the call log
#[derive(Debug, Clone)]
pub struct MockPlatform {
    config: MockConfig,
}

impl MockPlatform {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// Always succeeds with a generated post id
    pub fn success(platform: PlatformId) -> Self {
        Self::new(MockConfig::new(platform))
    }

    /// Always succeeds with `post_id`
    pub fn success_with_id(platform: PlatformId, post_id: &str) -> Self {
        let mut config = MockConfig::new(platform);
        config.behavior = MockBehavior::Succeed {
            post_id: post_id.to_string(),
        };
        Self::new(config)
    }

    /// Always fails with `error`
    pub fn failure(platform: PlatformId, error: PlatformError) -> Self {
        let mut config = MockConfig::new(platform);
        config.behavior = MockBehavior::Fail(error);
        Self::new(config)
    }

    /// Panics inside `try_publish`
    pub fn panicking(platform: PlatformId, message: &str) -> Self {
        let mut config = MockConfig::new(platform);
        config.behavior = MockBehavior::Panic(message.to_string());
        Self::new(config)
    }

    pub fn with_delay(platform: PlatformId, delay: Duration) -> Self {
        let mut config = MockConfig::new(platform);
        config.delay = delay;
        Self::new(config)
    }

    pub fn call_count(&self) -> usize {
        self.calls().len()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        match self.config.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl PlatformAdapter for MockPlatform {
    fn platform(&self) -> PlatformId {
        self.config.platform
    }

    fn requires_media(&self) -> bool {
        self.config.requires_media
    }

    async fn try_publish(
        &self,
        request: &PublishRequest,
        credential: &PlatformCredential,
    ) -> Result<Published, PlatformError> {
        {
            let call = RecordedCall {
                content: request.content.clone(),
                media_filenames: request.media.iter().map(|m| m.filename.clone()).collect(),
                account_id: credential.account_id.clone(),
            };
            match self.config.calls.lock() {
                Ok(mut calls) => calls.push(call),
                Err(poisoned) => poisoned.into_inner().push(call),
            }
        }

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        match &self.config.behavior {
            MockBehavior::Succeed { post_id } => Ok(Published::new(post_id.clone())),
            MockBehavior::Fail(error) => Err(error.clone()),
            MockBehavior::Panic(message) => panic!("{}", message),
        }
    }
}
