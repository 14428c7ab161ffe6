//! Lookup from platform id to its adapter

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::credentials::CredentialResolver;
use crate::error::Result;
use crate::platforms::facebook::{FacebookAdapter, GraphFacebookApi};
use crate::platforms::http::build_client;
use crate::platforms::instagram::{GraphInstagramApi, InstagramAdapter};
use crate::platforms::pinterest::{HttpPinterestApi, PinterestAdapter};
use crate::platforms::tumblr::{HttpTumblrApi, TumblrAdapter};
use crate::platforms::x::{HttpXApi, XAdapter};
use crate::platforms::PlatformAdapter;
use crate::types::PlatformId;

/// Adapters keyed by the platform they serve
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: BTreeMap<PlatformId, Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    /// Empty registry; tests fill it with mocks
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the five HTTP adapters configured from `config`
    ///
    /// Tokens refreshed while publishing are saved through `credentials`.
    pub fn with_defaults(config: &Config, credentials: Arc<CredentialResolver>) -> Result<Self> {
        let client = build_client(Duration::from_secs(config.http.timeout_secs.max(1)))?;
        let platforms = &config.platforms;

        let mut registry = Self::new();
        registry.register(Arc::new(FacebookAdapter::new(Box::new(
            GraphFacebookApi::new(client.clone()),
        ))));
        registry.register(Arc::new(InstagramAdapter::new(Box::new(
            GraphInstagramApi::new(client.clone()),
        ))));
        registry.register(Arc::new(PinterestAdapter::new(
            Box::new(HttpPinterestApi::new(client.clone())),
            platforms.pinterest.board_id.clone(),
        )));
        registry.register(Arc::new(TumblrAdapter::new(
            Box::new(HttpTumblrApi::new(client.clone())),
            platforms.tumblr.client_id.clone(),
            platforms.tumblr.client_secret.clone(),
        )));
        registry.register(Arc::new(
            XAdapter::from_settings(Box::new(HttpXApi::new(client)), &platforms.x)
                .with_token_store(credentials),
        ));

        Ok(registry)
    }

    /// Add or replace the adapter for its platform
    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>) {
        let platform = adapter.platform();
        if self.adapters.insert(platform, adapter).is_some() {
            tracing::debug!(platform = %platform, "Replaced registered adapter");
        }
    }

    pub fn get(&self, platform: PlatformId) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(&platform).cloned()
    }

    pub fn platforms(&self) -> Vec<PlatformId> {
        self.adapters.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
