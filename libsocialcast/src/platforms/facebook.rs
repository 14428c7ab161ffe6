//! Facebook page publishing via the Graph API
//!
//! Text goes to `/{page}/feed`, media to `/{page}/photos` as a multipart
//! upload. A credential without a page id holds a user token; the page and
//! its page token are then discovered through `me/accounts`, or through the
//! business portfolios the user manages when that listing is empty.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::credentials::{PlatformCredential, SecretToken};
use crate::error::PlatformError;
use crate::platforms::graph::{read_graph_json, GRAPH_API_BASE};
use crate::platforms::http::{require_id, transport_error};
use crate::platforms::{PlatformAdapter, PublishRequest, Published};
use crate::types::{MediaAttachment, PlatformId};

const PLATFORM: PlatformId = PlatformId::Facebook;

/// A page the token can publish to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken {
    pub id: String,
    pub name: Option<String>,
    pub access_token: SecretToken,
}

/// Pages with their tokens from a `data` listing; entries without a token are skipped
pub fn pages_from_listing(body: &Value) -> Vec<PageToken> {
    body.get("data")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let id = entry.get("id").and_then(Value::as_str)?;
                    let token = entry.get("access_token").and_then(Value::as_str)?;
                    Some(PageToken {
                        id: id.to_string(),
                        name: entry.get("name").and_then(Value::as_str).map(str::to_string),
                        access_token: SecretToken::new(token),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Ids from a `data` listing
pub fn ids_from_listing(body: &Value) -> Vec<String> {
    body.get("data")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| e.get("id").and_then(Value::as_str).map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Graph API calls used by [`FacebookAdapter`]
#[async_trait]
pub trait FacebookApi: Send + Sync {
    /// Pages listed by `me/accounts`, with their page tokens
    async fn list_pages(&self, user_token: &SecretToken) -> Result<Vec<PageToken>, PlatformError>;

    /// Ids of the business portfolios the user belongs to
    async fn list_businesses(&self, user_token: &SecretToken)
        -> Result<Vec<String>, PlatformError>;

    /// Ids of the pages a business portfolio manages
    async fn list_client_pages(
        &self,
        user_token: &SecretToken,
        business_id: &str,
    ) -> Result<Vec<String>, PlatformError>;

    /// Page token for one page, if the user may publish to it
    async fn page_token(
        &self,
        user_token: &SecretToken,
        page_id: &str,
    ) -> Result<Option<PageToken>, PlatformError>;

    /// Text post to the page feed; returns the post id
    async fn post_text(&self, page: &PageToken, message: &str) -> Result<String, PlatformError>;

    /// Photo post with a caption; returns the post id
    async fn post_photo(
        &self,
        page: &PageToken,
        message: &str,
        media: &MediaAttachment,
    ) -> Result<String, PlatformError>;
}

pub struct FacebookAdapter {
    api: Box<dyn FacebookApi>,
}

impl FacebookAdapter {
    pub fn new(api: Box<dyn FacebookApi>) -> Self {
        Self { api }
    }

    /// Page to publish to, discovering it when the credential holds a user token
    async fn resolve_page(
        &self,
        credential: &PlatformCredential,
    ) -> Result<PageToken, PlatformError> {
        if !credential.account_id.trim().is_empty() {
            return Ok(PageToken {
                id: credential.account_id.clone(),
                name: credential.metadata.display_name.clone(),
                access_token: credential.access_token.clone(),
            });
        }

        tracing::info!("Facebook credential has no page id, discovering pages");
        let pages = self.discover_pages(&credential.access_token).await?;
        let page = pages.into_iter().next().ok_or_else(|| {
            PlatformError::Authentication(
                "No Facebook pages found for this account. Make sure you manage a page \
                 (directly or through a business portfolio) and granted pages_manage_posts."
                    .to_string(),
            )
        })?;

        tracing::info!(page_id = %page.id, "Using discovered Facebook page");
        Ok(page)
    }

    /// Two-tier page lookup: `me/accounts`, then business portfolios
    ///
    /// A portfolio or page that cannot be read is skipped.
    pub async fn discover_pages(
        &self,
        user_token: &SecretToken,
    ) -> Result<Vec<PageToken>, PlatformError> {
        let pages = self.api.list_pages(user_token).await?;
        if !pages.is_empty() {
            return Ok(pages);
        }

        tracing::debug!("me/accounts is empty, checking business portfolios");
        let mut pages = Vec::new();
        for business_id in self.api.list_businesses(user_token).await? {
            let page_ids = match self.api.list_client_pages(user_token, &business_id).await {
                Ok(ids) => ids,
                Err(e) => {
                    tracing::warn!(
                        business_id = %business_id,
                        error = %e,
                        "Skipping business portfolio"
                    );
                    continue;
                }
            };

            for page_id in page_ids {
                match self.api.page_token(user_token, &page_id).await {
                    Ok(Some(page)) => pages.push(page),
                    Ok(None) => {
                        tracing::debug!(page_id = %page_id, "Page listed without a token");
                    }
                    Err(e) => {
                        tracing::warn!(
                            page_id = %page_id,
                            error = %e,
                            "Could not fetch page token"
                        );
                    }
                }
            }
        }

        Ok(pages)
    }
}

#[async_trait]
impl PlatformAdapter for FacebookAdapter {
    fn platform(&self) -> PlatformId {
        PLATFORM
    }

    async fn try_publish(
        &self,
        request: &PublishRequest,
        credential: &PlatformCredential,
    ) -> Result<Published, PlatformError> {
        let page = self.resolve_page(credential).await?;

        let post_id = match request.single_media(PLATFORM) {
            Some(media) => self.api.post_photo(&page, &request.content, media).await?,
            None => self.api.post_text(&page, &request.content).await?,
        };

        let mut published = Published::new(post_id.clone())
            .with_url(format!("https://www.facebook.com/{}", post_id));
        if let Some(name) = &page.name {
            published = published.with_note(format!("Page: {}", name));
        }
        Ok(published)
    }
}

/// [`FacebookApi`] over HTTP
pub struct GraphFacebookApi {
    client: Client,
    base_url: String,
}

impl GraphFacebookApi {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, GRAPH_API_BASE)
    }

    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get(
        &self,
        context: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, PlatformError> {
        let response = self
            .client
            .get(format!("{}/{}", self.base_url, path))
            .query(query)
            .send()
            .await
            .map_err(|e| transport_error(PLATFORM, context, e))?;
        read_graph_json(PLATFORM, context, response).await
    }
}

#[async_trait]
impl FacebookApi for GraphFacebookApi {
    async fn list_pages(&self, user_token: &SecretToken) -> Result<Vec<PageToken>, PlatformError> {
        let query = [
            ("fields", "id,name,access_token"),
            ("access_token", user_token.expose()),
        ];
        let body = self.get("list pages", "me/accounts", &query).await?;
        Ok(pages_from_listing(&body))
    }

    async fn list_businesses(
        &self,
        user_token: &SecretToken,
    ) -> Result<Vec<String>, PlatformError> {
        let query = [("access_token", user_token.expose())];
        let body = self.get("list businesses", "me/businesses", &query).await?;
        Ok(ids_from_listing(&body))
    }

    async fn list_client_pages(
        &self,
        user_token: &SecretToken,
        business_id: &str,
    ) -> Result<Vec<String>, PlatformError> {
        let query = [("fields", "id,name"), ("access_token", user_token.expose())];
        let path = format!("{}/client_pages", business_id);
        let body = self.get("list business pages", &path, &query).await?;
        Ok(ids_from_listing(&body))
    }

    async fn page_token(
        &self,
        user_token: &SecretToken,
        page_id: &str,
    ) -> Result<Option<PageToken>, PlatformError> {
        let query = [("fields", "access_token,name"), ("access_token", user_token.expose())];
        let page = self.get("fetch page token", page_id, &query).await?;

        Ok(page
            .get("access_token")
            .and_then(Value::as_str)
            .map(|token| PageToken {
                id: page_id.to_string(),
                name: page.get("name").and_then(Value::as_str).map(str::to_string),
                access_token: SecretToken::new(token),
            }))
    }

    async fn post_text(&self, page: &PageToken, message: &str) -> Result<String, PlatformError> {
        let context = "post to feed";
        let response = self
            .client
            .post(format!("{}/{}/feed", self.base_url, page.id))
            .form(&[("message", message), ("access_token", page.access_token.expose())])
            .send()
            .await
            .map_err(|e| transport_error(PLATFORM, context, e))?;

        let body = read_graph_json(PLATFORM, context, response).await?;
        require_id(PLATFORM, context, &body, "/id")
    }

    async fn post_photo(
        &self,
        page: &PageToken,
        message: &str,
        media: &MediaAttachment,
    ) -> Result<String, PlatformError> {
        let context = "upload photo";
        let form = reqwest::multipart::Form::new()
            .text("message", message.to_string())
            .text("access_token", page.access_token.expose().to_string())
            .part("source", media.to_part()?);

        let response = self
            .client
            .post(format!("{}/{}/photos", self.base_url, page.id))
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error(PLATFORM, context, e))?;

        let body = read_graph_json(PLATFORM, context, response).await?;
        // Photo uploads report the feed story as post_id and the photo as id
        require_id(PLATFORM, context, &body, "/post_id")
            .or_else(|_| require_id(PLATFORM, context, &body, "/id"))
    }
}
