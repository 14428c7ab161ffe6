//! Pinterest API v5 pin creation
//!
//! Every pin lands on a board: the one stored with the credential, else the
//! configured default, else the first board the account owns.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::credentials::PlatformCredential;
use crate::error::PlatformError;
use crate::platforms::http::{first_line, read_json, require_id, transport_error, truncate_chars};
use crate::platforms::{PlatformAdapter, PublishRequest, Published};
use crate::types::{MediaAttachment, PlatformId};

const PLATFORM: PlatformId = PlatformId::Pinterest;

pub const PINTEREST_API_BASE: &str = "https://api.pinterest.com/v5";

pub const MAX_TITLE_CHARS: usize = 100;
pub const MAX_DESCRIPTION_CHARS: usize = 800;

/// A board pins can be created on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    pub id: String,
    pub name: Option<String>,
}

/// Pin title: the first line of the content
pub fn pin_title(content: &str) -> String {
    first_line(content, MAX_TITLE_CHARS)
}

/// Pin description: the whole content, capped
pub fn pin_description(content: &str) -> String {
    truncate_chars(content.trim(), MAX_DESCRIPTION_CHARS)
}

/// JSON body for `POST /pins`
pub fn pin_body(board_id: &str, content: &str, media_id: Option<&str>) -> Value {
    let mut body = json!({
        "board_id": board_id,
        "title": pin_title(content),
        "description": pin_description(content),
    });
    if let Some(media_id) = media_id {
        body["media_source"] = json!({
            "source_type": "image_upload",
            "media_id": media_id,
        });
    }
    body
}

/// Boards from a `GET /boards` response
pub fn boards_from_listing(body: &Value) -> Vec<Board> {
    body.get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    Some(Board {
                        id: item.get("id").and_then(Value::as_str)?.to_string(),
                        name: item.get("name").and_then(Value::as_str).map(str::to_string),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Pinterest v5 calls used by [`PinterestAdapter`]
#[async_trait]
pub trait PinterestApi: Send + Sync {
    /// Boards owned by the account, in the order the API lists them
    async fn list_boards(&self, access_token: &str) -> Result<Vec<Board>, PlatformError>;

    /// Upload an image and return its media id
    async fn upload_media(
        &self,
        access_token: &str,
        media: &MediaAttachment,
    ) -> Result<String, PlatformError>;

    /// Create a pin from a [`pin_body`] and return its id
    async fn create_pin(&self, access_token: &str, body: &Value) -> Result<String, PlatformError>;
}

pub struct PinterestAdapter {
    api: Box<dyn PinterestApi>,
    default_board: Option<String>,
}

impl PinterestAdapter {
    pub fn new(api: Box<dyn PinterestApi>, default_board: Option<String>) -> Self {
        Self {
            api,
            default_board: default_board.filter(|b| !b.trim().is_empty()),
        }
    }

    /// Board id already known without asking the API
    fn known_board(&self, credential: &PlatformCredential) -> Option<Board> {
        credential
            .metadata
            .board_id
            .as_ref()
            .filter(|b| !b.trim().is_empty())
            .or(self.default_board.as_ref())
            .map(|id| Board {
                id: id.clone(),
                name: None,
            })
    }

    async fn resolve_board(
        &self,
        credential: &PlatformCredential,
    ) -> Result<Board, PlatformError> {
        if let Some(board) = self.known_board(credential) {
            return Ok(board);
        }

        let boards = self.api.list_boards(credential.access_token.expose()).await?;
        boards.into_iter().next().ok_or_else(|| {
            PlatformError::Validation(
                "No boards found. Create a board first on Pinterest.".to_string(),
            )
        })
    }
}

#[async_trait]
impl PlatformAdapter for PinterestAdapter {
    fn platform(&self) -> PlatformId {
        PLATFORM
    }

    async fn try_publish(
        &self,
        request: &PublishRequest,
        credential: &PlatformCredential,
    ) -> Result<Published, PlatformError> {
        let token = credential.access_token.expose();
        let board = self.resolve_board(credential).await?;
        tracing::debug!(board_id = %board.id, "Pinterest board selected");

        let media_id = match request.single_media(PLATFORM) {
            Some(media) => Some(
                self.api
                    .upload_media(token, media)
                    .await
                    .map_err(|e| e.with_context("Media upload failed"))?,
            ),
            None => None,
        };

        let body = pin_body(&board.id, &request.content, media_id.as_deref());
        let pin_id = self.api.create_pin(token, &body).await?;

        let board_label = board.name.unwrap_or(board.id);
        Ok(Published::new(pin_id.clone())
            .with_url(format!("https://www.pinterest.com/pin/{}/", pin_id))
            .with_note(format!("Board: {}", board_label)))
    }
}

/// [`PinterestApi`] over HTTP
pub struct HttpPinterestApi {
    client: Client,
    base_url: String,
}

impl HttpPinterestApi {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, PINTEREST_API_BASE)
    }

    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PinterestApi for HttpPinterestApi {
    async fn list_boards(&self, access_token: &str) -> Result<Vec<Board>, PlatformError> {
        let context = "list boards";
        let response = self
            .client
            .get(format!("{}/boards", self.base_url))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| transport_error(PLATFORM, context, e))?;
        let body = read_json(PLATFORM, context, response).await?;
        Ok(boards_from_listing(&body))
    }

    async fn upload_media(
        &self,
        access_token: &str,
        media: &MediaAttachment,
    ) -> Result<String, PlatformError> {
        let context = "upload media";
        let form = reqwest::multipart::Form::new().part("file", media.to_part()?);
        let response = self
            .client
            .post(format!("{}/media", self.base_url))
            .bearer_auth(access_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error(PLATFORM, context, e))?;
        let body = read_json(PLATFORM, context, response).await?;
        require_id(PLATFORM, context, &body, "/media_id")
    }

    async fn create_pin(&self, access_token: &str, body: &Value) -> Result<String, PlatformError> {
        let context = "create pin";
        let response = self
            .client
            .post(format!("{}/pins", self.base_url))
            .bearer_auth(access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(PLATFORM, context, e))?;
        let body = read_json(PLATFORM, context, response).await?;
        require_id(PLATFORM, context, &body, "/id")
    }
}
