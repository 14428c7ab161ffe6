//! Tumblr API v2 publishing with OAuth 1.0a signed requests
//!
//! The target blog comes from `user/info`. The post type follows the media
//! file's extension; files Tumblr cannot embed fall back to a text post.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::credentials::PlatformCredential;
use crate::error::PlatformError;
use crate::platforms::http::{first_line, read_json, require_id, transport_error};
use crate::platforms::oauth1::{authorization_header, OAuth1Keys};
use crate::platforms::{PlatformAdapter, PublishRequest, Published};
use crate::types::{MediaAttachment, PlatformId};

const PLATFORM: PlatformId = PlatformId::Tumblr;

pub const TUMBLR_API_BASE: &str = "https://api.tumblr.com/v2";

const POST_TAGS: &str = "social-media-scheduler";
const FALLBACK_TITLE: &str = "Social Media Post";
const MAX_TITLE_CHARS: usize = 100;

/// A blog from `user/info`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blog {
    pub name: String,
    pub title: Option<String>,
    pub primary: bool,
}

/// Blogs listed in a `user/info` response
pub fn blogs_from_user_info(body: &Value) -> Vec<Blog> {
    body.pointer("/response/user/blogs")
        .and_then(Value::as_array)
        .map(|blogs| {
            blogs
                .iter()
                .filter_map(|blog| {
                    let name = blog.get("name").and_then(Value::as_str)?;
                    Some(Blog {
                        name: name.to_string(),
                        title: blog
                            .get("title")
                            .and_then(Value::as_str)
                            .filter(|t| !t.is_empty())
                            .map(str::to_string),
                        primary: blog.get("primary").and_then(Value::as_bool).unwrap_or(false),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Pick the blog to post to: the preferred name if listed, else primary, else first
pub fn choose_blog(body: &Value, preferred: Option<&str>) -> Option<Blog> {
    let blogs = blogs_from_user_info(body);

    if let Some(name) = preferred.filter(|n| !n.trim().is_empty()) {
        if let Some(blog) = blogs.iter().find(|b| b.name == name) {
            return Some(blog.clone());
        }
        tracing::warn!(blog = %name, "Configured Tumblr blog not found, using the primary blog");
    }

    blogs
        .iter()
        .find(|b| b.primary)
        .or_else(|| blogs.first())
        .cloned()
}

/// Shape of the legacy `/post` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TumblrPost {
    Text { title: String, body: String, html: bool },
    Photo { caption: String },
    Video { caption: String },
}

impl TumblrPost {
    /// Decide the post type from the content and optional media
    pub fn for_request(content: &str, media: Option<&MediaAttachment>) -> Self {
        match media {
            Some(media) => match media.extension().to_ascii_lowercase().as_str() {
                "jpg" | "jpeg" | "png" | "gif" => TumblrPost::Photo {
                    caption: content.to_string(),
                },
                "mp4" | "mov" | "avi" => TumblrPost::Video {
                    caption: content.to_string(),
                },
                _ => TumblrPost::Text {
                    title: FALLBACK_TITLE.to_string(),
                    body: content.to_string(),
                    html: false,
                },
            },
            None => {
                let title = first_line(content, MAX_TITLE_CHARS);
                TumblrPost::Text {
                    title: if title.is_empty() {
                        FALLBACK_TITLE.to_string()
                    } else {
                        title
                    },
                    body: content.to_string(),
                    html: true,
                }
            }
        }
    }

    /// Whether the media file travels with the request
    pub fn carries_media(&self) -> bool {
        !matches!(self, TumblrPost::Text { .. })
    }

    /// Form fields, including the common `state` and `tags`
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = match self {
            TumblrPost::Text { title, body, html } => {
                let mut p = vec![
                    ("type".to_string(), "text".to_string()),
                    ("title".to_string(), title.clone()),
                    ("body".to_string(), body.clone()),
                ];
                if *html {
                    p.push(("format".to_string(), "html".to_string()));
                }
                p
            }
            TumblrPost::Photo { caption } => vec![
                ("type".to_string(), "photo".to_string()),
                ("caption".to_string(), caption.clone()),
            ],
            TumblrPost::Video { caption } => vec![
                ("type".to_string(), "video".to_string()),
                ("caption".to_string(), caption.clone()),
            ],
        };
        params.push(("state".to_string(), "published".to_string()));
        params.push(("tags".to_string(), POST_TAGS.to_string()));
        params
    }
}

/// Tumblr v2 calls used by [`TumblrAdapter`], each signed with `keys`
#[async_trait]
pub trait TumblrApi: Send + Sync {
    /// Raw `user/info` response
    async fn user_info(&self, keys: &OAuth1Keys<'_>) -> Result<Value, PlatformError>;

    /// Create a post on `blog` and return its id
    async fn create_post(
        &self,
        keys: &OAuth1Keys<'_>,
        blog: &str,
        post: &TumblrPost,
        media: Option<&MediaAttachment>,
    ) -> Result<String, PlatformError>;
}

pub struct TumblrAdapter {
    api: Box<dyn TumblrApi>,
    consumer_key: Option<String>,
    consumer_secret: Option<String>,
}

impl TumblrAdapter {
    pub fn new(
        api: Box<dyn TumblrApi>,
        consumer_key: Option<String>,
        consumer_secret: Option<String>,
    ) -> Self {
        Self {
            api,
            consumer_key: consumer_key.filter(|k| !k.trim().is_empty()),
            consumer_secret: consumer_secret.filter(|k| !k.trim().is_empty()),
        }
    }

    fn keys<'a>(
        &'a self,
        credential: &'a PlatformCredential,
    ) -> Result<OAuth1Keys<'a>, PlatformError> {
        let (consumer_key, consumer_secret) = match (&self.consumer_key, &self.consumer_secret) {
            (Some(key), Some(secret)) => (key.as_str(), secret.as_str()),
            _ => {
                return Err(PlatformError::Authentication(
                    "Tumblr consumer key and secret are not configured. \
                     Set TUMBLR_CLIENT_ID and TUMBLR_CLIENT_SECRET."
                        .to_string(),
                ))
            }
        };

        let user = credential.oauth1.as_ref().ok_or_else(|| {
            PlatformError::Authentication(
                "Tumblr credential has no OAuth token secret. Run the tumblr setup again."
                    .to_string(),
            )
        })?;

        Ok(OAuth1Keys {
            consumer_key,
            consumer_secret,
            token: user.token.expose(),
            token_secret: user.secret.expose(),
        })
    }
}

#[async_trait]
impl PlatformAdapter for TumblrAdapter {
    fn platform(&self) -> PlatformId {
        PLATFORM
    }

    async fn try_publish(
        &self,
        request: &PublishRequest,
        credential: &PlatformCredential,
    ) -> Result<Published, PlatformError> {
        let keys = self.keys(credential)?;

        let info = self.api.user_info(&keys).await?;
        let preferred = Some(credential.account_id.as_str());
        let blog = choose_blog(&info, preferred).ok_or_else(|| {
            PlatformError::Validation("Could not find a Tumblr blog to post to.".to_string())
        })?;

        let media = request.single_media(PLATFORM);
        let post = TumblrPost::for_request(&request.content, media);
        tracing::debug!(blog = %blog.name, media = post.carries_media(), "Creating Tumblr post");

        let post_id = self.api.create_post(&keys, &blog.name, &post, media).await?;

        Ok(Published::new(post_id.clone())
            .with_url(format!("https://{}.tumblr.com/post/{}", blog.name, post_id))
            .with_note(format!("Blog: {}", blog.title.unwrap_or(blog.name))))
    }
}

/// [`TumblrApi`] over HTTP
pub struct HttpTumblrApi {
    client: Client,
    base_url: String,
}

impl HttpTumblrApi {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, TUMBLR_API_BASE)
    }

    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl TumblrApi for HttpTumblrApi {
    async fn user_info(&self, keys: &OAuth1Keys<'_>) -> Result<Value, PlatformError> {
        let context = "fetch user info";
        let url = format!("{}/user/info", self.base_url);
        let auth = authorization_header("GET", &url, &[], keys)?;

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, auth)
            .send()
            .await
            .map_err(|e| transport_error(PLATFORM, context, e))?;
        read_json(PLATFORM, context, response).await
    }

    async fn create_post(
        &self,
        keys: &OAuth1Keys<'_>,
        blog: &str,
        post: &TumblrPost,
        media: Option<&MediaAttachment>,
    ) -> Result<String, PlatformError> {
        let context = "create post";
        let url = format!("{}/blog/{}/post", self.base_url, blog);
        let params = post.params();

        let request = match media.filter(|_| post.carries_media()) {
            // Multipart bodies are not part of the signature base string
            Some(media) => {
                let auth = authorization_header("POST", &url, &[], keys)?;
                let mut form = reqwest::multipart::Form::new();
                for (key, value) in params {
                    form = form.text(key, value);
                }
                form = form.part("data", media.to_part()?);
                self.client
                    .post(&url)
                    .header(reqwest::header::AUTHORIZATION, auth)
                    .multipart(form)
            }
            None => {
                let auth = authorization_header("POST", &url, &params, keys)?;
                self.client
                    .post(&url)
                    .header(reqwest::header::AUTHORIZATION, auth)
                    .form(&params)
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(PLATFORM, context, e))?;
        let body = read_json(PLATFORM, context, response).await?;

        require_id(PLATFORM, context, &body, "/response/id_string")
            .or_else(|_| require_id(PLATFORM, context, &body, "/response/id"))
    }
}
