//! Core types for Socialcast

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{PlatformError, SocialcastError};

/// Platforms a post can be published to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformId {
    Facebook,
    Instagram,
    Pinterest,
    Tumblr,
    X,
}

impl PlatformId {
    pub const ALL: [PlatformId; 5] = [
        PlatformId::Facebook,
        PlatformId::Instagram,
        PlatformId::Pinterest,
        PlatformId::Tumblr,
        PlatformId::X,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformId::Facebook => "facebook",
            PlatformId::Instagram => "instagram",
            PlatformId::Pinterest => "pinterest",
            PlatformId::Tumblr => "tumblr",
            PlatformId::X => "x",
        }
    }

    /// Human-facing name used in result messages
    pub fn display_name(&self) -> &'static str {
        match self {
            PlatformId::Facebook => "Facebook",
            PlatformId::Instagram => "Instagram",
            PlatformId::Pinterest => "Pinterest",
            PlatformId::Tumblr => "Tumblr",
            PlatformId::X => "X",
        }
    }
}

impl FromStr for PlatformId {
    type Err = SocialcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "facebook" => Ok(PlatformId::Facebook),
            "instagram" => Ok(PlatformId::Instagram),
            "pinterest" => Ok(PlatformId::Pinterest),
            "tumblr" => Ok(PlatformId::Tumblr),
            "x" | "twitter" => Ok(PlatformId::X),
            other => Err(SocialcastError::InvalidInput(format!(
                "Unknown platform '{}'. Valid platforms: facebook, instagram, pinterest, tumblr, x",
                other
            ))),
        }
    }
}

impl std::fmt::Display for PlatformId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a scheduled post
///
/// `Scheduled` is the only non-terminal state; a post moves to `Published`
/// or `Failed` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Scheduled,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Scheduled => "scheduled",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PostStatus::Scheduled)
    }
}

impl FromStr for PostStatus {
    type Err = SocialcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "scheduled" => Ok(PostStatus::Scheduled),
            "published" => Ok(PostStatus::Published),
            "failed" => Ok(PostStatus::Failed),
            other => Err(SocialcastError::InvalidInput(format!(
                "Unknown status '{}'. Valid statuses: scheduled, published, failed",
                other
            ))),
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row in the scheduled post queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledPost {
    pub id: String,
    pub platform: PlatformId,
    pub content: String,
    pub media_path: Option<PathBuf>,
    pub scheduled_time: DateTime<Utc>,
    pub status: PostStatus,
    /// Last message recorded by the scheduler (adapter result or failure reason)
    pub status_message: Option<String>,
    pub platform_post_id: Option<String>,
}

/// Insert request for the post queue
#[derive(Debug, Clone)]
pub struct NewPost {
    pub platform: PlatformId,
    pub content: String,
    pub media_path: Option<PathBuf>,
    pub scheduled_time: DateTime<Utc>,
    pub status: PostStatus,
}

impl NewPost {
    /// Create a post in the `scheduled` state
    pub fn scheduled(
        platform: PlatformId,
        content: impl Into<String>,
        media_path: Option<PathBuf>,
        scheduled_time: DateTime<Utc>,
    ) -> Self {
        Self {
            platform,
            content: content.into(),
            media_path,
            scheduled_time,
            status: PostStatus::Scheduled,
        }
    }
}

// ============================================================================
// Media
// ============================================================================

/// Broad media category, decided by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Other,
}

impl MediaKind {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "webp" => MediaKind::Image,
            "mp4" | "mov" | "avi" => MediaKind::Video,
            _ => MediaKind::Other,
        }
    }
}

/// Guess a MIME type from a file extension
pub fn mime_from_extension(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}

/// An in-memory media file handed to adapters
#[derive(Clone, PartialEq, Eq)]
pub struct MediaAttachment {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl MediaAttachment {
    /// Build an attachment from raw bytes, guessing the MIME type from the filename
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        let filename = filename.into();
        let mime_type = mime_from_extension(extension_of(&filename)).to_string();
        Self {
            filename,
            mime_type,
            bytes,
        }
    }

    /// Read a media file from disk
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "media".to_string());
        Ok(Self::new(filename, bytes))
    }

    pub fn extension(&self) -> &str {
        extension_of(&self.filename)
    }

    pub fn kind(&self) -> MediaKind {
        MediaKind::from_extension(self.extension())
    }

    pub fn is_video(&self) -> bool {
        self.kind() == MediaKind::Video || self.mime_type.starts_with("video/")
    }

    /// Multipart form part carrying the file contents
    pub fn to_part(&self) -> std::result::Result<reqwest::multipart::Part, PlatformError> {
        reqwest::multipart::Part::bytes(self.bytes.clone())
            .file_name(self.filename.clone())
            .mime_str(&self.mime_type)
            .map_err(|e| {
                PlatformError::Validation(format!("Invalid MIME type '{}': {}", self.mime_type, e))
            })
    }
}

impl std::fmt::Debug for MediaAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaAttachment")
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

fn extension_of(filename: &str) -> &str {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
}

// ============================================================================
// Publish results
// ============================================================================

/// Normalized outcome of one publish attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    pub success: bool,
    pub message: String,
    pub post_id: Option<String>,
    pub error: Option<PlatformError>,
}

impl PublishResult {
    pub fn published(message: impl Into<String>, post_id: Option<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            post_id,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>, error: PlatformError) -> Self {
        Self {
            success: false,
            message: message.into(),
            post_id: None,
            error: Some(error),
        }
    }

    /// Status a scheduled post should take after this attempt
    pub fn status(&self) -> PostStatus {
        if self.success {
            PostStatus::Published
        } else {
            PostStatus::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_id_parsing() {
        assert_eq!("facebook".parse::<PlatformId>().unwrap(), PlatformId::Facebook);
        assert_eq!("Instagram".parse::<PlatformId>().unwrap(), PlatformId::Instagram);
        assert_eq!(" X ".parse::<PlatformId>().unwrap(), PlatformId::X);
        assert_eq!("twitter".parse::<PlatformId>().unwrap(), PlatformId::X);
        assert!("myspace".parse::<PlatformId>().is_err());
    }

    #[test]
    fn test_platform_id_display_matches_storage_form() {
        for platform in PlatformId::ALL {
            assert_eq!(platform.to_string(), platform.as_str());
            assert_eq!(platform.as_str().parse::<PlatformId>().unwrap(), platform);
        }
    }

    #[test]
    fn test_post_status_terminal() {
        assert!(!PostStatus::Scheduled.is_terminal());
        assert!(PostStatus::Published.is_terminal());
        assert!(PostStatus::Failed.is_terminal());
        assert!("bogus".parse::<PostStatus>().is_err());
    }

    #[test]
    fn test_media_kind_from_extension() {
        assert_eq!(MediaKind::from_extension("JPG"), MediaKind::Image);
        assert_eq!(MediaKind::from_extension("png"), MediaKind::Image);
        assert_eq!(MediaKind::from_extension("mov"), MediaKind::Video);
        assert_eq!(MediaKind::from_extension("pdf"), MediaKind::Other);
        assert_eq!(MediaKind::from_extension(""), MediaKind::Other);
    }

    #[test]
    fn test_media_attachment_guesses_mime() {
        let media = MediaAttachment::new("holiday.jpeg", vec![1, 2, 3]);
        assert_eq!(media.mime_type, "image/jpeg");
        assert_eq!(media.kind(), MediaKind::Image);
        assert!(!media.is_video());

        let clip = MediaAttachment::new("clip.mp4", vec![0]);
        assert_eq!(clip.mime_type, "video/mp4");
        assert!(clip.is_video());

        let unknown = MediaAttachment::new("notes", vec![]);
        assert_eq!(unknown.mime_type, "application/octet-stream");
    }

    #[test]
    fn test_media_attachment_from_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("photo.png");
        std::fs::write(&path, b"not really a png").unwrap();

        let media = MediaAttachment::from_path(&path).unwrap();
        assert_eq!(media.filename, "photo.png");
        assert_eq!(media.mime_type, "image/png");
        assert_eq!(media.bytes, b"not really a png");

        assert!(MediaAttachment::from_path(&dir.path().join("missing.png")).is_err());
    }

    #[test]
    fn test_media_attachment_debug_omits_bytes() {
        let media = MediaAttachment::new("a.gif", vec![7; 64]);
        let debug = format!("{:?}", media);
        assert!(debug.contains("len: 64"));
        assert!(!debug.contains("7, 7"));
    }

    #[test]
    fn test_publish_result_status() {
        let ok = PublishResult::published("done", Some("123".to_string()));
        assert_eq!(ok.status(), PostStatus::Published);

        let failed = PublishResult::failed(
            "no token",
            PlatformError::Authentication("missing".to_string()),
        );
        assert_eq!(failed.status(), PostStatus::Failed);
        assert!(failed.post_id.is_none());
    }
}
