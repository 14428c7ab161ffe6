//! Error types for Socialcast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SocialcastError>;

#[derive(Error, Debug)]
pub enum SocialcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SocialcastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SocialcastError::InvalidInput(_) => 3,
            SocialcastError::Platform(PlatformError::Authentication(_)) => 2,
            SocialcastError::Credential(CredentialError::NotFound(_)) => 2,
            SocialcastError::Platform(_) => 1,
            SocialcastError::Credential(_) => 1,
            SocialcastError::Config(_) => 1,
            SocialcastError::Database(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Persistence is disabled: {0}")]
    PersistenceDisabled(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Post not found: {0}")]
    NotFound(String),

    #[error("Post {id} cannot move from '{from}' to '{to}'")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("No credentials found for {0}")]
    NotFound(String),

    #[error("Failed to parse credentials: {0}")]
    Parse(String),

    #[error("Credential file IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Credential store unavailable: {0}")]
    Unavailable(String),
}

/// Failures an adapter can report for a single publish attempt
///
/// Every variant is converted into a failed [`PublishResult`](crate::types::PublishResult)
/// at the adapter boundary, so the variant names double as the categories
/// operators see in logs and post status messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Media required: {0}")]
    MediaRequired(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Request rejected: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),
}

impl PlatformError {
    /// Short category label used in logs and JSON output
    pub fn kind(&self) -> &'static str {
        match self {
            PlatformError::Authentication(_) => "authentication",
            PlatformError::MediaRequired(_) => "media_required",
            PlatformError::RateLimit(_) => "rate_limit",
            PlatformError::Permission(_) => "permission",
            PlatformError::Network(_) => "network",
            PlatformError::MalformedResponse(_) => "malformed_response",
            PlatformError::Validation(_) => "validation",
            PlatformError::Posting(_) => "posting",
        }
    }

    /// Whether retrying the same request later could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, PlatformError::Network(_) | PlatformError::RateLimit(_))
    }

    /// Prefix the message with `context`, keeping the category
    pub fn with_context(self, context: &str) -> Self {
        let wrap = |msg: String| format!("{}: {}", context, msg);
        match self {
            PlatformError::Authentication(m) => PlatformError::Authentication(wrap(m)),
            PlatformError::MediaRequired(m) => PlatformError::MediaRequired(wrap(m)),
            PlatformError::RateLimit(m) => PlatformError::RateLimit(wrap(m)),
            PlatformError::Permission(m) => PlatformError::Permission(wrap(m)),
            PlatformError::Network(m) => PlatformError::Network(wrap(m)),
            PlatformError::MalformedResponse(m) => PlatformError::MalformedResponse(wrap(m)),
            PlatformError::Validation(m) => PlatformError::Validation(wrap(m)),
            PlatformError::Posting(m) => PlatformError::Posting(wrap(m)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = SocialcastError::InvalidInput("Empty content".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_authentication_error() {
        let error = SocialcastError::Platform(PlatformError::Authentication(
            "Token expired".to_string(),
        ));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_missing_credentials() {
        let error = SocialcastError::Credential(CredentialError::NotFound("x".to_string()));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_other_platform_errors() {
        for err in [
            PlatformError::MediaRequired("image".to_string()),
            PlatformError::RateLimit("slow down".to_string()),
            PlatformError::Permission("scope".to_string()),
            PlatformError::Network("timeout".to_string()),
            PlatformError::MalformedResponse("{}".to_string()),
            PlatformError::Validation("bad".to_string()),
            PlatformError::Posting("boom".to_string()),
        ] {
            assert_eq!(SocialcastError::Platform(err).exit_code(), 1);
        }
    }

    #[test]
    fn test_exit_code_config_and_database() {
        let config = SocialcastError::Config(ConfigError::MissingField("database.path".into()));
        assert_eq!(config.exit_code(), 1);

        let db = SocialcastError::Database(DbError::NotFound("abc".into()));
        assert_eq!(db.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting() {
        let error = SocialcastError::Platform(PlatformError::MediaRequired(
            "Instagram requires media".to_string(),
        ));
        assert_eq!(
            error.to_string(),
            "Platform error: Media required: Instagram requires media"
        );
    }

    #[test]
    fn test_invalid_transition_formatting() {
        let error = DbError::InvalidTransition {
            id: "p1".to_string(),
            from: "published".to_string(),
            to: "scheduled".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Post p1 cannot move from 'published' to 'scheduled'"
        );
    }

    #[test]
    fn test_platform_error_kind_labels() {
        assert_eq!(PlatformError::RateLimit(String::new()).kind(), "rate_limit");
        assert_eq!(
            PlatformError::MalformedResponse(String::new()).kind(),
            "malformed_response"
        );
    }

    #[test]
    fn test_transient_errors() {
        assert!(PlatformError::Network("503".into()).is_transient());
        assert!(PlatformError::RateLimit("429".into()).is_transient());
        assert!(!PlatformError::Authentication("401".into()).is_transient());
        assert!(!PlatformError::MediaRequired("none".into()).is_transient());
    }

    #[test]
    fn test_with_context_keeps_category() {
        let err = PlatformError::RateLimit("try later".to_string())
            .with_context("Step 2 (create container) failed");
        assert_eq!(
            err,
            PlatformError::RateLimit("Step 2 (create container) failed: try later".to_string())
        );
    }

    #[test]
    fn test_platform_error_clone() {
        let original = PlatformError::Permission("pages_manage_posts missing".to_string());
        assert_eq!(original.clone(), original);
    }
}
