//! Configuration management for Socialcast
//!
//! Settings come from a TOML file (see [`resolve_config_path`]) and are then
//! overlaid with environment variables, so a deployment can run entirely from
//! a `.env` file without a config file at all.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::types::PlatformId;

pub const DEFAULT_SCHEDULER_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub platforms: PlatformsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database-backed persistence; scheduled posting requires it
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Directory holding the per-platform credential JSON files
    #[serde(default = "default_credentials_dir")]
    pub dir: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            dir: default_credentials_dir(),
        }
    }
}

impl CredentialsConfig {
    pub fn expanded_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.dir).to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Where queued media files are copied so the queue does not depend on the original location
    #[serde(default = "default_media_dir")]
    pub dir: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            dir: default_media_dir(),
        }
    }
}

impl MediaConfig {
    pub fn expanded_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.dir).to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformsConfig {
    #[serde(default)]
    pub facebook: PlatformSettings,
    #[serde(default)]
    pub instagram: PlatformSettings,
    #[serde(default)]
    pub pinterest: PlatformSettings,
    #[serde(default)]
    pub tumblr: PlatformSettings,
    #[serde(default)]
    pub x: PlatformSettings,
}

impl PlatformsConfig {
    pub fn get(&self, platform: PlatformId) -> &PlatformSettings {
        match platform {
            PlatformId::Facebook => &self.facebook,
            PlatformId::Instagram => &self.instagram,
            PlatformId::Pinterest => &self.pinterest,
            PlatformId::Tumblr => &self.tumblr,
            PlatformId::X => &self.x,
        }
    }

    fn get_mut(&mut self, platform: PlatformId) -> &mut PlatformSettings {
        match platform {
            PlatformId::Facebook => &mut self.facebook,
            PlatformId::Instagram => &mut self.instagram,
            PlatformId::Pinterest => &mut self.pinterest,
            PlatformId::Tumblr => &mut self.tumblr,
            PlatformId::X => &mut self.x,
        }
    }
}

/// Per-platform application keys and optional static tokens
///
/// `client_id`/`client_secret`/`redirect_uri` belong to the OAuth app.
/// `api_key`/`api_secret` are OAuth 1.0a consumer keys (X media upload); Tumblr
/// uses `client_id`/`client_secret` as its consumer pair. `access_token` and
/// friends are a static bypass for the interactive setup flow.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct PlatformSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub access_token: Option<String>,
    pub access_token_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub account_id: Option<String>,
    pub board_id: Option<String>,
}

impl std::fmt::Debug for PlatformSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn redact(value: &Option<String>) -> Option<&'static str> {
            value.as_ref().map(|_| "[REDACTED]")
        }

        f.debug_struct("PlatformSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("redirect_uri", &self.redirect_uri)
            .field("api_key", &self.api_key)
            .field("api_secret", &redact(&self.api_secret))
            .field("access_token", &redact(&self.access_token))
            .field("access_token_secret", &redact(&self.access_token_secret))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("account_id", &self.account_id)
            .field("board_id", &self.board_id)
            .finish()
    }
}

fn default_database_path() -> String {
    "~/.local/share/socialcast/posts.db".to_string()
}

fn default_interval_secs() -> u64 {
    DEFAULT_SCHEDULER_INTERVAL_SECS
}

fn default_credentials_dir() -> String {
    "~/.local/share/socialcast/credentials".to_string()
}

fn default_media_dir() -> String {
    "~/.local/share/socialcast/media".to_string()
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

impl Config {
    /// Load configuration from the default location, then apply the environment
    ///
    /// A `.env` file in the working directory is loaded first. A missing config
    /// file is not an error; defaults are used instead.
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }

        let config_path = resolve_config_path()?;
        let mut config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.apply_env_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific path (no environment overlay)
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Overlay settings from an environment lookup function
    pub fn apply_env_from<F>(&mut self, get: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = get("USE_DATABASE") {
            self.database.enabled = parse_bool_flag(&value);
        }
        if let Some(path) = get("DATABASE_PATH") {
            self.database.path = path;
        }
        if let Some(dir) = get("CREDENTIALS_DIR") {
            self.credentials.dir = dir;
        }
        if let Some(dir) = get("MEDIA_DIR") {
            self.media.dir = dir;
        }
        if let Some(value) = get("SCHEDULER_INTERVAL") {
            self.scheduler.interval_secs = value.trim().parse().map_err(|_| {
                ConfigError::InvalidValue {
                    field: "SCHEDULER_INTERVAL".to_string(),
                    reason: format!("'{}' is not a whole number of seconds", value),
                }
            })?;
        }

        for platform in PlatformId::ALL {
            let prefix = platform.as_str().to_uppercase();
            let settings = self.platforms.get_mut(platform);
            let fields: [(&str, &mut Option<String>); 10] = [
                ("CLIENT_ID", &mut settings.client_id),
                ("CLIENT_SECRET", &mut settings.client_secret),
                ("REDIRECT_URI", &mut settings.redirect_uri),
                ("API_KEY", &mut settings.api_key),
                ("API_SECRET", &mut settings.api_secret),
                ("ACCESS_TOKEN", &mut settings.access_token),
                ("ACCESS_TOKEN_SECRET", &mut settings.access_token_secret),
                ("REFRESH_TOKEN", &mut settings.refresh_token),
                ("ACCOUNT_ID", &mut settings.account_id),
                ("BOARD_ID", &mut settings.board_id),
            ];
            for (suffix, slot) in fields {
                if let Some(value) = get(&format!("{}_{}", prefix, suffix)) {
                    if !value.trim().is_empty() {
                        *slot = Some(value.trim().to_string());
                    }
                }
            }
        }

        Ok(())
    }

    pub fn persistence_enabled(&self) -> bool {
        self.database.enabled
    }
}

/// Interpret a boolean environment flag; only true/1/yes/on enable it
pub fn parse_bool_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SOCIALCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("socialcast").join("config.toml"))
}
