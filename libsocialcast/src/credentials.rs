//! Platform credential storage and resolution
//!
//! Credentials are written by the setup flows and read before every publish
//! attempt. Two backends exist:
//! - the `platform_accounts` table of the [`Database`](crate::db::Database)
//! - one JSON file per platform under the configured credentials directory
//!
//! [`CredentialResolver`] applies the lookup policy: the database is preferred
//! when persistence is enabled, the file is the fallback, and a static token
//! from configuration is the last resort. Lookups are never cached.
//!
//! # Example
//!
//! ```no_run
//! use libsocialcast::credentials::{CredentialLookup, CredentialResolver};
//! use libsocialcast::{Config, PlatformId};
//!
//! # async fn example() -> libsocialcast::Result<()> {
//! let config = Config::load()?;
//! let resolver = CredentialResolver::from_config(&config, None);
//!
//! match resolver.resolve(PlatformId::Tumblr).await {
//!     CredentialLookup::Found { credential, source } => {
//!         println!("Using {} credentials from {}", credential.platform, source);
//!     }
//!     CredentialLookup::NotConfigured => println!("Run the Tumblr setup first"),
//!     CredentialLookup::Unavailable(reason) => println!("Store unreachable: {}", reason),
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use zeroize::Zeroize;

use crate::config::{Config, PlatformSettings};
use crate::error::{CredentialError, Result};
use crate::types::PlatformId;

/// A token that never shows up in logs and is wiped from memory on drop
#[derive(Clone, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretToken([REDACTED])")
    }
}

impl Drop for SecretToken {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// OAuth 1.0a user token pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth1Token {
    pub token: SecretToken,
    pub secret: SecretToken,
}

/// Display details kept alongside a credential
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialMetadata {
    pub username: Option<String>,
    pub display_name: Option<String>,
    /// Pinterest board to pin to
    pub board_id: Option<String>,
}

/// The active credential set for one platform
///
/// `account_id` is the page id (Facebook), Instagram business user id,
/// Pinterest user id, Tumblr blog name or X user id. An empty Facebook
/// `account_id` marks `access_token` as a user token whose pages have to be
/// discovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformCredential {
    pub platform: PlatformId,
    pub account_id: String,
    pub access_token: SecretToken,
    pub refresh_token: Option<SecretToken>,
    pub oauth1: Option<OAuth1Token>,
    pub metadata: CredentialMetadata,
}

impl PlatformCredential {
    pub fn new(
        platform: PlatformId,
        account_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            account_id: account_id.into(),
            access_token: SecretToken::new(access_token),
            refresh_token: None,
            oauth1: None,
            metadata: CredentialMetadata::default(),
        }
    }

    pub fn with_oauth1(mut self, token: impl Into<String>, secret: impl Into<String>) -> Self {
        self.oauth1 = Some(OAuth1Token {
            token: SecretToken::new(token),
            secret: SecretToken::new(secret),
        });
        self
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(SecretToken::new(refresh_token));
        self
    }

    pub fn with_metadata(mut self, metadata: CredentialMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Human-readable account label for logs
    pub fn label(&self) -> &str {
        self.metadata
            .username
            .as_deref()
            .or(self.metadata.display_name.as_deref())
            .unwrap_or(&self.account_id)
    }

    /// Build a credential from static configuration tokens
    ///
    /// Returns `None` when the platform has no usable static token. X has no
    /// static bearer token: its `access_token` settings are the OAuth 1.0a pair
    /// used for media upload.
    pub fn from_settings(platform: PlatformId, settings: &PlatformSettings) -> Option<Self> {
        let token = settings.access_token.as_deref().filter(|t| !t.trim().is_empty())?;
        let account_id = settings.account_id.clone().unwrap_or_default();

        match platform {
            PlatformId::X => None,
            PlatformId::Tumblr => {
                let secret = settings.access_token_secret.as_deref()?;
                Some(Self::new(platform, account_id, token).with_oauth1(token, secret))
            }
            _ => {
                let mut credential = Self::new(platform, account_id, token);
                if let Some(refresh) = &settings.refresh_token {
                    credential = credential.with_refresh_token(refresh.clone());
                }
                credential.metadata.board_id = settings.board_id.clone();
                Some(credential)
            }
        }
    }
}

/// Where a resolved credential came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSourceKind {
    Database,
    File,
    Static,
}

impl std::fmt::Display for CredentialSourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialSourceKind::Database => write!(f, "database"),
            CredentialSourceKind::File => write!(f, "file fallback"),
            CredentialSourceKind::Static => write!(f, "static configuration"),
        }
    }
}

/// Outcome of a credential lookup
#[derive(Debug, Clone)]
pub enum CredentialLookup {
    Found {
        credential: PlatformCredential,
        source: CredentialSourceKind,
    },
    /// No source has credentials for the platform
    NotConfigured,
    /// The database failed and nothing else had credentials
    Unavailable(String),
}

impl CredentialLookup {
    pub fn into_credential(self) -> Option<PlatformCredential> {
        match self {
            CredentialLookup::Found { credential, .. } => Some(credential),
            _ => None,
        }
    }

    pub fn source(&self) -> Option<CredentialSourceKind> {
        match self {
            CredentialLookup::Found { source, .. } => Some(*source),
            _ => None,
        }
    }

    /// Explanation suitable for a failed post's status message
    pub fn describe_missing(&self, platform: PlatformId) -> String {
        match self {
            CredentialLookup::Found { .. } => {
                format!("{} credentials found", platform.display_name())
            }
            CredentialLookup::NotConfigured => format!(
                "No {} credentials configured. Run the {} setup first.",
                platform.display_name(),
                platform
            ),
            CredentialLookup::Unavailable(reason) => format!(
                "{} credentials unavailable: {}",
                platform.display_name(),
                reason
            ),
        }
    }
}

/// A backend that can load and save platform credentials
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Name used in log messages (e.g. "database", "file")
    fn source_name(&self) -> &'static str;

    /// Load the most recently updated credential for `platform`
    ///
    /// `Ok(None)` means the backend works but holds nothing for the platform.
    async fn load(&self, platform: PlatformId) -> Result<Option<PlatformCredential>>;

    async fn save(&self, credential: &PlatformCredential) -> Result<()>;
}

/// Stands in for a credential database that could not be opened
///
/// Every call fails with the open error, so the resolver falls through to
/// the file store and reports the database as unavailable.
#[derive(Debug, Clone)]
pub struct UnavailableSource {
    reason: String,
}

impl UnavailableSource {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl CredentialSource for UnavailableSource {
    fn source_name(&self) -> &'static str {
        "database"
    }

    async fn load(&self, _platform: PlatformId) -> Result<Option<PlatformCredential>> {
        Err(CredentialError::Unavailable(self.reason.clone()).into())
    }

    async fn save(&self, _credential: &PlatformCredential) -> Result<()> {
        Err(CredentialError::Unavailable(self.reason.clone()).into())
    }
}

// ============================================================================
// File store
// ============================================================================

/// On-disk representation of one platform's credential
///
/// Field aliases accept the files written by earlier setup scripts.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CredentialRecord {
    #[serde(
        default,
        alias = "page_id",
        alias = "ig_user_id",
        alias = "user_id",
        alias = "blog_name",
        skip_serializing_if = "Option::is_none"
    )]
    pub account_id: Option<String>,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth1_access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth1_access_token_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(
        default,
        alias = "name",
        alias = "page_name",
        alias = "blog_title",
        skip_serializing_if = "Option::is_none"
    )]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_id: Option<String>,
}

impl CredentialRecord {
    pub fn into_credential(self, platform: PlatformId) -> PlatformCredential {
        let mut credential = PlatformCredential::new(
            platform,
            self.account_id.unwrap_or_default(),
            self.access_token.clone(),
        );

        credential.refresh_token = self.refresh_token.clone().map(SecretToken::new);
        credential.oauth1 = match (
            &self.oauth1_access_token,
            &self.oauth1_access_token_secret,
            &self.access_token_secret,
        ) {
            (Some(token), Some(secret), _) => Some(OAuth1Token {
                token: SecretToken::new(token.clone()),
                secret: SecretToken::new(secret.clone()),
            }),
            (_, _, Some(secret)) => Some(OAuth1Token {
                token: SecretToken::new(self.access_token.clone()),
                secret: SecretToken::new(secret.clone()),
            }),
            _ => None,
        };
        credential.metadata = CredentialMetadata {
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            board_id: self.board_id.clone(),
        };
        credential
    }

    pub fn from_credential(credential: &PlatformCredential) -> Self {
        let mut record = Self {
            account_id: Some(credential.account_id.clone()).filter(|id| !id.is_empty()),
            access_token: credential.access_token.expose().to_string(),
            refresh_token: credential
                .refresh_token
                .as_ref()
                .map(|t| t.expose().to_string()),
            username: credential.metadata.username.clone(),
            display_name: credential.metadata.display_name.clone(),
            board_id: credential.metadata.board_id.clone(),
            ..Default::default()
        };

        if let Some(oauth1) = &credential.oauth1 {
            if oauth1.token == credential.access_token {
                record.access_token_secret = Some(oauth1.secret.expose().to_string());
            } else {
                record.oauth1_access_token = Some(oauth1.token.expose().to_string());
                record.oauth1_access_token_secret = Some(oauth1.secret.expose().to_string());
            }
        }
        record
    }
}

#[derive(Debug, Deserialize)]
struct PageEntry {
    id: String,
    access_token: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CredentialFile {
    /// Facebook `me/accounts` listing saved verbatim; the first page is used
    PageListing { data: Vec<PageEntry> },
    Record(CredentialRecord),
}

/// Parse a credential file's contents
pub fn parse_credential_json(platform: PlatformId, content: &str) -> Result<PlatformCredential> {
    let file: CredentialFile = serde_json::from_str(content)
        .map_err(|e| CredentialError::Parse(format!("{} credential file: {}", platform, e)))?;

    match file {
        CredentialFile::PageListing { data } => {
            let page = data.into_iter().next().ok_or_else(|| {
                CredentialError::Parse(format!("{} credential file lists no pages", platform))
            })?;
            let mut credential = PlatformCredential::new(platform, page.id, page.access_token);
            credential.metadata.display_name = page.name;
            Ok(credential)
        }
        CredentialFile::Record(record) => {
            if record.access_token.trim().is_empty() {
                return Err(CredentialError::Parse(format!(
                    "{} credential file has an empty access_token",
                    platform
                ))
                .into());
            }
            Ok(record.into_credential(platform))
        }
    }
}

/// Per-platform JSON credential files in one directory
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn file_name(platform: PlatformId) -> &'static str {
        match platform {
            PlatformId::Facebook => "facebook_token.json",
            PlatformId::Instagram => "instagram_token.json",
            PlatformId::Pinterest => "pinterest_token.json",
            PlatformId::Tumblr => "tumblr_credentials.json",
            PlatformId::X => "x_credentials.json",
        }
    }

    pub fn path_for(&self, platform: PlatformId) -> PathBuf {
        self.dir.join(Self::file_name(platform))
    }
}

#[async_trait]
impl CredentialSource for FileCredentialStore {
    fn source_name(&self) -> &'static str {
        "file"
    }

    async fn load(&self, platform: PlatformId) -> Result<Option<PlatformCredential>> {
        let path = self.path_for(platform);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path).map_err(CredentialError::Io)?;
        parse_credential_json(platform, &content).map(Some)
    }

    async fn save(&self, credential: &PlatformCredential) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(CredentialError::Io)?;

        let record = CredentialRecord::from_credential(credential);
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| CredentialError::Parse(e.to_string()))?;

        // Write to a sibling temp file and rename so readers never see a partial file
        let path = self.path_for(credential.platform);
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json).map_err(CredentialError::Io)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))
                .map_err(CredentialError::Io)?;
        }

        std::fs::rename(&tmp_path, &path).map_err(CredentialError::Io)?;
        tracing::debug!("Wrote {} credentials to {}", credential.platform, path.display());
        Ok(())
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Applies the database-first, file-fallback credential policy
pub struct CredentialResolver {
    database: Option<Arc<dyn CredentialSource>>,
    use_database: bool,
    file: Arc<dyn CredentialSource>,
    statics: HashMap<PlatformId, PlatformCredential>,
}

impl CredentialResolver {
    /// Create a resolver backed only by `file`
    pub fn new(file: Arc<dyn CredentialSource>) -> Self {
        Self {
            database: None,
            use_database: false,
            file,
            statics: HashMap::new(),
        }
    }

    /// Attach the database backend; it is consulted only when `enabled`
    pub fn with_database(mut self, database: Arc<dyn CredentialSource>, enabled: bool) -> Self {
        self.database = Some(database);
        self.use_database = enabled;
        self
    }

    /// Register a static credential used when no store has one
    pub fn with_static(mut self, credential: PlatformCredential) -> Self {
        self.statics.insert(credential.platform, credential);
        self
    }

    /// Build the resolver described by `config`
    pub fn from_config(config: &Config, database: Option<Arc<dyn CredentialSource>>) -> Self {
        let file = Arc::new(FileCredentialStore::new(config.credentials.expanded_dir()));
        let mut resolver = Self::new(file);

        if let Some(db) = database {
            resolver = resolver.with_database(db, config.persistence_enabled());
        }

        for platform in PlatformId::ALL {
            if let Some(credential) =
                PlatformCredential::from_settings(platform, config.platforms.get(platform))
            {
                resolver = resolver.with_static(credential);
            }
        }

        resolver
    }

    /// Resolve the active credential for `platform`
    ///
    /// Never fails: store errors are logged and the next source is tried.
    pub async fn resolve(&self, platform: PlatformId) -> CredentialLookup {
        let mut database_failure = None;

        if let (true, Some(db)) = (self.use_database, &self.database) {
            match db.load(platform).await {
                Ok(Some(credential)) => {
                    tracing::info!(
                        platform = %platform,
                        account = %credential.label(),
                        "Credentials loaded from database"
                    );
                    return CredentialLookup::Found {
                        credential,
                        source: CredentialSourceKind::Database,
                    };
                }
                Ok(None) => {
                    tracing::debug!(
                        platform = %platform,
                        source = db.source_name(),
                        "No stored credentials, trying file fallback"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        platform = %platform,
                        source = db.source_name(),
                        error = %e,
                        "Credential lookup failed, trying file fallback"
                    );
                    database_failure = Some(e.to_string());
                }
            }
        }

        match self.file.load(platform).await {
            Ok(Some(credential)) => {
                tracing::info!(
                    platform = %platform,
                    account = %credential.label(),
                    "Credentials loaded from file fallback"
                );
                return CredentialLookup::Found {
                    credential,
                    source: CredentialSourceKind::File,
                };
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    platform = %platform,
                    error = %e,
                    "Ignoring unreadable credential file"
                );
            }
        }

        if let Some(credential) = self.statics.get(&platform) {
            tracing::info!(platform = %platform, "Using static credentials from configuration");
            return CredentialLookup::Found {
                credential: credential.clone(),
                source: CredentialSourceKind::Static,
            };
        }

        match database_failure {
            Some(reason) => CredentialLookup::Unavailable(reason),
            None => {
                tracing::info!(platform = %platform, "No credentials configured");
                CredentialLookup::NotConfigured
            }
        }
    }

    /// Persist a credential following the same policy as [`resolve`](Self::resolve)
    ///
    /// Saves to the database when it is in use, falling back to the file if
    /// that write fails. Returns where the credential ended up.
    pub async fn save(&self, credential: &PlatformCredential) -> Result<CredentialSourceKind> {
        if let (true, Some(db)) = (self.use_database, &self.database) {
            match db.save(credential).await {
                Ok(()) => {
                    tracing::info!(
                        platform = %credential.platform,
                        source = db.source_name(),
                        "Credentials saved"
                    );
                    return Ok(CredentialSourceKind::Database);
                }
                Err(e) => {
                    tracing::warn!(
                        platform = %credential.platform,
                        source = db.source_name(),
                        error = %e,
                        "Credential save failed, writing file instead"
                    );
                }
            }
        }

        self.file.save(credential).await?;
        tracing::info!(
            platform = %credential.platform,
            source = self.file.source_name(),
            "Credentials saved"
        );
        Ok(CredentialSourceKind::File)
    }
}

#[cfg(test)]
mod tests;
