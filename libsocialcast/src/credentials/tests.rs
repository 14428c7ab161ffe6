use super::*;
use crate::error::{DbError, SocialcastError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

#[derive(Clone)]
enum Behavior {
    Found(PlatformCredential),
    Empty,
    Fail,
}

/// In-memory credential source that counts calls
struct FakeSource {
    behavior: Behavior,
    fail_save: bool,
    loads: AtomicUsize,
    saved: Mutex<Vec<PlatformCredential>>,
}

impl FakeSource {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            fail_save: false,
            loads: AtomicUsize::new(0),
            saved: Mutex::new(Vec::new()),
        })
    }

    fn failing_saves() -> Arc<Self> {
        Arc::new(Self {
            behavior: Behavior::Fail,
            fail_save: true,
            loads: AtomicUsize::new(0),
            saved: Mutex::new(Vec::new()),
        })
    }

    fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialSource for FakeSource {
    fn source_name(&self) -> &'static str {
        "fake"
    }

    async fn load(&self, platform: PlatformId) -> Result<Option<PlatformCredential>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Found(credential) if credential.platform == platform => {
                Ok(Some(credential.clone()))
            }
            Behavior::Found(_) | Behavior::Empty => Ok(None),
            Behavior::Fail => Err(SocialcastError::Database(DbError::IoError(
                std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "db down"),
            ))),
        }
    }

    async fn save(&self, credential: &PlatformCredential) -> Result<()> {
        if self.fail_save {
            return Err(CredentialError::Unavailable("db down".to_string()).into());
        }
        self.saved.lock().unwrap().push(credential.clone());
        Ok(())
    }
}

fn db_credential(platform: PlatformId) -> PlatformCredential {
    PlatformCredential::new(platform, "db-account", "db-token")
}

fn write_file_credential(dir: &TempDir, platform: PlatformId) {
    let path = dir.path().join(FileCredentialStore::file_name(platform));
    std::fs::write(
        path,
        r#"{"account_id": "file-account", "access_token": "file-token"}"#,
    )
    .unwrap();
}

fn file_store(dir: &TempDir) -> Arc<FileCredentialStore> {
    Arc::new(FileCredentialStore::new(dir.path()))
}

mod resolution_policy {
    use super::*;

    #[tokio::test]
    async fn test_database_takes_precedence_over_file() {
        let dir = TempDir::new().unwrap();
        for platform in PlatformId::ALL {
            write_file_credential(&dir, platform);
        }

        for platform in PlatformId::ALL {
            let db = FakeSource::new(Behavior::Found(db_credential(platform)));
            let resolver = CredentialResolver::new(file_store(&dir)).with_database(db, true);

            let lookup = resolver.resolve(platform).await;
            assert_eq!(lookup.source(), Some(CredentialSourceKind::Database));
            let credential = lookup.into_credential().unwrap();
            assert_eq!(credential.account_id, "db-account");
            assert_eq!(credential.access_token.expose(), "db-token");
        }
    }

    #[tokio::test]
    async fn test_empty_database_falls_back_to_file() {
        let dir = TempDir::new().unwrap();
        write_file_credential(&dir, PlatformId::Pinterest);

        let db = FakeSource::new(Behavior::Empty);
        let resolver = CredentialResolver::new(file_store(&dir)).with_database(db.clone(), true);

        let lookup = resolver.resolve(PlatformId::Pinterest).await;
        assert_eq!(lookup.source(), Some(CredentialSourceKind::File));
        assert_eq!(lookup.into_credential().unwrap().account_id, "file-account");
        assert_eq!(db.load_count(), 1);
    }

    #[tokio::test]
    async fn test_database_error_falls_back_to_file() {
        let dir = TempDir::new().unwrap();
        write_file_credential(&dir, PlatformId::Tumblr);

        let db = FakeSource::new(Behavior::Fail);
        let resolver = CredentialResolver::new(file_store(&dir)).with_database(db, true);

        let lookup = resolver.resolve(PlatformId::Tumblr).await;
        assert_eq!(lookup.source(), Some(CredentialSourceKind::File));
    }

    #[tokio::test]
    async fn test_empty_database_and_no_file_is_not_configured() {
        let dir = TempDir::new().unwrap();
        let db = FakeSource::new(Behavior::Empty);
        let resolver = CredentialResolver::new(file_store(&dir)).with_database(db, true);

        let lookup = resolver.resolve(PlatformId::X).await;
        assert!(matches!(lookup, CredentialLookup::NotConfigured));
    }

    #[tokio::test]
    async fn test_database_error_and_no_file_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let db = FakeSource::new(Behavior::Fail);
        let resolver = CredentialResolver::new(file_store(&dir)).with_database(db, true);

        match resolver.resolve(PlatformId::Facebook).await {
            CredentialLookup::Unavailable(reason) => assert!(reason.contains("db down")),
            other => panic!("expected Unavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_persistence_disabled_never_touches_database() {
        let dir = TempDir::new().unwrap();
        write_file_credential(&dir, PlatformId::Instagram);

        for platform in PlatformId::ALL {
            let db = FakeSource::new(Behavior::Found(db_credential(platform)));
            let resolver =
                CredentialResolver::new(file_store(&dir)).with_database(db.clone(), false);

            let lookup = resolver.resolve(platform).await;
            assert_eq!(db.load_count(), 0, "{} queried the database", platform);

            if platform == PlatformId::Instagram {
                assert_eq!(lookup.source(), Some(CredentialSourceKind::File));
            } else {
                assert!(matches!(lookup, CredentialLookup::NotConfigured));
            }
        }
    }

    #[tokio::test]
    async fn test_corrupt_file_is_treated_as_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(FileCredentialStore::file_name(PlatformId::X));
        std::fs::write(path, "{ not json").unwrap();

        let resolver = CredentialResolver::new(file_store(&dir));
        assert!(matches!(
            resolver.resolve(PlatformId::X).await,
            CredentialLookup::NotConfigured
        ));
    }

    #[tokio::test]
    async fn test_static_credential_is_last_resort() {
        let dir = TempDir::new().unwrap();
        let fixed = PlatformCredential::new(PlatformId::Facebook, "page-1", "static-token");

        let resolver = CredentialResolver::new(file_store(&dir)).with_static(fixed.clone());
        let lookup = resolver.resolve(PlatformId::Facebook).await;
        assert_eq!(lookup.source(), Some(CredentialSourceKind::Static));

        write_file_credential(&dir, PlatformId::Facebook);
        let lookup = resolver.resolve(PlatformId::Facebook).await;
        assert_eq!(lookup.source(), Some(CredentialSourceKind::File));
    }

    #[tokio::test]
    async fn test_lookup_is_not_cached() {
        let dir = TempDir::new().unwrap();
        let resolver = CredentialResolver::new(file_store(&dir));

        assert!(resolver.resolve(PlatformId::Tumblr).await.into_credential().is_none());
        write_file_credential(&dir, PlatformId::Tumblr);
        assert!(resolver.resolve(PlatformId::Tumblr).await.into_credential().is_some());
    }
}

mod saving {
    use super::*;

    #[tokio::test]
    async fn test_save_prefers_database() {
        let dir = TempDir::new().unwrap();
        let db = FakeSource::new(Behavior::Empty);
        let resolver = CredentialResolver::new(file_store(&dir)).with_database(db.clone(), true);

        let credential = db_credential(PlatformId::X);
        let source = resolver.save(&credential).await.unwrap();

        assert_eq!(source, CredentialSourceKind::Database);
        assert_eq!(db.saved.lock().unwrap().len(), 1);
        assert!(!dir.path().join("x_credentials.json").exists());
    }

    #[tokio::test]
    async fn test_save_falls_back_to_file_when_database_fails() {
        let dir = TempDir::new().unwrap();
        let db = FakeSource::failing_saves();
        let resolver = CredentialResolver::new(file_store(&dir)).with_database(db, true);

        let source = resolver.save(&db_credential(PlatformId::X)).await.unwrap();
        assert_eq!(source, CredentialSourceKind::File);
        assert!(dir.path().join("x_credentials.json").exists());
    }

    #[tokio::test]
    async fn test_save_without_persistence_writes_file() {
        let dir = TempDir::new().unwrap();
        let db = FakeSource::new(Behavior::Empty);
        let resolver = CredentialResolver::new(file_store(&dir)).with_database(db.clone(), false);

        let source = resolver.save(&db_credential(PlatformId::Pinterest)).await.unwrap();
        assert_eq!(source, CredentialSourceKind::File);
        assert!(db.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unopened_database_reads_and_writes_file() {
        let dir = TempDir::new().unwrap();
        write_file_credential(&dir, PlatformId::Instagram);
        let db = Arc::new(UnavailableSource::new("IO error: File exists"));
        let resolver = CredentialResolver::new(file_store(&dir)).with_database(db, true);

        let lookup = resolver.resolve(PlatformId::Instagram).await;
        assert_eq!(lookup.source(), Some(CredentialSourceKind::File));

        let saved = resolver.save(&db_credential(PlatformId::Tumblr)).await.unwrap();
        assert_eq!(saved, CredentialSourceKind::File);
        assert!(dir.path().join("tumblr_credentials.json").exists());
    }

    #[tokio::test]
    async fn test_unopened_database_without_file_reports_reason() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(UnavailableSource::new("unable to open database file"));
        let resolver = CredentialResolver::new(file_store(&dir)).with_database(db, true);

        match resolver.resolve(PlatformId::Facebook).await {
            CredentialLookup::Unavailable(reason) => {
                assert!(reason.contains("unable to open database file"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}

mod file_format {
    use super::*;

    #[test]
    fn test_parse_facebook_page_listing() {
        let json = r#"{"data": [
            {"id": "111", "access_token": "page-token", "name": "My Page"},
            {"id": "222", "access_token": "other", "name": "Other"}
        ]}"#;

        let credential = parse_credential_json(PlatformId::Facebook, json).unwrap();
        assert_eq!(credential.account_id, "111");
        assert_eq!(credential.access_token.expose(), "page-token");
        assert_eq!(credential.metadata.display_name.as_deref(), Some("My Page"));
    }

    #[test]
    fn test_parse_empty_page_listing_fails() {
        let result = parse_credential_json(PlatformId::Facebook, r#"{"data": []}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_instagram_aliases() {
        let json = r#"{"ig_user_id": "1784", "access_token": "tok", "username": "shop"}"#;
        let credential = parse_credential_json(PlatformId::Instagram, json).unwrap();
        assert_eq!(credential.account_id, "1784");
        assert_eq!(credential.label(), "shop");
        assert!(credential.oauth1.is_none());
    }

    #[test]
    fn test_parse_tumblr_secret_becomes_oauth1_pair() {
        let json = r#"{"access_token": "tok", "access_token_secret": "sec", "blog_title": "Blog"}"#;
        let credential = parse_credential_json(PlatformId::Tumblr, json).unwrap();
        let oauth1 = credential.oauth1.unwrap();
        assert_eq!(oauth1.token.expose(), "tok");
        assert_eq!(oauth1.secret.expose(), "sec");
        assert_eq!(credential.metadata.display_name.as_deref(), Some("Blog"));
    }

    #[test]
    fn test_parse_x_prefers_dedicated_oauth1_pair() {
        let json = r#"{
            "access_token": "bearer",
            "refresh_token": "refresh",
            "user_id": "42",
            "oauth1_access_token": "o1-token",
            "oauth1_access_token_secret": "o1-secret"
        }"#;
        let credential = parse_credential_json(PlatformId::X, json).unwrap();
        assert_eq!(credential.account_id, "42");
        assert_eq!(credential.access_token.expose(), "bearer");
        assert_eq!(credential.refresh_token.unwrap().expose(), "refresh");
        assert_eq!(credential.oauth1.unwrap().token.expose(), "o1-token");
    }

    #[test]
    fn test_parse_rejects_blank_token() {
        let result = parse_credential_json(PlatformId::Pinterest, r#"{"access_token": " "}"#);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_file_store_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = FileCredentialStore::new(dir.path().join("nested"));

        let credential = PlatformCredential::new(PlatformId::X, "42", "bearer")
            .with_refresh_token("refresh")
            .with_oauth1("o1-token", "o1-secret");
        store.save(&credential).await.unwrap();

        let loaded = store.load(PlatformId::X).await.unwrap().unwrap();
        assert_eq!(loaded, credential);
        assert!(!store.path_for(PlatformId::X).with_extension("json.tmp").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = FileCredentialStore::new(dir.path());
        store
            .save(&PlatformCredential::new(PlatformId::Facebook, "1", "t"))
            .await
            .unwrap();

        let mode = std::fs::metadata(store.path_for(PlatformId::Facebook))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_secret_token_debug_is_redacted() {
        let credential = PlatformCredential::new(PlatformId::X, "42", "very-secret-bearer");
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("very-secret-bearer"));
        assert!(debug.contains("[REDACTED]"));
    }
}

mod static_settings {
    use super::*;
    use crate::config::PlatformSettings;

    #[test]
    fn test_static_credential_requires_token() {
        let settings = PlatformSettings::default();
        assert!(PlatformCredential::from_settings(PlatformId::Facebook, &settings).is_none());
    }

    #[test]
    fn test_static_tumblr_needs_secret() {
        let mut settings = PlatformSettings {
            access_token: Some("tok".to_string()),
            ..Default::default()
        };
        assert!(PlatformCredential::from_settings(PlatformId::Tumblr, &settings).is_none());

        settings.access_token_secret = Some("sec".to_string());
        let credential = PlatformCredential::from_settings(PlatformId::Tumblr, &settings).unwrap();
        assert!(credential.oauth1.is_some());
    }

    #[test]
    fn test_static_x_token_is_not_a_bearer() {
        let settings = PlatformSettings {
            access_token: Some("oauth1-token".to_string()),
            access_token_secret: Some("oauth1-secret".to_string()),
            ..Default::default()
        };
        assert!(PlatformCredential::from_settings(PlatformId::X, &settings).is_none());
    }

    #[test]
    fn test_static_pinterest_carries_board() {
        let settings = PlatformSettings {
            access_token: Some("tok".to_string()),
            board_id: Some("b-1".to_string()),
            ..Default::default()
        };
        let credential =
            PlatformCredential::from_settings(PlatformId::Pinterest, &settings).unwrap();
        assert_eq!(credential.metadata.board_id.as_deref(), Some("b-1"));
        assert_eq!(credential.account_id, "");
    }
}
