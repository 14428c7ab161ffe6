//! Integration tests for the scheduler loop
//!
//! Runs full dispatch cycles against a real SQLite queue, real credential
//! stores and mock adapters.

use chrono::{Duration as ChronoDuration, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use libsocialcast::credentials::{CredentialSource, FileCredentialStore, PlatformCredential};
use libsocialcast::platforms::mock::MockPlatform;
use libsocialcast::{
    AdapterRegistry, Config, CredentialResolver, Database, NewPost, PlatformAdapter, PlatformError,
    PlatformId, PostStatus, PostStore, Scheduler, SchedulerSettings,
};

struct Harness {
    temp: TempDir,
    db: Arc<Database>,
    files: Arc<FileCredentialStore>,
}

impl Harness {
    async fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("posts.db");
        let db = Arc::new(Database::new(db_path.to_str().unwrap()).await.unwrap());
        let files = Arc::new(FileCredentialStore::new(temp.path().join("credentials")));
        Self { temp, db, files }
    }

    /// Resolver with the database in use and the given platforms stored as files
    async fn resolver(&self, with_files: &[PlatformId]) -> Arc<CredentialResolver> {
        for &platform in with_files {
            self.files
                .save(&PlatformCredential::new(platform, "file-account", "file-token"))
                .await
                .unwrap();
        }
        Arc::new(
            CredentialResolver::new(self.files.clone()).with_database(self.db.clone(), true),
        )
    }

    fn scheduler(
        &self,
        registry: AdapterRegistry,
        resolver: Arc<CredentialResolver>,
        persistence_enabled: bool,
    ) -> Scheduler {
        Scheduler::new(
            self.db.clone(),
            resolver,
            Arc::new(registry),
            SchedulerSettings {
                interval: Duration::from_millis(50),
                persistence_enabled,
                media_dir: Some(self.temp.path().join("media")),
            },
        )
    }

    async fn queue(&self, platform: PlatformId, content: &str, media: Option<PathBuf>) -> String {
        let when = Utc::now() - ChronoDuration::seconds(5);
        self.db
            .insert(&NewPost::scheduled(platform, content, media, when))
            .await
            .unwrap()
    }

    async fn status_of(&self, id: &str) -> (PostStatus, Option<String>, Option<String>) {
        let post = self.db.get_post(id).await.unwrap().unwrap();
        (post.status, post.status_message, post.platform_post_id)
    }
}

fn registry_of(mocks: &[&MockPlatform]) -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    for mock in mocks {
        registry.register(Arc::new((*mock).clone()));
    }
    registry
}

#[tokio::test]
async fn test_facebook_post_is_published() {
    let h = Harness::new().await;
    let facebook = MockPlatform::success_with_id(PlatformId::Facebook, "123");
    let scheduler = h.scheduler(
        registry_of(&[&facebook]),
        h.resolver(&[PlatformId::Facebook]).await,
        true,
    );

    let id = h.queue(PlatformId::Facebook, "Hello", None).await;
    let report = scheduler.run_cycle(Utc::now()).await;

    assert_eq!(report.attempted, 1);
    assert_eq!(report.published, 1);
    assert_eq!(report.failed, 0);

    let (status, message, platform_id) = h.status_of(&id).await;
    assert_eq!(status, PostStatus::Published);
    assert_eq!(platform_id.as_deref(), Some("123"));
    assert!(message.unwrap().contains("Posted to Facebook"));
    assert_eq!(facebook.calls()[0].content, "Hello");
}

#[tokio::test]
async fn test_missing_credentials_fail_only_their_posts() {
    let h = Harness::new().await;
    let mocks = [
        MockPlatform::success(PlatformId::Facebook),
        MockPlatform::success(PlatformId::Pinterest),
        MockPlatform::success(PlatformId::Tumblr),
        MockPlatform::success(PlatformId::X),
    ];
    let scheduler = h.scheduler(
        registry_of(&mocks.iter().collect::<Vec<_>>()),
        // Pinterest and Tumblr have no credentials anywhere
        h.resolver(&[PlatformId::Facebook, PlatformId::X]).await,
        true,
    );

    let mut ids = Vec::new();
    for mock in &mocks {
        ids.push(h.queue(mock.platform(), "Batch", None).await);
    }

    let report = scheduler.run_cycle(Utc::now()).await;
    assert_eq!(report.attempted, 4);
    assert_eq!(report.failed, 2);
    assert_eq!(report.published, 2);

    let (pinterest_status, pinterest_message, _) = h.status_of(&ids[1]).await;
    assert_eq!(pinterest_status, PostStatus::Failed);
    assert!(pinterest_message.unwrap().contains("No Pinterest credentials configured"));
    assert_eq!(h.status_of(&ids[2]).await.0, PostStatus::Failed);
    assert_eq!(h.status_of(&ids[0]).await.0, PostStatus::Published);
    assert_eq!(h.status_of(&ids[3]).await.0, PostStatus::Published);

    assert_eq!(mocks[1].call_count(), 0);
    assert_eq!(mocks[2].call_count(), 0);
}

#[tokio::test]
async fn test_panicking_adapter_does_not_stop_the_cycle() {
    let h = Harness::new().await;
    let x = MockPlatform::panicking(PlatformId::X, "adapter exploded");
    let facebook = MockPlatform::success(PlatformId::Facebook);
    let scheduler = h.scheduler(
        registry_of(&[&x, &facebook]),
        h.resolver(&[PlatformId::X, PlatformId::Facebook]).await,
        true,
    );

    let x_id = h.queue(PlatformId::X, "First", None).await;
    let facebook_id = h.queue(PlatformId::Facebook, "Second", None).await;

    let report = scheduler.run_cycle(Utc::now()).await;
    assert_eq!(report.attempted, 2);

    let (x_status, x_message, _) = h.status_of(&x_id).await;
    assert_eq!(x_status, PostStatus::Failed);
    assert!(x_message.unwrap().contains("adapter exploded"));
    assert_eq!(h.status_of(&facebook_id).await.0, PostStatus::Published);
    assert_eq!(facebook.call_count(), 1);
}

#[tokio::test]
async fn test_instagram_without_media_fails_before_any_request() {
    let h = Harness::new().await;
    // Real adapters: the Instagram precheck must reject the post offline
    let resolver = h.resolver(&[PlatformId::Instagram]).await;
    let registry = AdapterRegistry::with_defaults(&Config::default(), resolver.clone()).unwrap();
    let scheduler = h.scheduler(registry, resolver, true);

    let id = h.queue(PlatformId::Instagram, "Caption only", None).await;
    let report = scheduler.run_cycle(Utc::now()).await;
    assert_eq!(report.failed, 1);

    let (status, message, platform_id) = h.status_of(&id).await;
    assert_eq!(status, PostStatus::Failed);
    assert!(message.unwrap().contains("requires media"));
    assert!(platform_id.is_none());
}

#[tokio::test]
async fn test_adapter_failure_message_is_recorded() {
    let h = Harness::new().await;
    let pinterest = MockPlatform::failure(
        PlatformId::Pinterest,
        PlatformError::Validation(
            "No boards found. Create a board first on Pinterest.".to_string(),
        ),
    );
    let scheduler = h.scheduler(
        registry_of(&[&pinterest]),
        h.resolver(&[PlatformId::Pinterest]).await,
        true,
    );

    let id = h.queue(PlatformId::Pinterest, "Pin me", None).await;
    scheduler.run_cycle(Utc::now()).await;

    let (status, message, _) = h.status_of(&id).await;
    assert_eq!(status, PostStatus::Failed);
    assert!(message.unwrap().contains("No boards found"));
}

#[tokio::test]
async fn test_failed_posts_are_not_retried() {
    let h = Harness::new().await;
    let tumblr = MockPlatform::failure(
        PlatformId::Tumblr,
        PlatformError::Network("timed out".to_string()),
    );
    let scheduler = h.scheduler(
        registry_of(&[&tumblr]),
        h.resolver(&[PlatformId::Tumblr]).await,
        true,
    );

    h.queue(PlatformId::Tumblr, "Once", None).await;
    assert_eq!(scheduler.run_cycle(Utc::now()).await.attempted, 1);
    assert_eq!(scheduler.run_cycle(Utc::now()).await.attempted, 0);
    assert_eq!(tumblr.call_count(), 1);
}

#[tokio::test]
async fn test_future_posts_wait() {
    let h = Harness::new().await;
    let facebook = MockPlatform::success(PlatformId::Facebook);
    let scheduler = h.scheduler(
        registry_of(&[&facebook]),
        h.resolver(&[PlatformId::Facebook]).await,
        true,
    );

    let later = Utc::now() + ChronoDuration::hours(1);
    let id = h
        .db
        .insert(&NewPost::scheduled(PlatformId::Facebook, "Later", None, later))
        .await
        .unwrap();

    assert_eq!(scheduler.run_cycle(Utc::now()).await.attempted, 0);
    assert_eq!(h.status_of(&id).await.0, PostStatus::Scheduled);

    let report = scheduler.run_cycle(later).await;
    assert_eq!(report.published, 1);
}

#[tokio::test]
async fn test_disabled_persistence_is_a_no_op() {
    let h = Harness::new().await;
    let facebook = MockPlatform::success(PlatformId::Facebook);
    let scheduler = h.scheduler(
        registry_of(&[&facebook]),
        h.resolver(&[PlatformId::Facebook]).await,
        false,
    );

    let id = h.queue(PlatformId::Facebook, "Hello", None).await;
    let report = scheduler.run_cycle(Utc::now()).await;

    assert!(report.skipped);
    assert_eq!(report.attempted, 0);
    assert_eq!(h.status_of(&id).await.0, PostStatus::Scheduled);
    assert_eq!(facebook.call_count(), 0);
}

#[tokio::test]
async fn test_database_credentials_win_over_file() {
    let h = Harness::new().await;
    h.db
        .save(&PlatformCredential::new(PlatformId::Facebook, "db-page", "db-token"))
        .await
        .unwrap();

    let facebook = MockPlatform::success(PlatformId::Facebook);
    let scheduler = h.scheduler(
        registry_of(&[&facebook]),
        h.resolver(&[PlatformId::Facebook]).await,
        true,
    );

    h.queue(PlatformId::Facebook, "Hello", None).await;
    scheduler.run_cycle(Utc::now()).await;

    assert_eq!(facebook.calls()[0].account_id, "db-page");
}

#[tokio::test]
async fn test_media_is_loaded_and_missing_media_is_dropped() {
    let h = Harness::new().await;
    let media_dir = h.temp.path().join("media");
    std::fs::create_dir_all(&media_dir).unwrap();
    std::fs::write(media_dir.join("cake.jpg"), b"jpeg").unwrap();

    let facebook = MockPlatform::success(PlatformId::Facebook);
    let scheduler = h.scheduler(
        registry_of(&[&facebook]),
        h.resolver(&[PlatformId::Facebook]).await,
        true,
    );

    // Relative paths resolve against the media directory
    let with_media = h
        .queue(PlatformId::Facebook, "With cake", Some(PathBuf::from("cake.jpg")))
        .await;
    let missing = h
        .queue(
            PlatformId::Facebook,
            "Lost cake",
            Some(h.temp.path().join("gone.jpg")),
        )
        .await;

    scheduler.run_cycle(Utc::now()).await;

    let calls = facebook.calls();
    assert_eq!(calls.len(), 2);
    let with = calls.iter().find(|c| c.content == "With cake").unwrap();
    let without = calls.iter().find(|c| c.content == "Lost cake").unwrap();
    assert_eq!(with.media_filenames, vec!["cake.jpg".to_string()]);
    assert!(without.media_filenames.is_empty());

    assert_eq!(h.status_of(&with_media).await.0, PostStatus::Published);
    assert_eq!(h.status_of(&missing).await.0, PostStatus::Published);
}

#[tokio::test]
async fn test_started_scheduler_publishes_and_stops() {
    let h = Harness::new().await;
    let facebook = MockPlatform::success_with_id(PlatformId::Facebook, "123");
    let scheduler = h.scheduler(
        registry_of(&[&facebook]),
        h.resolver(&[PlatformId::Facebook]).await,
        true,
    );
    let id = h.queue(PlatformId::Facebook, "Hello", None).await;

    let handle = scheduler.start();

    let mut waited = 0;
    while (h.status_of(&id).await.0 == PostStatus::Scheduled || handle.status().await.ticks == 0)
        && waited < 100
    {
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += 1;
    }

    let status = handle.status().await;
    assert!(status.running);
    assert!(status.ticks >= 1);

    handle.stop().await;
    assert_eq!(h.status_of(&id).await.0, PostStatus::Published);
    assert_eq!(facebook.call_count(), 1);
}
