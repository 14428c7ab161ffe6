//! Scheduler loop: publishes due posts on a fixed interval
//!
//! Each tick re-reads the queue, so nothing about posts or credentials is
//! kept between ticks. Posts are handled one at a time; whatever happens to
//! one post (missing credentials, adapter failure, even a panic) is recorded
//! on that post and the cycle moves on.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::credentials::{CredentialLookup, CredentialResolver};
use crate::db::PostStore;
use crate::platforms::{AdapterRegistry, PublishRequest};
use crate::types::{MediaAttachment, PostStatus, ScheduledPost};

/// How the scheduler runs
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub interval: Duration,
    /// Scheduled posting needs the database; without it every cycle is a no-op
    pub persistence_enabled: bool,
    /// Base directory for relative media paths
    pub media_dir: Option<PathBuf>,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.scheduler.interval(),
            persistence_enabled: config.persistence_enabled(),
            media_dir: Some(config.media.expanded_dir()),
        }
    }
}

/// Counts from one dispatch cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub attempted: usize,
    pub published: usize,
    pub failed: usize,
    /// The cycle did nothing because persistence is disabled
    pub skipped: bool,
    /// Outcomes that could not be written back to the store
    pub status_update_errors: usize,
}

/// Snapshot of a running scheduler
#[derive(Debug, Clone, Default)]
pub struct SchedulerStatus {
    pub running: bool,
    pub ticks: u64,
    pub last_tick: Option<DateTime<Utc>>,
    pub last_report: Option<CycleReport>,
}

/// Final state of one post within a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
struct PostOutcome {
    status: PostStatus,
    message: String,
    platform_post_id: Option<String>,
}

impl PostOutcome {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            status: PostStatus::Failed,
            message: message.into(),
            platform_post_id: None,
        }
    }
}

pub struct Scheduler {
    store: Arc<dyn PostStore>,
    credentials: Arc<CredentialResolver>,
    registry: Arc<AdapterRegistry>,
    settings: SchedulerSettings,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn PostStore>,
        credentials: Arc<CredentialResolver>,
        registry: Arc<AdapterRegistry>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            store,
            credentials,
            registry,
            settings,
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Run one dispatch cycle for posts due at `now`
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::default();

        if !self.settings.persistence_enabled {
            debug!("Persistence disabled, scheduler cycle skipped");
            report.skipped = true;
            return report;
        }

        let due = match self.store.get_due(now).await {
            Ok(posts) => posts,
            Err(e) => {
                error!(error = %e, "Failed to read due posts");
                return report;
            }
        };

        if due.is_empty() {
            debug!("No posts due");
            return report;
        }
        info!("Found {} post(s) due for posting", due.len());

        for post in due {
            report.attempted += 1;

            let outcome = match AssertUnwindSafe(self.process_post(&post)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let reason = panic_message(panic.as_ref());
                    error!(
                        post_id = %post.id,
                        platform = %post.platform,
                        reason = %reason,
                        "Publishing panicked"
                    );
                    PostOutcome::failed(format!("Unexpected error while publishing: {}", reason))
                }
            };

            match outcome.status {
                PostStatus::Published => report.published += 1,
                _ => report.failed += 1,
            }

            if let Err(e) = self
                .store
                .record_outcome(
                    &post.id,
                    outcome.status,
                    Some(&outcome.message),
                    outcome.platform_post_id.as_deref(),
                )
                .await
            {
                report.status_update_errors += 1;
                warn!(post_id = %post.id, error = %e, "Failed to update post status");
            }
        }

        info!(
            attempted = report.attempted,
            published = report.published,
            failed = report.failed,
            "Scheduler cycle complete"
        );
        report
    }

    async fn process_post(&self, post: &ScheduledPost) -> PostOutcome {
        debug!(post_id = %post.id, platform = %post.platform, "Processing post");

        let credential = match self.credentials.resolve(post.platform).await {
            CredentialLookup::Found { credential, .. } => credential,
            missing => {
                let message = missing.describe_missing(post.platform);
                warn!(post_id = %post.id, platform = %post.platform, "{}", message);
                return PostOutcome::failed(message);
            }
        };

        let mut request = PublishRequest::new(post.content.clone());
        if let Some(media) = self.load_media(post) {
            request = request.with_media(media);
        }

        let Some(adapter) = self.registry.get(post.platform) else {
            return PostOutcome::failed(format!(
                "No adapter registered for {}",
                post.platform.display_name()
            ));
        };

        let result = adapter.publish(&request, &credential).await;
        PostOutcome {
            status: result.status(),
            message: result.message,
            platform_post_id: result.post_id,
        }
    }

    /// Media for a post; a missing or unreadable file means no media
    fn load_media(&self, post: &ScheduledPost) -> Option<MediaAttachment> {
        let stored = post.media_path.as_ref()?;
        let path = self.resolve_media_path(stored);

        if !path.exists() {
            warn!(
                post_id = %post.id,
                path = %path.display(),
                "Media file missing, posting without media"
            );
            return None;
        }

        match MediaAttachment::from_path(&path) {
            Ok(media) => Some(media),
            Err(e) => {
                warn!(
                    post_id = %post.id,
                    path = %path.display(),
                    error = %e,
                    "Could not read media file, posting without media"
                );
                None
            }
        }
    }

    fn resolve_media_path(&self, stored: &Path) -> PathBuf {
        match &self.settings.media_dir {
            Some(dir) if stored.is_relative() => dir.join(stored),
            _ => stored.to_path_buf(),
        }
    }

    /// Spawn the tick loop on the current runtime
    pub fn start(self) -> SchedulerHandle {
        let interval = self.settings.interval;
        if self.settings.persistence_enabled {
            info!("Scheduler started, checking for due posts every {:?}", interval);
        } else {
            info!("Persistence disabled; scheduled posting is inactive");
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let status = Arc::new(RwLock::new(SchedulerStatus {
            running: true,
            ..Default::default()
        }));
        let task_status = Arc::clone(&status);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // A started cycle always runs to completion
                        let report = self.run_cycle(Utc::now()).await;
                        let mut status = task_status.write().await;
                        status.ticks += 1;
                        status.last_tick = Some(Utc::now());
                        status.last_report = Some(report);
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            task_status.write().await.running = false;
            info!("Scheduler stopped");
        });

        SchedulerHandle {
            shutdown_tx,
            status,
            task,
        }
    }
}

/// Handle to a running scheduler
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    status: Arc<RwLock<SchedulerStatus>>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn status(&self) -> SchedulerStatus {
        self.status.read().await.clone()
    }

    /// Signal shutdown and wait for the in-flight cycle to finish
    pub async fn stop(self) {
        debug!("Stopping scheduler");
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Scheduler task ended abnormally");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.database.enabled = true;
        config.scheduler.interval_secs = 15;

        let settings = SchedulerSettings::from_config(&config);
        assert!(settings.persistence_enabled);
        assert_eq!(settings.interval, Duration::from_secs(15));
    }

    #[test]
    fn test_relative_media_resolves_against_media_dir() {
        let settings = SchedulerSettings {
            interval: Duration::from_secs(60),
            persistence_enabled: true,
            media_dir: Some(PathBuf::from("/srv/media")),
        };
        let scheduler = Scheduler::new(
            Arc::new(NoStore),
            Arc::new(CredentialResolver::new(Arc::new(crate::credentials::FileCredentialStore::new(
                "/nonexistent",
            )))),
            Arc::new(AdapterRegistry::new()),
            settings,
        );

        assert_eq!(
            scheduler.resolve_media_path(Path::new("cat.jpg")),
            PathBuf::from("/srv/media/cat.jpg")
        );
        assert_eq!(
            scheduler.resolve_media_path(Path::new("/tmp/dog.png")),
            PathBuf::from("/tmp/dog.png")
        );
    }

    struct NoStore;

    #[async_trait::async_trait]
    impl PostStore for NoStore {
        async fn insert(&self, _post: &crate::types::NewPost) -> crate::error::Result<String> {
            Ok(String::new())
        }

        async fn get_due(&self, _now: DateTime<Utc>) -> crate::error::Result<Vec<ScheduledPost>> {
            Ok(Vec::new())
        }

        async fn record_outcome(
            &self,
            _id: &str,
            _status: PostStatus,
            _message: Option<&str>,
            _platform_post_id: Option<&str>,
        ) -> crate::error::Result<()> {
            Ok(())
        }
    }
}
