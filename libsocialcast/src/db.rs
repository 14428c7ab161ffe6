//! Database operations for Socialcast
//!
//! One SQLite database holds the scheduled post queue (`posts`) and the
//! credentials written by the setup flows (`platform_accounts`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::credentials::{
    CredentialMetadata, CredentialSource, OAuth1Token, PlatformCredential, SecretToken,
};
use crate::error::{DbError, Result};
use crate::types::{NewPost, PlatformId, PostStatus, ScheduledPost};

/// Durable queue of scheduled posts
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Queue a post and return its generated id
    async fn insert(&self, post: &NewPost) -> Result<String>;

    /// Posts still `scheduled` whose time is at or before `now`
    ///
    /// Ordered by scheduled time, then id.
    async fn get_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledPost>>;

    /// Move a post to `status`
    ///
    /// Repeating the current status is a no-op; leaving a terminal status is
    /// rejected with [`DbError::InvalidTransition`].
    async fn update_status(&self, id: &str, status: PostStatus) -> Result<()> {
        self.record_outcome(id, status, None, None).await
    }

    /// Move a post to `status` and keep the diagnostic message and platform id
    async fn record_outcome(
        &self,
        id: &str,
        status: PostStatus,
        message: Option<&str>,
        platform_post_id: Option<&str>,
    ) -> Result<()>;
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `db_path` and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // Forward slashes work for SQLite URLs on every OS; mode=rwc creates the file
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        Self::from_pool(pool).await
    }

    /// Private in-memory database, used by tests and dry runs
    pub async fn in_memory() -> Result<Self> {
        // A single long-lived connection keeps the in-memory database alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(DbError::SqlxError)?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Fetch a single post by id
    pub async fn get_post(&self, id: &str) -> Result<Option<ScheduledPost>> {
        let row = sqlx::query(
            r#"
            SELECT id, platform, content, media_path, scheduled_time, status,
                   status_message, platform_post_id
            FROM posts WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(|r| row_to_post(&r)).transpose()
    }

    /// List posts, newest schedule first, optionally filtered by status and platform
    pub async fn list_posts(
        &self,
        status: Option<PostStatus>,
        platform: Option<PlatformId>,
        limit: usize,
    ) -> Result<Vec<ScheduledPost>> {
        let mut where_clauses = vec!["1=1"];
        if status.is_some() {
            where_clauses.push("status = ?");
        }
        if platform.is_some() {
            where_clauses.push("platform = ?");
        }

        let query_str = format!(
            r#"
            SELECT id, platform, content, media_path, scheduled_time, status,
                   status_message, platform_post_id
            FROM posts
            WHERE {}
            ORDER BY scheduled_time DESC, id DESC
            LIMIT ?
            "#,
            where_clauses.join(" AND ")
        );

        let mut query = sqlx::query(&query_str);
        if let Some(status) = status {
            query = query.bind(status.as_str());
        }
        if let Some(platform) = platform {
            query = query.bind(platform.as_str());
        }
        query = query.bind(limit as i64);

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter().map(row_to_post).collect()
    }

    /// Number of posts in each status
    pub async fn count_by_status(&self) -> Result<Vec<(PostStatus, i64)>> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM posts GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        let mut counts = Vec::with_capacity(rows.len());
        for row in rows {
            let status: String = row.get("status");
            let status = status
                .parse::<PostStatus>()
                .map_err(|_| DbError::CorruptRow(format!("unknown status '{}'", status)))?;
            counts.push((status, row.get::<i64, _>("n")));
        }
        counts.sort_by_key(|(status, _)| status.as_str());
        Ok(counts)
    }
}

fn row_to_post(row: &SqliteRow) -> Result<ScheduledPost> {
    let id: String = row.get("id");

    let platform: String = row.get("platform");
    let platform = platform.parse::<PlatformId>().map_err(|_| {
        DbError::CorruptRow(format!("post {} has unknown platform '{}'", id, platform))
    })?;

    let status: String = row.get("status");
    let status = status
        .parse::<PostStatus>()
        .map_err(|_| DbError::CorruptRow(format!("post {} has unknown status '{}'", id, status)))?;

    let scheduled_millis: i64 = row.get("scheduled_time");
    let scheduled_time = DateTime::<Utc>::from_timestamp_millis(scheduled_millis)
        .ok_or_else(|| {
            DbError::CorruptRow(format!("post {} has invalid time {}", id, scheduled_millis))
        })?;

    Ok(ScheduledPost {
        platform,
        content: row.get("content"),
        media_path: row.get::<Option<String>, _>("media_path").map(PathBuf::from),
        scheduled_time,
        status,
        status_message: row.get("status_message"),
        platform_post_id: row.get("platform_post_id"),
        id,
    })
}

#[async_trait]
impl PostStore for Database {
    async fn insert(&self, post: &NewPost) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp_millis();
        let media_path = post
            .media_path
            .as_ref()
            .map(|p| p.to_string_lossy().to_string());

        sqlx::query(
            r#"
            INSERT INTO posts
                (id, platform, content, media_path, scheduled_time, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(post.platform.as_str())
        .bind(&post.content)
        .bind(media_path)
        .bind(post.scheduled_time.timestamp_millis())
        .bind(post.status.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        tracing::debug!(post_id = %id, platform = %post.platform, "Queued post");
        Ok(id)
    }

    async fn get_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledPost>> {
        let rows = sqlx::query(
            r#"
            SELECT id, platform, content, media_path, scheduled_time, status,
                   status_message, platform_post_id
            FROM posts
            WHERE status = 'scheduled' AND scheduled_time <= ?
            ORDER BY scheduled_time ASC, id ASC
            "#,
        )
        .bind(now.timestamp_millis())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(row_to_post).collect()
    }

    async fn record_outcome(
        &self,
        id: &str,
        status: PostStatus,
        message: Option<&str>,
        platform_post_id: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET status = ?,
                status_message = COALESCE(?, status_message),
                platform_post_id = COALESCE(?, platform_post_id),
                updated_at = ?
            WHERE id = ? AND (status = 'scheduled' OR status = ?)
            "#,
        )
        .bind(status.as_str())
        .bind(message)
        .bind(platform_post_id)
        .bind(Utc::now().timestamp_millis())
        .bind(id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let current: Option<String> = sqlx::query_scalar("SELECT status FROM posts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        match current {
            None => Err(DbError::NotFound(id.to_string()).into()),
            Some(from) => Err(DbError::InvalidTransition {
                id: id.to_string(),
                from,
                to: status.to_string(),
            }
            .into()),
        }
    }
}

#[async_trait]
impl CredentialSource for Database {
    fn source_name(&self) -> &'static str {
        "database"
    }

    async fn load(&self, platform: PlatformId) -> Result<Option<PlatformCredential>> {
        let row = sqlx::query(
            r#"
            SELECT account_id, access_token, refresh_token, oauth1_token, oauth1_token_secret,
                   username, display_name, board_id
            FROM platform_accounts
            WHERE platform = ?
            ORDER BY updated_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| {
            let oauth1 = match (
                r.get::<Option<String>, _>("oauth1_token"),
                r.get::<Option<String>, _>("oauth1_token_secret"),
            ) {
                (Some(token), Some(secret)) => Some(OAuth1Token {
                    token: SecretToken::new(token),
                    secret: SecretToken::new(secret),
                }),
                _ => None,
            };

            PlatformCredential {
                platform,
                account_id: r.get("account_id"),
                access_token: SecretToken::new(r.get::<String, _>("access_token")),
                refresh_token: r
                    .get::<Option<String>, _>("refresh_token")
                    .map(SecretToken::new),
                oauth1,
                metadata: CredentialMetadata {
                    username: r.get("username"),
                    display_name: r.get("display_name"),
                    board_id: r.get("board_id"),
                },
            }
        }))
    }

    async fn save(&self, credential: &PlatformCredential) -> Result<()> {
        let (oauth1_token, oauth1_secret) = match &credential.oauth1 {
            Some(pair) => (
                Some(pair.token.expose().to_string()),
                Some(pair.secret.expose().to_string()),
            ),
            None => (None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO platform_accounts
                (platform, account_id, access_token, refresh_token, oauth1_token,
                 oauth1_token_secret, username, display_name, board_id, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(platform, account_id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                oauth1_token = excluded.oauth1_token,
                oauth1_token_secret = excluded.oauth1_token_secret,
                username = excluded.username,
                display_name = excluded.display_name,
                board_id = excluded.board_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(credential.platform.as_str())
        .bind(&credential.account_id)
        .bind(credential.access_token.expose())
        .bind(credential.refresh_token.as_ref().map(|t| t.expose().to_string()))
        .bind(oauth1_token)
        .bind(oauth1_secret)
        .bind(&credential.metadata.username)
        .bind(&credential.metadata.display_name)
        .bind(&credential.metadata.board_id)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn queue(db: &Database, platform: PlatformId, at: DateTime<Utc>) -> String {
        db.insert(&NewPost::scheduled(platform, "hello", None, at))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get_post() {
        let db = Database::in_memory().await.unwrap();
        let at = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let post = NewPost::scheduled(
            PlatformId::Tumblr,
            "Scheduled content",
            Some(PathBuf::from("/media/cat.gif")),
            at,
        );

        let id = db.insert(&post).await.unwrap();
        let stored = db.get_post(&id).await.unwrap().unwrap();

        assert_eq!(stored.platform, PlatformId::Tumblr);
        assert_eq!(stored.content, "Scheduled content");
        assert_eq!(stored.media_path, Some(PathBuf::from("/media/cat.gif")));
        assert_eq!(stored.scheduled_time, at);
        assert_eq!(stored.status, PostStatus::Scheduled);
        assert!(db.get_post("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_due_includes_boundary() {
        let db = Database::in_memory().await.unwrap();
        let now = Utc::now();

        let past = queue(&db, PlatformId::Facebook, now - Duration::seconds(10)).await;
        let exact = queue(&db, PlatformId::X, now).await;
        let _future = queue(&db, PlatformId::Pinterest, now + Duration::seconds(10)).await;

        let due = db.get_due(now).await.unwrap();
        let ids: Vec<_> = due.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec![past, exact]);
    }

    #[tokio::test]
    async fn test_get_due_respects_milliseconds() {
        let db = Database::in_memory().await.unwrap();
        let noon = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();

        let id = queue(&db, PlatformId::Facebook, noon + Duration::milliseconds(900)).await;

        // Same second, but 800ms before the post is due
        assert!(db.get_due(noon + Duration::milliseconds(100)).await.unwrap().is_empty());

        let due = db.get_due(noon + Duration::milliseconds(900)).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, id);
        assert_eq!(due[0].scheduled_time, noon + Duration::milliseconds(900));
    }

    #[tokio::test]
    async fn test_get_due_skips_terminal_posts() {
        let db = Database::in_memory().await.unwrap();
        let now = Utc::now();

        let published = queue(&db, PlatformId::Facebook, now - Duration::seconds(5)).await;
        let failed = queue(&db, PlatformId::Tumblr, now - Duration::seconds(5)).await;
        let pending = queue(&db, PlatformId::X, now - Duration::seconds(5)).await;

        db.update_status(&published, PostStatus::Published).await.unwrap();
        db.update_status(&failed, PostStatus::Failed).await.unwrap();

        let due = db.get_due(now).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, pending);
    }

    #[tokio::test]
    async fn test_get_due_order_is_deterministic() {
        let db = Database::in_memory().await.unwrap();
        let now = Utc::now();
        let later = queue(&db, PlatformId::X, now - Duration::seconds(1)).await;
        let earlier = queue(&db, PlatformId::X, now - Duration::seconds(60)).await;

        let first = db.get_due(now).await.unwrap();
        let second = db.get_due(now).await.unwrap();
        assert_eq!(first[0].id, earlier);
        assert_eq!(first[1].id, later);
        assert_eq!(
            first.iter().map(|p| &p.id).collect::<Vec<_>>(),
            second.iter().map(|p| &p.id).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_update_status_is_idempotent() {
        let db = Database::in_memory().await.unwrap();
        let id = queue(&db, PlatformId::Instagram, Utc::now()).await;

        db.update_status(&id, PostStatus::Failed).await.unwrap();
        db.update_status(&id, PostStatus::Failed).await.unwrap();

        let post = db.get_post(&id).await.unwrap().unwrap();
        assert_eq!(post.status, PostStatus::Failed);
    }

    #[tokio::test]
    async fn test_terminal_status_never_reverses() {
        let db = Database::in_memory().await.unwrap();
        let id = queue(&db, PlatformId::Facebook, Utc::now()).await;
        db.update_status(&id, PostStatus::Published).await.unwrap();

        for next in [PostStatus::Scheduled, PostStatus::Failed] {
            let err = db.update_status(&id, next).await.unwrap_err();
            assert!(matches!(
                err,
                crate::error::SocialcastError::Database(DbError::InvalidTransition { .. })
            ));
        }

        let post = db.get_post(&id).await.unwrap().unwrap();
        assert_eq!(post.status, PostStatus::Published);
    }

    #[tokio::test]
    async fn test_update_status_unknown_id() {
        let db = Database::in_memory().await.unwrap();
        let err = db.update_status("nope", PostStatus::Failed).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::SocialcastError::Database(DbError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_record_outcome_keeps_message_and_platform_id() {
        let db = Database::in_memory().await.unwrap();
        let id = queue(&db, PlatformId::Facebook, Utc::now()).await;

        db.record_outcome(&id, PostStatus::Published, Some("Posted to Facebook"), Some("123"))
            .await
            .unwrap();
        // Repeating without details leaves the recorded details in place
        db.update_status(&id, PostStatus::Published).await.unwrap();

        let post = db.get_post(&id).await.unwrap().unwrap();
        assert_eq!(post.status_message.as_deref(), Some("Posted to Facebook"));
        assert_eq!(post.platform_post_id.as_deref(), Some("123"));
    }

    #[tokio::test]
    async fn test_list_and_count() {
        let db = Database::in_memory().await.unwrap();
        let now = Utc::now();
        let a = queue(&db, PlatformId::Facebook, now).await;
        queue(&db, PlatformId::X, now).await;
        queue(&db, PlatformId::X, now + Duration::hours(1)).await;
        db.update_status(&a, PostStatus::Failed).await.unwrap();

        let all = db.list_posts(None, None, 10).await.unwrap();
        assert_eq!(all.len(), 3);

        let scheduled_x = db
            .list_posts(Some(PostStatus::Scheduled), Some(PlatformId::X), 10)
            .await
            .unwrap();
        assert_eq!(scheduled_x.len(), 2);

        let limited = db.list_posts(None, None, 1).await.unwrap();
        assert_eq!(limited.len(), 1);

        let counts = db.count_by_status().await.unwrap();
        assert_eq!(
            counts,
            vec![(PostStatus::Failed, 1), (PostStatus::Scheduled, 2)]
        );
    }

    #[tokio::test]
    async fn test_file_backed_database_persists() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("posts.db");
        let path = path.to_str().unwrap();

        let id = {
            let db = Database::new(path).await.unwrap();
            queue(&db, PlatformId::Pinterest, Utc::now()).await
        };

        let reopened = Database::new(path).await.unwrap();
        assert!(reopened.get_post(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_credential_round_trip_and_latest_wins() {
        let db = Database::in_memory().await.unwrap();
        assert!(db.load(PlatformId::Tumblr).await.unwrap().is_none());

        let first = PlatformCredential::new(PlatformId::Tumblr, "first-blog", "t1")
            .with_oauth1("t1", "s1");
        db.save(&first).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let mut second = PlatformCredential::new(PlatformId::Tumblr, "second-blog", "t2")
            .with_oauth1("t2", "s2");
        second.metadata.display_name = Some("Second".to_string());
        db.save(&second).await.unwrap();

        let loaded = db.load(PlatformId::Tumblr).await.unwrap().unwrap();
        assert_eq!(loaded, second);

        // Other platforms are unaffected
        assert!(db.load(PlatformId::X).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_credential_save_upserts_same_account() {
        let db = Database::in_memory().await.unwrap();
        db.save(&PlatformCredential::new(PlatformId::Pinterest, "u1", "old"))
            .await
            .unwrap();
        db.save(&PlatformCredential::new(PlatformId::Pinterest, "u1", "new"))
            .await
            .unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM platform_accounts")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);

        let loaded = db.load(PlatformId::Pinterest).await.unwrap().unwrap();
        assert_eq!(loaded.access_token.expose(), "new");
    }
}
