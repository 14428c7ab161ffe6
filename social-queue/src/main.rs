//! social-queue - Schedule posts and inspect the post queue
//!
//! Every command needs the database, so USE_DATABASE must be enabled.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use libsocialcast::credentials::CredentialSource;
use libsocialcast::error::ConfigError;
use libsocialcast::scheduling::parse_schedule;
use libsocialcast::{
    AdapterRegistry, Config, CredentialResolver, Database, PlatformId, PostStatus, PostStore,
    PostingService, Result, ScheduledPost, SocialcastError,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "social-queue")]
#[command(version)]
#[command(about = "Schedule posts and inspect the post queue")]
#[command(long_about = "\
social-queue - Schedule posts and inspect the post queue

DESCRIPTION:
    social-queue adds posts to the Socialcast queue, one row per platform,
    and shows what is waiting, published or failed. social-send publishes
    the queued posts when they become due.

COMMANDS:
    schedule    Queue a post for one or more platforms
    list        List queued posts
    show        Show one post in detail
    stats       Count posts by status

USAGE EXAMPLES:
    # Publish on Facebook and X in two hours
    social-queue schedule \"Launch day!\" -p facebook,x --at 2h

    # Queue a photo for Instagram tomorrow morning
    social-queue schedule \"Morning\" -p instagram --media sunrise.jpg --at \"tomorrow 9am\"

    # Absolute times are UTC
    social-queue schedule \"Release notes\" -p tumblr --at \"2025-11-20 15:00\"

    # Failed posts with their error messages
    social-queue list --status failed

CONFIGURATION:
    Configuration file: ~/.config/socialcast/config.toml
    Database location:  ~/.local/share/socialcast/posts.db

    Override with environment variables:
        SOCIALCAST_CONFIG  - Path to config file
        USE_DATABASE       - Must be true for the queue to be available
        DATABASE_PATH      - Path to database file
        MEDIA_DIR          - Where scheduled media is copied

EXIT CODES:
    0 - Success
    1 - Operation failed (persistence disabled, database error)
    3 - Invalid input (bad post ID, time format, platform, etc.)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Queue a post for one or more platforms
    Schedule {
        /// Post content
        content: String,

        /// Target platform(s), repeatable or comma-separated
        #[arg(short, long = "platform", value_delimiter = ',')]
        platforms: Vec<String>,

        /// When to publish (e.g. "30m", "tomorrow 9am", "2025-11-20 15:00")
        #[arg(long)]
        at: String,

        /// Media file to attach; it is copied into the media directory
        #[arg(short, long)]
        media: Option<PathBuf>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List queued posts
    List {
        /// Filter by status (scheduled, published, failed)
        #[arg(short, long)]
        status: Option<String>,

        /// Filter by platform
        #[arg(short, long)]
        platform: Option<String>,

        /// Maximum number of posts to show
        #[arg(short, long, default_value = "50")]
        limit: usize,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show one post in detail
    Show {
        /// Post ID
        post_id: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Count posts by status
    Stats {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = SocialcastError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(SocialcastError::InvalidInput(format!(
                "Invalid format '{}'. Must be 'text' or 'json'",
                other
            ))),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    libsocialcast::logging::init_with_verbosity(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = open_queue(&config).await?;

    match cli.command {
        Commands::Schedule {
            content,
            platforms,
            at,
            media,
            format,
        } => {
            let format = format.parse()?;
            let platforms = parse_platforms(&platforms)?;
            cmd_schedule(&config, db, &content, &platforms, &at, media, format).await
        }
        Commands::List {
            status,
            platform,
            limit,
            format,
        } => {
            let status = status.map(|s| s.parse::<PostStatus>()).transpose()?;
            let platform = platform.map(|p| p.parse::<PlatformId>()).transpose()?;
            cmd_list(&db, status, platform, limit, format.parse()?).await
        }
        Commands::Show { post_id, format } => cmd_show(&db, &post_id, format.parse()?).await,
        Commands::Stats { format } => cmd_stats(&db, format.parse()?).await,
    }
}

/// The queue database, or an error when persistence is disabled
async fn open_queue(config: &Config) -> Result<Arc<Database>> {
    if !config.persistence_enabled() {
        return Err(ConfigError::PersistenceDisabled(
            "the post queue requires the database; set USE_DATABASE=true".to_string(),
        )
        .into());
    }
    let db = Database::new(&config.database.path).await?;
    debug!(path = %config.database.path, "Opened post queue");
    Ok(Arc::new(db))
}

fn parse_platforms(names: &[String]) -> Result<Vec<PlatformId>> {
    let mut platforms = Vec::new();
    for name in names.iter().filter(|n| !n.trim().is_empty()) {
        let platform: PlatformId = name.parse()?;
        if !platforms.contains(&platform) {
            platforms.push(platform);
        }
    }
    Ok(platforms)
}

async fn cmd_schedule(
    config: &Config,
    db: Arc<Database>,
    content: &str,
    platforms: &[PlatformId],
    at: &str,
    media: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let when = parse_schedule(at)?;

    let credentials = Arc::new(CredentialResolver::from_config(
        config,
        Some(Arc::clone(&db) as Arc<dyn CredentialSource>),
    ));
    let registry = Arc::new(AdapterRegistry::with_defaults(config, Arc::clone(&credentials))?);
    let store: Arc<dyn PostStore> = db;
    let service = PostingService::from_config(config, registry, credentials, Some(store));

    let ids = service
        .schedule_post(platforms, content, media.as_deref(), when)
        .await?;
    info!(count = ids.len(), scheduled_time = %when, "Queued posts");

    match format {
        OutputFormat::Json => {
            let output: Vec<serde_json::Value> = platforms
                .iter()
                .zip(&ids)
                .map(|(platform, id)| {
                    serde_json::json!({
                        "id": id,
                        "platform": platform.as_str(),
                        "scheduled_time": when.to_rfc3339(),
                    })
                })
                .collect();
            print_json(&output)?;
        }
        OutputFormat::Text => {
            for (platform, id) in platforms.iter().zip(&ids) {
                println!(
                    "{} | {} | {}",
                    id,
                    platform,
                    when.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
        }
    }
    Ok(())
}

async fn cmd_list(
    db: &Database,
    status: Option<PostStatus>,
    platform: Option<PlatformId>,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let posts = db.list_posts(status, platform, limit).await?;

    match format {
        OutputFormat::Json => {
            let output: Vec<serde_json::Value> = posts.iter().map(post_json).collect();
            print_json(&output)?;
        }
        OutputFormat::Text => {
            let now = Utc::now();
            for post in &posts {
                println!(
                    "{} | {} | {} | {} | {}",
                    post.id,
                    post.platform,
                    post.status,
                    describe_time(now, post.scheduled_time, post.status),
                    truncate_content(&post.content, 50)
                );
            }
        }
    }
    Ok(())
}

async fn cmd_show(db: &Database, post_id: &str, format: OutputFormat) -> Result<()> {
    let post = db
        .get_post(post_id)
        .await?
        .ok_or_else(|| SocialcastError::InvalidInput(format!("Post not found: {}", post_id)))?;

    match format {
        OutputFormat::Json => print_json(&post_json(&post))?,
        OutputFormat::Text => {
            println!("ID:        {}", post.id);
            println!("Platform:  {}", post.platform.display_name());
            println!("Status:    {}", post.status);
            println!(
                "Scheduled: {}",
                post.scheduled_time.format("%Y-%m-%d %H:%M:%S UTC")
            );
            if let Some(media) = &post.media_path {
                println!("Media:     {}", media.display());
            }
            if let Some(message) = &post.status_message {
                println!("Message:   {}", message);
            }
            if let Some(remote_id) = &post.platform_post_id {
                println!("Remote ID: {}", remote_id);
            }
            println!();
            println!("{}", post.content);
        }
    }
    Ok(())
}

async fn cmd_stats(db: &Database, format: OutputFormat) -> Result<()> {
    let counts = db.count_by_status().await?;
    let count_of = |status: PostStatus| {
        counts
            .iter()
            .find(|(s, _)| *s == status)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    };

    let scheduled = count_of(PostStatus::Scheduled);
    let published = count_of(PostStatus::Published);
    let failed = count_of(PostStatus::Failed);

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "scheduled": scheduled,
            "published": published,
            "failed": failed,
            "total": scheduled + published + failed,
        }))?,
        OutputFormat::Text => {
            println!("Scheduled: {}", scheduled);
            println!("Published: {}", published);
            println!("Failed:    {}", failed);
            println!("Total:     {}", scheduled + published + failed);
        }
    }
    Ok(())
}

fn post_json(post: &ScheduledPost) -> serde_json::Value {
    serde_json::json!({
        "id": post.id,
        "platform": post.platform.as_str(),
        "content": post.content,
        "media_path": post.media_path,
        "scheduled_time": post.scheduled_time.to_rfc3339(),
        "status": post.status.as_str(),
        "status_message": post.status_message,
        "platform_post_id": post.platform_post_id,
    })
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| SocialcastError::InvalidInput(format!("Failed to serialize output: {}", e)))?;
    println!("{}", rendered);
    Ok(())
}

/// Truncate content to `max_chars` characters with an ellipsis
fn truncate_content(content: &str, max_chars: usize) -> String {
    let single_line = content.replace('\n', " ");
    if single_line.chars().count() <= max_chars {
        single_line
    } else {
        let truncated: String = single_line.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// Relative time for queued posts, absolute time once they are settled
fn describe_time(now: DateTime<Utc>, scheduled: DateTime<Utc>, status: PostStatus) -> String {
    if status.is_terminal() {
        return scheduled.format("%Y-%m-%d %H:%M UTC").to_string();
    }

    let diff = (scheduled - now).num_seconds();
    if diff < 0 {
        return "overdue".to_string();
    }

    let minutes = diff / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("in {} day{}", days, if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("in {} hour{}", hours, if hours == 1 { "" } else { "s" })
    } else if minutes > 0 {
        format!("in {} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        "in <1 minute".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_truncate_content_counts_chars() {
        assert_eq!(truncate_content("short", 10), "short");
        assert_eq!(truncate_content("héllo wörld", 5), "héllo...");
        assert_eq!(truncate_content("two\nlines", 20), "two lines");
    }

    #[test]
    fn test_describe_time() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(
            describe_time(now, now + Duration::hours(3), PostStatus::Scheduled),
            "in 3 hours"
        );
        assert_eq!(
            describe_time(now, now + Duration::days(1), PostStatus::Scheduled),
            "in 1 day"
        );
        assert_eq!(
            describe_time(now, now - Duration::minutes(5), PostStatus::Scheduled),
            "overdue"
        );
        assert_eq!(
            describe_time(now, now, PostStatus::Published),
            "2025-06-01 12:00 UTC"
        );
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
