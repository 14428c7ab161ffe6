//! social-post - Publish a post to social platforms right now
//!
//! Nothing is written to the post queue; use social-queue to schedule.

use clap::Parser;
use libsocialcast::credentials::{CredentialSource, UnavailableSource};
use libsocialcast::error::PlatformError;
use libsocialcast::service::{validate_post, PlatformPublishResult};
use libsocialcast::{
    AdapterRegistry, Config, CredentialResolver, Database, MediaAttachment, PlatformId,
    PostingService, Result, SocialcastError,
};
use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Parser, Debug)]
#[command(name = "social-post")]
#[command(version)]
#[command(about = "Publish a post to social platforms immediately")]
#[command(long_about = "\
social-post - Publish a post to social platforms immediately

DESCRIPTION:
    social-post sends one post to every selected platform at once and
    reports the outcome per platform. Nothing is queued; failed platforms
    are not retried.

USAGE EXAMPLES:
    # Post text to Facebook and Tumblr
    social-post \"Hello world\" -p facebook,tumblr

    # Post a photo to Instagram (media is required there)
    social-post \"Sunset\" -p instagram --media sunset.jpg

    # Read content from stdin, print JSON
    echo \"Hello\" | social-post -p x --format json

PLATFORMS:
    facebook, instagram, pinterest, tumblr, x

CONFIGURATION:
    Configuration file: ~/.config/socialcast/config.toml
    Credentials:        ~/.local/share/socialcast/credentials/

    Override with environment variables:
        SOCIALCAST_CONFIG  - Path to config file
        USE_DATABASE       - Read credentials from the database first
        CREDENTIALS_DIR    - Directory of credential JSON files

EXIT CODES:
    0 - Posted to every platform
    1 - At least one platform failed
    2 - Authentication failed (missing or rejected credentials)
    3 - Invalid input (empty content, unknown platform, unreadable media)
")]
struct Cli {
    /// Content to post (reads from stdin if not provided)
    content: Option<String>,

    /// Target platform(s), repeatable or comma-separated
    #[arg(short, long = "platform", value_delimiter = ',')]
    platforms: Vec<String>,

    /// Media file to attach (repeatable)
    #[arg(short, long)]
    media: Vec<PathBuf>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Usage errors are invalid input; --help and --version are not errors
            let code = if e.use_stderr() { 3 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    libsocialcast::logging::init_with_verbosity(cli.verbose);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let json = parse_format(&cli.format)?;
    let content = read_content(cli.content)?;
    let platforms = parse_platforms(&cli.platforms)?;
    validate_post(&content, &platforms)?;

    let media = cli
        .media
        .iter()
        .map(|path| {
            let attachment = MediaAttachment::from_path(path).map_err(|e| {
                SocialcastError::InvalidInput(format!(
                    "Cannot read media file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            debug!(file = %path.display(), bytes = attachment.bytes.len(), "Loaded media");
            Ok(attachment)
        })
        .collect::<Result<Vec<_>>>()?;

    let config = Config::load()?;
    let database = if config.persistence_enabled() {
        Some(open_credential_database(&config.database.path).await)
    } else {
        None
    };
    let credentials = Arc::new(CredentialResolver::from_config(&config, database));
    let registry = AdapterRegistry::with_defaults(&config, Arc::clone(&credentials))?;

    let service = PostingService::new(Arc::new(registry), credentials);
    let results = service.publish_now(&platforms, &content, media).await;

    if json {
        print_json(&results)?;
    } else {
        print_text(&results);
    }

    Ok(exit_code_for(&results))
}

/// The credential database, or a stand-in when it cannot be opened
///
/// Publishing never depends on the database: lookups fall back to the
/// credential files.
async fn open_credential_database(path: &str) -> Arc<dyn CredentialSource> {
    match Database::new(path).await {
        Ok(db) => {
            debug!(path = %path, "Opened credential database");
            Arc::new(db)
        }
        Err(e) => {
            warn!(path = %path, error = %e, "Cannot open database, using credential files");
            Arc::new(UnavailableSource::new(e.to_string()))
        }
    }
}

fn parse_format(format: &str) -> Result<bool> {
    match format {
        "text" => Ok(false),
        "json" => Ok(true),
        other => Err(SocialcastError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            other
        ))),
    }
}

/// Content from the argument, else from piped stdin
fn read_content(arg: Option<String>) -> Result<String> {
    if let Some(content) = arg {
        return Ok(content);
    }

    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Err(SocialcastError::InvalidInput(
            "No content provided. Pass it as an argument or pipe it on stdin".to_string(),
        ));
    }

    let mut buffer = String::new();
    stdin
        .lock()
        .read_to_string(&mut buffer)
        .map_err(|e| SocialcastError::InvalidInput(format!("Failed to read stdin: {}", e)))?;
    Ok(buffer.trim_end().to_string())
}

/// Parse platform names, dropping duplicates but keeping the order given
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

fn print_text(results: &[PlatformPublishResult]) {
    for entry in results {
        if entry.result.success {
            println!("{}: {}", entry.platform, entry.result.message);
        } else {
            eprintln!("{}: {}", entry.platform, entry.result.message);
        }
    }
}

fn print_json(results: &[PlatformPublishResult]) -> Result<()> {
    let output: Vec<serde_json::Value> = results
        .iter()
        .map(|entry| {
            serde_json::json!({
                "platform": entry.platform.as_str(),
                "success": entry.result.success,
                "message": entry.result.message,
                "post_id": entry.result.post_id,
                "error": entry.result.error.as_ref().map(|e| e.kind()),
            })
        })
        .collect();

    let rendered = serde_json::to_string_pretty(&output).map_err(|e| {
        SocialcastError::InvalidInput(format!("Failed to serialize results: {}", e))
    })?;
    println!("{}", rendered);
    Ok(())
}

/// 0 when everything posted, 2 when every failure was authentication, else 1
fn exit_code_for(results: &[PlatformPublishResult]) -> i32 {
    let failures: Vec<_> = results.iter().filter(|r| !r.result.success).collect();
    if failures.is_empty() {
        0
    } else if failures
        .iter()
        .all(|r| matches!(r.result.error, Some(PlatformError::Authentication(_))))
    {
        2
    } else {
        1
    }
}
