//! social-creds - Credential management for Socialcast
//!
//! Imports the JSON produced by each platform's setup flow and reports which
//! credential the publishers would actually use.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use libsocialcast::credentials::{
    parse_credential_json, CredentialSource, CredentialSourceKind, UnavailableSource,
};
use libsocialcast::error::CredentialError;
use libsocialcast::{
    Config, CredentialLookup, CredentialResolver, Database, FileCredentialStore,
    PlatformCredential, PlatformId, SocialcastError,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "social-creds")]
#[command(version)]
#[command(about = "Import, inspect and check Socialcast platform credentials")]
#[command(long_about = "\
social-creds - Credential management for Socialcast

DESCRIPTION:
    Credentials are looked up in the database first (when USE_DATABASE is
    enabled), then in the per-platform JSON files, then in static tokens
    from the configuration.

COMMANDS:
    import   Store a credential JSON file for a platform
    show     Show the credential in use for a platform (tokens redacted)
    check    Report which platforms have usable credentials

USAGE EXAMPLES:
    # Import the Facebook page token saved by the setup flow
    social-creds import facebook facebook_token.json

    # Import from stdin
    cat x_credentials.json | social-creds import x -

    # Which platforms are ready to post?
    social-creds check

CREDENTIAL FILES:
    facebook_token.json, instagram_token.json, pinterest_token.json,
    tumblr_credentials.json, x_credentials.json

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - No credentials for the requested platform
    3 - Invalid input (unknown platform, malformed JSON)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Store credentials for a platform from a JSON file
    Import {
        /// Platform name (facebook, instagram, pinterest, tumblr, x)
        platform: String,

        /// JSON credential file, or - for stdin
        file: PathBuf,
    },

    /// Show the active credential for a platform (tokens redacted)
    Show {
        /// Platform name (facebook, instagram, pinterest, tumblr, x)
        platform: String,
    },

    /// Report credential status for every platform
    Check,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    libsocialcast::logging::init_with_verbosity(cli.verbose);

    if let Err(e) = run_command(cli.command).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<SocialcastError>()
            .map(SocialcastError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run_command(command: Commands) -> Result<()> {
    let config = Config::load()?;
    let resolver = build_resolver(&config).await;

    match command {
        Commands::Import { platform, file } => {
            import_credentials(&resolver, &config, parse_platform(&platform)?, &file).await
        }
        Commands::Show { platform } => {
            show_credentials(&resolver, parse_platform(&platform)?).await
        }
        Commands::Check => check_credentials(&resolver).await,
    }
}

fn parse_platform(name: &str) -> Result<PlatformId> {
    Ok(name.parse::<PlatformId>()?)
}

/// Resolver for `config`; a database that cannot be opened leaves the files in charge
async fn build_resolver(config: &Config) -> CredentialResolver {
    let database: Option<Arc<dyn CredentialSource>> = if config.persistence_enabled() {
        let path = &config.database.path;
        match Database::new(path).await {
            Ok(db) => {
                debug!(path = %path, "Opened credential database");
                Some(Arc::new(db))
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Cannot open database, using credential files");
                Some(Arc::new(UnavailableSource::new(e.to_string())))
            }
        }
    } else {
        None
    };
    CredentialResolver::from_config(config, database)
}

async fn import_credentials(
    resolver: &CredentialResolver,
    config: &Config,
    platform: PlatformId,
    file: &Path,
) -> Result<()> {
    let content = if file.as_os_str() == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read credentials from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?
    };

    // Malformed input is the caller's mistake, not a storage failure
    let credential = parse_credential_json(platform, &content)
        .map_err(|e| SocialcastError::InvalidInput(e.to_string()))?;

    let saved_to = resolver.save(&credential).await?;
    info!(platform = %platform, source = %saved_to, "Imported credentials");
    let location = match saved_to {
        CredentialSourceKind::File => FileCredentialStore::new(config.credentials.expanded_dir())
            .path_for(platform)
            .display()
            .to_string(),
        other => other.to_string(),
    };

    println!(
        "Stored {} credentials for {} in {}",
        platform.display_name(),
        credential.label(),
        location
    );
    Ok(())
}

async fn show_credentials(resolver: &CredentialResolver, platform: PlatformId) -> Result<()> {
    match resolver.resolve(platform).await {
        CredentialLookup::Found { credential, source } => {
            print_credential(&credential, &source.to_string());
            Ok(())
        }
        CredentialLookup::NotConfigured => Err(SocialcastError::Credential(
            CredentialError::NotFound(platform.display_name().to_string()),
        )
        .into()),
        CredentialLookup::Unavailable(reason) => Err(SocialcastError::Credential(
            CredentialError::Unavailable(reason),
        )
        .into()),
    }
}

fn print_credential(credential: &PlatformCredential, source: &str) {
    println!("Platform:      {}", credential.platform.display_name());
    println!("Source:        {}", source);
    if credential.account_id.is_empty() {
        println!("Account:       (user token, pages discovered at publish time)");
    } else {
        println!("Account:       {}", credential.account_id);
    }
    if let Some(username) = &credential.metadata.username {
        println!("Username:      {}", username);
    }
    if let Some(name) = &credential.metadata.display_name {
        println!("Name:          {}", name);
    }
    if let Some(board) = &credential.metadata.board_id {
        println!("Board:         {}", board);
    }
    println!("Access token:  {}", mask(credential.access_token.expose()));
    if credential.refresh_token.is_some() {
        println!("Refresh token: present");
    }
    if let Some(oauth1) = &credential.oauth1 {
        println!("OAuth1 token:  {}", mask(oauth1.token.expose()));
    }
}

async fn check_credentials(resolver: &CredentialResolver) -> Result<()> {
    for platform in PlatformId::ALL {
        let lookup = resolver.resolve(platform).await;
        match &lookup {
            CredentialLookup::Found { credential, source } => {
                println!(
                    "✓ {}: {} ({})",
                    platform.display_name(),
                    credential.label(),
                    source
                );
            }
            missing => println!(
                "✗ {}: {}",
                platform.display_name(),
                missing.describe_missing(platform)
            ),
        }
    }
    Ok(())
}

/// Show only the last four characters of a secret
fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_hides_short_secrets_entirely() {
        assert_eq!(mask("abc"), "****");
        assert_eq!(mask("12345678"), "****");
    }

    #[test]
    fn test_mask_keeps_last_four() {
        assert_eq!(mask("EAAG-long-page-token-9f3a"), "****9f3a");
    }

    #[test]
    fn test_parse_platform_error_is_invalid_input() {
        let err = parse_platform("friendster").unwrap_err();
        let code = err.downcast_ref::<SocialcastError>().unwrap().exit_code();
        assert_eq!(code, 3);
    }
}
