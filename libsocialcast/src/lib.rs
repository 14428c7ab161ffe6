//! Socialcast - schedule and publish posts across social platforms
//!
//! This library holds everything the Socialcast binaries share: the post
//! queue, the credential store, one adapter per platform (Facebook,
//! Instagram, Pinterest, Tumblr and X), and the scheduler loop that
//! publishes due posts.

pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod logging;
pub mod platforms;
pub mod scheduler;
pub mod scheduling;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use credentials::{
    CredentialLookup, CredentialResolver, FileCredentialStore, PlatformCredential,
};
pub use db::{Database, PostStore};
pub use error::{PlatformError, Result, SocialcastError};
pub use platforms::{AdapterRegistry, PlatformAdapter, PublishRequest};
pub use scheduler::{CycleReport, Scheduler, SchedulerHandle, SchedulerSettings};
pub use service::PostingService;
pub use types::{MediaAttachment, NewPost, PlatformId, PostStatus, PublishResult, ScheduledPost};
