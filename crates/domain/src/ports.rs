//! Port definitions (traits) for external dependencies
//!
//! These traits define the boundaries between the domain and external systems.
//! Adapters implement these traits to connect to real infrastructure.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::model::{
    Classification, Digest, EmailSettings, InsertOutcome, JobRun, NewNotification, NewPost,
    NewProfile, Notification, NotificationId, Post, Profile, ProfileId, RawPost, RunState, User,
    UserId, setting_keys,
};

/// Port for fetching recent posts of a tracked profile
///
/// Implementations never fail for "no data" conditions (missing credentials,
/// unresolvable handle, empty feed, upstream rate limiting): they log the
/// reason and return an empty list.
#[async_trait]
pub trait PostSource: Send + Sync {
    /// Fetch posts from the trailing lookback window, in upstream order
    async fn fetch_recent_posts(&self, profile: &Profile) -> Vec<RawPost>;

    /// Backend name for logging (e.g., "scraper_api")
    fn name(&self) -> &'static str;
}

/// Error type for classifier operations
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("AI API error: {0}")]
    Api(String),
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("Timeout")]
    Timeout,
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClassifyError {
    /// Whether the error signals upstream rate limiting or quota exhaustion
    pub fn is_rate_limited(&self) -> bool {
        match self {
            ClassifyError::RateLimited(_) => true,
            ClassifyError::Api(message) => looks_rate_limited(message),
            ClassifyError::Timeout | ClassifyError::Config(_) => false,
        }
    }
}

/// Detect rate-limit indicators in free-form upstream error text
pub fn looks_rate_limited(message: &str) -> bool {
    let lower = message.to_lowercase();
    message.contains("429")
        || message.contains("RATELIMIT_EXCEEDED")
        || lower.contains("quota")
        || lower.contains("rate limit")
}

/// Port for AI-based post classification
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify a post written by `author`
    ///
    /// Unparseable model output is not an error: implementations return
    /// [`Classification::fallback`] instead.
    async fn classify(&self, text: &str, author: &str) -> Result<Classification, ClassifyError>;
}

/// Error type for store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Port for the persistence gateway
///
/// Every method is its own short transaction; no transaction spans a run.
#[async_trait]
pub trait Store: Send + Sync {
    /// Find a user by name, creating it if needed
    async fn find_or_create_user(&self, username: &str) -> Result<User, StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    /// Create a profile; fails with `Conflict` if the user already tracks the URL
    async fn create_profile(&self, profile: &NewProfile) -> Result<Profile, StoreError>;

    async fn list_profiles(&self, user_id: UserId) -> Result<Vec<Profile>, StoreError>;

    /// Delete a profile and, with it, all of its posts
    async fn delete_profile(&self, user_id: UserId, profile_id: ProfileId)
    -> Result<bool, StoreError>;

    /// Find a post of the profile with exactly this (non-empty) URL
    async fn find_post_by_url(
        &self,
        profile_id: ProfileId,
        url: &str,
    ) -> Result<Option<Post>, StoreError>;

    async fn find_post_by_fingerprint(
        &self,
        profile_id: ProfileId,
        fingerprint: &str,
    ) -> Result<Option<Post>, StoreError>;

    /// Insert a post, reporting `AlreadyStored` on a URL or fingerprint clash
    async fn insert_post(&self, post: &NewPost) -> Result<InsertOutcome, StoreError>;

    async fn list_posts_for_run(&self, run_id: Uuid) -> Result<Vec<Post>, StoreError>;

    /// Append a notification
    ///
    /// Idempotent per `run_id`: a second call for the same run returns the
    /// existing record.
    async fn create_notification(
        &self,
        notification: &NewNotification,
    ) -> Result<Notification, StoreError>;

    /// Newest first
    async fn list_notifications(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<Notification>, StoreError>;

    async fn mark_notification_read(
        &self,
        user_id: UserId,
        notification_id: NotificationId,
    ) -> Result<bool, StoreError>;

    async fn mark_all_notifications_read(&self, user_id: UserId) -> Result<u64, StoreError>;

    async fn unread_count(&self, user_id: UserId) -> Result<u64, StoreError>;

    async fn get_setting(&self, user_id: UserId, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_setting(&self, user_id: UserId, key: &str, value: &str)
    -> Result<(), StoreError>;

    async fn begin_run(&self, run: &JobRun) -> Result<(), StoreError>;

    async fn finish_run(
        &self,
        run_id: Uuid,
        state: RunState,
        finished_at: OffsetDateTime,
        error: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Runs still marked running, oldest first
    async fn list_running_runs(&self) -> Result<Vec<JobRun>, StoreError>;

    /// Take the user's run lease for `run_id`
    ///
    /// Succeeds when no lease exists or the current one expired before `now`.
    /// Returns `false` while another run holds an unexpired lease.
    async fn acquire_run_lease(
        &self,
        user_id: UserId,
        run_id: Uuid,
        now: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> Result<bool, StoreError>;

    /// Push the lease expiry forward; `false` if `run_id` no longer holds it
    async fn renew_run_lease(
        &self,
        user_id: UserId,
        run_id: Uuid,
        expires_at: OffsetDateTime,
    ) -> Result<bool, StoreError>;

    /// Drop the lease if `run_id` still holds it
    async fn release_run_lease(&self, user_id: UserId, run_id: Uuid) -> Result<(), StoreError>;

    /// Load the user's email settings from the key/value settings
    async fn load_email_settings(&self, user_id: UserId) -> Result<EmailSettings, StoreError> {
        let mut values = HashMap::new();
        for key in setting_keys::ALL {
            if let Some(value) = self.get_setting(user_id, key).await? {
                values.insert(key.to_string(), value);
            }
        }
        Ok(EmailSettings::from_values(&values))
    }
}

/// Error type for delivery channels
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Rejected by upstream: {0}")]
    Rejected(String),
}

/// Whether a channel sent the digest or had nothing to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendStatus {
    Sent,
    Skipped(String),
}

/// Port for an optional digest delivery channel (email, chat webhook)
#[async_trait]
pub trait DigestChannel: Send + Sync {
    /// Deliver the digest, or report `Skipped` when the channel is not configured
    async fn send(
        &self,
        digest: &Digest,
        settings: &EmailSettings,
    ) -> Result<SendStatus, ChannelError>;

    /// Channel name (e.g., "email", "webhook")
    fn name(&self) -> &'static str;
}

/// Port for time/clock operations (enables deterministic testing)
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> OffsetDateTime;
}

/// Real clock implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_detection() {
        assert!(ClassifyError::RateLimited("slow down".to_string()).is_rate_limited());
        assert!(ClassifyError::Api("API returned 429 Too Many Requests".to_string()).is_rate_limited());
        assert!(ClassifyError::Api("RATELIMIT_EXCEEDED".to_string()).is_rate_limited());
        assert!(ClassifyError::Api("You exceeded your current Quota".to_string()).is_rate_limited());
        assert!(ClassifyError::Api("Rate limit reached for model".to_string()).is_rate_limited());
        assert!(!ClassifyError::Api("API returned 500: boom".to_string()).is_rate_limited());
        assert!(!ClassifyError::Timeout.is_rate_limited());
    }
}
