//! Domain models and value objects

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

pub type UserId = i64;
pub type ProfileId = i64;
pub type PostId = i64;
pub type NotificationId = i64;

/// An account that owns tracked profiles, notifications and settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Unique login name
    pub username: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Kind of entity behind a tracked profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    #[default]
    Person,
    Company,
}

impl ProfileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileKind::Person => "person",
            ProfileKind::Company => "company",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "person" => Some(ProfileKind::Person),
            "company" | "organization" => Some(ProfileKind::Company),
            _ => None,
        }
    }
}

/// A tracked social profile (person or organization)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    /// Owning user
    pub user_id: UserId,
    /// Display name used in digests and prompts
    pub name: String,
    /// Public profile URL the source handle is derived from
    pub source_url: String,
    pub kind: ProfileKind,
    /// Pre-provisioned automation job whose output holds this profile's posts
    pub automation_job_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Profile {
    /// Whether the profile carries a usable source URL
    pub fn has_source(&self) -> bool {
        !self.source_url.trim().is_empty()
    }
}

/// Fields required to create a profile
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub user_id: UserId,
    pub name: String,
    pub source_url: String,
    pub kind: ProfileKind,
    pub automation_job_id: Option<String>,
}

/// A post as returned by a post source, before filtering and classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPost {
    pub text: String,
    /// Canonical post URL, if the upstream exposed one
    pub url: Option<String>,
    /// Publication time normalized to UTC; `None` when absent or unparseable
    pub published_at: Option<OffsetDateTime>,
}

impl RawPost {
    /// URL with empty strings treated as absent
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().filter(|u| !u.trim().is_empty())
    }
}

/// Post category assigned by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Category {
    Funding,
    Hiring,
    Launch,
    #[default]
    Other,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Funding,
        Category::Hiring,
        Category::Launch,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Funding => "Funding",
            Category::Hiring => "Hiring",
            Category::Launch => "Launch",
            Category::Other => "Other",
        }
    }

    /// Parse a label case-insensitively, mapping anything unknown to `Other`
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(label))
            .unwrap_or(Category::Other)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying a post; always fully populated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub summary: String,
    pub category: Category,
    pub suggested_reply: String,
}

impl Classification {
    pub const DEFAULT_SUMMARY: &'static str = "No summary available.";
    pub const FALLBACK_SUMMARY: &'static str = "Could not generate summary.";
    pub const DEFAULT_REPLY: &'static str = "Congratulations on the update!";

    /// Classification substituted when the AI response cannot be parsed
    pub fn fallback() -> Self {
        Self {
            summary: Self::FALLBACK_SUMMARY.to_string(),
            category: Category::Other,
            suggested_reply: Self::DEFAULT_REPLY.to_string(),
        }
    }
}

/// A stored, classified post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub profile_id: ProfileId,
    pub text: String,
    pub url: Option<String>,
    /// See [`crate::compute_fingerprint`]
    pub fingerprint: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    pub classification: Classification,
    /// Run that created the post
    pub run_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Fields required to store a post
#[derive(Debug, Clone)]
pub struct NewPost {
    pub profile_id: ProfileId,
    pub text: String,
    pub url: Option<String>,
    pub fingerprint: String,
    pub published_at: Option<OffsetDateTime>,
    pub classification: Classification,
    pub run_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
}

/// Outcome of inserting a post
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Inserted(Post),
    /// A post with the same non-empty URL or fingerprint already exists
    AlreadyStored,
}

/// One line of a digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestEntry {
    pub profile_name: String,
    pub category: Category,
    pub summary: String,
    pub suggested_reply: String,
    pub post_url: Option<String>,
}

impl DigestEntry {
    pub fn from_post(profile_name: &str, post: &Post) -> Self {
        Self {
            profile_name: profile_name.to_string(),
            category: post.classification.category,
            summary: post.classification.summary.clone(),
            suggested_reply: post.classification.suggested_reply.clone(),
            post_url: post.url.clone().filter(|u| !u.is_empty()),
        }
    }
}

/// The aggregated message produced once per run
#[derive(Debug, Clone, Serialize)]
pub struct Digest {
    pub title: String,
    pub plain_body: String,
    /// HTML rendering of the same entries
    pub rich_body: String,
    pub entries: Vec<DigestEntry>,
    /// Names of the profiles the run looked at
    pub monitored_profiles: Vec<String>,
}

/// A durable digest delivery record shown to the user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub title: String,
    pub body: String,
    pub kind: String,
    pub is_read: bool,
    pub run_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Fields required to append a notification
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: UserId,
    pub title: String,
    pub body: String,
    pub kind: String,
    pub run_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
}

impl NewNotification {
    pub const KIND_DIGEST: &'static str = "digest";
}

/// Setting keys understood by the pipeline
pub mod setting_keys {
    pub const NOTIFY_EMAIL: &str = "notify_email";
    pub const SMTP_HOST: &str = "smtp_host";
    pub const SMTP_PORT: &str = "smtp_port";
    pub const SMTP_USER: &str = "smtp_user";
    pub const SMTP_PASSWORD: &str = "smtp_password";

    pub const ALL: [&str; 5] = [NOTIFY_EMAIL, SMTP_HOST, SMTP_PORT, SMTP_USER, SMTP_PASSWORD];
}

/// Per-user email delivery settings
#[derive(Clone, Default, PartialEq, Eq)]
pub struct EmailSettings {
    pub notify_email: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl EmailSettings {
    pub const DEFAULT_SMTP_HOST: &'static str = "smtp.gmail.com";
    pub const DEFAULT_SMTP_PORT: u16 = 587;

    /// Build settings from stored key/value pairs, applying host and port defaults
    pub fn from_values(values: &HashMap<String, String>) -> Self {
        let get = |key: &str| {
            values
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let smtp_port = match get(setting_keys::SMTP_PORT) {
            Some(port) => port.parse().ok(),
            None => Some(Self::DEFAULT_SMTP_PORT),
        };

        Self {
            notify_email: get(setting_keys::NOTIFY_EMAIL),
            smtp_host: get(setting_keys::SMTP_HOST)
                .or_else(|| Some(Self::DEFAULT_SMTP_HOST.to_string())),
            smtp_port,
            smtp_user: get(setting_keys::SMTP_USER),
            smtp_password: get(setting_keys::SMTP_PASSWORD),
        }
    }

    /// Names of the required fields that are missing
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.notify_email.is_none() {
            missing.push(setting_keys::NOTIFY_EMAIL);
        }
        if self.smtp_host.is_none() {
            missing.push(setting_keys::SMTP_HOST);
        }
        if self.smtp_port.is_none() {
            missing.push(setting_keys::SMTP_PORT);
        }
        if self.smtp_user.is_none() {
            missing.push(setting_keys::SMTP_USER);
        }
        if self.smtp_password.is_none() {
            missing.push(setting_keys::SMTP_PASSWORD);
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

impl fmt::Debug for EmailSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailSettings")
            .field("notify_email", &self.notify_email)
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_user", &self.smtp_user)
            .field(
                "smtp_password",
                &self.smtp_password.as_ref().map(|_| "********"),
            )
            .finish()
    }
}

/// Lifecycle state of a job run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Completed,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "running" => Some(RunState::Running),
            "completed" => Some(RunState::Completed),
            "failed" => Some(RunState::Failed),
            _ => None,
        }
    }
}

/// Durable record of one run, used to resume dispatch after a crash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub id: Uuid,
    pub user_id: UserId,
    pub state: RunState,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,
    pub error: Option<String>,
}

/// Outcome of one delivery channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChannelOutcome {
    Delivered,
    /// Channel not configured; not an error
    Skipped { reason: String },
    /// Channel configured but delivery failed
    Failed { reason: String },
}

impl ChannelOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ChannelOutcome::Failed { .. })
    }
}

/// Result of dispatching a digest
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    /// Durable log entry written for this digest
    pub notification_id: NotificationId,
    pub channels: Vec<(String, ChannelOutcome)>,
}

impl DeliveryReport {
    /// True when no attempted channel failed; skipped channels do not count
    pub fn success(&self) -> bool {
        !self.channels.iter().any(|(_, outcome)| outcome.is_failure())
    }

    pub fn outcome(&self, channel: &str) -> Option<&ChannelOutcome> {
        self.channels
            .iter()
            .find(|(name, _)| name == channel)
            .map(|(_, outcome)| outcome)
    }
}

/// Processing result for a single profile within a run
#[derive(Debug, Clone)]
pub enum ProfileOutcome {
    /// Profile was fetched and its candidates handled
    Processed {
        new_posts: usize,
        duplicates: usize,
        stale: usize,
    },
    /// Profile was skipped (no source URL, etc.)
    Skipped { reason: String },
    /// An error escaped processing for this profile; earlier posts stay stored
    Failed { new_posts: usize, error: String },
}

/// Summary of one completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub user_id: UserId,
    pub profiles: Vec<(String, ProfileOutcome)>,
    pub digest: Digest,
    pub delivery: DeliveryReport,
}

impl RunReport {
    pub fn new_posts(&self) -> usize {
        self.digest.entries.len()
    }

    pub fn failed_profiles(&self) -> usize {
        self.profiles
            .iter()
            .filter(|(_, outcome)| matches!(outcome, ProfileOutcome::Failed { .. }))
            .count()
    }
}
