//! In-process fakes shared by the use case tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::model::{
    Category, Classification, Digest, EmailSettings, InsertOutcome, JobRun, NewNotification,
    NewPost, NewProfile, Notification, NotificationId, Post, Profile, ProfileId, ProfileKind,
    RawPost, RunState, User, UserId,
};
use crate::ports::{
    ChannelError, Classifier, ClassifyError, Clock, DigestChannel, PostSource, SendStatus, Store,
    StoreError,
};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    profiles: Vec<Profile>,
    posts: Vec<Post>,
    notifications: Vec<Notification>,
    settings: HashMap<(UserId, String), String>,
    runs: Vec<JobRun>,
    leases: HashMap<UserId, (Uuid, OffsetDateTime)>,
}

/// Store fake keeping everything in vectors
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_notifications: AtomicBool,
    notification_attempts: AtomicU32,
}

impl MemoryStore {
    pub fn fail_notifications(&self, fail: bool) {
        self.fail_notifications.store(fail, Ordering::SeqCst);
    }

    pub fn notification_attempts(&self) -> u32 {
        self.notification_attempts.load(Ordering::SeqCst)
    }

    pub fn post_count(&self) -> usize {
        self.tables.lock().unwrap().posts.len()
    }

    pub fn run(&self, run_id: Uuid) -> Option<JobRun> {
        self.tables
            .lock()
            .unwrap()
            .runs
            .iter()
            .find(|r| r.id == run_id)
            .cloned()
    }

    /// Run currently holding the user's lease, if any
    pub fn lease_holder(&self, user_id: UserId) -> Option<Uuid> {
        self.tables
            .lock()
            .unwrap()
            .leases
            .get(&user_id)
            .map(|(run_id, _)| *run_id)
    }

    /// Create a user with one profile and return both
    pub async fn seed_profile(&self, username: &str, name: &str, url: &str) -> (User, Profile) {
        let user = self.find_or_create_user(username).await.unwrap();
        let profile = self
            .create_profile(&NewProfile {
                user_id: user.id,
                name: name.to_string(),
                source_url: url.to_string(),
                kind: ProfileKind::Company,
                automation_job_id: None,
            })
            .await
            .unwrap();
        (user, profile)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_or_create_user(&self, username: &str) -> Result<User, StoreError> {
        let mut t = self.tables.lock().unwrap();
        if let Some(user) = t.users.iter().find(|u| u.username == username) {
            return Ok(user.clone());
        }
        let user = User {
            id: t.users.len() as i64 + 1,
            username: username.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        t.users.push(user.clone());
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.tables.lock().unwrap().users.clone())
    }

    async fn create_profile(&self, profile: &NewProfile) -> Result<Profile, StoreError> {
        let mut t = self.tables.lock().unwrap();
        if t.profiles
            .iter()
            .any(|p| p.user_id == profile.user_id && p.source_url == profile.source_url)
        {
            return Err(StoreError::Conflict(profile.source_url.clone()));
        }
        let created = Profile {
            id: t.profiles.len() as i64 + 1,
            user_id: profile.user_id,
            name: profile.name.clone(),
            source_url: profile.source_url.clone(),
            kind: profile.kind,
            automation_job_id: profile.automation_job_id.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        t.profiles.push(created.clone());
        Ok(created)
    }

    async fn list_profiles(&self, user_id: UserId) -> Result<Vec<Profile>, StoreError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .profiles
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_profile(
        &self,
        user_id: UserId,
        profile_id: ProfileId,
    ) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().unwrap();
        let before = t.profiles.len();
        t.profiles
            .retain(|p| !(p.id == profile_id && p.user_id == user_id));
        let removed = t.profiles.len() != before;
        if removed {
            t.posts.retain(|p| p.profile_id != profile_id);
        }
        Ok(removed)
    }

    async fn find_post_by_url(
        &self,
        profile_id: ProfileId,
        url: &str,
    ) -> Result<Option<Post>, StoreError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .posts
            .iter()
            .find(|p| p.profile_id == profile_id && !url.is_empty() && p.url.as_deref() == Some(url))
            .cloned())
    }

    async fn find_post_by_fingerprint(
        &self,
        profile_id: ProfileId,
        fingerprint: &str,
    ) -> Result<Option<Post>, StoreError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .posts
            .iter()
            .find(|p| p.profile_id == profile_id && p.fingerprint == fingerprint)
            .cloned())
    }

    async fn insert_post(&self, post: &NewPost) -> Result<InsertOutcome, StoreError> {
        let mut t = self.tables.lock().unwrap();
        let url = post.url.as_deref().filter(|u| !u.is_empty());
        let clash = t.posts.iter().any(|p| {
            p.profile_id == post.profile_id
                && (p.fingerprint == post.fingerprint
                    || (url.is_some() && p.url.as_deref() == url))
        });
        if clash {
            return Ok(InsertOutcome::AlreadyStored);
        }
        let stored = Post {
            id: t.posts.len() as i64 + 1,
            profile_id: post.profile_id,
            text: post.text.clone(),
            url: post.url.clone(),
            fingerprint: post.fingerprint.clone(),
            published_at: post.published_at,
            classification: post.classification.clone(),
            run_id: post.run_id,
            created_at: post.created_at,
        };
        t.posts.push(stored.clone());
        Ok(InsertOutcome::Inserted(stored))
    }

    async fn list_posts_for_run(&self, run_id: Uuid) -> Result<Vec<Post>, StoreError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .posts
            .iter()
            .filter(|p| p.run_id == Some(run_id))
            .cloned()
            .collect())
    }

    async fn create_notification(
        &self,
        notification: &NewNotification,
    ) -> Result<Notification, StoreError> {
        self.notification_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_notifications.load(Ordering::SeqCst) {
            return Err(StoreError::Database("database is locked".to_string()));
        }
        let mut t = self.tables.lock().unwrap();
        if let Some(run_id) = notification.run_id {
            if let Some(existing) = t.notifications.iter().find(|n| n.run_id == Some(run_id)) {
                return Ok(existing.clone());
            }
        }
        let created = Notification {
            id: t.notifications.len() as i64 + 1,
            user_id: notification.user_id,
            title: notification.title.clone(),
            body: notification.body.clone(),
            kind: notification.kind.clone(),
            is_read: false,
            run_id: notification.run_id,
            created_at: notification.created_at,
        };
        t.notifications.push(created.clone());
        Ok(created)
    }

    async fn list_notifications(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<Notification>, StoreError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn mark_notification_read(
        &self,
        user_id: UserId,
        notification_id: NotificationId,
    ) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().unwrap();
        match t
            .notifications
            .iter_mut()
            .find(|n| n.id == notification_id && n.user_id == user_id)
        {
            Some(n) => {
                n.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_notifications_read(&self, user_id: UserId) -> Result<u64, StoreError> {
        let mut t = self.tables.lock().unwrap();
        let mut count = 0;
        for n in t
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && !n.is_read)
        {
            n.is_read = true;
            count += 1;
        }
        Ok(count)
    }

    async fn unread_count(&self, user_id: UserId) -> Result<u64, StoreError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count() as u64)
    }

    async fn get_setting(&self, user_id: UserId, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .settings
            .get(&(user_id, key.to_string()))
            .cloned())
    }

    async fn set_setting(&self, user_id: UserId, key: &str, value: &str) -> Result<(), StoreError> {
        self.tables
            .lock()
            .unwrap()
            .settings
            .insert((user_id, key.to_string()), value.to_string());
        Ok(())
    }

    async fn begin_run(&self, run: &JobRun) -> Result<(), StoreError> {
        self.tables.lock().unwrap().runs.push(run.clone());
        Ok(())
    }

    async fn finish_run(
        &self,
        run_id: Uuid,
        state: RunState,
        finished_at: OffsetDateTime,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut t = self.tables.lock().unwrap();
        let run = t
            .runs
            .iter_mut()
            .find(|r| r.id == run_id)
            .ok_or_else(|| StoreError::NotFound(run_id.to_string()))?;
        run.state = state;
        run.finished_at = Some(finished_at);
        run.error = error.map(String::from);
        Ok(())
    }

    async fn list_running_runs(&self) -> Result<Vec<JobRun>, StoreError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .runs
            .iter()
            .filter(|r| r.state == RunState::Running)
            .cloned()
            .collect())
    }

    async fn acquire_run_lease(
        &self,
        user_id: UserId,
        run_id: Uuid,
        now: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().unwrap();
        match t.leases.get(&user_id) {
            Some((_, current)) if *current >= now => Ok(false),
            _ => {
                t.leases.insert(user_id, (run_id, expires_at));
                Ok(true)
            }
        }
    }

    async fn renew_run_lease(
        &self,
        user_id: UserId,
        run_id: Uuid,
        expires_at: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().unwrap();
        match t.leases.get_mut(&user_id) {
            Some(lease) if lease.0 == run_id => {
                lease.1 = expires_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_run_lease(&self, user_id: UserId, run_id: Uuid) -> Result<(), StoreError> {
        let mut t = self.tables.lock().unwrap();
        if t.leases.get(&user_id).is_some_and(|(holder, _)| *holder == run_id) {
            t.leases.remove(&user_id);
        }
        Ok(())
    }
}

/// Clock pinned to one instant
pub struct FixedClock {
    time: OffsetDateTime,
}

impl FixedClock {
    pub fn now() -> Self {
        Self {
            time: OffsetDateTime::now_utc(),
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.time
    }
}

/// Post source returning canned posts per profile id
#[derive(Default)]
pub struct StaticSource {
    posts: HashMap<ProfileId, Vec<RawPost>>,
    delay: Option<Duration>,
    fetches: AtomicUsize,
}

impl StaticSource {
    pub fn with_posts(mut self, profile_id: ProfileId, posts: Vec<RawPost>) -> Self {
        self.posts.insert(profile_id, posts);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PostSource for StaticSource {
    async fn fetch_recent_posts(&self, profile: &Profile) -> Vec<RawPost> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.posts.get(&profile.id).cloned().unwrap_or_default()
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Classifier returning one fixed classification, optionally failing for chosen texts
pub struct ScriptedClassifier {
    classification: Classification,
    fail_on: Vec<String>,
    rate_limited_calls: u32,
    calls: AtomicU32,
}

impl ScriptedClassifier {
    pub fn new(category: Category) -> Self {
        Self {
            classification: Classification {
                summary: "Summary".to_string(),
                category,
                suggested_reply: "Congrats!".to_string(),
            },
            fail_on: Vec::new(),
            rate_limited_calls: 0,
            calls: AtomicU32::new(0),
        }
    }

    /// Fail with a non-retryable error for posts containing `needle`
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on.push(needle.to_string());
        self
    }

    /// Report rate limiting on the first `n` calls
    pub fn rate_limited_for(mut self, n: u32) -> Self {
        self.rate_limited_calls = n;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, text: &str, _author: &str) -> Result<Classification, ClassifyError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.rate_limited_calls {
            return Err(ClassifyError::RateLimited("429 Too Many Requests".to_string()));
        }
        if self.fail_on.iter().any(|needle| text.contains(needle)) {
            return Err(ClassifyError::Api("API returned 500".to_string()));
        }
        Ok(self.classification.clone())
    }
}

/// Channel that records what it was asked to send
pub struct RecordingChannel {
    name: &'static str,
    skip_reason: Option<String>,
    sent: Mutex<Vec<Digest>>,
}

impl RecordingChannel {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            skip_reason: None,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn skipping(name: &'static str, reason: &str) -> Self {
        Self {
            skip_reason: Some(reason.to_string()),
            ..Self::new(name)
        }
    }

    pub fn sent(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<Digest> {
        self.sent.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl DigestChannel for RecordingChannel {
    async fn send(
        &self,
        digest: &Digest,
        _settings: &EmailSettings,
    ) -> Result<SendStatus, ChannelError> {
        if let Some(reason) = &self.skip_reason {
            return Ok(SendStatus::Skipped(reason.clone()));
        }
        self.sent.lock().unwrap().push(digest.clone());
        Ok(SendStatus::Sent)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Channel that always fails with a transport error
pub struct FailingChannel {
    name: &'static str,
    reason: String,
}

impl FailingChannel {
    pub fn new(name: &'static str, reason: &str) -> Self {
        Self {
            name,
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl DigestChannel for FailingChannel {
    async fn send(
        &self,
        _digest: &Digest,
        _settings: &EmailSettings,
    ) -> Result<SendStatus, ChannelError> {
        Err(ChannelError::Transport(self.reason.clone()))
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

pub fn raw_post(text: &str, url: Option<&str>, published_at: Option<OffsetDateTime>) -> RawPost {
    RawPost {
        text: text.to_string(),
        url: url.map(String::from),
        published_at,
    }
}
